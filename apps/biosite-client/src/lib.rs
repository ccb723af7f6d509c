//! # biosite-client
//!
//! Typed HTTP client for the biosite REST API.
//!
//! - URL templates (`/events/{id}`) expanded with percent-encoding
//! - Bearer token cached in a pluggable [`TokenStore`]
//! - Request and response interceptor chains
//! - Server errors normalized into [`ClientError::Http`]
//!
//! ```no_run
//! # async fn demo() -> Result<(), biosite_client::ClientError> {
//! use biosite_client::ApiClient;
//! use biosite_core::{LoginForm, Page};
//!
//! let client = ApiClient::new("http://127.0.0.1:8080")?;
//! client
//!     .login(LoginForm {
//!         email: "me@example.com".into(),
//!         password: "long secret".into(),
//!     })
//!     .await?;
//! let visitors = client.list_visitors(Page::default()).await?;
//! println!("{} subscribers", visitors.total);
//! # Ok(())
//! # }
//! ```

// =============================================================================
// MODULES
// =============================================================================

pub mod client;
pub mod error;
pub mod interceptors;
pub mod request;
pub mod resources;
pub mod token_store;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use client::{ApiClient, ApiClientBuilder, DEFAULT_TIMEOUT};
pub use error::ClientError;
pub use interceptors::{BearerAuth, RequestInterceptor, ResponseInterceptor, TokenCapture};
pub use request::{ApiRequest, ApiResponse, build_url};
pub use resources::AuthSession;
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};

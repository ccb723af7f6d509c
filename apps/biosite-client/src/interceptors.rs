//! # Interceptors
//!
//! Hooks that run, in registration order, on every outgoing request and
//! every received response. Either kind may mutate its value or abort the
//! call by returning an error.
//!
//! Two are installed by default:
//! - [`BearerAuth`] attaches the cached token to requests
//! - [`TokenCapture`] keeps the token store in step with the auth endpoints

use crate::error::ClientError;
use crate::request::{ApiRequest, ApiResponse};
use crate::token_store::TokenStore;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use std::sync::Arc;

pub trait RequestInterceptor: Send + Sync {
    fn on_request(&self, request: &mut ApiRequest) -> Result<(), ClientError>;
}

pub trait ResponseInterceptor: Send + Sync {
    fn on_response(&self, response: &mut ApiResponse) -> Result<(), ClientError>;
}

impl<F> RequestInterceptor for F
where
    F: Fn(&mut ApiRequest) -> Result<(), ClientError> + Send + Sync,
{
    fn on_request(&self, request: &mut ApiRequest) -> Result<(), ClientError> {
        self(request)
    }
}

impl<F> ResponseInterceptor for F
where
    F: Fn(&mut ApiResponse) -> Result<(), ClientError> + Send + Sync,
{
    fn on_response(&self, response: &mut ApiResponse) -> Result<(), ClientError> {
        self(response)
    }
}

// =============================================================================
// BEARER AUTH
// =============================================================================

/// Adds `Authorization: Bearer <token>` when a token is cached.
///
/// An `Authorization` header set by an earlier interceptor wins.
pub struct BearerAuth {
    tokens: Arc<dyn TokenStore>,
}

impl BearerAuth {
    pub fn new(tokens: Arc<dyn TokenStore>) -> Self {
        Self { tokens }
    }
}

impl RequestInterceptor for BearerAuth {
    fn on_request(&self, request: &mut ApiRequest) -> Result<(), ClientError> {
        if request.headers.contains_key(AUTHORIZATION) {
            return Ok(());
        }
        if let Some(token) = self.tokens.get() {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ClientError::Interceptor(format!("cached token: {e}")))?;
            request.headers.insert(AUTHORIZATION, value);
        }
        Ok(())
    }
}

// =============================================================================
// TOKEN CAPTURE
// =============================================================================

/// Stores the token returned by login/register and forgets it on logout
/// or on any 401.
pub struct TokenCapture {
    tokens: Arc<dyn TokenStore>,
}

impl TokenCapture {
    pub fn new(tokens: Arc<dyn TokenStore>) -> Self {
        Self { tokens }
    }
}

impl ResponseInterceptor for TokenCapture {
    fn on_response(&self, response: &mut ApiResponse) -> Result<(), ClientError> {
        if response.status == StatusCode::UNAUTHORIZED || response.path_ends_with("/auth/logout")
        {
            tracing::debug!(path = %response.path, status = %response.status, "Clearing cached token");
            return self.tokens.clear();
        }

        let issues_token =
            response.path_ends_with("/auth/login") || response.path_ends_with("/auth/register");
        if issues_token && response.status.is_success() {
            let token = response
                .body
                .as_ref()
                .and_then(|body| body.get("token"))
                .and_then(|token| token.as_str());
            if let Some(token) = token {
                tracing::debug!(path = %response.path, "Caching session token");
                self.tokens.set(token)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_store::MemoryTokenStore;
    use reqwest::Method;
    use reqwest::header::HeaderMap;
    use serde_json::json;
    use url::Url;

    fn request() -> ApiRequest {
        ApiRequest {
            method: Method::GET,
            url: Url::parse("http://localhost/auth/me").expect("url"),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    fn response(path: &str, status: StatusCode, body: Option<serde_json::Value>) -> ApiResponse {
        ApiResponse {
            method: Method::POST,
            path: path.to_string(),
            status,
            headers: HeaderMap::new(),
            body,
            text: String::new(),
        }
    }

    #[test]
    fn bearer_auth_only_when_token_cached() {
        let tokens: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
        let auth = BearerAuth::new(tokens.clone());

        let mut req = request();
        auth.on_request(&mut req).expect("no token");
        assert!(req.headers.get(AUTHORIZATION).is_none());

        tokens.set("t0k").expect("set");
        let mut req = request();
        auth.on_request(&mut req).expect("with token");
        assert_eq!(
            req.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
            Some("Bearer t0k")
        );
    }

    #[test]
    fn bearer_auth_keeps_explicit_header() {
        let tokens: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
        tokens.set("cached").expect("set");
        let mut req = request();
        req.headers
            .insert(AUTHORIZATION, HeaderValue::from_static("Bearer explicit"));
        BearerAuth::new(tokens).on_request(&mut req).expect("ok");
        assert_eq!(
            req.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
            Some("Bearer explicit")
        );
    }

    #[test]
    fn capture_login_then_logout() {
        let tokens: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
        let capture = TokenCapture::new(tokens.clone());

        let mut login = response("/api/auth/login", StatusCode::OK, Some(json!({"token": "abc"})));
        capture.on_response(&mut login).expect("login");
        assert_eq!(tokens.get().as_deref(), Some("abc"));

        let mut logout = response("/api/auth/logout", StatusCode::NO_CONTENT, None);
        capture.on_response(&mut logout).expect("logout");
        assert_eq!(tokens.get(), None);
    }

    #[test]
    fn capture_ignores_failed_login_and_clears_on_401() {
        let tokens: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
        tokens.set("old").expect("set");
        let capture = TokenCapture::new(tokens.clone());

        let mut conflict = response(
            "/auth/register",
            StatusCode::CONFLICT,
            Some(json!({"error": "taken", "token": "nope"})),
        );
        capture.on_response(&mut conflict).expect("conflict");
        assert_eq!(tokens.get().as_deref(), Some("old"));

        let mut unauthorized = response("/visitors", StatusCode::UNAUTHORIZED, None);
        capture.on_response(&mut unauthorized).expect("401");
        assert_eq!(tokens.get(), None);
    }
}

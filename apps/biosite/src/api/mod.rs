//! # biosite HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! Public:
//! - `GET /health`, `GET /metrics`
//! - `POST /auth/register` (when enabled), `POST /auth/login`
//! - `GET /achievements[/{id}]`, `GET /gallery[/{id}]`, `GET /events[/{id}]`
//! - `GET /events/search?q=` - ranked full-text search
//! - `POST /visitors` - subscribe
//! - `POST /messages` - contact form
//!
//! Bearer token required:
//! - `POST /auth/logout`, `GET /auth/me`
//! - `POST`, `PATCH`, `PUT`, `DELETE` on achievements, gallery and events
//! - everything else under `/visitors` and `/messages`
//!
//! ## Security Configuration
//!
//! See [`crate::config::ServerConfig`]: CORS origins, the global rate
//! limit, and whether public registration is open.

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{CurrentUser, bearer_token};
pub use middleware::{GlobalRateLimiter, create_rate_limiter};
pub use types::{
    AchievementParams, ApiError, AuthResponse, ErrorBody, GalleryParams, HealthResponse,
    MessageParams, PageParams, SearchParams,
};

use crate::config::ServerConfig;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use biosite_core::{Authenticator, BiositeError, Store};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Maximum request body size (2 MiB).
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// How often expired sessions are swept from the store.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub auth: Authenticator,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Create app state from an open store and the resolved configuration.
    #[must_use]
    pub fn new(store: Store, config: ServerConfig) -> Self {
        Self {
            store: Arc::new(store),
            auth: config.authenticator(),
            config: Arc::new(config),
        }
    }

    /// Run a store operation on the blocking pool.
    ///
    /// redb transactions and password hashing are synchronous; keeping them
    /// off the async workers keeps slow requests from stalling others.
    pub async fn with_store<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Store) -> Result<T, BiositeError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| ApiError::Internal(format!("store task failed: {e}")))?
            .map_err(ApiError::from)
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

const CORS_METHODS: [Method; 6] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];

/// Build the CORS layer from `cors_origins`.
///
/// - `"*"`: allows all origins (development mode)
/// - `None`: localhost only (restrictive default)
/// - otherwise: comma-separated list of allowed origins
fn build_cors_layer(origins: Option<&str>) -> CorsLayer {
    match origins.map(str::trim) {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (cors_origins = \"*\"). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .filter_map(|s| match s.parse::<HeaderValue>() {
                    Ok(hv) => {
                        tracing::info!("CORS: Allowing origin: {}", s);
                        Some(hv)
                    }
                    Err(e) => {
                        tracing::warn!("CORS: Invalid origin '{}': {}", s, e);
                        None
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods(CORS_METHODS)
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => {
            tracing::info!("CORS: No origins configured, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|origin| origin.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(CORS_METHODS)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit - rejects bodies over 2 MiB
/// 4. Rate Limiting - global quota (if enabled)
///
/// Authentication is per route, through the [`CurrentUser`] extractor.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(state.config.cors_origins.as_deref());

    let rate_limiter = create_rate_limiter(state.config.rate_limit);
    match rate_limiter {
        Some(_) => tracing::info!(
            "Rate limiting enabled: {} requests/second",
            state.config.rate_limit
        ),
        None => tracing::info!("Rate limiting disabled"),
    }
    if state.config.allow_registration {
        tracing::warn!(
            "Public registration is ENABLED - anyone can create an admin account. \
             Disable it (BIOSITE_ALLOW_REGISTRATION=false) once your accounts exist."
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        // auth
        .route("/auth/register", post(handlers::register_handler))
        .route("/auth/login", post(handlers::login_handler))
        .route("/auth/logout", post(handlers::logout_handler))
        .route("/auth/me", get(handlers::me_handler))
        // achievements
        .route(
            "/achievements",
            get(handlers::list_achievements_handler).post(handlers::create_achievement_handler),
        )
        .route(
            "/achievements/{id}",
            get(handlers::get_achievement_handler)
                .patch(handlers::update_achievement_handler)
                .put(handlers::replace_achievement_handler)
                .delete(handlers::delete_achievement_handler),
        )
        // gallery
        .route(
            "/gallery",
            get(handlers::list_gallery_handler).post(handlers::create_gallery_item_handler),
        )
        .route(
            "/gallery/{id}",
            get(handlers::get_gallery_item_handler)
                .patch(handlers::update_gallery_item_handler)
                .put(handlers::replace_gallery_item_handler)
                .delete(handlers::delete_gallery_item_handler),
        )
        // events
        .route(
            "/events",
            get(handlers::list_events_handler).post(handlers::create_event_handler),
        )
        .route("/events/search", get(handlers::search_events_handler))
        .route(
            "/events/{id}",
            get(handlers::get_event_handler)
                .patch(handlers::update_event_handler)
                .put(handlers::replace_event_handler)
                .delete(handlers::delete_event_handler),
        )
        // visitors
        .route(
            "/visitors",
            get(handlers::list_visitors_handler).post(handlers::subscribe_handler),
        )
        .route(
            "/visitors/{id}",
            get(handlers::get_visitor_handler)
                .patch(handlers::update_visitor_handler)
                .put(handlers::replace_visitor_handler)
                .delete(handlers::delete_visitor_handler),
        )
        .route(
            "/visitors/{id}/messages",
            get(handlers::visitor_messages_handler),
        )
        // messages
        .route(
            "/messages",
            get(handlers::list_messages_handler).post(handlers::contact_handler),
        )
        .route(
            "/messages/{id}",
            get(handlers::get_message_handler).delete(handlers::delete_message_handler),
        );

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Open the database and serve the API until Ctrl+C.
pub async fn run_server(config: ServerConfig) -> Result<(), BiositeError> {
    let store = Store::open(&config.database)?;
    let addr = config.bind_addr();
    let state = AppState::new(store, config);

    spawn_session_sweeper(state.clone());
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BiositeError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("biosite HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| BiositeError::IoError(format!("Server error: {}", e)))
}

/// Periodically delete expired sessions.
fn spawn_session_sweeper(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let now = chrono::Utc::now();
            match state
                .with_store(move |store| store.purge_expired_sessions(now))
                .await
            {
                Ok(0) => {}
                Ok(purged) => tracing::info!(event = "sessions_purged", purged),
                Err(e) => tracing::warn!("Session sweep failed: {}", e),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections");
}

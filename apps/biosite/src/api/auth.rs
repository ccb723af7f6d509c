//! # Authentication Module
//!
//! Session bearer-token authentication for the biosite HTTP API.
//!
//! Public routes (reading content, subscribing, the contact form, login)
//! need no credentials. Every administrative route takes a [`CurrentUser`]
//! argument; the extractor resolves the token or rejects the request with
//! 401 before the handler runs.
//!
//! ## Usage
//!
//! Send the token returned by `/auth/login` in the Authorization header:
//! ```text
//! Authorization: Bearer <token>
//! ```

use super::{AppState, types::ApiError};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use biosite_core::{BiositeError, User};

/// The account behind a valid bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    /// The raw token, kept so logout can revoke it.
    pub token: String,
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let Some(token) = bearer_token(&parts.headers).map(str::to_string) else {
            tracing::warn!(
                event = "auth_failure",
                reason = "missing_authorization_header",
                path = %parts.uri.path(),
                "Missing Authorization header"
            );
            return Err(ApiError::MissingToken);
        };

        let auth = state.auth;
        let lookup = token.clone();
        match state
            .with_store(move |store| auth.authenticate(store, &lookup))
            .await
        {
            Ok(user) => Ok(Self { user, token }),
            Err(ApiError::Core(BiositeError::Unauthenticated)) => {
                tracing::warn!(
                    event = "auth_failure",
                    reason = "invalid_session",
                    path = %parts.uri.path(),
                    "Authentication failed: unknown or expired session"
                );
                Err(ApiError::Core(BiositeError::Unauthenticated))
            }
            Err(e) => Err(e),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API that are not
//! already core records or forms, and the mapping from errors to HTTP
//! responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use biosite_core::{
    AchievementFilter, BiositeError, GalleryFilter, MessageFilter, Page, UserProfile,
    ValidationErrors,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// AUTH RESPONSE
// =============================================================================

/// Returned by register and login. `token` is shown exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
    pub expires_at: DateTime<Utc>,
}

impl From<biosite_core::IssuedSession> for AuthResponse {
    fn from(issued: biosite_core::IssuedSession) -> Self {
        Self {
            token: issued.token,
            user: issued.user,
            expires_at: issued.expires_at,
        }
    }
}

// =============================================================================
// QUERY PARAMETERS
// =============================================================================

/// `?limit=&offset=`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl PageParams {
    pub fn page(&self) -> Page {
        Page::new(self.limit, self.offset)
    }
}

/// `GET /achievements` query string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AchievementParams {
    pub category: Option<String>,
    pub year: Option<i32>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl AchievementParams {
    pub fn into_parts(self) -> (AchievementFilter, Page) {
        (
            AchievementFilter {
                category: self.category.filter(|c| !c.trim().is_empty()),
                year: self.year,
            },
            Page::new(self.limit, self.offset),
        )
    }
}

/// `GET /gallery` query string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GalleryParams {
    pub year: Option<i32>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl GalleryParams {
    pub fn into_parts(self) -> (GalleryFilter, Page) {
        (
            GalleryFilter { year: self.year },
            Page::new(self.limit, self.offset),
        )
    }
}

/// `GET /messages` query string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageParams {
    pub visitor_id: Option<Uuid>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl MessageParams {
    pub fn into_parts(self) -> (MessageFilter, Page) {
        (
            MessageFilter {
                visitor_id: self.visitor_id,
            },
            Page::new(self.limit, self.offset),
        )
    }
}

/// `GET /events/search` query string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

// =============================================================================
// ERRORS
// =============================================================================

/// JSON error body.
///
/// `details` is present only for validation failures and maps each
/// offending field to its messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ValidationErrors>,
}

/// Anything a handler can fail with.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] BiositeError),

    #[error("Missing or malformed Authorization header")]
    MissingToken,

    #[error("Registration is disabled")]
    RegistrationDisabled,

    #[error("Too Many Requests")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Core(err) => match err {
                BiositeError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                BiositeError::NotFound { .. } => StatusCode::NOT_FOUND,
                BiositeError::Conflict(_) => StatusCode::CONFLICT,
                BiositeError::InvalidCredentials | BiositeError::Unauthenticated => {
                    StatusCode::UNAUTHORIZED
                }
                BiositeError::SerializationError(_)
                | BiositeError::IoError(_)
                | BiositeError::SessionTtlOutOfRange(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::MissingToken => StatusCode::UNAUTHORIZED,
            Self::RegistrationDisabled => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The body sent to the client. Internal details are logged, not sent.
    pub fn body(&self) -> ErrorBody {
        let status = self.status();
        if status.is_server_error() {
            return ErrorBody {
                error: "Internal server error".to_string(),
                details: None,
            };
        }
        let details = match self {
            Self::Core(BiositeError::Validation(errors)) => Some(errors.clone()),
            _ => None,
        };
        ErrorBody {
            error: self.to_string(),
            details,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(self.body())).into_response()
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! # Client Errors
//!
//! Every failure an [`ApiClient`](crate::ApiClient) call can produce, with
//! server errors normalized into a single [`ClientError::Http`] shape.

use biosite_core::ValidationErrors;
use thiserror::Error;

/// Errors from the HTTP client layer.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server could not be reached, or the connection broke mid-request.
    #[error("Cannot reach biosite at {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status.
    ///
    /// `message` is the server's `error` field when the body carries one,
    /// otherwise the canonical reason phrase for `status`.
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        details: Option<ValidationErrors>,
    },

    /// A 2xx body that is not the expected JSON shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A URL template could not be expanded.
    #[error("Invalid URL: {0}")]
    Url(String),

    /// Input rejected locally, before any request was sent.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// A request or response interceptor aborted the call.
    #[error("Interceptor error: {0}")]
    Interceptor(String),

    /// The token store could not persist or forget the token.
    #[error("Token store error: {0}")]
    TokenStore(String),
}

impl ClientError {
    /// HTTP status of a server-side failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Field errors, whether reported by the server (422) or found locally.
    pub fn validation_details(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Http { details, .. } => details.as_ref(),
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<ValidationErrors> for ClientError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

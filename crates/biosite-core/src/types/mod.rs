//! # Core Type Definitions
//!
//! This module contains the stored records of the biosite content model:
//! - Public content (`Achievement`, `GalleryItem`, `Event`)
//! - Audience (`Visitor`, `Message`)
//! - Accounts (`User`, `UserProfile`, `SessionRecord`)
//! - Error types (`BiositeError`)
//!
//! ## Storage Encoding
//!
//! Records are stored with postcard, which is not self-describing.
//! Record structs therefore never use `skip_serializing_if`, `flatten`
//! or other attributes that change the field sequence.

use crate::validation::ValidationErrors;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// VISITOR
// =============================================================================

/// Someone who subscribed or wrote through the contact form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visitor {
    pub id: Uuid,
    /// Lowercased; unique across all visitors.
    pub email: String,
    pub name: Option<String>,
    /// Set when the visitor opted in to updates.
    pub subscribed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// ACHIEVEMENT
// =============================================================================

/// One entry of the biography's achievements timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: Uuid,
    pub title: String,
    pub year: Option<i32>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// GALLERY
// =============================================================================

/// An image shown in the gallery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryItem {
    pub id: Uuid,
    pub image_url: String,
    pub caption: Option<String>,
    pub year: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// MESSAGE
// =============================================================================

/// A contact-form message. Owned by exactly one visitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub visitor_id: Uuid,
    pub subject: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// EVENT (media/events extension)
// =============================================================================

/// A dated appearance, talk or publication, optionally with media.
///
/// Events are the only full-text searchable table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A search hit: the event and its relevance score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMatch {
    pub score: u32,
    pub event: Event,
}

// =============================================================================
// ACCOUNTS
// =============================================================================

/// A site administrator account.
///
/// Never serialized to API clients; see [`UserProfile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Lowercased; unique across all users.
    pub email: String,
    pub name: Option<String>,
    /// Encoded digest produced by [`crate::auth::PasswordHasher`].
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The public view of a [`User`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            created_at: user.created_at,
        }
    }
}

/// A login session, keyed in storage by the digest of its bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Whether the session is still valid at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

// =============================================================================
// ERROR TYPE
// =============================================================================

/// Errors that can occur in biosite operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BiositeError {
    /// One or more fields failed validation.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// The requested row does not exist.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// The write would violate a uniqueness constraint.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Email/password pair did not match an account.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// The bearer token is unknown, expired or revoked.
    #[error("Session expired or revoked")]
    Unauthenticated,

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O or storage engine error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// A session lifetime that no timestamp can represent.
    #[error("Session lifetime out of range: {0}")]
    SessionTtlOutOfRange(String),
}

impl BiositeError {
    /// Shorthand for a [`BiositeError::NotFound`] on `id`.
    pub fn not_found(resource: &'static str, id: Uuid) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }
}

impl From<ValidationErrors> for BiositeError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn session_expiry_is_exclusive() {
        let now = Utc::now();
        let session = SessionRecord {
            user_id: Uuid::new_v4(),
            created_at: now,
            expires_at: now + Duration::hours(1),
        };
        assert!(session.is_active(now));
        assert!(!session.is_active(now + Duration::hours(1)));
    }

    #[test]
    fn profile_hides_password_hash() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: "ada@example.com".into(),
            name: None,
            password_hash: "sha256$1$c2FsdA$ZGlnZXN0".into(),
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_string(&UserProfile::from(&user)).expect("serialize");
        assert!(!json.contains("password"));
        assert!(!json.contains("sha256"));
    }

    #[test]
    fn record_survives_postcard() {
        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            title: "Keynote".into(),
            description: None,
            location: Some("Lisbon".into()),
            event_date: NaiveDate::from_ymd_opt(2024, 5, 17),
            media_url: None,
            created_at: now,
            updated_at: now,
        };
        let bytes = postcard::to_allocvec(&event).expect("encode");
        let decoded: Event = postcard::from_bytes(&bytes).expect("decode");
        assert_eq!(decoded, event);
    }

    #[test]
    fn not_found_message_names_resource() {
        let id = Uuid::nil();
        let err = BiositeError::not_found("achievement", id);
        assert_eq!(
            err.to_string(),
            "achievement not found: 00000000-0000-0000-0000-000000000000"
        );
    }
}

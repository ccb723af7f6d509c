//! # biosite-core
//!
//! The content model and storage engine for the biosite backend - THE LOGIC.
//!
//! This crate holds everything about a biography website that does not
//! depend on HTTP: the stored records, form validation, credentials, and a
//! single redb database that enforces the relational rules of the schema.
//!
//! ## Resources
//!
//! - `visitors`: subscribers and contact-form authors (unique email)
//! - `achievements`: the biography timeline
//! - `gallery`: images with captions
//! - `messages`: contact-form messages, owned by a visitor
//! - `events`: dated appearances with media, full-text searchable
//!
//! ## Architectural Constraints
//!
//! - Has NO async, NO network dependencies (pure Rust)
//! - Every mutation is one redb write transaction; a failed check aborts it
//! - Forms are validated by the store itself, so no caller can bypass them
//! - Validation is shared with the API client, so both sides agree on rules

// =============================================================================
// MODULES
// =============================================================================

pub mod accounts;
pub mod auth;
pub mod forms;
pub mod primitives;
pub mod query;
pub mod search;
pub mod storage;
pub mod types;
pub mod validation;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Achievement, BiositeError, Event, EventMatch, GalleryItem, Message, SessionRecord, User,
    UserProfile, Visitor,
};

// =============================================================================
// RE-EXPORTS: Forms & Queries
// =============================================================================

pub use forms::{
    AchievementPatch, ContactForm, EventPatch, Form, GalleryItemPatch, LoginForm, NewAchievement,
    NewEvent, NewGalleryItem, NewVisitor, RegisterForm, VisitorPatch,
};
pub use query::{AchievementFilter, GalleryFilter, Listing, MessageFilter, Page};
pub use validation::{ValidationErrors, Validator};

// =============================================================================
// RE-EXPORTS: Storage & Accounts
// =============================================================================

pub use accounts::{
    Authenticator, DEFAULT_SESSION_TTL_HOURS, IssuedSession, MAX_SESSION_TTL_HOURS,
    session_ttl_from_hours,
};
pub use auth::PasswordHasher;
pub use search::SearchQuery;
pub use storage::{Snapshot, Store, TableCounts};

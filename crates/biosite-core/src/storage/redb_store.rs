//! # redb-backed Store
//!
//! All biosite tables live in one redb database:
//!
//! | table | key | value |
//! |---|---|---|
//! | `visitors`, `achievements`, `gallery`, `messages`, `events`, `users` | row id (`u128`) | postcard row |
//! | `visitor_emails`, `user_emails` | lowercased email | row id |
//! | `visitor_messages` | (visitor id, message id) | `()` |
//! | `event_terms` | (term, event id) | term weight |
//! | `sessions` | token digest | postcard [`SessionRecord`] |
//!
//! Constraints a relational schema would enforce with indexes, foreign
//! keys and triggers are enforced here, inside the write transaction that
//! changes the row:
//! - emails are unique per table (`Conflict` on violation)
//! - a message needs an existing visitor; deleting a visitor deletes
//!   its messages
//! - `created_at` is set once, `updated_at` on every write
//! - the events term index always reflects the stored event text

use crate::forms::{
    AchievementPatch, ContactForm, EventPatch, Form, GalleryItemPatch, NewAchievement, NewEvent,
    NewGalleryItem, NewVisitor, VisitorPatch,
};
use crate::query::{AchievementFilter, GalleryFilter, Listing, MessageFilter, Page};
use crate::search::{BODY_WEIGHT, SearchQuery, TITLE_WEIGHT, weighted_terms};
use crate::{
    Achievement, BiositeError, Event, EventMatch, GalleryItem, Message, SessionRecord, User,
    Visitor,
};
use chrono::{DateTime, Utc};
use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, ReadableTableMetadata, Table,
    TableDefinition, WriteTransaction,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

// =============================================================================
// TABLES
// =============================================================================

const VISITORS: TableDefinition<u128, &[u8]> = TableDefinition::new("visitors");
const ACHIEVEMENTS: TableDefinition<u128, &[u8]> = TableDefinition::new("achievements");
const GALLERY: TableDefinition<u128, &[u8]> = TableDefinition::new("gallery");
const MESSAGES: TableDefinition<u128, &[u8]> = TableDefinition::new("messages");
const EVENTS: TableDefinition<u128, &[u8]> = TableDefinition::new("events");
const USERS: TableDefinition<u128, &[u8]> = TableDefinition::new("users");

/// Unique index: lowercased email -> visitor id.
const VISITOR_EMAILS: TableDefinition<&str, u128> = TableDefinition::new("visitor_emails");

/// Unique index: lowercased email -> user id.
const USER_EMAILS: TableDefinition<&str, u128> = TableDefinition::new("user_emails");

/// Foreign key index: (visitor id, message id).
const VISITOR_MESSAGES: TableDefinition<(u128, u128), ()> =
    TableDefinition::new("visitor_messages");

/// Search index: (term, event id) -> weight.
const EVENT_TERMS: TableDefinition<(&str, u128), u32> = TableDefinition::new("event_terms");

/// Sessions: token digest -> serialized SessionRecord.
const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

// =============================================================================
// RECORD PLUMBING
// =============================================================================

/// A row stored by id in one of the primary tables.
trait Record: Serialize + DeserializeOwned {
    const TABLE: TableDefinition<'static, u128, &'static [u8]>;
    const RESOURCE: &'static str;

    fn id(&self) -> Uuid;
    fn touch(&mut self, at: DateTime<Utc>);
}

macro_rules! record {
    ($ty:ty, $table:expr, $resource:literal) => {
        impl Record for $ty {
            const TABLE: TableDefinition<'static, u128, &'static [u8]> = $table;
            const RESOURCE: &'static str = $resource;

            fn id(&self) -> Uuid {
                self.id
            }

            fn touch(&mut self, at: DateTime<Utc>) {
                self.updated_at = at;
            }
        }
    };
}

record!(Visitor, VISITORS, "visitor");
record!(Achievement, ACHIEVEMENTS, "achievement");
record!(GalleryItem, GALLERY, "gallery item");
record!(Message, MESSAGES, "message");
record!(Event, EVENTS, "event");
record!(User, USERS, "user");

fn io(e: impl std::fmt::Display) -> BiositeError {
    BiositeError::IoError(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, BiositeError> {
    postcard::to_allocvec(value).map_err(|e| BiositeError::SerializationError(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, BiositeError> {
    postcard::from_bytes(bytes).map_err(|e| BiositeError::SerializationError(e.to_string()))
}

fn get_in<R: Record>(
    table: &impl ReadableTable<u128, &'static [u8]>,
    id: Uuid,
) -> Result<Option<R>, BiositeError> {
    table
        .get(id.as_u128())
        .map_err(io)?
        .map(|guard| decode(guard.value()))
        .transpose()
}

fn require_in<R: Record>(
    table: &impl ReadableTable<u128, &'static [u8]>,
    id: Uuid,
) -> Result<R, BiositeError> {
    get_in(table, id)?.ok_or_else(|| BiositeError::not_found(R::RESOURCE, id))
}

fn scan_in<R: Record>(
    table: &impl ReadableTable<u128, &'static [u8]>,
) -> Result<Vec<R>, BiositeError> {
    let mut rows = Vec::new();
    for entry in table.iter().map_err(io)? {
        let (_, value) = entry.map_err(io)?;
        rows.push(decode(value.value())?);
    }
    Ok(rows)
}

fn put<R: Record>(table: &mut Table<'_, u128, &'static [u8]>, record: &R) -> Result<(), BiositeError> {
    let bytes = encode(record)?;
    table
        .insert(record.id().as_u128(), bytes.as_slice())
        .map_err(io)?;
    Ok(())
}

fn event_terms(event: &Event) -> BTreeMap<String, u32> {
    weighted_terms([
        (Some(event.title.as_str()), TITLE_WEIGHT),
        (event.description.as_deref(), BODY_WEIGHT),
        (event.location.as_deref(), BODY_WEIGHT),
    ])
}

fn index_event(
    terms: &mut Table<'_, (&'static str, u128), u32>,
    event: &Event,
) -> Result<(), BiositeError> {
    for (term, weight) in event_terms(event) {
        terms
            .insert((term.as_str(), event.id.as_u128()), weight)
            .map_err(io)?;
    }
    Ok(())
}

fn unindex_event(
    terms: &mut Table<'_, (&'static str, u128), u32>,
    event: &Event,
) -> Result<(), BiositeError> {
    for term in event_terms(event).keys() {
        terms
            .remove((term.as_str(), event.id.as_u128()))
            .map_err(io)?;
    }
    Ok(())
}

/// Newest first, with the id as a stable tiebreak.
fn newest_first(a: (&DateTime<Utc>, &Uuid), b: (&DateTime<Utc>, &Uuid)) -> std::cmp::Ordering {
    b.0.cmp(a.0).then_with(|| a.1.cmp(b.1))
}

// =============================================================================
// PUBLIC SUMMARY TYPES
// =============================================================================

/// Row counts per table, for status and metrics output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub visitors: u64,
    pub achievements: u64,
    pub gallery: u64,
    pub messages: u64,
    pub events: u64,
    pub users: u64,
    pub sessions: u64,
}

/// Every content table, for export. Accounts and sessions are excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub visitors: Vec<Visitor>,
    pub achievements: Vec<Achievement>,
    pub gallery: Vec<GalleryItem>,
    pub messages: Vec<Message>,
    pub events: Vec<Event>,
}

// =============================================================================
// STORE
// =============================================================================

/// The biosite database.
///
/// `Store` is `Send + Sync`; redb serializes writers and gives readers a
/// consistent snapshot, so callers share it behind an `Arc` without a lock.
pub struct Store {
    db: Database,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Open or create a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BiositeError> {
        let db = Database::create(path.as_ref()).map_err(io)?;
        Self::init(db)
    }

    /// Create a volatile database held entirely in memory.
    pub fn in_memory() -> Result<Self, BiositeError> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(io)?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self, BiositeError> {
        let txn = db.begin_write().map_err(io)?;
        for table in [VISITORS, ACHIEVEMENTS, GALLERY, MESSAGES, EVENTS, USERS] {
            txn.open_table(table).map_err(io)?;
        }
        txn.open_table(VISITOR_EMAILS).map_err(io)?;
        txn.open_table(USER_EMAILS).map_err(io)?;
        txn.open_table(VISITOR_MESSAGES).map_err(io)?;
        txn.open_table(EVENT_TERMS).map_err(io)?;
        txn.open_table(SESSIONS).map_err(io)?;
        txn.commit().map_err(io)?;
        Ok(Self { db })
    }

    fn read<T>(
        &self,
        f: impl FnOnce(&ReadTransaction) -> Result<T, BiositeError>,
    ) -> Result<T, BiositeError> {
        let txn = self.db.begin_read().map_err(io)?;
        f(&txn)
    }

    /// Run `f` in a write transaction; commit on `Ok`, abort on `Err`.
    fn write<T>(
        &self,
        f: impl FnOnce(&WriteTransaction) -> Result<T, BiositeError>,
    ) -> Result<T, BiositeError> {
        let txn = self.db.begin_write().map_err(io)?;
        match f(&txn) {
            Ok(value) => {
                txn.commit().map_err(io)?;
                Ok(value)
            }
            Err(e) => {
                txn.abort().map_err(io)?;
                Err(e)
            }
        }
    }

    fn fetch<R: Record>(&self, id: Uuid) -> Result<R, BiositeError> {
        self.read(|txn| {
            let table = txn.open_table(R::TABLE).map_err(io)?;
            require_in(&table, id)
        })
    }

    fn fetch_all<R: Record>(&self) -> Result<Vec<R>, BiositeError> {
        self.read(|txn| {
            let table = txn.open_table(R::TABLE).map_err(io)?;
            scan_in(&table)
        })
    }

    fn insert<R: Record>(&self, record: R) -> Result<R, BiositeError> {
        self.write(|txn| {
            let mut table = txn.open_table(R::TABLE).map_err(io)?;
            put(&mut table, &record)
        })?;
        Ok(record)
    }

    fn modify<R: Record>(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut R),
    ) -> Result<R, BiositeError> {
        self.write(|txn| {
            let mut table = txn.open_table(R::TABLE).map_err(io)?;
            let mut record: R = require_in(&table, id)?;
            apply(&mut record);
            record.touch(Utc::now());
            put(&mut table, &record)?;
            Ok(record)
        })
    }

    fn remove<R: Record>(&self, id: Uuid) -> Result<R, BiositeError> {
        self.write(|txn| {
            let mut table = txn.open_table(R::TABLE).map_err(io)?;
            let removed = table
                .remove(id.as_u128())
                .map_err(io)?
                .map(|guard| decode::<R>(guard.value()))
                .transpose()?;
            removed.ok_or_else(|| BiositeError::not_found(R::RESOURCE, id))
        })
    }

    // =========================================================================
    // VISITORS
    // =========================================================================

    /// Insert `form` as a new visitor, or refresh the visitor with that email.
    ///
    /// Returns the visitor and whether it was newly created. An existing
    /// visitor keeps its original `subscribed_at`.
    fn upsert_visitor_in(
        txn: &WriteTransaction,
        form: &NewVisitor,
        subscribe: bool,
        now: DateTime<Utc>,
    ) -> Result<(Visitor, bool), BiositeError> {
        let mut emails = txn.open_table(VISITOR_EMAILS).map_err(io)?;
        let mut visitors = txn.open_table(VISITORS).map_err(io)?;

        let existing = emails
            .get(form.email.as_str())
            .map_err(io)?
            .map(|guard| Uuid::from_u128(guard.value()));

        if let Some(id) = existing {
            let mut visitor: Visitor = get_in(&visitors, id)?.ok_or_else(|| {
                BiositeError::IoError(format!("email index points at missing visitor {id}"))
            })?;
            if form.name.is_some() {
                visitor.name.clone_from(&form.name);
            }
            if subscribe && visitor.subscribed_at.is_none() {
                visitor.subscribed_at = Some(now);
            }
            visitor.touch(now);
            put(&mut visitors, &visitor)?;
            return Ok((visitor, false));
        }

        let visitor = Visitor {
            id: Uuid::new_v4(),
            email: form.email.clone(),
            name: form.name.clone(),
            subscribed_at: subscribe.then_some(now),
            created_at: now,
            updated_at: now,
        };
        emails
            .insert(visitor.email.as_str(), visitor.id.as_u128())
            .map_err(io)?;
        put(&mut visitors, &visitor)?;
        Ok((visitor, true))
    }

    /// Subscribe an email to updates, creating the visitor if needed.
    ///
    /// Returns the visitor and `true` if it was newly created.
    pub fn subscribe(&self, form: NewVisitor) -> Result<(Visitor, bool), BiositeError> {
        let form = form.validate()?;
        self.write(|txn| Self::upsert_visitor_in(txn, &form, true, Utc::now()))
    }

    pub fn get_visitor(&self, id: Uuid) -> Result<Visitor, BiositeError> {
        self.fetch(id)
    }

    /// Visitors, newest first.
    pub fn list_visitors(&self, page: Page) -> Result<Listing<Visitor>, BiositeError> {
        let mut rows: Vec<Visitor> = self.fetch_all()?;
        rows.sort_by(|a, b| newest_first((&a.created_at, &a.id), (&b.created_at, &b.id)));
        Ok(page.apply(rows))
    }

    /// Apply `patch` to a visitor. Changing the email re-checks uniqueness.
    pub fn update_visitor(&self, id: Uuid, patch: VisitorPatch) -> Result<Visitor, BiositeError> {
        let patch = patch.validate()?;
        self.write(|txn| {
            let mut visitors = txn.open_table(VISITORS).map_err(io)?;
            let mut emails = txn.open_table(VISITOR_EMAILS).map_err(io)?;
            let mut visitor: Visitor = require_in(&visitors, id)?;

            if let Some(email) = patch.email
                && email != visitor.email
            {
                let owner = emails
                    .get(email.as_str())
                    .map_err(io)?
                    .map(|guard| guard.value());
                if owner.is_some() {
                    return Err(BiositeError::Conflict(format!(
                        "a visitor with email {email} already exists"
                    )));
                }
                emails.remove(visitor.email.as_str()).map_err(io)?;
                emails.insert(email.as_str(), id.as_u128()).map_err(io)?;
                visitor.email = email;
            }
            if let Some(name) = patch.name {
                visitor.name = name;
            }
            if let Some(subscribed_at) = patch.subscribed_at {
                visitor.subscribed_at = subscribed_at;
            }
            visitor.touch(Utc::now());
            put(&mut visitors, &visitor)?;
            Ok(visitor)
        })
    }

    /// Delete a visitor and, by cascade, every message they sent.
    ///
    /// Returns the number of messages removed with the visitor.
    pub fn delete_visitor(&self, id: Uuid) -> Result<usize, BiositeError> {
        self.write(|txn| {
            let mut visitors = txn.open_table(VISITORS).map_err(io)?;
            let visitor: Visitor = require_in(&visitors, id)?;

            let mut links = txn.open_table(VISITOR_MESSAGES).map_err(io)?;
            let mut message_ids = Vec::new();
            for entry in links
                .range((id.as_u128(), 0u128)..=(id.as_u128(), u128::MAX))
                .map_err(io)?
            {
                let (key, _) = entry.map_err(io)?;
                message_ids.push(key.value().1);
            }

            let mut messages = txn.open_table(MESSAGES).map_err(io)?;
            for message_id in &message_ids {
                messages.remove(*message_id).map_err(io)?;
                links.remove((id.as_u128(), *message_id)).map_err(io)?;
            }

            let mut emails = txn.open_table(VISITOR_EMAILS).map_err(io)?;
            emails.remove(visitor.email.as_str()).map_err(io)?;
            visitors.remove(id.as_u128()).map_err(io)?;
            Ok(message_ids.len())
        })
    }

    // =========================================================================
    // MESSAGES
    // =========================================================================

    /// Store a message for `visitor_id`; the visitor must exist.
    fn insert_message_in(
        txn: &WriteTransaction,
        visitor_id: Uuid,
        subject: Option<String>,
        content: String,
        now: DateTime<Utc>,
    ) -> Result<Message, BiositeError> {
        {
            let visitors = txn.open_table(VISITORS).map_err(io)?;
            if get_in::<Visitor>(&visitors, visitor_id)?.is_none() {
                return Err(BiositeError::not_found("visitor", visitor_id));
            }
        }
        let message = Message {
            id: Uuid::new_v4(),
            visitor_id,
            subject,
            content,
            created_at: now,
            updated_at: now,
        };
        let mut messages = txn.open_table(MESSAGES).map_err(io)?;
        put(&mut messages, &message)?;
        let mut links = txn.open_table(VISITOR_MESSAGES).map_err(io)?;
        links
            .insert((message.visitor_id.as_u128(), message.id.as_u128()), ())
            .map_err(io)?;
        Ok(message)
    }

    /// Handle a contact-form submission in one transaction: find or create
    /// the visitor by email, then store the message.
    pub fn submit_contact(&self, form: ContactForm) -> Result<(Visitor, Message), BiositeError> {
        let form = form.validate()?;
        self.write(|txn| {
            let now = Utc::now();
            let visitor_form = NewVisitor {
                email: form.email,
                name: form.name,
            };
            let (visitor, _) = Self::upsert_visitor_in(txn, &visitor_form, false, now)?;
            let message =
                Self::insert_message_in(txn, visitor.id, form.subject, form.content, now)?;
            Ok((visitor, message))
        })
    }

    pub fn get_message(&self, id: Uuid) -> Result<Message, BiositeError> {
        self.fetch(id)
    }

    /// Messages, newest first, optionally restricted to one visitor.
    ///
    /// Filtering by an unknown visitor is `NotFound`, not an empty page.
    pub fn list_messages(
        &self,
        filter: &MessageFilter,
        page: Page,
    ) -> Result<Listing<Message>, BiositeError> {
        let mut rows: Vec<Message> = match filter.visitor_id {
            None => self.fetch_all()?,
            Some(visitor_id) => self.read(|txn| {
                let visitors = txn.open_table(VISITORS).map_err(io)?;
                require_in::<Visitor>(&visitors, visitor_id)?;

                let links = txn.open_table(VISITOR_MESSAGES).map_err(io)?;
                let messages = txn.open_table(MESSAGES).map_err(io)?;
                let mut rows = Vec::new();
                for entry in links
                    .range((visitor_id.as_u128(), 0u128)..=(visitor_id.as_u128(), u128::MAX))
                    .map_err(io)?
                {
                    let (key, _) = entry.map_err(io)?;
                    let message_id = Uuid::from_u128(key.value().1);
                    if let Some(message) = get_in(&messages, message_id)? {
                        rows.push(message);
                    }
                }
                Ok(rows)
            })?,
        };
        rows.sort_by(|a, b| newest_first((&a.created_at, &a.id), (&b.created_at, &b.id)));
        Ok(page.apply(rows))
    }

    pub fn delete_message(&self, id: Uuid) -> Result<(), BiositeError> {
        self.write(|txn| {
            let mut messages = txn.open_table(MESSAGES).map_err(io)?;
            let message: Message = require_in(&messages, id)?;
            messages.remove(id.as_u128()).map_err(io)?;
            let mut links = txn.open_table(VISITOR_MESSAGES).map_err(io)?;
            links
                .remove((message.visitor_id.as_u128(), id.as_u128()))
                .map_err(io)?;
            Ok(())
        })
    }

    // =========================================================================
    // ACHIEVEMENTS
    // =========================================================================

    pub fn create_achievement(&self, form: NewAchievement) -> Result<Achievement, BiositeError> {
        let form = form.validate()?;
        let now = Utc::now();
        self.insert(Achievement {
            id: Uuid::new_v4(),
            title: form.title,
            year: form.year,
            description: form.description,
            category: form.category,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_achievement(&self, id: Uuid) -> Result<Achievement, BiositeError> {
        self.fetch(id)
    }

    /// Achievements by year (newest first, undated last), then creation time.
    pub fn list_achievements(
        &self,
        filter: &AchievementFilter,
        page: Page,
    ) -> Result<Listing<Achievement>, BiositeError> {
        let category = filter.category.as_deref().map(str::to_lowercase);
        let mut rows: Vec<Achievement> = self
            .fetch_all::<Achievement>()?
            .into_iter()
            .filter(|a| filter.year.is_none_or(|year| a.year == Some(year)))
            .filter(|a| match &category {
                None => true,
                Some(wanted) => a
                    .category
                    .as_deref()
                    .is_some_and(|c| c.to_lowercase() == *wanted),
            })
            .collect();
        rows.sort_by(|a, b| {
            b.year
                .cmp(&a.year)
                .then_with(|| newest_first((&a.created_at, &a.id), (&b.created_at, &b.id)))
        });
        Ok(page.apply(rows))
    }

    pub fn update_achievement(
        &self,
        id: Uuid,
        patch: AchievementPatch,
    ) -> Result<Achievement, BiositeError> {
        let patch = patch.validate()?;
        self.modify(id, |a: &mut Achievement| {
            if let Some(title) = patch.title {
                a.title = title;
            }
            if let Some(year) = patch.year {
                a.year = year;
            }
            if let Some(description) = patch.description {
                a.description = description;
            }
            if let Some(category) = patch.category {
                a.category = category;
            }
        })
    }

    pub fn delete_achievement(&self, id: Uuid) -> Result<(), BiositeError> {
        self.remove::<Achievement>(id).map(|_| ())
    }

    // =========================================================================
    // GALLERY
    // =========================================================================

    pub fn create_gallery_item(&self, form: NewGalleryItem) -> Result<GalleryItem, BiositeError> {
        let form = form.validate()?;
        let now = Utc::now();
        self.insert(GalleryItem {
            id: Uuid::new_v4(),
            image_url: form.image_url,
            caption: form.caption,
            year: form.year,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_gallery_item(&self, id: Uuid) -> Result<GalleryItem, BiositeError> {
        self.fetch(id)
    }

    /// Gallery items by year (newest first, undated last), then creation time.
    pub fn list_gallery(
        &self,
        filter: &GalleryFilter,
        page: Page,
    ) -> Result<Listing<GalleryItem>, BiositeError> {
        let mut rows: Vec<GalleryItem> = self
            .fetch_all::<GalleryItem>()?
            .into_iter()
            .filter(|g| filter.year.is_none_or(|year| g.year == Some(year)))
            .collect();
        rows.sort_by(|a, b| {
            b.year
                .cmp(&a.year)
                .then_with(|| newest_first((&a.created_at, &a.id), (&b.created_at, &b.id)))
        });
        Ok(page.apply(rows))
    }

    pub fn update_gallery_item(
        &self,
        id: Uuid,
        patch: GalleryItemPatch,
    ) -> Result<GalleryItem, BiositeError> {
        let patch = patch.validate()?;
        self.modify(id, |g: &mut GalleryItem| {
            if let Some(image_url) = patch.image_url {
                g.image_url = image_url;
            }
            if let Some(caption) = patch.caption {
                g.caption = caption;
            }
            if let Some(year) = patch.year {
                g.year = year;
            }
        })
    }

    pub fn delete_gallery_item(&self, id: Uuid) -> Result<(), BiositeError> {
        self.remove::<GalleryItem>(id).map(|_| ())
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    pub fn create_event(&self, form: NewEvent) -> Result<Event, BiositeError> {
        let form = form.validate()?;
        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            title: form.title,
            description: form.description,
            location: form.location,
            event_date: form.event_date,
            media_url: form.media_url,
            created_at: now,
            updated_at: now,
        };
        self.write(|txn| {
            let mut events = txn.open_table(EVENTS).map_err(io)?;
            put(&mut events, &event)?;
            let mut terms = txn.open_table(EVENT_TERMS).map_err(io)?;
            index_event(&mut terms, &event)
        })?;
        Ok(event)
    }

    pub fn get_event(&self, id: Uuid) -> Result<Event, BiositeError> {
        self.fetch(id)
    }

    /// Events by date (most recent first, undated last), then creation time.
    pub fn list_events(&self, page: Page) -> Result<Listing<Event>, BiositeError> {
        let mut rows: Vec<Event> = self.fetch_all()?;
        rows.sort_by(|a, b| {
            b.event_date
                .cmp(&a.event_date)
                .then_with(|| newest_first((&a.created_at, &a.id), (&b.created_at, &b.id)))
        });
        Ok(page.apply(rows))
    }

    pub fn update_event(&self, id: Uuid, patch: EventPatch) -> Result<Event, BiositeError> {
        let patch = patch.validate()?;
        self.write(|txn| {
            let mut events = txn.open_table(EVENTS).map_err(io)?;
            let mut terms = txn.open_table(EVENT_TERMS).map_err(io)?;
            let mut event: Event = require_in(&events, id)?;
            unindex_event(&mut terms, &event)?;

            if let Some(title) = patch.title {
                event.title = title;
            }
            if let Some(description) = patch.description {
                event.description = description;
            }
            if let Some(location) = patch.location {
                event.location = location;
            }
            if let Some(event_date) = patch.event_date {
                event.event_date = event_date;
            }
            if let Some(media_url) = patch.media_url {
                event.media_url = media_url;
            }
            event.touch(Utc::now());

            put(&mut events, &event)?;
            index_event(&mut terms, &event)?;
            Ok(event)
        })
    }

    pub fn delete_event(&self, id: Uuid) -> Result<(), BiositeError> {
        self.write(|txn| {
            let mut events = txn.open_table(EVENTS).map_err(io)?;
            let event: Event = require_in(&events, id)?;
            events.remove(id.as_u128()).map_err(io)?;
            let mut terms = txn.open_table(EVENT_TERMS).map_err(io)?;
            unindex_event(&mut terms, &event)
        })
    }

    /// Full-text search over event title, description and location.
    ///
    /// Every query term must match; the last one matches as a prefix.
    /// Results are ordered by score, then by event date.
    pub fn search_events(
        &self,
        input: &str,
        page: Page,
    ) -> Result<Listing<EventMatch>, BiositeError> {
        let Some(query) = SearchQuery::parse(input) else {
            return Ok(page.apply(Vec::new()));
        };
        let required = query.term_count();

        let mut hits = self.read(|txn| {
            let terms = txn.open_table(EVENT_TERMS).map_err(io)?;
            // event id -> (terms matched, score)
            let mut scores: BTreeMap<u128, (usize, u32)> = BTreeMap::new();

            for term in &query.exact {
                for entry in terms
                    .range((term.as_str(), 0u128)..=(term.as_str(), u128::MAX))
                    .map_err(io)?
                {
                    let (key, weight) = entry.map_err(io)?;
                    let score = scores.entry(key.value().1).or_insert((0, 0));
                    score.0 += 1;
                    score.1 = score.1.saturating_add(weight.value());
                }
            }

            if let Some(prefix) = &query.prefix {
                let mut best: BTreeMap<u128, u32> = BTreeMap::new();
                for entry in terms.range((prefix.as_str(), 0u128)..).map_err(io)? {
                    let (key, weight) = entry.map_err(io)?;
                    let (term, id) = key.value();
                    if !term.starts_with(prefix.as_str()) {
                        break;
                    }
                    let slot = best.entry(id).or_insert(0);
                    *slot = (*slot).max(weight.value());
                }
                for (id, weight) in best {
                    let score = scores.entry(id).or_insert((0, 0));
                    score.0 += 1;
                    score.1 = score.1.saturating_add(weight);
                }
            }

            let events = txn.open_table(EVENTS).map_err(io)?;
            let mut hits = Vec::new();
            for (id, (matched, score)) in scores {
                if matched < required {
                    continue;
                }
                if let Some(event) = get_in::<Event>(&events, Uuid::from_u128(id))? {
                    hits.push(EventMatch { score, event });
                }
            }
            Ok(hits)
        })?;

        hits.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| b.event.event_date.cmp(&a.event.event_date))
                .then_with(|| a.event.id.cmp(&b.event.id))
        });
        Ok(page.apply(hits))
    }

    // =========================================================================
    // USERS & SESSIONS
    // =========================================================================

    /// Create an account. `email` must already be normalized.
    pub fn create_user(
        &self,
        email: &str,
        name: Option<String>,
        password_hash: String,
    ) -> Result<User, BiositeError> {
        self.write(|txn| {
            let mut emails = txn.open_table(USER_EMAILS).map_err(io)?;
            if emails.get(email).map_err(io)?.is_some() {
                return Err(BiositeError::Conflict(format!(
                    "an account with email {email} already exists"
                )));
            }
            let now = Utc::now();
            let user = User {
                id: Uuid::new_v4(),
                email: email.to_string(),
                name,
                password_hash,
                created_at: now,
                updated_at: now,
            };
            emails
                .insert(user.email.as_str(), user.id.as_u128())
                .map_err(io)?;
            let mut users = txn.open_table(USERS).map_err(io)?;
            put(&mut users, &user)?;
            Ok(user)
        })
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>, BiositeError> {
        self.read(|txn| {
            let emails = txn.open_table(USER_EMAILS).map_err(io)?;
            let Some(id) = emails
                .get(email)
                .map_err(io)?
                .map(|guard| Uuid::from_u128(guard.value()))
            else {
                return Ok(None);
            };
            let users = txn.open_table(USERS).map_err(io)?;
            get_in(&users, id)
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<User, BiositeError> {
        self.fetch(id)
    }

    /// Persist a session under the digest of its bearer token.
    pub fn create_session(
        &self,
        digest: &str,
        session: &SessionRecord,
    ) -> Result<(), BiositeError> {
        let bytes = encode(session)?;
        self.write(|txn| {
            let mut sessions = txn.open_table(SESSIONS).map_err(io)?;
            sessions.insert(digest, bytes.as_slice()).map_err(io)?;
            Ok(())
        })
    }

    /// Resolve a token digest to its user.
    ///
    /// Unknown, expired, or orphaned sessions are `Unauthenticated`;
    /// an expired session is deleted on the way out.
    pub fn resolve_session(&self, digest: &str, now: DateTime<Utc>) -> Result<User, BiositeError> {
        let session: Option<SessionRecord> = self.read(|txn| {
            let sessions = txn.open_table(SESSIONS).map_err(io)?;
            sessions
                .get(digest)
                .map_err(io)?
                .map(|guard| decode(guard.value()))
                .transpose()
        })?;

        let Some(session) = session else {
            return Err(BiositeError::Unauthenticated);
        };
        if !session.is_active(now) {
            self.revoke_session(digest)?;
            return Err(BiositeError::Unauthenticated);
        }
        match self.get_user(session.user_id) {
            Ok(user) => Ok(user),
            Err(BiositeError::NotFound { .. }) => Err(BiositeError::Unauthenticated),
            Err(e) => Err(e),
        }
    }

    /// Delete a session. Returns `false` if it did not exist.
    pub fn revoke_session(&self, digest: &str) -> Result<bool, BiositeError> {
        self.write(|txn| {
            let mut sessions = txn.open_table(SESSIONS).map_err(io)?;
            let removed = sessions.remove(digest).map_err(io)?.is_some();
            Ok(removed)
        })
    }

    /// Delete every session expired at `now`. Returns how many were removed.
    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<usize, BiositeError> {
        self.write(|txn| {
            let mut sessions = txn.open_table(SESSIONS).map_err(io)?;
            let mut expired = Vec::new();
            for entry in sessions.iter().map_err(io)? {
                let (key, value) = entry.map_err(io)?;
                let session: SessionRecord = decode(value.value())?;
                if !session.is_active(now) {
                    expired.push(key.value().to_string());
                }
            }
            for digest in &expired {
                sessions.remove(digest.as_str()).map_err(io)?;
            }
            Ok(expired.len())
        })
    }

    // =========================================================================
    // STATUS & EXPORT
    // =========================================================================

    pub fn counts(&self) -> Result<TableCounts, BiositeError> {
        self.read(|txn| {
            let len = |def: TableDefinition<'static, u128, &'static [u8]>| {
                txn.open_table(def).map_err(io)?.len().map_err(io)
            };
            let sessions = txn.open_table(SESSIONS).map_err(io)?.len().map_err(io)?;
            Ok(TableCounts {
                visitors: len(VISITORS)?,
                achievements: len(ACHIEVEMENTS)?,
                gallery: len(GALLERY)?,
                messages: len(MESSAGES)?,
                events: len(EVENTS)?,
                users: len(USERS)?,
                sessions,
            })
        })
    }

    /// Read every content table in one consistent snapshot.
    pub fn snapshot(&self) -> Result<Snapshot, BiositeError> {
        self.read(|txn| {
            Ok(Snapshot {
                visitors: scan_in(&txn.open_table(VISITORS).map_err(io)?)?,
                achievements: scan_in(&txn.open_table(ACHIEVEMENTS).map_err(io)?)?,
                gallery: scan_in(&txn.open_table(GALLERY).map_err(io)?)?,
                messages: scan_in(&txn.open_table(MESSAGES).map_err(io)?)?,
                events: scan_in(&txn.open_table(EVENTS).map_err(io)?)?,
            })
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use tempfile::tempdir;

    fn store() -> Store {
        Store::in_memory().expect("in-memory store")
    }

    fn visitor_form(email: &str) -> NewVisitor {
        NewVisitor {
            email: email.to_string(),
            name: None,
        }
    }

    fn visitor_emails(store: &Store) -> Vec<String> {
        store
            .list_visitors(Page::default())
            .expect("list visitors")
            .items
            .into_iter()
            .map(|v| v.email)
            .collect()
    }

    #[test]
    fn visitor_email_is_unique_case_insensitively() {
        let store = store();
        let (first, _) = store
            .subscribe(visitor_form("ada@example.com"))
            .expect("first");
        let (visitor, _) = store
            .submit_contact(ContactForm {
                email: "ADA@example.com".into(),
                content: "hello".into(),
                ..Default::default()
            })
            .expect("contact");
        assert_eq!(visitor.id, first.id);
        assert_eq!(visitor_emails(&store), vec!["ada@example.com"]);
    }

    #[test]
    fn subscribe_is_idempotent_and_keeps_first_opt_in() {
        let store = store();
        let (first, created) = store
            .subscribe(visitor_form("ada@example.com"))
            .expect("subscribe");
        assert!(created);
        assert!(first.subscribed_at.is_some());

        let (again, created) = store
            .subscribe(NewVisitor {
                email: "Ada@Example.com".into(),
                name: Some("Ada".into()),
            })
            .expect("resubscribe");
        assert!(!created);
        assert_eq!(again.id, first.id);
        assert_eq!(again.subscribed_at, first.subscribed_at);
        assert_eq!(again.name.as_deref(), Some("Ada"));
        assert!(again.updated_at >= first.updated_at);
    }

    #[test]
    fn message_requires_existing_visitor() {
        let store = store();
        let err = store
            .write(|txn| {
                Store::insert_message_in(txn, Uuid::new_v4(), None, "hi".into(), Utc::now())
            })
            .expect_err("dangling visitor");
        assert!(matches!(err, BiositeError::NotFound { resource: "visitor", .. }));
        assert_eq!(store.counts().expect("counts").messages, 0);
    }

    #[test]
    fn deleting_visitor_cascades_to_messages() {
        let store = store();
        let (visitor, _) = store
            .submit_contact(ContactForm {
                email: "grace@example.com".into(),
                content: "first".into(),
                ..Default::default()
            })
            .expect("contact");
        store
            .submit_contact(ContactForm {
                email: "grace@example.com".into(),
                content: "second".into(),
                ..Default::default()
            })
            .expect("contact again");
        let (other, _) = store
            .submit_contact(ContactForm {
                email: "alan@example.com".into(),
                content: "unrelated".into(),
                ..Default::default()
            })
            .expect("other contact");

        assert_eq!(store.delete_visitor(visitor.id).expect("delete"), 2);
        let counts = store.counts().expect("counts");
        assert_eq!(counts.visitors, 1);
        assert_eq!(counts.messages, 1);
        assert_eq!(visitor_emails(&store), vec!["alan@example.com"]);
        let remaining = store
            .list_messages(
                &MessageFilter {
                    visitor_id: Some(other.id),
                },
                Page::default(),
            )
            .expect("list");
        assert_eq!(remaining.total, 1);
    }

    #[test]
    fn contact_reuses_visitor_by_email() {
        let store = store();
        let (a, _) = store
            .submit_contact(ContactForm {
                email: "ada@example.com".into(),
                content: "one".into(),
                ..Default::default()
            })
            .expect("first");
        let (b, _) = store
            .submit_contact(ContactForm {
                email: "ADA@example.com".into(),
                content: "two".into(),
                ..Default::default()
            })
            .expect("second");
        assert_eq!(a.id, b.id);
        assert!(b.subscribed_at.is_none());
    }

    #[test]
    fn visitor_email_change_moves_index() {
        let store = store();
        let (ada, _) = store
            .subscribe(visitor_form("ada@example.com"))
            .expect("ada");
        store
            .subscribe(visitor_form("alan@example.com"))
            .expect("alan");

        let err = store
            .update_visitor(
                ada.id,
                VisitorPatch {
                    email: Some("alan@example.com".into()),
                    ..Default::default()
                },
            )
            .expect_err("taken");
        assert!(matches!(err, BiositeError::Conflict(_)));

        store
            .update_visitor(
                ada.id,
                VisitorPatch {
                    email: Some("lovelace@example.com".into()),
                    ..Default::default()
                },
            )
            .expect("rename");
        let mut emails = visitor_emails(&store);
        emails.sort();
        assert_eq!(emails, vec!["alan@example.com", "lovelace@example.com"]);
        // the old address is free again
        let (reused, created) = store
            .subscribe(visitor_form("ada@example.com"))
            .expect("reuse old email");
        assert!(created);
        assert_ne!(reused.id, ada.id);
    }

    #[test]
    fn update_refreshes_updated_at_only() {
        let store = store();
        let created = store
            .create_achievement(NewAchievement {
                title: "Prize".into(),
                ..Default::default()
            })
            .expect("create");
        let updated = store
            .update_achievement(
                created.id,
                AchievementPatch {
                    year: Some(Some(1998)),
                    ..Default::default()
                },
            )
            .expect("update");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(updated.title, "Prize");
        assert_eq!(updated.year, Some(1998));
    }

    #[test]
    fn invalid_patch_leaves_row_untouched() {
        let store = store();
        let item = store
            .create_gallery_item(NewGalleryItem {
                image_url: "/img/a.jpg".into(),
                caption: Some("Studio".into()),
                year: Some(2010),
            })
            .expect("create");
        let err = store
            .update_gallery_item(
                item.id,
                GalleryItemPatch {
                    image_url: Some("not a url".into()),
                    ..Default::default()
                },
            )
            .expect_err("invalid");
        assert!(matches!(err, BiositeError::Validation(_)));
        assert_eq!(store.get_gallery_item(item.id).expect("get"), item);
    }

    #[test]
    fn achievements_order_by_year_then_recency() {
        let store = store();
        for (title, year) in [("a", Some(2001)), ("b", None), ("c", Some(2019))] {
            store
                .create_achievement(NewAchievement {
                    title: title.into(),
                    year,
                    category: Some("Award".into()),
                    ..Default::default()
                })
                .expect("create");
        }
        let listing = store
            .list_achievements(&AchievementFilter::default(), Page::default())
            .expect("list");
        let titles: Vec<_> = listing.items.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["c", "a", "b"]);

        let filtered = store
            .list_achievements(
                &AchievementFilter {
                    category: Some("award".into()),
                    year: Some(2001),
                },
                Page::default(),
            )
            .expect("filtered");
        assert_eq!(filtered.total, 1);
        assert_eq!(filtered.items[0].title, "a");
    }

    #[test]
    fn missing_rows_are_not_found() {
        let store = store();
        let id = Uuid::new_v4();
        assert!(matches!(
            store.get_achievement(id),
            Err(BiositeError::NotFound { .. })
        ));
        assert!(matches!(
            store.delete_gallery_item(id),
            Err(BiositeError::NotFound { .. })
        ));
        assert!(matches!(
            store.update_event(id, EventPatch::default()),
            Err(BiositeError::NotFound { .. })
        ));
    }

    fn event(store: &Store, title: &str, description: &str, date: Option<(i32, u32, u32)>) -> Event {
        store
            .create_event(NewEvent {
                title: title.into(),
                description: Some(description.into()),
                event_date: date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
                ..Default::default()
            })
            .expect("create event")
    }

    #[test]
    fn search_requires_every_term_and_ranks_title_hits() {
        let store = store();
        let keynote = event(&store, "Jazz keynote", "A talk about improvisation", None);
        let concert = event(&store, "Evening concert", "Jazz quartet and keynote guests", None);
        event(&store, "Jazz brunch", "Food and music", None);

        let listing = store
            .search_events("jazz keynote", Page::default())
            .expect("search");
        let ids: Vec<_> = listing.items.iter().map(|m| m.event.id).collect();
        assert_eq!(ids, vec![keynote.id, concert.id]);
        assert!(listing.items[0].score > listing.items[1].score);
    }

    #[test]
    fn search_prefix_matches_last_term() {
        let store = store();
        let festival = event(&store, "Festival appearance", "Main stage", Some((2023, 7, 1)));
        let listing = store
            .search_events("festiv", Page::default())
            .expect("search");
        assert_eq!(listing.total, 1);
        assert_eq!(listing.items[0].event.id, festival.id);
        assert!(
            store
                .search_events("fest stage", Page::default())
                .expect("search")
                .items
                .is_empty()
        );
    }

    #[test]
    fn search_index_follows_updates_and_deletes() {
        let store = store();
        let talk = event(&store, "Lisbon talk", "Conference", None);
        store
            .update_event(
                talk.id,
                EventPatch {
                    title: Some("Porto talk".into()),
                    ..Default::default()
                },
            )
            .expect("update");
        assert_eq!(
            store
                .search_events("lisbon", Page::default())
                .expect("old term")
                .total,
            0
        );
        assert_eq!(
            store
                .search_events("porto", Page::default())
                .expect("new term")
                .total,
            1
        );

        store.delete_event(talk.id).expect("delete");
        assert_eq!(
            store
                .search_events("porto", Page::default())
                .expect("after delete")
                .total,
            0
        );
    }

    #[test]
    fn sessions_expire_and_revoke() {
        let store = store();
        let user = store
            .create_user("ada@example.com", None, "sha256$1$c2FsdA$ZGln".into())
            .expect("user");
        let now = Utc::now();
        store
            .create_session(
                "live",
                &SessionRecord {
                    user_id: user.id,
                    created_at: now,
                    expires_at: now + Duration::hours(1),
                },
            )
            .expect("live");
        store
            .create_session(
                "stale",
                &SessionRecord {
                    user_id: user.id,
                    created_at: now - Duration::hours(2),
                    expires_at: now - Duration::hours(1),
                },
            )
            .expect("stale");

        assert_eq!(store.resolve_session("live", now).expect("resolve").id, user.id);
        assert_eq!(
            store.resolve_session("stale", now),
            Err(BiositeError::Unauthenticated)
        );
        assert_eq!(store.counts().expect("counts").sessions, 1);

        assert!(store.revoke_session("live").expect("revoke"));
        assert!(!store.revoke_session("live").expect("revoke twice"));
        assert_eq!(
            store.resolve_session("live", now),
            Err(BiositeError::Unauthenticated)
        );
    }

    #[test]
    fn purge_removes_only_expired_sessions() {
        let store = store();
        let now = Utc::now();
        for (digest, offset) in [("a", -1), ("b", 1), ("c", -5)] {
            store
                .create_session(
                    digest,
                    &SessionRecord {
                        user_id: Uuid::new_v4(),
                        created_at: now,
                        expires_at: now + Duration::hours(offset),
                    },
                )
                .expect("session");
        }
        assert_eq!(store.purge_expired_sessions(now).expect("purge"), 2);
        assert_eq!(store.counts().expect("counts").sessions, 1);
    }

    #[test]
    fn user_email_is_unique() {
        let store = store();
        store
            .create_user("ada@example.com", None, "x".into())
            .expect("first");
        assert!(matches!(
            store.create_user("ada@example.com", None, "y".into()),
            Err(BiositeError::Conflict(_))
        ));
    }

    #[test]
    fn data_survives_reopen() {
        let temp = tempdir().expect("temp dir");
        let path = temp.path().join("site.redb");
        let id = {
            let store = Store::open(&path).expect("open");
            store
                .create_achievement(NewAchievement {
                    title: "Persisted".into(),
                    ..Default::default()
                })
                .expect("create")
                .id
        };
        let store = Store::open(&path).expect("reopen");
        assert_eq!(store.get_achievement(id).expect("get").title, "Persisted");
    }

    #[test]
    fn snapshot_covers_content_tables() {
        let store = store();
        store
            .submit_contact(ContactForm {
                email: "ada@example.com".into(),
                content: "hello".into(),
                ..Default::default()
            })
            .expect("contact");
        store
            .create_user("admin@example.com", None, "x".into())
            .expect("user");
        let snapshot = store.snapshot().expect("snapshot");
        assert_eq!(snapshot.visitors.len(), 1);
        assert_eq!(snapshot.messages.len(), 1);
        assert!(snapshot.achievements.is_empty());
    }
}

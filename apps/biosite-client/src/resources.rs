//! # Typed Resource Calls
//!
//! One method per REST operation, built on [`ApiClient::request`].
//! Public forms (subscribe, contact, register, login) are validated locally
//! with the server's own rules before anything is sent.

use crate::client::ApiClient;
use crate::error::ClientError;
use biosite_core::{
    Achievement, AchievementFilter, AchievementPatch, ContactForm, Event, EventMatch, EventPatch,
    Form, GalleryFilter, GalleryItem, GalleryItemPatch, Listing, LoginForm, Message, MessageFilter,
    NewAchievement, NewEvent, NewGalleryItem, NewVisitor, Page, RegisterForm, UserProfile,
    Visitor, VisitorPatch,
};
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Body of a successful login or registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub user: UserProfile,
    pub expires_at: DateTime<Utc>,
}

fn to_body<T: Serialize>(value: &T) -> Result<Value, ClientError> {
    serde_json::to_value(value).map_err(|e| ClientError::Decode(e.to_string()))
}

fn page_query(page: Page) -> [(&'static str, Option<String>); 2] {
    [
        ("limit", Some(page.limit.to_string())),
        ("offset", Some(page.offset.to_string())),
    ]
}

impl ApiClient {
    /// GET /health
    pub async fn health(&self) -> Result<Value, ClientError> {
        self.request(Method::GET, "/health", &[], &[], None).await
    }

    // =========================================================================
    // AUTH
    // =========================================================================

    /// POST /auth/register. The returned token is cached by `TokenCapture`.
    pub async fn register(&self, form: RegisterForm) -> Result<AuthSession, ClientError> {
        let form = form.validate()?;
        self.request(Method::POST, "/auth/register", &[], &[], Some(to_body(&form)?))
            .await
    }

    /// POST /auth/login. The returned token is cached by `TokenCapture`.
    pub async fn login(&self, form: LoginForm) -> Result<AuthSession, ClientError> {
        let form = form.validate()?;
        self.request(Method::POST, "/auth/login", &[], &[], Some(to_body(&form)?))
            .await
    }

    /// POST /auth/logout
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.request_empty(Method::POST, "/auth/logout", &[], &[], None)
            .await
    }

    /// GET /auth/me
    pub async fn me(&self) -> Result<UserProfile, ClientError> {
        self.request(Method::GET, "/auth/me", &[], &[], None).await
    }

    // =========================================================================
    // ACHIEVEMENTS
    // =========================================================================

    pub async fn list_achievements(
        &self,
        filter: &AchievementFilter,
        page: Page,
    ) -> Result<Listing<Achievement>, ClientError> {
        let [limit, offset] = page_query(page);
        let query = [
            ("category", filter.category.clone()),
            ("year", filter.year.map(|y| y.to_string())),
            limit,
            offset,
        ];
        self.request(Method::GET, "/achievements", &[], &query, None)
            .await
    }

    pub async fn get_achievement(&self, id: Uuid) -> Result<Achievement, ClientError> {
        let id = id.to_string();
        self.request(Method::GET, "/achievements/{id}", &[("id", &id)], &[], None)
            .await
    }

    pub async fn create_achievement(
        &self,
        form: &NewAchievement,
    ) -> Result<Achievement, ClientError> {
        self.request(Method::POST, "/achievements", &[], &[], Some(to_body(form)?))
            .await
    }

    pub async fn update_achievement(
        &self,
        id: Uuid,
        patch: &AchievementPatch,
    ) -> Result<Achievement, ClientError> {
        let id = id.to_string();
        let body = Some(to_body(patch)?);
        self.request(Method::PATCH, "/achievements/{id}", &[("id", &id)], &[], body)
            .await
    }

    pub async fn replace_achievement(
        &self,
        id: Uuid,
        form: &NewAchievement,
    ) -> Result<Achievement, ClientError> {
        let id = id.to_string();
        let body = Some(to_body(form)?);
        self.request(Method::PUT, "/achievements/{id}", &[("id", &id)], &[], body)
            .await
    }

    pub async fn delete_achievement(&self, id: Uuid) -> Result<(), ClientError> {
        let id = id.to_string();
        self.request_empty(Method::DELETE, "/achievements/{id}", &[("id", &id)], &[], None)
            .await
    }

    // =========================================================================
    // GALLERY
    // =========================================================================

    pub async fn list_gallery(
        &self,
        filter: &GalleryFilter,
        page: Page,
    ) -> Result<Listing<GalleryItem>, ClientError> {
        let [limit, offset] = page_query(page);
        let query = [("year", filter.year.map(|y| y.to_string())), limit, offset];
        self.request(Method::GET, "/gallery", &[], &query, None).await
    }

    pub async fn get_gallery_item(&self, id: Uuid) -> Result<GalleryItem, ClientError> {
        let id = id.to_string();
        self.request(Method::GET, "/gallery/{id}", &[("id", &id)], &[], None)
            .await
    }

    pub async fn create_gallery_item(
        &self,
        form: &NewGalleryItem,
    ) -> Result<GalleryItem, ClientError> {
        self.request(Method::POST, "/gallery", &[], &[], Some(to_body(form)?))
            .await
    }

    pub async fn update_gallery_item(
        &self,
        id: Uuid,
        patch: &GalleryItemPatch,
    ) -> Result<GalleryItem, ClientError> {
        let id = id.to_string();
        let body = Some(to_body(patch)?);
        self.request(Method::PATCH, "/gallery/{id}", &[("id", &id)], &[], body)
            .await
    }

    pub async fn replace_gallery_item(
        &self,
        id: Uuid,
        form: &NewGalleryItem,
    ) -> Result<GalleryItem, ClientError> {
        let id = id.to_string();
        let body = Some(to_body(form)?);
        self.request(Method::PUT, "/gallery/{id}", &[("id", &id)], &[], body)
            .await
    }

    pub async fn delete_gallery_item(&self, id: Uuid) -> Result<(), ClientError> {
        let id = id.to_string();
        self.request_empty(Method::DELETE, "/gallery/{id}", &[("id", &id)], &[], None)
            .await
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    pub async fn list_events(&self, page: Page) -> Result<Listing<Event>, ClientError> {
        self.request(Method::GET, "/events", &[], &page_query(page), None)
            .await
    }

    /// GET /events/search?q=
    pub async fn search_events(
        &self,
        q: &str,
        page: Page,
    ) -> Result<Listing<EventMatch>, ClientError> {
        let [limit, offset] = page_query(page);
        let query = [("q", Some(q.to_string())), limit, offset];
        self.request(Method::GET, "/events/search", &[], &query, None)
            .await
    }

    pub async fn get_event(&self, id: Uuid) -> Result<Event, ClientError> {
        let id = id.to_string();
        self.request(Method::GET, "/events/{id}", &[("id", &id)], &[], None)
            .await
    }

    pub async fn create_event(&self, form: &NewEvent) -> Result<Event, ClientError> {
        self.request(Method::POST, "/events", &[], &[], Some(to_body(form)?))
            .await
    }

    pub async fn update_event(&self, id: Uuid, patch: &EventPatch) -> Result<Event, ClientError> {
        let id = id.to_string();
        let body = Some(to_body(patch)?);
        self.request(Method::PATCH, "/events/{id}", &[("id", &id)], &[], body)
            .await
    }

    pub async fn replace_event(&self, id: Uuid, form: &NewEvent) -> Result<Event, ClientError> {
        let id = id.to_string();
        let body = Some(to_body(form)?);
        self.request(Method::PUT, "/events/{id}", &[("id", &id)], &[], body)
            .await
    }

    pub async fn delete_event(&self, id: Uuid) -> Result<(), ClientError> {
        let id = id.to_string();
        self.request_empty(Method::DELETE, "/events/{id}", &[("id", &id)], &[], None)
            .await
    }

    // =========================================================================
    // VISITORS
    // =========================================================================

    /// POST /visitors. Subscribing an existing email returns that visitor.
    pub async fn subscribe(&self, form: NewVisitor) -> Result<Visitor, ClientError> {
        let form = form.validate()?;
        self.request(Method::POST, "/visitors", &[], &[], Some(to_body(&form)?))
            .await
    }

    pub async fn list_visitors(&self, page: Page) -> Result<Listing<Visitor>, ClientError> {
        self.request(Method::GET, "/visitors", &[], &page_query(page), None)
            .await
    }

    pub async fn get_visitor(&self, id: Uuid) -> Result<Visitor, ClientError> {
        let id = id.to_string();
        self.request(Method::GET, "/visitors/{id}", &[("id", &id)], &[], None)
            .await
    }

    pub async fn update_visitor(
        &self,
        id: Uuid,
        patch: &VisitorPatch,
    ) -> Result<Visitor, ClientError> {
        let id = id.to_string();
        let body = Some(to_body(patch)?);
        self.request(Method::PATCH, "/visitors/{id}", &[("id", &id)], &[], body)
            .await
    }

    pub async fn replace_visitor(
        &self,
        id: Uuid,
        form: &NewVisitor,
    ) -> Result<Visitor, ClientError> {
        let id = id.to_string();
        let body = Some(to_body(form)?);
        self.request(Method::PUT, "/visitors/{id}", &[("id", &id)], &[], body)
            .await
    }

    /// DELETE /visitors/{id}. The server also deletes the visitor's messages.
    pub async fn delete_visitor(&self, id: Uuid) -> Result<(), ClientError> {
        let id = id.to_string();
        self.request_empty(Method::DELETE, "/visitors/{id}", &[("id", &id)], &[], None)
            .await
    }

    pub async fn visitor_messages(
        &self,
        id: Uuid,
        page: Page,
    ) -> Result<Listing<Message>, ClientError> {
        let id = id.to_string();
        self.request(
            Method::GET,
            "/visitors/{id}/messages",
            &[("id", &id)],
            &page_query(page),
            None,
        )
        .await
    }

    // =========================================================================
    // MESSAGES
    // =========================================================================

    /// POST /messages: the public contact form.
    pub async fn contact(&self, form: ContactForm) -> Result<Message, ClientError> {
        let form = form.validate()?;
        self.request(Method::POST, "/messages", &[], &[], Some(to_body(&form)?))
            .await
    }

    pub async fn list_messages(
        &self,
        filter: &MessageFilter,
        page: Page,
    ) -> Result<Listing<Message>, ClientError> {
        let [limit, offset] = page_query(page);
        let query = [
            ("visitor_id", filter.visitor_id.map(|id| id.to_string())),
            limit,
            offset,
        ];
        self.request(Method::GET, "/messages", &[], &query, None)
            .await
    }

    pub async fn get_message(&self, id: Uuid) -> Result<Message, ClientError> {
        let id = id.to_string();
        self.request(Method::GET, "/messages/{id}", &[("id", &id)], &[], None)
            .await
    }

    pub async fn delete_message(&self, id: Uuid) -> Result<(), ClientError> {
        let id = id.to_string();
        self.request_empty(Method::DELETE, "/messages/{id}", &[("id", &id)], &[], None)
            .await
    }
}

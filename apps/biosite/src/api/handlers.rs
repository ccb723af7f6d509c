//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.
//!
//! Handlers validate nothing themselves: forms go straight to the store,
//! which validates and normalizes them inside its write transaction.

use super::{
    AppState,
    auth::CurrentUser,
    types::{
        AchievementParams, ApiError, AuthResponse, GalleryParams, HealthResponse, MessageParams,
        PageParams, SearchParams,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use biosite_core::{
    Achievement, AchievementPatch, ContactForm, Event, EventMatch, EventPatch, GalleryItem,
    GalleryItemPatch, Listing, LoginForm, Message, MessageFilter, NewAchievement, NewEvent,
    NewGalleryItem, NewVisitor, Page, RegisterForm, UserProfile, Visitor, VisitorPatch,
};
use uuid::Uuid;

type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// HEALTH & METRICS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Prometheus text exposition of row counts per table.
pub async fn metrics_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let counts = state.with_store(|store| store.counts()).await?;

    let mut body = String::new();
    body.push_str("# HELP biosite_info Build information.\n");
    body.push_str("# TYPE biosite_info gauge\n");
    body.push_str(&format!(
        "biosite_info{{version=\"{}\"}} 1\n",
        env!("CARGO_PKG_VERSION")
    ));
    body.push_str("# HELP biosite_rows Number of stored rows per table.\n");
    body.push_str("# TYPE biosite_rows gauge\n");
    for (table, rows) in [
        ("visitors", counts.visitors),
        ("achievements", counts.achievements),
        ("gallery", counts.gallery),
        ("messages", counts.messages),
        ("events", counts.events),
        ("users", counts.users),
        ("sessions", counts.sessions),
    ] {
        body.push_str(&format!("biosite_rows{{table=\"{table}\"}} {rows}\n"));
    }

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    ))
}

// =============================================================================
// AUTH HANDLERS
// =============================================================================

/// Create an account and return its first session token.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(form): Json<RegisterForm>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    if !state.config.allow_registration {
        tracing::warn!(event = "registration_rejected", "Registration is disabled");
        return Err(ApiError::RegistrationDisabled);
    }
    let auth = state.auth;
    let issued = state
        .with_store(move |store| auth.register(store, form))
        .await?;
    tracing::info!(event = "user_registered", user_id = %issued.user.id);
    Ok((StatusCode::CREATED, Json(issued.into())))
}

pub async fn login_handler(
    State(state): State<AppState>,
    Json(form): Json<LoginForm>,
) -> ApiResult<Json<AuthResponse>> {
    let auth = state.auth;
    let result = state
        .with_store(move |store| auth.login(store, form))
        .await;
    match result {
        Ok(issued) => {
            tracing::info!(event = "user_login", user_id = %issued.user.id);
            Ok(Json(issued.into()))
        }
        Err(e) => {
            if matches!(e, ApiError::Core(biosite_core::BiositeError::InvalidCredentials)) {
                tracing::warn!(
                    event = "auth_failure",
                    reason = "invalid_credentials",
                    "Login failed"
                );
            }
            Err(e)
        }
    }
}

/// Revoke the presented token.
pub async fn logout_handler(
    State(state): State<AppState>,
    current: CurrentUser,
) -> ApiResult<StatusCode> {
    let auth = state.auth;
    let token = current.token;
    state
        .with_store(move |store| auth.logout(store, &token))
        .await?;
    tracing::info!(event = "user_logout", user_id = %current.user.id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me_handler(current: CurrentUser) -> Json<UserProfile> {
    Json(UserProfile::from(&current.user))
}

// =============================================================================
// ACHIEVEMENT HANDLERS
// =============================================================================

pub async fn list_achievements_handler(
    State(state): State<AppState>,
    Query(params): Query<AchievementParams>,
) -> ApiResult<Json<Listing<Achievement>>> {
    let (filter, page) = params.into_parts();
    let listing = state
        .with_store(move |store| store.list_achievements(&filter, page))
        .await?;
    Ok(Json(listing))
}

pub async fn get_achievement_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Achievement>> {
    let item = state
        .with_store(move |store| store.get_achievement(id))
        .await?;
    Ok(Json(item))
}

pub async fn create_achievement_handler(
    State(state): State<AppState>,
    _admin: CurrentUser,
    Json(form): Json<NewAchievement>,
) -> ApiResult<(StatusCode, Json<Achievement>)> {
    let item = state
        .with_store(move |store| store.create_achievement(form))
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_achievement_handler(
    State(state): State<AppState>,
    _admin: CurrentUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<AchievementPatch>,
) -> ApiResult<Json<Achievement>> {
    let item = state
        .with_store(move |store| store.update_achievement(id, patch))
        .await?;
    Ok(Json(item))
}

/// PUT: every column is replaced; omitted optionals are cleared.
pub async fn replace_achievement_handler(
    State(state): State<AppState>,
    _admin: CurrentUser,
    Path(id): Path<Uuid>,
    Json(form): Json<NewAchievement>,
) -> ApiResult<Json<Achievement>> {
    let item = state
        .with_store(move |store| store.update_achievement(id, form.into()))
        .await?;
    Ok(Json(item))
}

pub async fn delete_achievement_handler(
    State(state): State<AppState>,
    _admin: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .with_store(move |store| store.delete_achievement(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// GALLERY HANDLERS
// =============================================================================

pub async fn list_gallery_handler(
    State(state): State<AppState>,
    Query(params): Query<GalleryParams>,
) -> ApiResult<Json<Listing<GalleryItem>>> {
    let (filter, page) = params.into_parts();
    let listing = state
        .with_store(move |store| store.list_gallery(&filter, page))
        .await?;
    Ok(Json(listing))
}

pub async fn get_gallery_item_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<GalleryItem>> {
    let item = state
        .with_store(move |store| store.get_gallery_item(id))
        .await?;
    Ok(Json(item))
}

pub async fn create_gallery_item_handler(
    State(state): State<AppState>,
    _admin: CurrentUser,
    Json(form): Json<NewGalleryItem>,
) -> ApiResult<(StatusCode, Json<GalleryItem>)> {
    let item = state
        .with_store(move |store| store.create_gallery_item(form))
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_gallery_item_handler(
    State(state): State<AppState>,
    _admin: CurrentUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<GalleryItemPatch>,
) -> ApiResult<Json<GalleryItem>> {
    let item = state
        .with_store(move |store| store.update_gallery_item(id, patch))
        .await?;
    Ok(Json(item))
}

pub async fn replace_gallery_item_handler(
    State(state): State<AppState>,
    _admin: CurrentUser,
    Path(id): Path<Uuid>,
    Json(form): Json<NewGalleryItem>,
) -> ApiResult<Json<GalleryItem>> {
    let item = state
        .with_store(move |store| store.update_gallery_item(id, form.into()))
        .await?;
    Ok(Json(item))
}

pub async fn delete_gallery_item_handler(
    State(state): State<AppState>,
    _admin: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .with_store(move |store| store.delete_gallery_item(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// EVENT HANDLERS
// =============================================================================

pub async fn list_events_handler(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Listing<Event>>> {
    let page = params.page();
    let listing = state
        .with_store(move |store| store.list_events(page))
        .await?;
    Ok(Json(listing))
}

/// Ranked full-text search. A query with no searchable terms matches nothing.
pub async fn search_events_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Listing<EventMatch>>> {
    let page = Page::new(params.limit, params.offset);
    let q = params.q;
    let listing = state
        .with_store(move |store| store.search_events(&q, page))
        .await?;
    Ok(Json(listing))
}

pub async fn get_event_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Event>> {
    let event = state.with_store(move |store| store.get_event(id)).await?;
    Ok(Json(event))
}

pub async fn create_event_handler(
    State(state): State<AppState>,
    _admin: CurrentUser,
    Json(form): Json<NewEvent>,
) -> ApiResult<(StatusCode, Json<Event>)> {
    let event = state
        .with_store(move |store| store.create_event(form))
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn update_event_handler(
    State(state): State<AppState>,
    _admin: CurrentUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<EventPatch>,
) -> ApiResult<Json<Event>> {
    let event = state
        .with_store(move |store| store.update_event(id, patch))
        .await?;
    Ok(Json(event))
}

pub async fn replace_event_handler(
    State(state): State<AppState>,
    _admin: CurrentUser,
    Path(id): Path<Uuid>,
    Json(form): Json<NewEvent>,
) -> ApiResult<Json<Event>> {
    let event = state
        .with_store(move |store| store.update_event(id, form.into()))
        .await?;
    Ok(Json(event))
}

pub async fn delete_event_handler(
    State(state): State<AppState>,
    _admin: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.with_store(move |store| store.delete_event(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// VISITOR HANDLERS
// =============================================================================

/// Public subscribe: 201 for a new visitor, 200 when the email is known.
pub async fn subscribe_handler(
    State(state): State<AppState>,
    Json(form): Json<NewVisitor>,
) -> ApiResult<(StatusCode, Json<Visitor>)> {
    let (visitor, created) = state.with_store(move |store| store.subscribe(form)).await?;
    if created {
        tracing::info!(event = "visitor_subscribed", visitor_id = %visitor.id);
        Ok((StatusCode::CREATED, Json(visitor)))
    } else {
        Ok((StatusCode::OK, Json(visitor)))
    }
}

pub async fn list_visitors_handler(
    State(state): State<AppState>,
    _admin: CurrentUser,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Listing<Visitor>>> {
    let page = params.page();
    let listing = state
        .with_store(move |store| store.list_visitors(page))
        .await?;
    Ok(Json(listing))
}

pub async fn get_visitor_handler(
    State(state): State<AppState>,
    _admin: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Visitor>> {
    let visitor = state.with_store(move |store| store.get_visitor(id)).await?;
    Ok(Json(visitor))
}

pub async fn update_visitor_handler(
    State(state): State<AppState>,
    _admin: CurrentUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<VisitorPatch>,
) -> ApiResult<Json<Visitor>> {
    let visitor = state
        .with_store(move |store| store.update_visitor(id, patch))
        .await?;
    Ok(Json(visitor))
}

pub async fn replace_visitor_handler(
    State(state): State<AppState>,
    _admin: CurrentUser,
    Path(id): Path<Uuid>,
    Json(form): Json<NewVisitor>,
) -> ApiResult<Json<Visitor>> {
    let visitor = state
        .with_store(move |store| store.update_visitor(id, form.into()))
        .await?;
    Ok(Json(visitor))
}

/// Delete a visitor together with all of their messages.
pub async fn delete_visitor_handler(
    State(state): State<AppState>,
    _admin: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let removed = state
        .with_store(move |store| store.delete_visitor(id))
        .await?;
    tracing::info!(event = "visitor_deleted", visitor_id = %id, messages_removed = removed);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn visitor_messages_handler(
    State(state): State<AppState>,
    _admin: CurrentUser,
    Path(id): Path<Uuid>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Listing<Message>>> {
    let page = params.page();
    let filter = MessageFilter {
        visitor_id: Some(id),
    };
    let listing = state
        .with_store(move |store| store.list_messages(&filter, page))
        .await?;
    Ok(Json(listing))
}

// =============================================================================
// MESSAGE HANDLERS
// =============================================================================

/// Public contact form.
pub async fn contact_handler(
    State(state): State<AppState>,
    Json(form): Json<ContactForm>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let (visitor, message) = state
        .with_store(move |store| store.submit_contact(form))
        .await?;
    tracing::info!(
        event = "message_received",
        visitor_id = %visitor.id,
        message_id = %message.id
    );
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn list_messages_handler(
    State(state): State<AppState>,
    _admin: CurrentUser,
    Query(params): Query<MessageParams>,
) -> ApiResult<Json<Listing<Message>>> {
    let (filter, page) = params.into_parts();
    let listing = state
        .with_store(move |store| store.list_messages(&filter, page))
        .await?;
    Ok(Json(listing))
}

pub async fn get_message_handler(
    State(state): State<AppState>,
    _admin: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Message>> {
    let message = state.with_store(move |store| store.get_message(id)).await?;
    Ok(Json(message))
}

pub async fn delete_message_handler(
    State(state): State<AppState>,
    _admin: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .with_store(move |store| store.delete_message(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use uuid::Uuid;

use crate::{
    dtos::chatdtos::{OpenRoomPayload, PaginationQuery, SendMessagePayload, StatsQuery},
    error::HttpError,
    middleware::JWTAuthMiddleware,
    AppState,
};

pub fn chat_handler() -> Router {
    Router::new()
        .route("/chats", get(get_user_chats).post(open_chat))
        .route("/chats/messages", post(send_message))
        .route("/chats/:room_id/messages", get(get_messages))
        .route("/chats/:room_id/read", put(mark_chat_as_read))
        .route("/chats/:room_id", delete(delete_chat))
        .route("/messages/:message_id", delete(delete_message))
        .route("/unread-count", get(get_unread_count))
        .route("/stats", get(get_chat_stats))
}

pub async fn get_user_chats(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let chats = app_state.chat_service.get_inbox(auth.user.id).await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": chats
    })))
}

pub async fn open_chat(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Json(body): Json<OpenRoomPayload>,
) -> Result<impl IntoResponse, HttpError> {
    let room = app_state
        .chat_service
        .create_or_get_room(auth.user.id, body.listing_id, body.other_user_id)
        .await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": room
    })))
}

/// REST fallback for clients without a socket. Delivery to live
/// connections still goes through the hub.
pub async fn send_message(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Json(body): Json<SendMessagePayload>,
) -> Result<impl IntoResponse, HttpError> {
    let message = app_state
        .chat_service
        .send_message(auth.user.id, body)
        .await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(serde_json::json!({
            "status": "success",
            "data": message
        })),
    ))
}

pub async fn get_messages(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(room_id): Path<Uuid>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let (limit, offset) = pagination.limit_offset();

    let messages = app_state
        .chat_service
        .get_room_messages(auth.user.id, room_id, limit, offset)
        .await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": messages
    })))
}

pub async fn mark_chat_as_read(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(room_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let updated = app_state
        .chat_service
        .mark_read(auth.user.id, room_id)
        .await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": { "updated": updated }
    })))
}

pub async fn delete_chat(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(room_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    tracing::info!(user_id = %auth.user.id, %room_id, "room deletion requested");
    app_state.chat_service.delete_room(room_id).await?;
    Ok(Json(serde_json::json!({ "status": "success" })))
}

pub async fn delete_message(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Path(message_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    tracing::info!(user_id = %auth.user.id, %message_id, "message deletion requested");
    app_state.chat_service.delete_message(message_id).await?;
    Ok(Json(serde_json::json!({ "status": "success" })))
}

pub async fn get_unread_count(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
) -> Result<impl IntoResponse, HttpError> {
    let count = app_state.chat_service.get_unread_count(auth.user.id).await?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": { "unreadCount": count }
    })))
}

/// Platform totals, or one listing's stats when `listingId` is given. Scoped
/// stats are visible to the listing owner only.
pub async fn get_chat_stats(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddleware>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let stats = match query.listing_id {
        Some(listing_id) => {
            app_state
                .chat_service
                .get_listing_stats(auth.user.id, listing_id)
                .await?
        }
        None => app_state.chat_service.get_chat_stats(None).await?,
    };

    Ok(Json(serde_json::json!({
        "status": "success",
        "data": stats
    })))
}

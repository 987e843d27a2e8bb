use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::error::HttpError;

pub const PERMANENT_HISTORY_MESSAGE: &str =
    "Chat history is permanent and cannot be deleted: it is the record of a rental negotiation";

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Access denied")]
    AccessDenied { user_id: Uuid, room_id: Uuid },

    #[error("Only the listing owner can do this")]
    NotListingOwner { user_id: Uuid, listing_id: Uuid },

    #[error("Room not found")]
    RoomNotFound(Uuid),

    #[error("Listing not found")]
    ListingNotFound(Uuid),

    #[error("User not found")]
    UserNotFound(Uuid),

    #[error("{} ({entity} {id})", PERMANENT_HISTORY_MESSAGE)]
    PermanentHistory { entity: &'static str, id: Uuid },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ChatError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ChatError::RoomNotFound(_)
            | ChatError::ListingNotFound(_)
            | ChatError::UserNotFound(_) => StatusCode::NOT_FOUND,

            ChatError::Authentication(_)
            | ChatError::NotAuthenticated
            | ChatError::AccessDenied { .. }
            | ChatError::NotListingOwner { .. } => StatusCode::UNAUTHORIZED,

            ChatError::PermanentHistory { .. } => StatusCode::FORBIDDEN,

            ChatError::Validation(_) => StatusCode::BAD_REQUEST,

            ChatError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text for the socket `error` event. Storage failures collapse to the
    /// caller's `fallback` so internals never reach the client.
    pub fn client_message(&self, fallback: &str) -> String {
        match self {
            ChatError::Database(_) => fallback.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<ChatError> for HttpError {
    fn from(error: ChatError) -> Self {
        let status = error.status_code();
        match error {
            ChatError::Database(err) => {
                tracing::error!(error = %err, "chat storage failure");
                HttpError::server_error(crate::error::ErrorMessage::ServerError.to_string())
            }
            other => HttpError::new(other.to_string(), status),
        }
    }
}

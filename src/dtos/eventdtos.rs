//! Socket wire format. Every frame is `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chatdtos::{SendMessagePayload, TypingPayload};
use crate::models::chatmodels::Message;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Authenticate(String),
    JoinRoom(Uuid),
    SendMessage(SendMessagePayload),
    MarkRead(Uuid),
    Typing(TypingPayload),
    StopTyping(TypingPayload),
    DeleteRoom(Uuid),
    DeleteMessage(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    Authenticated { user_id: Uuid, room_ids: Vec<Uuid> },
    AuthError(String),
    RoomJoined(Uuid),
    Error(String),
    NewMessage(Message),
    #[serde(rename_all = "camelCase")]
    MessageReceived { room_id: Uuid, message: Message },
    #[serde(rename_all = "camelCase")]
    MessagesRead { room_id: Uuid, user_id: Uuid },
    #[serde(rename_all = "camelCase")]
    UserTyping { room_id: Uuid, user_id: Uuid },
    #[serde(rename_all = "camelCase")]
    UserStopTyping { room_id: Uuid, user_id: Uuid },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Authenticated { .. } => "authenticated",
            ServerEvent::AuthError(_) => "auth_error",
            ServerEvent::RoomJoined(_) => "room_joined",
            ServerEvent::Error(_) => "error",
            ServerEvent::NewMessage(_) => "new_message",
            ServerEvent::MessageReceived { .. } => "message_received",
            ServerEvent::MessagesRead { .. } => "messages_read",
            ServerEvent::UserTyping { .. } => "user_typing",
            ServerEvent::UserStopTyping { .. } => "user_stop_typing",
        }
    }
}

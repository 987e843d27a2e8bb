// service/chat_session.rs
use uuid::Uuid;

use crate::{
    dtos::eventdtos::{ClientEvent, ServerEvent},
    service::{
        chat_service::ChatService,
        error::ChatError,
        hub::{ConnectionId, Topic},
    },
};

/// State of one live connection. Nothing here outlives the socket; room
/// membership is rebuilt from storage on every authenticate.
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub connection_id: ConnectionId,
    pub user_id: Option<Uuid>,
}

impl ChatSession {
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            user_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionControl {
    Continue,
    /// The transport must flush pending events and close the socket.
    Disconnect,
}

impl ChatService {
    /// Applies one client event to the session. Replies go through the hub
    /// to the session's own connection.
    pub async fn handle_event(&self, session: &mut ChatSession, event: ClientEvent) -> SessionControl {
        match event {
            ClientEvent::Authenticate(token) => return self.on_authenticate(session, &token).await,

            ClientEvent::JoinRoom(room_id) => {
                let Some(user_id) = session.user_id else {
                    self.reply(session, ServerEvent::Error(ChatError::NotAuthenticated.to_string()))
                        .await;
                    return SessionControl::Continue;
                };

                match self.join_room(session.connection_id, user_id, room_id).await {
                    Ok(room) => self.reply(session, ServerEvent::RoomJoined(room.id)).await,
                    Err(err) => self.reply_error(session, &err, "Failed to join room").await,
                }
            }

            ClientEvent::SendMessage(payload) => {
                let Some(user_id) = session.user_id else {
                    return SessionControl::Continue;
                };

                if let Err(err) = self.send_message(user_id, payload).await {
                    self.reply_error(session, &err, "Failed to send message").await;
                }
            }

            ClientEvent::MarkRead(room_id) => {
                let Some(user_id) = session.user_id else {
                    return SessionControl::Continue;
                };

                if let Err(err) = self.mark_read(user_id, room_id).await {
                    self.reply_error(session, &err, "Failed to mark messages as read")
                        .await;
                }
            }

            ClientEvent::Typing(payload) => {
                if let Some(user_id) = session.user_id {
                    self.forward_typing(session.connection_id, user_id, payload, true)
                        .await;
                }
            }

            ClientEvent::StopTyping(payload) => {
                if let Some(user_id) = session.user_id {
                    self.forward_typing(session.connection_id, user_id, payload, false)
                        .await;
                }
            }

            ClientEvent::DeleteRoom(room_id) => {
                if let Err(err) = self.delete_room(room_id).await {
                    self.reply_error(session, &err, "Failed to delete room").await;
                }
            }

            ClientEvent::DeleteMessage(message_id) => {
                if let Err(err) = self.delete_message(message_id).await {
                    self.reply_error(session, &err, "Failed to delete message").await;
                }
            }
        }

        SessionControl::Continue
    }

    async fn on_authenticate(&self, session: &mut ChatSession, bearer: &str) -> SessionControl {
        let user_id = match self.authenticate(bearer).await {
            Ok(user_id) => user_id,
            Err(ChatError::Database(err)) => {
                tracing::error!(connection_id = %session.connection_id, error = %err, "storage failure during socket authentication");
                self.reply(session, ServerEvent::Error("Failed to authenticate".to_string()))
                    .await;
                return SessionControl::Continue;
            }
            Err(err) => {
                tracing::info!(connection_id = %session.connection_id, reason = %err, "socket authentication rejected");
                self.reply(session, ServerEvent::AuthError(err.to_string())).await;
                return SessionControl::Disconnect;
            }
        };

        let rooms = match self.get_user_rooms(user_id).await {
            Ok(rooms) => rooms,
            Err(err) => {
                self.reply_error(session, &err, "Failed to authenticate").await;
                return SessionControl::Continue;
            }
        };

        let hub = self.hub();
        if session.user_id.is_some() {
            hub.unsubscribe_all(session.connection_id).await;
        }
        session.user_id = Some(user_id);

        hub.subscribe(session.connection_id, Topic::User(user_id)).await;
        for room in &rooms {
            hub.subscribe(session.connection_id, Topic::Room(room.id)).await;
            self.track_room(room).await;
        }

        tracing::info!(
            connection_id = %session.connection_id,
            %user_id,
            rooms = rooms.len(),
            "socket authenticated"
        );

        self.reply(
            session,
            ServerEvent::Authenticated {
                user_id,
                room_ids: rooms.iter().map(|room| room.id).collect(),
            },
        )
        .await;

        SessionControl::Continue
    }

    pub async fn disconnect(&self, session: &ChatSession) {
        self.hub().disconnect(session.connection_id).await;
        tracing::debug!(
            connection_id = %session.connection_id,
            user_id = ?session.user_id,
            "socket disconnected"
        );
    }

    async fn reply(&self, session: &ChatSession, event: ServerEvent) {
        self.hub().send_to(session.connection_id, event).await;
    }

    async fn reply_error(&self, session: &ChatSession, err: &ChatError, fallback: &str) {
        if let ChatError::Database(db_err) = err {
            tracing::error!(
                connection_id = %session.connection_id,
                error = %db_err,
                "{fallback}"
            );
        }
        self.reply(session, ServerEvent::Error(err.client_message(fallback)))
            .await;
    }
}

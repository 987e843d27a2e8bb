// service/chat_service.rs
use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{chatdb::ChatExt, listingdb::ListingExt, userdb::UserExt, ChatStore},
    dtos::{
        chatdtos::{SendMessagePayload, TypingPayload},
        eventdtos::ServerEvent,
    },
    models::chatmodels::*,
    service::{
        error::ChatError,
        hub::{ConnectionId, Hub, Topic},
    },
    utils::token,
};

/// Window used for the "active rooms" stat.
pub const ACTIVE_ROOM_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct ChatService {
    db_client: Arc<dyn ChatStore>,
    hub: Arc<Hub>,
    jwt_secret: String,
}

impl ChatService {
    pub fn new(db_client: Arc<dyn ChatStore>, hub: Arc<Hub>, jwt_secret: String) -> Self {
        Self {
            db_client,
            hub,
            jwt_secret,
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Verifies a bearer token and returns the user it belongs to.
    pub async fn authenticate(&self, bearer: &str) -> Result<Uuid, ChatError> {
        let subject = token::decode_token(bearer, self.jwt_secret.as_bytes())
            .map_err(|e| ChatError::Authentication(e.message))?;

        let user_id = Uuid::parse_str(&subject)
            .map_err(|_| ChatError::Authentication("token subject is not a user id".to_string()))?;

        self.db_client
            .get_user(user_id)
            .await?
            .ok_or_else(|| ChatError::Authentication("user no longer exists".to_string()))?;

        Ok(user_id)
    }

    pub async fn get_user_rooms(&self, user_id: Uuid) -> Result<Vec<ChatRoom>, ChatError> {
        Ok(self.db_client.get_user_rooms(user_id).await?)
    }

    /// Loads a room the caller is allowed to see.
    pub async fn get_room_for_participant(
        &self,
        user_id: Uuid,
        room_id: Uuid,
    ) -> Result<ChatRoom, ChatError> {
        let room = self
            .db_client
            .get_room_by_id(room_id)
            .await?
            .ok_or(ChatError::RoomNotFound(room_id))?;

        if !room.is_participant(user_id) {
            tracing::warn!(%user_id, %room_id, "rejected access to chat room");
            return Err(ChatError::AccessDenied { user_id, room_id });
        }

        Ok(room)
    }

    /// Adds the connection to a room channel after checking the bound user
    /// is the room's customer or owner.
    pub async fn join_room(
        &self,
        connection_id: ConnectionId,
        user_id: Uuid,
        room_id: Uuid,
    ) -> Result<ChatRoom, ChatError> {
        let room = self.get_room_for_participant(user_id, room_id).await?;
        self.hub.subscribe(connection_id, Topic::Room(room.id)).await;
        self.track_room(&room).await;
        Ok(room)
    }

    pub async fn send_message(
        &self,
        sender_id: Uuid,
        payload: SendMessagePayload,
    ) -> Result<Message, ChatError> {
        payload
            .validate()
            .map_err(|e| ChatError::Validation(e.to_string()))?;

        if payload.content.trim().is_empty() {
            return Err(ChatError::Validation("Message cannot be blank".to_string()));
        }
        if payload.receiver_id == sender_id {
            return Err(ChatError::Validation("Cannot send a message to yourself".to_string()));
        }

        let target = match payload.room_id {
            Some(room_id) => {
                let room = self.get_room_for_participant(sender_id, room_id).await?;
                if room.counterpart(sender_id) != Some(payload.receiver_id)
                    || room.listing_id != payload.listing_id
                {
                    return Err(ChatError::Validation(
                        "Receiver and listing must match the room".to_string(),
                    ));
                }
                RoomTarget::Existing(room.id)
            }
            None => {
                let existing = self
                    .db_client
                    .find_room_between(payload.listing_id, sender_id, payload.receiver_id)
                    .await?;

                match existing {
                    Some(room) => RoomTarget::Existing(room.id),
                    None => {
                        let (customer_id, owner_id) = self
                            .resolve_roles(payload.listing_id, sender_id, payload.receiver_id)
                            .await?;
                        RoomTarget::Create {
                            customer_id,
                            owner_id,
                        }
                    }
                }
            }
        };

        let (room, message) = self
            .db_client
            .create_message(NewMessage {
                target,
                listing_id: payload.listing_id,
                sender_id,
                receiver_id: payload.receiver_id,
                content: payload.content,
            })
            .await?;

        tracing::info!(
            room_id = %room.id,
            message_id = %message.id,
            %sender_id,
            receiver_id = %message.receiver_id,
            "chat message stored"
        );

        // Both parties' live connections follow the room, including one
        // created by this very message.
        let room_topic = Topic::Room(room.id);
        self.hub.attach(Topic::User(sender_id), room_topic).await;
        self.hub.attach(Topic::User(message.receiver_id), room_topic).await;
        self.track_room(&room).await;

        self.hub
            .publish(room_topic, ServerEvent::NewMessage(message.clone()))
            .await;
        self.hub
            .publish(
                Topic::User(message.receiver_id),
                ServerEvent::MessageReceived {
                    room_id: room.id,
                    message: message.clone(),
                },
            )
            .await;

        Ok(message)
    }

    /// Opens the conversation about a listing without sending anything.
    /// Returns the existing room when the pair already talked, in either role.
    pub async fn create_or_get_room(
        &self,
        user_id: Uuid,
        listing_id: Uuid,
        other_user_id: Uuid,
    ) -> Result<ChatRoom, ChatError> {
        if other_user_id == user_id {
            return Err(ChatError::Validation("Cannot open a chat with yourself".to_string()));
        }

        if let Some(room) = self
            .db_client
            .find_room_between(listing_id, user_id, other_user_id)
            .await?
        {
            return Ok(room);
        }

        let (customer_id, owner_id) = self
            .resolve_roles(listing_id, user_id, other_user_id)
            .await?;
        let room = self
            .db_client
            .create_or_get_room(listing_id, customer_id, owner_id)
            .await?;

        tracing::info!(room_id = %room.id, %listing_id, %customer_id, %owner_id, "chat room opened");

        let room_topic = Topic::Room(room.id);
        self.hub.attach(Topic::User(customer_id), room_topic).await;
        self.hub.attach(Topic::User(owner_id), room_topic).await;
        self.track_room(&room).await;

        Ok(room)
    }

    /// Roles come from who owns the listing, never from who spoke first.
    async fn resolve_roles(
        &self,
        listing_id: Uuid,
        sender_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<(Uuid, Uuid), ChatError> {
        let listing = self
            .db_client
            .get_listing(listing_id)
            .await?
            .ok_or(ChatError::ListingNotFound(listing_id))?;

        self.db_client
            .get_user(receiver_id)
            .await?
            .ok_or(ChatError::UserNotFound(receiver_id))?;

        if listing.owner_id == receiver_id {
            Ok((sender_id, receiver_id))
        } else if listing.owner_id == sender_id {
            Ok((receiver_id, sender_id))
        } else {
            Err(ChatError::Validation(
                "One participant must own the listing".to_string(),
            ))
        }
    }

    /// Marks the caller's incoming messages in the room as read. Returns the
    /// number of messages that changed; zero on repeat calls.
    pub async fn mark_read(&self, user_id: Uuid, room_id: Uuid) -> Result<u64, ChatError> {
        let room = self.get_room_for_participant(user_id, room_id).await?;
        let updated = self.db_client.mark_messages_as_read(room.id, user_id).await?;

        if updated > 0 {
            tracing::debug!(%user_id, %room_id, updated, "messages marked as read");
            self.hub
                .publish(
                    Topic::Room(room.id),
                    ServerEvent::MessagesRead {
                        room_id: room.id,
                        user_id,
                    },
                )
                .await;
        }

        Ok(updated)
    }

    pub(crate) async fn track_room(&self, room: &ChatRoom) {
        self.hub
            .track_room(room.id, [room.customer_id, room.owner_id])
            .await;
    }

    /// Forwards a typing signal to the receiver. Only connections that have
    /// joined the room may signal in it, and only to the room's other
    /// participant. Nothing is stored.
    pub async fn forward_typing(
        &self,
        connection_id: ConnectionId,
        user_id: Uuid,
        payload: TypingPayload,
        typing: bool,
    ) -> bool {
        if !self
            .hub
            .is_subscribed(connection_id, Topic::Room(payload.room_id))
            .await
        {
            return false;
        }

        if self.hub.counterpart(payload.room_id, user_id).await != Some(payload.receiver_id) {
            tracing::warn!(
                %user_id,
                room_id = %payload.room_id,
                receiver_id = %payload.receiver_id,
                "dropped typing signal addressed outside the room"
            );
            return false;
        }

        let event = if typing {
            ServerEvent::UserTyping {
                room_id: payload.room_id,
                user_id,
            }
        } else {
            ServerEvent::UserStopTyping {
                room_id: payload.room_id,
                user_id,
            }
        };

        self.hub.publish(Topic::User(payload.receiver_id), event).await > 0
    }

    pub async fn get_room_messages(
        &self,
        user_id: Uuid,
        room_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, ChatError> {
        let room = self.get_room_for_participant(user_id, room_id).await?;
        Ok(self
            .db_client
            .get_room_messages(room.id, limit, offset)
            .await?)
    }

    pub async fn get_inbox(&self, user_id: Uuid) -> Result<Vec<ChatWithDetails>, ChatError> {
        let rooms = self.db_client.get_user_rooms(user_id).await?;
        let mut inbox = Vec::with_capacity(rooms.len());

        for room in rooms {
            let last_message = self.db_client.get_last_message(room.id).await?;
            let unread_count = self
                .db_client
                .get_room_unread_count(room.id, user_id)
                .await?;
            inbox.push(ChatWithDetails {
                room,
                last_message,
                unread_count,
            });
        }

        Ok(inbox)
    }

    pub async fn get_unread_count(&self, user_id: Uuid) -> Result<i64, ChatError> {
        Ok(self.db_client.get_unread_count(user_id).await?)
    }

    pub async fn get_chat_stats(&self, listing_id: Option<Uuid>) -> Result<ChatStats, ChatError> {
        let active_since = Utc::now() - Duration::days(ACTIVE_ROOM_WINDOW_DAYS);
        Ok(self
            .db_client
            .get_chat_stats(listing_id, active_since)
            .await?)
    }

    /// Stats for one listing, visible to its owner only.
    pub async fn get_listing_stats(
        &self,
        user_id: Uuid,
        listing_id: Uuid,
    ) -> Result<ChatStats, ChatError> {
        let listing = self
            .db_client
            .get_listing(listing_id)
            .await?
            .ok_or(ChatError::ListingNotFound(listing_id))?;

        if listing.owner_id != user_id {
            return Err(ChatError::NotListingOwner {
                user_id,
                listing_id,
            });
        }

        self.get_chat_stats(Some(listing_id)).await
    }

    /// Rooms are permanent. Always fails.
    pub async fn delete_room(&self, room_id: Uuid) -> Result<(), ChatError> {
        tracing::warn!(%room_id, "attempt to delete a chat room");
        Err(ChatError::PermanentHistory {
            entity: "room",
            id: room_id,
        })
    }

    /// Messages are permanent. Always fails.
    pub async fn delete_message(&self, message_id: Uuid) -> Result<(), ChatError> {
        tracing::warn!(%message_id, "attempt to delete a chat message");
        Err(ChatError::PermanentHistory {
            entity: "message",
            id: message_id,
        })
    }
}

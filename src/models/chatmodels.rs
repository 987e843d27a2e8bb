// models/chatmodels.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Conversation between the customer and the owner of one listing.
///
/// Rows are unique on `(listing_id, customer_id, owner_id)` and are never
/// deleted. Roles come from listing ownership, not from who spoke first.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub customer_id: Uuid,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl ChatRoom {
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.customer_id == user_id || self.owner_id == user_id
    }

    /// The other party of the room, or `None` when `user_id` is not in it.
    pub fn counterpart(&self, user_id: Uuid) -> Option<Uuid> {
        if self.customer_id == user_id {
            Some(self.owner_id)
        } else if self.owner_id == user_id {
            Some(self.customer_id)
        } else {
            None
        }
    }
}

/// Append-only message record. Only `read` ever changes, false to true.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub listing_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Where a new message lands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RoomTarget {
    Existing(Uuid),
    /// First contact: create the room with these roles, or reuse the row a
    /// concurrent sender inserted for the same triple.
    Create { customer_id: Uuid, owner_id: Uuid },
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub target: RoomTarget,
    pub listing_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatStats {
    pub total_rooms: i64,
    pub total_messages: i64,
    pub active_rooms: i64,
    pub average_messages_per_room: f64,
}

impl ChatStats {
    pub fn from_counts(total_rooms: i64, total_messages: i64, active_rooms: i64) -> Self {
        let average_messages_per_room = if total_rooms > 0 {
            (total_messages as f64 / total_rooms as f64 * 100.0).round() / 100.0
        } else {
            0.0
        };

        Self {
            total_rooms,
            total_messages,
            active_rooms,
            average_messages_per_room,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ChatWithDetails {
    pub room: ChatRoom,
    pub last_message: Option<Message>,
    pub unread_count: i64,
}

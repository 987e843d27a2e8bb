//! In-memory implementation of the storage traits, for tests.
//!
//! Mirrors the Postgres schema guarantees that matter to the service: the
//! unique room triple, `(created_at, id)` history order, and no way to
//! delete anything.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{chatdb::ChatExt, listingdb::ListingExt, userdb::UserExt};
use crate::models::{chatmodels::*, listingmodel::Listing, usermodel::User};

#[derive(Debug, Default)]
struct MemoryState {
    users: Vec<User>,
    listings: Vec<Listing>,
    rooms: Vec<ChatRoom>,
    messages: Vec<Message>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    fail_writes: std::sync::atomic::AtomicBool,
    fail_reads: std::sync::atomic::AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, name: &str) -> Uuid {
        let id = Uuid::now_v7();
        self.state.lock().await.users.push(User {
            id,
            name: name.to_string(),
            created_at: Utc::now(),
        });
        id
    }

    pub async fn add_listing(&self, owner_id: Uuid, title: &str) -> Uuid {
        let id = Uuid::now_v7();
        self.state.lock().await.listings.push(Listing {
            id,
            owner_id,
            title: title.to_string(),
            created_at: Utc::now(),
        });
        id
    }

    pub async fn room_count(&self) -> usize {
        self.state.lock().await.rooms.len()
    }

    pub async fn message_count(&self) -> usize {
        self.state.lock().await.messages.len()
    }

    /// Moves a message back in time so stats windows can be exercised.
    pub async fn backdate_message(&self, message_id: Uuid, created_at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        if let Some(message) = state.messages.iter_mut().find(|m| m.id == message_id) {
            message.created_at = created_at;
        }
    }

    /// Makes every subsequent write fail as if the database were unreachable.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Makes user and listing lookups fail with a storage error.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    fn check_readable(&self) -> Result<(), Error> {
        if self.fail_reads.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::PoolTimedOut);
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<(), Error> {
        if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::PoolTimedOut);
        }
        Ok(())
    }
}

fn upsert_room(state: &mut MemoryState, listing_id: Uuid, customer_id: Uuid, owner_id: Uuid) -> ChatRoom {
    if let Some(room) = state.rooms.iter().find(|r| {
        r.listing_id == listing_id && r.customer_id == customer_id && r.owner_id == owner_id
    }) {
        return room.clone();
    }

    let room = ChatRoom {
        id: Uuid::now_v7(),
        listing_id,
        customer_id,
        owner_id,
        created_at: Utc::now(),
        last_message_at: None,
    };
    state.rooms.push(room.clone());
    room
}

#[async_trait]
impl UserExt for MemoryStore {
    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, Error> {
        self.check_readable()?;
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.id == user_id).cloned())
    }
}

#[async_trait]
impl ListingExt for MemoryStore {
    async fn get_listing(&self, listing_id: Uuid) -> Result<Option<Listing>, Error> {
        self.check_readable()?;
        let state = self.state.lock().await;
        Ok(state.listings.iter().find(|l| l.id == listing_id).cloned())
    }
}

#[async_trait]
impl ChatExt for MemoryStore {
    async fn get_room_by_id(&self, room_id: Uuid) -> Result<Option<ChatRoom>, Error> {
        let state = self.state.lock().await;
        Ok(state.rooms.iter().find(|r| r.id == room_id).cloned())
    }

    async fn find_room_between(
        &self,
        listing_id: Uuid,
        user_a: Uuid,
        user_b: Uuid,
    ) -> Result<Option<ChatRoom>, Error> {
        let state = self.state.lock().await;
        Ok(state
            .rooms
            .iter()
            .find(|r| {
                r.listing_id == listing_id
                    && ((r.customer_id == user_a && r.owner_id == user_b)
                        || (r.customer_id == user_b && r.owner_id == user_a))
            })
            .cloned())
    }

    async fn create_or_get_room(
        &self,
        listing_id: Uuid,
        customer_id: Uuid,
        owner_id: Uuid,
    ) -> Result<ChatRoom, Error> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        Ok(upsert_room(&mut state, listing_id, customer_id, owner_id))
    }

    async fn get_user_rooms(&self, user_id: Uuid) -> Result<Vec<ChatRoom>, Error> {
        let state = self.state.lock().await;
        let mut rooms: Vec<ChatRoom> = state
            .rooms
            .iter()
            .filter(|r| r.is_participant(user_id))
            .cloned()
            .collect();
        rooms.sort_by(|a, b| {
            b.last_message_at
                .cmp(&a.last_message_at)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(rooms)
    }

    async fn create_message(&self, new_message: NewMessage) -> Result<(ChatRoom, Message), Error> {
        self.check_writable()?;
        let mut state = self.state.lock().await;

        let room_id = match new_message.target {
            RoomTarget::Existing(room_id) => state
                .rooms
                .iter()
                .find(|r| r.id == room_id)
                .map(|r| r.id)
                .ok_or(Error::RowNotFound)?,
            RoomTarget::Create {
                customer_id,
                owner_id,
            } => upsert_room(&mut state, new_message.listing_id, customer_id, owner_id).id,
        };

        let message = Message {
            id: Uuid::now_v7(),
            room_id,
            listing_id: new_message.listing_id,
            sender_id: new_message.sender_id,
            receiver_id: new_message.receiver_id,
            content: new_message.content,
            read: false,
            created_at: Utc::now(),
        };
        state.messages.push(message.clone());

        let room = state
            .rooms
            .iter_mut()
            .find(|r| r.id == room_id)
            .ok_or(Error::RowNotFound)?;
        room.last_message_at = room.last_message_at.max(Some(message.created_at));

        Ok((room.clone(), message))
    }

    async fn get_room_messages(
        &self,
        room_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, Error> {
        let state = self.state.lock().await;
        let mut history: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect();
        history.sort_by_key(|m| (m.created_at, m.id));
        Ok(history
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn get_last_message(&self, room_id: Uuid) -> Result<Option<Message>, Error> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .max_by_key(|m| (m.created_at, m.id))
            .cloned())
    }

    async fn mark_messages_as_read(&self, room_id: Uuid, user_id: Uuid) -> Result<u64, Error> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        let mut updated = 0;
        for message in state
            .messages
            .iter_mut()
            .filter(|m| m.room_id == room_id && m.receiver_id == user_id && !m.read)
        {
            message.read = true;
            updated += 1;
        }
        Ok(updated)
    }

    async fn get_room_unread_count(&self, room_id: Uuid, user_id: Uuid) -> Result<i64, Error> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.room_id == room_id && m.receiver_id == user_id && !m.read)
            .count() as i64)
    }

    async fn get_unread_count(&self, user_id: Uuid) -> Result<i64, Error> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.receiver_id == user_id && !m.read)
            .count() as i64)
    }

    async fn get_chat_stats(
        &self,
        listing_id: Option<Uuid>,
        active_since: DateTime<Utc>,
    ) -> Result<ChatStats, Error> {
        let state = self.state.lock().await;
        let in_scope = |id: Uuid| listing_id.map_or(true, |scope| scope == id);

        let total_rooms = state.rooms.iter().filter(|r| in_scope(r.listing_id)).count() as i64;
        let scoped: Vec<&Message> = state
            .messages
            .iter()
            .filter(|m| in_scope(m.listing_id))
            .collect();
        let mut active: Vec<Uuid> = scoped
            .iter()
            .filter(|m| m.created_at >= active_since)
            .map(|m| m.room_id)
            .collect();
        active.sort();
        active.dedup();

        Ok(ChatStats::from_counts(
            total_rooms,
            scoped.len() as i64,
            active.len() as i64,
        ))
    }
}

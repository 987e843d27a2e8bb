// db/chatdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Error;
use uuid::Uuid;

use super::DBClient;
use crate::models::chatmodels::*;

/// Chat persistence. There is no delete operation: rooms and messages are
/// permanent, and the schema rejects deletes as well.
#[async_trait]
pub trait ChatExt {
    async fn get_room_by_id(&self, room_id: Uuid) -> Result<Option<ChatRoom>, Error>;

    /// Finds the room for `listing_id` between two users in either role
    /// orientation.
    async fn find_room_between(
        &self,
        listing_id: Uuid,
        user_a: Uuid,
        user_b: Uuid,
    ) -> Result<Option<ChatRoom>, Error>;

    async fn create_or_get_room(
        &self,
        listing_id: Uuid,
        customer_id: Uuid,
        owner_id: Uuid,
    ) -> Result<ChatRoom, Error>;

    async fn get_user_rooms(&self, user_id: Uuid) -> Result<Vec<ChatRoom>, Error>;

    /// Persists a message, creating its room first when the target asks for
    /// it. Both writes commit together.
    async fn create_message(&self, new_message: NewMessage) -> Result<(ChatRoom, Message), Error>;

    /// Oldest first.
    async fn get_room_messages(
        &self,
        room_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, Error>;

    async fn get_last_message(&self, room_id: Uuid) -> Result<Option<Message>, Error>;

    /// Returns how many messages flipped to read.
    async fn mark_messages_as_read(&self, room_id: Uuid, user_id: Uuid) -> Result<u64, Error>;

    async fn get_room_unread_count(&self, room_id: Uuid, user_id: Uuid) -> Result<i64, Error>;

    async fn get_unread_count(&self, user_id: Uuid) -> Result<i64, Error>;

    async fn get_chat_stats(
        &self,
        listing_id: Option<Uuid>,
        active_since: DateTime<Utc>,
    ) -> Result<ChatStats, Error>;
}

const ROOM_COLUMNS: &str = "id, listing_id, customer_id, owner_id, created_at, last_message_at";

#[async_trait]
impl ChatExt for DBClient {
    async fn get_room_by_id(&self, room_id: Uuid) -> Result<Option<ChatRoom>, Error> {
        sqlx::query_as::<_, ChatRoom>(&format!(
            "SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE id = $1"
        ))
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_room_between(
        &self,
        listing_id: Uuid,
        user_a: Uuid,
        user_b: Uuid,
    ) -> Result<Option<ChatRoom>, Error> {
        sqlx::query_as::<_, ChatRoom>(&format!(
            r#"
            SELECT {ROOM_COLUMNS}
            FROM chat_rooms
            WHERE listing_id = $1
              AND ((customer_id = $2 AND owner_id = $3)
                OR (customer_id = $3 AND owner_id = $2))
            LIMIT 1
            "#
        ))
        .bind(listing_id)
        .bind(user_a)
        .bind(user_b)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_or_get_room(
        &self,
        listing_id: Uuid,
        customer_id: Uuid,
        owner_id: Uuid,
    ) -> Result<ChatRoom, Error> {
        let mut tx = self.pool.begin().await?;
        let room = upsert_room(&mut tx, listing_id, customer_id, owner_id).await?;
        tx.commit().await?;
        Ok(room)
    }

    async fn get_user_rooms(&self, user_id: Uuid) -> Result<Vec<ChatRoom>, Error> {
        sqlx::query_as::<_, ChatRoom>(&format!(
            r#"
            SELECT {ROOM_COLUMNS}
            FROM chat_rooms
            WHERE customer_id = $1 OR owner_id = $1
            ORDER BY last_message_at DESC NULLS LAST, created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn create_message(&self, new_message: NewMessage) -> Result<(ChatRoom, Message), Error> {
        let mut tx = self.pool.begin().await?;

        let room = match new_message.target {
            RoomTarget::Existing(room_id) => sqlx::query_as::<_, ChatRoom>(&format!(
                "SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE id = $1"
            ))
            .bind(room_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(Error::RowNotFound)?,
            RoomTarget::Create {
                customer_id,
                owner_id,
            } => upsert_room(&mut tx, new_message.listing_id, customer_id, owner_id).await?,
        };

        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (id, room_id, listing_id, sender_id, receiver_id, content)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, room_id, listing_id, sender_id, receiver_id, content, read, created_at
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(room.id)
        .bind(new_message.listing_id)
        .bind(new_message.sender_id)
        .bind(new_message.receiver_id)
        .bind(new_message.content)
        .fetch_one(&mut *tx)
        .await?;

        let room = sqlx::query_as::<_, ChatRoom>(&format!(
            r#"
            UPDATE chat_rooms
            SET last_message_at = GREATEST(COALESCE(last_message_at, $2), $2)
            WHERE id = $1
            RETURNING {ROOM_COLUMNS}
            "#
        ))
        .bind(room.id)
        .bind(message.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((room, message))
    }

    async fn get_room_messages(
        &self,
        room_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, Error> {
        sqlx::query_as::<_, Message>(
            r#"
            SELECT id, room_id, listing_id, sender_id, receiver_id, content, read, created_at
            FROM messages
            WHERE room_id = $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(room_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_last_message(&self, room_id: Uuid) -> Result<Option<Message>, Error> {
        sqlx::query_as::<_, Message>(
            r#"
            SELECT id, room_id, listing_id, sender_id, receiver_id, content, read, created_at
            FROM messages
            WHERE room_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn mark_messages_as_read(&self, room_id: Uuid, user_id: Uuid) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET read = true
            WHERE room_id = $1
              AND receiver_id = $2
              AND read = false
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn get_room_unread_count(&self, room_id: Uuid, user_id: Uuid) -> Result<i64, Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM messages
            WHERE room_id = $1
              AND receiver_id = $2
              AND read = false
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_unread_count(&self, user_id: Uuid) -> Result<i64, Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM messages
            WHERE receiver_id = $1
              AND read = false
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_chat_stats(
        &self,
        listing_id: Option<Uuid>,
        active_since: DateTime<Utc>,
    ) -> Result<ChatStats, Error> {
        let (total_rooms, total_messages, active_rooms) = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM chat_rooms
                  WHERE $1::uuid IS NULL OR listing_id = $1),
                (SELECT COUNT(*) FROM messages
                  WHERE $1::uuid IS NULL OR listing_id = $1),
                (SELECT COUNT(DISTINCT room_id) FROM messages
                  WHERE ($1::uuid IS NULL OR listing_id = $1)
                    AND created_at >= $2)
            "#,
        )
        .bind(listing_id)
        .bind(active_since)
        .fetch_one(&self.pool)
        .await?;

        Ok(ChatStats::from_counts(total_rooms, total_messages, active_rooms))
    }
}

/// Inserts the room unless the unique triple already exists, then reads the
/// surviving row. A concurrent first contact that won the insert is returned
/// instead of a duplicate.
async fn upsert_room(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    listing_id: Uuid,
    customer_id: Uuid,
    owner_id: Uuid,
) -> Result<ChatRoom, Error> {
    sqlx::query(
        r#"
        INSERT INTO chat_rooms (id, listing_id, customer_id, owner_id)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (listing_id, customer_id, owner_id) DO NOTHING
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(listing_id)
    .bind(customer_id)
    .bind(owner_id)
    .execute(&mut **tx)
    .await?;

    sqlx::query_as::<_, ChatRoom>(&format!(
        r#"
        SELECT {ROOM_COLUMNS}
        FROM chat_rooms
        WHERE listing_id = $1 AND customer_id = $2 AND owner_id = $3
        "#
    ))
    .bind(listing_id)
    .bind(customer_id)
    .bind(owner_id)
    .fetch_one(&mut **tx)
    .await
}

pub mod chatdb;
pub mod listingdb;
pub mod userdb;

#[cfg(test)]
pub mod memory;

use std::fmt::Debug;

use sqlx::{Pool, Postgres};

use self::{chatdb::ChatExt, listingdb::ListingExt, userdb::UserExt};

#[derive(Debug, Clone)]
pub struct DBClient {
    pub pool: Pool<Postgres>,
}

impl DBClient {
    pub fn new(pool: Pool<Postgres>) -> Self {
        DBClient { pool }
    }
}

/// Everything the chat service needs from storage. Implemented by
/// [`DBClient`] in production and by the in-memory store in tests.
pub trait ChatStore: ChatExt + ListingExt + UserExt + Debug + Send + Sync {}

impl<T> ChatStore for T where T: ChatExt + ListingExt + UserExt + Debug + Send + Sync {}

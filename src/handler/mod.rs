pub mod chat;
pub mod ws;

pub mod chat_service;
pub mod chat_session;
pub mod error;
pub mod hub;

pub mod config;
pub mod db;
pub mod dtos;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod service;
pub mod utils;

use std::sync::Arc;

use config::Config;
use db::ChatStore;
use service::{chat_service::ChatService, hub::Hub};

#[derive(Debug, Clone)]
pub struct AppState {
    pub env: Config,
    pub db_client: Arc<dyn ChatStore>,
    pub hub: Arc<Hub>,
    pub chat_service: Arc<ChatService>,
}

impl AppState {
    pub fn new(env: Config, db_client: Arc<dyn ChatStore>, hub: Arc<Hub>) -> Self {
        let chat_service = Arc::new(ChatService::new(
            db_client.clone(),
            hub.clone(),
            env.jwt_secret.clone(),
        ));

        AppState {
            env,
            db_client,
            hub,
            chat_service,
        }
    }
}

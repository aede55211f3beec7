pub mod chat;
pub mod config;
pub mod error;
pub mod gateway;
pub mod routes;

use std::sync::Arc;

use chat::service::InMemoryChatService;
use config::Config;
use gateway::router::Gateway;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gateway: Arc<Gateway>,
    pub chat: Arc<InMemoryChatService>,
}

impl AppState {
    /// Wire the gateway to a fresh in-memory room directory.
    pub fn new(config: Config) -> Self {
        let chat = Arc::new(InMemoryChatService::new());
        let gateway = Gateway::new(chat.clone(), config.notification_prefix.clone());
        Self {
            config: Arc::new(config),
            gateway: Arc::new(gateway),
            chat,
        }
    }
}

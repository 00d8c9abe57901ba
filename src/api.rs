//! HTTP API for the webhook receiver

mod handlers;
mod types;

pub use handlers::create_router;

use crate::telegram::Update;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Header Telegram sends with every webhook request when a secret is set
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub updates: mpsc::Sender<Update>,
    pub secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(updates: mpsc::Sender<Update>, secret: Option<String>) -> Self {
        Self {
            updates,
            secret: secret.map(Arc::from),
        }
    }
}

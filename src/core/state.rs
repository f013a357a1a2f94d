// Application state (AppState)

use crate::core::config::Config;
use crate::manager::CardManager;
use std::sync::Arc;

/// Shared application state
///
/// Handed to every request handler. Both fields are reference counted so the
/// state clones cheaply into blocking tasks.
#[derive(Clone)]
pub struct AppState {
    /// Card store, also driven by the periodic write-back task
    pub manager: Arc<CardManager>,

    /// Configuration
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, manager: CardManager) -> Self {
        Self {
            manager: Arc::new(manager),
            config: Arc::new(config),
        }
    }
}

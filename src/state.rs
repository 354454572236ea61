use std::sync::Arc;

use crate::gateway::dispatcher::Dispatcher;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    /// CORS allow-list; empty means any origin.
    pub allowed_origins: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>, allowed_origins: Vec<String>) -> Self {
        Self {
            dispatcher,
            allowed_origins: Arc::new(allowed_origins),
        }
    }
}

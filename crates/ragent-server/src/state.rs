use ragent::agent::RagAgent;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<RagAgent>,
}

impl AppState {
    pub fn new(agent: RagAgent) -> Self {
        Self {
            agent: Arc::new(agent),
        }
    }
}

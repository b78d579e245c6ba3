//! Shared application state for the API server.

use std::sync::Arc;

use veil_core::Orchestrator;

/// Server state — shared across all request handlers.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

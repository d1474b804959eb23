//! Shared application state.

use std::sync::Arc;

use scribly_stories::application::command_handlers::StoryService;
use scribly_stories::domain::ports::StoryStore;

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The story service every handler goes through.
    pub service: Arc<StoryService>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(service: Arc<StoryService>) -> Self {
        Self { service }
    }

    /// The store behind the service, for read-side queries.
    #[must_use]
    pub fn store(&self) -> &dyn StoryStore {
        self.service.store()
    }
}

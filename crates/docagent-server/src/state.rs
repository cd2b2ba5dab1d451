//! Application State

use std::sync::Arc;

use docagent_core::{ChatModel, SessionManager};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Tool-server connection and chat model shared by every run
    pub session: Arc<SessionManager>,

    /// Model handle for backend health checks, independent of the session
    pub backend: Option<ChatModel>,
}

impl AppState {
    pub const fn new(session: Arc<SessionManager>) -> Self {
        Self {
            session,
            backend: None,
        }
    }

    #[must_use]
    pub fn with_backend(mut self, model: ChatModel) -> Self {
        self.backend = Some(model);
        self
    }
}

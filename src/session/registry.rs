// Explicit session registry owned by the server. Connections resolve their
// session through the handle they are given; there is no process-global
// session state.

use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::GameConfig;
use crate::session::actor::{self, SessionHandle};

pub struct SessionRegistry {
    config: GameConfig,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(config: GameConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a session id, starting its actor on first use. Joining an
    /// unknown id creates the session, matching the original game flow
    /// where the first connection brings the lobby up.
    pub async fn get_or_create(&self, session_id: &str) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(session_id) {
            return handle.clone();
        }

        let mut sessions = self.sessions.write().await;
        // Double-check under the write lock: another connection may have
        // created the session while we waited.
        if let Some(handle) = sessions.get(session_id) {
            return handle.clone();
        }

        info!("Creating session {}", session_id);
        let handle = actor::spawn(session_id.to_string(), self.config.clone());
        sessions.insert(session_id.to_string(), handle.clone());
        handle
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

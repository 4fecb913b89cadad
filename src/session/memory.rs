//! Process-local session store.

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::{SessionStore, SessionToken, UserSession};
use crate::error::OrderResult;

/// [`SessionStore`] keeping sessions in a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionToken, UserSession>>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` if no session is stored.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl SessionStore for InMemorySessionStore {
    async fn load(&self, token: SessionToken) -> OrderResult<UserSession> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&token).cloned().unwrap_or_default())
    }

    async fn save(&self, token: SessionToken, session: &UserSession) -> OrderResult<()> {
        self.sessions.write().await.insert(token, session.clone());
        Ok(())
    }

    async fn clear(&self, token: SessionToken) -> OrderResult<()> {
        self.sessions.write().await.remove(&token);
        Ok(())
    }
}

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::models::{CallSession, SessionState};

/// Where live call sessions are kept between turns.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, call_id: &str) -> Option<CallSession>;

    async fn put(&self, session: CallSession);

    async fn delete(&self, call_id: &str) -> Option<CallSession>;

    /// Stores `session` unless one with the same call id exists. Returns whether it was
    /// written.
    async fn put_if_absent(&self, session: CallSession) -> bool {
        if self.get(&session.call_id).await.is_some() {
            return false;
        }
        self.put(session).await;
        true
    }

    /// Stores `session` only if the stored copy is still in `expected`. Returns whether
    /// it was written. Backends with real transactions should override this.
    async fn compare_and_put(&self, expected: SessionState, session: CallSession) -> bool {
        match self.get(&session.call_id).await {
            Some(current) if current.state == expected => {
                self.put(session).await;
                true
            }
            _ => false,
        }
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, CallSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, call_id: &str) -> Option<CallSession> {
        self.sessions.lock().await.get(call_id).cloned()
    }

    async fn put(&self, session: CallSession) {
        self.sessions
            .lock()
            .await
            .insert(session.call_id.clone(), session);
    }

    async fn delete(&self, call_id: &str) -> Option<CallSession> {
        self.sessions.lock().await.remove(call_id)
    }

    async fn put_if_absent(&self, session: CallSession) -> bool {
        use std::collections::hash_map::Entry;

        match self.sessions.lock().await.entry(session.call_id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(session);
                true
            }
        }
    }

    async fn compare_and_put(&self, expected: SessionState, session: CallSession) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(&session.call_id) {
            Some(current) if current.state == expected => {
                sessions.insert(session.call_id.clone(), session);
                true
            }
            _ => false,
        }
    }
}

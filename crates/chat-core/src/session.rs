use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::history::{Conversation, HistoryPolicy};

pub type SharedConversation = Arc<Mutex<Conversation>>;

struct SessionEntry {
    conversation: SharedConversation,
    last_seen: Instant,
}

/// In-memory conversations keyed by session id.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    policy: HistoryPolicy,
}

impl SessionStore {
    pub fn new(policy: HistoryPolicy) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            policy,
        }
    }

    /// Generate a fresh opaque session id
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    pub fn get_or_create(&self, id: &str) -> SharedConversation {
        let mut sessions = self.sessions.lock();
        let entry = sessions.entry(id.to_string()).or_insert_with(|| SessionEntry {
            conversation: Arc::new(Mutex::new(Conversation::new(self.policy))),
            last_seen: Instant::now(),
        });
        entry.last_seen = Instant::now();
        entry.conversation.clone()
    }

    pub fn get(&self, id: &str) -> Option<SharedConversation> {
        let mut sessions = self.sessions.lock();
        sessions.get_mut(id).map(|entry| {
            entry.last_seen = Instant::now();
            entry.conversation.clone()
        })
    }

    pub fn remove(&self, id: &str) -> bool {
        self.sessions.lock().remove(id).is_some()
    }

    /// Drop sessions not touched within `ttl`. Returns how many were dropped.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_seen.elapsed() < ttl);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(HistoryPolicy::default())
    }
}

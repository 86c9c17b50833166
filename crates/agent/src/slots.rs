use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::info;

use leadline_core::domain::slot::TimeSlot;

/// Per-session cache of the most recently offered slot list. Booking consumes
/// the entry; the only other eviction is [`SlotCache::sweep`], which clears
/// the whole map once it grows past `max_sessions`. A session swept before
/// booking simply gets the recoverable "search again" failure.
pub struct SlotCache {
    max_sessions: usize,
    entries: RwLock<HashMap<String, Vec<TimeSlot>>>,
}

impl SlotCache {
    pub fn new(max_sessions: usize) -> Self {
        Self { max_sessions, entries: RwLock::new(HashMap::new()) }
    }

    /// Overwrites any previously cached list for the session.
    pub async fn put(&self, session_id: &str, slots: Vec<TimeSlot>) {
        let mut entries = self.entries.write().await;
        entries.insert(session_id.to_string(), slots);
    }

    pub async fn get(&self, session_id: &str) -> Option<Vec<TimeSlot>> {
        let entries = self.entries.read().await;
        entries.get(session_id).cloned()
    }

    pub async fn remove(&self, session_id: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(session_id);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Coarse safety valve, called on a timer owned by the server: clears
    /// everything once the map exceeds the configured bound. Returns whether
    /// a clear happened.
    pub async fn sweep(&self) -> bool {
        let mut entries = self.entries.write().await;
        if entries.len() > self.max_sessions {
            let evicted = entries.len();
            entries.clear();
            info!(evicted, "slot cache cleared by sweep");
            return true;
        }
        false
    }
}

use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

/// Whole-store mapping from session key to entry.
pub type SessionMap = HashMap<String, SessionEntry>;

/// Persisted state for one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    pub session_id: String,
    /// Milliseconds since the Unix epoch of the last reply-mode access.
    pub updated_at: u64,
    #[serde(default)]
    pub system_sent: bool,
    #[serde(default)]
    pub aborted_last_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose_level: Option<String>,
}

impl SessionEntry {
    /// A brand-new session with a random id and all flags cleared.
    pub fn new_session(now: u64) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            updated_at: now,
            system_sent: false,
            aborted_last_run: false,
            thinking_level: None,
            verbose_level: None,
        }
    }

    /// `true` while `now - updated_at <= idle_ms`.
    pub fn is_fresh(&self, now: u64, idle_ms: u64) -> bool {
        now.saturating_sub(self.updated_at) <= idle_ms
    }

    /// Advance `updated_at`; it never moves backwards.
    pub fn touch(&mut self, now: u64) {
        self.updated_at = self.updated_at.max(now);
    }
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Key of the most recently updated entry, if any.
pub fn most_recent_key(store: &SessionMap) -> Option<&str> {
    store
        .iter()
        .max_by_key(|(_, entry)| entry.updated_at)
        .map(|(key, _)| key.as_str())
}

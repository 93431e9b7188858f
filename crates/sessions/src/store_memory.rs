//! In-memory session store for tests and ephemeral runs.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::{Result, entry::SessionMap, store::SessionStore};

#[derive(Default)]
pub struct InMemoryStore {
    entries: Mutex<SessionMap>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with an existing map.
    pub fn with_entries(entries: SessionMap) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Snapshot of the current contents.
    pub fn snapshot(&self) -> SessionMap {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn load(&self) -> Result<SessionMap> {
        Ok(self.snapshot())
    }

    async fn save(&self, store: &SessionMap) -> Result<()> {
        *self.entries.lock().unwrap_or_else(|e| e.into_inner()) = store.clone();
        Ok(())
    }
}

//! Persistence seam for the session map.

use async_trait::async_trait;

use crate::{Result, entry::SessionMap};

/// Whole-map session persistence.
///
/// Callers load the full map, mutate it, and save it back. The pipeline only
/// ever saves at well-defined points, so last-writer-wins is acceptable.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load every entry. A missing store yields an empty map.
    async fn load(&self) -> Result<SessionMap>;

    /// Replace the persisted map with `store`.
    async fn save(&self, store: &SessionMap) -> Result<()>;
}

//! JSON file-backed session store with atomic writes.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
};

use {async_trait::async_trait, fd_lock::RwLock, tracing::warn};

use crate::{
    Result,
    entry::SessionMap,
    error::{Context, Error},
    store::SessionStore,
};

/// Whole-map store kept in a single pretty-printed JSON object file.
///
/// Each read or write holds an advisory lock on a sidecar `.lock` file for
/// the duration of that one operation only.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(path: &Path) -> PathBuf {
        path.with_extension("json.lock")
    }

    fn open_lock(path: &Path) -> Result<RwLock<fs::File>> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(Self::lock_path(path))?;
        Ok(RwLock::new(file))
    }

    fn read_blocking(path: &Path) -> Result<SessionMap> {
        if !path.exists() {
            return Ok(SessionMap::new());
        }
        let mut lock = Self::open_lock(path)?;
        let _guard = lock.read().map_err(|e| Error::lock_failed(e.to_string()))?;
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if data.trim().is_empty() {
            return Ok(SessionMap::new());
        }
        // A corrupt store is surfaced rather than replaced on the next save.
        serde_json::from_str(&data).map_err(|e| {
            warn!(path = %path.display(), error = %e, "malformed session store");
            Error::Json(e)
        })
    }

    /// Write to a temp file, keep a `.bak` of the previous version, then
    /// rename over the target.
    fn write_blocking(path: &Path, json: &str) -> Result<()> {
        let mut lock = Self::open_lock(path)?;
        let _guard = lock.write().map_err(|e| Error::lock_failed(e.to_string()))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json.as_bytes())
            .with_context(|| format!("failed to write {}", tmp.display()))?;

        if path.exists() {
            let bak = path.with_extension("json.bak");
            if let Err(e) = fs::copy(path, &bak) {
                warn!(path = %bak.display(), error = %e, "failed to back up session store");
            }
        }

        fs::rename(&tmp, path).with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn load(&self) -> Result<SessionMap> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::read_blocking(&path)).await?
    }

    async fn save(&self, store: &SessionMap) -> Result<()> {
        let json = serde_json::to_string_pretty(store)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::write_blocking(&path, &json)).await?
    }
}

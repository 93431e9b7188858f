use thiserror::Error;

/// Failures that escape the reply pipeline. Agent and command problems are
/// turned into reply text instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Loading or saving session state failed. Never swallowed.
    #[error("session store: {0}")]
    SessionStore(#[from] parley_sessions::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

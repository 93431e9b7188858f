use thiserror::Error;

/// Session store failures. Callers must not swallow these: a store that
/// cannot be read would otherwise be overwritten on the next save.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Includes a store file that exists but is not a valid session map.
    #[error("session store json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),

    #[error("session store lock failed: {message}")]
    Lock { message: String },

    /// IO failure annotated with the file involved.
    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn lock_failed(message: impl Into<String>) -> Self {
        Self::Lock {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl parley_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

parley_common::impl_context!();

//! Session state for auto-reply conversations.
//!
//! The whole key → entry map is persisted as one JSON object
//! (`sessions.json` in the data directory by default) and read-modify-written
//! per inbound message.

pub mod entry;
pub mod error;
pub mod key;
pub mod store;
pub mod store_file;
pub mod store_memory;

pub use {
    entry::{SessionEntry, SessionMap, most_recent_key, now_ms},
    error::{Error, Result},
    key::derive_session_key,
    store::SessionStore,
    store_file::FileStore,
    store_memory::InMemoryStore,
};

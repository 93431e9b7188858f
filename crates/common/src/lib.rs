//! Shared types and error helpers used across all parley crates.

pub mod error;
pub mod types;

pub use {
    error::FromMessage,
    types::{ChatType, MsgContext, ReplyPayload},
};

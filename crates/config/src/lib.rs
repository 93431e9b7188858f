//! Configuration loading and env substitution.
//!
//! Config files: `parley.toml`, `parley.yaml`, or `parley.json`
//! Searched in `./` then `~/.config/parley/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, data_dir, discover_and_load, expand_home, load_config, resolve_store_path},
    schema::{
        AgentConfig, DEFAULT_HEARTBEAT_MINUTES, GroupChatConfig, InboundConfig, ParleyConfig,
        QueueConfig, ReplyConfig, ReplyMode, SessionConfig, SessionScope,
    },
};

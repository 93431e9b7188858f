use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::ParleyConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["parley.toml", "parley.yaml", "parley.yml", "parley.json"];

/// File name of the default session store inside the data directory.
const SESSION_STORE_FILENAME: &str = "sessions.json";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<ParleyConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./parley.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/parley/parley.{toml,yaml,yml,json}` (user-global)
///
/// Returns `ParleyConfig::default()` if no config file is found.
pub fn discover_and_load() -> ParleyConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    ParleyConfig::default()
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "parley")
}

/// Returns the user-global config directory (`~/.config/parley/`).
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().to_path_buf())
}

/// Returns the data directory, falling back to `./.parley` when the platform
/// has no home directory.
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".parley"))
}

/// Resolve the session store path: an explicit path (with `~/` expanded) or
/// `<data_dir>/sessions.json`.
pub fn resolve_store_path(explicit: Option<&str>) -> PathBuf {
    match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(path) => expand_home(path),
        None => data_dir().join(SESSION_STORE_FILENAME),
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(base) = directories::BaseDirs::new()
    {
        return base.home_dir().join(rest);
    }
    PathBuf::from(path)
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<ParleyConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::schema::{ReplyMode, SessionScope},
    };

    #[test]
    fn loads_toml_reply_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.toml");
        std::fs::write(
            &path,
            r#"
[inbound]
allow_from = ["+15550001"]

[inbound.reply]
mode = "command"
command = ["pi", "{{Body}}"]
timeout_seconds = 30

[inbound.reply.agent]
kind = "pi"
format = "json"

[inbound.reply.session]
scope = "global"
send_system_once = true
"#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        let reply = cfg.inbound.reply.unwrap();
        assert_eq!(reply.mode, ReplyMode::Command);
        assert_eq!(reply.command, vec!["pi", "{{Body}}"]);
        assert_eq!(reply.timeout_seconds(), 30);
        assert_eq!(reply.agent.unwrap().format.as_deref(), Some("json"));
        let session = reply.session.unwrap();
        assert_eq!(session.scope, SessionScope::Global);
        assert!(session.send_system_once);
        assert_eq!(cfg.inbound.allow_from, vec!["+15550001"]);
    }

    #[test]
    fn loads_json_and_yaml() {
        let dir = tempfile::tempdir().unwrap();

        let json = dir.path().join("parley.json");
        std::fs::write(&json, r#"{"inbound":{"reply":{"mode":"text","text":"hi"}}}"#).unwrap();
        let cfg = load_config(&json).unwrap();
        assert_eq!(cfg.inbound.reply.unwrap().text.as_deref(), Some("hi"));

        let yaml = dir.path().join("parley.yaml");
        std::fs::write(&yaml, "queue:\n  max_concurrent: 3\n").unwrap();
        let cfg = load_config(&yaml).unwrap();
        assert_eq!(cfg.queue.max_concurrent, 3);
        assert!(cfg.inbound.reply.is_none());
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.ini");
        std::fs::write(&path, "x=1").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn explicit_store_path_wins() {
        assert_eq!(
            resolve_store_path(Some("/tmp/store.json")),
            PathBuf::from("/tmp/store.json")
        );
        assert!(resolve_store_path(None).ends_with("sessions.json"));
        assert!(resolve_store_path(Some("  ")).ends_with("sessions.json"));
    }
}

/// Config schema types (inbound gating, reply mode, agent, session, queue).
use serde::{Deserialize, Serialize};

/// Default idle window before a conversation starts a fresh session.
pub const DEFAULT_IDLE_MINUTES: u64 = 60;

/// Default message that forces a new session.
pub const DEFAULT_RESET_TRIGGER: &str = "/new";

/// Default wall-clock limit for one agent invocation.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 600;

/// Default interval between typing indicators while the agent runs.
pub const DEFAULT_TYPING_INTERVAL_SECONDS: u64 = 8;

/// Default heartbeat interval for command-mode replies.
pub const DEFAULT_HEARTBEAT_MINUTES: u64 = 30;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub inbound: InboundConfig,
    pub queue: QueueConfig,
}

/// Everything that decides how inbound messages are answered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundConfig {
    /// Sender allowlist (E.164 without transport prefix). `"*"` allows all.
    /// Empty means no filtering.
    pub allow_from: Vec<String>,
    pub group_chat: GroupChatConfig,
    /// Reply configuration. `None` disables auto-reply.
    pub reply: Option<ReplyConfig>,
}

/// Group chat mention handling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupChatConfig {
    /// Regexes matching mentions of the bot; stripped before directive
    /// detection. Invalid patterns are ignored.
    pub mention_patterns: Vec<String>,
}

/// How a reply is produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    /// Reply with a fixed (templated) text.
    #[default]
    Text,
    /// Run an external agent command and reply with its output.
    Command,
}

/// Reply settings (`[inbound.reply]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyConfig {
    pub mode: ReplyMode,
    /// Static reply text for `mode = "text"`. Supports `{{Placeholders}}`.
    pub text: Option<String>,
    /// Static media for `mode = "text"`.
    pub media_url: Option<String>,
    /// Command argv for `mode = "command"`. Elements support `{{Placeholders}}`.
    pub command: Vec<String>,
    /// Command used for heartbeat turns instead of `command`.
    pub heartbeat_command: Vec<String>,
    /// Wall-clock limit per invocation (minimum 1). Defaults to 600.
    pub timeout_seconds: Option<u64>,
    /// Typing indicator interval in command mode. Defaults to 8.
    pub typing_interval_seconds: Option<u64>,
    /// Text prepended to the body (templated).
    pub body_prefix: Option<String>,
    /// Size cap for local media emitted by the agent. Uncapped when unset.
    pub media_max_mb: Option<f64>,
    /// Think level used when neither the message nor the session sets one.
    pub thinking_default: Option<String>,
    /// Verbose level used when neither the message nor the session sets one.
    pub verbose_default: Option<String>,
    /// Heartbeat interval; `0` disables. Defaults to 30 in command mode.
    pub heartbeat_minutes: Option<u64>,
    pub agent: Option<AgentConfig>,
    /// Session handling. `None` runs every message statelessly.
    pub session: Option<SessionConfig>,
}

impl ReplyConfig {
    /// Effective timeout in seconds, never below one.
    #[must_use]
    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS)
            .max(1)
    }

    /// Effective typing interval, `0` when the loop is disabled.
    #[must_use]
    pub fn typing_interval_seconds(&self) -> u64 {
        if self.mode != ReplyMode::Command {
            return 0;
        }
        self.typing_interval_seconds
            .or_else(|| {
                self.session
                    .as_ref()
                    .and_then(|s| s.typing_interval_seconds)
            })
            .unwrap_or(DEFAULT_TYPING_INTERVAL_SECONDS)
    }

    /// Media cap in bytes, if configured.
    #[must_use]
    pub fn media_max_bytes(&self) -> Option<u64> {
        self.media_max_mb
            .filter(|mb| mb.is_finite() && *mb > 0.0)
            .map(|mb| (mb * 1024.0 * 1024.0) as u64)
    }
}

/// Which agent contract drives the command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent kind, e.g. `"pi"`.
    pub kind: String,
    /// Output format requested from the agent: `"text"` or `"json"`.
    pub format: Option<String>,
    /// Identity/system text injected ahead of the body argument.
    pub identity_prefix: Option<String>,
}

/// Session key granularity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionScope {
    /// One session per sender (or per group).
    #[default]
    PerSender,
    /// One session shared by everyone.
    Global,
}

/// Session handling (`[inbound.reply.session]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub scope: SessionScope,
    /// Messages that force a new session. Defaults to `["/new"]`.
    pub reset_triggers: Vec<String>,
    /// Idle window in minutes (minimum 1). Defaults to 60.
    pub idle_minutes: Option<u64>,
    /// Idle window used by heartbeat probes.
    pub heartbeat_idle_minutes: Option<u64>,
    /// Path of the session store file.
    pub store: Option<String>,
    /// Send body prefix and intros only on the first turn of a session.
    pub send_system_once: bool,
    /// Text prepended on the first turn of a session (templated).
    pub session_intro: Option<String>,
    /// Extra argv for a new session. Defaults to `["--session", "{{SessionId}}"]`.
    pub session_arg_new: Option<Vec<String>>,
    /// Extra argv when resuming. Defaults to
    /// `["--session", "{{SessionId}}", "--continue"]`.
    pub session_arg_resume: Option<Vec<String>>,
    pub typing_interval_seconds: Option<u64>,
}

impl SessionConfig {
    /// Configured reset triggers, or the default `/new`.
    #[must_use]
    pub fn reset_triggers(&self) -> Vec<String> {
        let triggers: Vec<String> = self
            .reset_triggers
            .iter()
            .filter(|t| !t.is_empty())
            .cloned()
            .collect();
        if triggers.is_empty() {
            vec![DEFAULT_RESET_TRIGGER.to_string()]
        } else {
            triggers
        }
    }

    #[must_use]
    pub fn idle_minutes(&self) -> u64 {
        self.idle_minutes.unwrap_or(DEFAULT_IDLE_MINUTES).max(1)
    }

    /// Idle window for probes; falls back to the regular window.
    #[must_use]
    pub fn heartbeat_idle_minutes(&self) -> u64 {
        self.heartbeat_idle_minutes
            .map(|m| m.max(1))
            .unwrap_or_else(|| self.idle_minutes())
    }

    #[must_use]
    pub fn session_arg_new(&self) -> Vec<String> {
        self.session_arg_new
            .clone()
            .unwrap_or_else(|| vec!["--session".into(), "{{SessionId}}".into()])
    }

    #[must_use]
    pub fn session_arg_resume(&self) -> Vec<String> {
        self.session_arg_resume.clone().unwrap_or_else(|| {
            vec![
                "--session".into(),
                "{{SessionId}}".into(),
                "--continue".into(),
            ]
        })
    }
}

/// Fairness queue limits for agent executions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum concurrent agent processes. Defaults to 1.
    pub max_concurrent: usize,
    /// Waits shorter than this are not reported. Defaults to 2000.
    pub warn_after_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            warn_after_ms: 2_000,
        }
    }
}

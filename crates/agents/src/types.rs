use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Known agent command-line contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Pi,
}

impl AgentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pi => "pi",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown agent kind: {0}")]
pub struct UnknownAgentKind(pub String);

impl FromStr for AgentKind {
    type Err = UnknownAgentKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pi" | "tau" => Ok(Self::Pi),
            other => Err(UnknownAgentKind(other.to_string())),
        }
    }
}

/// Output format requested from the agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    /// Lenient parse; anything other than `json` is text.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Token accounting reported by the agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentUsage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_write: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

/// Metadata snapshot of the last assistant message of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    /// Session id assigned by the agent itself, when it reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<AgentUsage>,
}

/// Output of one tool call, as echoed by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Short description of the call, e.g. the path or command it touched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentParseResult {
    /// Assistant texts in order, consecutive duplicates coalesced.
    pub texts: Vec<String>,
    pub tool_results: Vec<ToolResult>,
    pub meta: Option<AgentMeta>,
}

/// Everything an agent contract needs to build its final argv.
#[derive(Debug, Clone, Default)]
pub struct BuildArgsContext {
    /// Templated command argv.
    pub argv: Vec<String>,
    /// Position of the body argument in `argv`.
    pub body_index: usize,
    pub is_new_session: bool,
    pub session_id: Option<String>,
    pub send_system_once: bool,
    pub system_sent: bool,
    pub identity_prefix: Option<String>,
    pub format: Option<OutputFormat>,
    /// Templated continuation args for the current session state.
    pub session_args: Vec<String>,
    /// Resolved think level; `None` or `"off"` adds nothing.
    pub thinking_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_aliases() {
        assert_eq!("pi".parse::<AgentKind>().ok(), Some(AgentKind::Pi));
        assert_eq!(" Tau ".parse::<AgentKind>().ok(), Some(AgentKind::Pi));
        assert!("claude".parse::<AgentKind>().is_err());
        assert_eq!(AgentKind::Pi.to_string(), "pi");
    }

    #[test]
    fn format_is_lenient() {
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("rpc"), OutputFormat::Text);
    }
}

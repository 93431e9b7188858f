//! The `pi` (and `tau`) command-line agent.
//!
//! Runs in print mode and, with `--mode json`, streams one JSON event per
//! line. Only completed `message` / `message_end` events are consumed.

use std::path::Path;

use {serde_json::Value, tracing::trace};

use crate::{
    registry::AgentSpec,
    types::{AgentKind, AgentMeta, AgentParseResult, AgentUsage, BuildArgsContext, OutputFormat, ToolResult},
};

const BINARY_NAMES: &[&str] = &["pi", "tau"];

pub struct PiAgent;

impl AgentSpec for PiAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Pi
    }

    fn is_invocation(&self, argv: &[String]) -> bool {
        let Some(first) = argv.first() else {
            return false;
        };
        let base = Path::new(first)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(first);
        let base = strip_script_ext(base);
        BINARY_NAMES.contains(&base)
    }

    fn build_args(&self, ctx: &BuildArgsContext) -> Vec<String> {
        let mut argv = ctx.argv.clone();
        let mut body_pos = ctx.body_index.min(argv.len());

        let mut insert = |argv: &mut Vec<String>, args: &[&str]| {
            for (offset, arg) in args.iter().enumerate() {
                argv.insert(body_pos + offset, (*arg).to_string());
            }
            body_pos += args.len();
        };

        if !has_flag(&argv, "-p") && !has_flag(&argv, "--print") {
            insert(&mut argv, &["-p"]);
        }
        if ctx.format == Some(OutputFormat::Json) && !has_flag(&argv, "--mode") {
            insert(&mut argv, &["--mode", "json"]);
        }
        if let Some(level) = ctx.thinking_level.as_deref()
            && !level.is_empty()
            && level != "off"
            && !has_flag(&argv, "--thinking")
        {
            insert(&mut argv, &["--thinking", level]);
        }
        if !ctx.session_args.is_empty() && !contains_sequence(&argv, &ctx.session_args) {
            let args: Vec<&str> = ctx.session_args.iter().map(String::as_str).collect();
            insert(&mut argv, &args);
        }

        if !(ctx.send_system_once && ctx.system_sent)
            && let Some(prefix) = ctx.identity_prefix.as_deref().filter(|p| !p.is_empty())
            && let Some(body) = argv.get_mut(body_pos)
            && !body.is_empty()
            && !body.starts_with(prefix)
        {
            *body = format!("{prefix}\n\n{body}");
        }

        argv
    }

    fn parse_output(&self, raw_stdout: &str) -> AgentParseResult {
        parse_events(raw_stdout)
    }
}

fn strip_script_ext(name: &str) -> &str {
    let lower = name.to_ascii_lowercase();
    for ext in [".mjs", ".js"] {
        if lower.ends_with(ext) {
            return &name[..name.len() - ext.len()];
        }
    }
    name
}

fn has_flag(argv: &[String], flag: &str) -> bool {
    argv.iter().any(|a| a == flag)
}

fn contains_sequence(argv: &[String], seq: &[String]) -> bool {
    argv.windows(seq.len()).any(|w| w == seq)
}

fn parse_events(raw: &str) -> AgentParseResult {
    let mut result = AgentParseResult::default();
    let mut last_assistant: Option<Value> = None;

    for line in raw.lines().map(str::trim).filter(|l| l.starts_with('{')) {
        let event: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                trace!(error = %e, "skipping malformed agent output line");
                continue;
            },
        };

        if !matches!(
            event.get("type").and_then(Value::as_str),
            Some("message" | "message_end")
        ) {
            continue;
        }
        let Some(msg) = event.get("message") else {
            continue;
        };
        let role = msg.get("role").and_then(Value::as_str).unwrap_or_default();
        let Some(content) = msg.get("content").and_then(Value::as_array) else {
            continue;
        };
        let text = join_text_parts(content);

        if role == "assistant" {
            if !text.is_empty() && result.texts.last() != Some(&text) {
                result.texts.push(text);
                last_assistant = Some(msg.clone());
            }
        } else if role.to_lowercase().contains("tool") && !text.is_empty() {
            result.tool_results.push(ToolResult {
                text,
                tool_name: infer_tool_name(msg, role),
                meta: derive_tool_meta(msg),
            });
        }
    }

    if !result.texts.is_empty() {
        result.meta = last_assistant.as_ref().map(snapshot_meta);
    }
    result
}

fn join_text_parts(content: &[Value]) -> String {
    content
        .iter()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn infer_tool_name(msg: &Value, role: &str) -> Option<String> {
    let explicit = ["toolName", "name", "toolCallId", "tool_call_id"]
        .iter()
        .filter_map(|key| str_field(msg, key))
        .map(str::trim)
        .find(|name| !name.is_empty());
    if let Some(name) = explicit {
        return Some(name.to_string());
    }

    role.split_once(':')
        .map(|(_, suffix)| suffix.trim())
        .filter(|suffix| !suffix.is_empty())
        .map(str::to_string)
}

fn derive_tool_meta(msg: &Value) -> Option<String> {
    let details = msg
        .get("details")
        .filter(|d| !d.is_null())
        .or_else(|| msg.get("arguments"))?;

    if let Some(path) = str_field(details, "path").filter(|p| !p.is_empty()) {
        let offset = details.get("offset").and_then(Value::as_f64);
        let limit = details.get("limit").and_then(Value::as_f64);
        return Some(match (offset, limit) {
            (Some(offset), Some(limit)) => {
                format!("{path}:{}-{}", format_number(offset), format_number(offset + limit))
            },
            _ => path.to_string(),
        });
    }
    str_field(details, "command")
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn snapshot_meta(msg: &Value) -> AgentMeta {
    let owned = |key: &str| str_field(msg, key).map(str::to_string);
    AgentMeta {
        model: owned("model"),
        provider: owned("provider"),
        stop_reason: owned("stopReason"),
        session_id: owned("sessionId"),
        usage: msg.get("usage").filter(|u| u.is_object()).map(|usage| {
            let count = |key: &str| usage.get(key).and_then(Value::as_u64);
            AgentUsage {
                input: count("input"),
                output: count("output"),
                cache_read: count("cacheRead"),
                cache_write: count("cacheWrite"),
                total: count("total"),
            }
        }),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn ctx(items: &[&str]) -> BuildArgsContext {
        let argv = argv(items);
        BuildArgsContext {
            body_index: argv.len() - 1,
            argv,
            ..BuildArgsContext::default()
        }
    }

    #[test]
    fn recognizes_binaries() {
        let pi = PiAgent;
        assert!(pi.is_invocation(&argv(&["pi", "hi"])));
        assert!(pi.is_invocation(&argv(&["/opt/bin/tau.js"])));
        assert!(pi.is_invocation(&argv(&["./node_modules/.bin/pi.mjs"])));
        assert!(!pi.is_invocation(&argv(&["pip"])));
        assert!(!pi.is_invocation(&[]));
    }

    #[test]
    fn injects_print_format_and_identity() {
        let built = PiAgent.build_args(&BuildArgsContext {
            is_new_session: true,
            session_id: Some("sess".into()),
            identity_prefix: Some("IDENT".into()),
            format: Some(OutputFormat::Json),
            ..ctx(&["pi", "hi"])
        });
        assert_eq!(built, argv(&["pi", "-p", "--mode", "json", "IDENT\n\nhi"]));
    }

    #[test]
    fn identity_skipped_once_system_sent() {
        let built = PiAgent.build_args(&BuildArgsContext {
            send_system_once: true,
            system_sent: true,
            identity_prefix: Some("IDENT".into()),
            format: Some(OutputFormat::Json),
            ..ctx(&["pi", "hi"])
        });
        assert_eq!(built.last().map(String::as_str), Some("hi"));
    }

    #[test]
    fn thinking_and_session_args_precede_body() {
        let built = PiAgent.build_args(&BuildArgsContext {
            thinking_level: Some("medium".into()),
            session_args: argv(&["--session", "abc", "--continue"]),
            ..ctx(&["pi", "hello"])
        });
        assert_eq!(
            built,
            argv(&["pi", "-p", "--thinking", "medium", "--session", "abc", "--continue", "hello"])
        );
    }

    #[test]
    fn thinking_off_adds_nothing() {
        let built = PiAgent.build_args(&BuildArgsContext {
            thinking_level: Some("off".into()),
            ..ctx(&["pi", "-p", "hello"])
        });
        assert_eq!(built, argv(&["pi", "-p", "hello"]));
    }

    #[test]
    fn build_args_is_idempotent() {
        let first_ctx = BuildArgsContext {
            identity_prefix: Some("IDENT".into()),
            format: Some(OutputFormat::Json),
            thinking_level: Some("high".into()),
            session_args: argv(&["--session", "abc"]),
            ..ctx(&["pi", "{{Body}}"])
        };
        let once = PiAgent.build_args(&first_ctx);
        let twice = PiAgent.build_args(&BuildArgsContext {
            body_index: once.len() - 1,
            argv: once.clone(),
            ..first_ctx
        });
        assert_eq!(once, twice);
    }

    #[test]
    fn parses_final_assistant_message_with_usage() {
        let stdout = [
            r#"{"type":"message_start","message":{"role":"assistant"}}"#,
            r#"{"type":"message_end","message":{"role":"assistant","content":[{"type":"text","text":"hello world"}],"usage":{"input":10,"output":5},"model":"pi-1","provider":"inflection","stopReason":"end"}}"#,
        ]
        .join("\n");
        let parsed = PiAgent.parse_output(&stdout);
        assert_eq!(parsed.texts, vec!["hello world"]);
        let meta = parsed.meta.unwrap();
        assert_eq!(meta.provider.as_deref(), Some("inflection"));
        assert_eq!(meta.stop_reason.as_deref(), Some("end"));
        assert_eq!(meta.usage.unwrap().output, Some(5));
    }

    #[test]
    fn coalesces_consecutive_duplicates() {
        let line = r#"{"type":"message","message":{"role":"assistant","content":[{"type":"text","text":" same "}]}}"#;
        let other = r#"{"type":"message","message":{"role":"assistant","content":[{"type":"text","text":"other"}]}}"#;
        let stdout = [line, line, other, line].join("\n\n");
        let parsed = PiAgent.parse_output(&stdout);
        assert_eq!(parsed.texts, vec!["same", "other", "same"]);
    }

    #[test]
    fn skips_malformed_and_unrelated_lines() {
        let stdout = [
            "not json",
            "{broken",
            r#"{"type":"tool_execution_start","message":{"role":"assistant","content":[{"type":"text","text":"nope"}]}}"#,
            r#"{"type":"message_end","message":{"role":"assistant","content":[{"type":"image"},{"type":"text","text":"a"},{"type":"text","text":"b"}]}}"#,
        ]
        .join("\n");
        let parsed = PiAgent.parse_output(&stdout);
        assert_eq!(parsed.texts, vec!["a\nb"]);
    }

    #[test]
    fn no_texts_means_no_meta() {
        let stdout = r#"{"type":"message_end","message":{"role":"assistant","content":[],"model":"pi-1"}}"#;
        let parsed = PiAgent.parse_output(stdout);
        assert!(parsed.texts.is_empty());
        assert!(parsed.meta.is_none());
    }

    #[test]
    fn tool_result_name_and_command_meta() {
        let stdout = r#"{"type":"message_end","message":{"role":"tool_result","name":"bash","details":{"command":"ls -la"},"content":[{"type":"text","text":"ls output"}]}}"#;
        let parsed = PiAgent.parse_output(stdout);
        assert_eq!(
            parsed.tool_results,
            vec![ToolResult {
                text: "ls output".into(),
                tool_name: Some("bash".into()),
                meta: Some("ls -la".into()),
            }]
        );
    }

    #[test]
    fn tool_name_from_role_suffix_and_path_range() {
        let stdout = r#"{"type":"message","message":{"role":"toolResult:read","arguments":{"path":"src/main.rs","offset":10,"limit":20},"content":[{"type":"text","text":"fn main() {}"}]}}"#;
        let parsed = PiAgent.parse_output(stdout);
        let tool = &parsed.tool_results[0];
        assert_eq!(tool.tool_name.as_deref(), Some("read"));
        assert_eq!(tool.meta.as_deref(), Some("src/main.rs:10-30"));
    }

    #[test]
    fn meta_from_last_captured_assistant() {
        let stdout = [
            r#"{"type":"message_end","message":{"role":"assistant","content":[{"type":"text","text":"one"}],"model":"m1"}}"#,
            r#"{"type":"message_end","message":{"role":"assistant","content":[{"type":"text","text":"two"}],"model":"m2","sessionId":"agent-sess"}}"#,
            r#"{"type":"message_end","message":{"role":"assistant","content":[{"type":"text","text":"two"}],"model":"m3"}}"#,
        ]
        .join("\n");
        let meta = PiAgent.parse_output(&stdout).meta.unwrap();
        assert_eq!(meta.model.as_deref(), Some("m2"));
        assert_eq!(meta.session_id.as_deref(), Some("agent-sess"));
    }
}

//! Command invocation bridge: argv building, queued execution and turning the
//! agent's output into reply payloads.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use {
    parley_agents::{AgentKind, AgentMeta, AgentRegistry, AgentSpec, BuildArgsContext, OutputFormat, ToolResult},
    parley_common::ReplyPayload,
    parley_config::{AgentConfig, SessionConfig},
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use parley_metrics::{command as command_metrics, counter, histogram, labels};

use crate::{
    exec::{CommandFailure, CommandOutput, CommandRunner},
    media::{filter_local_media, split_media_from_output},
    queue::CommandQueue,
    template::{BODY, TemplateContext, apply_template, references},
    thinking::ThinkLevel,
    typing::ReplyHooks,
};

/// Characters of partial stdout quoted after a timeout.
const PARTIAL_SNIPPET_CHARS: usize = 800;
/// Characters of stderr quoted after a failed exit.
const STDERR_SNIPPET_CHARS: usize = 800;
/// Characters of tool output shown per verbose tool payload.
const TOOL_TEXT_CHARS: usize = 1000;

/// Everything needed for one agent invocation.
#[derive(Clone, Default)]
pub struct CommandRequest<'a> {
    /// Untemplated argv (`command` or `heartbeat_command`).
    pub argv: &'a [String],
    /// Placeholder values, with `Body` already set to the composed body.
    pub template: TemplateContext,
    pub agent: Option<&'a AgentConfig>,
    /// Session handling; `None` adds no continuation args.
    pub session: Option<&'a SessionConfig>,
    pub is_new_session: bool,
    pub session_id: Option<&'a str>,
    pub system_sent: bool,
    pub thinking_level: Option<ThinkLevel>,
    pub verbose: bool,
    pub timeout: Duration,
    pub media_max_bytes: Option<u64>,
    /// Receives verbose tool payloads as soon as they are parsed.
    pub hooks: Option<Arc<dyn ReplyHooks>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandReplyMeta {
    pub duration_ms: u64,
    pub queued_ms: Option<u64>,
    pub queued_ahead: Option<usize>,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub killed: bool,
    pub agent_meta: Option<AgentMeta>,
}

#[derive(Debug, Clone, Default)]
pub struct CommandReply {
    pub payloads: Vec<ReplyPayload>,
    pub meta: CommandReplyMeta,
}

/// Runs agent commands through the shared queue and runner.
#[derive(Clone)]
pub struct CommandBridge {
    registry: AgentRegistry,
    runner: Arc<dyn CommandRunner>,
    queue: Arc<dyn CommandQueue>,
}

impl CommandBridge {
    pub fn new(
        registry: AgentRegistry,
        runner: Arc<dyn CommandRunner>,
        queue: Arc<dyn CommandQueue>,
    ) -> Self {
        Self {
            registry,
            runner,
            queue,
        }
    }

    /// Contract for this command: the configured kind, else argv detection.
    fn agent_for(&self, agent: Option<&AgentConfig>, argv: &[String]) -> Option<Arc<dyn AgentSpec>> {
        if let Some(kind) = agent.map(|a| a.kind.as_str()).filter(|k| !k.trim().is_empty()) {
            match kind.parse::<AgentKind>() {
                Ok(kind) => return self.registry.get(kind),
                Err(e) => warn!(error = %e, "falling back to argv detection"),
            }
        }
        self.registry.detect(argv)
    }

    /// Final argv and the contract that will parse its output.
    pub fn build_argv(&self, req: &CommandRequest<'_>) -> (Vec<String>, Option<Arc<dyn AgentSpec>>) {
        let argv: Vec<String> = req
            .argv
            .iter()
            .map(|arg| apply_template(arg, &req.template))
            .collect();
        let body_index = req
            .argv
            .iter()
            .position(|arg| references(arg, BODY))
            .unwrap_or_else(|| argv.len().saturating_sub(1));

        let session_args: Vec<String> = req
            .session
            .map(|cfg| {
                let args = if req.is_new_session {
                    cfg.session_arg_new()
                } else {
                    cfg.session_arg_resume()
                };
                args.iter()
                    .map(|arg| apply_template(arg, &req.template))
                    .collect()
            })
            .unwrap_or_default();

        let spec = self.agent_for(req.agent, &argv);
        let Some(spec) = spec else {
            let mut argv = argv;
            if !session_args.is_empty() && !argv.is_empty() {
                let at = body_index.min(argv.len());
                argv.splice(at..at, session_args);
            }
            return (argv, None);
        };

        let ctx = BuildArgsContext {
            argv,
            body_index,
            is_new_session: req.is_new_session,
            session_id: req.session_id.map(str::to_string),
            send_system_once: req.session.is_some_and(|s| s.send_system_once),
            system_sent: req.system_sent,
            identity_prefix: req.agent.and_then(|a| a.identity_prefix.clone()),
            format: req
                .agent
                .and_then(|a| a.format.as_deref())
                .map(OutputFormat::parse),
            session_args,
            thinking_level: req.thinking_level.map(|level| level.as_str().to_string()),
        };
        (spec.build_args(&ctx), Some(spec))
    }

    /// Run one request. Failures become text payloads; nothing is propagated.
    pub async fn run(&self, req: &CommandRequest<'_>) -> CommandReply {
        let (argv, spec) = self.build_argv(req);
        let agent_label = spec
            .as_ref()
            .map_or("command", |spec| spec.kind().as_str());

        let waited: Arc<Mutex<Option<(u64, usize)>>> = Arc::default();
        let sink = Arc::clone(&waited);
        let runner = Arc::clone(&self.runner);
        let timeout = req.timeout;
        let task_argv = argv.clone();

        let started = Instant::now();
        let result = self
            .queue
            .enqueue(
                Box::pin(async move { runner.run(&task_argv, timeout).await }),
                Some(Box::new(move |ms, ahead| {
                    *sink.lock().unwrap_or_else(|e| e.into_inner()) = Some((ms, ahead));
                })),
            )
            .await;
        let duration = started.elapsed();

        #[cfg(feature = "metrics")]
        {
            counter!(command_metrics::EXECUTIONS_TOTAL, labels::AGENT => agent_label).increment(1);
            histogram!(command_metrics::EXECUTION_DURATION_SECONDS, labels::AGENT => agent_label)
                .record(duration.as_secs_f64());
        }

        let queued = *waited.lock().unwrap_or_else(|e| e.into_inner());
        let mut meta = CommandReplyMeta {
            duration_ms: duration.as_millis() as u64,
            queued_ms: queued.map(|(ms, _)| ms),
            queued_ahead: queued.map(|(_, ahead)| ahead),
            ..CommandReplyMeta::default()
        };

        let output = match result {
            Ok(output) => output,
            Err(CommandFailure::TimedOut { stdout, .. }) => {
                #[cfg(feature = "metrics")]
                counter!(command_metrics::TIMEOUTS_TOTAL, labels::AGENT => agent_label).increment(1);
                warn!(agent = agent_label, timeout_secs = timeout.as_secs(), "agent command timed out");
                meta.killed = true;
                return CommandReply {
                    payloads: vec![ReplyPayload::text(timeout_text(timeout, &stdout))],
                    meta,
                };
            },
            Err(CommandFailure::Io(e)) => {
                #[cfg(feature = "metrics")]
                counter!(command_metrics::ERRORS_TOTAL, labels::AGENT => agent_label).increment(1);
                warn!(agent = agent_label, error = %e, "agent command failed");
                return CommandReply {
                    payloads: vec![ReplyPayload::text(format!("Command failed: {e}"))],
                    meta,
                };
            },
        };

        meta.exit_code = output.exit_code;
        meta.signal = output.signal;
        meta.killed = output.killed;
        info!(
            agent = agent_label,
            duration_ms = meta.duration_ms,
            exit_code = ?output.exit_code,
            queued_ms = ?meta.queued_ms,
            "agent command finished"
        );

        if !output.success() && output.stdout.trim().is_empty() {
            #[cfg(feature = "metrics")]
            counter!(command_metrics::ERRORS_TOTAL, labels::AGENT => agent_label).increment(1);
            return CommandReply {
                payloads: vec![ReplyPayload::text(exit_text(&output))],
                meta,
            };
        }

        let parsed = spec
            .as_ref()
            .map(|spec| spec.parse_output(&output.stdout))
            .unwrap_or_default();
        meta.agent_meta = parsed.meta;

        let mut payloads = Vec::new();
        if req.verbose {
            let tools = parsed.tool_results.iter().map(tool_payload);
            match &req.hooks {
                Some(hooks) => {
                    for payload in tools {
                        hooks.on_partial_reply(&payload).await;
                    }
                },
                None => payloads.extend(tools),
            }
        }
        let texts = if parsed.texts.is_empty() {
            vec![output.stdout.clone()]
        } else {
            parsed.texts
        };
        for text in texts {
            let (text, media) = split_media_from_output(&text);
            let media = filter_local_media(media, req.media_max_bytes).await;
            let payload = ReplyPayload {
                text: Some(text).filter(|t| !t.is_empty()),
                media_url: media.first().cloned(),
                media_urls: media,
            };
            if !payload.is_empty() {
                payloads.push(payload);
            }
        }
        debug!(payloads = payloads.len(), "assembled command reply");
        CommandReply { payloads, meta }
    }
}

/// Last `max` characters of `text`.
fn tail_chars(text: &str, max: usize) -> &str {
    let count = text.chars().count();
    if count <= max {
        return text;
    }
    let skip = count - max;
    text.char_indices()
        .nth(skip)
        .map_or(text, |(idx, _)| &text[idx..])
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

fn timeout_text(timeout: Duration, partial_stdout: &str) -> String {
    let mut text = format!("Command timed out after {}s", timeout.as_secs().max(1));
    let partial = partial_stdout.trim();
    if !partial.is_empty() {
        text.push_str("\n\nPartial output before timeout:\n");
        text.push_str(tail_chars(partial, PARTIAL_SNIPPET_CHARS));
    }
    text
}

fn exit_text(output: &CommandOutput) -> String {
    let code = output
        .exit_code
        .map_or_else(|| "unknown".to_string(), |code| code.to_string());
    let mut text = format!("Command exited with code {code}");
    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        text.push_str("\n\n");
        text.push_str(tail_chars(stderr, STDERR_SNIPPET_CHARS));
    }
    text
}

fn tool_payload(tool: &ToolResult) -> ReplyPayload {
    let name = tool.tool_name.as_deref().unwrap_or("tool");
    let mut text = match tool.meta.as_deref().filter(|m| !m.is_empty()) {
        Some(meta) => format!("🛠️ {name}: {meta}"),
        None => format!("🛠️ {name}"),
    };
    if !tool.text.is_empty() {
        text.push('\n');
        text.push_str(&truncate_chars(&tool.text, TOOL_TEXT_CHARS));
    }
    ReplyPayload::text(text)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::queue::SemaphoreQueue, async_trait::async_trait};

    struct Recording {
        calls: Mutex<Vec<Vec<String>>>,
        result: fn() -> crate::exec::CommandResult,
    }

    #[async_trait]
    impl CommandRunner for Recording {
        async fn run(&self, argv: &[String], _timeout: Duration) -> crate::exec::CommandResult {
            self.calls.lock().unwrap().push(argv.to_vec());
            (self.result)()
        }
    }

    fn bridge(result: fn() -> crate::exec::CommandResult) -> (CommandBridge, Arc<Recording>) {
        let runner = Arc::new(Recording {
            calls: Mutex::new(Vec::new()),
            result,
        });
        let bridge = CommandBridge::new(
            AgentRegistry::new(),
            runner.clone(),
            Arc::new(SemaphoreQueue::new(1, Duration::from_secs(60))),
        );
        (bridge, runner)
    }

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn plain_command_gets_session_args_before_body() {
        let (bridge, _) = bridge(|| Ok(CommandOutput::default()));
        let template = TemplateContext::default()
            .with(BODY, "hello")
            .with("SessionId", "abc");
        let cmd = argv(&["echo", "{{Body}}"]);
        let session = SessionConfig::default();
        let (argv, spec) = bridge.build_argv(&CommandRequest {
            argv: &cmd,
            template: template.clone(),
            session: Some(&session),
            is_new_session: true,
            ..CommandRequest::default()
        });
        assert!(spec.is_none());
        assert_eq!(argv, vec!["echo", "--session", "abc", "hello"]);
    }

    #[test]
    fn pi_argv_with_thinking_and_resume() {
        let (bridge, _) = bridge(|| Ok(CommandOutput::default()));
        let template = TemplateContext::default()
            .with(BODY, "hello")
            .with("SessionId", "abc");
        let cmd = argv(&["pi", "{{Body}}"]);
        let session = SessionConfig::default();
        let agent = AgentConfig {
            kind: "pi".into(),
            format: Some("json".into()),
            identity_prefix: None,
        };
        let (argv, spec) = bridge.build_argv(&CommandRequest {
            argv: &cmd,
            template: template.clone(),
            agent: Some(&agent),
            session: Some(&session),
            is_new_session: false,
            session_id: Some("abc"),
            thinking_level: Some(ThinkLevel::Medium),
            ..CommandRequest::default()
        });
        assert_eq!(spec.map(|s| s.kind()), Some(AgentKind::Pi));
        assert_eq!(argv.first().map(String::as_str), Some("pi"));
        assert_eq!(argv.last().map(String::as_str), Some("hello"));
        for flag in ["-p", "--mode", "json", "--thinking", "medium", "--session", "abc", "--continue"] {
            assert!(argv.iter().any(|a| a == flag), "missing {flag} in {argv:?}");
        }
    }

    #[test]
    fn body_index_falls_back_to_last() {
        let (bridge, _) = bridge(|| Ok(CommandOutput::default()));
        let template = TemplateContext::default().with("SessionId", "s1");
        let cmd = argv(&["tool", "--flag", "fixed prompt"]);
        let session = SessionConfig::default();
        let (argv, _) = bridge.build_argv(&CommandRequest {
            argv: &cmd,
            template: template.clone(),
            session: Some(&session),
            is_new_session: true,
            ..CommandRequest::default()
        });
        assert_eq!(argv, vec!["tool", "--flag", "--session", "s1", "fixed prompt"]);
    }

    #[tokio::test]
    async fn io_failure_becomes_text() {
        let (bridge, _) = bridge(|| Err(std::io::Error::other("boom").into()));
        let cmd = argv(&["echo", "hi"]);
        let template = TemplateContext::default();
        let reply = bridge
            .run(&CommandRequest {
                argv: &cmd,
                template: template.clone(),
                timeout: Duration::from_secs(1),
                ..CommandRequest::default()
            })
            .await;
        assert_eq!(reply.payloads, vec![ReplyPayload::text("Command failed: boom")]);
        assert!(!reply.meta.killed);
    }

    #[tokio::test]
    async fn nonzero_exit_without_stdout_reports_code_and_stderr() {
        let (bridge, _) = bridge(|| {
            Ok(CommandOutput {
                stderr: "bad things\n".into(),
                exit_code: Some(2),
                ..CommandOutput::default()
            })
        });
        let cmd = argv(&["echo", "hi"]);
        let template = TemplateContext::default();
        let reply = bridge
            .run(&CommandRequest {
                argv: &cmd,
                template: template.clone(),
                timeout: Duration::from_secs(1),
                ..CommandRequest::default()
            })
            .await;
        assert_eq!(
            reply.payloads,
            vec![ReplyPayload::text("Command exited with code 2\n\nbad things")]
        );
        assert_eq!(reply.meta.exit_code, Some(2));
    }

    #[tokio::test]
    async fn verbose_tool_payloads_come_first() {
        let (bridge, _) = bridge(|| {
            Ok(CommandOutput {
                stdout: [
                    r#"{"type":"message_end","message":{"role":"toolResult","toolName":"read","details":{"path":"/tmp/a.txt"},"content":[{"type":"text","text":"file body"}]}}"#,
                    r#"{"type":"message_end","message":{"role":"assistant","content":[{"type":"text","text":"done"}]}}"#,
                ]
                .join("\n"),
                exit_code: Some(0),
                ..CommandOutput::default()
            })
        });
        let cmd = argv(&["pi", "{{Body}}"]);
        let template = TemplateContext::default().with(BODY, "go");
        let reply = bridge
            .run(&CommandRequest {
                argv: &cmd,
                template: template.clone(),
                verbose: true,
                timeout: Duration::from_secs(1),
                ..CommandRequest::default()
            })
            .await;
        let texts: Vec<_> = reply.payloads.iter().filter_map(|p| p.text.clone()).collect();
        assert_eq!(texts, vec!["🛠️ read: /tmp/a.txt\nfile body", "done"]);
    }

    #[test]
    fn snippets_respect_char_boundaries() {
        assert_eq!(tail_chars("héllo", 3), "llo");
        assert_eq!(tail_chars("hi", 10), "hi");
        assert_eq!(truncate_chars("ééé", 2), "éé…");
        assert_eq!(timeout_text(Duration::from_secs(1), "  "), "Command timed out after 1s");
    }
}

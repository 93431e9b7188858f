//! The per-message reply pipeline.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use {
    parley_agents::AgentRegistry,
    parley_common::{MsgContext, ReplyPayload},
    parley_config::{ParleyConfig, ReplyConfig, ReplyMode, resolve_store_path},
    parley_sessions::{FileStore, SessionStore, now_ms},
    tracing::{debug, info},
};

#[cfg(feature = "metrics")]
use parley_metrics::{auto_reply as reply_metrics, counter, histogram, labels};

use crate::{
    abort::{ABORT_REPLY, AbortMemory, is_abort_trigger},
    body::{BodyParts, compose_body, group_intro, media_note, take_leading_think_level},
    command::{CommandBridge, CommandRequest},
    directives::{Directive, extract_think_directive, extract_verbose_directive, is_empty_residue},
    error::Result,
    exec::TokioCommandRunner,
    queue::SemaphoreQueue,
    session::{SessionAccess, SessionState, resolve_session},
    template::{BODY, BODY_STRIPPED, IS_NEW_SESSION, SESSION_ID, TemplateContext, apply_template},
    thinking::{ThinkLevel, VerboseLevel, normalize_think_level, normalize_verbose_level},
    typing::{ReplyHooks, TypingLoop},
};

/// Per-call options.
#[derive(Clone, Default)]
pub struct ReplyOptions {
    /// Typing indicator hooks of the inbound transport.
    pub hooks: Option<Arc<dyn ReplyHooks>>,
    /// Heartbeat turn: probe session access and `heartbeat_command`.
    pub is_heartbeat: bool,
}

/// Payloads of one turn plus the session it resolved, kept so heartbeat
/// probes can commit it afterwards.
pub(crate) struct Turn {
    pub payloads: Vec<ReplyPayload>,
    pub session: Option<SessionState>,
}

impl Turn {
    fn none() -> Self {
        Self {
            payloads: Vec::new(),
            session: None,
        }
    }

    fn text(text: impl Into<String>) -> Self {
        Self {
            payloads: vec![ReplyPayload::text(text)],
            session: None,
        }
    }
}

/// Turns inbound messages into reply payloads.
pub struct ReplyPipeline {
    config: Arc<ParleyConfig>,
    store: Arc<dyn SessionStore>,
    bridge: CommandBridge,
    abort_memory: AbortMemory,
}

impl ReplyPipeline {
    pub fn new(
        config: ParleyConfig,
        store: Arc<dyn SessionStore>,
        bridge: CommandBridge,
        abort_memory: AbortMemory,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            bridge,
            abort_memory,
        }
    }

    /// Production wiring: file-backed sessions, `tokio::process` runner and
    /// the semaphore queue.
    pub fn from_config(config: ParleyConfig) -> Self {
        let store_path = resolve_store_path(
            config
                .inbound
                .reply
                .as_ref()
                .and_then(|reply| reply.session.as_ref())
                .and_then(|session| session.store.as_deref()),
        );
        debug!(path = %store_path.display(), "using session store");
        let bridge = CommandBridge::new(
            AgentRegistry::new(),
            Arc::new(TokioCommandRunner),
            Arc::new(SemaphoreQueue::from_config(&config.queue)),
        );
        Self::new(
            config,
            Arc::new(FileStore::new(store_path)),
            bridge,
            AbortMemory::default(),
        )
    }

    pub fn config(&self) -> &ParleyConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Reply payloads for one inbound message. Empty means no reply.
    ///
    /// Only session store failures are returned as errors.
    pub async fn get_reply(&self, ctx: &MsgContext, opts: &ReplyOptions) -> Result<Vec<ReplyPayload>> {
        Ok(self.respond(ctx, opts).await?.payloads)
    }

    pub(crate) async fn respond(&self, ctx: &MsgContext, opts: &ReplyOptions) -> Result<Turn> {
        let Some(reply) = self.config.inbound.reply.as_ref() else {
            debug!("no inbound.reply configured, skipping auto-reply");
            return Ok(Turn::none());
        };
        let started = Instant::now();
        #[cfg(feature = "metrics")]
        counter!(reply_metrics::MESSAGES_RECEIVED_TOTAL, labels::MODE => mode_label(reply.mode))
            .increment(1);

        let access = if opts.is_heartbeat {
            SessionAccess::Probe
        } else {
            SessionAccess::Reply
        };
        let session_cfg = reply.session.as_ref();
        let (mut session, body) = match session_cfg {
            Some(cfg) => {
                let resolved = resolve_session(Arc::clone(&self.store), cfg, ctx, access, now_ms()).await?;
                (Some(resolved.state), resolved.body)
            },
            None => (None, ctx.body.clone()),
        };

        let think = extract_think_directive(&body);
        let verbose = extract_verbose_directive(&think.cleaned);
        let body = verbose.cleaned.clone();
        let is_group = ctx.is_group();
        let self_id = Some(ctx.to_normalized()).filter(|id| !id.is_empty());
        let residue_empty = is_empty_residue(
            &body,
            is_group,
            self_id,
            &self.config.inbound.group_chat.mention_patterns,
        );
        if let Some(ack) = directive_ack(&think, &verbose, residue_empty, session.as_mut()).await? {
            return Ok(Turn::text(ack));
        }

        if let Some(state) = session.as_mut() {
            state.persist().await?;
        }

        let mut think_level = think
            .level
            .or_else(|| {
                session
                    .as_ref()
                    .and_then(|s| s.entry.thinking_level.as_deref())
                    .and_then(normalize_think_level)
            })
            .or_else(|| reply.thinking_default.as_deref().and_then(normalize_think_level));
        let verbose_level = verbose
            .level
            .or_else(|| {
                session
                    .as_ref()
                    .and_then(|s| s.entry.verbose_level.as_deref())
                    .and_then(normalize_verbose_level)
            })
            .or_else(|| reply.verbose_default.as_deref().and_then(normalize_verbose_level));

        let from = ctx.from_normalized();
        let to = ctx.to_normalized();
        if !self.is_allowed(from, to, is_group) {
            info!(from, "sender not in allow_from, skipping auto-reply");
            #[cfg(feature = "metrics")]
            counter!(reply_metrics::MESSAGES_DROPPED_TOTAL, labels::REASON => "allowlist").increment(1);
            return Ok(Turn::none());
        }

        let abort_key = session
            .as_ref()
            .map(|s| s.key.clone())
            .or_else(|| Some(from.to_string()).filter(|f| !f.is_empty()))
            .or_else(|| Some(to.to_string()).filter(|t| !t.is_empty()));
        let aborted_last_run = match &session {
            Some(state) => state.entry.aborted_last_run,
            None => abort_key
                .as_deref()
                .is_some_and(|key| self.abort_memory.is_aborted(key)),
        };
        let command_mode = reply.mode == ReplyMode::Command;

        if command_mode && is_abort_trigger(&body) {
            info!(key = ?abort_key, "abort requested");
            #[cfg(feature = "metrics")]
            counter!(reply_metrics::ABORTS_TOTAL).increment(1);
            match session.as_mut() {
                Some(state) => {
                    state.entry.aborted_last_run = true;
                    state.persist().await?;
                },
                None => {
                    if let Some(key) = abort_key.as_deref() {
                        self.abort_memory.set(key, true);
                    }
                },
            }
            return Ok(Turn::text(ABORT_REPLY));
        }

        let send_system_once = session_cfg.is_some_and(|cfg| cfg.send_system_once);
        let (is_new, system_sent) = session
            .as_ref()
            .map_or((false, false), |s| (s.is_new, s.entry.system_sent));
        let first_turn = is_new || !system_sent;

        let mut template = TemplateContext::from_message(ctx)
            .with(BODY, body.clone())
            .with(BODY_STRIPPED, body.clone())
            .with(IS_NEW_SESSION, if is_new { "true" } else { "false" });
        if let Some(state) = &session {
            template.set(SESSION_ID, state.entry.session_id.clone());
        }

        let session_intro = session_cfg
            .and_then(|cfg| cfg.session_intro.as_deref())
            .filter(|_| first_turn)
            .map(|intro| apply_template(intro, &template));
        let group_intro = (first_turn && is_group).then(|| {
            group_intro(ctx.group_subject.as_deref(), ctx.group_members.as_deref())
        });
        let body_prefix = reply
            .body_prefix
            .as_deref()
            .map(|prefix| apply_template(prefix, &template));
        let aborted_hint = command_mode && aborted_last_run;

        let mut dirty = false;
        if aborted_hint {
            match session.as_mut() {
                Some(state) => {
                    state.entry.aborted_last_run = false;
                    dirty = true;
                },
                None => {
                    if let Some(key) = abort_key.as_deref() {
                        self.abort_memory.set(key, false);
                    }
                },
            }
        }
        if send_system_once
            && first_turn
            && let Some(state) = session.as_mut()
        {
            state.entry.system_sent = true;
            dirty = true;
        }
        if dirty && let Some(state) = session.as_mut() {
            state.persist().await?;
        }

        let note = media_note(ctx);
        let media_hint = note.is_some() && command_mode;
        let mut composed = compose_body(&BodyParts {
            aborted_hint,
            group_intro,
            session_intro,
            body_prefix,
            include_prefix: !send_system_once || first_turn,
            body: &body,
            transcript: ctx.transcript.as_deref().filter(|_| command_mode),
            media_note: note,
            media_hint,
        });
        if think_level.is_none()
            && let Some((level, rest)) = take_leading_think_level(&composed)
        {
            think_level = Some(level);
            composed = rest;
        }
        template.set(BODY, composed.clone());
        template.set(BODY_STRIPPED, composed);

        let turn = match reply.mode {
            ReplyMode::Text => self.text_reply(reply, &template, opts, session).await,
            ReplyMode::Command => {
                self.command_reply(reply, template, opts, session, CommandTurn {
                    is_new,
                    system_sent,
                    think_level,
                    verbose: verbose_level == Some(VerboseLevel::On),
                })
                .await?
            },
        };

        #[cfg(feature = "metrics")]
        histogram!(reply_metrics::PROCESSING_DURATION_SECONDS, labels::MODE => mode_label(reply.mode))
            .record(started.elapsed().as_secs_f64());
        debug!(
            payloads = turn.payloads.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "auto-reply finished"
        );
        Ok(turn)
    }

    /// Same-phone always passes, groups bypass the list, `*` allows everyone.
    fn is_allowed(&self, from: &str, to: &str, is_group: bool) -> bool {
        let allow_from = &self.config.inbound.allow_from;
        if !from.is_empty() && from == to {
            debug!(from, "allowing same-phone mode");
            return true;
        }
        if is_group || allow_from.is_empty() {
            return true;
        }
        allow_from.iter().any(|allowed| allowed == "*" || allowed == from)
    }

    async fn text_reply(
        &self,
        reply: &ReplyConfig,
        template: &TemplateContext,
        opts: &ReplyOptions,
        session: Option<SessionState>,
    ) -> Turn {
        let Some(text) = reply.text.as_deref().filter(|t| !t.is_empty()) else {
            debug!("text mode without reply text, nothing to send");
            return Turn { payloads: Vec::new(), session };
        };
        if let Some(hooks) = &opts.hooks {
            hooks.on_reply_start().await;
        }
        let payload = ReplyPayload {
            text: Some(apply_template(text, template)),
            media_url: reply.media_url.clone(),
            media_urls: Vec::new(),
        };
        Turn {
            payloads: vec![payload],
            session,
        }
    }

    async fn command_reply(
        &self,
        reply: &ReplyConfig,
        template: TemplateContext,
        opts: &ReplyOptions,
        mut session: Option<SessionState>,
        turn: CommandTurn,
    ) -> Result<Turn> {
        let argv = if opts.is_heartbeat && !reply.heartbeat_command.is_empty() {
            &reply.heartbeat_command
        } else {
            &reply.command
        };
        if argv.is_empty() {
            debug!("command mode without a command, nothing to run");
            return Ok(Turn { payloads: Vec::new(), session });
        }

        let mut typing = match &opts.hooks {
            Some(hooks) => Some(
                TypingLoop::start(
                    Arc::clone(hooks),
                    Duration::from_secs(reply.typing_interval_seconds()),
                )
                .await,
            ),
            None => None,
        };
        let result = {
            let request = CommandRequest {
                argv,
                template,
                agent: reply.agent.as_ref(),
                session: reply.session.as_ref(),
                is_new_session: turn.is_new,
                session_id: session.as_ref().map(|s| s.entry.session_id.as_str()),
                system_sent: turn.system_sent,
                thinking_level: turn.think_level,
                verbose: turn.verbose,
                timeout: Duration::from_secs(reply.timeout_seconds()),
                media_max_bytes: reply.media_max_bytes(),
                hooks: opts.hooks.clone(),
            };
            self.bridge.run(&request).await
        };
        if let Some(typing) = typing.as_mut() {
            typing.stop();
        }

        let mut payloads = result.payloads;
        if payloads.is_empty() {
            return Ok(Turn { payloads, session });
        }

        if let Some(state) = session.as_mut()
            && let Some(id) = result
                .meta
                .agent_meta
                .as_ref()
                .and_then(|meta| meta.session_id.as_deref())
            && state.adopt_session_id(id)
        {
            state.persist().await?;
        }
        if let Some(meta) = &result.meta.agent_meta {
            debug!(
                model = ?meta.model,
                provider = ?meta.provider,
                stop_reason = ?meta.stop_reason,
                "agent meta"
            );
        }

        if turn.verbose && turn.is_new {
            let id = session
                .as_ref()
                .map(|s| s.entry.session_id.clone())
                .or_else(|| result.meta.agent_meta.as_ref().and_then(|m| m.session_id.clone()))
                .unwrap_or_else(|| "unknown".to_string());
            payloads.insert(0, ReplyPayload::text(format!("🧭 New session: {id}")));
        }
        Ok(Turn { payloads, session })
    }
}

/// Per-turn values the command branch needs from earlier stages.
struct CommandTurn {
    is_new: bool,
    /// `system_sent` as it was before this turn.
    system_sent: bool,
    think_level: Option<ThinkLevel>,
    verbose: bool,
}

fn unrecognized_think(raw: Option<&str>) -> String {
    format!(
        "Unrecognized thinking level \"{}\". Valid levels: {}.",
        raw.unwrap_or_default(),
        ThinkLevel::VALID
    )
}

fn unrecognized_verbose(raw: Option<&str>) -> String {
    format!(
        "Unrecognized verbose level \"{}\". Valid levels: {}.",
        raw.unwrap_or_default(),
        VerboseLevel::VALID
    )
}

fn verbose_ack(level: VerboseLevel) -> &'static str {
    match level {
        VerboseLevel::Off => "Verbose logging disabled.",
        VerboseLevel::On => "Verbose logging enabled.",
    }
}

#[cfg(feature = "metrics")]
fn mode_label(mode: ReplyMode) -> &'static str {
    match mode {
        ReplyMode::Text => "text",
        ReplyMode::Command => "command",
    }
}

/// Ack text for a directive-only message, persisting valid levels.
/// Unrecognized levels leave the session untouched.
async fn directive_ack(
    think: &Directive<ThinkLevel>,
    verbose: &Directive<VerboseLevel>,
    residue_empty: bool,
    session: Option<&mut SessionState>,
) -> Result<Option<String>> {
    let think_only = think.has_directive && (think.cleaned.is_empty() || residue_empty);
    let verbose_only = verbose.has_directive && (verbose.cleaned.is_empty() || residue_empty);
    if !think_only && !verbose_only {
        return Ok(None);
    }

    if think_only {
        let Some(level) = think.level else {
            #[cfg(feature = "metrics")]
            counter!(reply_metrics::DIRECTIVE_PARSE_ERRORS_TOTAL, labels::DIRECTIVE => "think")
                .increment(1);
            return Ok(Some(unrecognized_think(think.raw_level.as_deref())));
        };
        if let Some(state) = session {
            state.entry.thinking_level = (level != ThinkLevel::Off).then(|| level.as_str().to_string());
            if let Some(v) = verbose.level.filter(|_| verbose.has_directive) {
                state.entry.verbose_level = (v != VerboseLevel::Off).then(|| v.as_str().to_string());
            }
            state.persist().await?;
        }
        #[cfg(feature = "metrics")]
        counter!(reply_metrics::DIRECTIVE_ACKS_TOTAL, labels::DIRECTIVE => "think").increment(1);

        let mut parts = vec![match level {
            ThinkLevel::Off => "Thinking disabled.".to_string(),
            level => format!("Thinking level set to {level}."),
        }];
        if verbose.has_directive {
            parts.push(match verbose.level {
                Some(v) => verbose_ack(v).to_string(),
                None => unrecognized_verbose(verbose.raw_level.as_deref()),
            });
        }
        return Ok(Some(parts.join(" ")));
    }

    let Some(level) = verbose.level else {
        #[cfg(feature = "metrics")]
        counter!(reply_metrics::DIRECTIVE_PARSE_ERRORS_TOTAL, labels::DIRECTIVE => "verbose")
            .increment(1);
        return Ok(Some(unrecognized_verbose(verbose.raw_level.as_deref())));
    };
    if let Some(state) = session {
        state.entry.verbose_level = (level != VerboseLevel::Off).then(|| level.as_str().to_string());
        state.persist().await?;
    }
    #[cfg(feature = "metrics")]
    counter!(reply_metrics::DIRECTIVE_ACKS_TOTAL, labels::DIRECTIVE => "verbose").increment(1);
    Ok(Some(verbose_ack(level).to_string()))
}

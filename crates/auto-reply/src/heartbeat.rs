//! Out-of-band liveness turns.
//!
//! A heartbeat asks the agent whether anything needs attention. The agent
//! answers [`HEARTBEAT_TOKEN`] when nothing does, in which case nothing is
//! delivered and the session's `updated_at` is left alone.

use {
    parley_common::{MsgContext, ReplyPayload},
    parley_config::{DEFAULT_HEARTBEAT_MINUTES, ParleyConfig, ReplyMode},
    parley_sessions::most_recent_key,
    tracing::{debug, info},
};

#[cfg(feature = "metrics")]
use parley_metrics::{auto_reply as reply_metrics, counter, labels};

use crate::{
    error::Result,
    reply::{ReplyOptions, ReplyPipeline},
};

/// Reply meaning "nothing to report".
pub const HEARTBEAT_TOKEN: &str = "HEARTBEAT_OK";

/// Body sent to the agent on a heartbeat turn.
pub const HEARTBEAT_PROMPT: &str = "HEARTBEAT /think:high";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrippedHeartbeat {
    pub should_skip: bool,
    pub text: String,
}

/// Remove the heartbeat token; skip when nothing else is left.
pub fn strip_heartbeat_token(raw: Option<&str>) -> StrippedHeartbeat {
    let text = raw
        .unwrap_or_default()
        .replace(HEARTBEAT_TOKEN, "")
        .trim()
        .to_string();
    StrippedHeartbeat {
        should_skip: text.is_empty(),
        text,
    }
}

/// Heartbeat interval in minutes, `None` when disabled.
///
/// Only command-mode replies heartbeat. An explicit override wins over the
/// configured value; `0` disables.
pub fn resolve_heartbeat_minutes(cfg: &ParleyConfig, override_minutes: Option<u64>) -> Option<u64> {
    let reply = cfg.inbound.reply.as_ref()?;
    if reply.mode != ReplyMode::Command {
        return None;
    }
    let minutes = override_minutes
        .or(reply.heartbeat_minutes)
        .unwrap_or(DEFAULT_HEARTBEAT_MINUTES);
    (minutes > 0).then_some(minutes)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartbeatOutcome {
    /// Who the heartbeat was addressed to, if anyone could be found.
    pub recipient: Option<String>,
    /// Payloads to deliver; empty when the agent reported nothing.
    pub payloads: Vec<ReplyPayload>,
}

impl HeartbeatOutcome {
    pub fn skipped(&self) -> bool {
        self.payloads.is_empty()
    }
}

impl ReplyPipeline {
    /// Recipient for a heartbeat: the explicit target, else the most recently
    /// active session, else the first concrete `allow_from` entry.
    pub async fn resolve_heartbeat_recipient(&self, to: Option<&str>) -> Result<Option<String>> {
        if let Some(to) = to.map(str::trim).filter(|t| !t.is_empty()) {
            return Ok(Some(to.to_string()));
        }
        let has_sessions = self
            .config()
            .inbound
            .reply
            .as_ref()
            .is_some_and(|reply| reply.session.is_some());
        if has_sessions {
            let store = self.store().load().await?;
            if let Some(key) = most_recent_key(&store) {
                return Ok(Some(key.to_string()));
            }
        }
        Ok(self
            .config()
            .inbound
            .allow_from
            .iter()
            .find(|entry| entry.as_str() != "*")
            .cloned())
    }

    /// Run one heartbeat turn. The session is only refreshed when the agent
    /// produced something worth delivering.
    pub async fn run_heartbeat_once(&self, to: Option<&str>) -> Result<HeartbeatOutcome> {
        let Some(recipient) = self.resolve_heartbeat_recipient(to).await? else {
            info!("no heartbeat recipient, skipping");
            return Ok(HeartbeatOutcome::default());
        };
        let ctx = MsgContext {
            from: Some(recipient.clone()),
            to: Some(recipient.clone()),
            ..MsgContext::new(HEARTBEAT_PROMPT)
        };
        let opts = ReplyOptions {
            hooks: None,
            is_heartbeat: true,
        };
        let turn = self.respond(&ctx, &opts).await?;

        let payloads: Vec<ReplyPayload> = turn
            .payloads
            .into_iter()
            .filter_map(|payload| {
                let stripped = strip_heartbeat_token(payload.text.as_deref());
                let payload = ReplyPayload {
                    text: (!stripped.should_skip).then_some(stripped.text),
                    ..payload
                };
                (!payload.is_empty()).then_some(payload)
            })
            .collect();

        if payloads.is_empty() {
            debug!(recipient = %recipient, "heartbeat ok, nothing to deliver");
            #[cfg(feature = "metrics")]
            counter!(reply_metrics::HEARTBEATS_TOTAL, labels::OUTCOME => "skipped").increment(1);
            return Ok(HeartbeatOutcome {
                recipient: Some(recipient),
                payloads,
            });
        }

        if let Some(mut session) = turn.session {
            session.commit().await?;
        }
        info!(recipient = %recipient, payloads = payloads.len(), "heartbeat produced output");
        #[cfg(feature = "metrics")]
        counter!(reply_metrics::HEARTBEATS_TOTAL, labels::OUTCOME => "sent").increment(1);
        Ok(HeartbeatOutcome {
            recipient: Some(recipient),
            payloads,
        })
    }
}

#[cfg(test)]
mod tests {
    use {super::*, parley_config::ReplyConfig};

    #[test]
    fn strips_token() {
        let skip = StrippedHeartbeat {
            should_skip: true,
            text: String::new(),
        };
        assert_eq!(strip_heartbeat_token(None), skip);
        assert_eq!(strip_heartbeat_token(Some("  ")), skip);
        assert_eq!(strip_heartbeat_token(Some(HEARTBEAT_TOKEN)), skip);
        assert_eq!(strip_heartbeat_token(Some("ALERT HEARTBEAT_OK")), StrippedHeartbeat {
            should_skip: false,
            text: "ALERT".into(),
        });
        assert_eq!(strip_heartbeat_token(Some("hello")).text, "hello");
    }

    fn config(mode: ReplyMode, minutes: Option<u64>) -> ParleyConfig {
        let mut cfg = ParleyConfig::default();
        cfg.inbound.reply = Some(ReplyConfig {
            mode,
            heartbeat_minutes: minutes,
            ..ReplyConfig::default()
        });
        cfg
    }

    #[test]
    fn heartbeat_minutes() {
        assert_eq!(
            resolve_heartbeat_minutes(&config(ReplyMode::Command, None), None),
            Some(DEFAULT_HEARTBEAT_MINUTES)
        );
        assert_eq!(DEFAULT_HEARTBEAT_MINUTES, 30);
        assert_eq!(resolve_heartbeat_minutes(&config(ReplyMode::Command, Some(5)), None), Some(5));
        assert_eq!(resolve_heartbeat_minutes(&config(ReplyMode::Command, Some(0)), None), None);
        assert_eq!(resolve_heartbeat_minutes(&config(ReplyMode::Command, None), Some(7)), Some(7));
        assert_eq!(resolve_heartbeat_minutes(&config(ReplyMode::Text, None), None), None);
        assert_eq!(resolve_heartbeat_minutes(&ParleyConfig::default(), None), None);
    }
}

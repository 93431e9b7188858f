//! Per-message session resolution: reset triggers, idle expiry and write-back.

use std::sync::Arc;

use {
    parley_common::MsgContext,
    parley_config::SessionConfig,
    parley_sessions::{SessionEntry, SessionMap, SessionStore, derive_session_key},
    tracing::debug,
};

#[cfg(feature = "metrics")]
use parley_metrics::{counter, session as session_metrics};

use crate::{directives::strip_structural_prefixes, error::Result};

/// How a resolution may touch the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionAccess {
    /// Normal replies: every persist refreshes `updated_at` and writes back.
    #[default]
    Reply,
    /// Heartbeat probes: nothing is written until [`SessionState::commit`].
    Probe,
}

/// If `body` is (or starts with) a reset trigger, the remainder of the body.
///
/// Both the raw trimmed body and its structurally stripped form are checked,
/// so `[Jan 1 10:00] /new hello` resets with body `hello`.
pub fn match_reset_trigger(body: &str, triggers: &[String]) -> Option<String> {
    let trimmed = body.trim();
    let stripped = strip_structural_prefixes(body);
    for candidate in [trimmed, stripped.as_str()] {
        for trigger in triggers {
            if candidate == trigger {
                return Some(String::new());
            }
            if let Some(rest) = candidate
                .strip_prefix(trigger.as_str())
                .and_then(|rest| rest.strip_prefix(' '))
            {
                return Some(rest.trim().to_string());
            }
        }
    }
    None
}

/// Resolved session for one inbound message.
///
/// Holds the freshly loaded map so the entry can be written back as part of
/// the whole store.
pub struct SessionState {
    store: Arc<dyn SessionStore>,
    map: SessionMap,
    access: SessionAccess,
    pub key: String,
    pub entry: SessionEntry,
    /// Minted for this message (absent, stale or reset).
    pub is_new: bool,
    /// A reset trigger started this session.
    pub reset: bool,
}

/// Outcome of [`resolve_session`]: the state plus the body left after any
/// reset trigger was consumed.
pub struct Resolution {
    pub state: SessionState,
    pub body: String,
}

/// Load the store and find (or mint) the entry for this message. Nothing is
/// written; callers decide when to [`SessionState::persist`].
pub async fn resolve_session(
    store: Arc<dyn SessionStore>,
    cfg: &SessionConfig,
    ctx: &MsgContext,
    access: SessionAccess,
    now: u64,
) -> Result<Resolution> {
    let key = derive_session_key(cfg.scope, ctx);
    let map = store.load().await?;

    let (body, reset) = match match_reset_trigger(&ctx.body, &cfg.reset_triggers()) {
        Some(rest) => (rest, true),
        None => (ctx.body.clone(), false),
    };

    let idle_minutes = match access {
        SessionAccess::Reply => cfg.idle_minutes(),
        SessionAccess::Probe => cfg.heartbeat_idle_minutes(),
    };
    let idle_ms = idle_minutes.saturating_mul(60_000);

    let existing = map
        .get(&key)
        .filter(|entry| !reset && entry.is_fresh(now, idle_ms))
        .cloned();
    let (entry, is_new) = match existing {
        Some(entry) => {
            #[cfg(feature = "metrics")]
            counter!(session_metrics::RESUMED_TOTAL).increment(1);
            (entry, false)
        },
        None => {
            #[cfg(feature = "metrics")]
            {
                counter!(session_metrics::CREATED_TOTAL).increment(1);
                if reset {
                    counter!(session_metrics::RESETS_TOTAL).increment(1);
                }
            }
            (SessionEntry::new_session(now), true)
        },
    };
    debug!(key = %key, session_id = %entry.session_id, is_new, reset, "resolved session");

    Ok(Resolution {
        state: SessionState {
            store,
            map,
            access,
            key,
            entry,
            is_new,
            reset,
        },
        body,
    })
}

impl SessionState {
    pub fn access(&self) -> SessionAccess {
        self.access
    }

    /// Write the entry back in reply mode; probes defer to [`Self::commit`].
    pub async fn persist(&mut self) -> Result<()> {
        match self.access {
            SessionAccess::Reply => self.commit().await,
            SessionAccess::Probe => Ok(()),
        }
    }

    /// Refresh `updated_at` and save the whole map regardless of access mode.
    pub async fn commit(&mut self) -> Result<()> {
        self.entry.touch(parley_sessions::now_ms());
        self.map.insert(self.key.clone(), self.entry.clone());
        self.store.save(&self.map).await?;
        Ok(())
    }

    /// Adopt the id the agent reported, if it differs.
    pub fn adopt_session_id(&mut self, session_id: &str) -> bool {
        if session_id.is_empty() || session_id == self.entry.session_id {
            return false;
        }
        debug!(key = %self.key, old = %self.entry.session_id, new = %session_id, "agent replaced session id");
        self.entry.session_id = session_id.to_string();
        true
    }
}

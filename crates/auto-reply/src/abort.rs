//! Abort triggers and the fallback memory used when no session is configured.

use std::time::Duration;

use moka::sync::Cache;

/// Reply sent when an abort trigger is honored.
pub const ABORT_REPLY: &str = "Agent was aborted.";

/// Prepended to the next body after an abort.
pub const ABORTED_HINT: &str =
    "Note: The previous agent run was aborted by the user. Resume carefully or ask for clarification.";

const ABORT_TRIGGERS: &[&str] = &["stop", "esc", "abort", "wait", "exit"];

const DEFAULT_CAPACITY: u64 = 1024;
const DEFAULT_TIME_TO_IDLE: Duration = Duration::from_secs(24 * 60 * 60);

/// Exact, trimmed, case-insensitive match against the abort triggers.
pub fn is_abort_trigger(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    ABORT_TRIGGERS.contains(&normalized.as_str())
}

/// Bounded abort flags keyed by session key, sender or recipient.
///
/// Only consulted for conversations without a persisted session. Entries
/// expire after a period of inactivity and the oldest are evicted once the
/// capacity is reached.
#[derive(Clone)]
pub struct AbortMemory {
    flags: Cache<String, ()>,
}

impl Default for AbortMemory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TIME_TO_IDLE)
    }
}

impl AbortMemory {
    pub fn new(capacity: u64, time_to_idle: Duration) -> Self {
        Self {
            flags: Cache::builder()
                .max_capacity(capacity)
                .time_to_idle(time_to_idle)
                .build(),
        }
    }

    pub fn is_aborted(&self, key: &str) -> bool {
        self.flags.contains_key(key)
    }

    pub fn set(&self, key: &str, aborted: bool) {
        if aborted {
            self.flags.insert(key.to_string(), ());
        } else {
            self.flags.invalidate(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("stop", true)]
    #[case("  STOP ", true)]
    #[case("Esc", true)]
    #[case("wait", true)]
    #[case("exit", true)]
    #[case("abort", true)]
    #[case("stop it", false)]
    #[case("/stop", false)]
    #[case("", false)]
    fn triggers(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(is_abort_trigger(text), expected);
    }

    #[test]
    fn memory_set_and_clear() {
        let memory = AbortMemory::default();
        assert!(!memory.is_aborted("+1555"));
        memory.set("+1555", true);
        assert!(memory.is_aborted("+1555"));
        memory.set("+1555", false);
        assert!(!memory.is_aborted("+1555"));
    }

    #[test]
    fn clones_share_state() {
        let memory = AbortMemory::new(8, Duration::from_secs(60));
        let other = memory.clone();
        memory.set("k", true);
        assert!(other.is_aborted("k"));
    }
}

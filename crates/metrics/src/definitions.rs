//! Metric name and label definitions.
//!
//! Every metric recorded by parley is named here so the set of exported
//! series is documented in one place.

/// Inbound auto-reply pipeline metrics
pub mod auto_reply {
    /// Total messages received for processing
    pub const MESSAGES_RECEIVED_TOTAL: &str = "parley_auto_reply_messages_received_total";
    /// Message processing duration in seconds
    pub const PROCESSING_DURATION_SECONDS: &str = "parley_auto_reply_processing_duration_seconds";
    /// Messages answered without a reply (allowlist, empty output)
    pub const MESSAGES_DROPPED_TOTAL: &str = "parley_auto_reply_messages_dropped_total";
    /// Directive-only messages acknowledged without running the agent
    pub const DIRECTIVE_ACKS_TOTAL: &str = "parley_auto_reply_directive_acks_total";
    /// Unrecognized think/verbose levels
    pub const DIRECTIVE_PARSE_ERRORS_TOTAL: &str = "parley_auto_reply_directive_parse_errors_total";
    /// Abort triggers honored
    pub const ABORTS_TOTAL: &str = "parley_auto_reply_aborts_total";
    /// Heartbeat probes run, by outcome
    pub const HEARTBEATS_TOTAL: &str = "parley_auto_reply_heartbeats_total";
}

/// Agent subprocess metrics
pub mod command {
    /// Total agent invocations
    pub const EXECUTIONS_TOTAL: &str = "parley_command_executions_total";
    /// Agent run duration in seconds
    pub const EXECUTION_DURATION_SECONDS: &str = "parley_command_execution_duration_seconds";
    /// Invocations killed after exceeding the timeout
    pub const TIMEOUTS_TOTAL: &str = "parley_command_timeouts_total";
    /// Invocations that failed to run or exited non-zero
    pub const ERRORS_TOTAL: &str = "parley_command_errors_total";
    /// Time spent waiting in the fairness queue in seconds
    pub const QUEUE_WAIT_SECONDS: &str = "parley_command_queue_wait_seconds";
    /// Tasks currently waiting in or holding the fairness queue
    pub const QUEUE_DEPTH: &str = "parley_command_queue_depth";
}

/// Session metrics
pub mod session {
    /// Sessions started (fresh id minted)
    pub const CREATED_TOTAL: &str = "parley_session_created_total";
    /// Sessions resumed within the idle window
    pub const RESUMED_TOTAL: &str = "parley_session_resumed_total";
    /// Explicit resets via trigger
    pub const RESETS_TOTAL: &str = "parley_session_resets_total";
}

/// Common label keys
pub mod labels {
    pub const AGENT: &str = "agent";
    pub const MODE: &str = "mode";
    pub const OUTCOME: &str = "outcome";
    pub const REASON: &str = "reason";
    pub const DIRECTIVE: &str = "directive";
}

use {parley_common::MsgContext, parley_config::SessionScope};

/// Key shared by every sender under the global scope.
pub const GLOBAL_KEY: &str = "global";

/// Key used when a per-sender message carries no sender.
pub const UNKNOWN_KEY: &str = "unknown";

/// Derive the store key for an inbound message.
///
/// Per-sender keys are the sender with its transport prefix removed; group
/// identifiers are kept verbatim.
pub fn derive_session_key(scope: SessionScope, ctx: &MsgContext) -> String {
    match scope {
        SessionScope::Global => GLOBAL_KEY.to_string(),
        SessionScope::PerSender => match ctx.from_normalized().trim() {
            "" => UNKNOWN_KEY.to_string(),
            from => from.to_string(),
        },
    }
}

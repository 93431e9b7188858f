//! Inbound message → agent reply pipeline.
//!
//! Flow: directive extraction → session resolution → allowlist and abort
//! checks → body composition → queued agent command → protocol parsing →
//! reply payloads. Delivery is left to the transport that called in.

pub mod abort;
pub mod body;
pub mod command;
pub mod directives;
pub mod error;
pub mod exec;
pub mod heartbeat;
pub mod media;
pub mod queue;
pub mod reply;
pub mod session;
pub mod template;
pub mod thinking;
pub mod typing;

pub use {
    abort::{ABORT_REPLY, AbortMemory, is_abort_trigger},
    command::{CommandBridge, CommandReply, CommandReplyMeta, CommandRequest},
    error::{Error, Result},
    exec::{CommandFailure, CommandOutput, CommandResult, CommandRunner, TokioCommandRunner},
    heartbeat::{
        HEARTBEAT_PROMPT, HEARTBEAT_TOKEN, HeartbeatOutcome, resolve_heartbeat_minutes,
        strip_heartbeat_token,
    },
    media::split_media_from_output,
    queue::{CommandQueue, QueueTask, SemaphoreQueue, WaitCallback},
    reply::{ReplyOptions, ReplyPipeline},
    session::SessionAccess,
    thinking::{ThinkLevel, VerboseLevel},
    typing::ReplyHooks,
};

//! Command-line agent contracts: how to build an agent's argv and how to
//! read back what it printed.

pub mod pi;
pub mod registry;
pub mod types;

pub use {
    pi::PiAgent,
    registry::{AgentRegistry, AgentSpec},
    types::{
        AgentKind, AgentMeta, AgentParseResult, AgentUsage, BuildArgsContext, OutputFormat,
        ToolResult, UnknownAgentKind,
    },
};

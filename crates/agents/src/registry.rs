use std::{collections::HashMap, sync::Arc};

use crate::{
    pi::PiAgent,
    types::{AgentKind, AgentParseResult, BuildArgsContext},
};

/// Command-line contract of one agent family.
pub trait AgentSpec: Send + Sync {
    fn kind(&self) -> AgentKind;

    /// Whether `argv` launches this agent.
    fn is_invocation(&self, argv: &[String]) -> bool;

    /// Final argv for one run. Running it again on its own output must not
    /// add anything.
    fn build_args(&self, ctx: &BuildArgsContext) -> Vec<String>;

    /// Translate raw stdout into texts, tool results and metadata.
    fn parse_output(&self, raw_stdout: &str) -> AgentParseResult;
}

/// Agent contracts keyed by kind.
///
/// Specs are stored as `Arc<dyn AgentSpec>` so one registry can be shared
/// by concurrent pipelines.
#[derive(Clone)]
pub struct AgentRegistry {
    specs: HashMap<AgentKind, Arc<dyn AgentSpec>>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(PiAgent));
        registry
    }
}

impl AgentRegistry {
    /// A registry with every built-in contract.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn empty() -> Self {
        Self {
            specs: HashMap::new(),
        }
    }

    pub fn register(&mut self, spec: Arc<dyn AgentSpec>) {
        self.specs.insert(spec.kind(), spec);
    }

    pub fn get(&self, kind: AgentKind) -> Option<Arc<dyn AgentSpec>> {
        self.specs.get(&kind).cloned()
    }

    /// First contract that recognizes `argv`.
    pub fn detect(&self, argv: &[String]) -> Option<Arc<dyn AgentSpec>> {
        self.specs
            .values()
            .find(|spec| spec.is_invocation(argv))
            .cloned()
    }

    pub fn kinds(&self) -> Vec<AgentKind> {
        self.specs.keys().copied().collect()
    }
}

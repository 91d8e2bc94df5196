//! Compiled workflow graphs.
//!
//! A [`WorkflowGraph`] is only ever produced by the loader after a document
//! has passed validation, so every transition target is guaranteed to name
//! a state in the same graph.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use super::schema::WorkflowMetadata;

/// Trigger string that stands for the implicit "proceed" signal.
pub const PROCEED_TRIGGER: &str = "proceed";

/// Condition that selects a transition during a continue request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// The implicit proceed signal
    Proceed,
    /// A specific named trigger (e.g. `requirements_complete`)
    Named(String),
}

impl Trigger {
    /// Parse a trigger from its document form.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s == PROCEED_TRIGGER {
            Self::Proceed
        } else {
            Self::Named(s.to_string())
        }
    }

    /// Document form of this trigger.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Proceed => PROCEED_TRIGGER,
            Self::Named(name) => name,
        }
    }

    /// Whether this trigger fires for the given signal.
    ///
    /// An absent signal is the proceed signal.
    pub fn matches(&self, signal: Option<&str>) -> bool {
        let signal = signal.map_or(PROCEED_TRIGGER, str::trim);
        self.as_str() == signal
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transition out of a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRule {
    /// When this rule applies
    pub trigger: Trigger,
    /// Destination state id
    pub target: String,
    /// Instructions overriding the destination's defaults
    pub instructions: Option<String>,
    /// Why the transition happens
    pub reason: Option<String>,
}

/// A phase in a compiled graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDefinition {
    pub id: String,
    pub description: Option<String>,
    pub default_instructions: String,
    /// Evaluated first-match-wins
    pub transitions: Vec<TransitionRule>,
}

impl StateDefinition {
    /// First rule whose trigger matches `signal`, with its index.
    pub fn match_trigger(&self, signal: Option<&str>) -> Option<(usize, &TransitionRule)> {
        self.transitions.iter().enumerate().find(|(_, rule)| rule.trigger.matches(signal))
    }

    /// First rule that leads to `target`, with its index.
    pub fn rule_to(&self, target: &str) -> Option<(usize, &TransitionRule)> {
        self.transitions.iter().enumerate().find(|(_, rule)| rule.target == target)
    }
}

/// Where a graph was loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "lowercase")]
pub enum GraphSource {
    /// Shipped with the binary
    Bundled,
    /// Project-local override document
    Custom(PathBuf),
    /// Parsed from an in-memory string
    Inline,
}

impl fmt::Display for GraphSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bundled => write!(f, "bundled"),
            Self::Custom(path) => write!(f, "{}", path.display()),
            Self::Inline => write!(f, "inline"),
        }
    }
}

/// A validated, compiled workflow.
///
/// States live in an arena (`Vec`) in declaration order and are looked up
/// by id through an index, so the graph holds no references between states.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    name: String,
    description: Option<String>,
    initial_state: String,
    states: Vec<StateDefinition>,
    index: HashMap<String, usize>,
    metadata: WorkflowMetadata,
    source: GraphSource,
}

impl WorkflowGraph {
    /// Assemble a graph from already validated parts.
    pub(crate) fn from_parts(
        name: String,
        description: Option<String>,
        initial_state: String,
        states: Vec<StateDefinition>,
        metadata: WorkflowMetadata,
        source: GraphSource,
    ) -> Self {
        let index = states.iter().enumerate().map(|(i, s)| (s.id.clone(), i)).collect();
        Self { name, description, initial_state, states, index, metadata, source }
    }

    /// Workflow name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Workflow description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Id of the starting state.
    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }

    /// Descriptive metadata.
    pub fn metadata(&self) -> &WorkflowMetadata {
        &self.metadata
    }

    /// Where this graph came from.
    pub fn source(&self) -> &GraphSource {
        &self.source
    }

    /// Look up a state by id.
    pub fn state(&self, id: &str) -> Option<&StateDefinition> {
        self.index.get(id).map(|&i| &self.states[i])
    }

    /// Whether a state with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// States in declaration order.
    pub fn states(&self) -> &[StateDefinition] {
        &self.states
    }

    /// State ids in declaration order.
    pub fn state_ids(&self) -> Vec<String> {
        self.states.iter().map(|s| s.id.clone()).collect()
    }
}

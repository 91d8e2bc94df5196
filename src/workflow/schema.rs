//! Workflow document schema.
//!
//! Defines the YAML structure of workflow definition documents. These types
//! mirror the text exactly, duplicates and dangling references included;
//! validation and compilation into a [`WorkflowGraph`](super::WorkflowGraph)
//! happen in the loader.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A workflow definition document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDocument {
    /// Unique workflow name
    pub name: String,

    /// Short description of the workflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Id of the starting phase
    #[serde(default, alias = "initial_state")]
    pub initial_state: Option<String>,

    /// Descriptive metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<WorkflowMetadata>,

    /// Phase definitions in declaration order
    #[serde(default)]
    pub states: StateEntries,
}

/// A single phase in a workflow document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDocument {
    /// What this phase is about
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Guidance returned when no transition applies
    #[serde(default, alias = "default_instructions")]
    pub default_instructions: String,

    /// Transitions, evaluated in order
    #[serde(default)]
    pub transitions: Vec<TransitionDocument>,
}

/// A transition out of a phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionDocument {
    /// Symbolic condition selecting this transition
    pub trigger: String,

    /// Destination phase id
    #[serde(alias = "to")]
    pub target: String,

    /// Instructions overriding the destination's default instructions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Why this transition happens, reported back to the caller
    #[serde(default, alias = "transition_reason", skip_serializing_if = "Option::is_none")]
    pub transition_reason: Option<String>,
}

/// Qualitative complexity of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Descriptive workflow metadata.
///
/// Purely informational. Keys not listed here end up in `extra` and are
/// rejected by validation, so metadata can never smuggle in topology.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMetadata {
    /// Domain or category tag (e.g. "code", "office")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Complexity tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<Complexity>,

    /// Longer description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Typical duration (free text)
    #[serde(default, alias = "typical_duration", skip_serializing_if = "Option::is_none")]
    pub typical_duration: Option<String>,

    /// Task types this workflow is recommended for
    #[serde(default, alias = "best_for", skip_serializing_if = "Vec::is_empty")]
    pub best_for: Vec<String>,

    /// Human-readable use-case guidance
    #[serde(default, alias = "use_cases", skip_serializing_if = "Vec::is_empty")]
    pub use_cases: Vec<String>,

    /// Example scenarios
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,

    /// Unrecognized keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Just the descriptive parts of a workflow document.
///
/// Used for cheap enumeration; the `states` block is skipped entirely.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowHeader {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<WorkflowMetadata>,
}

/// Phase entries in declaration order.
///
/// Deserialized entry by entry rather than into a map, so a repeated state
/// id stays visible to validation instead of silently replacing the first.
#[derive(Debug, Clone, Default)]
pub struct StateEntries(pub Vec<(String, StateDocument)>);

impl StateEntries {
    /// Iterate over `(id, state)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StateDocument)> {
        self.0.iter().map(|(id, state)| (id.as_str(), state))
    }

    /// Number of entries, duplicates included.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for StateEntries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = StateEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of state id to state definition")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((id, state)) = map.next_entry::<String, StateDocument>()? {
                    entries.push((id, state));
                }
                Ok(StateEntries(entries))
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(StateEntries::default())
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

impl Serialize for StateEntries {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, state) in &self.0 {
            map.serialize_entry(id, state)?;
        }
        map.end()
    }
}

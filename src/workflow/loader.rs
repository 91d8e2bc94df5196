//! Workflow document loader.
//!
//! Parses YAML workflow documents, validates them and compiles them into
//! [`WorkflowGraph`]s. A document either compiles completely or produces a
//! [`DefinitionError`]; there is no partially loaded graph.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::bundled::{bundled_names, find_bundled};
use super::graph::{GraphSource, StateDefinition, TransitionRule, Trigger, WorkflowGraph};
use super::schema::{WorkflowDocument, WorkflowHeader};
use crate::error::{DefinitionError, ValidationIssue};

/// Project-local directory holding the override document.
pub const OVERRIDE_DIR: &str = ".vibe";

/// Override document file names. At most one may exist.
pub const OVERRIDE_FILES: [&str; 2] = ["state-machine.yml", "state-machine.yaml"];

/// Metadata keys that would describe topology if they were honored.
const TOPOLOGY_KEYS: [&str; 6] =
    ["states", "initialState", "initial_state", "transitions", "target", "to"];

/// A custom override document read from disk but not yet parsed.
#[derive(Debug, Clone)]
pub struct OverrideSource {
    /// Path of the document
    pub path: PathBuf,
    /// Raw document text
    pub content: String,
    /// SHA-256 of the content
    pub fingerprint: String,
}

/// Loads and validates workflow documents.
#[derive(Debug, Clone, Default)]
pub struct WorkflowLoader {
    /// States every graph must declare
    required_states: Vec<String>,
}

impl WorkflowLoader {
    /// Create a loader with no required states.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require every loaded graph to declare these state ids.
    pub fn with_required_states(mut self, states: Vec<String>) -> Self {
        self.required_states = states;
        self
    }

    /// State ids every graph must declare.
    pub fn required_states(&self) -> &[String] {
        &self.required_states
    }

    /// Validation profile of this loader, as a stable string.
    ///
    /// Graphs compiled under different profiles must not share a cache entry.
    pub fn cache_scope(&self) -> String {
        let mut required: Vec<&str> = self.required_states.iter().map(String::as_str).collect();
        required.sort_unstable();
        required.dedup();
        required.join(",")
    }

    /// Load one of the bundled workflows by name.
    pub fn load_bundled(&self, name: &str) -> Result<WorkflowGraph, DefinitionError> {
        let bundled = find_bundled(name).ok_or_else(|| DefinitionError::UnknownWorkflow {
            name: name.to_string(),
            available: bundled_names(),
        })?;
        self.parse_str(bundled.source, GraphSource::Bundled)
    }

    /// Load the project-local override document, if there is one.
    ///
    /// Returns `Ok(None)` when no override exists so the caller can fall
    /// back to the bundled workflows.
    pub fn load_custom(&self, project_path: &Path) -> Result<Option<WorkflowGraph>, DefinitionError> {
        match read_override(project_path)? {
            Some(source) => {
                self.parse_str(&source.content, GraphSource::Custom(source.path)).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Load a workflow document from an explicit path.
    pub fn load_file(&self, path: &Path) -> Result<WorkflowGraph, DefinitionError> {
        let content = fs::read_to_string(path)
            .map_err(|source| DefinitionError::Io { path: path.to_path_buf(), source })?;
        self.parse_str(&content, GraphSource::Custom(path.to_path_buf()))
    }

    /// Parse, validate and compile a workflow document.
    pub fn parse_str(
        &self,
        content: &str,
        source: GraphSource,
    ) -> Result<WorkflowGraph, DefinitionError> {
        let document: WorkflowDocument = serde_yaml::from_str(content)
            .map_err(|e| DefinitionError::Parse { origin: origin(&source), message: e.to_string() })?;

        let issues = self.validate(&document);
        if !issues.is_empty() {
            let workflow =
                if document.name.trim().is_empty() { "<unnamed>".to_string() } else { document.name };
            return Err(DefinitionError::Validation { workflow, issues });
        }

        let graph = compile(document, source);
        tracing::debug!(
            workflow = graph.name(),
            states = graph.states().len(),
            source = %graph.source(),
            "Compiled workflow"
        );
        Ok(graph)
    }

    /// Check a parsed document against every graph rule.
    ///
    /// Returns all issues found rather than stopping at the first one.
    pub fn validate(&self, document: &WorkflowDocument) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if document.name.trim().is_empty() {
            issues.push(ValidationIssue::new("name", "workflow name is empty"));
        }

        if document.states.is_empty() {
            issues.push(ValidationIssue::new("states", "workflow declares no states"));
        }

        // Ids are used exactly as written; padded ids are rejected
        let mut ids = HashSet::new();
        for (position, (id, _)) in document.states.iter().enumerate() {
            if id.trim().is_empty() {
                issues.push(ValidationIssue::new(
                    format!("states[{position}]"),
                    "state id is empty",
                ));
            } else if id.trim() != id {
                issues.push(ValidationIssue::new(
                    format!("states[{position}]"),
                    format!("state id '{id}' has leading or trailing whitespace"),
                ));
            } else if !ids.insert(id) {
                issues.push(ValidationIssue::new(
                    format!("states.{id}"),
                    "state id is declared more than once",
                ));
            }
        }

        match document.initial_state.as_deref().filter(|s| !s.trim().is_empty()) {
            None => {
                issues.push(ValidationIssue::new("initialState", "initial state is not declared"));
            }
            Some(initial) if !ids.contains(initial) => {
                issues.push(ValidationIssue::new(
                    "initialState",
                    format!("'{initial}' is not a declared state"),
                ));
            }
            Some(_) => {}
        }

        for (id, state) in document.states.iter() {
            if state.default_instructions.trim().is_empty() {
                tracing::warn!(
                    workflow = document.name,
                    state = id,
                    "State has no default instructions"
                );
            }

            for (i, transition) in state.transitions.iter().enumerate() {
                let location = format!("states.{id}.transitions[{i}]");
                if transition.trigger.trim().is_empty() {
                    issues.push(ValidationIssue::new(&location, "trigger is empty"));
                }
                if !ids.contains(transition.target.as_str()) {
                    issues.push(ValidationIssue::new(
                        &location,
                        format!("target '{}' is not a declared state", transition.target),
                    ));
                }
            }
        }

        if let Some(metadata) = &document.metadata {
            for key in metadata.extra.keys() {
                let message = if TOPOLOGY_KEYS.contains(&key.as_str()) {
                    "metadata cannot change graph topology"
                } else {
                    "not a descriptive metadata field"
                };
                issues.push(ValidationIssue::new(format!("metadata.{key}"), message));
            }
        }

        for required in &self.required_states {
            if !ids.contains(required.as_str()) {
                issues.push(ValidationIssue::new(
                    "states",
                    format!("required state '{required}' is missing"),
                ));
            }
        }

        issues
    }
}

/// Locate the project-local override document.
///
/// Fails with [`DefinitionError::AmbiguousOverride`] if both spellings exist.
pub fn find_override(project_path: &Path) -> Result<Option<PathBuf>, DefinitionError> {
    let dir = project_path.join(OVERRIDE_DIR);
    let yml = dir.join(OVERRIDE_FILES[0]);
    let yaml = dir.join(OVERRIDE_FILES[1]);

    match (yml.is_file(), yaml.is_file()) {
        (true, true) => Err(DefinitionError::AmbiguousOverride { yml, yaml }),
        (true, false) => Ok(Some(yml)),
        (false, true) => Ok(Some(yaml)),
        (false, false) => Ok(None),
    }
}

/// Read the override document and fingerprint its content.
pub fn read_override(project_path: &Path) -> Result<Option<OverrideSource>, DefinitionError> {
    let Some(path) = find_override(project_path)? else {
        return Ok(None);
    };

    let content = fs::read_to_string(&path)
        .map_err(|source| DefinitionError::Io { path: path.clone(), source })?;
    let fingerprint = fingerprint(content.as_bytes());

    Ok(Some(OverrideSource { path, content, fingerprint }))
}

/// Parse only the descriptive header of a document.
pub fn parse_header(content: &str, source: &GraphSource) -> Result<WorkflowHeader, DefinitionError> {
    serde_yaml::from_str(content)
        .map_err(|e| DefinitionError::Parse { origin: origin(source), message: e.to_string() })
}

/// SHA-256 fingerprint of a document, hex encoded.
pub fn fingerprint(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

fn origin(source: &GraphSource) -> String {
    match source {
        GraphSource::Bundled => "(bundled)".to_string(),
        GraphSource::Custom(path) => path.display().to_string(),
        GraphSource::Inline => "(inline)".to_string(),
    }
}

/// Turn a validated document into a graph.
///
/// State ids, targets and the initial state are kept verbatim so the graph
/// holds exactly the ids validation checked.
fn compile(document: WorkflowDocument, source: GraphSource) -> WorkflowGraph {
    let states = document
        .states
        .0
        .into_iter()
        .map(|(id, state)| StateDefinition {
            id,
            description: state.description,
            default_instructions: state.default_instructions.trim_end().to_string(),
            transitions: state
                .transitions
                .into_iter()
                .map(|t| TransitionRule {
                    trigger: Trigger::parse(&t.trigger),
                    target: t.target,
                    instructions: t.instructions.map(|s| s.trim_end().to_string()),
                    reason: t.transition_reason,
                })
                .collect(),
        })
        .collect();

    WorkflowGraph::from_parts(
        document.name,
        document.description,
        document.initial_state.unwrap_or_default(),
        states,
        document.metadata.unwrap_or_default(),
        source,
    )
}

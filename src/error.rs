//! Error types for the workflow engine.
//!
//! Errors fall into three families that match the engine's lifecycle:
//!
//! - [`DefinitionError`] - raised while loading a workflow document
//! - [`ResolutionError`] - raised while resolving a single transition request
//! - [`StoreError`] - raised by the conversation state store
//!
//! Every message names the workflow, phase or conversation involved, since
//! workflow documents are hand-edited text and a generic message is useless
//! to the author.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// A single problem found while validating a workflow document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Where the problem is (e.g. `states.design.transitions[1]`)
    pub location: String,
    /// What is wrong
    pub message: String,
}

impl ValidationIssue {
    /// Create a new validation issue.
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self { location: location.into(), message: message.into() }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues.iter().map(|i| format!("  - {i}")).collect::<Vec<_>>().join("\n")
}

/// Errors raised while loading a workflow document.
///
/// A definition error never yields a partially loaded graph.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// No bundled or custom workflow with this name.
    #[error("Unknown workflow '{name}' (available: {})", .available.join(", "))]
    UnknownWorkflow { name: String, available: Vec<String> },

    /// The document is not well-formed YAML or does not match the schema.
    #[error("Failed to parse workflow document {origin}: {message}")]
    Parse { origin: String, message: String },

    /// The document parsed but violates one or more graph rules.
    #[error("Workflow '{workflow}' is invalid:\n{}", join_issues(.issues))]
    Validation { workflow: String, issues: Vec<ValidationIssue> },

    /// Both `.yml` and `.yaml` override files exist.
    #[error(
        "Ambiguous custom workflow: both {} and {} exist, remove one of them",
        .yml.display(),
        .yaml.display()
    )]
    AmbiguousOverride { yml: PathBuf, yaml: PathBuf },

    /// The override document could not be read.
    #[error("Failed to read workflow document {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DefinitionError {
    /// Validation issues carried by this error, if any.
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            Self::Validation { issues, .. } => issues,
            _ => &[],
        }
    }
}

/// Errors raised while resolving a transition request.
///
/// These never touch persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// The current phase is not part of the workflow graph.
    #[error("Current phase '{phase}' does not exist in workflow '{workflow}'")]
    InvalidState { workflow: String, phase: String },

    /// The requested jump target is not part of the workflow graph.
    #[error(
        "Cannot transition to unknown phase '{target}' in workflow '{workflow}' (valid phases: {})",
        .available.join(", ")
    )]
    UnknownTarget { workflow: String, target: String, available: Vec<String> },
}

/// Errors raised by the conversation state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Refused to persist a phase the governing graph does not declare.
    #[error(
        "Refusing to commit phase '{phase}' for conversation '{conversation_id}': \
         workflow '{workflow}' has no such phase"
    )]
    PhaseNotInGraph { conversation_id: String, workflow: String, phase: String },

    /// The record moved on since the resolution was computed.
    #[error(
        "Conversation '{conversation_id}' is in phase '{actual}', expected '{expected}'; \
         resolve again against the current phase"
    )]
    StalePhase { conversation_id: String, expected: String, actual: String },

    /// No record exists for this identity.
    #[error("No conversation '{conversation_id}' for project {}", .project_path.display())]
    NotFound { conversation_id: String, project_path: PathBuf },

    /// Record governed by a different workflow than the one supplied.
    #[error(
        "Conversation '{conversation_id}' follows workflow '{expected}', not '{actual}'"
    )]
    WorkflowMismatch { conversation_id: String, expected: String, actual: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Top-level error for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_target_lists_phases() {
        let err = ResolutionError::UnknownTarget {
            workflow: "waterfall".to_string(),
            target: "deploy".to_string(),
            available: vec!["requirements".to_string(), "design".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'deploy'"));
        assert!(msg.contains("'waterfall'"));
        assert!(msg.contains("requirements, design"));
    }

    #[test]
    fn test_validation_error_lists_every_issue() {
        let err = DefinitionError::Validation {
            workflow: "custom".to_string(),
            issues: vec![
                ValidationIssue::new("initialState", "'start' is not a declared state"),
                ValidationIssue::new("states.a.transitions[0]", "target 'b' is not a declared state"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("Workflow 'custom' is invalid"));
        assert!(msg.contains("initialState: 'start' is not a declared state"));
        assert!(msg.contains("states.a.transitions[0]"));
        assert_eq!(err.issues().len(), 2);
    }

    #[test]
    fn test_engine_error_is_transparent() {
        let err: EngineError = StoreError::PhaseNotInGraph {
            conversation_id: "c1".to_string(),
            workflow: "epcc".to_string(),
            phase: "gone".to_string(),
        }
        .into();
        assert!(err.to_string().starts_with("Refusing to commit phase 'gone'"));
    }
}

//! Persisted conversation records.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identity of a conversation: unique per project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationIdentity {
    pub conversation_id: String,
    pub project_path: PathBuf,
}

impl ConversationIdentity {
    /// Create an identity from an explicit conversation id.
    pub fn new(conversation_id: impl Into<String>, project_path: impl Into<PathBuf>) -> Self {
        Self { conversation_id: conversation_id.into(), project_path: project_path.into() }
    }

    /// Derive a stable identity from the project directory and branch.
    ///
    /// The id is `<project-dir-name>-<branch>`, with path separators in the
    /// branch replaced so that `feature/login` stays one token.
    pub fn derive(project_path: impl Into<PathBuf>, branch: Option<&str>) -> Self {
        let project_path = project_path.into();
        let project = project_path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .unwrap_or("project");
        let branch = sanitize_branch(branch.unwrap_or("main"));
        Self::new(format!("{project}-{branch}"), project_path)
    }

    /// Stable storage key for this identity.
    pub fn storage_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.project_path.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.conversation_id.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        digest[..32].to_string()
    }
}

impl fmt::Display for ConversationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.conversation_id, self.project_path.display())
    }
}

/// Replace characters that do not belong in a file name or id.
pub fn sanitize_branch(branch: &str) -> String {
    branch
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '-' })
        .collect()
}

/// Persisted state of one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub conversation_id: String,
    pub project_path: PathBuf,
    /// Workflow governing this conversation
    pub workflow_name: String,
    /// Always a state id of the governing workflow
    pub current_phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_file_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    /// Create a fresh record at the given phase.
    pub fn new(
        identity: &ConversationIdentity,
        workflow_name: impl Into<String>,
        phase: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: identity.conversation_id.clone(),
            project_path: identity.project_path.clone(),
            workflow_name: workflow_name.into(),
            current_phase: phase.into(),
            plan_file_path: None,
            git_branch: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Identity of this record.
    pub fn identity(&self) -> ConversationIdentity {
        ConversationIdentity::new(self.conversation_id.clone(), self.project_path.clone())
    }

    /// Whether this record belongs to `identity`.
    pub fn is_for(&self, identity: &ConversationIdentity) -> bool {
        self.conversation_id == identity.conversation_id
            && self.project_path == identity.project_path
    }

    /// Plan file path, if recorded.
    pub fn plan_file(&self) -> Option<&Path> {
        self.plan_file_path.as_deref()
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_identity() {
        let identity = ConversationIdentity::derive("/work/shop", Some("feature/login"));
        assert_eq!(identity.conversation_id, "shop-feature-login");
        assert_eq!(identity.project_path, PathBuf::from("/work/shop"));

        let identity = ConversationIdentity::derive("/work/shop", None);
        assert_eq!(identity.conversation_id, "shop-main");
    }

    #[test]
    fn test_storage_key_distinguishes_projects() {
        let a = ConversationIdentity::new("c1", "/work/a");
        let b = ConversationIdentity::new("c1", "/work/b");
        assert_ne!(a.storage_key(), b.storage_key());
        assert_eq!(a.storage_key(), a.clone().storage_key());
        assert_eq!(a.storage_key().len(), 32);
    }

    #[test]
    fn test_state_serialization_format() {
        let identity = ConversationIdentity::new("c1", "/work/a");
        let state = ConversationState::new(&identity, "epcc", "explore");
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["conversationId"], "c1");
        assert_eq!(json["workflowName"], "epcc");
        assert_eq!(json["currentPhase"], "explore");
        assert!(json.get("gitBranch").is_none());
        assert!(state.is_for(&identity));
        assert_eq!(state.identity(), identity);
    }
}

//! Workflow engine orchestration.
//!
//! Ties the registry, the transition resolver and the state store together
//! into the operations callers use: start a conversation, ask what comes
//! next, inspect, reset, and list workflows.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::core::Config;
use crate::error::{EngineResult, ResolutionError};
use crate::state::{
    ConversationIdentity, ConversationState, ConversationStateStore, FileBackend, StateBackend,
};
use crate::workflow::{
    GraphCache, Resolution, TransitionEngine, TransitionRequest, WorkflowGraph, WorkflowInfo,
    WorkflowLoader, WorkflowRegistry,
};

/// Options for starting a conversation.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Workflow to use (default: `workflows.default` from config)
    pub workflow: Option<String>,
    /// Current git branch, as reported by the caller
    pub git_branch: Option<String>,
    /// Plan file path (default: derived from the branch)
    pub plan_file_path: Option<PathBuf>,
}

/// Result of a committed resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextStep {
    /// Phase after the transition
    pub phase: String,
    /// Phase before the transition
    pub previous_phase: String,
    pub instructions: String,
    pub workflow: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_file_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition_reason: Option<String>,
    /// Whether a declared transition was followed
    pub is_modeled: bool,
}

impl NextStep {
    /// Whether the phase changed.
    pub fn changed(&self) -> bool {
        self.phase != self.previous_phase
    }
}

/// A transition available from the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionSummary {
    pub trigger: String,
    pub target: String,
}

/// Snapshot of a conversation and its current phase.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStatus {
    pub state: ConversationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_description: Option<String>,
    pub instructions: String,
    pub transitions: Vec<TransitionSummary>,
    pub phases: Vec<String>,
}

/// Engine for one project.
#[derive(Debug)]
pub struct WorkflowEngine {
    project_path: PathBuf,
    config: Config,
    registry: WorkflowRegistry,
    store: ConversationStateStore,
}

impl WorkflowEngine {
    /// Create an engine from explicit parts.
    pub fn new(
        project_path: impl Into<PathBuf>,
        config: Config,
        backend: Arc<dyn StateBackend>,
        cache: Arc<GraphCache>,
    ) -> Self {
        let project_path = project_path.into();
        let loader =
            WorkflowLoader::new().with_required_states(config.workflows.required_states.clone());
        let registry = WorkflowRegistry::new(project_path.clone(), cache)
            .with_loader(loader)
            .with_domains(config.workflows.domains.clone());

        Self { project_path, config, registry, store: ConversationStateStore::new(backend) }
    }

    /// Open the engine for a project with its configuration and on-disk store.
    pub fn open(project_path: &Path) -> anyhow::Result<Self> {
        let config = Config::load(project_path)?;
        let backend = Arc::new(FileBackend::new(config.state_dir(project_path)));
        Ok(Self::new(project_path, config, backend, Arc::new(GraphCache::new())))
    }

    /// Project directory.
    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Workflow registry.
    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    /// Conversation state store.
    pub fn store(&self) -> &ConversationStateStore {
        &self.store
    }

    /// List available workflows.
    pub fn list_workflows(&self) -> EngineResult<Vec<WorkflowInfo>> {
        Ok(self.registry.list()?)
    }

    /// Compiled graph for a workflow.
    pub fn graph(&self, name: &str) -> EngineResult<Arc<WorkflowGraph>> {
        Ok(self.registry.graph(name)?)
    }

    /// Start a conversation, or return the existing one.
    ///
    /// An existing conversation keeps its workflow; use [`reset`](Self::reset)
    /// to switch. Branch and plan file are recorded either way.
    pub fn start(
        &self,
        identity: &ConversationIdentity,
        options: StartOptions,
    ) -> EngineResult<ConversationState> {
        self.store.serialized(identity, || -> EngineResult<ConversationState> {
            let workflow = options.workflow.as_deref().unwrap_or(&self.config.workflows.default);
            let graph = self.registry.graph(workflow)?;
            let state = self.store.get_or_create(identity, &graph)?;

            if state.workflow_name != graph.name() {
                tracing::warn!(
                    conversation = %identity.conversation_id,
                    existing = %state.workflow_name,
                    requested = graph.name(),
                    "Conversation already follows another workflow, reset to switch"
                );
            }

            let branch = options.git_branch.or_else(|| state.git_branch.clone());
            let plan_file_path = options.plan_file_path.or_else(|| {
                state
                    .plan_file_path
                    .is_none()
                    .then(|| self.config.plan_file_path(&self.project_path, branch.as_deref()))
            });
            Ok(self.store.update_metadata(identity, plan_file_path, branch)?)
        })
    }

    /// Resolve the next phase and commit it.
    ///
    /// Creates the conversation with the default workflow on first use.
    /// Nothing is written unless resolution succeeds.
    pub fn resolve_next(
        &self,
        identity: &ConversationIdentity,
        request: &TransitionRequest,
    ) -> EngineResult<NextStep> {
        self.store.serialized(identity, || -> EngineResult<NextStep> {
            let state = self.ensure(identity)?;
            let graph = self.registry.graph(&state.workflow_name)?;
            let resolution = TransitionEngine::new(&graph).resolve(&state.current_phase, request)?;

            let state = if resolution.is_phase_change() {
                self.store.commit_if(
                    identity,
                    &graph,
                    &resolution.from_phase,
                    &resolution.next_phase,
                )?
            } else {
                state
            };

            Ok(NextStep {
                phase: resolution.next_phase,
                previous_phase: resolution.from_phase,
                is_modeled: resolution.matched_rule.is_some(),
                instructions: resolution.instructions,
                workflow: state.workflow_name,
                plan_file_path: state.plan_file_path,
                transition_reason: resolution.transition_reason,
            })
        })
    }

    /// Resolve without committing.
    ///
    /// Without a record, resolves from the default workflow's initial state.
    pub fn preview(
        &self,
        identity: &ConversationIdentity,
        request: &TransitionRequest,
    ) -> EngineResult<Resolution> {
        let (workflow, phase) = match self.store.get(identity)? {
            Some(state) => (state.workflow_name, Some(state.current_phase)),
            None => (self.config.workflows.default.clone(), None),
        };
        let graph = self.registry.graph(&workflow)?;
        let phase = phase.unwrap_or_else(|| graph.initial_state().to_string());
        Ok(TransitionEngine::new(&graph).resolve(&phase, request)?)
    }

    /// Current state of a conversation.
    pub fn status(&self, identity: &ConversationIdentity) -> EngineResult<ConversationStatus> {
        let state = self.store.get(identity)?.ok_or_else(|| crate::error::StoreError::NotFound {
            conversation_id: identity.conversation_id.clone(),
            project_path: identity.project_path.clone(),
        })?;
        let graph = self.registry.graph(&state.workflow_name)?;
        let current = graph.state(&state.current_phase).ok_or_else(|| {
            ResolutionError::InvalidState {
                workflow: graph.name().to_string(),
                phase: state.current_phase.clone(),
            }
        })?;

        Ok(ConversationStatus {
            phase_description: current.description.clone(),
            instructions: current.default_instructions.clone(),
            transitions: current
                .transitions
                .iter()
                .map(|rule| TransitionSummary {
                    trigger: rule.trigger.to_string(),
                    target: rule.target.clone(),
                })
                .collect(),
            phases: graph.state_ids(),
            state,
        })
    }

    /// Reset a conversation to the initial phase, optionally switching workflow.
    ///
    /// Without `workflow`, the conversation's current workflow (or the
    /// configured default for a new conversation) is used.
    pub fn reset(
        &self,
        identity: &ConversationIdentity,
        workflow: Option<&str>,
    ) -> EngineResult<ConversationState> {
        self.store.serialized(identity, || -> EngineResult<ConversationState> {
            let workflow = match workflow {
                Some(name) => name.to_string(),
                None => self
                    .store
                    .get(identity)?
                    .map_or_else(|| self.config.workflows.default.clone(), |s| s.workflow_name),
            };
            let graph = self.registry.graph(&workflow)?;
            Ok(self.store.reset(identity, &graph)?)
        })
    }

    /// Load or create the record, filling in a default plan file path.
    fn ensure(&self, identity: &ConversationIdentity) -> EngineResult<ConversationState> {
        if let Some(state) = self.store.get(identity)? {
            return Ok(state);
        }

        let graph = self.registry.graph(&self.config.workflows.default)?;
        self.store.get_or_create(identity, &graph)?;
        let plan_file_path = self.config.plan_file_path(&self.project_path, None);
        Ok(self.store.update_metadata(identity, Some(plan_file_path), None)?)
    }
}

//! Transition resolution.
//!
//! Given a compiled graph, the current phase and a request, the
//! [`TransitionEngine`] computes the next phase and the instructions that go
//! with it. Resolution is pure: committing the result is the caller's job.

use serde::Serialize;

use super::graph::{StateDefinition, TransitionRule, WorkflowGraph};
use crate::error::ResolutionError;

/// What the caller asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionRequest {
    /// Follow the first declared transition matching `signal`.
    ///
    /// `None` is the implicit proceed signal.
    Continue { signal: Option<String> },

    /// Jump straight to `target`, whether or not a declared transition
    /// leads there.
    JumpTo { target: String, reason: Option<String> },
}

impl TransitionRequest {
    /// Continue with the implicit proceed signal.
    pub fn proceed() -> Self {
        Self::Continue { signal: None }
    }

    /// Continue with a named trigger.
    pub fn signal(signal: impl Into<String>) -> Self {
        Self::Continue { signal: Some(signal.into()) }
    }

    /// Jump directly to a phase.
    pub fn jump(target: impl Into<String>) -> Self {
        Self::JumpTo { target: target.into(), reason: None }
    }

    /// Jump directly to a phase, recording why.
    pub fn jump_with_reason(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::JumpTo { target: target.into(), reason: Some(reason.into()) }
    }
}

/// Outcome of a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// Phase the resolution started from
    pub from_phase: String,
    /// Phase to commit
    pub next_phase: String,
    /// Instructions for the next phase
    pub instructions: String,
    /// Index of the declared rule used, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<usize>,
    /// Why the transition happened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition_reason: Option<String>,
}

impl Resolution {
    /// Whether the phase changes.
    pub fn is_phase_change(&self) -> bool {
        self.from_phase != self.next_phase
    }

    /// Whether a declared transition rule was used.
    pub fn is_modeled(&self) -> bool {
        self.matched_rule.is_some()
    }
}

/// Resolves transition requests against one graph.
#[derive(Debug, Clone, Copy)]
pub struct TransitionEngine<'g> {
    graph: &'g WorkflowGraph,
}

impl<'g> TransitionEngine<'g> {
    /// Create an engine for a graph.
    pub fn new(graph: &'g WorkflowGraph) -> Self {
        Self { graph }
    }

    /// Resolve the next phase.
    ///
    /// For [`TransitionRequest::Continue`], the current state's transitions
    /// are evaluated in declaration order and the first matching trigger
    /// wins; later rules with the same trigger are shadowed. With no match,
    /// the phase is unchanged and the state's default instructions are
    /// returned.
    ///
    /// For [`TransitionRequest::JumpTo`], any existing state is a valid
    /// target. If a declared rule leads from the current phase to the
    /// target, its instructions are used.
    pub fn resolve(
        &self,
        current_phase: &str,
        request: &TransitionRequest,
    ) -> Result<Resolution, ResolutionError> {
        let current = self.graph.state(current_phase).ok_or_else(|| {
            ResolutionError::InvalidState {
                workflow: self.graph.name().to_string(),
                phase: current_phase.to_string(),
            }
        })?;

        let resolution = match request {
            TransitionRequest::Continue { signal } => self.resolve_continue(current, signal.as_deref()),
            TransitionRequest::JumpTo { target, reason } => {
                self.resolve_jump(current, target, reason.as_deref())?
            }
        };

        tracing::debug!(
            workflow = self.graph.name(),
            from = %resolution.from_phase,
            to = %resolution.next_phase,
            modeled = resolution.is_modeled(),
            "Resolved transition"
        );
        Ok(resolution)
    }

    fn resolve_continue(&self, current: &StateDefinition, signal: Option<&str>) -> Resolution {
        match current.match_trigger(signal) {
            Some((index, rule)) => self.follow(current, index, rule, None),
            None => Resolution {
                from_phase: current.id.clone(),
                next_phase: current.id.clone(),
                instructions: current.default_instructions.clone(),
                matched_rule: None,
                transition_reason: None,
            },
        }
    }

    fn resolve_jump(
        &self,
        current: &StateDefinition,
        target: &str,
        reason: Option<&str>,
    ) -> Result<Resolution, ResolutionError> {
        let destination = self.graph.state(target).ok_or_else(|| ResolutionError::UnknownTarget {
            workflow: self.graph.name().to_string(),
            target: target.to_string(),
            available: self.graph.state_ids(),
        })?;

        if let Some((index, rule)) = current.rule_to(target) {
            return Ok(self.follow(current, index, rule, reason));
        }

        Ok(Resolution {
            from_phase: current.id.clone(),
            next_phase: destination.id.clone(),
            instructions: destination.default_instructions.clone(),
            matched_rule: None,
            transition_reason: reason.map(str::to_string),
        })
    }

    fn follow(
        &self,
        current: &StateDefinition,
        index: usize,
        rule: &TransitionRule,
        reason: Option<&str>,
    ) -> Resolution {
        // Validation guarantees the target exists.
        let instructions = rule.instructions.clone().unwrap_or_else(|| {
            self.graph
                .state(&rule.target)
                .map(|s| s.default_instructions.clone())
                .unwrap_or_default()
        });

        Resolution {
            from_phase: current.id.clone(),
            next_phase: rule.target.clone(),
            instructions,
            matched_rule: Some(index),
            transition_reason: reason.map(str::to_string).or_else(|| rule.reason.clone()),
        }
    }
}

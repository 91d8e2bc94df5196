//! Conversation state store.
//!
//! Owns every persisted [`ConversationState`]. Two mechanisms keep records
//! consistent under concurrent callers:
//!
//! - [`ConversationStateStore::serialized`] runs a closure while holding a
//!   lock dedicated to one identity, so read-resolve-commit cycles for the
//!   same conversation never interleave.
//! - [`ConversationStateStore::commit_if`] only writes when the record is
//!   still in the phase the caller resolved from.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use super::backend::StateBackend;
use super::record::{ConversationIdentity, ConversationState};
use crate::error::StoreError;
use crate::workflow::WorkflowGraph;

/// Durable, single-writer store of conversation records.
#[derive(Debug)]
pub struct ConversationStateStore {
    backend: Arc<dyn StateBackend>,
    /// One lock per identity, handed out by `serialized`
    identity_locks: Mutex<HashMap<ConversationIdentity, Arc<Mutex<()>>>>,
    /// Makes each load-check-save sequence atomic
    write_lock: Mutex<()>,
}

impl ConversationStateStore {
    /// Create a store over a backend.
    pub fn new(backend: Arc<dyn StateBackend>) -> Self {
        Self {
            backend,
            identity_locks: Mutex::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Run `f` while holding the lock for `identity`.
    ///
    /// The lock is not reentrant: `f` must not call `serialized` for the
    /// same identity. Locks are dropped again once no caller holds or waits
    /// for them.
    pub fn serialized<T>(&self, identity: &ConversationIdentity, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.identity_locks.lock();
            Arc::clone(locks.entry(identity.clone()).or_default())
        };
        let result = {
            let _guard = lock.lock();
            f()
        };
        self.release_lock(identity, &lock);
        result
    }

    /// Forget the lock for `identity` if only the map and `lock` refer to it.
    ///
    /// Clones are only taken under the map lock, so the count cannot grow
    /// while it is checked.
    fn release_lock(&self, identity: &ConversationIdentity, lock: &Arc<Mutex<()>>) {
        let mut locks = self.identity_locks.lock();
        if Arc::strong_count(lock) == 2 {
            locks.remove(identity);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.identity_locks.lock().len()
    }

    /// Load a record without creating it.
    pub fn get(
        &self,
        identity: &ConversationIdentity,
    ) -> Result<Option<ConversationState>, StoreError> {
        self.backend.load(identity)
    }

    /// Load a record, creating it at the graph's initial state if absent.
    pub fn get_or_create(
        &self,
        identity: &ConversationIdentity,
        graph: &WorkflowGraph,
    ) -> Result<ConversationState, StoreError> {
        let _write = self.write_lock.lock();
        if let Some(state) = self.backend.load(identity)? {
            return Ok(state);
        }

        let state = ConversationState::new(identity, graph.name(), graph.initial_state());
        self.backend.save(&state)?;
        tracing::info!(
            conversation = %identity.conversation_id,
            workflow = graph.name(),
            phase = graph.initial_state(),
            "Created conversation"
        );
        Ok(state)
    }

    /// Overwrite the current phase.
    ///
    /// Fails with [`StoreError::PhaseNotInGraph`] if `graph` does not
    /// declare `next_phase`.
    pub fn commit(
        &self,
        identity: &ConversationIdentity,
        graph: &WorkflowGraph,
        next_phase: &str,
    ) -> Result<ConversationState, StoreError> {
        self.write(identity, graph, None, next_phase)
    }

    /// Overwrite the current phase only if it is still `expected_phase`.
    ///
    /// Fails with [`StoreError::StalePhase`] if another commit got there
    /// first; the caller should resolve again against the fresh phase.
    pub fn commit_if(
        &self,
        identity: &ConversationIdentity,
        graph: &WorkflowGraph,
        expected_phase: &str,
        next_phase: &str,
    ) -> Result<ConversationState, StoreError> {
        self.write(identity, graph, Some(expected_phase), next_phase)
    }

    /// Reinitialize a record at the initial state of `graph`.
    ///
    /// `graph` may be a different workflow than the record had before.
    /// Branch, plan file and creation time are kept.
    pub fn reset(
        &self,
        identity: &ConversationIdentity,
        graph: &WorkflowGraph,
    ) -> Result<ConversationState, StoreError> {
        let _write = self.write_lock.lock();
        let state = match self.backend.load(identity)? {
            Some(mut state) => {
                state.workflow_name = graph.name().to_string();
                state.current_phase = graph.initial_state().to_string();
                state.touch();
                state
            }
            None => ConversationState::new(identity, graph.name(), graph.initial_state()),
        };

        self.backend.save(&state)?;
        tracing::info!(
            conversation = %identity.conversation_id,
            workflow = graph.name(),
            phase = graph.initial_state(),
            "Reset conversation"
        );
        Ok(state)
    }

    /// Record collaborator-supplied metadata. `None` leaves a field as is.
    pub fn update_metadata(
        &self,
        identity: &ConversationIdentity,
        plan_file_path: Option<PathBuf>,
        git_branch: Option<String>,
    ) -> Result<ConversationState, StoreError> {
        let _write = self.write_lock.lock();
        let mut state = self.load_existing(identity)?;

        if plan_file_path.is_some() {
            state.plan_file_path = plan_file_path;
        }
        if git_branch.is_some() {
            state.git_branch = git_branch;
        }
        state.touch();

        self.backend.save(&state)?;
        Ok(state)
    }

    fn write(
        &self,
        identity: &ConversationIdentity,
        graph: &WorkflowGraph,
        expected_phase: Option<&str>,
        next_phase: &str,
    ) -> Result<ConversationState, StoreError> {
        let _write = self.write_lock.lock();
        let mut state = self.load_existing(identity)?;

        if state.workflow_name != graph.name() {
            return Err(StoreError::WorkflowMismatch {
                conversation_id: identity.conversation_id.clone(),
                expected: state.workflow_name,
                actual: graph.name().to_string(),
            });
        }

        if !graph.contains(next_phase) {
            return Err(StoreError::PhaseNotInGraph {
                conversation_id: identity.conversation_id.clone(),
                workflow: graph.name().to_string(),
                phase: next_phase.to_string(),
            });
        }

        if let Some(expected) = expected_phase {
            if state.current_phase != expected {
                return Err(StoreError::StalePhase {
                    conversation_id: identity.conversation_id.clone(),
                    expected: expected.to_string(),
                    actual: state.current_phase,
                });
            }
        }

        let previous = std::mem::replace(&mut state.current_phase, next_phase.to_string());
        state.touch();
        self.backend.save(&state)?;

        tracing::info!(
            conversation = %identity.conversation_id,
            workflow = graph.name(),
            from = %previous,
            to = next_phase,
            "Committed phase"
        );
        Ok(state)
    }

    fn load_existing(
        &self,
        identity: &ConversationIdentity,
    ) -> Result<ConversationState, StoreError> {
        self.backend.load(identity)?.ok_or_else(|| StoreError::NotFound {
            conversation_id: identity.conversation_id.clone(),
            project_path: identity.project_path.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::state::backend::{FileBackend, MemoryBackend};
    use crate::workflow::WorkflowLoader;

    fn store() -> ConversationStateStore {
        ConversationStateStore::new(Arc::new(MemoryBackend::new()))
    }

    fn graph(name: &str) -> WorkflowGraph {
        WorkflowLoader::new().load_bundled(name).unwrap()
    }

    fn identity() -> ConversationIdentity {
        ConversationIdentity::new("c1", "/work/shop")
    }

    #[test]
    fn test_get_or_create_starts_at_initial_state() {
        let store = store();
        let epcc = graph("epcc");

        assert!(store.get(&identity()).unwrap().is_none());
        let state = store.get_or_create(&identity(), &epcc).unwrap();
        assert_eq!(state.current_phase, "explore");
        assert_eq!(state.workflow_name, "epcc");

        // Existing record is returned as is, even for another graph
        store.commit(&identity(), &epcc, "plan").unwrap();
        let state = store.get_or_create(&identity(), &graph("waterfall")).unwrap();
        assert_eq!(state.current_phase, "plan");
        assert_eq!(state.workflow_name, "epcc");
    }

    #[test]
    fn test_commit_round_trip_on_disk() {
        let temp = TempDir::new().unwrap();
        let epcc = graph("epcc");
        {
            let store = ConversationStateStore::new(Arc::new(FileBackend::new(temp.path())));
            store.get_or_create(&identity(), &epcc).unwrap();
            store.commit(&identity(), &epcc, "code").unwrap();
        }

        let store = ConversationStateStore::new(Arc::new(FileBackend::new(temp.path())));
        let state = store.get_or_create(&identity(), &epcc).unwrap();
        assert_eq!(state.current_phase, "code");
    }

    #[test]
    fn test_commit_rejects_phase_not_in_graph() {
        let store = store();
        let epcc = graph("epcc");
        store.get_or_create(&identity(), &epcc).unwrap();

        let err = store.commit(&identity(), &epcc, "requirements").unwrap_err();
        assert!(matches!(err, StoreError::PhaseNotInGraph { ref phase, .. } if phase == "requirements"));
        assert_eq!(store.get(&identity()).unwrap().unwrap().current_phase, "explore");
    }

    #[test]
    fn test_commit_rejects_other_workflow() {
        let store = store();
        store.get_or_create(&identity(), &graph("epcc")).unwrap();

        let err = store.commit(&identity(), &graph("waterfall"), "design").unwrap_err();
        assert!(matches!(err, StoreError::WorkflowMismatch { .. }));
    }

    #[test]
    fn test_commit_without_record() {
        let err = store().commit(&identity(), &graph("epcc"), "plan").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn test_stale_commit_fails() {
        let store = store();
        let epcc = graph("epcc");
        store.get_or_create(&identity(), &epcc).unwrap();

        // Both resolved from "explore"
        store.commit_if(&identity(), &epcc, "explore", "plan").unwrap();
        let err = store.commit_if(&identity(), &epcc, "explore", "code").unwrap_err();

        assert!(matches!(
            err,
            StoreError::StalePhase { ref expected, ref actual, .. }
                if expected == "explore" && actual == "plan"
        ));
        assert_eq!(store.get(&identity()).unwrap().unwrap().current_phase, "plan");
    }

    #[test]
    fn test_reset_switches_workflow() {
        let store = store();
        let epcc = graph("epcc");
        store.get_or_create(&identity(), &epcc).unwrap();
        store.update_metadata(&identity(), None, Some("main".to_string())).unwrap();
        store.commit(&identity(), &epcc, "code").unwrap();

        let state = store.reset(&identity(), &graph("bugfix")).unwrap();
        assert_eq!(state.workflow_name, "bugfix");
        assert_eq!(state.current_phase, "reproduce");
        assert_eq!(state.git_branch.as_deref(), Some("main"));
    }

    #[test]
    fn test_update_metadata_keeps_unset_fields() {
        let store = store();
        store.get_or_create(&identity(), &graph("tdd")).unwrap();

        store
            .update_metadata(&identity(), Some(PathBuf::from("/work/shop/.vibe/plan.md")), None)
            .unwrap();
        let state =
            store.update_metadata(&identity(), None, Some("feature/x".to_string())).unwrap();

        assert_eq!(state.plan_file(), Some(std::path::Path::new("/work/shop/.vibe/plan.md")));
        assert_eq!(state.git_branch.as_deref(), Some("feature/x"));
    }

    #[test]
    fn test_serialized_excludes_same_identity() {
        let store = Arc::new(store());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    store.serialized(&identity(), || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(10));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(store.tracked_locks(), 0);
    }

    #[test]
    fn test_identity_locks_are_released() {
        let store = store();
        for i in 0..50 {
            let identity = ConversationIdentity::new(format!("c{i}"), "/work/shop");
            store.serialized(&identity, || assert_eq!(store.tracked_locks(), 1));
        }
        assert_eq!(store.tracked_locks(), 0);
    }
}

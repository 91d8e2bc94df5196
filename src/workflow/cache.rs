//! Process-wide cache of compiled workflow graphs.
//!
//! Entries are keyed by source (`bundled:<name>` or `custom:<path>`) and
//! carry the fingerprint of the document they were compiled from. A lookup
//! with a different fingerprint recompiles, so edits to a custom document
//! are picked up without a restart.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use super::graph::WorkflowGraph;
use crate::error::DefinitionError;

/// Fingerprint used for documents compiled into the binary.
pub const BUNDLED_FINGERPRINT: &str = "bundled";

/// Cache key for a bundled workflow.
pub fn bundled_key(name: &str) -> String {
    format!("bundled:{name}")
}

/// Cache key for a custom override document.
pub fn custom_key(path: &Path) -> String {
    format!("custom:{}", path.display())
}

/// Qualify a key with the loader's validation profile.
pub fn scoped_key(key: &str, scope: &str) -> String {
    if scope.is_empty() {
        key.to_string()
    } else {
        format!("{key}#required={scope}")
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    fingerprint: String,
    graph: Arc<WorkflowGraph>,
}

/// Cache of compiled graphs.
///
/// Shared through an `Arc`; there is no global instance.
#[derive(Debug, Default)]
pub struct GraphCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl GraphCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached graph for `key` if its fingerprint matches,
    /// otherwise run `load` and cache the result.
    ///
    /// A failing `load` leaves the previous entry in place.
    pub fn get_or_load<F>(
        &self,
        key: &str,
        fingerprint: &str,
        load: F,
    ) -> Result<Arc<WorkflowGraph>, DefinitionError>
    where
        F: FnOnce() -> Result<WorkflowGraph, DefinitionError>,
    {
        if let Some(entry) = self.entries.read().get(key) {
            if entry.fingerprint == fingerprint {
                tracing::debug!(key, "Workflow cache hit");
                return Ok(Arc::clone(&entry.graph));
            }
        }

        tracing::debug!(key, fingerprint, "Workflow cache miss");
        let graph = Arc::new(load()?);

        self.entries.write().insert(
            key.to_string(),
            CacheEntry { fingerprint: fingerprint.to_string(), graph: Arc::clone(&graph) },
        );
        Ok(graph)
    }

    /// Last successfully compiled graph for `key`, whatever its fingerprint.
    pub fn cached(&self, key: &str) -> Option<Arc<WorkflowGraph>> {
        self.entries.read().get(key).map(|e| Arc::clone(&e.graph))
    }

    /// Drop every entry whose graph is named `workflow_name`.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate(&self, workflow_name: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.graph.name() != workflow_name);
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(workflow = workflow_name, removed, "Invalidated cached workflow");
        }
        removed
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of cached graphs.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

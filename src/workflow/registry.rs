//! Workflow discovery.
//!
//! The registry knows every bundled workflow plus the project's custom
//! override, lists their metadata cheaply, and hands out compiled graphs
//! through the shared [`GraphCache`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use super::bundled::{bundled_names, find_bundled, BUNDLED_WORKFLOWS};
use super::cache::{bundled_key, custom_key, scoped_key, GraphCache, BUNDLED_FINGERPRINT};
use super::graph::{GraphSource, WorkflowGraph};
use super::loader::{parse_header, read_override, WorkflowLoader};
use super::schema::{Complexity, WorkflowHeader};
use crate::error::DefinitionError;

/// Where a listed workflow comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowOrigin {
    Bundled,
    Custom,
}

/// Descriptive summary of one workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<Complexity>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub use_cases: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub best_for: Vec<String>,
    pub origin: WorkflowOrigin,
}

impl WorkflowInfo {
    fn from_header(header: WorkflowHeader, origin: WorkflowOrigin) -> Self {
        let metadata = header.metadata.unwrap_or_default();
        Self {
            name: header.name,
            description: header.description.or(metadata.description),
            domain: metadata.domain,
            complexity: metadata.complexity,
            use_cases: metadata.use_cases,
            best_for: metadata.best_for,
            origin,
        }
    }
}

/// Registry of the workflows available to one project.
#[derive(Debug, Clone)]
pub struct WorkflowRegistry {
    project_path: PathBuf,
    loader: WorkflowLoader,
    cache: Arc<GraphCache>,
    domains: Vec<String>,
}

impl WorkflowRegistry {
    /// Create a registry for a project, sharing the given cache.
    pub fn new(project_path: impl Into<PathBuf>, cache: Arc<GraphCache>) -> Self {
        Self {
            project_path: project_path.into(),
            loader: WorkflowLoader::new(),
            cache,
            domains: Vec::new(),
        }
    }

    /// Use a specific loader (e.g. one with required states).
    pub fn with_loader(mut self, loader: WorkflowLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Only list bundled workflows in these domains. Empty lists all.
    pub fn with_domains(mut self, domains: Vec<String>) -> Self {
        self.domains = domains;
        self
    }

    /// Project directory this registry looks for overrides in.
    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    /// Shared graph cache.
    pub fn cache(&self) -> &Arc<GraphCache> {
        &self.cache
    }

    /// List workflow metadata without compiling any graph.
    ///
    /// A custom override with the same name as a bundled workflow replaces
    /// it in the listing. Custom workflows are never filtered by domain.
    pub fn list(&self) -> Result<Vec<WorkflowInfo>, DefinitionError> {
        let mut infos = Vec::new();

        for bundled in BUNDLED_WORKFLOWS.iter() {
            let header = parse_header(bundled.source, &GraphSource::Bundled)?;
            let info = WorkflowInfo::from_header(header, WorkflowOrigin::Bundled);
            if self.domain_enabled(info.domain.as_deref()) {
                infos.push(info);
            }
        }

        if let Some(source) = read_override(&self.project_path)? {
            match parse_header(&source.content, &GraphSource::Custom(source.path.clone())) {
                Ok(header) => {
                    let custom = WorkflowInfo::from_header(header, WorkflowOrigin::Custom);
                    if let Some(existing) = infos.iter_mut().find(|i| i.name == custom.name) {
                        *existing = custom;
                    } else {
                        infos.push(custom);
                    }
                }
                Err(e) => {
                    tracing::warn!(path = ?source.path, error = %e, "Skipping unreadable custom workflow");
                }
            }
        }

        Ok(infos)
    }

    /// Names of all available workflows, ignoring the domain filter.
    pub fn names(&self) -> Result<Vec<String>, DefinitionError> {
        let mut names = bundled_names();
        if let Some(source) = read_override(&self.project_path)? {
            let header = parse_header(&source.content, &GraphSource::Custom(source.path))?;
            if !names.contains(&header.name) {
                names.push(header.name);
            }
        }
        Ok(names)
    }

    /// Compiled graph for a workflow.
    ///
    /// The custom override wins over a bundled workflow of the same name and
    /// replaces it completely. A broken override is reported, not skipped.
    /// Cache entries are scoped by the loader's required states, so registries
    /// with different validation rules can share one cache.
    pub fn graph(&self, name: &str) -> Result<Arc<WorkflowGraph>, DefinitionError> {
        let scope = self.loader.cache_scope();

        if let Some(source) = read_override(&self.project_path)? {
            let origin = GraphSource::Custom(source.path.clone());
            let header = parse_header(&source.content, &origin)?;
            if header.name == name {
                let key = scoped_key(&custom_key(&source.path), &scope);
                return self.cache.get_or_load(&key, &source.fingerprint, || {
                    self.loader.parse_str(&source.content, origin)
                });
            }
        }

        if find_bundled(name).is_none() {
            return Err(DefinitionError::UnknownWorkflow {
                name: name.to_string(),
                available: self.names().unwrap_or_else(|_| bundled_names()),
            });
        }

        let key = scoped_key(&bundled_key(name), &scope);
        self.cache.get_or_load(&key, BUNDLED_FINGERPRINT, || {
            self.loader.load_bundled(name)
        })
    }

    /// Drop the cached graph(s) for a workflow.
    pub fn invalidate(&self, name: &str) -> usize {
        self.cache.invalidate(name)
    }

    fn domain_enabled(&self, domain: Option<&str>) -> bool {
        if self.domains.is_empty() {
            return true;
        }
        domain.is_some_and(|d| self.domains.iter().any(|enabled| enabled == d))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::workflow::loader::OVERRIDE_DIR;

    const CUSTOM_WATERFALL: &str = r"
name: waterfall
description: Team waterfall
initialState: spec
metadata:
  domain: code
  complexity: low
states:
  spec:
    defaultInstructions: Write the spec.
    transitions:
      - trigger: spec_done
        target: complete
  complete:
    defaultInstructions: Done.
";

    fn write_override(dir: &Path, file: &str, content: &str) {
        let vibe = dir.join(OVERRIDE_DIR);
        fs::create_dir_all(&vibe).unwrap();
        fs::write(vibe.join(file), content).unwrap();
    }

    fn registry(dir: &Path) -> WorkflowRegistry {
        WorkflowRegistry::new(dir, Arc::new(GraphCache::new()))
    }

    #[test]
    fn test_list_bundled() {
        let temp = TempDir::new().unwrap();
        let infos = registry(temp.path()).list().unwrap();

        assert_eq!(infos.len(), BUNDLED_WORKFLOWS.len());
        let waterfall = infos.iter().find(|i| i.name == "waterfall").unwrap();
        assert_eq!(waterfall.domain.as_deref(), Some("code"));
        assert_eq!(waterfall.complexity, Some(Complexity::High));
        assert!(!waterfall.use_cases.is_empty());
        assert_eq!(waterfall.origin, WorkflowOrigin::Bundled);
    }

    #[test]
    fn test_list_filters_by_domain() {
        let temp = TempDir::new().unwrap();
        let infos =
            registry(temp.path()).with_domains(vec!["office".to_string()]).list().unwrap();

        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].name, "posts");
    }

    #[test]
    fn test_custom_replaces_bundled_in_listing() {
        let temp = TempDir::new().unwrap();
        write_override(temp.path(), "state-machine.yml", CUSTOM_WATERFALL);

        let infos = registry(temp.path()).list().unwrap();
        assert_eq!(infos.len(), BUNDLED_WORKFLOWS.len());
        let waterfall = infos.iter().find(|i| i.name == "waterfall").unwrap();
        assert_eq!(waterfall.origin, WorkflowOrigin::Custom);
        assert_eq!(waterfall.description.as_deref(), Some("Team waterfall"));
    }

    #[test]
    fn test_custom_graph_fully_replaces_bundled() {
        let temp = TempDir::new().unwrap();
        write_override(temp.path(), "state-machine.yml", CUSTOM_WATERFALL);

        let graph = registry(temp.path()).graph("waterfall").unwrap();
        assert_eq!(graph.initial_state(), "spec");
        assert_eq!(graph.state_ids(), vec!["spec", "complete"]);
        assert!(!graph.contains("requirements"));
        assert!(matches!(graph.source(), GraphSource::Custom(_)));
    }

    #[test]
    fn test_custom_with_new_name_is_added() {
        let temp = TempDir::new().unwrap();
        write_override(
            temp.path(),
            "state-machine.yaml",
            &CUSTOM_WATERFALL.replace("name: waterfall", "name: house"),
        );

        let registry = registry(temp.path());
        assert!(registry.names().unwrap().contains(&"house".to_string()));
        assert_eq!(registry.graph("house").unwrap().initial_state(), "spec");
        assert_eq!(registry.graph("waterfall").unwrap().initial_state(), "requirements");
    }

    #[test]
    fn test_custom_edit_is_picked_up() {
        let temp = TempDir::new().unwrap();
        write_override(temp.path(), "state-machine.yml", CUSTOM_WATERFALL);
        let registry = registry(temp.path());

        let first = registry.graph("waterfall").unwrap();
        let second = registry.graph("waterfall").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        write_override(
            temp.path(),
            "state-machine.yml",
            &CUSTOM_WATERFALL.replace("Write the spec.", "Write a better spec."),
        );
        let third = registry.graph("waterfall").unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.state("spec").unwrap().default_instructions, "Write a better spec.");
    }

    #[test]
    fn test_invalid_custom_is_reported() {
        let temp = TempDir::new().unwrap();
        write_override(
            temp.path(),
            "state-machine.yml",
            &CUSTOM_WATERFALL.replace("target: complete", "target: shipped"),
        );

        let err = registry(temp.path()).graph("waterfall").unwrap_err();
        assert!(matches!(err, DefinitionError::Validation { .. }));
        assert!(err.to_string().contains("'shipped'"));
    }

    #[test]
    fn test_shared_cache_respects_required_states() {
        let temp = TempDir::new().unwrap();
        let cache = Arc::new(GraphCache::new());
        let lax = WorkflowRegistry::new(temp.path(), Arc::clone(&cache));
        let strict = WorkflowRegistry::new(temp.path(), Arc::clone(&cache)).with_loader(
            WorkflowLoader::new().with_required_states(vec!["signoff".to_string()]),
        );

        assert!(lax.graph("waterfall").is_ok());
        let err = strict.graph("waterfall").unwrap_err();
        assert!(err.to_string().contains("required state 'signoff' is missing"));

        // The lax entry is still served to the lax registry
        assert!(lax.graph("waterfall").is_ok());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_unknown_workflow() {
        let temp = TempDir::new().unwrap();
        let err = registry(temp.path()).graph("kanban").unwrap_err();
        assert!(err.to_string().contains("'kanban'"));
        assert!(err.to_string().contains("waterfall"));
    }

    #[test]
    fn test_ambiguous_override_surfaces() {
        let temp = TempDir::new().unwrap();
        write_override(temp.path(), "state-machine.yml", CUSTOM_WATERFALL);
        write_override(temp.path(), "state-machine.yaml", CUSTOM_WATERFALL);

        let registry = registry(temp.path());
        assert!(matches!(registry.list(), Err(DefinitionError::AmbiguousOverride { .. })));
        assert!(matches!(
            registry.graph("epcc"),
            Err(DefinitionError::AmbiguousOverride { .. })
        ));
    }
}

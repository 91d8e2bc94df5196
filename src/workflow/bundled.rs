//! Workflow documents shipped with the binary.

use once_cell::sync::Lazy;

/// A statically shipped workflow document.
#[derive(Debug, Clone, Copy)]
pub struct BundledWorkflow {
    /// Workflow name, equal to the document's `name`
    pub name: &'static str,
    /// Raw YAML document
    pub source: &'static str,
}

impl BundledWorkflow {
    const fn new(name: &'static str, source: &'static str) -> Self {
        Self { name, source }
    }
}

/// All bundled workflows, in listing order.
pub static BUNDLED_WORKFLOWS: Lazy<Vec<BundledWorkflow>> = Lazy::new(|| {
    vec![
        BundledWorkflow::new("waterfall", include_str!("bundled/waterfall.yaml")),
        BundledWorkflow::new("epcc", include_str!("bundled/epcc.yaml")),
        BundledWorkflow::new("bugfix", include_str!("bundled/bugfix.yaml")),
        BundledWorkflow::new("minor", include_str!("bundled/minor.yaml")),
        BundledWorkflow::new("tdd", include_str!("bundled/tdd.yaml")),
        BundledWorkflow::new("greenfield", include_str!("bundled/greenfield.yaml")),
        BundledWorkflow::new("posts", include_str!("bundled/posts.yaml")),
    ]
});

/// Find a bundled workflow by name.
pub fn find_bundled(name: &str) -> Option<&'static BundledWorkflow> {
    BUNDLED_WORKFLOWS.iter().find(|w| w.name == name)
}

/// Names of all bundled workflows.
pub fn bundled_names() -> Vec<String> {
    BUNDLED_WORKFLOWS.iter().map(|w| w.name.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::schema::WorkflowHeader;

    #[test]
    fn test_bundled_names_match_documents() {
        for workflow in BUNDLED_WORKFLOWS.iter() {
            let header: WorkflowHeader = serde_yaml::from_str(workflow.source).unwrap();
            assert_eq!(header.name, workflow.name);
        }
    }

    #[test]
    fn test_find_bundled() {
        assert!(find_bundled("waterfall").is_some());
        assert!(find_bundled("nope").is_none());
        assert!(bundled_names().contains(&"epcc".to_string()));
    }
}

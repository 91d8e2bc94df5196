//! Declarative workflow graphs.
//!
//! Workflows are YAML documents describing phases and the transitions
//! between them. They ship with the binary or come from a project-local
//! override at `.vibe/state-machine.yml` (or `.yaml`), which fully replaces
//! a bundled workflow of the same name.
//!
//! ## Pipeline
//!
//! - `schema` - document types as written
//! - `loader` - parse, validate, compile
//! - `cache` - compiled graphs keyed by source and content fingerprint
//! - `registry` - discovery, metadata listing, graph lookup
//! - `transition` - next-phase resolution

mod bundled;
mod cache;
mod graph;
mod loader;
mod registry;
mod schema;
mod transition;

pub use bundled::{bundled_names, find_bundled, BundledWorkflow, BUNDLED_WORKFLOWS};
pub use cache::{bundled_key, custom_key, scoped_key, GraphCache, BUNDLED_FINGERPRINT};
pub use graph::{
    GraphSource, StateDefinition, TransitionRule, Trigger, WorkflowGraph, PROCEED_TRIGGER,
};
pub use loader::{
    find_override, fingerprint, parse_header, read_override, OverrideSource, WorkflowLoader,
    OVERRIDE_DIR, OVERRIDE_FILES,
};
pub use registry::{WorkflowInfo, WorkflowOrigin, WorkflowRegistry};
pub use schema::{
    Complexity, StateDocument, StateEntries, TransitionDocument, WorkflowDocument, WorkflowHeader,
    WorkflowMetadata,
};
pub use transition::{Resolution, TransitionEngine, TransitionRequest};

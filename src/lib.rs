//! # Vibeflow
//!
//! Declarative phase workflow engine for AI coding assistants.
//!
//! Vibeflow drives an assistant through a multi-phase development process
//! (requirements, design, implementation, ...) described as a YAML state
//! machine. It tracks which phase each conversation is in and returns the
//! instructions for that phase.
//!
//! ## Features
//!
//! - **Bundled workflows**: waterfall, epcc, bugfix, minor, tdd, greenfield, posts
//! - **Custom workflows**: a project-local `.vibe/state-machine.yml` replaces a
//!   bundled workflow of the same name or adds a new one
//! - **Validated graphs**: every document is checked before use, with all
//!   problems reported at once
//! - **Direct transitions**: jump to any phase when the declared edges do not fit
//! - **Consistent state**: per-conversation locking and compare-and-set commits
//!
//! ## Quick Start
//!
//! ```no_run
//! use vibeflow::{ConversationIdentity, TransitionRequest, WorkflowEngine};
//!
//! # fn main() -> anyhow::Result<()> {
//! let project = std::path::Path::new(".");
//! let engine = WorkflowEngine::open(project)?;
//! let identity = ConversationIdentity::derive(project, Some("main"));
//!
//! let step = engine.resolve_next(&identity, &TransitionRequest::proceed())?;
//! println!("{}: {}", step.phase, step.instructions);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

pub mod core;
pub mod engine;
pub mod error;
pub mod state;
pub mod workflow;

// Re-export commonly used types
pub use core::Config;
pub use engine::{ConversationStatus, NextStep, StartOptions, TransitionSummary, WorkflowEngine};
pub use error::{
    DefinitionError, EngineError, EngineResult, ResolutionError, StoreError, ValidationIssue,
};
pub use state::{
    ConversationIdentity, ConversationState, ConversationStateStore, FileBackend, MemoryBackend,
    StateBackend,
};
pub use workflow::{
    GraphCache, Resolution, TransitionEngine, TransitionRequest, WorkflowGraph, WorkflowInfo,
    WorkflowLoader, WorkflowRegistry,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "vibeflow";

//! Core functionality shared across Vibeflow.
//!
//! Currently just configuration loading.

mod config;

pub use config::{Config, PlanConfig, StateConfig, WorkflowsConfig, DOMAINS_ENV};

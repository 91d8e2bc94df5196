//! Persisted conversation state.
//!
//! One record per (conversation id, project path), holding the governing
//! workflow, the current phase and collaborator-supplied metadata.

mod backend;
mod record;
mod store;

pub use backend::{FileBackend, MemoryBackend, StateBackend};
pub use record::{sanitize_branch, ConversationIdentity, ConversationState};
pub use store::ConversationStateStore;

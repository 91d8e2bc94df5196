//! Storage backends for conversation records.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tempfile::NamedTempFile;

use super::record::{ConversationIdentity, ConversationState};
use crate::error::StoreError;

/// Raw persistence for conversation records.
///
/// Backends only read and write whole records; consistency rules live in
/// [`ConversationStateStore`](super::ConversationStateStore).
pub trait StateBackend: Send + Sync + std::fmt::Debug {
    /// Load the record for an identity, if one exists.
    fn load(&self, identity: &ConversationIdentity) -> Result<Option<ConversationState>, StoreError>;

    /// Persist a record, replacing any previous version atomically.
    fn save(&self, state: &ConversationState) -> Result<(), StoreError>;
}

/// JSON files, one per conversation.
///
/// Records are written to a temporary file in the same directory and
/// renamed into place, so readers never see a half-written record.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Store records under `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the records.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for an identity.
    pub fn record_path(&self, identity: &ConversationIdentity) -> PathBuf {
        self.dir.join(format!("{}.json", identity.storage_key()))
    }
}

impl StateBackend for FileBackend {
    fn load(&self, identity: &ConversationIdentity) -> Result<Option<ConversationState>, StoreError> {
        let path = self.record_path(identity);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        let state: ConversationState = serde_json::from_str(&content)?;
        if !state.is_for(identity) {
            tracing::warn!(path = ?path, "Record file belongs to a different conversation");
            return Ok(None);
        }
        Ok(Some(state))
    }

    fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;

        let content = serde_json::to_string_pretty(state)?;
        let mut file = NamedTempFile::new_in(&self.dir)?;
        file.write_all(content.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(self.record_path(&state.identity())).map_err(|e| e.error)?;
        Ok(())
    }
}

/// In-memory records, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<ConversationIdentity, ConversationState>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl StateBackend for MemoryBackend {
    fn load(&self, identity: &ConversationIdentity) -> Result<Option<ConversationState>, StoreError> {
        Ok(self.records.lock().get(identity).cloned())
    }

    fn save(&self, state: &ConversationState) -> Result<(), StoreError> {
        self.records.lock().insert(state.identity(), state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_file_backend_round_trip() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::new(temp.path().join("conversations"));
        let identity = ConversationIdentity::new("c1", "/work/a");

        assert!(backend.load(&identity).unwrap().is_none());

        let mut state = ConversationState::new(&identity, "epcc", "explore");
        state.git_branch = Some("main".to_string());
        backend.save(&state).unwrap();

        let loaded = backend.load(&identity).unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(backend.record_path(&identity).exists());
    }

    #[test]
    fn test_file_backend_overwrites() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::new(temp.path());
        let identity = ConversationIdentity::new("c1", "/work/a");

        let mut state = ConversationState::new(&identity, "epcc", "explore");
        backend.save(&state).unwrap();
        state.current_phase = "plan".to_string();
        backend.save(&state).unwrap();

        assert_eq!(backend.load(&identity).unwrap().unwrap().current_phase, "plan");

        // Only the record itself, no leftover temp files
        let files = fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(files, 1);
    }

    #[test]
    fn test_file_backend_corrupt_record() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::new(temp.path());
        let identity = ConversationIdentity::new("c1", "/work/a");
        fs::write(backend.record_path(&identity), "{ not json").unwrap();

        assert!(matches!(backend.load(&identity), Err(StoreError::Serialization(_))));
    }

    #[test]
    fn test_memory_backend() {
        let backend = MemoryBackend::new();
        let identity = ConversationIdentity::new("c1", "/work/a");
        assert!(backend.is_empty());

        backend.save(&ConversationState::new(&identity, "tdd", "red")).unwrap();
        assert_eq!(backend.len(), 1);
        assert_eq!(backend.load(&identity).unwrap().unwrap().current_phase, "red");
        assert!(backend.load(&ConversationIdentity::new("c2", "/work/a")).unwrap().is_none());
    }
}

//! Disk-backed manual override store.
//!
//! Persists the [`ManualOverrideSet`] as JSON at `<data_dir>/manual_overrides.json`.
//! Writes go through a temp file followed by a rename so a crash mid-write never
//! leaves a truncated file behind. Unreadable or malformed files load as the empty set.
//!
//! Every mutation that actually changes the set is announced on the store's
//! signaling bus after it has been persisted.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};

use crate::bus::{SignalBus, Subscription};
use crate::collaborators::OverrideSource;
use crate::constants::OVERRIDES_FILE;
use crate::events::OverrideChange;
use crate::models::ManualOverrideSet;

#[derive(Debug, thiserror::Error)]
pub enum OverrideStoreError {
    #[error("Failed to persist overrides to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to encode overrides: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct OverrideStore {
    /// `None` for an in-memory store
    path: Option<PathBuf>,
    state: Mutex<ManualOverrideSet>,
    bus: SignalBus<OverrideChange>,
}

/// Returns the path to the override file inside `data_dir`.
pub fn overrides_path(data_dir: &Path) -> PathBuf {
    data_dir.join(OVERRIDES_FILE)
}

impl OverrideStore {
    /// Open the store in `data_dir`, loading whatever is persisted there.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Self {
        let path = overrides_path(data_dir.as_ref());
        let state = load_overrides(&path);
        Self {
            path: Some(path),
            state: Mutex::new(state),
            bus: SignalBus::new(),
        }
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(ManualOverrideSet::default()),
            bus: SignalBus::new(),
        }
    }

    pub fn snapshot(&self) -> ManualOverrideSet {
        self.state.lock().clone()
    }

    // ===== Mutations =====

    pub fn flag_conversation(&self, conversation_id: &str) -> Result<bool, OverrideStoreError> {
        self.mutate(
            |set| set.flag_conversation(conversation_id),
            || OverrideChange::ConversationFlagged(conversation_id.to_string()),
        )
    }

    /// Clears the conversation flag together with its message flags.
    pub fn clear_conversation(&self, conversation_id: &str) -> Result<bool, OverrideStoreError> {
        self.mutate(
            |set| set.clear_conversation(conversation_id),
            || OverrideChange::ConversationCleared(conversation_id.to_string()),
        )
    }

    pub fn flag_message(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<bool, OverrideStoreError> {
        self.mutate(
            |set| set.flag_message(conversation_id, message_id),
            || OverrideChange::MessageFlagged {
                conversation_id: conversation_id.to_string(),
                message_id: message_id.to_string(),
            },
        )
    }

    pub fn clear_message(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<bool, OverrideStoreError> {
        self.mutate(
            |set| set.clear_message(conversation_id, message_id),
            || OverrideChange::MessageCleared {
                conversation_id: conversation_id.to_string(),
                message_id: message_id.to_string(),
            },
        )
    }

    pub fn clear_all(&self) -> Result<bool, OverrideStoreError> {
        self.mutate(
            |set| {
                let changed = !set.is_empty();
                *set = ManualOverrideSet::default();
                changed
            },
            || OverrideChange::Reset,
        )
    }

    /// Re-read the file, announcing a reset if its contents differ from memory.
    /// Picks up edits made by another process.
    pub fn reload(&self) -> bool {
        let Some(path) = &self.path else {
            return false;
        };
        let loaded = load_overrides(path);
        let changed = {
            let mut state = self.state.lock();
            if *state == loaded {
                false
            } else {
                *state = loaded;
                true
            }
        };
        if changed {
            self.bus.emit(&OverrideChange::Reset);
        }
        changed
    }

    /// Apply `op` under the lock and persist. Signals only when `op` reports a change;
    /// on a failed write the in-memory state is rolled back.
    fn mutate(
        &self,
        op: impl FnOnce(&mut ManualOverrideSet) -> bool,
        change: impl FnOnce() -> OverrideChange,
    ) -> Result<bool, OverrideStoreError> {
        {
            let mut state = self.state.lock();
            let previous = state.clone();
            if !op(&mut state) {
                return Ok(false);
            }
            if let Some(path) = &self.path {
                if let Err(e) = save_overrides(path, &state) {
                    *state = previous;
                    return Err(e);
                }
            }
        }

        self.bus.emit(&change());
        Ok(true)
    }
}

impl OverrideSource for OverrideStore {
    fn read_overrides(&self) -> ManualOverrideSet {
        self.snapshot()
    }

    fn subscribe_override_changes(
        &self,
        handler: Box<dyn Fn(&OverrideChange) + Send + Sync>,
    ) -> Subscription {
        self.bus.subscribe(handler)
    }
}

fn load_overrides(path: &Path) -> ManualOverrideSet {
    match std::fs::read(path) {
        Ok(bytes) => ManualOverrideSet::from_json_lenient(&bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ManualOverrideSet::default(),
        Err(e) => {
            tracing::warn!("override_store: failed to read {}: {}", path.display(), e);
            ManualOverrideSet::default()
        }
    }
}

fn save_overrides(path: &Path, set: &ManualOverrideSet) -> Result<(), OverrideStoreError> {
    let bytes = serde_json::to_vec_pretty(set)?;
    let write_err = |source: std::io::Error| OverrideStoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    let temp_file = path.with_extension("json.tmp");
    std::fs::write(&temp_file, &bytes).map_err(write_err)?;
    std::fs::rename(&temp_file, path).map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_persists_across_open() {
        let dir = tempdir().unwrap();
        {
            let store = OverrideStore::open(dir.path());
            assert!(store.flag_conversation("A").unwrap());
            assert!(store.flag_message("B", "m1").unwrap());
        }

        let reopened = OverrideStore::open(dir.path());
        let set = reopened.snapshot();
        assert!(set.is_conversation_flagged("A"));
        assert_eq!(set.flagged_message_count("B"), 1);
    }

    #[test]
    fn test_malformed_file_loads_empty() {
        let dir = tempdir().unwrap();
        std::fs::write(overrides_path(dir.path()), "{\"conversationFlags\": [").unwrap();

        let store = OverrideStore::open(dir.path());
        assert!(store.snapshot().is_empty());

        // The store stays writable and replaces the corrupt file
        store.flag_conversation("A").unwrap();
        let reopened = OverrideStore::open(dir.path());
        assert!(reopened.snapshot().is_conversation_flagged("A"));
    }

    #[test]
    fn test_signals_only_on_change() {
        let store = OverrideStore::in_memory();
        let changes: Arc<Mutex<Vec<OverrideChange>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = changes.clone();
        let _sub = store.subscribe_override_changes(Box::new(move |c: &OverrideChange| {
            sink.lock().push(c.clone())
        }));

        store.flag_conversation("A").unwrap();
        store.flag_conversation("A").unwrap();
        store.clear_message("A", "missing").unwrap();
        store.clear_conversation("A").unwrap();

        assert_eq!(
            *changes.lock(),
            vec![
                OverrideChange::ConversationFlagged("A".to_string()),
                OverrideChange::ConversationCleared("A".to_string()),
            ]
        );
    }

    #[test]
    fn test_reload_picks_up_external_edit() {
        let dir = tempdir().unwrap();
        let store = OverrideStore::open(dir.path());
        let signals = Arc::new(Mutex::new(0usize));
        let sink = signals.clone();
        let _sub = store.subscribe_override_changes(Box::new(move |_: &OverrideChange| {
            *sink.lock() += 1
        }));

        assert!(!store.reload());

        let other = OverrideStore::open(dir.path());
        other.flag_message("C", "m7").unwrap();

        assert!(store.reload());
        assert_eq!(store.snapshot().flagged_message_count("C"), 1);
        assert_eq!(*signals.lock(), 1);
    }

    #[test]
    fn test_clear_all() {
        let store = OverrideStore::in_memory();
        assert!(!store.clear_all().unwrap());
        store.flag_conversation("A").unwrap();
        assert!(store.clear_all().unwrap());
        assert!(store.snapshot().is_empty());
    }
}

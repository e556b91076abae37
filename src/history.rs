//! Durable history of past generations: an ordered sequence, most recent
//! first, persisted whole-value as JSON. Persistence failures never block
//! the in-memory state.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use tracing::{error, warn};
use uuid::Uuid;

use crate::models::{AdCreative, FunnelStage, HistoryEntry, Page};

/// Narrow storage capability: the whole serialized sequence in, the whole
/// serialized sequence out.
pub trait HistoryPersistence: Send + Sync {
    /// `Ok(None)` when nothing has been persisted yet.
    fn load(&self) -> io::Result<Option<String>>;
    fn persist(&self, serialized: &str) -> io::Result<()>;
    fn clear(&self) -> io::Result<()>;
}

pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HistoryPersistence for JsonFilePersistence {
    fn load(&self) -> io::Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn persist(&self, serialized: &str) -> io::Result<()> {
        std::fs::write(&self.path, serialized)
    }

    fn clear(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

pub struct HistoryStore {
    entries: RwLock<Vec<HistoryEntry>>,
    persistence: Box<dyn HistoryPersistence>,
}

impl HistoryStore {
    /// Loads the persisted sequence. Corrupt data is discarded and the
    /// persisted value cleared; a read failure starts an empty in-memory
    /// history.
    pub fn open(persistence: Box<dyn HistoryPersistence>) -> Self {
        let entries = match persistence.load() {
            Ok(Some(text)) => match serde_json::from_str(&text) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("discarding corrupt persisted history: {e}");
                    if let Err(e) = persistence.clear() {
                        warn!("failed to clear corrupt history: {e}");
                    }
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("failed to read persisted history, starting empty: {e}");
                Vec::new()
            }
        };
        Self {
            entries: RwLock::new(entries),
            persistence,
        }
    }

    pub fn list(&self) -> Vec<HistoryEntry> {
        self.entries.read().clone()
    }

    pub fn entry(&self, id: Uuid) -> Option<HistoryEntry> {
        self.entries.read().iter().find(|e| e.id == id).cloned()
    }

    /// Prepends a new entry and persists the whole sequence.
    pub fn append(&self, entry: HistoryEntry) {
        let mut entries = self.entries.write();
        entries.insert(0, entry);
        self.persist(&entries);
    }

    /// Replaces the matching entry's mutable fields in place. No-op when the
    /// id is not found. Returns whether an entry was updated.
    pub fn update(
        &self,
        id: Uuid,
        pages: BTreeMap<FunnelStage, Page>,
        ad_creative: AdCreative,
        display_name: String,
    ) -> bool {
        let mut entries = self.entries.write();
        let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
            return false;
        };
        entry.pages = pages;
        entry.ad_creative = ad_creative;
        entry.display_name = display_name;
        self.persist(&entries);
        true
    }

    /// Removes the matching entry. Returns whether anything was removed.
    pub fn remove(&self, id: Uuid) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return false;
        }
        self.persist(&entries);
        true
    }

    fn persist(&self, entries: &[HistoryEntry]) {
        let serialized = match serde_json::to_string(entries) {
            Ok(serialized) => serialized,
            Err(e) => {
                error!("failed to serialize history: {e}");
                return;
            }
        };
        if let Err(e) = self.persistence.persist(&serialized) {
            error!("failed to persist history, continuing in memory: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn entry(name: &str) -> HistoryEntry {
        let mut pages = BTreeMap::new();
        pages.insert(
            FunnelStage::Tofu,
            Page {
                stage: FunnelStage::Tofu,
                html_content: format!("<h1>{name}</h1>"),
            },
        );
        HistoryEntry::new(name.into(), pages, AdCreative::default())
    }

    fn file_store(dir: &TempDir) -> HistoryStore {
        let path = dir.path().join("history.json");
        HistoryStore::open(Box::new(JsonFilePersistence::new(path)))
    }

    #[test]
    fn append_then_reload_round_trips() {
        let dir = TempDir::new().unwrap();
        let first = entry("first");

        let store = file_store(&dir);
        store.append(first.clone());
        store.append(entry("second"));

        let reloaded = file_store(&dir);
        let entries = reloaded.list();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].display_name, "second");
        assert_eq!(entries[1], first);
    }

    #[test]
    fn update_touches_only_the_matching_entry() {
        let dir = TempDir::new().unwrap();
        let store = file_store(&dir);
        let a = entry("a");
        let b = entry("b");
        store.append(a.clone());
        store.append(b.clone());

        let mut pages = BTreeMap::new();
        pages.insert(
            FunnelStage::Mofu,
            Page {
                stage: FunnelStage::Mofu,
                html_content: "<h1>edited</h1>".into(),
            },
        );
        assert!(store.update(a.id, pages.clone(), AdCreative::default(), "a2".into()));

        let entries = store.list();
        assert_eq!(entries[0], b);
        assert_eq!(entries[1].id, a.id);
        assert_eq!(entries[1].display_name, "a2");
        assert_eq!(entries[1].pages, pages);
        assert_eq!(entries[1].created_at, a.created_at);
    }

    #[test]
    fn update_of_absent_id_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let store = file_store(&dir);
        store.append(entry("only"));

        assert!(!store.update(
            Uuid::new_v4(),
            BTreeMap::new(),
            AdCreative::default(),
            "ghost".into()
        ));
        assert_eq!(store.list()[0].display_name, "only");
    }

    #[test]
    fn remove_deletes_exactly_the_matching_entry() {
        let dir = TempDir::new().unwrap();
        let store = file_store(&dir);
        let a = entry("a");
        let b = entry("b");
        store.append(a.clone());
        store.append(b.clone());

        assert!(store.remove(a.id));
        let entries = store.list();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, b.id);

        assert!(!store.remove(a.id));
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn corrupt_persisted_history_loads_as_empty_and_is_cleared() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "not json {{{").unwrap();

        let store = HistoryStore::open(Box::new(JsonFilePersistence::new(path.clone())));
        assert!(store.list().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn persistence_write_failure_keeps_in_memory_state() {
        struct FailingWrites;
        impl HistoryPersistence for FailingWrites {
            fn load(&self) -> io::Result<Option<String>> {
                Ok(None)
            }
            fn persist(&self, _serialized: &str) -> io::Result<()> {
                Err(io::Error::new(io::ErrorKind::Other, "quota exceeded"))
            }
            fn clear(&self) -> io::Result<()> {
                Ok(())
            }
        }

        let store = HistoryStore::open(Box::new(FailingWrites));
        store.append(entry("kept"));
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = file_store(&dir);
        assert!(store.list().is_empty());
    }
}

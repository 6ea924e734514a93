//! Persisted "seen/unseen" accounting, independent of what is currently
//! loaded in memory.
//!
//! Two id namespaces (leads, events) are kept as in-memory sets backed by
//! an injected [`StateStore`]. The persisted layout is one JSON string
//! array per namespace. Corrupt or missing persisted data degrades to an
//! empty set — never an error — and every successful mark is persisted
//! immediately, so a crash between mark and navigation cannot lose it.

use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Namespaces
// ============================================================================

/// The two independent viewed-id namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Leads,
    Events,
}

impl Namespace {
    pub const ALL: [Namespace; 2] = [Namespace::Leads, Namespace::Events];

    /// Key under which this namespace is persisted.
    fn storage_key(self) -> &'static str {
        match self {
            Namespace::Leads => "viewed_leads",
            Namespace::Events => "viewed_events",
        }
    }
}

// ============================================================================
// Persistence Backend
// ============================================================================

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Key-value persistence contract for client-local state.
///
/// Injected into [`ViewedStateStore`] so production code uses
/// [`JsonFileStore`] while tests swap in [`MemoryStore`].
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StateStoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StateStoreError>;
    fn clear(&self, key: &str) -> Result<(), StateStoreError>;
}

/// File-backed store: one `<key>.json` file per entry under a directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Create the store, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StateStoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StateStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StateStoreError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StateStoreError> {
        // Write-then-rename so a crash mid-write cannot corrupt the entry
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, self.path_for(key))?;
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StateStoreError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StateStoreError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StateStoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StateStoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

// ============================================================================
// Viewed State
// ============================================================================

/// Viewed-id sets for both namespaces, loaded once at construction and
/// persisted on every new mark.
pub struct ViewedStateStore {
    store: Box<dyn StateStore>,
    leads: HashSet<String>,
    events: HashSet<String>,
}

impl ViewedStateStore {
    /// Load both namespaces from the backing store.
    ///
    /// Missing entries and malformed JSON both yield an empty set; the
    /// viewed badge degrading to "everything unread" beats refusing to
    /// start.
    pub fn load(store: Box<dyn StateStore>) -> Self {
        let mut this = Self {
            store,
            leads: HashSet::new(),
            events: HashSet::new(),
        };
        for ns in Namespace::ALL {
            let loaded = this.read_namespace(ns);
            *this.set_mut(ns) = loaded;
        }
        this
    }

    fn read_namespace(&self, ns: Namespace) -> HashSet<String> {
        let key = ns.storage_key();
        match self.store.get(key) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(ids) => ids.into_iter().collect(),
                Err(e) => {
                    tracing::warn!(key = key, error = %e, "Corrupt viewed-state entry, starting empty");
                    HashSet::new()
                }
            },
            Ok(None) => HashSet::new(),
            Err(e) => {
                tracing::warn!(key = key, error = %e, "Failed to read viewed-state entry, starting empty");
                HashSet::new()
            }
        }
    }

    fn set_for(&self, ns: Namespace) -> &HashSet<String> {
        match ns {
            Namespace::Leads => &self.leads,
            Namespace::Events => &self.events,
        }
    }

    fn set_mut(&mut self, ns: Namespace) -> &mut HashSet<String> {
        match ns {
            Namespace::Leads => &mut self.leads,
            Namespace::Events => &mut self.events,
        }
    }

    pub fn is_viewed(&self, ns: Namespace, id: &str) -> bool {
        self.set_for(ns).contains(id)
    }

    /// Mark an id as viewed. Idempotent; a new mark is persisted
    /// immediately. Storage failures keep the in-memory mark and log —
    /// the pipeline never crashes on viewed-state trouble.
    pub fn mark_viewed(&mut self, ns: Namespace, id: &str) {
        if !self.set_mut(ns).insert(id.to_string()) {
            return;
        }
        self.persist(ns);
    }

    /// Explicitly forget every viewed id in a namespace. The only way a
    /// viewed set ever shrinks.
    pub fn clear(&mut self, ns: Namespace) {
        self.set_mut(ns).clear();
        if let Err(e) = self.store.clear(ns.storage_key()) {
            tracing::warn!(key = ns.storage_key(), error = %e, "Failed to clear viewed-state entry");
        }
    }

    pub fn viewed_count(&self, ns: Namespace) -> usize {
        self.set_for(ns).len()
    }

    /// How many of the given (loaded) ids have been viewed. This is the
    /// intersection term of the unread-count arithmetic.
    pub fn viewed_within<'a>(
        &self,
        ns: Namespace,
        ids: impl IntoIterator<Item = &'a str>,
    ) -> usize {
        let set = self.set_for(ns);
        ids.into_iter().filter(|id| set.contains(*id)).count()
    }

    fn persist(&self, ns: Namespace) {
        let mut ids: Vec<&String> = self.set_for(ns).iter().collect();
        ids.sort(); // deterministic file contents
        let raw = match serde_json::to_string(&ids) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key = ns.storage_key(), error = %e, "Failed to serialize viewed-state entry");
                return;
            }
        };
        if let Err(e) = self.store.set(ns.storage_key(), &raw) {
            tracing::warn!(key = ns.storage_key(), error = %e, "Failed to persist viewed-state entry");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

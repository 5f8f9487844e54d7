//! Keyed registry of live project sessions, one lock per project.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::error::EngineResult;
use crate::project::ProjectState;

/// Shared handle to one project's live state.
pub type SessionHandle = Arc<Mutex<ProjectState>>;

struct SessionEntry {
    handle: SessionHandle,
    last_used: AtomicU64,
}

/// Lazily populated map from project name to session.
///
/// The map lock is only held to look up or insert handles; project work happens under
/// the per-project mutex. With a non-zero capacity, idle sessions (no outstanding
/// handle) are evicted least recently used first.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    capacity: usize,
    clock: AtomicU64,
}

impl SessionManager {
    /// `capacity == 0` keeps every session alive.
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            capacity,
            clock: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self, name: &str) -> Option<SessionHandle> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(name).map(|entry| {
            entry.last_used.store(self.tick(), Ordering::Relaxed);
            Arc::clone(&entry.handle)
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Number of sessions currently held in memory.
    pub fn live_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Return the live session, loading it with `load` on first access.
    ///
    /// `load` runs without the map lock held; if another caller inserts the same
    /// project first, its session wins and the freshly loaded state is dropped.
    pub fn get_or_load(
        &self,
        name: &str,
        load: impl FnOnce() -> EngineResult<ProjectState>,
    ) -> EngineResult<SessionHandle> {
        if let Some(handle) = self.get(name) {
            return Ok(handle);
        }
        let state = load()?;
        Ok(self.insert_if_absent(name, state))
    }

    /// Insert a session unless one is already live, returning whichever is registered.
    pub fn insert_if_absent(&self, name: &str, state: ProjectState) -> SessionHandle {
        self.insert(name, state).0
    }

    /// Register a brand new session; `None` when the name is already live.
    pub fn insert_new(&self, name: &str, state: ProjectState) -> Option<SessionHandle> {
        match self.insert(name, state) {
            (handle, true) => Some(handle),
            (_, false) => None,
        }
    }

    fn insert(&self, name: &str, state: ProjectState) -> (SessionHandle, bool) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let stamp = self.tick();
        let (handle, inserted) = match sessions.get(name) {
            Some(entry) => {
                entry.last_used.store(stamp, Ordering::Relaxed);
                (Arc::clone(&entry.handle), false)
            }
            None => {
                let handle = Arc::new(Mutex::new(state));
                sessions.insert(
                    name.to_string(),
                    SessionEntry {
                        handle: Arc::clone(&handle),
                        last_used: AtomicU64::new(stamp),
                    },
                );
                tracing::debug!(project = name, live = sessions.len(), "Opened session");
                (handle, true)
            }
        };
        self.evict_idle(&mut sessions, name);
        (handle, inserted)
    }

    pub fn remove(&self, name: &str) -> Option<SessionHandle> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .map(|entry| entry.handle)
    }

    fn evict_idle(&self, sessions: &mut HashMap<String, SessionEntry>, keep: &str) {
        if self.capacity == 0 {
            return;
        }
        while sessions.len() > self.capacity {
            let victim = sessions
                .iter()
                .filter(|(name, entry)| {
                    name.as_str() != keep && Arc::strong_count(&entry.handle) == 1
                })
                .min_by_key(|(_, entry)| entry.last_used.load(Ordering::Relaxed))
                .map(|(name, _)| name.clone());
            let Some(victim) = victim else {
                tracing::warn!(
                    live = sessions.len(),
                    capacity = self.capacity,
                    "All sessions busy, running over capacity"
                );
                return;
            };
            sessions.remove(&victim);
            tracing::debug!(project = %victim, "Evicted idle session");
        }
    }
}

/// Lock a session, recovering from a poisoned mutex.
///
/// Committed state lives in the store, so a panic mid-operation cannot leave it torn.
pub fn lock(handle: &SessionHandle) -> MutexGuard<'_, ProjectState> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

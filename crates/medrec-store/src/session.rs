//! Per-session working sets.
//!
//! A working set is a caller's scratch [`PatientSet`], kept apart from query
//! results. Each session owns one [`WorkingSet`] handle and passes it to the
//! engine's working-set operations; nothing is shared between sessions.

use std::collections::HashMap;
use std::sync::Arc;

use medrec_types::{PatientId, PatientSet};
use parking_lot::RwLock;

/// Key identifying a caller session.
pub type SessionId = String;

/// Handle to one session's working set.
///
/// Clones share the same underlying set. Reads take a snapshot; every
/// mutation happens under a single write lock, so concurrent readers see
/// the set either before or after it, never halfway.
#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    inner: Arc<RwLock<PatientSet>>,
}

impl WorkingSet {
    /// Creates an empty working set.
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the current contents.
    pub fn snapshot(&self) -> PatientSet {
        self.inner.read().clone()
    }

    /// Number of patients in the set.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Returns true if the patient is in the set.
    pub fn contains(&self, id: PatientId) -> bool {
        self.inner.read().contains(id)
    }

    pub(crate) fn replace(&self, set: PatientSet) {
        *self.inner.write() = set;
    }

    pub(crate) fn insert(&self, id: PatientId) -> bool {
        self.inner.write().insert(id)
    }

    pub(crate) fn remove(&self, id: PatientId) -> bool {
        self.inner.write().remove(id)
    }

    pub(crate) fn clear(&self) {
        *self.inner.write() = PatientSet::new();
    }
}

/// Registry of working sets keyed by session.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, WorkingSet>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the working set of a session, creating it on first use.
    pub fn open(&self, session: impl Into<SessionId>) -> WorkingSet {
        self.sessions
            .write()
            .entry(session.into())
            .or_default()
            .clone()
    }

    /// Returns the working set of an open session.
    pub fn get(&self, session: &str) -> Option<WorkingSet> {
        self.sessions.read().get(session).cloned()
    }

    /// Closes a session, dropping its working set. Returns false if it was
    /// not open.
    pub fn close(&self, session: &str) -> bool {
        self.sessions.write().remove(session).is_some()
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns true if no session is open.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

//! Read and commit observers

use framestate_core::{FrameId, StateId};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Called with the id of every state object read through a frame
pub type ReadObserver = Arc<dyn Fn(StateId) + Send + Sync>;

/// Called after a top-level commit with the modified state ids (first-write
/// order) and the id of the committed frame
pub type CommitObserver = Arc<dyn Fn(&[StateId], FrameId) + Send + Sync>;

#[derive(Default)]
pub(crate) struct ObserverList {
    next_key: AtomicU64,
    entries: RwLock<Vec<(u64, CommitObserver)>>,
}

impl ObserverList {
    pub(crate) fn register(self: &Arc<Self>, observer: CommitObserver) -> ObserverHandle {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        self.entries.write().push((key, observer));
        ObserverHandle {
            list: Arc::downgrade(self),
            key,
        }
    }

    fn unregister(&self, key: u64) {
        self.entries.write().retain(|(k, _)| *k != key);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Call every observer. The list lock is not held while observers run,
    /// so an observer may register or dispose observers.
    pub(crate) fn notify(&self, modified: &[StateId], frame: FrameId) {
        let observers: Vec<CommitObserver> =
            self.entries.read().iter().map(|(_, o)| Arc::clone(o)).collect();
        for observer in observers {
            observer(modified, frame);
        }
    }
}

/// Registration of a commit observer
///
/// The observer stays registered for as long as the handle lives.
#[must_use = "dropping the handle unregisters the observer"]
pub struct ObserverHandle {
    list: Weak<ObserverList>,
    key: u64,
}

impl ObserverHandle {
    /// Unregister the observer now
    pub fn dispose(self) {}
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        if let Some(list) = self.list.upgrade() {
            list.unregister(self.key);
        }
    }
}

impl std::fmt::Debug for ObserverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHandle").field("key", &self.key).finish()
    }
}

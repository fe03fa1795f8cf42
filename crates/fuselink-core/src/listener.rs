#![forbid(unsafe_code)]

//! Synchronous listener lists for hooks and owners.
//!
//! Listeners observe *that* something changed; they receive no value. They
//! fire in registration order after a commit, and the notification pass
//! operates on a snapshot: adding or removing a listener from inside a
//! callback has no effect on the pass that is currently running.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Identity of a registered listener, returned by [`ListenerSet::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub(crate) type ListenerFn = dyn Fn() + Send + Sync;

/// An ordered, id-keyed list of synchronous callbacks.
///
/// Hook-side sets live in the manager registry; owner-side sets are embedded
/// in the owner struct and exposed through
/// [`HookOwner::listeners`](crate::owner::HookOwner::listeners). Interior
/// mutability keeps both usable behind shared references.
pub struct ListenerSet {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: Vec<(ListenerId, Arc<ListenerFn>)>,
    next_id: u64,
}

impl ListenerSet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Register a callback; it fires on every subsequent commit affecting
    /// the carrier.
    pub fn add(&self, callback: impl Fn() + Send + Sync + 'static) -> ListenerId {
        let mut inner = self.inner.lock();
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner.entries.push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback by id. Returns whether it was present.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|(entry_id, _)| *entry_id != id);
        inner.entries.len() != before
    }

    /// Remove every callback, returning how many were removed.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let removed = inner.entries.len();
        inner.entries.clear();
        removed
    }

    /// Whether `id` is currently registered.
    #[must_use]
    pub fn contains(&self, id: ListenerId) -> bool {
        self.inner.lock().entries.iter().any(|(entry_id, _)| *entry_id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Callbacks in registration order, frozen for one notification pass.
    pub(crate) fn snapshot(&self) -> Vec<Arc<ListenerFn>> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect()
    }
}

impl Default for ListenerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn add_and_remove() {
        let set = ListenerSet::new();
        let id = set.add(|| {});
        assert_eq!(set.len(), 1);
        assert!(set.contains(id));

        assert!(set.remove(id));
        assert!(!set.contains(id));
        assert!(set.is_empty());

        // Removing again is a no-op.
        assert!(!set.remove(id));
    }

    #[test]
    fn clear_reports_count() {
        let set = ListenerSet::new();
        set.add(|| {});
        set.add(|| {});
        set.add(|| {});
        assert_eq!(set.clear(), 3);
        assert!(set.is_empty());
    }

    #[test]
    fn snapshot_preserves_registration_order() {
        let set = ListenerSet::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..4 {
            let order = Arc::clone(&order);
            set.add(move || order.lock().push(i));
        }
        for callback in set.snapshot() {
            callback();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn snapshot_is_frozen_against_mutation() {
        let set = Arc::new(ListenerSet::new());
        let fired = Arc::new(AtomicUsize::new(0));

        let fired_a = Arc::clone(&fired);
        set.add(move || {
            fired_a.fetch_add(1, Ordering::SeqCst);
        });

        let snapshot = set.snapshot();
        set.clear();
        for callback in &snapshot {
            callback();
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ids_are_unique_across_removal() {
        let set = ListenerSet::new();
        let a = set.add(|| {});
        set.remove(a);
        let b = set.add(|| {});
        assert_ne!(a, b);
    }
}

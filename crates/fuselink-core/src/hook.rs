#![forbid(unsafe_code)]

//! Hooks: the handles users read, write, link, and isolate.
//!
//! A hook has a stable identity and points at exactly one nexus for as long
//! as it is alive. Writes go through [`Hook::submit`] into the manager
//! pipeline; topology changes go through [`Hook::link`] (fusion) and
//! [`Hook::isolate`]. A hook optionally carries an isolated validator, a
//! reaction, and a weak back-reference to an owner.
//!
//! Two handle flavors exist over one underlying record:
//!
//! - [`Hook<T>`] — typed; downcasts at the boundary, so reads return `T` and
//!   `link` is only offered between same-typed hooks.
//! - [`AnyHook`] — erased; what owners enumerate and batches carry.
//!
//! Handles are cheap clones of the same identity. A hook dies only through
//! explicit [`release`](Hook::release); operations on a released hook return
//! [`SubmitError::DeadHook`].
//!
//! # Invariants
//!
//! 1. `hook.is_linked_to(other)` ⇔ both report the same [`NexusId`].
//! 2. A hook's validator and reaction contributions follow it through
//!    fusion and isolation.
//! 3. Destroying an owner never invalidates its hooks; they keep working as
//!    plain hooks.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::error::{Result, SubmitError};
use crate::listener::{ListenerId, ListenerSet};
use crate::manager::{NexusManager, SubmitBatch, SubmitOptions};
use crate::nexus::NexusId;
use crate::owner::{HookOwner, Key};
use crate::publish::PublisherSink;
use crate::value::{arc_value, ArcValue, Value};

static NEXT_HOOK_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a hook, independent of the nexus it points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HookId(u64);

impl HookId {
    pub(crate) fn next() -> Self {
        Self(NEXT_HOOK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hook#{}", self.0)
    }
}

/// Which of the two pre-fusion values becomes the fused shared value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// Keep the calling hook's value (`use_caller_value`).
    UseSelf,
    /// Adopt the target hook's value (`use_target_value`).
    UseOther,
}

pub(crate) type ValidatorFn =
    dyn Fn(&dyn Value) -> std::result::Result<(), String> + Send + Sync;
pub(crate) type ReactionFn = dyn Fn(&dyn Value, &dyn Value) + Send + Sync;

/// Weak owner back-reference plus the key the owner exposes this hook under.
pub(crate) struct OwnerSlot {
    pub owner: Weak<dyn HookOwner>,
    pub key: Key,
}

/// Per-hook record stored in the manager registry.
pub(crate) struct HookState {
    pub nexus: NexusId,
    pub validator: Option<Arc<ValidatorFn>>,
    pub reaction: Option<Arc<ReactionFn>>,
    pub owner: Option<OwnerSlot>,
    pub listeners: ListenerSet,
    pub sinks: Vec<Arc<dyn PublisherSink>>,
}

// ---------------------------------------------------------------------------
// AnyHook — erased handle
// ---------------------------------------------------------------------------

/// Type-erased hook handle.
///
/// This is the currency of the owner contract and of heterogeneous batches.
/// Reads yield [`ArcValue`]; use [`typed`](AnyHook::typed) to recover a
/// [`Hook<T>`].
#[derive(Clone)]
pub struct AnyHook {
    pub(crate) manager: NexusManager,
    pub(crate) id: HookId,
}

impl AnyHook {
    #[must_use]
    pub fn id(&self) -> HookId {
        self.id
    }

    #[must_use]
    pub fn manager(&self) -> &NexusManager {
        &self.manager
    }

    /// Whether the hook has not been released.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.manager.hook_is_alive(self.id)
    }

    /// The committed value, shared.
    pub fn read(&self) -> Result<ArcValue> {
        self.manager.read_value(self.id)
    }

    /// An independent clone of the committed value.
    pub fn snapshot(&self) -> Result<ArcValue> {
        Ok(self.read()?.dyn_clone())
    }

    /// The value displaced by the most recent commit on this hook's nexus,
    /// if any commit has occurred.
    pub fn previous(&self) -> Result<Option<ArcValue>> {
        self.manager.previous_value(self.id)
    }

    /// Submit a single erased value through the pipeline.
    pub fn submit(&self, value: ArcValue) -> Result<()> {
        self.submit_with(value, SubmitOptions::default())
    }

    /// [`submit`](Self::submit) with explicit options.
    pub fn submit_with(&self, value: ArcValue, options: SubmitOptions) -> Result<()> {
        let mut batch = SubmitBatch::new();
        batch.insert_erased(self, value);
        self.manager.submit_with(batch, options)
    }

    /// Validate a candidate without committing it.
    pub fn check(&self, value: ArcValue) -> Result<()> {
        let mut batch = SubmitBatch::new();
        batch.insert_erased(self, value);
        self.manager.check(batch)
    }

    /// Fuse this hook's nexus with `other`'s. No-op when already fused.
    pub fn link(&self, other: &AnyHook, mode: LinkMode) -> Result<()> {
        self.manager
            .fuse_pairs(vec![(self.clone(), other.clone())], mode)
    }

    /// Atomically fuse this hook with every target. All fusions succeed or
    /// none do.
    pub fn link_many<I>(&self, others: I, mode: LinkMode) -> Result<()>
    where
        I: IntoIterator<Item = AnyHook>,
    {
        let pairs: Vec<_> = others
            .into_iter()
            .map(|other| (self.clone(), other))
            .collect();
        if pairs.is_empty() {
            return Ok(());
        }
        self.manager.fuse_pairs(pairs, mode)
    }

    /// Detach into a fresh nexus holding a clone of the current value. The
    /// remaining members of the old nexus stay fused. Isolating an
    /// already-solitary hook is a no-op.
    pub fn isolate(&self) -> Result<()> {
        self.manager.isolate(self.id)
    }

    /// Whether both hooks currently share a nexus. Hooks of different
    /// managers are never linked.
    pub fn is_linked_to(&self, other: &AnyHook) -> Result<bool> {
        if !self.manager.same_as(&other.manager) {
            return Ok(false);
        }
        Ok(self.nexus_id()? == other.nexus_id()?)
    }

    /// Opaque nexus identity; equal iff the hooks are fused.
    pub fn nexus_id(&self) -> Result<NexusId> {
        self.manager.nexus_id_of(self.id)
    }

    /// The key this hook is exposed under by its owner, if owned.
    pub fn owner_key(&self) -> Result<Option<Key>> {
        self.manager.owner_key_of(self.id)
    }

    pub fn add_listener(&self, callback: impl Fn() + Send + Sync + 'static) -> Result<ListenerId> {
        self.manager
            .with_listeners(self.id, |listeners| listeners.add(callback))
    }

    pub fn remove_listener(&self, id: ListenerId) -> Result<bool> {
        self.manager
            .with_listeners(self.id, |listeners| listeners.remove(id))
    }

    pub fn clear_listeners(&self) -> Result<usize> {
        self.manager.with_listeners(self.id, ListenerSet::clear)
    }

    pub fn listener_count(&self) -> Result<usize> {
        self.manager.with_listeners(self.id, ListenerSet::len)
    }

    /// Attach a publication sink; it is enqueued on every commit affecting
    /// this hook's nexus.
    pub fn add_sink(&self, sink: Arc<dyn PublisherSink>) -> Result<()> {
        self.manager.add_sink(self.id, sink)
    }

    /// Recover a typed handle. Fails with `TypeMismatch` when the stored
    /// value is not a `T`.
    pub fn typed<T: Value + Clone>(&self) -> Result<Hook<T>> {
        let current = self.read()?;
        if !current.is::<T>() {
            return Err(SubmitError::TypeMismatch {
                stored: current.type_name(),
                candidate: std::any::type_name::<T>(),
            });
        }
        Ok(Hook {
            raw: self.clone(),
            _marker: PhantomData,
        })
    }

    /// End this hook's life: withdraw it from its nexus (destroying the
    /// nexus if it empties) and invalidate the handle.
    pub fn release(self) -> Result<()> {
        self.manager.release(self.id)
    }
}

impl fmt::Debug for AnyHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyHook").field("id", &self.id).finish()
    }
}

// ---------------------------------------------------------------------------
// Hook<T> — typed handle
// ---------------------------------------------------------------------------

/// Typed hook handle over a `T` payload.
pub struct Hook<T> {
    raw: AnyHook,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Hook<T> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Value + Clone> Hook<T> {
    /// A plain hook holding `value` in a fresh nexus.
    pub fn new(manager: &NexusManager, value: T) -> Self {
        Self::build(manager, value).finish()
    }

    /// A hook with an isolated validator.
    pub fn with_validator(
        manager: &NexusManager,
        value: T,
        validator: impl Fn(&T) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self::build(manager, value).validator(validator).finish()
    }

    /// A hook with a reaction called as `(current, previous)` after every
    /// commit that changes its nexus.
    pub fn with_reaction(
        manager: &NexusManager,
        value: T,
        reaction: impl Fn(&T, &T) + Send + Sync + 'static,
    ) -> Self {
        Self::build(manager, value).reaction(reaction).finish()
    }

    /// A hook owned by `owner` under `key`.
    pub fn owned(
        manager: &NexusManager,
        value: T,
        owner: Weak<dyn HookOwner>,
        key: impl Into<Key>,
    ) -> Self {
        Self::build(manager, value).owner(owner, key).finish()
    }

    /// Start a builder for arbitrary validator/reaction/owner combinations.
    pub fn build(manager: &NexusManager, value: T) -> HookBuilder<T> {
        HookBuilder {
            manager: manager.clone(),
            value,
            validator: None,
            reaction: None,
            owner: None,
        }
    }

    /// Clone the current value out.
    pub fn get(&self) -> Result<T> {
        self.with(T::clone)
    }

    /// Borrow the current value without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let current = self.raw.read()?;
        match current.downcast_ref::<T>() {
            Some(value) => Ok(f(value)),
            None => Err(type_mismatch::<T>(&current)),
        }
    }

    /// The value displaced by the most recent commit, if any.
    pub fn previous(&self) -> Result<Option<T>> {
        match self.raw.previous()? {
            Some(previous) => match previous.downcast_ref::<T>() {
                Some(value) => Ok(Some(value.clone())),
                None => Err(type_mismatch::<T>(&previous)),
            },
            None => Ok(None),
        }
    }

    /// Submit a new value through the pipeline.
    pub fn submit(&self, value: T) -> Result<()> {
        self.raw.submit(arc_value(value))
    }

    /// [`submit`](Self::submit) with explicit options (e.g. `force` to
    /// bypass the equality short-circuit).
    pub fn submit_with(&self, value: T, options: SubmitOptions) -> Result<()> {
        self.raw.submit_with(arc_value(value), options)
    }

    /// Validate a candidate without committing it.
    pub fn check(&self, value: T) -> Result<()> {
        self.raw.check(arc_value(value))
    }

    /// Fuse with another hook of the same payload type.
    pub fn link(&self, other: &Hook<T>, mode: LinkMode) -> Result<()> {
        self.raw.link(&other.raw, mode)
    }

    /// Atomically fuse with every target; all succeed or none do.
    pub fn link_many<'a, I>(&self, others: I, mode: LinkMode) -> Result<()>
    where
        T: 'a,
        I: IntoIterator<Item = &'a Hook<T>>,
    {
        self.raw
            .link_many(others.into_iter().map(|other| other.raw.clone()), mode)
    }

    pub fn isolate(&self) -> Result<()> {
        self.raw.isolate()
    }

    pub fn is_linked_to(&self, other: &Hook<T>) -> Result<bool> {
        self.raw.is_linked_to(&other.raw)
    }

    pub fn nexus_id(&self) -> Result<NexusId> {
        self.raw.nexus_id()
    }

    pub fn add_listener(&self, callback: impl Fn() + Send + Sync + 'static) -> Result<ListenerId> {
        self.raw.add_listener(callback)
    }

    pub fn remove_listener(&self, id: ListenerId) -> Result<bool> {
        self.raw.remove_listener(id)
    }

    pub fn clear_listeners(&self) -> Result<usize> {
        self.raw.clear_listeners()
    }

    pub fn listener_count(&self) -> Result<usize> {
        self.raw.listener_count()
    }

    pub fn add_sink(&self, sink: Arc<dyn PublisherSink>) -> Result<()> {
        self.raw.add_sink(sink)
    }

    #[must_use]
    pub fn id(&self) -> HookId {
        self.raw.id
    }

    #[must_use]
    pub fn manager(&self) -> &NexusManager {
        &self.raw.manager
    }

    /// The erased handle for owner plumbing and heterogeneous batches.
    #[must_use]
    pub fn erase(&self) -> AnyHook {
        self.raw.clone()
    }

    pub fn release(self) -> Result<()> {
        self.raw.release()
    }
}

impl<T: Value + Clone + fmt::Debug> fmt::Debug for Hook<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("id", &self.raw.id)
            .field("value", &self.get().ok())
            .finish()
    }
}

fn type_mismatch<T: Value>(stored: &ArcValue) -> SubmitError {
    SubmitError::TypeMismatch {
        stored: stored.type_name(),
        candidate: std::any::type_name::<T>(),
    }
}

// ---------------------------------------------------------------------------
// HookBuilder
// ---------------------------------------------------------------------------

/// Builder for hooks carrying any combination of validator, reaction, and
/// owner.
pub struct HookBuilder<T> {
    manager: NexusManager,
    value: T,
    validator: Option<Arc<ValidatorFn>>,
    reaction: Option<Arc<ReactionFn>>,
    owner: Option<OwnerSlot>,
}

impl<T: Value + Clone> HookBuilder<T> {
    /// Attach an isolated validator, run against every candidate before any
    /// cross-hook validation.
    #[must_use]
    pub fn validator(
        mut self,
        validator: impl Fn(&T) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(move |candidate: &dyn Value| {
            match candidate.downcast_ref::<T>() {
                Some(candidate) => validator(candidate),
                None => Err(format!(
                    "candidate is not a {}",
                    std::any::type_name::<T>()
                )),
            }
        }));
        self
    }

    /// Attach a reaction called as `(current, previous)` after every commit
    /// that changes this hook's nexus.
    #[must_use]
    pub fn reaction(mut self, reaction: impl Fn(&T, &T) + Send + Sync + 'static) -> Self {
        self.reaction = Some(Arc::new(move |current: &dyn Value, previous: &dyn Value| {
            if let (Some(current), Some(previous)) =
                (current.downcast_ref::<T>(), previous.downcast_ref::<T>())
            {
                reaction(current, previous);
            }
        }));
        self
    }

    /// Attach a weak owner back-reference and the key the owner exposes
    /// this hook under.
    #[must_use]
    pub fn owner(mut self, owner: Weak<dyn HookOwner>, key: impl Into<Key>) -> Self {
        self.owner = Some(OwnerSlot {
            owner,
            key: key.into(),
        });
        self
    }

    pub fn finish(self) -> Hook<T> {
        let raw = self.manager.register_hook(
            arc_value(self.value),
            self.validator,
            self.reaction,
            self.owner,
        );
        Hook {
            raw,
            _marker: PhantomData,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::NexusManager;

    #[test]
    fn fresh_hook_reads_initial_value() {
        let manager = NexusManager::new();
        let hook = Hook::new(&manager, 42_i64);
        assert_eq!(hook.get().unwrap(), 42);
        assert_eq!(hook.with(|v| v * 2).unwrap(), 84);
        assert_eq!(hook.previous().unwrap(), None);
    }

    #[test]
    fn submit_replaces_and_tracks_previous() {
        let manager = NexusManager::new();
        let hook = Hook::new(&manager, String::from("a"));
        hook.submit(String::from("b")).unwrap();
        assert_eq!(hook.get().unwrap(), "b");
        assert_eq!(hook.previous().unwrap().as_deref(), Some("a"));
    }

    #[test]
    fn link_self_pair_is_noop() {
        let manager = NexusManager::new();
        let a = Hook::new(&manager, 1_i64);
        let b = a.clone();
        a.link(&b, LinkMode::UseSelf).unwrap();
        assert!(a.is_linked_to(&b).unwrap());
    }

    #[test]
    fn typed_roundtrip_through_erased() {
        let manager = NexusManager::new();
        let hook = Hook::new(&manager, 7_u32);
        let erased = hook.erase();
        let typed = erased.typed::<u32>().unwrap();
        assert_eq!(typed.get().unwrap(), 7);

        let wrong = erased.typed::<String>();
        assert!(matches!(wrong, Err(SubmitError::TypeMismatch { .. })));
    }

    #[test]
    fn released_hook_is_dead() {
        let manager = NexusManager::new();
        let hook = Hook::new(&manager, 1_i64);
        let stale = hook.clone();
        assert!(stale.erase().is_alive());

        hook.release().unwrap();
        assert!(!stale.erase().is_alive());
        assert!(matches!(stale.get(), Err(SubmitError::DeadHook { .. })));
        assert!(matches!(
            stale.submit(2),
            Err(SubmitError::DeadHook { .. })
        ));
    }

    #[test]
    fn owner_key_of_plain_hook_is_none() {
        let manager = NexusManager::new();
        let hook = Hook::new(&manager, 1_i64);
        assert_eq!(hook.erase().owner_key().unwrap(), None);
    }

    #[test]
    fn ids_display_compactly() {
        let id = HookId::next();
        assert!(format!("{id}").starts_with("hook#"));
    }
}

#![forbid(unsafe_code)]

//! The nexus manager: one lock, one registry, one six-phase write path.
//!
//! Every mutation of the nexus graph — submissions, fusions, isolations,
//! hook registration and release — is serialized by a single reentrant lock
//! per manager. Submissions run six phases in strict order:
//!
//! 1. **Equality short-circuit** — candidates equal to the current value are
//!    dropped (unless `force`); an emptied working set returns success.
//! 2. **Owner completion** — each distinct owner with an affected hook may
//!    extend the submission with derived values for its other hooks, once.
//! 3. **Affected-set collection** — candidates are grouped per nexus;
//!    conflicting candidates for one nexus fail the submission.
//! 4. **Validation** — isolated validators of every member hook, then each
//!    affected owner's cross-hook validator over a tentative snapshot. No
//!    mutation.
//! 5. **Commit** — each affected nexus swaps in its candidate; the displaced
//!    value becomes `previous`.
//! 6. **Notification** — owner reactions, hook reactions, publisher
//!    enqueues, then listeners (owners before hooks). Callback misbehavior
//!    is logged and swallowed; listeners cannot veto a commit.
//!
//! # Invariants
//!
//! 1. Any failure in phases 1–4 leaves every nexus byte-identical to its
//!    pre-call state and fires no callback.
//! 2. Submissions are totally ordered per manager (`seq` increases by one
//!    per commit).
//! 3. The lock is reentrant: callbacks may read hooks mid-pipeline. A
//!    nested submission or fusion from a callback is rejected with
//!    [`SubmitError::NestedSubmission`].
//! 4. Independent managers never cross-talk; batches and fusions mixing
//!    managers fail with `ManagerMismatch`.
//!
//! # Failure Modes
//!
//! - **Stuck validator**: a validator that blocks stalls every writer on
//!   this manager. The core ships no watchdog; validators must be fast and
//!   pure.
//! - **Callback topology churn**: listeners may isolate or release hooks
//!   mid-notification. The pass runs on snapshots, so the change applies to
//!   subsequent submissions.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::{Arc, OnceLock};

use ahash::AHashMap;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use tracing::{debug, warn};

use crate::error::{Result, SubmitError};
use crate::hook::{AnyHook, Hook, HookId, HookState, LinkMode, OwnerSlot, ReactionFn, ValidatorFn};
use crate::listener::{ListenerFn, ListenerSet};
use crate::nexus::{Nexus, NexusId};
use crate::owner::{HookOwner, Key, KeyValues};
use crate::publish::{PublicationEvent, PublisherSink};
use crate::value::{arc_value, ArcValue, Value};

// ---------------------------------------------------------------------------
// Batches and options
// ---------------------------------------------------------------------------

/// Flags controlling one submission.
#[derive(Debug, Clone, Copy)]
pub struct SubmitOptions {
    /// Bypass the phase-1 equality short-circuit.
    pub force: bool,
    /// Run owner completion (phase 2). On by default.
    pub owner_completion: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            force: false,
            owner_completion: true,
        }
    }
}

impl SubmitOptions {
    /// Options with the equality short-circuit bypassed.
    #[must_use]
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }
}

/// A set of `(hook, candidate)` pairs submitted atomically.
#[derive(Default)]
pub struct SubmitBatch {
    pub(crate) entries: Vec<(AnyHook, ArcValue)>,
}

impl SubmitBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a typed pair, chainable.
    #[must_use]
    pub fn with<T: Value + Clone>(mut self, hook: &Hook<T>, value: T) -> Self {
        self.insert(hook, value);
        self
    }

    /// Add a typed pair.
    pub fn insert<T: Value + Clone>(&mut self, hook: &Hook<T>, value: T) {
        self.entries.push((hook.erase(), arc_value(value)));
    }

    /// Add an erased pair.
    pub fn insert_erased(&mut self, hook: &AnyHook, value: ArcValue) {
        self.entries.push((hook.clone(), value));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for SubmitBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitBatch")
            .field("len", &self.entries.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Coordinator owning the write lock and the hook/nexus registry.
///
/// Cheap to clone (shared interior). Multiple managers coexist without
/// cross-talk; a process-default instance is available via
/// [`NexusManager::global`].
#[derive(Clone)]
pub struct NexusManager {
    shared: Arc<ManagerShared>,
}

struct ManagerShared {
    registry: ReentrantMutex<RefCell<Registry>>,
}

type RegistryGuard<'a> = ReentrantMutexGuard<'a, RefCell<Registry>>;

#[derive(Default)]
struct Registry {
    hooks: AHashMap<HookId, HookState>,
    nexuses: AHashMap<NexusId, Nexus>,
    in_submission: bool,
    seq: u64,
}

impl Registry {
    fn hook(&self, id: HookId) -> Result<&HookState> {
        self.hooks.get(&id).ok_or(SubmitError::DeadHook { hook: id })
    }

    fn nexus(&self, id: NexusId) -> &Nexus {
        self.nexuses
            .get(&id)
            .expect("hook records only point at live nexuses")
    }
}

/// One affected owner, captured for phases 4 and 6.
struct AffectedOwner {
    owner: Arc<dyn HookOwner>,
    label: String,
    affected_keys: BTreeSet<Key>,
    snapshot: KeyValues,
}

/// Marks the pipeline as active for the duration of one submission or
/// fusion, so re-entry from a callback is detectable. Resets on drop, even
/// when a callback panics through the pipeline.
struct SubmissionFlag<'a, 'b> {
    guard: &'a RegistryGuard<'b>,
}

impl<'a, 'b> SubmissionFlag<'a, 'b> {
    fn acquire(guard: &'a RegistryGuard<'b>) -> Result<Self> {
        let mut registry = guard.borrow_mut();
        if registry.in_submission {
            warn!("rejected nested submission from a notification callback");
            return Err(SubmitError::NestedSubmission);
        }
        registry.in_submission = true;
        drop(registry);
        Ok(Self { guard })
    }
}

impl Drop for SubmissionFlag<'_, '_> {
    fn drop(&mut self) {
        self.guard.borrow_mut().in_submission = false;
    }
}

static GLOBAL_MANAGER: OnceLock<NexusManager> = OnceLock::new();

impl NexusManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(ManagerShared {
                registry: ReentrantMutex::new(RefCell::new(Registry::default())),
            }),
        }
    }

    /// The lazily-created process-default manager.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL_MANAGER.get_or_init(Self::new).clone()
    }

    /// Whether both handles coordinate the same synchronization domain.
    #[must_use]
    pub fn same_as(&self, other: &NexusManager) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Number of live hooks.
    #[must_use]
    pub fn hook_count(&self) -> usize {
        let guard = self.shared.registry.lock();
        let count = guard.borrow().hooks.len();
        count
    }

    /// Number of live nexuses.
    #[must_use]
    pub fn nexus_count(&self) -> usize {
        let guard = self.shared.registry.lock();
        let count = guard.borrow().nexuses.len();
        count
    }

    /// Submit a batch atomically through the six-phase pipeline.
    pub fn submit(&self, batch: SubmitBatch) -> Result<()> {
        self.submit_with(batch, SubmitOptions::default())
    }

    /// [`submit`](Self::submit) with explicit options.
    pub fn submit_with(&self, batch: SubmitBatch, options: SubmitOptions) -> Result<()> {
        self.run(batch, options, true)
    }

    /// Run phases 1–4 only: report the verdict a submission would get,
    /// with zero side effects and no notifications.
    pub fn check(&self, batch: SubmitBatch) -> Result<()> {
        self.run(batch, SubmitOptions::default(), false)
    }

    // -----------------------------------------------------------------------
    // Submission pipeline
    // -----------------------------------------------------------------------

    fn run(&self, batch: SubmitBatch, options: SubmitOptions, commit: bool) -> Result<()> {
        for (hook, _) in &batch.entries {
            if !self.same_as(hook.manager()) {
                return Err(SubmitError::ManagerMismatch);
            }
        }
        let guard = self.shared.registry.lock();
        let _flag = SubmissionFlag::acquire(&guard)?;
        self.run_locked(&guard, &batch, options, commit)
    }

    fn run_locked(
        &self,
        guard: &RegistryGuard<'_>,
        batch: &SubmitBatch,
        options: SubmitOptions,
        commit: bool,
    ) -> Result<()> {
        let candidates = self.collect_candidates(guard, batch, options)?;
        if candidates.is_empty() {
            debug!("submission short-circuited: no effective changes");
            return Ok(());
        }
        self.pipeline(guard, candidates, options, commit)
    }

    /// Phase 1: type-check, equality-drop, and group candidates per nexus.
    fn collect_candidates(
        &self,
        guard: &RegistryGuard<'_>,
        batch: &SubmitBatch,
        options: SubmitOptions,
    ) -> Result<BTreeMap<NexusId, ArcValue>> {
        let registry = guard.borrow();
        let mut candidates = BTreeMap::new();
        for (hook, value) in &batch.entries {
            let state = registry.hook(hook.id())?;
            let nexus = registry.nexus(state.nexus);
            check_payload_type(nexus.current(), value)?;
            if !options.force && value.dyn_eq(nexus.current().as_ref()) {
                continue;
            }
            insert_candidate(&mut candidates, state.nexus, value.clone())?;
        }
        Ok(candidates)
    }

    /// Phases 2–6 over an already-grouped candidate map. Shared by
    /// submissions and fusions.
    fn pipeline(
        &self,
        guard: &RegistryGuard<'_>,
        mut candidates: BTreeMap<NexusId, ArcValue>,
        options: SubmitOptions,
        commit: bool,
    ) -> Result<()> {
        if options.owner_completion {
            self.complete_owners(guard, &mut candidates, options)?;
        }
        if candidates.is_empty() {
            return Ok(());
        }

        let validations = self.collect_isolated_validations(guard, &candidates);
        let affected_owners = self.collect_affected_owners(guard, &candidates);
        debug!(
            affected_nexuses = candidates.len(),
            affected_owners = affected_owners.len(),
            "validating working set"
        );

        for (hook, validator, candidate) in &validations {
            validator(candidate.as_ref()).map_err(|message| SubmitError::IsolatedValidation {
                hook: *hook,
                message,
            })?;
        }
        for affected in &affected_owners {
            affected
                .owner
                .validate(&affected.snapshot)
                .map_err(|message| SubmitError::OwnerValidation {
                    owner: affected.label.clone(),
                    message,
                })?;
        }
        if !commit {
            return Ok(());
        }

        let seq = {
            let mut registry = guard.borrow_mut();
            for (nexus_id, candidate) in &candidates {
                if let Some(nexus) = registry.nexuses.get_mut(nexus_id) {
                    nexus.replace_value(candidate.clone());
                }
            }
            registry.seq += 1;
            registry.seq
        };
        debug!(seq, committed = candidates.len(), "committed submission");

        self.notify(guard, &candidates, &affected_owners, seq);
        Ok(())
    }

    /// Phase 2: consult each distinct affected owner exactly once for
    /// derived values. Owners discovered through completion-added nexuses
    /// join the queue.
    fn complete_owners(
        &self,
        guard: &RegistryGuard<'_>,
        candidates: &mut BTreeMap<NexusId, ArcValue>,
        options: SubmitOptions,
    ) -> Result<()> {
        let mut seen = Vec::new();
        let mut queue = VecDeque::new();
        {
            let registry = guard.borrow();
            for nexus_id in candidates.keys() {
                discover_owners(&registry, *nexus_id, &mut seen, &mut queue);
            }
        }

        while let Some(owner) = queue.pop_front() {
            let hooks = owner.hooks();
            let submitted: KeyValues = {
                let registry = guard.borrow();
                hooks
                    .iter()
                    .filter_map(|(key, hook)| {
                        let state = registry.hooks.get(&hook.id())?;
                        candidates
                            .get(&state.nexus)
                            .map(|candidate| (key.clone(), candidate.clone()))
                    })
                    .collect()
            };
            if submitted.is_empty() {
                continue;
            }
            let extras =
                owner
                    .complete(&submitted)
                    .map_err(|message| SubmitError::CompletionFailure {
                        owner: owner.label().to_string(),
                        message,
                    })?;
            for (key, value) in extras {
                let Some((_, hook)) = hooks.iter().find(|(hook_key, _)| *hook_key == key) else {
                    return Err(SubmitError::UnknownKey { key });
                };
                let newly_affected = {
                    let registry = guard.borrow();
                    let state = registry.hook(hook.id())?;
                    let nexus = registry.nexus(state.nexus);
                    check_payload_type(nexus.current(), &value)?;
                    if !options.force && value.dyn_eq(nexus.current().as_ref()) {
                        None
                    } else if let Some(existing) = candidates.get(&state.nexus) {
                        if !existing.dyn_eq(value.as_ref()) {
                            return Err(SubmitError::ValueConflict {
                                nexus: state.nexus,
                                message: format!(
                                    "completion proposed {value:?} but {existing:?} was already collected"
                                ),
                            });
                        }
                        None
                    } else {
                        Some(state.nexus)
                    }
                };
                if let Some(nexus_id) = newly_affected {
                    candidates.insert(nexus_id, value);
                    let registry = guard.borrow();
                    discover_owners(&registry, nexus_id, &mut seen, &mut queue);
                }
            }
        }
        Ok(())
    }

    /// Phase 3 (hook side): every member-contributed isolated validator of
    /// every affected nexus, paired with that nexus's candidate.
    fn collect_isolated_validations(
        &self,
        guard: &RegistryGuard<'_>,
        candidates: &BTreeMap<NexusId, ArcValue>,
    ) -> Vec<(HookId, Arc<ValidatorFn>, ArcValue)> {
        let registry = guard.borrow();
        let mut validations = Vec::new();
        for (nexus_id, candidate) in candidates {
            let Some(nexus) = registry.nexuses.get(nexus_id) else {
                continue;
            };
            for hook_id in nexus.validator_members() {
                let Some(state) = registry.hooks.get(hook_id) else {
                    continue;
                };
                if let Some(validator) = &state.validator {
                    validations.push((*hook_id, Arc::clone(validator), candidate.clone()));
                }
            }
        }
        validations
    }

    /// Phase 3 (owner side): every live owner with a member hook in an
    /// affected nexus, deduplicated, in first-encounter order, with its
    /// tentative full snapshot and affected key set.
    fn collect_affected_owners(
        &self,
        guard: &RegistryGuard<'_>,
        candidates: &BTreeMap<NexusId, ArcValue>,
    ) -> Vec<AffectedOwner> {
        let owners: Vec<Arc<dyn HookOwner>> = {
            let registry = guard.borrow();
            let mut seen = Vec::new();
            let mut owners = Vec::new();
            for nexus_id in candidates.keys() {
                let Some(nexus) = registry.nexuses.get(nexus_id) else {
                    continue;
                };
                for hook_id in nexus.members() {
                    let Some(state) = registry.hooks.get(hook_id) else {
                        continue;
                    };
                    let Some(slot) = &state.owner else {
                        continue;
                    };
                    if let Some(owner) = slot.owner.upgrade() {
                        let ptr = owner_ptr(&owner);
                        if !seen.contains(&ptr) {
                            seen.push(ptr);
                            owners.push(owner);
                        }
                    }
                }
            }
            owners
        };

        let mut affected = Vec::with_capacity(owners.len());
        for owner in owners {
            let hooks = owner.hooks();
            let (snapshot, affected_keys) = {
                let registry = guard.borrow();
                let mut snapshot = KeyValues::new();
                let mut keys = BTreeSet::new();
                for (key, hook) in &hooks {
                    let Some(state) = registry.hooks.get(&hook.id()) else {
                        continue;
                    };
                    if let Some(candidate) = candidates.get(&state.nexus) {
                        keys.insert(key.clone());
                        snapshot.insert(key.clone(), candidate.clone());
                    } else if let Some(nexus) = registry.nexuses.get(&state.nexus) {
                        snapshot.insert(key.clone(), nexus.current().clone());
                    }
                }
                (snapshot, keys)
            };
            if affected_keys.is_empty() {
                continue;
            }
            affected.push(AffectedOwner {
                label: owner.label().to_string(),
                owner,
                affected_keys,
                snapshot,
            });
        }
        affected
    }

    /// Phase 6. All listener lists are snapshotted before the first
    /// callback fires, so mid-notification mutation applies to the next
    /// submission only.
    fn notify(
        &self,
        guard: &RegistryGuard<'_>,
        candidates: &BTreeMap<NexusId, ArcValue>,
        affected_owners: &[AffectedOwner],
        seq: u64,
    ) {
        let mut reactions: Vec<(Arc<ReactionFn>, ArcValue, ArcValue)> = Vec::new();
        let mut hook_events: Vec<(Arc<dyn PublisherSink>, PublicationEvent)> = Vec::new();
        let mut hook_listeners: Vec<Vec<Arc<ListenerFn>>> = Vec::new();
        {
            let registry = guard.borrow();
            for nexus_id in candidates.keys() {
                let Some(nexus) = registry.nexuses.get(nexus_id) else {
                    continue;
                };
                let current = nexus.current().clone();
                let previous = nexus.previous().cloned();
                for hook_id in nexus.reaction_members() {
                    let Some(state) = registry.hooks.get(hook_id) else {
                        continue;
                    };
                    if let (Some(reaction), Some(previous)) = (&state.reaction, &previous) {
                        reactions.push((Arc::clone(reaction), current.clone(), previous.clone()));
                    }
                }
                for hook_id in nexus.members() {
                    let Some(state) = registry.hooks.get(hook_id) else {
                        continue;
                    };
                    for sink in &state.sinks {
                        hook_events.push((
                            Arc::clone(sink),
                            PublicationEvent::HookChanged {
                                seq,
                                hook: *hook_id,
                                nexus: *nexus_id,
                            },
                        ));
                    }
                    if !state.listeners.is_empty() {
                        hook_listeners.push(state.listeners.snapshot());
                    }
                }
            }
        }

        let mut owner_events: Vec<(Arc<dyn PublisherSink>, PublicationEvent)> = Vec::new();
        let mut owner_listeners: Vec<Vec<Arc<ListenerFn>>> = Vec::new();
        for affected in affected_owners {
            for sink in affected.owner.sinks() {
                owner_events.push((
                    sink,
                    PublicationEvent::OwnerChanged {
                        seq,
                        owner: affected.label.clone(),
                        keys: affected.affected_keys.clone(),
                    },
                ));
            }
            if let Some(listeners) = affected.owner.listeners() {
                owner_listeners.push(listeners.snapshot());
            }
        }

        for affected in affected_owners {
            affected.owner.react_to_change(&affected.affected_keys);
        }
        for (reaction, current, previous) in &reactions {
            reaction(current.as_ref(), previous.as_ref());
        }
        for (sink, event) in owner_events {
            sink.enqueue(event);
        }
        for (sink, event) in hook_events {
            sink.enqueue(event);
        }
        for snapshot in &owner_listeners {
            for listener in snapshot {
                listener();
            }
        }
        for snapshot in &hook_listeners {
            for listener in snapshot {
                listener();
            }
        }
    }

    // -----------------------------------------------------------------------
    // Fusion and isolation
    // -----------------------------------------------------------------------

    /// Fuse each pair's nexuses, atomically across all pairs: candidate
    /// values are synchronized through one pipeline run, then memberships
    /// merge. Pairs already fused are skipped.
    pub(crate) fn fuse_pairs(
        &self,
        pairs: Vec<(AnyHook, AnyHook)>,
        mode: LinkMode,
    ) -> Result<()> {
        for (a, b) in &pairs {
            if !self.same_as(a.manager()) || !self.same_as(b.manager()) {
                return Err(SubmitError::ManagerMismatch);
            }
        }
        let guard = self.shared.registry.lock();
        let _flag = SubmissionFlag::acquire(&guard)?;
        let result = self.fuse_locked(&guard, &pairs, mode);
        if let Err(error) = &result {
            debug!(%error, "fusion aborted");
        }
        result
    }

    fn fuse_locked(
        &self,
        guard: &RegistryGuard<'_>,
        pairs: &[(AnyHook, AnyHook)],
        mode: LinkMode,
    ) -> Result<()> {
        // The nexus losing its value receives the winner's value through a
        // regular submission; the winner's members keep a value their
        // validators already accepted.
        let mut candidates = BTreeMap::new();
        {
            let registry = guard.borrow();
            for (a, b) in pairs {
                let state_a = registry.hook(a.id())?;
                let state_b = registry.hook(b.id())?;
                if state_a.nexus == state_b.nexus {
                    continue;
                }
                let nexus_a = registry.nexus(state_a.nexus);
                let nexus_b = registry.nexus(state_b.nexus);
                check_payload_type(nexus_a.current(), nexus_b.current())?;
                let (candidate, target_id, target) = match mode {
                    LinkMode::UseSelf => (nexus_a.current().clone(), state_b.nexus, nexus_b),
                    LinkMode::UseOther => (nexus_b.current().clone(), state_a.nexus, nexus_a),
                };
                if !candidate.dyn_eq(target.current().as_ref()) {
                    insert_candidate(&mut candidates, target_id, candidate)
                        .map_err(SubmitError::fusion)?;
                }
            }
        }
        if !candidates.is_empty() {
            self.pipeline(guard, candidates, SubmitOptions::default(), true)
                .map_err(SubmitError::fusion)?;
        }

        // Merge memberships: the caller's nexus is the keeper.
        let mut borrow = guard.borrow_mut();
        let registry = &mut *borrow;
        for (a, b) in pairs {
            let Some(keeper_id) = registry.hooks.get(&a.id()).map(|state| state.nexus) else {
                continue;
            };
            let Some(doomed_id) = registry.hooks.get(&b.id()).map(|state| state.nexus) else {
                continue;
            };
            if keeper_id == doomed_id {
                continue;
            }
            let Some(doomed) = registry.nexuses.remove(&doomed_id) else {
                continue;
            };
            for hook_id in doomed.members() {
                if let Some(state) = registry.hooks.get_mut(hook_id) {
                    state.nexus = keeper_id;
                    if let Some(keeper) = registry.nexuses.get_mut(&keeper_id) {
                        keeper.add_member(
                            *hook_id,
                            state.validator.is_some(),
                            state.reaction.is_some(),
                        );
                    }
                }
            }
            debug!(keeper = %keeper_id, doomed = %doomed_id, "fused nexuses");
        }
        Ok(())
    }

    /// Detach `hook` into a fresh nexus holding an independent clone of its
    /// current value. No-op when the hook is already alone. No
    /// notification fires: no value changed anywhere.
    pub(crate) fn isolate(&self, hook: HookId) -> Result<()> {
        let guard = self.shared.registry.lock();
        let mut registry = guard.borrow_mut();
        let state = registry.hook(hook)?;
        let old_id = state.nexus;
        let validates = state.validator.is_some();
        let reacts = state.reaction.is_some();

        let old = registry
            .nexuses
            .get_mut(&old_id)
            .expect("hook records only point at live nexuses");
        if old.member_count() <= 1 {
            return Ok(());
        }
        let detached_value = old.snapshot();
        old.remove_member(hook);

        let fresh_id = NexusId::next();
        let mut fresh = Nexus::new(detached_value);
        fresh.add_member(hook, validates, reacts);
        registry.nexuses.insert(fresh_id, fresh);
        registry
            .hooks
            .get_mut(&hook)
            .expect("checked above")
            .nexus = fresh_id;
        debug!(%hook, from = %old_id, into = %fresh_id, "isolated hook");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Registry plumbing for hook handles
    // -----------------------------------------------------------------------

    pub(crate) fn register_hook(
        &self,
        value: ArcValue,
        validator: Option<Arc<ValidatorFn>>,
        reaction: Option<Arc<ReactionFn>>,
        owner: Option<OwnerSlot>,
    ) -> AnyHook {
        let hook_id = HookId::next();
        let nexus_id = NexusId::next();
        let guard = self.shared.registry.lock();
        let mut registry = guard.borrow_mut();
        let mut nexus = Nexus::new(value);
        nexus.add_member(hook_id, validator.is_some(), reaction.is_some());
        registry.nexuses.insert(nexus_id, nexus);
        registry.hooks.insert(
            hook_id,
            HookState {
                nexus: nexus_id,
                validator,
                reaction,
                owner,
                listeners: ListenerSet::new(),
                sinks: Vec::new(),
            },
        );
        AnyHook {
            manager: self.clone(),
            id: hook_id,
        }
    }

    pub(crate) fn release(&self, hook: HookId) -> Result<()> {
        let guard = self.shared.registry.lock();
        let mut registry = guard.borrow_mut();
        let state = registry
            .hooks
            .remove(&hook)
            .ok_or(SubmitError::DeadHook { hook })?;
        if let Some(nexus) = registry.nexuses.get_mut(&state.nexus) {
            nexus.remove_member(hook);
            if nexus.member_count() == 0 {
                registry.nexuses.remove(&state.nexus);
            }
        }
        debug!(%hook, "released hook");
        Ok(())
    }

    pub(crate) fn hook_is_alive(&self, hook: HookId) -> bool {
        let guard = self.shared.registry.lock();
        let alive = guard.borrow().hooks.contains_key(&hook);
        alive
    }

    pub(crate) fn read_value(&self, hook: HookId) -> Result<ArcValue> {
        let guard = self.shared.registry.lock();
        let registry = guard.borrow();
        let state = registry.hook(hook)?;
        Ok(registry.nexus(state.nexus).current().clone())
    }

    pub(crate) fn previous_value(&self, hook: HookId) -> Result<Option<ArcValue>> {
        let guard = self.shared.registry.lock();
        let registry = guard.borrow();
        let state = registry.hook(hook)?;
        Ok(registry.nexus(state.nexus).previous().cloned())
    }

    pub(crate) fn nexus_id_of(&self, hook: HookId) -> Result<NexusId> {
        let guard = self.shared.registry.lock();
        let registry = guard.borrow();
        Ok(registry.hook(hook)?.nexus)
    }

    pub(crate) fn owner_key_of(&self, hook: HookId) -> Result<Option<Key>> {
        let guard = self.shared.registry.lock();
        let registry = guard.borrow();
        Ok(registry.hook(hook)?.owner.as_ref().map(|slot| slot.key.clone()))
    }

    pub(crate) fn with_listeners<R>(
        &self,
        hook: HookId,
        f: impl FnOnce(&ListenerSet) -> R,
    ) -> Result<R> {
        let guard = self.shared.registry.lock();
        let registry = guard.borrow();
        Ok(f(&registry.hook(hook)?.listeners))
    }

    pub(crate) fn add_sink(&self, hook: HookId, sink: Arc<dyn PublisherSink>) -> Result<()> {
        let guard = self.shared.registry.lock();
        let mut registry = guard.borrow_mut();
        let state = registry
            .hooks
            .get_mut(&hook)
            .ok_or(SubmitError::DeadHook { hook })?;
        state.sinks.push(sink);
        Ok(())
    }
}

impl Default for NexusManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NexusManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NexusManager")
            .field("hooks", &self.hook_count())
            .field("nexuses", &self.nexus_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Free helpers
// ---------------------------------------------------------------------------

fn check_payload_type(stored: &ArcValue, candidate: &ArcValue) -> Result<()> {
    if stored.as_any().type_id() != candidate.as_any().type_id() {
        return Err(SubmitError::TypeMismatch {
            stored: stored.type_name(),
            candidate: candidate.type_name(),
        });
    }
    Ok(())
}

fn insert_candidate(
    candidates: &mut BTreeMap<NexusId, ArcValue>,
    nexus: NexusId,
    value: ArcValue,
) -> Result<()> {
    if let Some(existing) = candidates.get(&nexus) {
        if !existing.dyn_eq(value.as_ref()) {
            return Err(SubmitError::ValueConflict {
                nexus,
                message: format!("{existing:?} and {value:?} target the same nexus"),
            });
        }
        return Ok(());
    }
    candidates.insert(nexus, value);
    Ok(())
}

fn discover_owners(
    registry: &Registry,
    nexus_id: NexusId,
    seen: &mut Vec<usize>,
    queue: &mut VecDeque<Arc<dyn HookOwner>>,
) {
    let Some(nexus) = registry.nexuses.get(&nexus_id) else {
        return;
    };
    for hook_id in nexus.members() {
        let Some(state) = registry.hooks.get(hook_id) else {
            continue;
        };
        let Some(slot) = &state.owner else {
            continue;
        };
        if let Some(owner) = slot.owner.upgrade() {
            let ptr = owner_ptr(&owner);
            if !seen.contains(&ptr) {
                seen.push(ptr);
                queue.push_back(owner);
            }
        }
    }
}

fn owner_ptr(owner: &Arc<dyn HookOwner>) -> usize {
    Arc::as_ptr(owner).cast::<()>() as usize
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

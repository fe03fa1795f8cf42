#![forbid(unsafe_code)]

//! The owner contract: higher-level objects that group related hooks.
//!
//! An owner declares an ordered key → hook mapping and participates in the
//! submission pipeline three ways: *completion* (phase 2) may extend a
//! partial write with derived values for its other hooks, *validation*
//! (phase 4) checks cross-hook invariants over a tentative full snapshot,
//! and *reaction* (phase 6) observes which of its keys committed.
//!
//! Hooks back-reference owners weakly: the core upgrades on every use and
//! treats a gone owner as contributing no completion, no validation, and no
//! reaction. Owners hold their hooks strongly, so the usual construction is
//! [`std::sync::Arc::new_cyclic`]: build the hooks inside the closure with
//! the owner's own weak handle.
//!
//! All four callbacks run under the manager lock. They may read hooks (the
//! lock is reentrant) but must not submit; a nested submission is rejected
//! with [`SubmitError::NestedSubmission`](crate::error::SubmitError).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{Result, SubmitError};
use crate::hook::{AnyHook, LinkMode};
use crate::listener::ListenerSet;
use crate::manager::{NexusManager, SubmitBatch, SubmitOptions};
use crate::publish::PublisherSink;
use crate::value::ArcValue;

/// The name under which an owner exposes one of its hooks.
pub type Key = String;

/// A keyed snapshot of (candidate or current) values, ordered by key.
pub type KeyValues = BTreeMap<Key, ArcValue>;

/// Contract implemented by objects that group hooks.
///
/// Only [`hooks`](Self::hooks) is required; a trivial owner completes
/// nothing, validates everything, and ignores reactions.
pub trait HookOwner: Send + Sync {
    /// Short name used in error messages and publication events.
    fn label(&self) -> &str {
        "owner"
    }

    /// The ordered key → hook mapping. Must be identity-stable: the same
    /// key always names the same hook for the owner's lifetime.
    fn hooks(&self) -> Vec<(Key, AnyHook)>;

    /// Extend a partial submission with derived values for other keys.
    ///
    /// `submitted` holds the candidate values for this owner's affected
    /// keys. Returned pairs join the submission; a returned value that
    /// contradicts an already-collected candidate fails the submission
    /// with `ValueConflict`. Called at most once per submission.
    fn complete(&self, submitted: &KeyValues) -> std::result::Result<KeyValues, String> {
        let _ = submitted;
        Ok(KeyValues::new())
    }

    /// Cross-hook validation over a tentative full snapshot (candidate
    /// values for affected keys, current values for the rest).
    fn validate(&self, snapshot: &KeyValues) -> std::result::Result<(), String> {
        let _ = snapshot;
        Ok(())
    }

    /// Called once per commit that touched any of this owner's hooks, with
    /// the set of affected keys. Runs under the manager lock: be fast, and
    /// do not submit.
    fn react_to_change(&self, affected: &BTreeSet<Key>) {
        let _ = affected;
    }

    /// Owner-level listeners, notified after hook reactions. Owners that
    /// want listeners embed a [`ListenerSet`] and return it here.
    fn listeners(&self) -> Option<&ListenerSet> {
        None
    }

    /// Owner-level publication sinks.
    fn sinks(&self) -> Vec<Arc<dyn PublisherSink>> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Keyed convenience surface
// ---------------------------------------------------------------------------

/// Atomically submit values to an owner's hooks, addressed by key.
pub fn submit_keyed(owner: &Arc<dyn HookOwner>, values: KeyValues) -> Result<()> {
    submit_keyed_with(owner, values, SubmitOptions::default())
}

/// [`submit_keyed`] with explicit options.
pub fn submit_keyed_with(
    owner: &Arc<dyn HookOwner>,
    values: KeyValues,
    options: SubmitOptions,
) -> Result<()> {
    match keyed_batch(owner, values)? {
        Some((manager, batch)) => manager.submit_with(batch, options),
        None => Ok(()),
    }
}

/// Run validation only (phases 1–4) for a keyed value map. No commit, no
/// notifications, no side effects.
pub fn check_keyed(owner: &Arc<dyn HookOwner>, values: KeyValues) -> Result<()> {
    match keyed_batch(owner, values)? {
        Some((manager, batch)) => manager.check(batch),
        None => Ok(()),
    }
}

/// Fuse an external hook with the owner's hook under `key`.
///
/// `LinkMode::UseSelf` keeps the owner hook's value; `LinkMode::UseOther`
/// adopts the external hook's value.
pub fn link_keyed(
    owner: &Arc<dyn HookOwner>,
    key: &str,
    external: &AnyHook,
    mode: LinkMode,
) -> Result<()> {
    let hook = hook_for_key(owner, key)?;
    hook.link(external, mode)
}

/// Atomically fuse several external hooks with the owner's hooks, one per
/// key. All fusions succeed or none do.
pub fn link_many_keyed(
    owner: &Arc<dyn HookOwner>,
    externals: BTreeMap<Key, AnyHook>,
    mode: LinkMode,
) -> Result<()> {
    if externals.is_empty() {
        return Ok(());
    }
    let hooks = owner.hooks();
    let mut pairs = Vec::with_capacity(externals.len());
    for (key, external) in externals {
        let owned = lookup(&hooks, &key).ok_or(SubmitError::UnknownKey { key })?;
        pairs.push((owned.clone(), external));
    }
    let manager = pairs[0].0.manager().clone();
    manager.fuse_pairs(pairs, mode)
}

/// Isolate the owner's hook under `key`, or every owner hook when `key` is
/// `None`. Isolating an already-solitary hook is a no-op.
pub fn isolate_keyed(owner: &Arc<dyn HookOwner>, key: Option<&str>) -> Result<()> {
    match key {
        Some(key) => hook_for_key(owner, key)?.isolate(),
        None => {
            for (_, hook) in owner.hooks() {
                hook.isolate()?;
            }
            Ok(())
        }
    }
}

fn hook_for_key(owner: &Arc<dyn HookOwner>, key: &str) -> Result<AnyHook> {
    let hooks = owner.hooks();
    lookup(&hooks, key)
        .cloned()
        .ok_or_else(|| SubmitError::UnknownKey { key: key.to_string() })
}

fn lookup<'a>(hooks: &'a [(Key, AnyHook)], key: &str) -> Option<&'a AnyHook> {
    hooks
        .iter()
        .find(|(candidate, _)| candidate == key)
        .map(|(_, hook)| hook)
}

fn keyed_batch(
    owner: &Arc<dyn HookOwner>,
    values: KeyValues,
) -> Result<Option<(NexusManager, SubmitBatch)>> {
    if values.is_empty() {
        return Ok(None);
    }
    let hooks = owner.hooks();
    let mut batch = SubmitBatch::new();
    let mut manager = None;
    for (key, value) in values {
        let hook = lookup(&hooks, &key).ok_or(SubmitError::UnknownKey { key })?;
        manager.get_or_insert_with(|| hook.manager().clone());
        batch.insert_erased(hook, value);
    }
    let manager = manager.expect("non-empty keyed batch resolves a manager");
    Ok(Some((manager, batch)))
}

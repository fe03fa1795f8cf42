#![forbid(unsafe_code)]

//! The nexus: a single storage cell shared by fused hooks.
//!
//! A nexus holds exactly one current value, the value the most recent commit
//! displaced, and the membership of hooks currently pointing at it. It also
//! tracks which members contribute an isolated validator and which contribute
//! a reaction, so the pipeline never scans hooks that contribute nothing.
//!
//! A nexus is created when a hook is constructed (fresh cell) or when a hook
//! is isolated (fresh cell with a cloned value); it is destroyed when fusion
//! moves its last member elsewhere or the last member is released. The nexus
//! never takes the manager lock and never calls owners: all of that is the
//! manager's business.
//!
//! # Invariants
//!
//! 1. Exactly one current value at all times; `previous()` is `Some` once any
//!    commit has occurred on this cell.
//! 2. Membership is exact: an id is present iff that hook's record points at
//!    this nexus.
//! 3. The validator and reaction sets are subsets of membership.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::hook::HookId;
use crate::value::ArcValue;

static NEXT_NEXUS_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of a nexus.
///
/// Two hooks share a nexus iff their `nexus_id()` values are equal. Ids are
/// unique process-wide, so comparisons across managers are well-defined
/// (and always unequal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NexusId(u64);

impl NexusId {
    pub(crate) fn next() -> Self {
        Self(NEXT_NEXUS_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NexusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nexus#{}", self.0)
    }
}

pub(crate) struct Nexus {
    current: ArcValue,
    previous: Option<ArcValue>,
    members: BTreeSet<HookId>,
    validators: BTreeSet<HookId>,
    reactions: BTreeSet<HookId>,
}

impl Nexus {
    pub(crate) fn new(value: ArcValue) -> Self {
        Self {
            current: value,
            previous: None,
            members: BTreeSet::new(),
            validators: BTreeSet::new(),
            reactions: BTreeSet::new(),
        }
    }

    pub(crate) fn current(&self) -> &ArcValue {
        &self.current
    }

    pub(crate) fn previous(&self) -> Option<&ArcValue> {
        self.previous.as_ref()
    }

    /// Independent clone of the current value.
    pub(crate) fn snapshot(&self) -> ArcValue {
        self.current.dyn_clone()
    }

    /// Install `new` as current; the displaced value becomes `previous`.
    /// Only the manager calls this, during the commit phase.
    pub(crate) fn replace_value(&mut self, new: ArcValue) {
        self.previous = Some(std::mem::replace(&mut self.current, new));
    }

    pub(crate) fn add_member(&mut self, hook: HookId, validates: bool, reacts: bool) {
        self.members.insert(hook);
        if validates {
            self.validators.insert(hook);
        }
        if reacts {
            self.reactions.insert(hook);
        }
    }

    pub(crate) fn remove_member(&mut self, hook: HookId) {
        self.members.remove(&hook);
        self.validators.remove(&hook);
        self.reactions.remove(&hook);
    }

    pub(crate) fn members(&self) -> &BTreeSet<HookId> {
        &self.members
    }

    pub(crate) fn validator_members(&self) -> &BTreeSet<HookId> {
        &self.validators
    }

    pub(crate) fn reaction_members(&self) -> &BTreeSet<HookId> {
        &self.reactions
    }

    pub(crate) fn member_count(&self) -> usize {
        self.members.len()
    }
}

impl fmt::Debug for Nexus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Nexus")
            .field("current", &self.current)
            .field("members", &self.members.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::arc_value;

    #[test]
    fn replace_value_tracks_previous() {
        let mut nexus = Nexus::new(arc_value(1_i64));
        assert!(nexus.previous().is_none());

        nexus.replace_value(arc_value(2_i64));
        assert!(nexus.current().dyn_eq(arc_value(2_i64).as_ref()));
        assert!(nexus
            .previous()
            .is_some_and(|previous| previous.dyn_eq(arc_value(1_i64).as_ref())));

        nexus.replace_value(arc_value(3_i64));
        assert!(nexus
            .previous()
            .is_some_and(|previous| previous.dyn_eq(arc_value(2_i64).as_ref())));
    }

    #[test]
    fn membership_subsets_follow_contributions() {
        let mut nexus = Nexus::new(arc_value(0_i64));
        let a = HookId::next();
        let b = HookId::next();
        let c = HookId::next();

        nexus.add_member(a, true, false);
        nexus.add_member(b, false, true);
        nexus.add_member(c, false, false);

        assert_eq!(nexus.member_count(), 3);
        assert!(nexus.validator_members().contains(&a));
        assert!(!nexus.validator_members().contains(&b));
        assert!(nexus.reaction_members().contains(&b));

        nexus.remove_member(a);
        assert!(!nexus.members().contains(&a));
        assert!(nexus.validator_members().is_empty());
        assert_eq!(nexus.member_count(), 2);
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(NexusId::next(), NexusId::next());
    }

    #[test]
    fn snapshot_is_independent() {
        let nexus = Nexus::new(arc_value(vec![1, 2]));
        let snap = nexus.snapshot();
        assert!(snap.dyn_eq(nexus.current().as_ref()));
        assert!(!std::sync::Arc::ptr_eq(nexus.current(), &snap));
    }
}

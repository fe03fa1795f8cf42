//! End-to-end scenarios over the full core: chain writes, isolation in the
//! middle of a fused group, validation-blocked fusion, owner-driven atomic
//! multi-value submissions, completion, and nested-submission rejection.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use fuselink_core::{
    submit_keyed, Hook, LinkMode, NexusManager, Result, SubmitError,
};
use fuselink_harness::{selection_values, SelectionOwner, SumOwner};

fn set_of<'a>(options: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    options.into_iter().map(str::to_string).collect()
}

#[test]
fn chain_write_propagates_to_every_member() {
    let manager = NexusManager::new();
    let a = Hook::new(&manager, 1_i64);
    let b = Hook::new(&manager, 2_i64);
    let c = Hook::new(&manager, 3_i64);

    a.link(&b, LinkMode::UseSelf).unwrap();
    b.link(&c, LinkMode::UseSelf).unwrap();
    for hook in [&a, &b, &c] {
        assert_eq!(hook.get().unwrap(), 1);
    }

    a.submit(10).unwrap();
    for hook in [&a, &b, &c] {
        assert_eq!(hook.get().unwrap(), 10);
    }

    c.submit(20).unwrap();
    for hook in [&a, &b, &c] {
        assert_eq!(hook.get().unwrap(), 20);
    }
}

#[test]
fn isolating_the_middle_hook_keeps_the_ends_fused() {
    let manager = NexusManager::new();
    let a = Hook::new(&manager, 1_i64);
    let b = Hook::new(&manager, 2_i64);
    let c = Hook::new(&manager, 3_i64);
    a.link(&b, LinkMode::UseSelf).unwrap();
    b.link(&c, LinkMode::UseSelf).unwrap();
    c.submit(20).unwrap();

    b.isolate().unwrap();
    assert!(a.is_linked_to(&c).unwrap());
    assert!(!a.is_linked_to(&b).unwrap());
    assert!(!b.is_linked_to(&c).unwrap());

    a.submit(30).unwrap();
    assert_eq!(a.get().unwrap(), 30);
    assert_eq!(c.get().unwrap(), 30);
    assert_eq!(b.get().unwrap(), 20, "isolated hook kept its value");
}

#[test]
fn owner_validation_blocks_fusion() {
    let manager = NexusManager::new();
    let sel1 = SelectionOwner::new(&manager, "red", ["red", "green", "blue"]);
    let sel2 = SelectionOwner::new(&manager, "yellow", ["yellow", "orange"]);

    // Adopting sel2's "yellow" would violate sel1's selected-in-available
    // invariant, so the fusion must be rejected wholesale.
    let err = sel1
        .selected_hook()
        .link(sel2.selected_hook(), LinkMode::UseOther)
        .unwrap_err();
    assert!(matches!(err, SubmitError::FusionRejected { .. }));
    assert!(err
        .fusion_cause()
        .is_some_and(|cause| matches!(cause, SubmitError::OwnerValidation { .. })));

    assert!(!sel1
        .selected_hook()
        .is_linked_to(sel2.selected_hook())
        .unwrap());
    assert_eq!(sel1.selected_hook().get().unwrap(), "red");
    assert_eq!(sel2.selected_hook().get().unwrap(), "yellow");
    assert_eq!(
        sel1.available_hook().get().unwrap(),
        set_of(["red", "green", "blue"])
    );
}

#[test]
fn fusion_with_a_compatible_value_succeeds() {
    let manager = NexusManager::new();
    let sel1 = SelectionOwner::new(&manager, "red", ["red", "green", "blue"]);
    let free = Hook::new(&manager, "green".to_string());

    sel1.selected_hook().link(&free, LinkMode::UseOther).unwrap();
    assert_eq!(sel1.selected_hook().get().unwrap(), "green");
    assert!(sel1.selected_hook().is_linked_to(&free).unwrap());

    // Writes through the free hook now run the selection owner's validator.
    let err = free.submit("purple".to_string()).unwrap_err();
    assert!(matches!(err, SubmitError::OwnerValidation { .. }));
    free.submit("blue".to_string()).unwrap();
    assert_eq!(sel1.selected_hook().get().unwrap(), "blue");
}

#[test]
fn owner_driven_atomic_multi_submit() {
    let manager = NexusManager::new();
    let selection = SelectionOwner::new(&manager, "laptop", ["laptop", "phone"]);
    let owner = selection.as_owner();

    // Replacing both hooks at once may move the selection to an option that
    // only exists in the new set.
    submit_keyed(&owner, selection_values("smartwatch", ["smartwatch", "laptop"])).unwrap();
    assert_eq!(selection.selected_hook().get().unwrap(), "smartwatch");
    assert_eq!(
        selection.available_hook().get().unwrap(),
        set_of(["smartwatch", "laptop"])
    );

    // An inconsistent pair fails atomically.
    let err =
        submit_keyed(&owner, selection_values("laptop", ["smartwatch", "phone"])).unwrap_err();
    assert!(matches!(err, SubmitError::OwnerValidation { .. }));
    assert_eq!(selection.selected_hook().get().unwrap(), "smartwatch");
    assert_eq!(
        selection.available_hook().get().unwrap(),
        set_of(["smartwatch", "laptop"])
    );
}

#[test]
fn completion_keeps_the_sum_invariant() {
    let manager = NexusManager::new();
    let sum = SumOwner::new(&manager, 30, 70, 100);

    sum.x().submit(40).unwrap();
    assert_eq!(sum.x().get().unwrap(), 40);
    assert_eq!(sum.y().get().unwrap(), 60, "completion adjusted y");

    sum.y().submit(99).unwrap();
    assert_eq!(sum.x().get().unwrap(), 1);
    assert_eq!(sum.y().get().unwrap(), 99);

    // An explicit pair that breaks the invariant is rejected as a whole.
    let batch = fuselink_core::SubmitBatch::new()
        .with(sum.x(), 10)
        .with(sum.y(), 10);
    let err = manager.submit(batch).unwrap_err();
    assert!(matches!(err, SubmitError::OwnerValidation { .. }));
    assert_eq!(sum.x().get().unwrap(), 1);
    assert_eq!(sum.y().get().unwrap(), 99);
}

#[test]
fn completion_reaches_hooks_fused_across_owners() {
    let manager = NexusManager::new();
    let sum = SumOwner::new(&manager, 30, 70, 100);
    let mirror = Hook::new(&manager, 0_i64);

    // Fuse an outside hook onto y; writing x must still drag it along.
    sum.y().link(&mirror, LinkMode::UseSelf).unwrap();
    assert_eq!(mirror.get().unwrap(), 70);

    sum.x().submit(25).unwrap();
    assert_eq!(mirror.get().unwrap(), 75);
}

#[test]
fn nested_submission_is_rejected_and_logged_not_fatal() {
    let manager = NexusManager::new();
    let a = Hook::new(&manager, 0_i64);

    let inner: Arc<Mutex<Option<Result<()>>>> = Arc::new(Mutex::new(None));
    let inner_clone = Arc::clone(&inner);
    let a_clone = a.clone();
    a.add_listener(move || {
        *inner_clone.lock().unwrap() = Some(a_clone.submit(99));
    })
    .unwrap();

    a.submit(1).unwrap();
    assert_eq!(a.get().unwrap(), 1, "outer submission committed");
    assert!(matches!(
        inner.lock().unwrap().take(),
        Some(Err(SubmitError::NestedSubmission))
    ));

    // The listener's failed attempt left the pipeline reusable.
    a.submit(2).unwrap();
    assert_eq!(a.get().unwrap(), 2);
}

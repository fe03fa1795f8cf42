//! Property-based invariant tests for the nexus graph.
//!
//! A union-find model mirrors every operation; after each step the real
//! graph must agree with the model on:
//!
//! 1. `is_linked_to` ⇔ equal `nexus_id` ⇔ same model group.
//! 2. Every hook in a group reads the group's value.
//! 3. A rejected submission or fusion changes nothing.
//! 4. Isolation splits exactly one hook and preserves values.

use fuselink_core::{Hook, LinkMode, NexusManager, SubmitError};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

const HOOKS: usize = 6;

#[derive(Debug, Clone)]
enum Op {
    Submit { hook: usize, value: i64 },
    Link { a: usize, b: usize, keep_self: bool },
    Isolate { hook: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..HOOKS, -50_i64..50).prop_map(|(hook, value)| Op::Submit { hook, value }),
        (0..HOOKS, 0..HOOKS, any::<bool>()).prop_map(|(a, b, keep_self)| Op::Link {
            a,
            b,
            keep_self
        }),
        (0..HOOKS).prop_map(|hook| Op::Isolate { hook }),
    ]
}

/// Union-find mirror of the hook pool. Hook 0 carries a validator that
/// rejects negative candidates, so any group containing hook 0 only ever
/// holds non-negative values.
struct Model {
    group: Vec<usize>,
    value: Vec<i64>,
    fresh: usize,
}

impl Model {
    fn new() -> Self {
        Self {
            group: (0..HOOKS).collect(),
            value: (0..HOOKS as i64).collect(),
            fresh: HOOKS,
        }
    }

    fn linked(&self, a: usize, b: usize) -> bool {
        self.group[a] == self.group[b]
    }

    fn group_size(&self, hook: usize) -> usize {
        let group = self.group[hook];
        self.group.iter().filter(|&&g| g == group).count()
    }

    fn submit(&mut self, hook: usize, value: i64) {
        let group = self.group[hook];
        for i in 0..HOOKS {
            if self.group[i] == group {
                self.value[i] = value;
            }
        }
    }

    fn link(&mut self, a: usize, b: usize, keep_self: bool) {
        if self.linked(a, b) {
            return;
        }
        let winner = if keep_self { self.value[a] } else { self.value[b] };
        let (group_a, group_b) = (self.group[a], self.group[b]);
        for i in 0..HOOKS {
            if self.group[i] == group_b {
                self.group[i] = group_a;
            }
        }
        for i in 0..HOOKS {
            if self.group[i] == group_a {
                self.value[i] = winner;
            }
        }
    }

    fn isolate(&mut self, hook: usize) {
        if self.group_size(hook) <= 1 {
            return;
        }
        self.group[hook] = self.fresh;
        self.fresh += 1;
    }
}

fn build_hooks(manager: &NexusManager) -> Vec<Hook<i64>> {
    let mut hooks = Vec::with_capacity(HOOKS);
    hooks.push(Hook::with_validator(manager, 0_i64, |value| {
        if *value >= 0 {
            Ok(())
        } else {
            Err("negative values are rejected".into())
        }
    }));
    for i in 1..HOOKS {
        hooks.push(Hook::new(manager, i as i64));
    }
    hooks
}

fn check_against_model(hooks: &[Hook<i64>], model: &Model) -> std::result::Result<(), TestCaseError> {
    for (i, hook) in hooks.iter().enumerate() {
        prop_assert_eq!(
            hook.get().unwrap(),
            model.value[i],
            "hook {} disagrees with the model",
            i
        );
    }
    for a in 0..HOOKS {
        for b in 0..HOOKS {
            let linked = hooks[a].is_linked_to(&hooks[b]).unwrap();
            prop_assert_eq!(
                linked,
                model.linked(a, b),
                "linkage of ({}, {}) disagrees with the model",
                a,
                b
            );
            let same_nexus = hooks[a].nexus_id().unwrap() == hooks[b].nexus_id().unwrap();
            prop_assert_eq!(linked, same_nexus, "is_linked_to must mirror nexus ids");
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn random_operation_sequences_match_the_model(
        ops in proptest::collection::vec(op_strategy(), 1..60)
    ) {
        let manager = NexusManager::new();
        let hooks = build_hooks(&manager);
        let mut model = Model::new();

        for op in ops {
            match op {
                Op::Submit { hook, value } => {
                    let guarded = model.linked(hook, 0);
                    let result = hooks[hook].submit(value);
                    if guarded && value < 0 {
                        prop_assert!(
                            matches!(result, Err(SubmitError::IsolatedValidation { .. })),
                            "hook 0's validator must reject negatives"
                        );
                    } else {
                        prop_assert!(result.is_ok());
                        model.submit(hook, value);
                    }
                }
                Op::Link { a, b, keep_self } => {
                    let mode = if keep_self { LinkMode::UseSelf } else { LinkMode::UseOther };
                    if model.linked(a, b) {
                        prop_assert!(hooks[a].link(&hooks[b], mode).is_ok());
                    } else {
                        let winner = if keep_self { model.value[a] } else { model.value[b] };
                        let loser = if keep_self { b } else { a };
                        let loser_guarded = model.linked(loser, 0);
                        let result = hooks[a].link(&hooks[b], mode);
                        if loser_guarded && winner < 0 {
                            prop_assert!(
                                matches!(result, Err(SubmitError::FusionRejected { .. })),
                                "fusing a negative value into hook 0's group must fail"
                            );
                        } else {
                            prop_assert!(result.is_ok());
                            model.link(a, b, keep_self);
                        }
                    }
                }
                Op::Isolate { hook } => {
                    prop_assert!(hooks[hook].isolate().is_ok());
                    model.isolate(hook);
                }
            }
            check_against_model(&hooks, &model)?;
        }
    }

    #[test]
    fn resubmitting_the_current_value_is_always_a_noop(
        value in -100_i64..100,
    ) {
        let manager = NexusManager::new();
        let hook = Hook::new(&manager, value);
        let before = hook.nexus_id().unwrap();

        hook.submit(value).unwrap();
        prop_assert_eq!(hook.get().unwrap(), value);
        prop_assert_eq!(hook.previous().unwrap(), None, "no commit may have happened");
        prop_assert_eq!(hook.nexus_id().unwrap(), before);
    }
}

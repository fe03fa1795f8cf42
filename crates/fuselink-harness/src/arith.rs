#![forbid(unsafe_code)]

//! A reference function-like owner: two hooks constrained to a constant sum.
//!
//! Writing either hook completes the other during phase 2, so both commit
//! atomically and `x + y == total` holds at every quiescent point.

use std::sync::{Arc, Weak};

use fuselink_core::{arc_value, AnyHook, Hook, HookOwner, Key, KeyValues, NexusManager};

pub struct SumOwner {
    x: Hook<i64>,
    y: Hook<i64>,
    total: i64,
}

impl SumOwner {
    /// `x + y` must equal `total`; the initial values must already satisfy
    /// the constraint.
    pub fn new(manager: &NexusManager, x: i64, y: i64, total: i64) -> Arc<Self> {
        debug_assert_eq!(x + y, total, "initial values must satisfy the constraint");
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak: Weak<dyn HookOwner> = weak.clone();
            Self {
                x: Hook::owned(manager, x, weak.clone(), "x"),
                y: Hook::owned(manager, y, weak, "y"),
                total,
            }
        })
    }

    #[must_use]
    pub fn x(&self) -> &Hook<i64> {
        &self.x
    }

    #[must_use]
    pub fn y(&self) -> &Hook<i64> {
        &self.y
    }

    #[must_use]
    pub fn as_owner(self: &Arc<Self>) -> Arc<dyn HookOwner> {
        Arc::clone(self) as Arc<dyn HookOwner>
    }
}

impl HookOwner for SumOwner {
    fn label(&self) -> &str {
        "sum"
    }

    fn hooks(&self) -> Vec<(Key, AnyHook)> {
        vec![("x".into(), self.x.erase()), ("y".into(), self.y.erase())]
    }

    fn complete(&self, submitted: &KeyValues) -> Result<KeyValues, String> {
        let x = submitted
            .get("x")
            .and_then(|value| value.downcast_ref::<i64>())
            .copied();
        let y = submitted
            .get("y")
            .and_then(|value| value.downcast_ref::<i64>())
            .copied();
        let mut extra = KeyValues::new();
        match (x, y) {
            // Both sides were written explicitly; validation arbitrates.
            (Some(_), Some(_)) => {}
            (Some(x), None) => {
                extra.insert("y".into(), arc_value(self.total - x));
            }
            (None, Some(y)) => {
                extra.insert("x".into(), arc_value(self.total - y));
            }
            (None, None) => {}
        }
        Ok(extra)
    }

    fn validate(&self, snapshot: &KeyValues) -> Result<(), String> {
        let (Some(x), Some(y)) = (
            snapshot.get("x").and_then(|value| value.downcast_ref::<i64>()),
            snapshot.get("y").and_then(|value| value.downcast_ref::<i64>()),
        ) else {
            return Err("snapshot is missing a summand".to_string());
        };
        if x + y == self.total {
            Ok(())
        } else {
            Err(format!("{x} + {y} != {}", self.total))
        }
    }
}

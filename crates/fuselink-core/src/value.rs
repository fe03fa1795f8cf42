#![forbid(unsafe_code)]

//! Erased payload values stored in nexuses.
//!
//! A nexus holds exactly one value, but hooks of different payload types may
//! belong to the same owner and be written together in one batch. The graph
//! therefore stores values behind [`ArcValue`], an erased, shareable handle,
//! while the typed [`Hook<T>`](crate::hook::Hook) surface downcasts at the
//! boundary.
//!
//! # Invariants
//!
//! 1. A stored value is never mutated in place: commits swap the whole
//!    `ArcValue`, so readers holding a clone of the handle observe a frozen
//!    snapshot forever.
//! 2. [`Value::dyn_eq`] is structural equality and returns `false` across
//!    payload types.
//! 3. [`Value::dyn_clone`] yields a semantically independent copy (the clone
//!    of the underlying `T`, re-wrapped).

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Shared handle to an erased, committed value.
pub type ArcValue = Arc<dyn Value>;

/// Payload contract for values stored in a nexus.
///
/// Implemented automatically for every `T` that is `Clone + PartialEq +
/// Send + Sync + Debug + 'static`; user code never implements this by hand.
pub trait Value: Any + Send + Sync + fmt::Debug {
    /// Structural equality against another erased value.
    ///
    /// Returns `false` when `other` has a different concrete type.
    fn dyn_eq(&self, other: &dyn Value) -> bool;

    /// An independent deep copy of this value.
    fn dyn_clone(&self) -> ArcValue;

    /// Concrete type name, for diagnostics.
    fn type_name(&self) -> &'static str;

    /// Upcast for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl<T> Value for T
where
    T: Any + Clone + PartialEq + Send + Sync + fmt::Debug,
{
    fn dyn_eq(&self, other: &dyn Value) -> bool {
        other.as_any().downcast_ref::<T>() == Some(self)
    }

    fn dyn_clone(&self) -> ArcValue {
        Arc::new(self.clone())
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn Value {
    /// Whether the erased value holds a `T`.
    #[must_use]
    pub fn is<T: Value>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Borrow the concrete value, if it holds a `T`.
    #[must_use]
    pub fn downcast_ref<T: Value>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Wrap a concrete value into an [`ArcValue`].
#[must_use]
pub fn arc_value<T: Value>(value: T) -> ArcValue {
    Arc::new(value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

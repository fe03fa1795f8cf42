#![forbid(unsafe_code)]

//! A reference owner: a selected option constrained to a set of available
//! options.
//!
//! The owner's cross-hook validator enforces `selected ∈ available`, which
//! makes it the canonical fixture for validation-blocked fusions and for
//! atomic multi-value submissions that move both hooks at once.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use fuselink_core::{
    AnyHook, Hook, HookOwner, Key, KeyValues, ListenerSet, NexusManager, PublisherSink,
};

pub struct SelectionOwner {
    selected: Hook<String>,
    available: Hook<BTreeSet<String>>,
    listeners: ListenerSet,
    sinks: Mutex<Vec<Arc<dyn PublisherSink>>>,
    reactions: Mutex<Vec<BTreeSet<Key>>>,
}

impl SelectionOwner {
    pub fn new<'a>(
        manager: &NexusManager,
        selected: &str,
        available: impl IntoIterator<Item = &'a str>,
    ) -> Arc<Self> {
        let options: BTreeSet<String> = available.into_iter().map(str::to_string).collect();
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak: Weak<dyn HookOwner> = weak.clone();
            Self {
                selected: Hook::owned(manager, selected.to_string(), weak.clone(), "selected"),
                available: Hook::owned(manager, options, weak, "available"),
                listeners: ListenerSet::new(),
                sinks: Mutex::new(Vec::new()),
                reactions: Mutex::new(Vec::new()),
            }
        })
    }

    #[must_use]
    pub fn selected_hook(&self) -> &Hook<String> {
        &self.selected
    }

    #[must_use]
    pub fn available_hook(&self) -> &Hook<BTreeSet<String>> {
        &self.available
    }

    pub fn attach_sink(&self, sink: Arc<dyn PublisherSink>) {
        self.sinks.lock().push(sink);
    }

    /// The affected-key sets this owner reacted to, one entry per commit.
    #[must_use]
    pub fn reactions(&self) -> Vec<BTreeSet<Key>> {
        self.reactions.lock().clone()
    }

    /// Upcast for the keyed convenience surface.
    #[must_use]
    pub fn as_owner(self: &Arc<Self>) -> Arc<dyn HookOwner> {
        Arc::clone(self) as Arc<dyn HookOwner>
    }
}

impl HookOwner for SelectionOwner {
    fn label(&self) -> &str {
        "selection"
    }

    fn hooks(&self) -> Vec<(Key, AnyHook)> {
        vec![
            ("selected".into(), self.selected.erase()),
            ("available".into(), self.available.erase()),
        ]
    }

    fn validate(&self, snapshot: &KeyValues) -> Result<(), String> {
        let (Some(selected), Some(available)) = (
            snapshot
                .get("selected")
                .and_then(|value| value.downcast_ref::<String>()),
            snapshot
                .get("available")
                .and_then(|value| value.downcast_ref::<BTreeSet<String>>()),
        ) else {
            return Err("snapshot is missing selection state".to_string());
        };
        if available.contains(selected) {
            Ok(())
        } else {
            Err(format!(
                "selected option '{selected}' is not among the available options {available:?}"
            ))
        }
    }

    fn react_to_change(&self, affected: &BTreeSet<Key>) {
        self.reactions.lock().push(affected.clone());
    }

    fn listeners(&self) -> Option<&ListenerSet> {
        Some(&self.listeners)
    }

    fn sinks(&self) -> Vec<Arc<dyn PublisherSink>> {
        self.sinks.lock().clone()
    }
}

/// Keyed value map for one selection submission.
#[must_use]
pub fn selection_values<'a>(
    selected: &str,
    available: impl IntoIterator<Item = &'a str>,
) -> KeyValues {
    let options: BTreeSet<String> = available.into_iter().map(str::to_string).collect();
    BTreeMap::from([
        (
            "selected".to_string(),
            fuselink_core::arc_value(selected.to_string()),
        ),
        ("available".to_string(), fuselink_core::arc_value(options)),
    ])
}

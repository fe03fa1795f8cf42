#![forbid(unsafe_code)]

//! Outbound publication events.
//!
//! Sinks are the boundary to asynchronous delivery: the core guarantees only
//! that [`PublisherSink::enqueue`] is called inside the manager lock, after
//! the commit and before listeners fire. Delivery, buffering, and any event
//! loop belong to the sink implementation.

use std::collections::BTreeSet;

use crate::hook::HookId;
use crate::nexus::NexusId;
use crate::owner::Key;

/// One publication, emitted per attached sink per committed submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicationEvent {
    /// A hook's nexus committed a new value.
    HookChanged {
        /// Total order of committed submissions within one manager.
        seq: u64,
        hook: HookId,
        nexus: NexusId,
    },
    /// One or more of an owner's hooks committed a new value.
    OwnerChanged {
        seq: u64,
        owner: String,
        keys: BTreeSet<Key>,
    },
}

impl PublicationEvent {
    /// The submission sequence number this event belongs to.
    #[must_use]
    pub fn seq(&self) -> u64 {
        match self {
            Self::HookChanged { seq, .. } | Self::OwnerChanged { seq, .. } => *seq,
        }
    }
}

/// Where publication events go.
///
/// `enqueue` runs under the manager lock and therefore must not block;
/// hand the event to a channel or queue and return.
pub trait PublisherSink: Send + Sync {
    fn enqueue(&self, event: PublicationEvent);
}

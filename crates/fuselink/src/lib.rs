#![forbid(unsafe_code)]

//! Fuselink public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub mod prelude {
    pub use fuselink_core::{
        arc_value, check_keyed, isolate_keyed, link_keyed, link_many_keyed, submit_keyed,
        submit_keyed_with, AnyHook, ArcValue, Hook, HookId, HookOwner, Key, KeyValues, LinkMode,
        ListenerId, ListenerSet, NexusId, NexusManager, PublicationEvent, PublisherSink, Result,
        SubmitBatch, SubmitError, SubmitOptions, Value,
    };
}

pub use fuselink_core as core;

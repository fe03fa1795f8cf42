#![forbid(unsafe_code)]

//! Reactive value-synchronization core.
//!
//! Independent runtime objects hold [`Hook`]s into shared storage cells
//! (*nexuses*). Fusing two hooks merges their cells into one synchronization
//! domain: a write by any participant is visible to every other, and all
//! participants collectively validate a write before it commits. Binding is
//! symmetric, transitive (fuse A↔B and B↔C and A, B, C share one cell), and
//! non-directional; isolating one hook leaves the rest fused.
//!
//! ```
//! use fuselink_core::{Hook, LinkMode, NexusManager};
//!
//! let manager = NexusManager::new();
//! let a = Hook::new(&manager, 1_i64);
//! let b = Hook::new(&manager, 2_i64);
//! let c = Hook::new(&manager, 3_i64);
//!
//! a.link(&b, LinkMode::UseSelf)?;
//! b.link(&c, LinkMode::UseSelf)?;
//! assert_eq!(c.get()?, 1);
//!
//! c.submit(10)?;
//! assert_eq!(a.get()?, 10);
//!
//! b.isolate()?;
//! a.submit(20)?;
//! assert_eq!(c.get()?, 20);
//! assert_eq!(b.get()?, 10);
//! # Ok::<(), fuselink_core::SubmitError>(())
//! ```

pub mod error;
pub mod hook;
pub mod listener;
pub mod manager;
pub mod nexus;
pub mod owner;
pub mod publish;
pub mod value;

pub use error::{Result, SubmitError};
pub use hook::{AnyHook, Hook, HookBuilder, HookId, LinkMode};
pub use listener::{ListenerId, ListenerSet};
pub use manager::{NexusManager, SubmitBatch, SubmitOptions};
pub use nexus::NexusId;
pub use owner::{
    check_keyed, isolate_keyed, link_keyed, link_many_keyed, submit_keyed, submit_keyed_with,
    HookOwner, Key, KeyValues,
};
pub use publish::{PublicationEvent, PublisherSink};
pub use value::{arc_value, ArcValue, Value};

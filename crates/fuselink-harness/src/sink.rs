#![forbid(unsafe_code)]

//! A channel-backed publication sink.
//!
//! Enqueue happens inside the manager lock (the core's contract); the test
//! drains the receiver afterwards, standing in for an async delivery worker.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use parking_lot::Mutex;

use fuselink_core::{PublicationEvent, PublisherSink};

pub struct ChannelSink {
    sender: Mutex<Sender<PublicationEvent>>,
}

impl ChannelSink {
    /// Create a sink and the receiver a delivery worker would drain.
    #[must_use]
    pub fn new() -> (Arc<Self>, Receiver<PublicationEvent>) {
        let (sender, receiver) = channel();
        (
            Arc::new(Self {
                sender: Mutex::new(sender),
            }),
            receiver,
        )
    }
}

impl PublisherSink for ChannelSink {
    fn enqueue(&self, event: PublicationEvent) {
        // The receiver may already be gone in a tearing-down test.
        let _ = self.sender.lock().send(event);
    }
}

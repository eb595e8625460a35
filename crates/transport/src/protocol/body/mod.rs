//! Streaming entity bodies.
//!
//! An inbound message is handed to its consumer as soon as its headers are
//! complete. The body keeps arriving afterwards and flows through a bounded
//! channel:
//!
//! - [`BodySink`]: the producer side, owned by the stream's state machine
//! - [`MessageBody`]: the consumer side, implements `http_body::Body`
//!
//! The channel depth bounds how much of a body is buffered for a slow
//! consumer. The connection driver polls `BodySink::poll_ready` before it
//! dispatches a data event, so reading from the wire pauses while the queue is
//! full.
//!
//! A failure after the headers were released is recorded in the message's
//! [`IoFailure`] slot and the channel is closed. The consumer drains what was
//! already queued and then sees the recorded error instead of a short body.

mod body_sink;
mod message_body;

pub use message_body::MessageBody;

pub use body_sink::BodySink;

use futures::channel::mpsc;
use once_cell::sync::OnceCell;
use std::sync::Arc;

use crate::protocol::{PayloadSize, TransportError};

/// Set-once failure slot shared by a message, its body and the state machine
/// that produces them.
#[derive(Debug, Clone, Default)]
pub struct IoFailure {
    inner: Arc<OnceCell<TransportError>>,
}

impl IoFailure {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `error`. Returns `false` if a failure was already recorded.
    pub fn set(&self, error: TransportError) -> bool {
        self.inner.set(error).is_ok()
    }

    pub fn get(&self) -> Option<&TransportError> {
        self.inner.get()
    }

    pub fn is_set(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// Creates a bounded body channel holding at most `capacity` queued items.
pub(crate) fn body_channel(capacity: usize, payload_size: PayloadSize, failure: IoFailure) -> (BodySink, MessageBody) {
    // futures' mpsc grants every sender one extra slot on top of the buffer
    let (sender, receiver) = mpsc::channel(capacity.saturating_sub(1));
    (BodySink::new(sender, failure.clone()), MessageBody::new(receiver, payload_size, failure))
}

use std::task::{Context, Poll};

use futures::channel::mpsc;
use tracing::{error, trace};

use crate::protocol::body::IoFailure;
use crate::protocol::{PayloadItem, TransportError};

/// Producer side of a [`MessageBody`](crate::protocol::body::MessageBody).
#[derive(Debug)]
pub struct BodySink {
    sender: mpsc::Sender<PayloadItem>,
    failure: IoFailure,
}

impl BodySink {
    pub(crate) fn new(sender: mpsc::Sender<PayloadItem>, failure: IoFailure) -> Self {
        Self { sender, failure }
    }

    /// Ready when one more item can be queued, or when nobody listens anymore.
    pub(crate) fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        match self.sender.poll_ready(cx) {
            Poll::Ready(_) => Poll::Ready(()),
            Poll::Pending => Poll::Pending,
        }
    }

    /// Queues one body item.
    ///
    /// A consumer that dropped its body simply stops receiving; the rest of
    /// the body is discarded.
    pub(crate) fn deliver(&mut self, item: PayloadItem) {
        let last = item.is_last();
        match self.sender.try_send(item) {
            Ok(()) => {}
            Err(e) if e.is_disconnected() => {
                trace!(size = e.into_inner().as_bytes().len(), "body consumer gone, discard payload");
            }
            Err(_) => {
                error!("inbound body queue overflow");
                self.fail(TransportError::protocol("inbound body queue overflow"));
                return;
            }
        }

        if last {
            self.sender.close_channel();
        }
    }

    /// Ends the body with `error`, unless it already ended.
    pub(crate) fn fail(&mut self, error: TransportError) {
        if self.sender.is_closed() {
            return;
        }
        self.failure.set(error);
        self.sender.close_channel();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

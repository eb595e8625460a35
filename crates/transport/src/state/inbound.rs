use std::fmt;
use std::task::{Context, Poll};

use bytes::Bytes;
use http::HeaderMap;
use tracing::{trace, warn};

use crate::codec::fields;
use crate::protocol::body::{self, BodySink, IoFailure, MessageBody};
use crate::protocol::{MessageHead, PayloadItem, StreamIdentity, TransportError};

/// Receive direction of one stream.
#[derive(Debug)]
pub enum InboundState {
    /// Waiting for the header block that opens the message.
    ReceivingHeaders,
    /// Headers released, body chunks are flowing into the message.
    ReceivingEntityBody { sink: BodySink },
    /// The last chunk (and any trailers) has been recorded.
    Received,
    Failed,
}

impl InboundState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InboundState::Received | InboundState::Failed)
    }

    pub fn is_receiving(&self) -> bool {
        !self.is_terminal()
    }

    pub fn name(&self) -> &'static str {
        match self {
            InboundState::ReceivingHeaders => "ReceivingHeaders",
            InboundState::ReceivingEntityBody { .. } => "ReceivingEntityBody",
            InboundState::Received => "Received",
            InboundState::Failed => "Failed",
        }
    }

    /// Materialises the body of a message whose header block just completed.
    ///
    /// Returns `None` when a header block is not expected in this state.
    pub(crate) fn on_headers(&mut self, identity: &StreamIdentity, head: &MessageHead, end_stream: bool, capacity: usize, failure: &IoFailure) -> Option<MessageBody> {
        if !matches!(self, InboundState::ReceivingHeaders) {
            warn!(stream_id = %identity, state = self.name(), "header block in unexpected state, ignore");
            return None;
        }

        if end_stream {
            *self = InboundState::Received;
            return Some(MessageBody::empty());
        }

        let (sink, body) = body::body_channel(capacity, fields::payload_size(head, false), failure.clone());
        *self = InboundState::ReceivingEntityBody { sink };
        Some(body)
    }

    /// Returns true if the chunk was accepted.
    pub(crate) fn on_data(&mut self, identity: &StreamIdentity, data: Bytes, end_stream: bool) -> bool {
        let InboundState::ReceivingEntityBody { sink } = self else {
            warn!(stream_id = %identity, state = self.name(), size = data.len(), "body chunk in unexpected state, ignore");
            return false;
        };

        if end_stream {
            sink.deliver(PayloadItem::last(data));
            *self = InboundState::Received;
        } else {
            sink.deliver(PayloadItem::Chunk(data));
        }
        true
    }

    pub(crate) fn on_trailers(&mut self, identity: &StreamIdentity, trailers: HeaderMap) -> bool {
        let InboundState::ReceivingEntityBody { sink } = self else {
            warn!(stream_id = %identity, state = self.name(), "trailers in unexpected state, ignore");
            return false;
        };

        sink.deliver(PayloadItem::last_with_trailers(Bytes::new(), trailers));
        *self = InboundState::Received;
        true
    }

    /// Ready when the next body chunk can be queued without overflowing.
    pub(crate) fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        match self {
            InboundState::ReceivingEntityBody { sink } => sink.poll_ready(cx),
            _ => Poll::Ready(()),
        }
    }

    /// Ends the receive direction with `error`.
    ///
    /// Returns false if it had already ended, which makes repeated failures
    /// no-ops.
    pub(crate) fn fail(&mut self, identity: &StreamIdentity, error: &TransportError) -> bool {
        match self {
            InboundState::Received | InboundState::Failed => {
                trace!(stream_id = %identity, state = self.name(), "inbound already ended");
                false
            }
            InboundState::ReceivingEntityBody { sink } => {
                sink.fail(error.clone());
                *self = InboundState::Failed;
                true
            }
            InboundState::ReceivingHeaders => {
                *self = InboundState::Failed;
                true
            }
        }
    }
}

impl fmt::Display for InboundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use http::{Method, Request};
    use http_body_util::BodyExt;

    use super::*;
    use crate::protocol::{ConnectionId, RequestHeader};

    fn identity() -> StreamIdentity {
        StreamIdentity::new(ConnectionId::next(), None)
    }

    fn post() -> MessageHead {
        MessageHead::from(RequestHeader::from(Request::builder().method(Method::POST).uri("/").body(()).unwrap()))
    }

    #[tokio::test]
    async fn chunks_arrive_in_order() {
        let id = identity();
        let failure = IoFailure::new();
        let mut state = InboundState::ReceivingHeaders;
        let body = state.on_headers(&id, &post(), false, 8, &failure).unwrap();

        assert!(state.on_data(&id, Bytes::from_static(b"ab"), false));
        assert!(state.on_data(&id, Bytes::from_static(b"cd"), true));
        assert!(matches!(state, InboundState::Received));
        assert!(!state.on_data(&id, Bytes::from_static(b"late"), true));

        assert_eq!(&body.collect().await.unwrap().to_bytes()[..], b"abcd");
    }

    #[tokio::test]
    async fn failure_surfaces_after_queued_chunks() {
        let id = identity();
        let failure = IoFailure::new();
        let mut state = InboundState::ReceivingHeaders;
        let mut body = state.on_headers(&id, &post(), false, 8, &failure).unwrap();

        state.on_data(&id, Bytes::from_static(b"partial"), false);
        assert!(state.fail(&id, &TransportError::remote_closed(crate::protocol::ErrorPhase::ReadingRequestBody)));
        assert!(!state.fail(&id, &TransportError::Abandoned));

        let first = body.frame().await.unwrap().unwrap();
        assert_eq!(first.into_data().unwrap(), Bytes::from_static(b"partial"));
        assert!(matches!(body.frame().await, Some(Err(TransportError::RemoteClosed { .. }))));
        assert!(failure.is_set());
    }

    #[test]
    fn headers_are_accepted_once() {
        let id = identity();
        let failure = IoFailure::new();
        let mut state = InboundState::ReceivingHeaders;
        assert!(state.on_headers(&id, &post(), true, 8, &failure).is_some());
        assert!(state.on_headers(&id, &post(), true, 8, &failure).is_none());
    }
}

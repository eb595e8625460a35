//! Client side of a stream: sends a request, receives its response.

use std::task::{Context, Poll};

use bytes::Bytes;
use http::HeaderMap;
use tracing::{error, trace};

use crate::connection::Channel;
use crate::future::CompletionFuture;
use crate::protocol::body::IoFailure;
use crate::protocol::{ErrorPhase, HttpMessage, MessageHead, PayloadItem, PayloadSize, RequestHeader, SendError, StreamIdentity, TransportError};
use crate::state::{Disposition, InboundState, OutboundState};

/// Per-stream state of a client exchange.
///
/// The completion handed to the caller resolves with the response as soon as
/// its head arrives; the response body streams in afterwards. Failures after
/// that point surface through the body and the message's failure slot.
#[derive(Debug)]
pub struct SenderContext {
    identity: StreamIdentity,
    inbound: InboundState,
    outbound: OutboundState,
    failure: IoFailure,
    body_capacity: usize,
    response: CompletionFuture<HttpMessage>,
}

impl SenderContext {
    pub fn new(identity: StreamIdentity, body_capacity: usize, response: CompletionFuture<HttpMessage>) -> Self {
        Self {
            identity,
            inbound: InboundState::ReceivingHeaders,
            outbound: OutboundState::SendingHeaders,
            failure: IoFailure::new(),
            body_capacity,
            response,
        }
    }

    pub fn identity(&self) -> &StreamIdentity {
        &self.identity
    }

    pub fn inbound(&self) -> &InboundState {
        &self.inbound
    }

    pub fn outbound(&self) -> &OutboundState {
        &self.outbound
    }

    pub fn send_headers<C: Channel + ?Sized>(&mut self, channel: &mut C, head: RequestHeader, payload: PayloadSize) -> Disposition {
        match self.outbound.send_headers(channel, &self.identity, MessageHead::from(head), payload) {
            Ok(_) => self.disposition(),
            Err(e) => self.write_failed(ErrorPhase::WritingRequestHeaders, &e),
        }
    }

    pub fn send_body<C: Channel + ?Sized>(&mut self, channel: &mut C, item: PayloadItem) -> Disposition {
        match self.outbound.send_body(channel, &self.identity, item) {
            Ok(_) => self.disposition(),
            Err(e) => self.write_failed(ErrorPhase::WritingRequestBody, &e),
        }
    }

    /// Handles the response header block and hands the response to the caller.
    pub fn on_headers(&mut self, head: MessageHead, end_stream: bool) -> Disposition {
        if head.is_informational() {
            trace!(stream_id = %self.identity, status = ?head.status(), "skip interim response");
            return Disposition::Continue;
        }

        let Some(body) = self.inbound.on_headers(&self.identity, &head, end_stream, self.body_capacity, &self.failure) else {
            return self.disposition();
        };

        if !self.response.notify_success(HttpMessage::new(head, body, self.failure.clone())) {
            trace!(stream_id = %self.identity, "response arrived after the exchange was resolved");
        }
        self.disposition()
    }

    pub fn on_data(&mut self, data: Bytes, end_stream: bool) -> Disposition {
        self.inbound.on_data(&self.identity, data, end_stream);
        self.disposition()
    }

    pub fn on_trailers(&mut self, trailers: HeaderMap) -> Disposition {
        self.inbound.on_trailers(&self.identity, trailers);
        self.disposition()
    }

    pub fn on_reset(&mut self, code: u64) -> Disposition {
        self.fail(TransportError::Reset { code });
        Disposition::Retire
    }

    /// Ready when the next response body chunk can be queued.
    pub fn poll_body_ready(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        self.inbound.poll_ready(cx)
    }

    /// The stream has been idle for too long. The error names how far the
    /// exchange got; once both directions have ended this is a no-op.
    pub fn handle_timeout(&mut self) -> Disposition {
        match self.interrupted_phase() {
            Some(phase) => {
                self.fail(TransportError::idle_timeout(phase));
                Disposition::Abort
            }
            None => {
                trace!(stream_id = %self.identity, "timeout after exchange ended, ignore");
                self.disposition()
            }
        }
    }

    /// The connection went away without a protocol-level close.
    pub fn handle_channel_closed(&mut self) -> Disposition {
        match self.interrupted_phase() {
            Some(phase) => {
                self.fail(TransportError::remote_closed(phase));
                Disposition::Abort
            }
            None => {
                trace!(stream_id = %self.identity, "channel closed after exchange ended, ignore");
                self.disposition()
            }
        }
    }

    pub fn abort(&mut self, error: TransportError) -> Disposition {
        self.fail(error);
        Disposition::Abort
    }

    pub fn disposition(&self) -> Disposition {
        match (&self.inbound, &self.outbound) {
            (InboundState::Failed, _) | (_, OutboundState::Failed) => Disposition::Abort,
            (InboundState::Received, OutboundState::Completed) => Disposition::Retire,
            _ => Disposition::Continue,
        }
    }

    fn interrupted_phase(&self) -> Option<ErrorPhase> {
        match (&self.inbound, &self.outbound) {
            (InboundState::ReceivingEntityBody { .. }, _) => Some(ErrorPhase::ReadingResponseBody),
            (InboundState::ReceivingHeaders, OutboundState::SendingHeaders) => Some(ErrorPhase::WritingRequestHeaders),
            (InboundState::ReceivingHeaders, OutboundState::SendingEntityBody { .. }) => Some(ErrorPhase::WritingRequestBody),
            (InboundState::ReceivingHeaders, _) => Some(ErrorPhase::BeforeResponseReceived),
            // the response ended early while the request body was still going out
            (_, OutboundState::SendingEntityBody { .. }) => Some(ErrorPhase::WritingRequestBody),
            _ => None,
        }
    }

    fn write_failed(&mut self, phase: ErrorPhase, cause: &SendError) -> Disposition {
        error!(stream_id = %self.identity, cause = %cause, "failed to write request");
        self.fail(TransportError::remote_closed(phase));
        Disposition::Abort
    }

    fn fail(&mut self, error: TransportError) {
        let inbound_failed = self.inbound.fail(&self.identity, &error);
        let outbound_failed = self.outbound.fail();
        if !inbound_failed && !outbound_failed {
            return;
        }

        self.failure.set(error.clone());
        error!(stream_id = %self.identity, cause = %error, "exchange failed");
        self.response.notify_error(error);
    }
}

#[cfg(test)]
mod tests {
    use http::{Method, Request, Response, StatusCode};
    use http_body_util::BodyExt;

    use super::*;
    use crate::future::Completion;
    use crate::mock::RecordingChannel;
    use crate::protocol::{ConnectionId, OutboundFrame, StreamId};

    fn context() -> (SenderContext, Completion<HttpMessage>) {
        let (resolver, completion) = CompletionFuture::channel();
        (SenderContext::new(StreamIdentity::new(ConnectionId::next(), Some(StreamId::new(1))), 8, resolver), completion)
    }

    fn post() -> RequestHeader {
        RequestHeader::from(Request::builder().method(Method::POST).uri("https://example.com/items").body(()).unwrap())
    }

    fn response(status: StatusCode) -> MessageHead {
        Response::builder().status(status).body(()).unwrap().into()
    }

    #[tokio::test]
    async fn response_resolves_on_head_and_body_streams() {
        let (mut ctx, completion) = context();
        let mut channel = RecordingChannel::new();

        ctx.send_headers(&mut channel, post(), PayloadSize::Length(4));
        assert_eq!(ctx.send_body(&mut channel, PayloadItem::last(Bytes::from_static(b"item"))), Disposition::Continue);
        assert!(matches!(channel.frames()[1], OutboundFrame::Data { end_stream: true, .. }));

        assert_eq!(ctx.on_headers(response(StatusCode::CONTINUE), false), Disposition::Continue);
        assert!(matches!(ctx.inbound(), InboundState::ReceivingHeaders));

        ctx.on_headers(response(StatusCode::CREATED), false);
        let response = completion.await.unwrap().into_response().unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        assert_eq!(ctx.on_data(Bytes::from_static(b"done"), true), Disposition::Retire);
        assert_eq!(&response.into_body().collect().await.unwrap().to_bytes()[..], b"done");
    }

    #[tokio::test]
    async fn timeout_before_response_names_the_phase() {
        let (mut ctx, completion) = context();
        let mut channel = RecordingChannel::new();
        ctx.send_headers(&mut channel, post(), PayloadSize::Empty);

        assert_eq!(ctx.handle_timeout(), Disposition::Abort);
        ctx.handle_channel_closed();

        let error = completion.await.unwrap_err();
        assert!(error.is_timeout());
        assert_eq!(error.phase(), Some(ErrorPhase::BeforeResponseReceived));
    }

    #[tokio::test]
    async fn closure_mid_body_fails_the_body() {
        let (mut ctx, completion) = context();
        let mut channel = RecordingChannel::new();
        ctx.send_headers(&mut channel, post(), PayloadSize::Empty);
        ctx.on_headers(response(StatusCode::OK), false);
        ctx.on_data(Bytes::from_static(b"part"), false);

        assert_eq!(ctx.handle_channel_closed(), Disposition::Abort);

        let mut message = completion.await.unwrap();
        let error = message.take_body().collect().await.unwrap_err();
        assert_eq!(error.phase(), Some(ErrorPhase::ReadingResponseBody));
        assert!(matches!(message.io_error(), Some(TransportError::RemoteClosed { .. })));
    }

    #[tokio::test]
    async fn rejected_request_head() {
        let (mut ctx, completion) = context();
        let mut channel = RecordingChannel::rejecting();

        assert_eq!(ctx.send_headers(&mut channel, post(), PayloadSize::Empty), Disposition::Abort);
        let error = completion.await.unwrap_err();
        assert_eq!(error.to_string(), "remote closed while writing outbound request headers");
    }

    #[tokio::test]
    async fn dropped_context_abandons_the_exchange() {
        let (ctx, completion) = context();
        drop(ctx);
        assert!(matches!(completion.await, Err(TransportError::Abandoned)));
    }
}

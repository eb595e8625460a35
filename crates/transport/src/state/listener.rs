//! Server side of a stream: receives a request, produces its response.

use std::task::{Context, Poll};

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Response, StatusCode, header};
use tracing::{error, trace};

use crate::connection::Channel;
use crate::future::CompletionFuture;
use crate::protocol::body::IoFailure;
use crate::protocol::{ErrorPhase, HttpMessage, MessageHead, PayloadItem, PayloadSize, ResponseHead, SendError, StreamIdentity, TransportError};
use crate::state::{Disposition, InboundState, OutboundState, Progress};

/// Per-stream state of a server exchange.
///
/// The request direction and the response direction are tracked in separate
/// slots, so request body frames that keep arriving while the response is
/// being written never disturb the writer.
///
/// Once the request head has been released, its [`HttpMessage`] carries a
/// completion that this context resolves exactly once: with success when the
/// terminal response chunk has been written, or with the first terminal error.
#[derive(Debug)]
pub struct ListenerContext {
    identity: StreamIdentity,
    inbound: InboundState,
    outbound: OutboundState,
    failure: IoFailure,
    body_capacity: usize,
    response_status: Option<CompletionFuture<()>>,
}

impl ListenerContext {
    pub fn new(identity: StreamIdentity, body_capacity: usize) -> Self {
        Self {
            identity,
            inbound: InboundState::ReceivingHeaders,
            outbound: OutboundState::SendingHeaders,
            failure: IoFailure::new(),
            body_capacity,
            response_status: None,
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

    /// Handles a complete request header block.
    ///
    /// Returns the request to dispatch, or `None` if a header block was not
    /// expected here.
    pub fn on_headers(&mut self, head: MessageHead, end_stream: bool) -> Option<HttpMessage> {
        let body = self.inbound.on_headers(&self.identity, &head, end_stream, self.body_capacity, &self.failure)?;

        let (resolver, completion) = CompletionFuture::channel();
        self.response_status = Some(resolver);
        trace!(stream_id = %self.identity, end_stream, "request head released");
        Some(HttpMessage::new(head, body, self.failure.clone()).with_response_status(completion))
    }

    pub fn on_data(&mut self, data: Bytes, end_stream: bool) -> Disposition {
        self.inbound.on_data(&self.identity, data, end_stream);
        self.disposition()
    }

    pub fn on_trailers(&mut self, trailers: HeaderMap) -> Disposition {
        self.inbound.on_trailers(&self.identity, trailers);
        self.disposition()
    }

    /// The peer reset the stream. Nothing more goes on the wire for it.
    pub fn on_reset(&mut self, code: u64) -> Disposition {
        self.fail(TransportError::Reset { code });
        Disposition::Retire
    }

    /// Ready when the next request body chunk can be queued.
    pub fn poll_body_ready(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        self.inbound.poll_ready(cx)
    }

    /// Writes an interim `1xx` response, such as `100 Continue`.
    pub fn send_interim<C: Channel + ?Sized>(&mut self, channel: &mut C, status: StatusCode) -> Disposition {
        match self.outbound.send_interim(channel, &self.identity, status) {
            Ok(_) => Disposition::Continue,
            Err(e) => self.write_failed(ErrorPhase::BeforeResponseInitiation, &e),
        }
    }

    /// Writes the response header block.
    ///
    /// A failed write does not move on to the body: the exchange ends with
    /// `remote closed before response initiation`.
    pub fn send_headers<C: Channel + ?Sized>(&mut self, channel: &mut C, head: ResponseHead, payload: PayloadSize) -> Disposition {
        match self.outbound.send_headers(channel, &self.identity, MessageHead::from(head), payload) {
            Ok(progress) => self.on_progress(progress),
            Err(e) => self.write_failed(ErrorPhase::BeforeResponseInitiation, &e),
        }
    }

    pub fn send_body<C: Channel + ?Sized>(&mut self, channel: &mut C, item: PayloadItem) -> Disposition {
        match self.outbound.send_body(channel, &self.identity, item) {
            Ok(progress) => self.on_progress(progress),
            Err(e) => self.write_failed(ErrorPhase::WritingResponseBody, &e),
        }
    }

    /// The stream has been idle for too long.
    ///
    /// A request whose body is still arriving gets a best-effort
    /// `408 Request Timeout` before the stream is torn down. Once both
    /// directions have ended this is a no-op.
    pub fn handle_timeout<C: Channel + ?Sized>(&mut self, channel: &mut C) -> Disposition {
        let phase = match (&self.outbound, &self.inbound) {
            (OutboundState::Completed | OutboundState::Failed, inbound) if inbound.is_terminal() => {
                trace!(stream_id = %self.identity, "timeout after exchange ended, ignore");
                return self.disposition();
            }
            (OutboundState::Completed | OutboundState::Failed, _) => ErrorPhase::ReadingRequestBody,
            (OutboundState::SendingHeaders, InboundState::ReceivingEntityBody { .. }) => {
                self.send_request_timeout(channel);
                ErrorPhase::ReadingRequestBody
            }
            (OutboundState::SendingHeaders, InboundState::ReceivingHeaders) => ErrorPhase::ReadingRequestHeaders,
            (OutboundState::SendingHeaders, _) => ErrorPhase::WritingResponseHeaders,
            (OutboundState::SendingEntityBody { .. }, _) => ErrorPhase::WritingResponseBody,
        };

        self.fail(TransportError::idle_timeout(phase));
        Disposition::Abort
    }

    /// The connection went away without a protocol-level close.
    ///
    /// A response in flight fails with a remote-closed error; an exchange
    /// whose request was still arriving is reported as cancelled. Once both
    /// directions have ended this is a no-op.
    pub fn handle_channel_closed(&mut self) -> Disposition {
        let error = match (&self.outbound, &self.inbound) {
            (OutboundState::Completed | OutboundState::Failed, inbound) if inbound.is_terminal() => {
                trace!(stream_id = %self.identity, "channel closed after exchange ended, ignore");
                return self.disposition();
            }
            (OutboundState::Completed | OutboundState::Failed, _) => TransportError::remote_closed(ErrorPhase::ReadingRequestBody),
            (OutboundState::SendingHeaders, InboundState::ReceivingHeaders) => TransportError::cancelled(ErrorPhase::ReadingRequestHeaders),
            (OutboundState::SendingHeaders, InboundState::ReceivingEntityBody { .. }) => TransportError::cancelled(ErrorPhase::ReadingRequestBody),
            (OutboundState::SendingHeaders, _) => TransportError::remote_closed(ErrorPhase::BeforeResponseInitiation),
            (OutboundState::SendingEntityBody { .. }, _) => TransportError::remote_closed(ErrorPhase::WritingResponseBody),
        };

        self.fail(error);
        Disposition::Abort
    }

    /// Ends the exchange with `error`, used for protocol errors and local
    /// cancellation.
    pub fn abort(&mut self, error: TransportError) -> Disposition {
        self.fail(error);
        Disposition::Abort
    }

    /// What the connection driver should do with this stream now.
    pub fn disposition(&self) -> Disposition {
        match (&self.inbound, &self.outbound) {
            (InboundState::Failed, _) | (_, OutboundState::Failed) => Disposition::Abort,
            (InboundState::Received, OutboundState::Completed) => Disposition::Retire,
            _ => Disposition::Continue,
        }
    }

    fn on_progress(&mut self, progress: Progress) -> Disposition {
        if progress == Progress::Finished {
            if let Some(resolver) = &self.response_status {
                resolver.notify_success(());
            }
            trace!(stream_id = %self.identity, "response completed");
        }
        self.disposition()
    }

    fn write_failed(&mut self, phase: ErrorPhase, cause: &SendError) -> Disposition {
        error!(stream_id = %self.identity, cause = %cause, "failed to write response");
        self.fail(TransportError::remote_closed(phase));
        Disposition::Abort
    }

    fn send_request_timeout<C: Channel + ?Sized>(&mut self, channel: &mut C) {
        let mut response = Response::new(());
        *response.status_mut() = StatusCode::REQUEST_TIMEOUT;
        response.headers_mut().insert(header::CONNECTION, HeaderValue::from_static("close"));

        if let Err(e) = self.outbound.send_headers(channel, &self.identity, MessageHead::from(response), PayloadSize::Empty) {
            trace!(stream_id = %self.identity, cause = %e, "could not send request timeout response");
        }
    }

    /// Records `error` against both directions and the paired completion.
    /// Only the first failure is kept.
    fn fail(&mut self, error: TransportError) {
        let inbound_failed = self.inbound.fail(&self.identity, &error);
        let outbound_failed = self.outbound.fail();
        if !inbound_failed && !outbound_failed {
            return;
        }

        self.failure.set(error.clone());
        error!(stream_id = %self.identity, cause = %error, "exchange failed");
        if let Some(resolver) = &self.response_status {
            resolver.notify_error(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use http::{Method, Request};
    use http_body_util::BodyExt;

    use super::*;
    use crate::mock::RecordingChannel;
    use crate::protocol::{ConnectionId, OutboundFrame, RequestHeader, StreamId};

    fn context() -> ListenerContext {
        ListenerContext::new(StreamIdentity::new(ConnectionId::next(), Some(StreamId::new(1))), 8)
    }

    fn post() -> MessageHead {
        RequestHeader::from(Request::builder().method(Method::POST).uri("/upload").body(()).unwrap()).into()
    }

    fn ok() -> ResponseHead {
        Response::builder().status(StatusCode::OK).body(()).unwrap()
    }

    #[tokio::test]
    async fn single_chunk_round_trip() {
        let mut ctx = context();
        let mut channel = RecordingChannel::new();

        let mut request = ctx.on_headers(post(), false).unwrap();
        assert_eq!(ctx.on_data(Bytes::from_static(b"hello"), true), Disposition::Continue);
        assert_eq!(&request.take_body().collect().await.unwrap().to_bytes()[..], b"hello");
        let status = request.take_response_status().unwrap();

        assert_eq!(ctx.send_headers(&mut channel, ok(), PayloadSize::Length(2)), Disposition::Continue);
        assert_eq!(ctx.send_body(&mut channel, PayloadItem::last(Bytes::from_static(b"ok"))), Disposition::Retire);

        let frames = channel.frames();
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], OutboundFrame::Headers { .. }));
        assert!(matches!(&frames[1], OutboundFrame::Data { end_stream: true, data, .. } if &data[..] == b"ok"));
        assert!(status.await.is_ok());
    }

    #[tokio::test]
    async fn trailers_follow_unterminated_data() {
        let mut ctx = context();
        let mut channel = RecordingChannel::new();
        let mut request = ctx.on_headers(post(), true).unwrap();

        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", HeaderValue::from_static("abc"));

        ctx.send_headers(&mut channel, ok(), PayloadSize::Chunked);
        let disposition = ctx.send_body(&mut channel, PayloadItem::last_with_trailers(Bytes::from_static(b"tail"), trailers));
        assert_eq!(disposition, Disposition::Retire);

        let frames = channel.frames();
        assert_eq!(frames.len(), 3);
        assert!(matches!(frames[1], OutboundFrame::Data { end_stream: false, .. }));
        assert!(matches!(&frames[2], OutboundFrame::Trailers { trailers, .. } if trailers["x-checksum"] == "abc"));
        assert!(request.take_response_status().unwrap().await.is_ok());
    }

    #[tokio::test]
    async fn header_write_failure_never_reaches_body() {
        let mut ctx = context();
        let mut channel = RecordingChannel::rejecting();
        let mut request = ctx.on_headers(post(), true).unwrap();

        assert_eq!(ctx.send_headers(&mut channel, ok(), PayloadSize::Length(2)), Disposition::Abort);
        assert!(matches!(ctx.outbound(), OutboundState::Failed));

        let error = request.take_response_status().unwrap().await.unwrap_err();
        assert_eq!(error.to_string(), "remote closed before response initiation");

        ctx.send_body(&mut channel, PayloadItem::eof());
        assert!(channel.frames().is_empty());
    }

    #[tokio::test]
    async fn timeout_then_closure_resolves_once() {
        let mut ctx = context();
        let mut channel = RecordingChannel::new();
        let mut request = ctx.on_headers(post(), true).unwrap();

        assert_eq!(ctx.handle_timeout(&mut channel), Disposition::Abort);
        ctx.handle_channel_closed();
        ctx.handle_timeout(&mut channel);

        let error = request.take_response_status().unwrap().await.unwrap_err();
        assert!(error.is_timeout());
        assert_eq!(error.phase(), Some(ErrorPhase::WritingResponseHeaders));
        assert!(matches!(request.io_error(), Some(TransportError::IdleTimeout { .. })));
    }

    #[tokio::test]
    async fn inbound_advances_while_response_streams() {
        let mut ctx = context();
        let mut channel = RecordingChannel::new();
        let mut request = ctx.on_headers(post(), false).unwrap();
        let mut body = request.take_body();

        ctx.send_headers(&mut channel, ok(), PayloadSize::Chunked);
        ctx.send_body(&mut channel, PayloadItem::Chunk(Bytes::from_static(b"pong-1")));

        assert_eq!(ctx.on_data(Bytes::from_static(b"ping-2"), false), Disposition::Continue);
        assert!(matches!(ctx.outbound(), OutboundState::SendingEntityBody { .. }));
        assert!(matches!(ctx.inbound(), InboundState::ReceivingEntityBody { .. }));

        assert_eq!(ctx.on_data(Bytes::new(), true), Disposition::Continue);
        assert!(matches!(ctx.inbound(), InboundState::Received));
        assert!(matches!(ctx.outbound(), OutboundState::SendingEntityBody { .. }));

        assert_eq!(ctx.send_body(&mut channel, PayloadItem::eof()), Disposition::Retire);
        assert_eq!(&body.frame().await.unwrap().unwrap().into_data().unwrap()[..], b"ping-2");
    }

    #[tokio::test]
    async fn closure_while_reading_body_is_a_cancellation() {
        let mut ctx = context();
        let mut request = ctx.on_headers(post(), false).unwrap();

        assert_eq!(ctx.handle_channel_closed(), Disposition::Abort);
        let error = request.take_body().collect().await.unwrap_err();
        assert!(error.is_cancelled());
        assert_eq!(error.phase(), Some(ErrorPhase::ReadingRequestBody));
    }

    #[test]
    fn timeout_while_reading_body_answers_408() {
        let mut ctx = context();
        let mut channel = RecordingChannel::new();
        let _request = ctx.on_headers(post(), false).unwrap();

        ctx.handle_timeout(&mut channel);
        let frames = channel.frames();
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            OutboundFrame::Headers { head, payload, .. } => {
                assert_eq!(head.status(), Some(StatusCode::REQUEST_TIMEOUT));
                assert_eq!(head.headers()[header::CONNECTION], "close");
                assert_eq!(*payload, PayloadSize::Empty);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn duplicate_headers_are_ignored() {
        let mut ctx = context();
        let mut channel = RecordingChannel::new();
        let _request = ctx.on_headers(post(), true).unwrap();

        ctx.send_headers(&mut channel, ok(), PayloadSize::Chunked);
        ctx.send_headers(&mut channel, ok(), PayloadSize::Chunked);
        assert_eq!(channel.frames().len(), 1);
    }

    #[test]
    fn completed_exchange_ignores_closure() {
        let mut ctx = context();
        let mut channel = RecordingChannel::new();
        let mut request = ctx.on_headers(post(), true).unwrap();
        let mut status = request.take_response_status().unwrap();

        ctx.send_headers(&mut channel, ok(), PayloadSize::Empty);
        assert_eq!(ctx.handle_channel_closed(), Disposition::Retire);
        assert_eq!(ctx.handle_timeout(&mut channel), Disposition::Retire);
        assert!(matches!(status.try_take(), Some(Ok(()))));
        assert!(request.io_error().is_none());
    }

    #[tokio::test]
    async fn body_write_failure_names_the_body_phase() {
        let mut ctx = context();
        let mut channel = RecordingChannel::new();
        let mut request = ctx.on_headers(post(), true).unwrap();

        ctx.send_headers(&mut channel, ok(), PayloadSize::Chunked);
        channel.reject_writes();
        assert_eq!(ctx.send_body(&mut channel, PayloadItem::Chunk(Bytes::from_static(b"lost"))), Disposition::Abort);

        let error = request.take_response_status().unwrap().await.unwrap_err();
        assert_eq!(error.phase(), Some(ErrorPhase::WritingResponseBody));
        assert_eq!(channel.frames().len(), 1);
    }

    #[test]
    fn peer_reset_retires_the_stream() {
        let mut ctx = context();
        let mut request = ctx.on_headers(post(), false).unwrap();

        assert_eq!(ctx.on_reset(0x8), Disposition::Retire);
        assert!(matches!(request.take_response_status().unwrap().try_take(), Some(Err(TransportError::Reset { code: 0x8 }))));
    }
}

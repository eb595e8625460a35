use std::fmt::Display;
use std::future::poll_fn;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::channel::mpsc;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::task::noop_waker_ref;
use futures::{SinkExt, StreamExt};
use http::Request;
use http_body::{Body, Frame};
use http_body_util::BodyExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tracing::{debug, error, info, warn};

use crate::codec::Role;
use crate::config::{ProtocolVersion, TransportConfig};
use crate::connection::{Channel, FramedChannel, StreamTable, answer_control, idle, next_deadline, payload_item, release_credit, wants_close};
use crate::future::{Completion, CompletionFuture};
use crate::protocol::{
    ConnectionId, ControlFrame, HttpError, HttpMessage, InboundFrame, MessageHead, OutboundFrame, ParseError, PayloadItem, PayloadSize,
    RequestHeader, StreamId, StreamIdentity, TransportError,
};
use crate::state::{Disposition, SenderContext};

struct Outgoing<B> {
    request: Request<B>,
    response: CompletionFuture<HttpMessage>,
}

/// The next frame of a request body.
struct BodyFrame<B: Body> {
    stream: StreamId,
    body: B,
    frame: Option<Result<Frame<Bytes>, B::Error>>,
}

enum Event<B: Body> {
    Body(BodyFrame<B>),
    BodyReady,
    Request(Option<Outgoing<B>>),
    Read(Result<usize, ParseError>),
    Idle,
}

/// Creates a client connection over `reader` and `writer`.
///
/// The returned [`ClientConnection`] must be driven with
/// [`ClientConnection::run`] for requests queued through the [`SendRequest`]
/// handle to make progress.
pub fn handshake<R, W, B>(reader: R, writer: W, config: &TransportConfig) -> (SendRequest<B>, ClientConnection<R, W, B>) {
    let capacity = config.max_concurrent_streams.max(1);
    let (sender, requests) = mpsc::channel(capacity);
    let first_stream = match config.version {
        ProtocolVersion::Http11 | ProtocolVersion::Http3 => 0,
        ProtocolVersion::Http2 => 1,
    };

    let connection = ClientConnection {
        id: ConnectionId::next(),
        reader,
        writer,
        channel: FramedChannel::with_capacity(config.codec(Role::Client), 8 * 1024),
        streams: StreamTable::new(),
        requests,
        idle_timeout: config.idle_timeout(),
        max_concurrent_streams: capacity,
        body_capacity: config.body_buffer_chunks.max(1),
        next_stream: first_stream,
        pending: None,
        requests_closed: false,
        read_closed: false,
        eof_drained: false,
        closing: false,
    };
    (SendRequest { sender }, connection)
}

/// Queues requests onto a [`ClientConnection`].
#[derive(Debug)]
pub struct SendRequest<B> {
    sender: mpsc::Sender<Outgoing<B>>,
}

impl<B> Clone for SendRequest<B> {
    fn clone(&self) -> Self {
        Self { sender: self.sender.clone() }
    }
}

impl<B> SendRequest<B> {
    /// Queues `request` and returns the completion of its exchange.
    ///
    /// The completion resolves once the response head arrives; its body keeps
    /// streaming afterwards. If the connection is already gone it resolves to
    /// [`TransportError::Abandoned`].
    pub async fn send_request(&mut self, request: Request<B>) -> Completion<HttpMessage> {
        let (response, completion) = CompletionFuture::channel();
        if let Err(e) = self.sender.send(Outgoing { request, response }).await {
            debug!(cause = %e, "connection is gone, request dropped");
        }
        completion
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl<B> std::fmt::Debug for Outgoing<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outgoing").field("method", self.request.method()).field("uri", self.request.uri()).finish_non_exhaustive()
    }
}

/// Drives the client side of one connection.
///
/// HTTP/1.1 carries one exchange at a time; HTTP/2 and HTTP/3 open a new
/// stream per request up to the configured limit, queueing the rest.
#[derive(Debug)]
pub struct ClientConnection<R, W, B> {
    id: ConnectionId,
    reader: R,
    writer: W,
    channel: FramedChannel,
    streams: StreamTable<SenderContext>,
    requests: mpsc::Receiver<Outgoing<B>>,
    idle_timeout: Option<Duration>,
    max_concurrent_streams: usize,
    body_capacity: usize,
    next_stream: u64,
    pending: Option<InboundFrame>,
    requests_closed: bool,
    read_closed: bool,
    eof_drained: bool,
    closing: bool,
}

impl<R, W, B> ClientConnection<R, W, B>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    B: Body<Data = Bytes> + Send + Unpin + 'static,
    B::Error: Display,
{
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Runs until every [`SendRequest`] handle is dropped and the exchanges in
    /// flight are over, or until the connection fails.
    pub async fn run(mut self) -> Result<(), HttpError> {
        info!(connection = %self.id, version = ?self.channel.version(), "start client connection");
        self.channel.write_frame(OutboundFrame::Handshake)?;

        let mut bodies: FuturesUnordered<BoxFuture<'static, BodyFrame<B>>> = FuturesUnordered::new();
        let mut deadline = next_deadline(self.idle_timeout);

        loop {
            if let Err(e) = self.decode_buffered() {
                self.on_parse_error(&e);
                self.channel.flush(&mut self.writer).await?;
                return Err(e.into());
            }

            if self.channel.has_pending_writes() {
                deadline = next_deadline(self.idle_timeout);
            }
            if let Err(e) = self.channel.flush(&mut self.writer).await {
                error!(connection = %self.id, cause = %e, "failed to write to connection");
                self.on_channel_closed();
                return Err(e.into());
            }

            if self.is_finished() {
                info!(connection = %self.id, "client connection finished");
                return Ok(());
            }

            let accepting = !self.requests_closed && !self.closing && !self.read_closed && self.has_capacity();
            let reading = !self.read_closed && self.pending.is_none();
            let event = select! {
                biased;
                Some(frame) = bodies.next(), if !bodies.is_empty() => Event::Body(frame),
                () = poll_fn(|cx| poll_pending(&self.streams, self.pending.as_ref(), cx)), if self.pending.is_some() => Event::BodyReady,
                read = self.channel.fill(&mut self.reader), if reading => Event::Read(read),
                request = self.requests.next(), if accepting => Event::Request(request),
                () = idle(deadline) => Event::Idle,
            };

            match event {
                Event::Body(frame) => self.on_body_frame(frame, &mut bodies),
                Event::BodyReady => {
                    if let Some(frame) = self.pending.take() {
                        self.dispatch(frame);
                    }
                }
                Event::Request(Some(outgoing)) => {
                    self.start(outgoing, &mut bodies);
                    deadline = next_deadline(self.idle_timeout);
                }
                Event::Request(None) => {
                    debug!(connection = %self.id, "every request handle dropped");
                    self.requests_closed = true;
                }
                Event::Read(Ok(0)) => {
                    info!(connection = %self.id, "server closed the connection");
                    self.read_closed = true;
                }
                Event::Read(Ok(_)) => deadline = next_deadline(self.idle_timeout),
                Event::Read(Err(e)) => {
                    error!(connection = %self.id, cause = %e, "failed to read from connection");
                    self.read_closed = true;
                    self.on_channel_closed();
                    return Err(e.into());
                }
                Event::Idle => {
                    self.on_idle();
                    deadline = None;
                }
            }
        }
    }

    fn is_finished(&self) -> bool {
        (self.requests_closed || self.closing || self.read_closed) && self.streams.is_empty()
    }

    fn has_capacity(&self) -> bool {
        if self.channel.is_multiplexed() { self.streams.len() < self.max_concurrent_streams } else { self.streams.is_empty() }
    }

    fn allocate_stream(&mut self) -> StreamId {
        let stream = StreamId::new(self.next_stream);
        self.next_stream += match self.channel.version() {
            ProtocolVersion::Http11 => 0,
            ProtocolVersion::Http2 => 2,
            ProtocolVersion::Http3 => 4,
        };
        stream
    }

    fn start(&mut self, outgoing: Outgoing<B>, bodies: &mut FuturesUnordered<BoxFuture<'static, BodyFrame<B>>>) {
        let Outgoing { request, response } = outgoing;
        let stream = self.allocate_stream();
        let identity = StreamIdentity::new(self.id, self.channel.is_multiplexed().then_some(stream));
        debug!(stream_id = %identity, method = %request.method(), uri = %request.uri(), "send request");

        let (parts, body) = request.into_parts();
        let payload = PayloadSize::from(body.size_hint());
        let mut ctx = SenderContext::new(identity, self.body_capacity, response);
        let disposition = ctx.send_headers(&mut self.channel, RequestHeader::from(parts), payload);
        self.streams.insert(stream, ctx);

        if disposition == Disposition::Continue && !payload.is_empty() {
            bodies.push(next_frame(stream, body));
        } else {
            self.settle(stream, disposition);
        }
    }

    fn decode_buffered(&mut self) -> Result<(), ParseError> {
        while self.pending.is_none() {
            let frame = if self.read_closed { self.decode_eof() } else { self.channel.decode()? };
            let Some(frame) = frame else {
                return Ok(());
            };

            match frame {
                InboundFrame::Data { stream, .. } if !self.is_ready(stream) => {
                    debug!(stream_id = %stream, "response body queue is full, pause reading");
                    self.pending = Some(frame);
                }
                frame => self.dispatch(frame),
            }
        }
        Ok(())
    }

    /// Decodes what the server left behind once it stopped sending, then
    /// fails the exchanges still waiting for their response.
    fn decode_eof(&mut self) -> Option<InboundFrame> {
        if self.eof_drained {
            return None;
        }
        match self.channel.decode_eof() {
            Ok(Some(frame)) => return Some(frame),
            Ok(None) => {}
            Err(e) => debug!(connection = %self.id, cause = %e, "discard partial frame at end of input"),
        }
        self.eof_drained = true;
        self.on_channel_closed();
        None
    }

    fn is_ready(&self, stream: StreamId) -> bool {
        let mut cx = Context::from_waker(noop_waker_ref());
        poll_pending_stream(&self.streams, stream, &mut cx).is_ready()
    }

    fn dispatch(&mut self, frame: InboundFrame) {
        match frame {
            InboundFrame::Headers { stream, head, end_stream } => self.on_headers(stream, head, end_stream),
            InboundFrame::Data { stream, data, end_stream } => {
                let size = data.len();
                let disposition = self.streams.with_stream(stream, |ctx| ctx.on_data(data, end_stream));
                release_credit(&mut self.channel, stream, size, disposition.is_some() && !end_stream);
                if let Some(disposition) = disposition {
                    self.settle(stream, disposition);
                }
            }
            InboundFrame::Trailers { stream, trailers } => {
                if let Some(disposition) = self.streams.with_stream(stream, |ctx| ctx.on_trailers(trailers)) {
                    self.settle(stream, disposition);
                }
            }
            InboundFrame::Reset { stream, code } => {
                debug!(stream_id = %stream, code, "server reset stream");
                if let Some(disposition) = self.streams.with_stream(stream, |ctx| ctx.on_reset(code)) {
                    self.settle(stream, disposition);
                }
            }
            InboundFrame::Malformed { stream, reason } => self.on_malformed(stream, &reason),
            InboundFrame::Control(control) => {
                if answer_control(&mut self.channel, self.id, control) {
                    self.closing = true;
                }
            }
        }
    }

    /// Fails the one exchange whose response head could not be decoded.
    fn on_malformed(&mut self, stream: StreamId, reason: &str) {
        warn!(stream_id = %stream, reason, "reject malformed response");
        if let Some(mut ctx) = self.streams.remove(stream) {
            ctx.abort(TransportError::protocol(reason));
        }
        if !self.channel.is_multiplexed() {
            self.closing = true;
            return;
        }
        let code = self.channel.malformed_code();
        if let Err(e) = self.channel.write_frame(OutboundFrame::Reset { stream, code }) {
            debug!(stream_id = %stream, cause = %e, "could not reset malformed stream");
        }
    }

    fn on_headers(&mut self, stream: StreamId, head: MessageHead, end_stream: bool) {
        if !self.channel.is_multiplexed() && !head.is_informational() && wants_close(&head) {
            debug!(connection = %self.id, "server asked to close after this response");
            self.closing = true;
        }
        if let Some(disposition) = self.streams.with_stream(stream, |ctx| ctx.on_headers(head, end_stream)) {
            self.settle(stream, disposition);
        }
    }

    fn on_body_frame(&mut self, frame: BodyFrame<B>, bodies: &mut FuturesUnordered<BoxFuture<'static, BodyFrame<B>>>) {
        let BodyFrame { stream, body, frame } = frame;
        let item = match frame {
            None => PayloadItem::eof(),
            Some(Ok(frame)) => {
                let Some(item) = payload_item(&body, frame) else {
                    bodies.push(next_frame(stream, body));
                    return;
                };
                item
            }
            Some(Err(e)) => {
                error!(stream_id = %stream, cause = %e, "request body failed");
                let error = TransportError::protocol(format!("request body error: {e}"));
                if let Some(disposition) = self.streams.with_stream(stream, |ctx| ctx.abort(error)) {
                    self.settle(stream, disposition);
                }
                return;
            }
        };

        let last = item.is_last();
        let Some(disposition) = self.streams.with_stream(stream, |ctx| ctx.send_body(&mut self.channel, item)) else {
            return;
        };
        if disposition == Disposition::Continue && !last {
            bodies.push(next_frame(stream, body));
        } else {
            self.settle(stream, disposition);
        }
    }

    fn settle(&mut self, stream: StreamId, disposition: Disposition) {
        match disposition {
            Disposition::Continue => {}
            Disposition::Retire => {
                self.streams.remove(stream);
            }
            Disposition::Abort => {
                self.streams.remove(stream);
                if !self.channel.is_multiplexed() {
                    self.closing = true;
                    return;
                }
                let code = self.channel.cancel_code();
                if let Err(e) = self.channel.write_frame(OutboundFrame::Reset { stream, code }) {
                    debug!(stream_id = %stream, cause = %e, "could not reset stream");
                }
            }
        }
    }

    /// No response can arrive any more, every exchange still waiting fails.
    fn on_channel_closed(&mut self) {
        let outcomes = self.streams.for_each(SenderContext::handle_channel_closed);
        for (stream, disposition) in outcomes {
            self.settle(stream, disposition);
        }
        self.closing = true;
    }

    fn on_idle(&mut self) {
        info!(connection = %self.id, live_streams = self.streams.len(), "idle timeout, close connection");
        let outcomes = self.streams.for_each(SenderContext::handle_timeout);
        for (stream, disposition) in outcomes {
            self.settle(stream, disposition);
        }
        // exchanges that were already over are forgotten as well
        for (stream, _) in self.streams.for_each(|_ctx| ()) {
            self.streams.remove(stream);
        }

        if self.channel.is_multiplexed() {
            let goaway = OutboundFrame::Control(ControlFrame::GoAway { last_stream: StreamId::CONNECTION, code: 0 });
            if let Err(e) = self.channel.write_frame(goaway) {
                debug!(connection = %self.id, cause = %e, "could not send goaway");
            }
        }
        self.closing = true;
    }

    fn on_parse_error(&mut self, e: &ParseError) {
        error!(connection = %self.id, cause = %e, "failed to decode inbound frame");

        if self.channel.is_multiplexed() {
            let code = self.channel.protocol_error_code();
            let goaway = OutboundFrame::Control(ControlFrame::GoAway { last_stream: StreamId::CONNECTION, code });
            if let Err(e) = self.channel.write_frame(goaway) {
                debug!(connection = %self.id, cause = %e, "could not send goaway");
            }
        }

        let reason = e.to_string();
        let outcomes = self.streams.for_each(|ctx| ctx.abort(TransportError::protocol(&reason)));
        for (stream, _) in outcomes {
            self.streams.remove(stream);
        }
        self.closing = true;
    }
}

fn next_frame<B>(stream: StreamId, mut body: B) -> BoxFuture<'static, BodyFrame<B>>
where
    B: Body<Data = Bytes> + Send + Unpin + 'static,
{
    Box::pin(async move {
        let frame = body.frame().await;
        BodyFrame { stream, body, frame }
    })
}

fn poll_pending(streams: &StreamTable<SenderContext>, pending: Option<&InboundFrame>, cx: &mut Context<'_>) -> Poll<()> {
    match pending.and_then(InboundFrame::stream) {
        Some(stream) => poll_pending_stream(streams, stream, cx),
        None => Poll::Ready(()),
    }
}

fn poll_pending_stream(streams: &StreamTable<SenderContext>, stream: StreamId, cx: &mut Context<'_>) -> Poll<()> {
    streams.with_stream(stream, |ctx| ctx.poll_body_ready(cx)).unwrap_or(Poll::Ready(()))
}

use std::error::Error;
use std::fmt::Display;
use std::future::poll_fn;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::task::noop_waker_ref;
use http::{HeaderValue, Request, Response, StatusCode, header};
use http_body::{Body, Frame};
use http_body_util::BodyExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tracing::{debug, error, info, warn};

use crate::codec::Role;
use crate::config::TransportConfig;
use crate::connection::{Channel, FramedChannel, StreamTable, answer_control, idle, next_deadline, payload_item, release_credit, wants_close};
use crate::handler::Handler;
use crate::protocol::body::MessageBody;
use crate::protocol::{
    ConnectionId, ControlFrame, HttpError, InboundFrame, MessageHead, OutboundFrame, ParseError, PayloadItem, PayloadSize, RequestHeader, ResponseHead,
    StreamId, StreamIdentity, TransportError,
};
use crate::state::{Disposition, ListenerContext};

type HandlerError = Box<dyn Error + Send + Sync>;

/// Work running next to the connection on the same task.
enum Task<B: Body> {
    /// The application produced a response, or failed to.
    Handled { stream: StreamId, response: Result<Response<B>, HandlerError> },
    /// The next frame of a response body is ready.
    BodyFrame { stream: StreamId, body: B, frame: Option<Result<Frame<Bytes>, B::Error>> },
    /// The exchange's completion resolved.
    Finished { stream: StreamId, arrived_at: Instant, outcome: Result<(), TransportError> },
}

enum Event<B: Body> {
    Task(Task<B>),
    BodyReady,
    Read(Result<usize, ParseError>),
    Idle,
}

/// Serves one HTTP connection.
///
/// Frames are decoded from the reader, every stream gets a
/// [`ListenerContext`] in the connection's [`StreamTable`], and requests are
/// handed to the [`Handler`] as soon as their head is complete. Handlers and
/// response bodies run concurrently on the task that drives
/// [`ServerConnection::process`], so per-stream state is only ever touched
/// from that task.
///
/// Reading from the wire pauses while the body queue of the stream the next
/// data frame belongs to is full.
#[derive(Debug)]
pub struct ServerConnection<R, W> {
    id: ConnectionId,
    reader: R,
    writer: W,
    channel: FramedChannel,
    streams: StreamTable<ListenerContext>,
    idle_timeout: Option<Duration>,
    max_concurrent_streams: usize,
    body_capacity: usize,
    server_name: Option<HeaderValue>,
    pending: Option<InboundFrame>,
    last_stream: StreamId,
    close_after_response: bool,
    read_closed: bool,
    eof_drained: bool,
    draining: bool,
    closing: bool,
}

impl<R, W> ServerConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, config: &TransportConfig) -> Self {
        Self {
            id: ConnectionId::next(),
            reader,
            writer,
            channel: FramedChannel::with_capacity(config.codec(Role::Server), 8 * 1024),
            streams: StreamTable::new(),
            idle_timeout: config.idle_timeout(),
            max_concurrent_streams: config.max_concurrent_streams.max(1),
            body_capacity: config.body_buffer_chunks.max(1),
            server_name: config.server_name.as_deref().and_then(|name| HeaderValue::from_str(name).ok()),
            pending: None,
            last_stream: StreamId::CONNECTION,
            close_after_response: false,
            read_closed: false,
            eof_drained: false,
            draining: false,
            closing: false,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), HttpError>
    where
        H: Handler,
        H::RespBody: Body<Data = Bytes> + Send + Unpin,
        <H::RespBody as Body>::Error: Display,
    {
        info!(connection = %self.id, version = ?self.channel.version(), "start serving connection");
        self.channel.write_frame(OutboundFrame::Handshake)?;

        let handler = &*handler;
        let mut tasks: FuturesUnordered<BoxFuture<'_, Task<H::RespBody>>> = FuturesUnordered::new();
        let mut deadline = next_deadline(self.idle_timeout);

        loop {
            if let Err(e) = self.decode_buffered(handler, &mut tasks) {
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
                info!(connection = %self.id, "connection finished");
                return Ok(());
            }

            let reading = !self.read_closed && !self.closing && self.pending.is_none();
            let event = select! {
                biased;
                Some(task) = tasks.next(), if !tasks.is_empty() => Event::Task(task),
                () = poll_fn(|cx| poll_pending(&self.streams, self.pending.as_ref(), cx)), if self.pending.is_some() => Event::BodyReady,
                read = self.channel.fill(&mut self.reader), if reading => Event::Read(read),
                () = idle(deadline) => Event::Idle,
            };

            match event {
                Event::Task(task) => self.on_task(task, &mut tasks),
                Event::BodyReady => {
                    if let Some(frame) = self.pending.take() {
                        self.dispatch(frame, handler, &mut tasks);
                    }
                }
                Event::Read(Ok(0)) => {
                    info!(connection = %self.id, "peer closed the connection");
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
        (self.read_closed || self.closing || self.draining) && self.streams.is_empty()
    }

    fn decode_buffered<'h, H>(&mut self, handler: &'h H, tasks: &mut FuturesUnordered<BoxFuture<'h, Task<H::RespBody>>>) -> Result<(), ParseError>
    where
        H: Handler,
        H::RespBody: Body<Data = Bytes> + Send + Unpin,
        <H::RespBody as Body>::Error: Display,
    {
        while self.pending.is_none() && !self.closing {
            let frame = if self.read_closed { self.decode_eof() } else { self.channel.decode()? };
            let Some(frame) = frame else {
                return Ok(());
            };

            match frame {
                InboundFrame::Data { stream, .. } if !self.is_ready(stream) => {
                    debug!(stream_id = %stream, "request body queue is full, pause reading");
                    self.pending = Some(frame);
                }
                frame => self.dispatch(frame, handler, tasks),
            }
        }
        if self.closing && self.read_closed && !self.eof_drained {
            self.end_of_input();
        }
        Ok(())
    }

    /// Decodes what the peer left behind once it stopped sending, then fails
    /// the streams still waiting for request bytes.
    fn decode_eof(&mut self) -> Option<InboundFrame> {
        if self.eof_drained {
            return None;
        }
        match self.channel.decode_eof() {
            Ok(Some(frame)) => return Some(frame),
            Ok(None) => {}
            Err(e) => debug!(connection = %self.id, cause = %e, "discard partial frame at end of input"),
        }
        self.end_of_input();
        None
    }

    fn end_of_input(&mut self) {
        self.eof_drained = true;
        self.on_channel_closed();
    }

    fn is_ready(&self, stream: StreamId) -> bool {
        let mut cx = Context::from_waker(noop_waker_ref());
        poll_pending_stream(&self.streams, stream, &mut cx).is_ready()
    }

    fn dispatch<'h, H>(&mut self, frame: InboundFrame, handler: &'h H, tasks: &mut FuturesUnordered<BoxFuture<'h, Task<H::RespBody>>>)
    where
        H: Handler,
        H::RespBody: Body<Data = Bytes> + Send + Unpin,
        <H::RespBody as Body>::Error: Display,
    {
        match frame {
            InboundFrame::Headers { stream, head, end_stream } => self.on_headers(stream, head, end_stream, handler, tasks),
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
                debug!(stream_id = %stream, code, "peer reset stream");
                if let Some(disposition) = self.streams.with_stream(stream, |ctx| ctx.on_reset(code)) {
                    self.settle(stream, disposition);
                }
            }
            InboundFrame::Malformed { stream, reason } => self.on_malformed(stream, &reason),
            InboundFrame::Control(control) => {
                if answer_control(&mut self.channel, self.id, control) {
                    self.draining = true;
                }
            }
        }
    }

    /// Rejects one stream whose header block could not be turned into a
    /// message. The other streams of the connection carry on.
    fn on_malformed(&mut self, stream: StreamId, reason: &str) {
        warn!(stream_id = %stream, reason, "reject malformed stream");
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

    fn on_headers<'h, H>(
        &mut self,
        stream: StreamId,
        head: MessageHead,
        end_stream: bool,
        handler: &'h H,
        tasks: &mut FuturesUnordered<BoxFuture<'h, Task<H::RespBody>>>,
    ) where
        H: Handler,
        H::RespBody: Body<Data = Bytes> + Send + Unpin,
        <H::RespBody as Body>::Error: Display,
    {
        if self.streams.contains(stream) {
            self.streams.with_stream(stream, |ctx| ctx.on_headers(head, end_stream));
            return;
        }

        let multiplexed = self.channel.is_multiplexed();
        if multiplexed && (self.draining || self.streams.len() >= self.max_concurrent_streams) {
            warn!(stream_id = %stream, live_streams = self.streams.len(), draining = self.draining, "refuse new stream");
            let code = self.channel.refused_code();
            if let Err(e) = self.channel.write_frame(OutboundFrame::Reset { stream, code }) {
                debug!(stream_id = %stream, cause = %e, "could not refuse stream");
            }
            return;
        }

        let identity = StreamIdentity::new(self.id, multiplexed.then_some(stream));
        let mut ctx = ListenerContext::new(identity, self.body_capacity);
        let Some(mut message) = ctx.on_headers(head, end_stream) else {
            return;
        };

        if !multiplexed && wants_close(message.head()) {
            self.close_after_response = true;
        }
        let expects_continue = message.head().as_request().is_some_and(RequestHeader::expects_continue);
        let status = message.take_response_status();
        let arrived_at = message.arrived_at();

        let request = match message.into_request() {
            Ok(request) => request,
            Err(_message) => {
                let disposition = ctx.abort(TransportError::protocol("peer sent a response head to a server"));
                self.streams.insert(stream, ctx);
                self.settle(stream, disposition);
                return;
            }
        };

        if expects_continue && !end_stream {
            debug!(stream_id = %identity, "request expects continue, send 100 continue");
            ctx.send_interim(&mut self.channel, StatusCode::CONTINUE);
        }

        self.last_stream = self.last_stream.max(stream);
        self.streams.insert(stream, ctx);
        tasks.push(handle(handler, stream, request));
        if let Some(status) = status {
            tasks.push(Box::pin(async move { Task::Finished { stream, arrived_at, outcome: status.await } }));
        }
    }

    fn on_task<'h, B>(&mut self, task: Task<B>, tasks: &mut FuturesUnordered<BoxFuture<'h, Task<B>>>)
    where
        B: Body<Data = Bytes> + Send + Unpin + 'h,
        B::Error: Display,
    {
        match task {
            Task::Handled { stream, response: Ok(response) } => self.on_response(stream, response, tasks),
            Task::Handled { stream, response: Err(e) } => {
                error!(stream_id = %stream, cause = %e, "handler failed, answer internal server error");
                if !self.channel.is_multiplexed() {
                    self.close_after_response = true;
                }
                let head = self.error_response(StatusCode::INTERNAL_SERVER_ERROR);
                if let Some(disposition) = self.streams.with_stream(stream, |ctx| ctx.send_headers(&mut self.channel, head, PayloadSize::Empty)) {
                    self.settle(stream, disposition);
                }
            }
            Task::BodyFrame { stream, body, frame } => self.on_body_frame(stream, body, frame, tasks),
            Task::Finished { stream, arrived_at, outcome: Ok(()) } => {
                debug!(stream_id = %stream, elapsed_ms = arrived_at.elapsed().as_millis(), "response written");
            }
            Task::Finished { stream, outcome: Err(e), .. } => {
                debug!(stream_id = %stream, cause = %e, "exchange ended without a complete response");
            }
        }
    }

    fn on_response<'h, B>(&mut self, stream: StreamId, response: Response<B>, tasks: &mut FuturesUnordered<BoxFuture<'h, Task<B>>>)
    where
        B: Body<Data = Bytes> + Send + Unpin + 'h,
        B::Error: Display,
    {
        let (parts, body) = response.into_parts();
        let payload = PayloadSize::from(body.size_hint());
        let mut head = ResponseHead::from_parts(parts, ());
        self.decorate(&mut head);

        let Some(disposition) = self.streams.with_stream(stream, |ctx| ctx.send_headers(&mut self.channel, head, payload)) else {
            return;
        };
        if disposition == Disposition::Continue && !payload.is_empty() {
            tasks.push(next_frame(stream, body));
        } else {
            self.settle(stream, disposition);
        }
    }

    fn on_body_frame<'h, B>(
        &mut self,
        stream: StreamId,
        body: B,
        frame: Option<Result<Frame<Bytes>, B::Error>>,
        tasks: &mut FuturesUnordered<BoxFuture<'h, Task<B>>>,
    ) where
        B: Body<Data = Bytes> + Send + Unpin + 'h,
        B::Error: Display,
    {
        let item = match frame {
            None => PayloadItem::eof(),
            Some(Ok(frame)) => {
                let Some(item) = payload_item(&body, frame) else {
                    tasks.push(next_frame(stream, body));
                    return;
                };
                item
            }
            Some(Err(e)) => {
                error!(stream_id = %stream, cause = %e, "response body failed");
                let error = TransportError::protocol(format!("response body error: {e}"));
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
            tasks.push(next_frame(stream, body));
        } else {
            self.settle(stream, disposition);
        }
    }

    /// Applies what a stream's state machine decided.
    fn settle(&mut self, stream: StreamId, disposition: Disposition) {
        match disposition {
            Disposition::Continue => {}
            Disposition::Retire => {
                self.streams.remove(stream);
                if self.close_after_response {
                    self.closing = true;
                }
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

    /// The connection is gone, or at least its reading half.
    ///
    /// Streams whose request was still arriving are failed; the others keep
    /// going so their responses can still be written.
    fn on_channel_closed(&mut self) {
        let outcomes = self.streams.for_each(|ctx| if ctx.inbound().is_receiving() || self.channel.is_closed() { Some(ctx.handle_channel_closed()) } else { None });
        for (stream, disposition) in outcomes {
            if let Some(disposition) = disposition {
                self.settle(stream, disposition);
            }
        }
    }

    fn on_idle(&mut self) {
        info!(connection = %self.id, live_streams = self.streams.len(), "idle timeout, close connection");
        let outcomes = self.streams.for_each(|ctx| ctx.handle_timeout(&mut self.channel));
        for (stream, disposition) in outcomes {
            self.settle(stream, disposition);
        }

        if self.channel.is_multiplexed() {
            let goaway = OutboundFrame::Control(ControlFrame::GoAway { last_stream: self.last_stream, code: 0 });
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
            let goaway = OutboundFrame::Control(ControlFrame::GoAway { last_stream: self.last_stream, code });
            if let Err(e) = self.channel.write_frame(goaway) {
                debug!(connection = %self.id, cause = %e, "could not send goaway");
            }
        } else if !self.streams.for_each(|ctx| ctx.outbound().has_begun()).into_iter().any(|(_, begun)| begun) {
            let head = self.error_response(StatusCode::BAD_REQUEST);
            let bad_request = OutboundFrame::Headers { stream: StreamId::CONNECTION, head: MessageHead::from(head), payload: PayloadSize::Empty };
            if let Err(e) = self.channel.write_frame(bad_request) {
                debug!(connection = %self.id, cause = %e, "could not send bad request response");
            }
        }

        let reason = e.to_string();
        let outcomes = self.streams.for_each(|ctx| ctx.abort(TransportError::protocol(&reason)));
        for (stream, _) in outcomes {
            self.streams.remove(stream);
        }
        self.closing = true;
    }

    fn error_response(&self, status: StatusCode) -> ResponseHead {
        let mut head = Response::new(());
        *head.status_mut() = status;
        if !self.channel.is_multiplexed() {
            head.headers_mut().insert(header::CONNECTION, HeaderValue::from_static("close"));
        }
        self.decorate(&mut head);
        head
    }

    fn decorate(&self, head: &mut ResponseHead) {
        if let Some(name) = &self.server_name {
            head.headers_mut().entry(header::SERVER).or_insert_with(|| name.clone());
        }
        if self.close_after_response && !self.channel.is_multiplexed() {
            head.headers_mut().insert(header::CONNECTION, HeaderValue::from_static("close"));
        }
    }
}

fn handle<'h, H>(handler: &'h H, stream: StreamId, request: Request<MessageBody>) -> BoxFuture<'h, Task<H::RespBody>>
where
    H: Handler,
{
    let call = handler.call(request);
    Box::pin(async move { Task::Handled { stream, response: call.await.map_err(Into::into) } })
}

fn next_frame<'h, B>(stream: StreamId, mut body: B) -> BoxFuture<'h, Task<B>>
where
    B: Body<Data = Bytes> + Send + Unpin + 'h,
{
    Box::pin(async move {
        let frame = body.frame().await;
        Task::BodyFrame { stream, body, frame }
    })
}

fn poll_pending(streams: &StreamTable<ListenerContext>, pending: Option<&InboundFrame>, cx: &mut Context<'_>) -> Poll<()> {
    match pending.and_then(InboundFrame::stream) {
        Some(stream) => poll_pending_stream(streams, stream, cx),
        None => Poll::Ready(()),
    }
}

fn poll_pending_stream(streams: &StreamTable<ListenerContext>, stream: StreamId, cx: &mut Context<'_>) -> Poll<()> {
    streams.with_stream(stream, |ctx| ctx.poll_body_ready(cx)).unwrap_or(Poll::Ready(()))
}

//! Connection drivers.
//!
//! A driver owns one physical connection: it reads bytes, decodes them through
//! the connection's [`FramedChannel`], routes every frame event to the state
//! machine of the stream it belongs to and writes whatever those state
//! machines emit. Stream contexts live in a [`StreamTable`].
//!
//! - [`ServerConnection`] answers requests with a
//!   [`Handler`](crate::handler::Handler)
//! - [`ClientConnection`] sends requests queued through [`SendRequest`]
//!
//! Both drivers run everything belonging to a connection on the task that
//! polls them. Stream state is therefore never touched concurrently, the
//! table's locking only matters to code that shares it across threads.

mod channel;
mod client;
mod server;
mod stream_table;

pub use channel::{Channel, FramedChannel};
pub use client::{ClientConnection, SendRequest, handshake};
pub use server::ServerConnection;
pub use stream_table::StreamTable;

use std::time::Duration;

use bytes::Bytes;
use http::{Version, header};
use http_body::{Body, Frame};
use tokio::time::Instant;
use tracing::{info, trace};

use crate::config::ProtocolVersion;
use crate::protocol::{ConnectionId, ControlFrame, MessageHead, OutboundFrame, PayloadItem, StreamId};

/// Whether the peer asked for the connection to end after this exchange.
pub(crate) fn wants_close(head: &MessageHead) -> bool {
    let tokens = head.headers().get_all(header::CONNECTION).iter().filter_map(|value| value.to_str().ok()).flat_map(|value| value.split(','));
    let mut keep_alive = false;
    for token in tokens {
        let token = token.trim();
        if token.eq_ignore_ascii_case("close") {
            return true;
        }
        keep_alive |= token.eq_ignore_ascii_case("keep-alive");
    }
    head.version() == Version::HTTP_10 && !keep_alive
}

/// Answers the connection-level frames that need an answer.
///
/// Returns true when the peer announced it is going away.
pub(crate) fn answer_control<C: Channel + ?Sized>(channel: &mut C, connection: ConnectionId, control: ControlFrame) -> bool {
    let answer = match control {
        ControlFrame::Settings { ack: false, values } => {
            trace!(%connection, settings = values.len(), "peer settings, acknowledge");
            ControlFrame::Settings { ack: true, values: Vec::new() }
        }
        ControlFrame::Ping { ack: false, payload } => ControlFrame::Ping { ack: true, payload },
        ControlFrame::GoAway { last_stream, code } => {
            info!(%connection, %last_stream, code, "peer is going away");
            return true;
        }
        other => {
            trace!(%connection, frame = ?other, "control frame needs no answer");
            return false;
        }
    };

    if let Err(e) = channel.write_frame(OutboundFrame::Control(answer)) {
        trace!(%connection, cause = %e, "could not answer control frame");
    }
    false
}

/// Hands consumed receive window back to an HTTP/2 peer.
///
/// The stream window is only topped up while the stream can still receive.
pub(crate) fn release_credit(channel: &mut FramedChannel, stream: StreamId, size: usize, stream_open: bool) {
    if channel.version() != ProtocolVersion::Http2 || size == 0 {
        return;
    }
    let Ok(increment) = u32::try_from(size) else {
        return;
    };

    let targets = if stream_open { vec![StreamId::CONNECTION, stream] } else { vec![StreamId::CONNECTION] };
    for target in targets {
        if let Err(e) = channel.write_frame(OutboundFrame::Control(ControlFrame::WindowUpdate { stream: target, increment })) {
            trace!(stream_id = %target, cause = %e, "could not release receive window");
        }
    }
}

/// Turns one frame of an outgoing body into what the state machine writes.
///
/// `None` for frame kinds with nothing to send.
pub(crate) fn payload_item<B: Body>(body: &B, frame: Frame<Bytes>) -> Option<PayloadItem> {
    match frame.into_data() {
        Ok(data) if body.is_end_stream() => Some(PayloadItem::last(data)),
        Ok(data) => Some(PayloadItem::Chunk(data)),
        Err(frame) => frame.into_trailers().ok().map(|trailers| PayloadItem::last_with_trailers(Bytes::new(), trailers)),
    }
}

pub(crate) fn next_deadline(idle_timeout: Option<Duration>) -> Option<Instant> {
    idle_timeout.map(|timeout| Instant::now() + timeout)
}

/// Completes at `deadline`, never when there is none.
pub(crate) async fn idle(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

//! Protocol-independent frame events.
//!
//! Every codec translates its wire format into [`InboundFrame`]s and turns
//! [`OutboundFrame`]s back into bytes. The state machine only ever sees these
//! types, which is what keeps it independent of the protocol generation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::protocol::{MessageHead, PayloadSize};

/// Identifier of one logical stream within a connection.
///
/// HTTP/1.1 has a single stream per connection which always uses
/// [`StreamId::CONNECTION`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    pub const CONNECTION: StreamId = StreamId(0);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for StreamId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<u32> for StreamId {
    fn from(id: u32) -> Self {
        Self(u64::from(id))
    }
}

/// Process-unique identifier of a physical connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection plus stream number, absent for HTTP/1.1.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct StreamIdentity {
    pub connection: ConnectionId,
    pub stream: Option<StreamId>,
}

impl StreamIdentity {
    pub fn new(connection: ConnectionId, stream: Option<StreamId>) -> Self {
        Self { connection, stream }
    }

    /// The key used in the connection's stream table.
    pub fn stream_id(&self) -> StreamId {
        self.stream.unwrap_or(StreamId::CONNECTION)
    }
}

impl fmt::Display for StreamIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stream {
            Some(stream) => write!(f, "{}/{}", self.connection, stream),
            None => write!(f, "{}", self.connection),
        }
    }
}

/// Connection-level frames that do not belong to any request stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    Settings { ack: bool, values: Vec<(u64, u64)> },
    Ping { ack: bool, payload: [u8; 8] },
    GoAway { last_stream: StreamId, code: u64 },
    WindowUpdate { stream: StreamId, increment: u32 },
}

/// A decoded event from the wire.
#[derive(Debug)]
pub enum InboundFrame {
    /// A complete header block; continuation frames are already folded in.
    Headers { stream: StreamId, head: MessageHead, end_stream: bool },
    Data { stream: StreamId, data: Bytes, end_stream: bool },
    /// Trailing header block, always terminal for the stream.
    Trailers { stream: StreamId, trailers: HeaderMap },
    Reset { stream: StreamId, code: u64 },
    /// A header block that broke the message rules. Fatal to its stream only.
    Malformed { stream: StreamId, reason: String },
    Control(ControlFrame),
}

impl InboundFrame {
    pub fn stream(&self) -> Option<StreamId> {
        match self {
            InboundFrame::Headers { stream, .. }
            | InboundFrame::Data { stream, .. }
            | InboundFrame::Trailers { stream, .. }
            | InboundFrame::Reset { stream, .. }
            | InboundFrame::Malformed { stream, .. } => Some(*stream),
            InboundFrame::Control(_) => None,
        }
    }

    /// Returns true if no more frames follow on this stream.
    pub fn is_end_stream(&self) -> bool {
        match self {
            InboundFrame::Headers { end_stream, .. } | InboundFrame::Data { end_stream, .. } => *end_stream,
            InboundFrame::Trailers { .. } | InboundFrame::Reset { .. } | InboundFrame::Malformed { .. } => true,
            InboundFrame::Control(_) => false,
        }
    }
}

/// A frame the state machine asks the codec to put on the wire.
#[derive(Debug)]
pub enum OutboundFrame {
    /// Connection preface and initial settings for the local role.
    Handshake,
    /// Header block. `payload` tells HTTP/1.1 how to frame the body that follows.
    Headers { stream: StreamId, head: MessageHead, payload: PayloadSize },
    /// Interim `1xx` response, such as `100 Continue`.
    Interim { stream: StreamId, status: StatusCode },
    Data { stream: StreamId, data: Bytes, end_stream: bool },
    /// Trailing header block, carries the end-of-stream marker.
    Trailers { stream: StreamId, trailers: HeaderMap },
    Reset { stream: StreamId, code: u64 },
    Control(ControlFrame),
}

impl OutboundFrame {
    pub fn stream(&self) -> Option<StreamId> {
        match self {
            OutboundFrame::Headers { stream, .. }
            | OutboundFrame::Interim { stream, .. }
            | OutboundFrame::Data { stream, .. }
            | OutboundFrame::Trailers { stream, .. }
            | OutboundFrame::Reset { stream, .. } => Some(*stream),
            OutboundFrame::Handshake | OutboundFrame::Control(_) => None,
        }
    }

    pub fn is_end_stream(&self) -> bool {
        match self {
            OutboundFrame::Data { end_stream, .. } => *end_stream,
            OutboundFrame::Trailers { .. } | OutboundFrame::Reset { .. } => true,
            _ => false,
        }
    }
}

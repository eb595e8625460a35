//! Frame codecs, one per protocol generation.
//!
//! Each codec is a [`tokio_util::codec`] `Decoder`/`Encoder` pair that turns
//! wire bytes into [`InboundFrame`]s and [`OutboundFrame`]s back into bytes:
//!
//! - [`http1::Http1Codec`]: request/status lines, `Content-Length` and chunked
//!   bodies, chunked trailers and protocol upgrades
//! - [`http2::Http2Codec`]: binary framing with HPACK header compression
//! - [`http3::Http3Codec`]: HTTP/3 frames carried in QUIC stream frames, with
//!   QPACK header compression
//!
//! The connection drivers work with the [`Codec`] enum, picked from
//! [`ProtocolVersion`], so they never need to know which generation they speak.

pub(crate) mod fields;
pub mod http1;
pub mod http2;
pub mod http3;

pub use fields::HeaderField;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::config::ProtocolVersion;
use crate::protocol::{InboundFrame, OutboundFrame, ParseError, SendError};

use http1::Http1Codec;
use http2::Http2Codec;
use http3::Http3Codec;

/// Which end of the connection the local side is.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// A bidirectional codec translating one protocol's wire format.
pub trait FrameCodec: Decoder<Item = InboundFrame, Error = ParseError> + Encoder<OutboundFrame, Error = SendError> {
    fn version(&self) -> ProtocolVersion;

    /// Returns true if the protocol carries many streams per connection.
    fn is_multiplexed(&self) -> bool {
        self.version().is_multiplexed()
    }

    /// Stream error code for an exchange torn down locally.
    fn cancel_code(&self) -> u64 {
        match self.version() {
            ProtocolVersion::Http11 => 0,
            ProtocolVersion::Http2 => u64::from(http2::frame::CANCEL),
            ProtocolVersion::Http3 => http3::frame::H3_REQUEST_CANCELLED,
        }
    }

    /// Stream error code for a stream refused before any processing.
    fn refused_code(&self) -> u64 {
        match self.version() {
            ProtocolVersion::Http11 => 0,
            ProtocolVersion::Http2 => u64::from(http2::frame::REFUSED_STREAM),
            ProtocolVersion::Http3 => http3::frame::H3_REQUEST_REJECTED,
        }
    }

    /// Stream error code for a stream whose header block was malformed.
    fn malformed_code(&self) -> u64 {
        match self.version() {
            ProtocolVersion::Http11 => 0,
            ProtocolVersion::Http2 => u64::from(http2::frame::PROTOCOL_ERROR),
            ProtocolVersion::Http3 => http3::frame::H3_MESSAGE_ERROR,
        }
    }

    /// Connection error code sent with `GOAWAY` after a framing error.
    fn protocol_error_code(&self) -> u64 {
        match self.version() {
            ProtocolVersion::Http11 => 0,
            ProtocolVersion::Http2 => u64::from(http2::frame::PROTOCOL_ERROR),
            ProtocolVersion::Http3 => http3::frame::H3_GENERAL_PROTOCOL_ERROR,
        }
    }
}

/// A codec for whichever protocol a connection was configured with.
#[derive(Debug)]
pub enum Codec {
    Http1(Http1Codec),
    Http2(Http2Codec),
    Http3(Http3Codec),
}

impl Codec {
    pub fn new(version: ProtocolVersion, role: Role, max_header_bytes: usize) -> Self {
        match version {
            ProtocolVersion::Http11 => Codec::Http1(Http1Codec::new(role, max_header_bytes)),
            ProtocolVersion::Http2 => Codec::Http2(Http2Codec::new(role, max_header_bytes)),
            ProtocolVersion::Http3 => Codec::Http3(Http3Codec::new(role, max_header_bytes)),
        }
    }
}

impl Decoder for Codec {
    type Item = InboundFrame;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self {
            Codec::Http1(codec) => codec.decode(src),
            Codec::Http2(codec) => codec.decode(src),
            Codec::Http3(codec) => codec.decode(src),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self {
            Codec::Http1(codec) => codec.decode_eof(src),
            Codec::Http2(codec) => codec.decode_eof(src),
            Codec::Http3(codec) => codec.decode_eof(src),
        }
    }
}

impl Encoder<OutboundFrame> for Codec {
    type Error = SendError;

    fn encode(&mut self, frame: OutboundFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match self {
            Codec::Http1(codec) => codec.encode(frame, dst),
            Codec::Http2(codec) => codec.encode(frame, dst),
            Codec::Http3(codec) => codec.encode(frame, dst),
        }
    }
}

impl FrameCodec for Codec {
    fn version(&self) -> ProtocolVersion {
        match self {
            Codec::Http1(codec) => codec.version(),
            Codec::Http2(codec) => codec.version(),
            Codec::Http3(codec) => codec.version(),
        }
    }
}

//! HTTP/2 frame header layout and registry constants (RFC 9113 section 4).

use bytes::{Buf, BufMut, BytesMut};

use crate::protocol::ParseError;

pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";
pub const HEADER_LEN: usize = 9;
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16_384;

pub mod kind {
    pub const DATA: u8 = 0x0;
    pub const HEADERS: u8 = 0x1;
    pub const PRIORITY: u8 = 0x2;
    pub const RST_STREAM: u8 = 0x3;
    pub const SETTINGS: u8 = 0x4;
    pub const PUSH_PROMISE: u8 = 0x5;
    pub const PING: u8 = 0x6;
    pub const GOAWAY: u8 = 0x7;
    pub const WINDOW_UPDATE: u8 = 0x8;
    pub const CONTINUATION: u8 = 0x9;
}

pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

pub mod setting {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
}

pub const NO_ERROR: u32 = 0x0;
pub const PROTOCOL_ERROR: u32 = 0x1;
pub const REFUSED_STREAM: u32 = 0x7;
pub const CANCEL: u32 = 0x8;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: usize,
    pub kind: u8,
    pub flags: u8,
    pub stream: u32,
}

impl FrameHeader {
    pub fn new(kind: u8, flags: u8, stream: u32, length: usize) -> Self {
        Self { length, kind, flags, stream }
    }

    /// Reads a frame header, `None` when fewer than nine bytes are buffered.
    pub fn peek(src: &[u8]) -> Option<Self> {
        let mut header = src.get(..HEADER_LEN)?;
        let length = (usize::from(header.get_u8()) << 16) | usize::from(header.get_u16());
        let kind = header.get_u8();
        let flags = header.get_u8();
        let stream = header.get_u32() & 0x7fff_ffff;
        Some(Self { length, kind, flags, stream })
    }

    pub fn has(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    #[allow(clippy::cast_possible_truncation, reason = "frame length is bounded by the max frame size")]
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_LEN + self.length);
        dst.put_u8((self.length >> 16) as u8);
        dst.put_u16(self.length as u16);
        dst.put_u8(self.kind);
        dst.put_u8(self.flags);
        dst.put_u32(self.stream & 0x7fff_ffff);
    }
}

/// Strips padding from a DATA or HEADERS payload.
pub fn strip_padding(header: &FrameHeader, payload: &mut BytesMut) -> Result<(), ParseError> {
    if !header.has(flags::PADDED) {
        return Ok(());
    }
    if payload.is_empty() {
        return Err(ParseError::invalid_frame("padded frame without pad length"));
    }
    let pad = usize::from(payload.get_u8());
    if pad > payload.len() {
        return Err(ParseError::invalid_frame("padding exceeds frame payload"));
    }
    payload.truncate(payload.len() - pad);
    Ok(())
}

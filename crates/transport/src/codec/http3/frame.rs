//! QUIC STREAM framing and HTTP/3 frame layout (RFC 9000, RFC 9114).

use std::ops::Range;

use bytes::{BufMut, BytesMut};

use crate::codec::http3::varint;
use crate::protocol::{ParseError, SendError};

pub mod quic {
    pub const PADDING: u64 = 0x00;
    pub const PING: u64 = 0x01;
    pub const RESET_STREAM: u64 = 0x04;
    pub const STOP_SENDING: u64 = 0x05;
    pub const STREAM: u64 = 0x08;
    pub const STREAM_MAX: u64 = 0x0f;

    pub const OFF: u64 = 0x04;
    pub const LEN: u64 = 0x02;
    pub const FIN: u64 = 0x01;
}

pub mod kind {
    pub const DATA: u64 = 0x0;
    pub const HEADERS: u64 = 0x1;
    pub const CANCEL_PUSH: u64 = 0x3;
    pub const SETTINGS: u64 = 0x4;
    pub const PUSH_PROMISE: u64 = 0x5;
    pub const GOAWAY: u64 = 0x7;
    pub const MAX_PUSH_ID: u64 = 0xd;
}

pub mod stream_type {
    pub const CONTROL: u64 = 0x00;
    pub const PUSH: u64 = 0x01;
    pub const QPACK_ENCODER: u64 = 0x02;
    pub const QPACK_DECODER: u64 = 0x03;
}

pub mod setting {
    pub const QPACK_MAX_TABLE_CAPACITY: u64 = 0x01;
    pub const MAX_FIELD_SECTION_SIZE: u64 = 0x06;
    pub const QPACK_BLOCKED_STREAMS: u64 = 0x07;
}

pub const H3_NO_ERROR: u64 = 0x100;
pub const H3_GENERAL_PROTOCOL_ERROR: u64 = 0x101;
pub const H3_REQUEST_REJECTED: u64 = 0x10b;
pub const H3_REQUEST_CANCELLED: u64 = 0x10c;
pub const H3_MESSAGE_ERROR: u64 = 0x10e;

pub fn is_unidirectional(stream: u64) -> bool {
    stream & 0x2 != 0
}

pub fn is_client_initiated(stream: u64) -> bool {
    stream & 0x1 == 0
}

/// One QUIC frame as laid out in the buffer, payload given as a byte range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuicFrame {
    Stream { stream: u64, offset: u64, data: Range<usize>, fin: bool },
    ResetStream { stream: u64, code: u64, final_size: u64 },
    StopSending { stream: u64, code: u64 },
    Padding,
}

struct Cursor<'a> {
    src: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn varint(&mut self) -> Option<u64> {
        let (value, len) = varint::decode(&self.src[self.pos..])?;
        self.pos += len;
        Some(value)
    }
}

/// Parses the QUIC frame at the front of `src`.
///
/// Returns the frame and the number of bytes it spans, or `None` when the
/// buffer does not hold a complete frame yet.
pub fn parse_quic_frame(src: &[u8]) -> Result<Option<(QuicFrame, usize)>, ParseError> {
    let mut cursor = Cursor { src, pos: 0 };
    let Some(frame_type) = cursor.varint() else {
        return Ok(None);
    };

    let frame = match frame_type {
        quic::PADDING | quic::PING => QuicFrame::Padding,
        quic::STREAM..=quic::STREAM_MAX => {
            if frame_type & quic::LEN == 0 {
                return Err(ParseError::invalid_frame("stream frame without length"));
            }
            let Some(stream) = cursor.varint() else { return Ok(None) };
            let offset = if frame_type & quic::OFF != 0 {
                let Some(offset) = cursor.varint() else { return Ok(None) };
                offset
            } else {
                0
            };
            let Some(len) = cursor.varint() else { return Ok(None) };
            let len = usize::try_from(len).map_err(|_e| ParseError::invalid_frame("stream frame length overflow"))?;
            let start = cursor.pos;
            let Some(end) = start.checked_add(len).filter(|end| *end <= src.len()) else {
                return Ok(None);
            };
            cursor.pos = end;
            QuicFrame::Stream { stream, offset, data: start..end, fin: frame_type & quic::FIN != 0 }
        }
        quic::RESET_STREAM => {
            let (Some(stream), Some(code), Some(final_size)) = (cursor.varint(), cursor.varint(), cursor.varint()) else {
                return Ok(None);
            };
            QuicFrame::ResetStream { stream, code, final_size }
        }
        quic::STOP_SENDING => {
            let (Some(stream), Some(code)) = (cursor.varint(), cursor.varint()) else {
                return Ok(None);
            };
            QuicFrame::StopSending { stream, code }
        }
        other => return Err(ParseError::invalid_frame(format!("unsupported quic frame type {other:#x}"))),
    };
    Ok(Some((frame, cursor.pos)))
}

pub fn write_stream_frame(stream: u64, offset: u64, data: &[u8], fin: bool, dst: &mut BytesMut) -> Result<(), SendError> {
    let mut frame_type = quic::STREAM | quic::LEN;
    if offset > 0 {
        frame_type |= quic::OFF;
    }
    if fin {
        frame_type |= quic::FIN;
    }
    dst.reserve(data.len() + 24);
    varint::encode(frame_type, dst)?;
    varint::encode(stream, dst)?;
    if offset > 0 {
        varint::encode(offset, dst)?;
    }
    varint::encode_len(data.len(), dst)?;
    dst.put_slice(data);
    Ok(())
}

pub fn write_reset_stream(stream: u64, code: u64, final_size: u64, dst: &mut BytesMut) -> Result<(), SendError> {
    varint::encode(quic::RESET_STREAM, dst)?;
    varint::encode(stream, dst)?;
    varint::encode(code, dst)?;
    varint::encode(final_size, dst)
}

/// Type and payload length of the HTTP/3 frame at the front of `src`, plus
/// the header length. `None` while the header is incomplete.
pub fn peek_h3_header(src: &[u8]) -> Option<(u64, u64, usize)> {
    let (frame_type, type_len) = varint::decode(src)?;
    let (len, len_len) = varint::decode(&src[type_len..])?;
    Some((frame_type, len, type_len + len_len))
}

pub fn write_h3_frame(frame_type: u64, payload: &[u8], dst: &mut BytesMut) -> Result<(), SendError> {
    varint::encode(frame_type, dst)?;
    varint::encode_len(payload.len(), dst)?;
    dst.put_slice(payload);
    Ok(())
}

pub fn encode_settings(values: &[(u64, u64)], dst: &mut BytesMut) -> Result<(), SendError> {
    let mut payload = BytesMut::new();
    for (id, value) in values {
        varint::encode(*id, &mut payload)?;
        varint::encode(*value, &mut payload)?;
    }
    write_h3_frame(kind::SETTINGS, &payload, dst)
}

pub fn decode_settings(mut payload: &[u8]) -> Result<Vec<(u64, u64)>, ParseError> {
    let mut values = Vec::new();
    while !payload.is_empty() {
        let (id, id_len) = varint::decode(payload).ok_or_else(|| ParseError::invalid_frame("settings id truncated"))?;
        let (value, value_len) = varint::decode(&payload[id_len..]).ok_or_else(|| ParseError::invalid_frame("settings value truncated"))?;
        if values.iter().any(|(seen, _)| *seen == id) {
            return Err(ParseError::invalid_frame(format!("duplicate setting {id:#x}")));
        }
        values.push((id, value));
        payload = &payload[id_len + value_len..];
    }
    Ok(values)
}

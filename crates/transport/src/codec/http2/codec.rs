use std::collections::HashSet;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use http::Version;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

use crate::codec::fields::{self, HeaderField};
use crate::codec::http2::frame::{self, flags, kind, setting, FrameHeader, HEADER_LEN, PREFACE};
use crate::codec::http2::hpack::{HpackDecoder, HpackEncoder};
use crate::codec::{FrameCodec, Role};
use crate::config::ProtocolVersion;
use crate::ensure;
use crate::protocol::{ControlFrame, InboundFrame, OutboundFrame, ParseError, SendError, StreamId};

const MAX_FRAME_SIZE_LIMIT: usize = 16_777_215;

#[derive(Debug)]
struct PartialHeaders {
    stream: u32,
    end_stream: bool,
    block: BytesMut,
}

/// Frame codec for HTTP/2 connections.
///
/// Handles the connection preface, folds CONTINUATION frames into one header
/// block, strips padding and priority fields, and tells trailers apart from
/// the initial header block of each stream. Connection-level frames surface
/// as [`ControlFrame`]s so the driver can acknowledge them.
#[derive(Debug)]
pub struct Http2Codec {
    role: Role,
    preface_pending: bool,
    hpack_decoder: HpackDecoder,
    hpack_encoder: HpackEncoder,
    partial: Option<PartialHeaders>,
    /// streams whose initial header block arrived and whose inbound side is open
    open_streams: HashSet<u32>,
    max_header_bytes: usize,
    peer_max_frame_size: usize,
}

impl Http2Codec {
    pub fn new(role: Role, max_header_bytes: usize) -> Self {
        Self {
            role,
            preface_pending: role == Role::Server,
            hpack_decoder: HpackDecoder::new(max_header_bytes),
            hpack_encoder: HpackEncoder,
            partial: None,
            open_streams: HashSet::new(),
            max_header_bytes,
            peer_max_frame_size: frame::DEFAULT_MAX_FRAME_SIZE,
        }
    }

    fn read_preface(&mut self, src: &mut BytesMut) -> Result<bool, ParseError> {
        let n = src.len().min(PREFACE.len());
        if src[..n] != PREFACE[..n] {
            return Err(ParseError::invalid_frame("invalid connection preface"));
        }
        if n < PREFACE.len() {
            return Ok(false);
        }
        src.advance(PREFACE.len());
        self.preface_pending = false;
        trace!("http2 connection preface received");
        Ok(true)
    }

    fn decode_frame(&mut self, header: FrameHeader, mut payload: BytesMut) -> Result<Option<InboundFrame>, ParseError> {
        if self.partial.is_some() && header.kind != kind::CONTINUATION {
            return Err(ParseError::invalid_frame("expected continuation frame"));
        }

        match header.kind {
            kind::DATA => {
                let stream = Self::require_stream(&header)?;
                frame::strip_padding(&header, &mut payload)?;
                let end_stream = header.has(flags::END_STREAM);
                if end_stream {
                    self.open_streams.remove(&stream);
                }
                Ok(Some(InboundFrame::Data { stream: StreamId::from(stream), data: payload.freeze(), end_stream }))
            }
            kind::HEADERS => {
                let stream = Self::require_stream(&header)?;
                frame::strip_padding(&header, &mut payload)?;
                if header.has(flags::PRIORITY) {
                    if payload.len() < 5 {
                        return Err(ParseError::invalid_frame("headers priority fields truncated"));
                    }
                    payload.advance(5);
                }
                let end_stream = header.has(flags::END_STREAM);
                if header.has(flags::END_HEADERS) {
                    self.finish_headers(stream, end_stream, &payload)
                } else {
                    self.partial = Some(PartialHeaders { stream, end_stream, block: payload });
                    Ok(None)
                }
            }
            kind::CONTINUATION => {
                let Some(partial) = self.partial.as_mut().filter(|partial| partial.stream == header.stream) else {
                    return Err(ParseError::invalid_frame("unexpected continuation frame"));
                };
                partial.block.unsplit(payload);
                if partial.block.len() > self.max_header_bytes {
                    return Err(ParseError::too_large_header(partial.block.len(), self.max_header_bytes));
                }
                if !header.has(flags::END_HEADERS) {
                    return Ok(None);
                }
                match self.partial.take() {
                    Some(PartialHeaders { stream, end_stream, block }) => self.finish_headers(stream, end_stream, &block),
                    None => Ok(None),
                }
            }
            kind::RST_STREAM => {
                let stream = Self::require_stream(&header)?;
                ensure!(payload.len() == 4, ParseError::invalid_frame("rst_stream payload must be 4 bytes"));
                self.open_streams.remove(&stream);
                Ok(Some(InboundFrame::Reset { stream: StreamId::from(stream), code: u64::from(payload.get_u32()) }))
            }
            kind::SETTINGS => self.decode_settings(&header, payload).map(Some),
            kind::PING => {
                ensure!(payload.len() == 8, ParseError::invalid_frame("ping payload must be 8 bytes"));
                let mut data = [0u8; 8];
                payload.copy_to_slice(&mut data);
                Ok(Some(InboundFrame::Control(ControlFrame::Ping { ack: header.has(flags::ACK), payload: data })))
            }
            kind::GOAWAY => {
                ensure!(payload.len() >= 8, ParseError::invalid_frame("goaway payload truncated"));
                let last_stream = payload.get_u32() & 0x7fff_ffff;
                let code = payload.get_u32();
                Ok(Some(InboundFrame::Control(ControlFrame::GoAway { last_stream: StreamId::from(last_stream), code: u64::from(code) })))
            }
            kind::WINDOW_UPDATE => {
                ensure!(payload.len() == 4, ParseError::invalid_frame("window_update payload must be 4 bytes"));
                let increment = payload.get_u32() & 0x7fff_ffff;
                Ok(Some(InboundFrame::Control(ControlFrame::WindowUpdate { stream: StreamId::from(header.stream), increment })))
            }
            kind::PUSH_PROMISE => Err(ParseError::invalid_frame("server push is disabled")),
            other => {
                trace!(kind = other, stream = header.stream, "ignore http2 frame");
                Ok(None)
            }
        }
    }

    fn require_stream(header: &FrameHeader) -> Result<u32, ParseError> {
        ensure!(header.stream != 0, ParseError::invalid_frame(format!("frame type {:#x} on stream 0", header.kind)));
        Ok(header.stream)
    }

    fn decode_settings(&mut self, header: &FrameHeader, mut payload: BytesMut) -> Result<InboundFrame, ParseError> {
        ensure!(header.stream == 0, ParseError::invalid_frame("settings frame on a request stream"));
        if header.has(flags::ACK) {
            ensure!(payload.is_empty(), ParseError::invalid_frame("settings ack with payload"));
            return Ok(InboundFrame::Control(ControlFrame::Settings { ack: true, values: Vec::new() }));
        }
        ensure!(payload.len() % 6 == 0, ParseError::invalid_frame("settings payload is not a multiple of 6"));

        let mut values = Vec::with_capacity(payload.len() / 6);
        while payload.has_remaining() {
            let id = payload.get_u16();
            let value = payload.get_u32();
            if id == setting::MAX_FRAME_SIZE {
                let size = usize::try_from(value).unwrap_or(usize::MAX);
                ensure!((frame::DEFAULT_MAX_FRAME_SIZE..=MAX_FRAME_SIZE_LIMIT).contains(&size), ParseError::invalid_frame(format!("invalid max frame size {size}")));
                self.peer_max_frame_size = size;
            }
            values.push((u64::from(id), u64::from(value)));
        }
        Ok(InboundFrame::Control(ControlFrame::Settings { ack: false, values }))
    }

    fn finish_headers(&mut self, stream: u32, end_stream: bool, block: &[u8]) -> Result<Option<InboundFrame>, ParseError> {
        let decoded = self.hpack_decoder.decode(block)?;

        let frame = if self.open_streams.remove(&stream) {
            Self::trailers_frame(stream, end_stream, decoded)
        } else {
            match fields::fields_to_head(decoded, self.role, Version::HTTP_2) {
                Ok(head) if self.role == Role::Client && head.is_informational() => {
                    trace!(stream, status = ?head.status(), "skip interim response");
                    return Ok(None);
                }
                Ok(head) => {
                    if !end_stream {
                        self.open_streams.insert(stream);
                    }
                    InboundFrame::Headers { stream: StreamId::from(stream), head, end_stream }
                }
                Err(e) => InboundFrame::Malformed { stream: StreamId::from(stream), reason: e.to_string() },
            }
        };

        if let InboundFrame::Malformed { reason, .. } = &frame {
            warn!(stream, reason = %reason, "malformed header block");
        }
        Ok(Some(frame))
    }

    fn trailers_frame(stream: u32, end_stream: bool, decoded: Vec<HeaderField>) -> InboundFrame {
        let stream = StreamId::from(stream);
        if !end_stream {
            return InboundFrame::Malformed { stream, reason: "trailers must end the stream".to_owned() };
        }
        match fields::fields_to_trailers(decoded) {
            Ok(trailers) => InboundFrame::Trailers { stream, trailers },
            Err(e) => InboundFrame::Malformed { stream, reason: e.to_string() },
        }
    }

    fn wire_id(stream: StreamId) -> Result<u32, SendError> {
        u32::try_from(stream.value()).ok().filter(|id| *id <= 0x7fff_ffff).ok_or_else(|| SendError::invalid_header(format!("stream id {stream} exceeds 31 bits")))
    }

    fn write_header_block(&mut self, stream: u32, fields: &[HeaderField], end_stream: bool, dst: &mut BytesMut) {
        let mut block = BytesMut::new();
        self.hpack_encoder.encode(fields, &mut block);

        let mut first = true;
        loop {
            let chunk = block.split_to(block.len().min(self.peer_max_frame_size));
            let last = block.is_empty();
            let (frame_kind, mut frame_flags) = if first { (kind::HEADERS, if end_stream { flags::END_STREAM } else { 0 }) } else { (kind::CONTINUATION, 0) };
            if last {
                frame_flags |= flags::END_HEADERS;
            }
            FrameHeader::new(frame_kind, frame_flags, stream, chunk.len()).encode(dst);
            dst.extend_from_slice(&chunk);
            first = false;
            if last {
                break;
            }
        }
    }

    fn write_data(&self, stream: u32, mut data: Bytes, end_stream: bool, dst: &mut BytesMut) {
        if data.is_empty() && !end_stream {
            trace!(stream, "skip empty data frame");
            return;
        }
        loop {
            let chunk = data.split_to(data.len().min(self.peer_max_frame_size));
            let last = data.is_empty();
            let frame_flags = if last && end_stream { flags::END_STREAM } else { 0 };
            FrameHeader::new(kind::DATA, frame_flags, stream, chunk.len()).encode(dst);
            dst.extend_from_slice(&chunk);
            if last {
                break;
            }
        }
    }

    fn write_settings(values: &[(u64, u64)], dst: &mut BytesMut) {
        let values: Vec<(u16, u32)> = values
            .iter()
            .filter_map(|(id, value)| match (u16::try_from(*id), u32::try_from(*value)) {
                (Ok(id), Ok(value)) => Some((id, value)),
                _ => {
                    warn!(id, value, "drop out of range setting");
                    None
                }
            })
            .collect();
        FrameHeader::new(kind::SETTINGS, 0, 0, values.len() * 6).encode(dst);
        for (id, value) in values {
            dst.put_u16(id);
            dst.put_u32(value);
        }
    }

    fn write_control(&mut self, control: ControlFrame, dst: &mut BytesMut) -> Result<(), SendError> {
        match control {
            ControlFrame::Settings { ack: true, .. } => FrameHeader::new(kind::SETTINGS, flags::ACK, 0, 0).encode(dst),
            ControlFrame::Settings { ack: false, values } => Self::write_settings(&values, dst),
            ControlFrame::Ping { ack, payload } => {
                FrameHeader::new(kind::PING, if ack { flags::ACK } else { 0 }, 0, 8).encode(dst);
                dst.extend_from_slice(&payload);
            }
            ControlFrame::GoAway { last_stream, code } => {
                FrameHeader::new(kind::GOAWAY, 0, 0, 8).encode(dst);
                dst.put_u32(Self::wire_id(last_stream)?);
                dst.put_u32(u32::try_from(code).unwrap_or(frame::PROTOCOL_ERROR));
            }
            ControlFrame::WindowUpdate { stream, increment } => {
                FrameHeader::new(kind::WINDOW_UPDATE, 0, Self::wire_id(stream)?, 4).encode(dst);
                dst.put_u32(increment & 0x7fff_ffff);
            }
        }
        Ok(())
    }

    fn handshake(&self, dst: &mut BytesMut) {
        if self.role == Role::Client {
            dst.extend_from_slice(PREFACE);
        }
        let mut values = vec![(u64::from(setting::MAX_HEADER_LIST_SIZE), u64::try_from(self.max_header_bytes).unwrap_or(u64::MAX))];
        if self.role == Role::Client {
            values.push((u64::from(setting::ENABLE_PUSH), 0));
        }
        Self::write_settings(&values, dst);
    }
}

impl Decoder for Http2Codec {
    type Item = InboundFrame;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.preface_pending && !self.read_preface(src)? {
            return Ok(None);
        }

        loop {
            let Some(header) = FrameHeader::peek(src) else {
                return Ok(None);
            };
            if header.length > frame::DEFAULT_MAX_FRAME_SIZE {
                return Err(ParseError::invalid_frame(format!("frame of {} bytes exceeds max frame size", header.length)));
            }
            if src.len() < HEADER_LEN + header.length {
                src.reserve(HEADER_LEN + header.length - src.len());
                return Ok(None);
            }

            src.advance(HEADER_LEN);
            let payload = src.split_to(header.length);
            if let Some(frame) = self.decode_frame(header, payload)? {
                return Ok(Some(frame));
            }
        }
    }
}

impl Encoder<OutboundFrame> for Http2Codec {
    type Error = SendError;

    fn encode(&mut self, frame: OutboundFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match frame {
            OutboundFrame::Handshake => self.handshake(dst),
            OutboundFrame::Headers { stream, head, payload } => {
                let stream = Self::wire_id(stream)?;
                let fields = fields::head_to_fields(&head, payload);
                self.write_header_block(stream, &fields, payload.is_empty(), dst);
            }
            OutboundFrame::Interim { stream, status } => {
                let stream = Self::wire_id(stream)?;
                let fields = [HeaderField::new(Bytes::from_static(b":status"), Bytes::copy_from_slice(status.as_str().as_bytes()))];
                self.write_header_block(stream, &fields, false, dst);
            }
            OutboundFrame::Data { stream, data, end_stream } => self.write_data(Self::wire_id(stream)?, data, end_stream, dst),
            OutboundFrame::Trailers { stream, trailers } => {
                let stream = Self::wire_id(stream)?;
                self.write_header_block(stream, &fields::trailers_to_fields(&trailers), true, dst);
            }
            OutboundFrame::Reset { stream, code } => {
                let stream = Self::wire_id(stream)?;
                self.open_streams.remove(&stream);
                FrameHeader::new(kind::RST_STREAM, 0, stream, 4).encode(dst);
                dst.put_u32(u32::try_from(code).unwrap_or(frame::CANCEL));
            }
            OutboundFrame::Control(control) => self.write_control(control, dst)?,
        }
        Ok(())
    }
}

impl FrameCodec for Http2Codec {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::Http2
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, Method, Request, Response, StatusCode};

    use super::*;
    use crate::protocol::{MessageHead, PayloadSize, RequestHeader};

    fn decode_all(codec: &mut Http2Codec, buf: &mut BytesMut) -> Vec<InboundFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    fn request(method: Method, uri: &str) -> MessageHead {
        let request = Request::builder().method(method).uri(uri).version(Version::HTTP_2).body(()).unwrap();
        MessageHead::from(RequestHeader::from(request))
    }

    #[test]
    fn client_handshake_reaches_server() {
        let mut client = Http2Codec::new(Role::Client, 8192);
        let mut server = Http2Codec::new(Role::Server, 8192);
        let mut wire = BytesMut::new();

        client.encode(OutboundFrame::Handshake, &mut wire).unwrap();
        assert!(wire.starts_with(PREFACE));

        let frames = decode_all(&mut server, &mut wire);
        assert_eq!(frames.len(), 1);
        let InboundFrame::Control(ControlFrame::Settings { ack: false, values }) = &frames[0] else {
            panic!("expected settings, got {:?}", frames[0]);
        };
        assert!(values.contains(&(u64::from(setting::ENABLE_PUSH), 0)));
        assert!(wire.is_empty());
    }

    #[test]
    fn invalid_preface_is_rejected() {
        let mut server = Http2Codec::new(Role::Server, 8192);
        let mut wire = BytesMut::from(&b"GET / HTTP/1.1\r\n\r\n"[..]);
        server.decode(&mut wire).unwrap_err();
    }

    #[test]
    fn partial_preface_waits() {
        let mut server = Http2Codec::new(Role::Server, 8192);
        let mut wire = BytesMut::from(&PREFACE[..10]);
        assert!(server.decode(&mut wire).unwrap().is_none());
        assert_eq!(wire.len(), 10);
    }

    #[test]
    fn request_with_body_and_trailers() {
        let mut client = Http2Codec::new(Role::Client, 8192);
        let mut server = Http2Codec::new(Role::Server, 8192);
        let mut wire = BytesMut::new();

        client.encode(OutboundFrame::Handshake, &mut wire).unwrap();
        let stream = StreamId::new(1);
        client.encode(OutboundFrame::Headers { stream, head: request(Method::POST, "https://example.com/upload"), payload: PayloadSize::Chunked }, &mut wire).unwrap();
        client.encode(OutboundFrame::Data { stream, data: Bytes::from_static(b"hello"), end_stream: false }, &mut wire).unwrap();
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", "abc".parse().unwrap());
        client.encode(OutboundFrame::Trailers { stream, trailers }, &mut wire).unwrap();

        let frames = decode_all(&mut server, &mut wire);
        assert_eq!(frames.len(), 4);

        let InboundFrame::Headers { stream: id, head, end_stream } = &frames[1] else {
            panic!("expected headers, got {:?}", frames[1]);
        };
        assert_eq!(*id, stream);
        assert!(!end_stream);
        let request = head.as_request().unwrap();
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.uri().path(), "/upload");

        assert!(matches!(&frames[2], InboundFrame::Data { data, end_stream: false, .. } if &data[..] == b"hello"));
        let InboundFrame::Trailers { trailers, .. } = &frames[3] else {
            panic!("expected trailers, got {:?}", frames[3]);
        };
        assert_eq!(trailers.get("x-checksum").unwrap(), "abc");
    }

    #[test]
    fn continuation_frames_are_folded() {
        let mut client = Http2Codec::new(Role::Client, 64 * 1024);
        let mut server = Http2Codec::new(Role::Server, 64 * 1024);
        client.peer_max_frame_size = 32;

        let mut head = request(Method::GET, "https://example.com/");
        head.headers_mut().insert("x-long", "v".repeat(100).parse().unwrap());

        let mut wire = BytesMut::from(PREFACE);
        client.encode(OutboundFrame::Headers { stream: StreamId::new(3), head, payload: PayloadSize::Empty }, &mut wire).unwrap();

        let frames = decode_all(&mut server, &mut wire);
        assert_eq!(frames.len(), 1);
        let InboundFrame::Headers { head, end_stream, .. } = &frames[0] else {
            panic!("expected headers, got {:?}", frames[0]);
        };
        assert!(end_stream);
        assert_eq!(head.headers().get("x-long").unwrap().len(), 100);
    }

    #[test]
    fn interleaved_frame_during_continuation_is_error() {
        let mut server = Http2Codec::new(Role::Server, 8192);
        let mut wire = BytesMut::from(PREFACE);
        FrameHeader::new(kind::HEADERS, 0, 1, 1).encode(&mut wire);
        wire.put_u8(0x82);
        FrameHeader::new(kind::DATA, 0, 1, 0).encode(&mut wire);

        server.decode(&mut wire).unwrap_err();
    }

    #[test]
    fn bad_header_block_rejects_only_its_stream() {
        let mut client = Http2Codec::new(Role::Client, 8192);
        let mut server = Http2Codec::new(Role::Server, 8192);
        let mut wire = BytesMut::from(PREFACE);

        let mut block = BytesMut::new();
        client.hpack_encoder.encode(&[HeaderField::new(Bytes::from_static(b":status"), Bytes::from_static(b"200"))], &mut block);
        FrameHeader::new(kind::HEADERS, flags::END_HEADERS | flags::END_STREAM, 1, block.len()).encode(&mut wire);
        wire.extend_from_slice(&block);
        client.encode(OutboundFrame::Headers { stream: StreamId::new(3), head: request(Method::GET, "https://example.com/ok"), payload: PayloadSize::Empty }, &mut wire).unwrap();

        let frames = decode_all(&mut server, &mut wire);
        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[0], InboundFrame::Malformed { stream, .. } if *stream == StreamId::new(1)));
        let InboundFrame::Headers { stream, head, .. } = &frames[1] else {
            panic!("expected headers, got {:?}", frames[1]);
        };
        assert_eq!(*stream, StreamId::new(3));
        assert_eq!(head.as_request().unwrap().uri().path(), "/ok");
    }

    #[test]
    fn response_round_trip_with_large_body() {
        let mut server = Http2Codec::new(Role::Server, 8192);
        let mut client = Http2Codec::new(Role::Client, 8192);
        let mut wire = BytesMut::new();
        let stream = StreamId::new(1);

        let response = Response::builder().status(StatusCode::OK).header("content-type", "text/plain").body(()).unwrap();
        server.encode(OutboundFrame::Interim { stream, status: StatusCode::CONTINUE }, &mut wire).unwrap();
        server.encode(OutboundFrame::Headers { stream, head: MessageHead::from(response), payload: PayloadSize::Length(20_000) }, &mut wire).unwrap();
        server.encode(OutboundFrame::Data { stream, data: Bytes::from(vec![b'x'; 20_000]), end_stream: true }, &mut wire).unwrap();

        let frames = decode_all(&mut client, &mut wire);
        assert_eq!(frames.len(), 3, "interim response is skipped, body spans two frames");
        let InboundFrame::Headers { head, end_stream: false, .. } = &frames[0] else {
            panic!("expected headers, got {:?}", frames[0]);
        };
        assert_eq!(head.status(), Some(StatusCode::OK));
        assert_eq!(head.headers().get("content-length").unwrap(), "20000");
        assert!(matches!(&frames[1], InboundFrame::Data { data, end_stream: false, .. } if data.len() == frame::DEFAULT_MAX_FRAME_SIZE));
        assert!(matches!(&frames[2], InboundFrame::Data { end_stream: true, .. }));
    }

    #[test]
    fn control_frames_surface_to_driver() {
        let mut server = Http2Codec::new(Role::Server, 8192);
        let mut wire = BytesMut::from(PREFACE);
        FrameHeader::new(kind::PING, 0, 0, 8).encode(&mut wire);
        wire.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        FrameHeader::new(kind::WINDOW_UPDATE, 0, 0, 4).encode(&mut wire);
        wire.put_u32(1024);
        FrameHeader::new(kind::PRIORITY, 0, 1, 5).encode(&mut wire);
        wire.extend_from_slice(&[0, 0, 0, 0, 16]);
        FrameHeader::new(kind::RST_STREAM, 0, 1, 4).encode(&mut wire);
        wire.put_u32(frame::CANCEL);

        let frames = decode_all(&mut server, &mut wire);
        assert_eq!(frames.len(), 3);
        assert!(matches!(frames[0], InboundFrame::Control(ControlFrame::Ping { ack: false, payload: [1, 2, 3, 4, 5, 6, 7, 8] })));
        assert!(matches!(frames[1], InboundFrame::Control(ControlFrame::WindowUpdate { increment: 1024, .. })));
        assert!(matches!(frames[2], InboundFrame::Reset { code: 0x8, .. }));
    }

    #[test]
    fn ping_ack_encoding() {
        let mut codec = Http2Codec::new(Role::Server, 8192);
        let mut dst = BytesMut::new();
        codec.encode(OutboundFrame::Control(ControlFrame::Ping { ack: true, payload: [9; 8] }), &mut dst).unwrap();

        let header = FrameHeader::peek(&dst).unwrap();
        assert_eq!(header.kind, kind::PING);
        assert!(header.has(flags::ACK));
        assert_eq!(&dst[HEADER_LEN..], &[9; 8]);
    }
}

use std::collections::{BTreeMap, HashMap, VecDeque};

use bytes::{Buf, Bytes, BytesMut};
use http::Version;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace, warn};

use crate::codec::fields::{self, HeaderField};
use crate::codec::http3::frame::{self, kind, setting, stream_type, QuicFrame};
use crate::codec::http3::qpack::{QpackDecoder, QpackEncoder};
use crate::codec::http3::varint;
use crate::codec::{FrameCodec, Role};
use crate::config::ProtocolVersion;
use crate::protocol::{ControlFrame, InboundFrame, OutboundFrame, ParseError, SendError, StreamId};

/// Out-of-order segments one stream may hold before the peer is considered hostile.
const MAX_PENDING_SEGMENTS: usize = 64;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum StreamKind {
    Request,
    /// unidirectional stream whose type varint has not arrived yet
    Undetermined,
    Control,
    /// QPACK encoder/decoder, unknown stream types and rejected requests, read and dropped
    Discard,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Progress {
    AwaitingHeaders,
    Body,
    Trailers,
}

#[derive(Debug)]
struct RecvStream {
    kind: StreamKind,
    /// next contiguous offset expected
    offset: u64,
    final_size: Option<u64>,
    pending: BTreeMap<u64, Bytes>,
    buf: BytesMut,
    /// bytes left in the HTTP/3 frame currently being streamed through
    remaining: u64,
    discarding: bool,
    progress: Progress,
}

impl RecvStream {
    fn new(kind: StreamKind) -> Self {
        Self {
            kind,
            offset: 0,
            final_size: None,
            pending: BTreeMap::new(),
            buf: BytesMut::new(),
            remaining: 0,
            discarding: false,
            progress: Progress::AwaitingHeaders,
        }
    }

    fn append(&mut self, offset: u64, mut data: Bytes) {
        let len = data.len() as u64;
        if offset + len <= self.offset {
            return;
        }
        if offset < self.offset {
            data.advance(usize::try_from(self.offset - offset).unwrap_or(usize::MAX));
        }
        self.offset += data.len() as u64;
        self.buf.extend_from_slice(&data);
    }

    /// Accepts a segment and moves every contiguous byte into `buf`.
    fn accept(&mut self, offset: u64, data: Bytes, fin: bool) -> Result<(), ParseError> {
        let end = offset + data.len() as u64;
        if fin {
            if self.final_size.is_some_and(|size| size != end) {
                return Err(ParseError::invalid_frame("stream final size changed"));
            }
            self.final_size = Some(end);
        }
        if self.final_size.is_some_and(|size| end > size) {
            return Err(ParseError::invalid_frame("stream data beyond final size"));
        }

        if offset > self.offset {
            if self.pending.len() >= MAX_PENDING_SEGMENTS {
                return Err(ParseError::invalid_frame("too many out of order stream segments"));
            }
            self.pending.insert(offset, data);
            return Ok(());
        }

        self.append(offset, data);
        while let Some(entry) = self.pending.first_entry() {
            if *entry.key() > self.offset {
                break;
            }
            let (offset, data) = entry.remove_entry();
            self.append(offset, data);
        }
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.final_size == Some(self.offset)
    }
}

/// Frame codec for HTTP/3 carried in QUIC STREAM frames.
///
/// The byte stream is a sequence of QUIC STREAM and RESET_STREAM frames.
/// Each stream is reassembled in order, then read as HTTP/3 frames: request
/// streams yield headers, data and trailers, the peer's control stream
/// yields settings and goaway, QPACK streams are drained. The FIN bit on the
/// last STREAM frame ends a request stream.
#[derive(Debug)]
pub struct Http3Codec {
    role: Role,
    streams: HashMap<u64, RecvStream>,
    ready: VecDeque<InboundFrame>,
    qpack_decoder: QpackDecoder,
    qpack_encoder: QpackEncoder,
    send_offsets: HashMap<u64, u64>,
    control_opened: bool,
    max_header_bytes: usize,
}

impl Http3Codec {
    pub fn new(role: Role, max_header_bytes: usize) -> Self {
        Self {
            role,
            streams: HashMap::new(),
            ready: VecDeque::new(),
            qpack_decoder: QpackDecoder::new(max_header_bytes),
            qpack_encoder: QpackEncoder,
            send_offsets: HashMap::new(),
            control_opened: false,
            max_header_bytes,
        }
    }

    fn local_control_stream(&self) -> u64 {
        match self.role {
            Role::Client => 2,
            Role::Server => 3,
        }
    }

    fn on_stream_frame(&mut self, stream: u64, offset: u64, data: Bytes, fin: bool) -> Result<(), ParseError> {
        if !self.streams.contains_key(&stream) {
            let kind = if frame::is_unidirectional(stream) {
                StreamKind::Undetermined
            } else if frame::is_client_initiated(stream) {
                StreamKind::Request
            } else {
                return Err(ParseError::invalid_frame(format!("server initiated bidirectional stream {stream}")));
            };
            self.streams.insert(stream, RecvStream::new(kind));
        }

        let Some(mut recv) = self.streams.remove(&stream) else {
            return Ok(());
        };
        recv.accept(offset, data, fin)?;
        let done = self.drain(stream, &mut recv)?;
        if !done {
            self.streams.insert(stream, recv);
        }
        Ok(())
    }

    /// Reads every complete HTTP/3 frame buffered on a stream.
    /// Returns true once the stream is finished and can be forgotten.
    fn drain(&mut self, stream: u64, recv: &mut RecvStream) -> Result<bool, ParseError> {
        if recv.kind == StreamKind::Undetermined {
            let Some((ty, len)) = varint::decode(&recv.buf) else {
                return Ok(recv.is_finished());
            };
            recv.buf.advance(len);
            recv.kind = match ty {
                stream_type::CONTROL => StreamKind::Control,
                stream_type::PUSH => return Err(ParseError::invalid_frame("server push is disabled")),
                stream_type::QPACK_ENCODER | stream_type::QPACK_DECODER => StreamKind::Discard,
                other => {
                    trace!(stream, stream_type = other, "ignore unknown unidirectional stream");
                    StreamKind::Discard
                }
            };
        }

        match recv.kind {
            StreamKind::Request => self.drain_request(stream, recv),
            StreamKind::Control => self.drain_control(recv),
            StreamKind::Discard | StreamKind::Undetermined => {
                recv.buf.clear();
                Ok(recv.is_finished())
            }
        }
    }

    fn drain_request(&mut self, stream: u64, recv: &mut RecvStream) -> Result<bool, ParseError> {
        let id = StreamId::new(stream);
        let mut produced: Vec<InboundFrame> = Vec::new();

        loop {
            if recv.remaining > 0 {
                if recv.buf.is_empty() {
                    break;
                }
                let n = recv.buf.len().min(usize::try_from(recv.remaining).unwrap_or(usize::MAX));
                let chunk = recv.buf.split_to(n).freeze();
                recv.remaining -= n as u64;
                if !recv.discarding {
                    produced.push(InboundFrame::Data { stream: id, data: chunk, end_stream: false });
                }
                continue;
            }

            let Some((frame_type, len, header_len)) = frame::peek_h3_header(&recv.buf) else {
                break;
            };
            match frame_type {
                kind::DATA => {
                    if recv.progress != Progress::Body {
                        return Err(ParseError::invalid_frame("data frame outside of message body"));
                    }
                    recv.buf.advance(header_len);
                    recv.remaining = len;
                    recv.discarding = false;
                }
                kind::HEADERS => {
                    let len = usize::try_from(len).unwrap_or(usize::MAX);
                    if len > self.max_header_bytes {
                        return Err(ParseError::too_large_header(len, self.max_header_bytes));
                    }
                    if recv.buf.len() < header_len + len {
                        break;
                    }
                    recv.buf.advance(header_len);
                    let section = recv.buf.split_to(len);
                    match self.on_headers(id, recv, &section)? {
                        Some(frame @ InboundFrame::Malformed { .. }) => {
                            produced.push(frame);
                            recv.kind = StreamKind::Discard;
                            recv.buf.clear();
                            recv.remaining = 0;
                            self.ready.extend(produced);
                            return Ok(recv.is_finished());
                        }
                        Some(frame) => produced.push(frame),
                        None => {}
                    }
                }
                kind::SETTINGS | kind::GOAWAY | kind::CANCEL_PUSH | kind::MAX_PUSH_ID | kind::PUSH_PROMISE => {
                    return Err(ParseError::invalid_frame(format!("frame type {frame_type:#x} on request stream")));
                }
                other => {
                    trace!(stream, frame_type = other, "skip unknown http3 frame");
                    recv.buf.advance(header_len);
                    recv.remaining = len;
                    recv.discarding = true;
                }
            }
        }

        let finished = recv.is_finished();
        if finished {
            if !recv.buf.is_empty() || recv.remaining > 0 {
                return Err(ParseError::invalid_frame("request stream ended inside a frame"));
            }
            match (recv.progress, produced.last_mut()) {
                (Progress::AwaitingHeaders, _) => return Err(ParseError::invalid_frame("request stream ended before headers")),
                (_, Some(InboundFrame::Headers { end_stream, .. } | InboundFrame::Data { end_stream, .. })) => *end_stream = true,
                (_, Some(InboundFrame::Trailers { .. })) => {}
                (Progress::Trailers, _) => {}
                _ => produced.push(InboundFrame::Data { stream: id, data: Bytes::new(), end_stream: true }),
            }
        }

        self.ready.extend(produced);
        Ok(finished)
    }

    fn on_headers(&mut self, id: StreamId, recv: &mut RecvStream, section: &[u8]) -> Result<Option<InboundFrame>, ParseError> {
        let decoded = self.qpack_decoder.decode(section)?;
        let frame = match recv.progress {
            Progress::AwaitingHeaders => match fields::fields_to_head(decoded, self.role, Version::HTTP_3) {
                Ok(head) if self.role == Role::Client && head.is_informational() => {
                    trace!(stream = %id, status = ?head.status(), "skip interim response");
                    return Ok(None);
                }
                Ok(head) => {
                    recv.progress = Progress::Body;
                    InboundFrame::Headers { stream: id, head, end_stream: false }
                }
                Err(e) => InboundFrame::Malformed { stream: id, reason: e.to_string() },
            },
            Progress::Body => match fields::fields_to_trailers(decoded) {
                Ok(trailers) => {
                    recv.progress = Progress::Trailers;
                    InboundFrame::Trailers { stream: id, trailers }
                }
                Err(e) => InboundFrame::Malformed { stream: id, reason: e.to_string() },
            },
            Progress::Trailers => InboundFrame::Malformed { stream: id, reason: "header block after trailers".to_owned() },
        };
        if let InboundFrame::Malformed { reason, .. } = &frame {
            warn!(stream = %id, reason = %reason, "malformed header section");
        }
        Ok(Some(frame))
    }

    fn drain_control(&mut self, recv: &mut RecvStream) -> Result<bool, ParseError> {
        while let Some((frame_type, len, header_len)) = frame::peek_h3_header(&recv.buf) {
            let len = usize::try_from(len).unwrap_or(usize::MAX);
            if recv.buf.len() < header_len.saturating_add(len) {
                break;
            }
            recv.buf.advance(header_len);
            let payload = recv.buf.split_to(len);
            match frame_type {
                kind::SETTINGS => {
                    let values = frame::decode_settings(&payload)?;
                    self.ready.push_back(InboundFrame::Control(ControlFrame::Settings { ack: false, values }));
                }
                kind::GOAWAY => {
                    let (last, _) = varint::decode(&payload).ok_or_else(|| ParseError::invalid_frame("goaway payload truncated"))?;
                    self.ready.push_back(InboundFrame::Control(ControlFrame::GoAway { last_stream: StreamId::new(last), code: frame::H3_NO_ERROR }));
                }
                kind::DATA | kind::HEADERS => return Err(ParseError::invalid_frame("message frame on control stream")),
                other => trace!(frame_type = other, "ignore control stream frame"),
            }
        }

        if recv.is_finished() {
            return Err(ParseError::invalid_frame("peer closed its control stream"));
        }
        Ok(false)
    }

    fn write_stream(&mut self, stream: u64, data: &[u8], fin: bool, dst: &mut BytesMut) -> Result<(), SendError> {
        let offset = self.send_offsets.entry(stream).or_insert(0);
        frame::write_stream_frame(stream, *offset, data, fin, dst)?;
        *offset += data.len() as u64;
        if fin {
            self.send_offsets.remove(&stream);
        }
        Ok(())
    }

    fn write_fields(&mut self, stream: u64, fields: &[HeaderField], fin: bool, dst: &mut BytesMut) -> Result<(), SendError> {
        let mut section = BytesMut::new();
        self.qpack_encoder.encode(fields, &mut section);
        let mut payload = BytesMut::with_capacity(section.len() + 8);
        frame::write_h3_frame(kind::HEADERS, &section, &mut payload)?;
        self.write_stream(stream, &payload, fin, dst)
    }

    fn write_control(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<(), SendError> {
        let stream = self.local_control_stream();
        if !self.control_opened {
            self.control_opened = true;
            let mut opening = BytesMut::new();
            varint::encode(stream_type::CONTROL, &mut opening)?;
            opening.extend_from_slice(payload);
            return self.write_stream(stream, &opening, false, dst);
        }
        self.write_stream(stream, payload, false, dst)
    }

    fn handshake(&mut self, dst: &mut BytesMut) -> Result<(), SendError> {
        let mut settings = BytesMut::new();
        frame::encode_settings(
            &[
                (setting::QPACK_MAX_TABLE_CAPACITY, 0),
                (setting::QPACK_BLOCKED_STREAMS, 0),
                (setting::MAX_FIELD_SECTION_SIZE, u64::try_from(self.max_header_bytes).unwrap_or(varint::MAX)),
            ],
            &mut settings,
        )?;
        self.write_control(&settings, dst)
    }
}

impl Decoder for Http3Codec {
    type Item = InboundFrame;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(Some(frame));
            }

            let Some((quic_frame, len)) = frame::parse_quic_frame(src)? else {
                return Ok(None);
            };
            let bytes = src.split_to(len).freeze();

            match quic_frame {
                QuicFrame::Stream { stream, offset, data, fin } => self.on_stream_frame(stream, offset, bytes.slice(data), fin)?,
                QuicFrame::ResetStream { stream, code, final_size } => {
                    debug!(stream, code, final_size, "peer reset stream");
                    let known = self.streams.remove(&stream).is_some_and(|recv| recv.kind == StreamKind::Request);
                    if known || !frame::is_unidirectional(stream) {
                        self.ready.push_back(InboundFrame::Reset { stream: StreamId::new(stream), code });
                    }
                }
                QuicFrame::StopSending { stream, code } => {
                    debug!(stream, code, "peer stopped reading stream");
                    self.ready.push_back(InboundFrame::Reset { stream: StreamId::new(stream), code });
                }
                QuicFrame::Padding => {}
            }
        }
    }
}

impl Encoder<OutboundFrame> for Http3Codec {
    type Error = SendError;

    fn encode(&mut self, frame: OutboundFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match frame {
            OutboundFrame::Handshake => self.handshake(dst),
            OutboundFrame::Headers { stream, head, payload } => {
                let fields = fields::head_to_fields(&head, payload);
                self.write_fields(stream.value(), &fields, payload.is_empty(), dst)
            }
            OutboundFrame::Interim { stream, status } => {
                let fields = [HeaderField::new(Bytes::from_static(b":status"), Bytes::copy_from_slice(status.as_str().as_bytes()))];
                self.write_fields(stream.value(), &fields, false, dst)
            }
            OutboundFrame::Data { stream, data, end_stream } => {
                if data.is_empty() {
                    if end_stream {
                        return self.write_stream(stream.value(), &[], true, dst);
                    }
                    return Ok(());
                }
                let mut payload = BytesMut::with_capacity(data.len() + 9);
                frame::write_h3_frame(kind::DATA, &data, &mut payload)?;
                self.write_stream(stream.value(), &payload, end_stream, dst)
            }
            OutboundFrame::Trailers { stream, trailers } => self.write_fields(stream.value(), &fields::trailers_to_fields(&trailers), true, dst),
            OutboundFrame::Reset { stream, code } => {
                let final_size = self.send_offsets.remove(&stream.value()).unwrap_or(0);
                frame::write_reset_stream(stream.value(), code, final_size, dst)
            }
            OutboundFrame::Control(ControlFrame::Settings { ack: false, values }) => {
                let mut settings = BytesMut::new();
                frame::encode_settings(&values, &mut settings)?;
                self.write_control(&settings, dst)
            }
            OutboundFrame::Control(ControlFrame::GoAway { last_stream, .. }) => {
                let mut id = BytesMut::new();
                varint::encode(last_stream.value(), &mut id)?;
                let mut goaway = BytesMut::new();
                frame::write_h3_frame(kind::GOAWAY, &id, &mut goaway)?;
                self.write_control(&goaway, dst)
            }
            OutboundFrame::Control(control) => {
                trace!(?control, "control frame has no http3 equivalent");
                Ok(())
            }
        }
    }
}

impl FrameCodec for Http3Codec {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::Http3
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, Method, Request, Response, StatusCode};

    use super::*;
    use crate::protocol::{MessageHead, PayloadSize, RequestHeader};

    fn decode_all(codec: &mut Http3Codec, buf: &mut BytesMut) -> Vec<InboundFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    fn post(uri: &str) -> MessageHead {
        let request = Request::builder().method(Method::POST).uri(uri).version(Version::HTTP_3).body(()).unwrap();
        MessageHead::from(RequestHeader::from(request))
    }

    #[test]
    fn settings_arrive_on_control_stream() {
        let mut client = Http3Codec::new(Role::Client, 8192);
        let mut server = Http3Codec::new(Role::Server, 8192);
        let mut wire = BytesMut::new();

        client.encode(OutboundFrame::Handshake, &mut wire).unwrap();
        let frames = decode_all(&mut server, &mut wire);

        assert_eq!(frames.len(), 1);
        let InboundFrame::Control(ControlFrame::Settings { ack: false, values }) = &frames[0] else {
            panic!("expected settings, got {:?}", frames[0]);
        };
        assert!(values.contains(&(setting::MAX_FIELD_SECTION_SIZE, 8192)));
    }

    #[test]
    fn request_with_body_ends_on_fin() {
        let mut client = Http3Codec::new(Role::Client, 8192);
        let mut server = Http3Codec::new(Role::Server, 8192);
        let mut wire = BytesMut::new();
        let stream = StreamId::new(0);

        client.encode(OutboundFrame::Headers { stream, head: post("https://example.com/submit"), payload: PayloadSize::Length(5) }, &mut wire).unwrap();
        client.encode(OutboundFrame::Data { stream, data: Bytes::from_static(b"hello"), end_stream: true }, &mut wire).unwrap();

        let frames = decode_all(&mut server, &mut wire);
        assert_eq!(frames.len(), 2);
        let InboundFrame::Headers { head, end_stream: false, .. } = &frames[0] else {
            panic!("expected headers, got {:?}", frames[0]);
        };
        assert_eq!(head.as_request().unwrap().uri().path(), "/submit");
        assert_eq!(head.version(), Version::HTTP_3);
        assert!(matches!(&frames[1], InboundFrame::Data { data, end_stream: true, .. } if &data[..] == b"hello"));
    }

    #[test]
    fn bodyless_request_ends_with_headers() {
        let mut client = Http3Codec::new(Role::Client, 8192);
        let mut server = Http3Codec::new(Role::Server, 8192);
        let mut wire = BytesMut::new();

        let request = Request::builder().method(Method::GET).uri("https://example.com/").version(Version::HTTP_3).body(()).unwrap();
        client
            .encode(OutboundFrame::Headers { stream: StreamId::new(4), head: MessageHead::from(RequestHeader::from(request)), payload: PayloadSize::Empty }, &mut wire)
            .unwrap();

        let frames = decode_all(&mut server, &mut wire);
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], InboundFrame::Headers { end_stream: true, .. }));
    }

    #[test]
    fn out_of_order_segments_are_reassembled() {
        let mut client = Http3Codec::new(Role::Client, 8192);
        let mut server = Http3Codec::new(Role::Server, 8192);
        let stream = StreamId::new(0);

        let mut headers = BytesMut::new();
        client.encode(OutboundFrame::Headers { stream, head: post("https://example.com/"), payload: PayloadSize::Chunked }, &mut headers).unwrap();
        let mut body = BytesMut::new();
        client.encode(OutboundFrame::Data { stream, data: Bytes::from_static(b"later"), end_stream: true }, &mut body).unwrap();

        // body segment first
        let mut wire = body;
        wire.extend_from_slice(&headers);
        let frames = decode_all(&mut server, &mut wire);

        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], InboundFrame::Headers { end_stream: false, .. }));
        assert!(matches!(&frames[1], InboundFrame::Data { data, end_stream: true, .. } if &data[..] == b"later"));
    }

    #[test]
    fn response_trailers_follow_data() {
        let mut server = Http3Codec::new(Role::Server, 8192);
        let mut client = Http3Codec::new(Role::Client, 8192);
        let mut wire = BytesMut::new();
        let stream = StreamId::new(0);

        let response = Response::builder().status(StatusCode::OK).body(()).unwrap();
        server.encode(OutboundFrame::Interim { stream, status: StatusCode::CONTINUE }, &mut wire).unwrap();
        server.encode(OutboundFrame::Headers { stream, head: MessageHead::from(response), payload: PayloadSize::Chunked }, &mut wire).unwrap();
        server.encode(OutboundFrame::Data { stream, data: Bytes::from_static(b"part"), end_stream: false }, &mut wire).unwrap();
        let mut trailers = HeaderMap::new();
        trailers.insert("grpc-status", "0".parse().unwrap());
        server.encode(OutboundFrame::Trailers { stream, trailers }, &mut wire).unwrap();

        let frames = decode_all(&mut client, &mut wire);
        assert_eq!(frames.len(), 3);
        assert!(matches!(&frames[0], InboundFrame::Headers { head, .. } if head.status() == Some(StatusCode::OK)));
        assert!(matches!(&frames[1], InboundFrame::Data { end_stream: false, .. }));
        let InboundFrame::Trailers { trailers, .. } = &frames[2] else {
            panic!("expected trailers, got {:?}", frames[2]);
        };
        assert_eq!(trailers.get("grpc-status").unwrap(), "0");
    }

    #[test]
    fn reset_stream_surfaces_as_reset() {
        let mut client = Http3Codec::new(Role::Client, 8192);
        let mut server = Http3Codec::new(Role::Server, 8192);
        let mut wire = BytesMut::new();
        let stream = StreamId::new(8);

        client.encode(OutboundFrame::Headers { stream, head: post("https://example.com/"), payload: PayloadSize::Chunked }, &mut wire).unwrap();
        client.encode(OutboundFrame::Reset { stream, code: frame::H3_REQUEST_CANCELLED }, &mut wire).unwrap();

        let frames = decode_all(&mut server, &mut wire);
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[1], InboundFrame::Reset { code: frame::H3_REQUEST_CANCELLED, .. }));
    }

    #[test]
    fn fin_before_headers_is_error() {
        let mut server = Http3Codec::new(Role::Server, 8192);
        let mut wire = BytesMut::new();
        frame::write_stream_frame(0, 0, &[], true, &mut wire).unwrap();
        server.decode(&mut wire).unwrap_err();
    }

    #[test]
    fn bad_header_section_rejects_only_its_stream() {
        let mut client = Http3Codec::new(Role::Client, 8192);
        let mut server = Http3Codec::new(Role::Server, 8192);
        let mut wire = BytesMut::new();

        // a response status where a request is expected
        let mut section = BytesMut::new();
        client.qpack_encoder.encode(&[HeaderField::new(Bytes::from_static(b":status"), Bytes::from_static(b"200"))], &mut section);
        let mut payload = BytesMut::new();
        frame::write_h3_frame(kind::HEADERS, &section, &mut payload).unwrap();
        payload.extend_from_slice(&[0x00, 0x03, b'a', b'b', b'c']);
        frame::write_stream_frame(0, 0, &payload, true, &mut wire).unwrap();

        let request = Request::builder().method(Method::GET).uri("https://example.com/ok").version(Version::HTTP_3).body(()).unwrap();
        client
            .encode(OutboundFrame::Headers { stream: StreamId::new(4), head: MessageHead::from(RequestHeader::from(request)), payload: PayloadSize::Empty }, &mut wire)
            .unwrap();

        let frames = decode_all(&mut server, &mut wire);
        assert_eq!(frames.len(), 2, "the rejected stream's body is dropped: {frames:?}");
        assert!(matches!(&frames[0], InboundFrame::Malformed { stream, .. } if *stream == StreamId::new(0)));
        assert!(matches!(&frames[1], InboundFrame::Headers { stream, end_stream: true, .. } if *stream == StreamId::new(4)));
    }
}

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Method, StatusCode};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{error, trace, warn};

use crate::codec::http1::body::{PayloadDecoder, PayloadEncoder};
use crate::codec::http1::header::{HeaderDecoder, HeaderEncoder};
use crate::codec::{FrameCodec, Role};
use crate::config::ProtocolVersion;
use crate::protocol::{InboundFrame, MessageHead, OutboundFrame, ParseError, PayloadItem, PayloadSize, SendError, StreamId};

const STREAM: StreamId = StreamId::CONNECTION;

/// Frame codec for HTTP/1.1 connections.
///
/// Turns request/status lines, `Content-Length` and chunked bodies and chunked
/// trailers into [`InboundFrame`]s, and serializes [`OutboundFrame`]s back.
/// After a `101 Switching Protocols` both directions become raw data frames.
#[derive(Debug)]
pub struct Http1Codec {
    role: Role,
    header_decoder: HeaderDecoder,
    header_encoder: HeaderEncoder,
    payload_decoder: Option<PayloadDecoder>,
    payload_encoder: Option<PayloadEncoder>,
    pending_trailers: Option<HeaderMap>,
    /// server: the current request is fully read, the response is not written yet
    awaiting_response: bool,
    /// server: the response was written while the request body was still arriving
    response_done: bool,
    /// server: an upgrade request keeps its inbound side open until answered
    upgrade_requested: bool,
    /// server: the upgrade was declined, the inbound side still needs its end
    end_inbound: bool,
    /// client: the request in flight is a `HEAD` request
    head_request: bool,
    upgraded: bool,
    eof_reported: bool,
}

impl Http1Codec {
    pub fn new(role: Role, max_header_bytes: usize) -> Self {
        Self {
            role,
            header_decoder: HeaderDecoder::new(max_header_bytes),
            header_encoder: HeaderEncoder,
            payload_decoder: None,
            payload_encoder: None,
            pending_trailers: None,
            awaiting_response: false,
            response_done: false,
            upgrade_requested: false,
            end_inbound: false,
            head_request: false,
            upgraded: false,
            eof_reported: false,
        }
    }

    pub fn server() -> Self {
        Self::new(Role::Server, crate::config::DEFAULT_MAX_HEADER_BYTES)
    }

    pub fn client() -> Self {
        Self::new(Role::Client, crate::config::DEFAULT_MAX_HEADER_BYTES)
    }

    /// Returns true once the connection switched protocols.
    pub fn is_upgraded(&self) -> bool {
        self.upgraded
    }

    fn last_frame(&mut self, data: Bytes, trailers: HeaderMap) -> InboundFrame {
        if self.role == Role::Server {
            self.awaiting_response = !std::mem::take(&mut self.response_done);
        }

        if trailers.is_empty() {
            InboundFrame::Data { stream: STREAM, data, end_stream: true }
        } else if data.is_empty() {
            InboundFrame::Trailers { stream: STREAM, trailers }
        } else {
            self.pending_trailers = Some(trailers);
            InboundFrame::Data { stream: STREAM, data, end_stream: false }
        }
    }

    fn decode_request(&mut self, src: &mut BytesMut) -> Result<Option<InboundFrame>, ParseError> {
        let Some((header, payload_size)) = self.header_decoder.decode(src)? else {
            return Ok(None);
        };
        self.response_done = false;

        if header.upgrade_protocol().is_some() && payload_size.is_empty() {
            trace!(protocol = header.upgrade_protocol(), "received upgrade request");
            self.upgrade_requested = true;
            self.awaiting_response = true;
            return Ok(Some(InboundFrame::Headers { stream: STREAM, head: header.into(), end_stream: false }));
        }

        let end_stream = payload_size.is_empty();
        if end_stream {
            self.awaiting_response = true;
        } else {
            self.payload_decoder = Some(payload_size.into());
        }
        Ok(Some(InboundFrame::Headers { stream: STREAM, head: header.into(), end_stream }))
    }

    fn decode_response(&mut self, src: &mut BytesMut) -> Result<Option<InboundFrame>, ParseError> {
        loop {
            let Some((head, payload_size)) = self.header_decoder.decode_response(src, self.head_request)? else {
                return Ok(None);
            };

            let status = head.status();
            if status == StatusCode::SWITCHING_PROTOCOLS {
                trace!("peer switched protocols");
                self.upgraded = true;
                return Ok(Some(InboundFrame::Headers { stream: STREAM, head: head.into(), end_stream: false }));
            }

            if status.is_informational() {
                trace!(status = status.as_u16(), "skip interim response");
                continue;
            }

            let end_stream = payload_size.is_empty();
            if !end_stream {
                self.payload_decoder = Some(payload_size.into());
            }
            return Ok(Some(InboundFrame::Headers { stream: STREAM, head: head.into(), end_stream }));
        }
    }

    fn encode_head(&mut self, head: MessageHead, payload: PayloadSize, dst: &mut BytesMut) -> Result<(), SendError> {
        if self.payload_encoder.is_some() {
            error!("expect payload item but receive message head");
            return Err(SendError::invalid_header("message head while the previous body is still being written"));
        }

        if let Some(request) = head.as_request() {
            self.head_request = request.method() == Method::HEAD;
        }
        let switching = head.status() == Some(StatusCode::SWITCHING_PROTOCOLS);

        self.header_encoder.encode((head, payload), dst)?;

        if switching {
            self.upgraded = true;
            self.awaiting_response = false;
            self.upgrade_requested = false;
            return Ok(());
        }

        if payload.is_empty() {
            self.finish_outbound();
        } else {
            self.payload_encoder = Some(payload.into());
        }
        Ok(())
    }

    fn encode_payload(&mut self, item: PayloadItem, dst: &mut BytesMut) -> Result<(), SendError> {
        let Some(encoder) = self.payload_encoder.as_mut() else {
            warn!(size = item.as_bytes().len(), "payload without message head, dropped");
            return Ok(());
        };

        let last = item.is_last();
        let result = encoder.encode(item, dst);
        if last {
            self.finish_outbound();
        }
        result
    }

    fn finish_outbound(&mut self) {
        self.payload_encoder = None;
        if self.role == Role::Server {
            self.awaiting_response = false;
            self.response_done = self.payload_decoder.is_some();
            if self.upgrade_requested {
                // declined upgrade: the request had no body after all
                self.upgrade_requested = false;
                self.end_inbound = true;
            }
        }
    }
}

impl Decoder for Http1Codec {
    type Item = InboundFrame;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(trailers) = self.pending_trailers.take() {
            return Ok(Some(InboundFrame::Trailers { stream: STREAM, trailers }));
        }

        if self.end_inbound {
            self.end_inbound = false;
            return Ok(Some(InboundFrame::Data { stream: STREAM, data: Bytes::new(), end_stream: true }));
        }

        if self.upgraded {
            if src.is_empty() {
                return Ok(None);
            }
            return Ok(Some(InboundFrame::Data { stream: STREAM, data: src.split().freeze(), end_stream: false }));
        }

        if let Some(payload_decoder) = &mut self.payload_decoder {
            return match payload_decoder.decode(src)? {
                None => Ok(None),
                Some(PayloadItem::Chunk(data)) => Ok(Some(InboundFrame::Data { stream: STREAM, data, end_stream: false })),
                Some(PayloadItem::Last { data, trailers }) => {
                    self.payload_decoder = None;
                    Ok(Some(self.last_frame(data, trailers)))
                }
            };
        }

        match self.role {
            Role::Server if self.awaiting_response => Ok(None),
            Role::Server => self.decode_request(src),
            Role::Client => self.decode_response(src),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }

        if self.upgraded && !self.eof_reported {
            self.eof_reported = true;
            return Ok(Some(InboundFrame::Data { stream: STREAM, data: Bytes::new(), end_stream: true }));
        }

        if !src.is_empty() && !self.awaiting_response {
            trace!(remaining = src.len(), "connection closed with a partial message");
        }
        Ok(None)
    }
}

impl Encoder<OutboundFrame> for Http1Codec {
    type Error = SendError;

    fn encode(&mut self, frame: OutboundFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match frame {
            OutboundFrame::Handshake | OutboundFrame::Control(_) => {
                trace!("no connection level frames in http/1.1");
                Ok(())
            }
            OutboundFrame::Headers { head, payload, .. } => self.encode_head(head, payload, dst),
            OutboundFrame::Interim { status, .. } => {
                let head = http::Response::builder().status(status).body(()).map_err(SendError::invalid_header)?;
                self.header_encoder.encode((head, PayloadSize::Empty), dst)
            }
            OutboundFrame::Data { data, end_stream, .. } => {
                if self.upgraded {
                    dst.extend_from_slice(&data);
                    return Ok(());
                }
                let item = if end_stream { PayloadItem::last(data) } else { PayloadItem::Chunk(data) };
                self.encode_payload(item, dst)
            }
            OutboundFrame::Trailers { trailers, .. } => self.encode_payload(PayloadItem::last_with_trailers(Bytes::new(), trailers), dst),
            OutboundFrame::Reset { .. } => {
                trace!("http/1.1 has no stream reset, the connection gets closed instead");
                self.payload_encoder = None;
                Ok(())
            }
        }
    }
}

impl FrameCodec for Http1Codec {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::Http11
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderValue, Response};
    use indoc::indoc;

    fn decode_all(codec: &mut Http1Codec, buf: &mut BytesMut) -> Vec<InboundFrame> {
        let mut frames = vec![];
        while let Some(frame) = codec.decode(buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn request_with_length_body() {
        let str = indoc! {r##"
        POST /echo HTTP/1.1
        Host: 127.0.0.1:8080
        Content-Length: 11

        hello world"##};

        let mut buf = BytesMut::from(str);
        let mut codec = Http1Codec::server();
        let frames = decode_all(&mut codec, &mut buf);

        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[0], InboundFrame::Headers { end_stream: false, .. }));
        match &frames[1] {
            InboundFrame::Data { data, end_stream: true, .. } => assert_eq!(&data[..], b"hello world"),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn chunked_request_with_trailers() {
        let mut buf = BytesMut::from(&b"POST /up HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\nX-Checksum: abc\r\n\r\n"[..]);
        let mut codec = Http1Codec::server();
        let frames = decode_all(&mut codec, &mut buf);

        assert_eq!(frames.len(), 3);
        assert!(matches!(&frames[1], InboundFrame::Data { end_stream: false, .. }));
        match &frames[2] {
            InboundFrame::Trailers { trailers, .. } => assert_eq!(trailers.get("x-checksum").unwrap(), "abc"),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn pipelined_request_waits_for_response() {
        let mut buf = BytesMut::from(&b"GET /a HTTP/1.1\r\nHost: x\r\n\r\nGET /b HTTP/1.1\r\nHost: x\r\n\r\n"[..]);
        let mut codec = Http1Codec::server();

        let first = decode_all(&mut codec, &mut buf);
        assert_eq!(first.len(), 1);
        assert!(first[0].is_end_stream());

        let mut out = BytesMut::new();
        let head = Response::builder().status(StatusCode::OK).body(()).unwrap();
        codec
            .encode(
                OutboundFrame::Headers { stream: STREAM, head: head.into(), payload: PayloadSize::Empty },
                &mut out,
            )
            .unwrap();

        let second = decode_all(&mut codec, &mut buf);
        assert_eq!(second.len(), 1);
        match &second[0] {
            InboundFrame::Headers { head, .. } => assert_eq!(head.as_request().unwrap().uri().path(), "/b"),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn early_response_keeps_connection_alive() {
        let mut buf = BytesMut::from(&b"POST /a HTTP/1.1\r\nHost: x\r\nContent-Length: 4\r\n\r\n"[..]);
        let mut codec = Http1Codec::server();

        let head_only = decode_all(&mut codec, &mut buf);
        assert_eq!(head_only.len(), 1);
        assert!(!head_only[0].is_end_stream());

        // answered before the body arrived
        let mut out = BytesMut::new();
        let head = Response::builder().status(StatusCode::OK).body(()).unwrap();
        codec.encode(OutboundFrame::Headers { stream: STREAM, head: head.into(), payload: PayloadSize::Empty }, &mut out).unwrap();

        buf.extend_from_slice(b"abcdGET /b HTTP/1.1\r\nHost: x\r\n\r\n");
        let rest = decode_all(&mut codec, &mut buf);
        assert_eq!(rest.len(), 2, "the next request is decoded: {rest:?}");
        assert!(matches!(&rest[0], InboundFrame::Data { data, end_stream: true, .. } if &data[..] == b"abcd"));
        match &rest[1] {
            InboundFrame::Headers { head, end_stream: true, .. } => assert_eq!(head.as_request().unwrap().uri().path(), "/b"),
            other => panic!("unexpected frame: {other:?}"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn response_with_trailers_is_chunked() {
        let mut codec = Http1Codec::server();
        let mut buf = BytesMut::from("GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        decode_all(&mut codec, &mut buf);

        let mut out = BytesMut::new();
        let head = Response::builder().status(StatusCode::OK).body(()).unwrap();
        codec
            .encode(OutboundFrame::Headers { stream: STREAM, head: head.into(), payload: PayloadSize::Chunked }, &mut out)
            .unwrap();
        codec.encode(OutboundFrame::Data { stream: STREAM, data: Bytes::from_static(b"body"), end_stream: false }, &mut out).unwrap();

        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", HeaderValue::from_static("abc"));
        codec.encode(OutboundFrame::Trailers { stream: STREAM, trailers }, &mut out).unwrap();

        assert_eq!(
            &out[..],
            &b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n4\r\nbody\r\n0\r\nx-checksum: abc\r\n\r\n"[..]
        );
    }

    #[test]
    fn expect_continue_interim() {
        let mut codec = Http1Codec::server();
        let mut out = BytesMut::new();
        codec.encode(OutboundFrame::Interim { stream: STREAM, status: StatusCode::CONTINUE }, &mut out).unwrap();
        assert_eq!(&out[..], b"HTTP/1.1 100 Continue\r\n\r\n");
    }

    #[test]
    fn client_skips_interim_responses() {
        let mut codec = Http1Codec::client();
        let mut buf = BytesMut::from(&b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok"[..]);
        let frames = decode_all(&mut codec, &mut buf);

        assert_eq!(frames.len(), 2);
        match &frames[0] {
            InboundFrame::Headers { head, .. } => assert_eq!(head.status(), Some(StatusCode::OK)),
            other => panic!("unexpected frame: {other:?}"),
        }
        assert!(frames[1].is_end_stream());
    }

    #[test]
    fn upgrade_switches_to_raw_data() {
        let mut codec = Http1Codec::server();
        let mut buf = BytesMut::from(&b"GET /chat HTTP/1.1\r\nHost: x\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\r\n"[..]);

        let frames = decode_all(&mut codec, &mut buf);
        assert_eq!(frames.len(), 1);
        assert!(!frames[0].is_end_stream());

        let mut out = BytesMut::new();
        let head = Response::builder()
            .status(StatusCode::SWITCHING_PROTOCOLS)
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .body(())
            .unwrap();
        codec
            .encode(OutboundFrame::Headers { stream: STREAM, head: head.into(), payload: PayloadSize::Empty }, &mut out)
            .unwrap();
        assert!(codec.is_upgraded());

        buf.extend_from_slice(b"\x81\x05hello");
        match codec.decode(&mut buf).unwrap() {
            Some(InboundFrame::Data { data, end_stream: false, .. }) => assert_eq!(&data[..], b"\x81\x05hello"),
            other => panic!("unexpected frame: {other:?}"),
        }

        assert!(codec.decode_eof(&mut buf).unwrap().unwrap().is_end_stream());
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn declined_upgrade_ends_the_request() {
        let mut codec = Http1Codec::server();
        let mut buf = BytesMut::from(&b"GET /chat HTTP/1.1\r\nHost: x\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\r\n"[..]);
        decode_all(&mut codec, &mut buf);

        let mut out = BytesMut::new();
        let head = Response::builder().status(StatusCode::OK).body(()).unwrap();
        codec
            .encode(OutboundFrame::Headers { stream: STREAM, head: head.into(), payload: PayloadSize::Empty }, &mut out)
            .unwrap();

        let frames = decode_all(&mut codec, &mut buf);
        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], InboundFrame::Data { end_stream: true, .. }));
        assert!(!codec.is_upgraded());
    }
}

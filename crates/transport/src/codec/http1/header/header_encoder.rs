//! HTTP/1.1 head encoder for status and request lines.
//!
//! The encoder writes the start line followed by the header fields and fixes up
//! `Content-Length` / `Transfer-Encoding` to match the framing the body will be
//! sent with.

use crate::protocol::{MessageHead, PayloadSize, RequestHeader, ResponseHead, SendError};

use bytes::{BufMut, BytesMut};

use http::{HeaderMap, HeaderValue, Method, StatusCode, Version, header};
use std::io;
use std::io::Write;
use tokio_util::codec::Encoder;
use tracing::error;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

const CHUNKED_VALUE: HeaderValue = HeaderValue::from_static("chunked");
const ZERO_VALUE: HeaderValue = HeaderValue::from_static("0");

/// Encoder for HTTP/1.1 message heads.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderEncoder;

impl Encoder<(MessageHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (MessageHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            (MessageHead::Response(head), payload_size) => self.encode((head, payload_size), dst),
            (MessageHead::Request(head), payload_size) => self.encode((head, payload_size), dst),
        }
    }
}

impl Encoder<(ResponseHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut header, payload_size) = item;

        dst.reserve(INIT_HEADER_SIZE);
        let status = header.status();
        write!(FastWrite(dst), "{} {} {}\r\n", version_str(header.version())?, status.as_str(), status.canonical_reason().unwrap_or_default())?;

        // informational and bodiless statuses carry no framing headers
        if !(status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED) {
            set_framing(header.headers_mut(), payload_size, true);
        }

        write_headers(header.headers(), dst);
        Ok(())
    }
}

impl Encoder<(RequestHeader, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, item: (RequestHeader, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut header, payload_size) = item;

        dst.reserve(INIT_HEADER_SIZE);
        let target = header.uri().path_and_query().map_or("/", |path| path.as_str());
        let target = if header.method() == Method::CONNECT { header.uri().authority().map_or(target, |a| a.as_str()) } else { target };
        write!(FastWrite(dst), "{} {} {}\r\n", header.method().as_str(), target, version_str(header.version())?)?;

        if !header.headers().contains_key(header::HOST) {
            if let Some(host) = header.uri().authority().and_then(|a| HeaderValue::from_str(a.as_str()).ok()) {
                header.headers_mut().insert(header::HOST, host);
            }
        }

        let need_body = header.need_body();
        set_framing(header.headers_mut(), payload_size, need_body);

        write_headers(header.headers(), dst);
        Ok(())
    }
}

fn version_str(version: Version) -> Result<&'static str, SendError> {
    match version {
        Version::HTTP_11 => Ok("HTTP/1.1"),
        Version::HTTP_10 => Ok("HTTP/1.0"),
        v => {
            error!(http_version = ?v, "unsupported http version");
            Err(io::Error::from(io::ErrorKind::Unsupported).into())
        }
    }
}

/// Sets the appropriate content length or transfer encoding header.
///
/// `announce_empty` writes `Content-Length: 0` for empty bodies.
fn set_framing(headers: &mut HeaderMap, payload_size: PayloadSize, announce_empty: bool) {
    match payload_size {
        PayloadSize::Length(n) => {
            headers.remove(header::TRANSFER_ENCODING);
            headers.insert(header::CONTENT_LENGTH, n.into());
        }
        PayloadSize::Chunked => {
            headers.remove(header::CONTENT_LENGTH);
            headers.insert(header::TRANSFER_ENCODING, CHUNKED_VALUE);
        }
        PayloadSize::Empty => {
            headers.remove(header::TRANSFER_ENCODING);
            if announce_empty {
                headers.insert(header::CONTENT_LENGTH, ZERO_VALUE);
            }
        }
    }
}

fn write_headers(headers: &HeaderMap, dst: &mut BytesMut) {
    for (header_name, header_value) in headers {
        dst.put_slice(header_name.as_ref());
        dst.put_slice(b": ");
        dst.put_slice(header_value.as_ref());
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(b"\r\n");
}

/// Writer for formatting straight into the reserved `BytesMut`.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Request, Response};

    #[test]
    fn encodes_chunked_response() {
        let head = Response::builder().status(StatusCode::OK).header("content-type", "text/plain").body(()).unwrap();
        let mut dst = BytesMut::new();

        HeaderEncoder.encode((head, PayloadSize::Chunked), &mut dst).unwrap();

        assert_eq!(&dst[..], b"HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ntransfer-encoding: chunked\r\n\r\n");
    }

    #[test]
    fn empty_response_announces_zero_length() {
        let head = Response::builder().status(StatusCode::NOT_FOUND).body(()).unwrap();
        let mut dst = BytesMut::new();

        HeaderEncoder.encode((head, PayloadSize::Empty), &mut dst).unwrap();

        assert_eq!(&dst[..], b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\n\r\n");
    }

    #[test]
    fn switching_protocols_has_no_framing() {
        let head = Response::builder()
            .status(StatusCode::SWITCHING_PROTOCOLS)
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .body(())
            .unwrap();
        let mut dst = BytesMut::new();

        HeaderEncoder.encode((head, PayloadSize::Empty), &mut dst).unwrap();

        assert_eq!(&dst[..], b"HTTP/1.1 101 Switching Protocols\r\nconnection: upgrade\r\nupgrade: websocket\r\n\r\n");
    }

    #[test]
    fn encodes_request_with_host_from_uri() {
        let request = Request::builder().method(Method::POST).uri("http://example.com:8080/submit?x=1").body(()).unwrap();
        let mut dst = BytesMut::new();

        HeaderEncoder.encode((RequestHeader::from(request), PayloadSize::Length(3)), &mut dst).unwrap();

        assert_eq!(&dst[..], b"POST /submit?x=1 HTTP/1.1\r\nhost: example.com:8080\r\ncontent-length: 3\r\n\r\n");
    }

    #[test]
    fn get_request_has_no_content_length() {
        let request = Request::builder().uri("/").header("host", "localhost").body(()).unwrap();
        let mut dst = BytesMut::new();

        HeaderEncoder.encode((RequestHeader::from(request), PayloadSize::Empty), &mut dst).unwrap();

        assert_eq!(&dst[..], b"GET / HTTP/1.1\r\nhost: localhost\r\n\r\n");
    }

    #[test]
    fn rejects_http2_heads() {
        let head = Response::builder().version(Version::HTTP_2).body(()).unwrap();
        let mut dst = BytesMut::new();

        assert!(HeaderEncoder.encode((head, PayloadSize::Empty), &mut dst).is_err());
    }
}

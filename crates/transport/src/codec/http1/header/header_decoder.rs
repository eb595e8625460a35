//! HTTP/1.1 head decoder for request and status lines.
//!
//! # Features
//!
//! - Efficient zero-copy header parsing using `httparse`
//! - Support for HTTP/1.0 and HTTP/1.1
//! - Memory safety through `MaybeUninit` for header allocation
//! - Built-in protection against oversized headers
//! - Payload framing selection based on headers (RFC 9112 section 6.3)
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header size: configurable, 8KB by default
//!
//! The implementation uses an index-based approach to avoid copying header data,
//! recording the byte ranges of header names and values for efficient conversion
//! to the final header structure.

use std::mem::MaybeUninit;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::config::DEFAULT_MAX_HEADER_BYTES;
use crate::ensure;

use crate::protocol::{ParseError, PayloadSize, RequestHeader, ResponseHead};

/// Maximum number of headers allowed in a message head
const MAX_HEADER_NUM: usize = 64;

/// Decoder for HTTP/1.1 message heads.
///
/// As a tokio [`Decoder`] it decodes requests; [`HeaderDecoder::decode_response`]
/// is the client side counterpart.
#[derive(Debug, Clone, Copy)]
pub struct HeaderDecoder {
    max_header_bytes: usize,
}

impl Default for HeaderDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HEADER_BYTES)
    }
}

impl HeaderDecoder {
    pub fn new(max_header_bytes: usize) -> Self {
        Self { max_header_bytes }
    }

    /// Decodes a status line and headers.
    ///
    /// `head_request` tells whether the response answers a `HEAD` request, in
    /// which case it never carries a body.
    pub fn decode_response(&mut self, src: &mut BytesMut, head_request: bool) -> Result<Option<(ResponseHead, PayloadSize)>, ParseError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut resp = httparse::Response::new(&mut headers);

        let parsed_result = resp.parse(src).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        });

        match parsed_result? {
            Status::Complete(body_offset) => {
                trace!(head_size = body_offset, "parsed response head");
                ensure!(body_offset <= self.max_header_bytes, ParseError::too_large_header(body_offset, self.max_header_bytes));

                let header_count = resp.headers.len();
                let mut header_index: [HeaderIndex; MAX_HEADER_NUM] = EMPTY_HEADER_INDEX_ARRAY;
                HeaderIndex::record(src, resp.headers, &mut header_index);

                let version = parse_version(resp.version)?;
                let status = resp.code.and_then(|code| StatusCode::from_u16(code).ok()).ok_or(ParseError::InvalidStatus)?;

                let mut response = Response::builder().status(status).version(version).body(()).map_err(ParseError::invalid_header)?;

                let header_bytes = src.split_to(body_offset).freeze();
                fill_headers(response.headers_mut(), &header_bytes, &header_index[..header_count])?;

                let payload_size = parse_response_payload(&response, head_request)?;
                Ok(Some((response, payload_size)))
            }
            Status::Partial => {
                ensure!(src.len() <= self.max_header_bytes, ParseError::too_large_header(src.len(), self.max_header_bytes));
                Ok(None)
            }
        }
    }
}

impl Decoder for HeaderDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    /// Attempts to decode a request head from the provided bytes buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((header, payload_size)))` if a complete header was successfully parsed
    /// - `Ok(None)` if more data is needed
    /// - `Err(ParseError)` if parsing failed
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Minimum valid HTTP request needs at least "GET / HTTP/1.1\r\n\r\n"
        if src.len() < 14 {
            return Ok(None);
        }

        let mut req = httparse::Request::new(&mut []);
        // SAFETY: an array of `MaybeUninit` needs no initialization
        let mut headers: [MaybeUninit<httparse::Header>; MAX_HEADER_NUM] = unsafe { MaybeUninit::uninit().assume_init() };

        let parsed_result = req.parse_with_uninit_headers(src, &mut headers).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        });

        match parsed_result? {
            Status::Complete(body_offset) => {
                trace!(head_size = body_offset, "parsed request head");
                ensure!(body_offset <= self.max_header_bytes, ParseError::too_large_header(body_offset, self.max_header_bytes));

                let header_count = req.headers.len();
                ensure!(header_count <= MAX_HEADER_NUM, ParseError::too_many_headers(header_count));

                let mut header_index: [HeaderIndex; MAX_HEADER_NUM] = EMPTY_HEADER_INDEX_ARRAY;
                HeaderIndex::record(src, req.headers, &mut header_index);

                let version = parse_version(req.version)?;

                let mut request = Request::builder()
                    .method(req.method.ok_or(ParseError::InvalidMethod)?)
                    .uri(req.path.ok_or(ParseError::InvalidUri)?)
                    .version(version)
                    .body(())
                    .map_err(|_e| ParseError::InvalidUri)?;

                let header_bytes = src.split_to(body_offset).freeze();
                fill_headers(request.headers_mut(), &header_bytes, &header_index[..header_count])?;

                let header = RequestHeader::from(request);
                let payload_size = parse_request_payload(&header)?;

                Ok(Some((header, payload_size)))
            }
            Status::Partial => {
                ensure!(src.len() <= self.max_header_bytes, ParseError::too_large_header(src.len(), self.max_header_bytes));
                Ok(None)
            }
        }
    }
}

fn parse_version(version: Option<u8>) -> Result<http::Version, ParseError> {
    match version {
        Some(0) => Ok(http::Version::HTTP_10),
        Some(1) => Ok(http::Version::HTTP_11),
        v => Err(ParseError::InvalidVersion(v)),
    }
}

fn fill_headers(headers: &mut HeaderMap, header_bytes: &Bytes, indices: &[HeaderIndex]) -> Result<(), ParseError> {
    headers.reserve(indices.len());
    for index in indices {
        let name = HeaderName::from_bytes(&header_bytes[index.name.0..index.name.1]).map_err(ParseError::invalid_header)?;

        // SAFETY: httparse verified that header values only contain visible ASCII and tab
        let value = unsafe { HeaderValue::from_maybe_shared_unchecked(header_bytes.slice(index.value.0..index.value.1)) };

        headers.append(name, value);
    }
    Ok(())
}

/// Stores the byte range positions of a header's name and value within the original buffer.
#[derive(Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

const EMPTY_HEADER_INDEX: HeaderIndex = HeaderIndex { name: (0, 0), value: (0, 0) };

const EMPTY_HEADER_INDEX_ARRAY: [HeaderIndex; MAX_HEADER_NUM] = [EMPTY_HEADER_INDEX; MAX_HEADER_NUM];

impl HeaderIndex {
    /// Records the byte positions of header names and values from the parsed headers.
    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut [HeaderIndex]) {
        let bytes_ptr = bytes.as_ptr() as usize;
        for (header, indices) in headers.iter().zip(indices.iter_mut()) {
            let name_start = header.name.as_ptr() as usize - bytes_ptr;
            let name_end = name_start + header.name.len();
            indices.name = (name_start, name_end);
            let value_start = header.value.as_ptr() as usize - bytes_ptr;
            let value_end = value_start + header.value.len();
            indices.value = (value_start, value_end);
        }
    }
}

/// Determines the request body framing from `Transfer-Encoding` and `Content-Length`.
///
/// refer: <https://www.rfc-editor.org/rfc/rfc9112.html#name-transfer-encoding>
fn parse_request_payload(header: &RequestHeader) -> Result<PayloadSize, ParseError> {
    if !header.need_body() {
        return Ok(PayloadSize::Empty);
    }
    parse_framing(header.headers())
}

/// Determines the response body framing.
///
/// `1xx`, `204` and `304` responses and responses to `HEAD` have no body. A
/// response without framing headers is treated as bodiless, close-delimited
/// bodies are not supported.
fn parse_response_payload(response: &ResponseHead, head_request: bool) -> Result<PayloadSize, ParseError> {
    let status = response.status();
    if head_request || status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
        return Ok(PayloadSize::Empty);
    }
    parse_framing(response.headers())
}

fn parse_framing(headers: &HeaderMap) -> Result<PayloadSize, ParseError> {
    let te_header = headers.get(http::header::TRANSFER_ENCODING);
    let cl_header = headers.get(http::header::CONTENT_LENGTH);

    match (te_header, cl_header) {
        (None, None) => Ok(PayloadSize::Empty),

        (te_value @ Some(_), None) => {
            if is_chunked(te_value) {
                Ok(PayloadSize::Chunked)
            } else {
                Ok(PayloadSize::Empty)
            }
        }

        (None, Some(cl_value)) => {
            let cl_str = cl_value.to_str().map_err(|_e| ParseError::invalid_content_length("value can't to_str"))?;

            let length =
                cl_str.trim().parse::<u64>().map_err(|_e| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;

            if length == 0 { Ok(PayloadSize::Empty) } else { Ok(PayloadSize::Length(length)) }
        }

        (Some(_), Some(_)) => Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers")),
    }
}

/// Checks if the Transfer-Encoding header indicates chunked encoding.
///
/// Chunked must be the last encoding if present.
fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    const CHUNKED: &[u8] = b"chunked";
    if let Some(value) = header_value {
        if let Some(bytes) = value.as_bytes().rsplit(|b| *b == b',').next() {
            return bytes.trim_ascii() == CHUNKED;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, Version};
    use indoc::indoc;

    #[test]
    fn check_is_chunked() {
        {
            let headers = HeaderMap::new();
            assert!(!is_chunked(headers.get(http::header::TRANSFER_ENCODING)));
        }

        {
            let mut headers = HeaderMap::new();
            headers.insert("Accept", "foo".parse().unwrap());
            headers.insert("Transfer-Encoding", "gzip, chunked".parse().unwrap());
            assert!(is_chunked(headers.get(http::header::TRANSFER_ENCODING)));
        }

        {
            let mut headers = HeaderMap::new();
            headers.insert("Transfer-Encoding", "chunked, gzip".parse().unwrap());
            assert!(!is_chunked(headers.get(http::header::TRANSFER_ENCODING)));
        }
    }

    #[test]
    fn test_bytes_mut_lens() {
        let str = indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        123"##};

        let mut bytes = BytesMut::from(str);
        let result = HeaderDecoder::default().decode(&mut bytes).unwrap();

        assert!(result.is_some());
        assert_eq!(&bytes[..], &b"123"[..]);
    }

    #[test]
    fn from_curl() {
        let str = indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "##};

        let mut buf = BytesMut::from(str);

        let (header, payload_size) = HeaderDecoder::default().decode(&mut buf).unwrap().unwrap();

        assert!(payload_size.is_empty());

        assert_eq!(header.method(), &Method::GET);
        assert_eq!(header.version(), Version::HTTP_11);
        assert_eq!(header.uri().path(), "/index.html");
        assert_eq!(header.uri().query(), None);
        assert_eq!(header.headers().len(), 3);
        assert_eq!(header.headers().get(http::header::HOST), Some(&HeaderValue::from_str("127.0.0.1:8080").unwrap()));
        assert_eq!(header.headers().get(http::header::USER_AGENT), Some(&HeaderValue::from_str("curl/7.79.1").unwrap()));
    }

    #[test]
    fn post_with_chunked_body() {
        let str = indoc! {r##"
        POST /upload?id=7 HTTP/1.1
        Host: 127.0.0.1:8080
        Transfer-Encoding: chunked

        "##};

        let mut buf = BytesMut::from(str);
        let (header, payload_size) = HeaderDecoder::default().decode(&mut buf).unwrap().unwrap();

        assert_eq!(header.method(), &Method::POST);
        assert_eq!(header.uri().query(), Some("id=7"));
        assert!(payload_size.is_chunked());
    }

    #[test]
    fn conflicting_framing_is_rejected() {
        let str = indoc! {r##"
        POST /upload HTTP/1.1
        Content-Length: 5
        Transfer-Encoding: chunked

        "##};

        let mut buf = BytesMut::from(str);
        assert!(matches!(HeaderDecoder::default().decode(&mut buf), Err(ParseError::InvalidContentLength { .. })));
    }

    #[test]
    fn oversized_head_is_rejected() {
        let mut buf = BytesMut::from("GET / HTTP/1.1\r\nX-Padding: ");
        buf.extend_from_slice(&[b'a'; 256]);

        let result = HeaderDecoder::new(128).decode(&mut buf);
        assert!(matches!(result, Err(ParseError::TooLargeHeader { max_size: 128, .. })));
    }

    #[test]
    fn decode_response_head() {
        let str = indoc! {r##"
        HTTP/1.1 200 OK
        Content-Length: 12
        Content-Type: text/plain

        hello world!"##};

        let mut buf = BytesMut::from(str);
        let (response, payload_size) = HeaderDecoder::default().decode_response(&mut buf, false).unwrap().unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(payload_size, PayloadSize::Length(12));
        assert_eq!(response.headers().get(http::header::CONTENT_TYPE).unwrap(), "text/plain");
        assert_eq!(&buf[..], b"hello world!");
    }

    #[test]
    fn head_response_has_no_body() {
        let mut buf = BytesMut::from("HTTP/1.1 200 OK\r\nContent-Length: 12\r\n\r\n");
        let (_response, payload_size) = HeaderDecoder::default().decode_response(&mut buf, true).unwrap().unwrap();
        assert!(payload_size.is_empty());
    }

    #[test]
    fn not_modified_has_no_body() {
        let mut buf = BytesMut::from("HTTP/1.1 304 Not Modified\r\nTransfer-Encoding: chunked\r\n\r\n");
        let (response, payload_size) = HeaderDecoder::default().decode_response(&mut buf, false).unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert!(payload_size.is_empty());
    }
}

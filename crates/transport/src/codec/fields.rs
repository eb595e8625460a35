//! Header field lists shared by the HTTP/2 and HTTP/3 codecs.
//!
//! HPACK and QPACK both carry the request line and status line as
//! pseudo-header fields (`:method`, `:scheme`, `:authority`, `:path`,
//! `:status`). This module maps between those field lists and [`MessageHead`].

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING, UPGRADE};
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode, Uri, Version};

use crate::codec::Role;
use crate::protocol::{MessageHead, ParseError, PayloadSize, RequestHeader};

/// One decoded or to-be-encoded header field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: Bytes,
    pub value: Bytes,
}

impl HeaderField {
    pub fn new(name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self { name: name.into(), value: value.into() }
    }

    pub fn is_pseudo(&self) -> bool {
        self.name.first() == Some(&b':')
    }

    /// Size as accounted by the HPACK and QPACK dynamic tables.
    pub fn size(&self) -> usize {
        self.name.len() + self.value.len() + 32
    }
}

fn is_connection_specific(name: &HeaderName) -> bool {
    name == CONNECTION || name == TRANSFER_ENCODING || name == UPGRADE || name == HOST || name == "keep-alive" || name == "proxy-connection"
}

fn push_headers(fields: &mut Vec<HeaderField>, headers: &HeaderMap) {
    for (name, value) in headers {
        if is_connection_specific(name) {
            continue;
        }
        fields.push(HeaderField::new(Bytes::copy_from_slice(name.as_str().as_bytes()), Bytes::copy_from_slice(value.as_bytes())));
    }
}

/// Converts a message head into a field list, pseudo-headers first.
pub fn head_to_fields(head: &MessageHead, payload: PayloadSize) -> Vec<HeaderField> {
    let mut fields = Vec::with_capacity(head.headers().len() + 4);

    match head {
        MessageHead::Request(request) => {
            let uri = request.uri();
            fields.push(HeaderField::new(Bytes::copy_from_slice(b":method"), Bytes::copy_from_slice(request.method().as_str().as_bytes())));

            if request.method() != Method::CONNECT {
                let scheme = uri.scheme_str().unwrap_or("http");
                fields.push(HeaderField::new(Bytes::from_static(b":scheme"), Bytes::copy_from_slice(scheme.as_bytes())));
            }

            let authority =
                uri.authority().map(|a| Bytes::copy_from_slice(a.as_str().as_bytes())).or_else(|| request.headers().get(HOST).map(|h| Bytes::copy_from_slice(h.as_bytes())));
            if let Some(authority) = authority {
                fields.push(HeaderField::new(Bytes::from_static(b":authority"), authority));
            }

            if request.method() != Method::CONNECT {
                let path = uri.path_and_query().map_or("/", PathAndQuery::as_str);
                fields.push(HeaderField::new(Bytes::from_static(b":path"), Bytes::copy_from_slice(path.as_bytes())));
            }
        }
        MessageHead::Response(response) => {
            fields.push(HeaderField::new(Bytes::from_static(b":status"), Bytes::copy_from_slice(response.status().as_str().as_bytes())));
        }
    }

    push_headers(&mut fields, head.headers());

    if let PayloadSize::Length(length) = payload {
        if !head.headers().contains_key(CONTENT_LENGTH) {
            fields.push(HeaderField::new(Bytes::from_static(b"content-length"), Bytes::from(length.to_string())));
        }
    }

    fields
}

/// Converts a trailer map into a field list.
pub fn trailers_to_fields(trailers: &HeaderMap) -> Vec<HeaderField> {
    let mut fields = Vec::with_capacity(trailers.len());
    push_headers(&mut fields, trailers);
    fields
}

fn append_regular(headers: &mut HeaderMap, field: HeaderField) -> Result<(), ParseError> {
    let name = HeaderName::from_bytes(&field.name).map_err(ParseError::invalid_header)?;
    let value = HeaderValue::from_maybe_shared(field.value).map_err(ParseError::invalid_header)?;
    headers.append(name, value);
    Ok(())
}

/// Builds the message head the peer sent.
///
/// A server decodes requests, a client decodes responses.
pub fn fields_to_head(fields: Vec<HeaderField>, local: Role, version: Version) -> Result<MessageHead, ParseError> {
    match local {
        Role::Server => fields_to_request(fields, version).map(MessageHead::from),
        Role::Client => fields_to_response(fields, version).map(MessageHead::from),
    }
}

fn fields_to_request(fields: Vec<HeaderField>, version: Version) -> Result<RequestHeader, ParseError> {
    let mut method = None;
    let mut scheme = None;
    let mut authority = None;
    let mut path = None;
    let mut headers = HeaderMap::with_capacity(fields.len());

    for field in fields {
        if !field.is_pseudo() {
            append_regular(&mut headers, field)?;
            continue;
        }
        match &field.name[..] {
            b":method" => method = Some(Method::from_bytes(&field.value).map_err(|_e| ParseError::InvalidMethod)?),
            b":scheme" => scheme = Some(Scheme::try_from(&field.value[..]).map_err(|_e| ParseError::InvalidUri)?),
            b":authority" => authority = Some(Authority::try_from(&field.value[..]).map_err(|_e| ParseError::InvalidUri)?),
            b":path" => path = Some(PathAndQuery::try_from(&field.value[..]).map_err(|_e| ParseError::InvalidUri)?),
            other => return Err(ParseError::invalid_header(format!("unknown pseudo header {}", String::from_utf8_lossy(other)))),
        }
    }

    let method = method.ok_or(ParseError::InvalidMethod)?;
    let uri = match (scheme, authority, path) {
        (Some(scheme), Some(authority), Some(path)) => Uri::builder().scheme(scheme).authority(authority).path_and_query(path),
        (_, _, Some(path)) => Uri::builder().path_and_query(path),
        (None, Some(authority), None) if method == Method::CONNECT => Uri::builder().authority(authority),
        _ => return Err(ParseError::InvalidUri),
    };
    let uri = uri.build().map_err(|_e| ParseError::InvalidUri)?;

    let mut request = Request::builder().method(method).uri(uri).version(version).body(()).map_err(|_e| ParseError::InvalidUri)?;
    *request.headers_mut() = headers;
    Ok(RequestHeader::from(request))
}

fn fields_to_response(fields: Vec<HeaderField>, version: Version) -> Result<Response<()>, ParseError> {
    let mut status = None;
    let mut headers = HeaderMap::with_capacity(fields.len());

    for field in fields {
        if !field.is_pseudo() {
            append_regular(&mut headers, field)?;
            continue;
        }
        match &field.name[..] {
            b":status" => status = Some(StatusCode::from_bytes(&field.value).map_err(|_e| ParseError::InvalidStatus)?),
            other => return Err(ParseError::invalid_header(format!("unknown pseudo header {}", String::from_utf8_lossy(other)))),
        }
    }

    let mut response = Response::builder().status(status.ok_or(ParseError::InvalidStatus)?).version(version).body(()).map_err(|_e| ParseError::InvalidStatus)?;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Builds a trailer map, pseudo-headers are not allowed in trailers.
pub fn fields_to_trailers(fields: Vec<HeaderField>) -> Result<HeaderMap, ParseError> {
    let mut trailers = HeaderMap::with_capacity(fields.len());
    for field in fields {
        if field.is_pseudo() {
            return Err(ParseError::invalid_header("pseudo header in trailers"));
        }
        append_regular(&mut trailers, field)?;
    }
    Ok(trailers)
}

/// Framing a decoded head announces for its body.
pub fn payload_size(head: &MessageHead, end_stream: bool) -> PayloadSize {
    if end_stream {
        return PayloadSize::Empty;
    }
    head.headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map_or(PayloadSize::Chunked, PayloadSize::Length)
}

/// Appends an integer with an `n`-bit prefix, `flags` fill the high bits of the first byte.
#[allow(clippy::cast_possible_truncation, reason = "every byte written is masked or bounded by the prefix")]
pub fn encode_integer(value: usize, prefix_bits: u8, flags: u8, dst: &mut BytesMut) {
    let mask = (1usize << prefix_bits) - 1;
    if value < mask {
        dst.put_u8(flags | value as u8);
        return;
    }

    dst.put_u8(flags | mask as u8);
    let mut rest = value - mask;
    while rest >= 0x80 {
        dst.put_u8((rest & 0x7f) as u8 | 0x80);
        rest >>= 7;
    }
    dst.put_u8(rest as u8);
}

/// Reads an integer with an `n`-bit prefix, returns the value and the bytes consumed.
pub fn decode_integer(src: &[u8], prefix_bits: u8) -> Result<(usize, usize), ParseError> {
    let mask = (1usize << prefix_bits) - 1;
    let first = usize::from(*src.first().ok_or_else(|| ParseError::compression("truncated integer"))?) & mask;
    if first < mask {
        return Ok((first, 1));
    }

    let mut value = mask;
    let mut shift = 0u32;
    for (i, byte) in src.iter().enumerate().skip(1) {
        if shift > 28 {
            return Err(ParseError::compression("integer overflow"));
        }
        value += usize::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
    }
    Err(ParseError::compression("truncated integer"))
}

/// Appends a string literal, never Huffman coded.
pub fn encode_string(value: &[u8], prefix_bits: u8, flags: u8, dst: &mut BytesMut) {
    encode_integer(value.len(), prefix_bits, flags, dst);
    dst.extend_from_slice(value);
}

/// Reads a string literal whose length has an `n`-bit prefix and whose
/// Huffman flag is the bit just above it.
pub fn decode_string(src: &[u8], prefix_bits: u8) -> Result<(Bytes, usize), ParseError> {
    let huffman = src.first().is_some_and(|b| b & (1 << prefix_bits) != 0);
    if huffman {
        return Err(ParseError::compression("huffman coded strings are not supported"));
    }
    let (len, consumed) = decode_integer(src, prefix_bits)?;
    let end = consumed.checked_add(len).filter(|end| *end <= src.len()).ok_or_else(|| ParseError::compression("truncated string literal"))?;
    Ok((Bytes::copy_from_slice(&src[consumed..end]), end))
}

//! QPACK field sections (RFC 9204) restricted to the static table.
//!
//! Both sides advertise a dynamic table capacity of zero, so a conforming
//! peer never references the dynamic table. Sections that do are rejected.

use bytes::{Bytes, BytesMut};

use crate::codec::fields::{decode_integer, decode_string, encode_integer, encode_string, HeaderField};
use crate::protocol::ParseError;

static STATIC_TABLE: [(&str, &str); 99] = [
    (":authority", ""),
    (":path", "/"),
    ("age", "0"),
    ("content-disposition", ""),
    ("content-length", "0"),
    ("cookie", ""),
    ("date", ""),
    ("etag", ""),
    ("if-modified-since", ""),
    ("if-none-match", ""),
    ("last-modified", ""),
    ("link", ""),
    ("location", ""),
    ("referer", ""),
    ("set-cookie", ""),
    (":method", "CONNECT"),
    (":method", "DELETE"),
    (":method", "GET"),
    (":method", "HEAD"),
    (":method", "OPTIONS"),
    (":method", "POST"),
    (":method", "PUT"),
    (":scheme", "http"),
    (":scheme", "https"),
    (":status", "103"),
    (":status", "200"),
    (":status", "304"),
    (":status", "404"),
    (":status", "503"),
    ("accept", "*/*"),
    ("accept", "application/dns-message"),
    ("accept-encoding", "gzip, deflate, br"),
    ("accept-ranges", "bytes"),
    ("access-control-allow-headers", "cache-control"),
    ("access-control-allow-headers", "content-type"),
    ("access-control-allow-origin", "*"),
    ("cache-control", "max-age=0"),
    ("cache-control", "max-age=2592000"),
    ("cache-control", "max-age=604800"),
    ("cache-control", "no-cache"),
    ("cache-control", "no-store"),
    ("cache-control", "public, max-age=31536000"),
    ("content-encoding", "br"),
    ("content-encoding", "gzip"),
    ("content-type", "application/dns-message"),
    ("content-type", "application/javascript"),
    ("content-type", "application/json"),
    ("content-type", "application/x-www-form-urlencoded"),
    ("content-type", "image/gif"),
    ("content-type", "image/jpeg"),
    ("content-type", "image/png"),
    ("content-type", "text/css"),
    ("content-type", "text/html; charset=utf-8"),
    ("content-type", "text/plain"),
    ("content-type", "text/plain;charset=utf-8"),
    ("range", "bytes=0-"),
    ("strict-transport-security", "max-age=31536000"),
    ("strict-transport-security", "max-age=31536000; includesubdomains"),
    ("strict-transport-security", "max-age=31536000; includesubdomains; preload"),
    ("vary", "accept-encoding"),
    ("vary", "origin"),
    ("x-content-type-options", "nosniff"),
    ("x-xss-protection", "1; mode=block"),
    (":status", "100"),
    (":status", "204"),
    (":status", "206"),
    (":status", "302"),
    (":status", "400"),
    (":status", "403"),
    (":status", "421"),
    (":status", "425"),
    (":status", "500"),
    ("accept-language", ""),
    ("access-control-allow-credentials", "FALSE"),
    ("access-control-allow-credentials", "TRUE"),
    ("access-control-allow-headers", "*"),
    ("access-control-allow-methods", "get"),
    ("access-control-allow-methods", "get, post, options"),
    ("access-control-allow-methods", "options"),
    ("access-control-expose-headers", "content-length"),
    ("access-control-request-headers", "content-type"),
    ("access-control-request-method", "get"),
    ("access-control-request-method", "post"),
    ("alt-svc", "clear"),
    ("authorization", ""),
    ("content-security-policy", "script-src 'none'; object-src 'none'; base-uri 'none'"),
    ("early-data", "1"),
    ("expect-ct", ""),
    ("forwarded", ""),
    ("if-range", ""),
    ("origin", ""),
    ("purpose", "prefetch"),
    ("server", ""),
    ("timing-allow-origin", "*"),
    ("upgrade-insecure-requests", "1"),
    ("user-agent", ""),
    ("x-forwarded-for", ""),
    ("x-frame-options", "deny"),
    ("x-frame-options", "sameorigin"),
];

fn static_field(index: usize) -> Result<HeaderField, ParseError> {
    let (name, value) = STATIC_TABLE.get(index).ok_or_else(|| ParseError::compression(format!("static index {index} out of range")))?;
    Ok(HeaderField::new(Bytes::from_static(name.as_bytes()), Bytes::from_static(value.as_bytes())))
}

fn dynamic_reference() -> ParseError {
    ParseError::compression("dynamic table references are not supported")
}

#[derive(Debug)]
pub struct QpackDecoder {
    max_section_size: usize,
}

impl QpackDecoder {
    pub fn new(max_section_size: usize) -> Self {
        Self { max_section_size }
    }

    pub fn decode(&self, section: &[u8]) -> Result<Vec<HeaderField>, ParseError> {
        let (required_insert_count, used) = decode_integer(section, 8)?;
        if required_insert_count != 0 {
            return Err(dynamic_reference());
        }
        let (_delta_base, base_len) = decode_integer(&section[used..], 7)?;
        let mut rest = &section[used + base_len..];

        let mut fields = Vec::new();
        let mut section_size = 0usize;
        while let Some(&first) = rest.first() {
            let (field, consumed) = if first & 0x80 != 0 {
                // indexed field line
                if first & 0x40 == 0 {
                    return Err(dynamic_reference());
                }
                let (index, consumed) = decode_integer(rest, 6)?;
                (static_field(index)?, consumed)
            } else if first & 0x40 != 0 {
                // literal with name reference
                if first & 0x10 == 0 {
                    return Err(dynamic_reference());
                }
                let (index, mut consumed) = decode_integer(rest, 4)?;
                let (value, used) = decode_string(&rest[consumed..], 7)?;
                consumed += used;
                (HeaderField::new(static_field(index)?.name, value), consumed)
            } else if first & 0x20 != 0 {
                // literal with literal name
                let (name, mut consumed) = decode_string(rest, 3)?;
                let (value, used) = decode_string(&rest[consumed..], 7)?;
                consumed += used;
                (HeaderField::new(name, value), consumed)
            } else {
                // post-base forms only reach into the dynamic table
                return Err(dynamic_reference());
            };

            section_size += field.size();
            if section_size > self.max_section_size {
                return Err(ParseError::too_large_header(section_size, self.max_section_size));
            }
            fields.push(field);
            rest = &rest[consumed..];
        }
        Ok(fields)
    }
}

#[derive(Debug, Default)]
pub struct QpackEncoder;

impl QpackEncoder {
    fn find(field: &HeaderField) -> (Option<usize>, bool) {
        let mut name_index = None;
        for (i, (name, value)) in STATIC_TABLE.iter().enumerate() {
            if name.as_bytes() == &field.name[..] {
                if value.as_bytes() == &field.value[..] {
                    return (Some(i), true);
                }
                name_index.get_or_insert(i);
            }
        }
        (name_index, false)
    }

    pub fn encode(&self, fields: &[HeaderField], dst: &mut BytesMut) {
        // required insert count and delta base are both zero
        dst.extend_from_slice(&[0x00, 0x00]);
        for field in fields {
            match Self::find(field) {
                (Some(index), true) => encode_integer(index, 6, 0xc0, dst),
                (Some(index), false) => {
                    encode_integer(index, 4, 0x50, dst);
                    encode_string(&field.value, 7, 0, dst);
                }
                (None, _) => {
                    encode_string(&field.name, 3, 0x20, dst);
                    encode_string(&field.value, 7, 0, dst);
                }
            }
        }
    }
}

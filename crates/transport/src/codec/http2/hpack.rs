//! HPACK header compression (RFC 7541).
//!
//! The decoder keeps the full dynamic table so it understands any peer. The
//! encoder never inserts into the dynamic table: it emits static-table
//! references and literals, so the peer's decoder state stays empty.
//! Huffman-coded strings are rejected with a compression error.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::codec::fields::{decode_integer, decode_string, encode_integer, encode_string, HeaderField};
use crate::protocol::ParseError;

/// Dynamic table size both sides start with.
pub const DEFAULT_TABLE_SIZE: usize = 4096;

static STATIC_TABLE: [(&str, &str); 61] = [
    (":authority", ""),
    (":method", "GET"),
    (":method", "POST"),
    (":path", "/"),
    (":path", "/index.html"),
    (":scheme", "http"),
    (":scheme", "https"),
    (":status", "200"),
    (":status", "204"),
    (":status", "206"),
    (":status", "304"),
    (":status", "400"),
    (":status", "404"),
    (":status", "500"),
    ("accept-charset", ""),
    ("accept-encoding", "gzip, deflate"),
    ("accept-language", ""),
    ("accept-ranges", ""),
    ("accept", ""),
    ("access-control-allow-origin", ""),
    ("age", ""),
    ("allow", ""),
    ("authorization", ""),
    ("cache-control", ""),
    ("content-disposition", ""),
    ("content-encoding", ""),
    ("content-language", ""),
    ("content-length", ""),
    ("content-location", ""),
    ("content-range", ""),
    ("content-type", ""),
    ("cookie", ""),
    ("date", ""),
    ("etag", ""),
    ("expect", ""),
    ("expires", ""),
    ("from", ""),
    ("host", ""),
    ("if-match", ""),
    ("if-modified-since", ""),
    ("if-none-match", ""),
    ("if-range", ""),
    ("if-unmodified-since", ""),
    ("last-modified", ""),
    ("link", ""),
    ("location", ""),
    ("max-forwards", ""),
    ("proxy-authenticate", ""),
    ("proxy-authorization", ""),
    ("range", ""),
    ("referer", ""),
    ("refresh", ""),
    ("retry-after", ""),
    ("server", ""),
    ("set-cookie", ""),
    ("strict-transport-security", ""),
    ("transfer-encoding", ""),
    ("user-agent", ""),
    ("vary", ""),
    ("via", ""),
    ("www-authenticate", ""),
];

fn static_field(index: usize) -> Option<HeaderField> {
    let (name, value) = STATIC_TABLE.get(index.checked_sub(1)?)?;
    Some(HeaderField::new(Bytes::from_static(name.as_bytes()), Bytes::from_static(value.as_bytes())))
}

/// Header names whose values must never be indexed by intermediaries.
fn is_sensitive(name: &[u8]) -> bool {
    name == b"authorization" || name == b"cookie" || name == b"set-cookie" || name == b"proxy-authorization"
}

#[derive(Debug)]
pub struct HpackDecoder {
    dynamic: VecDeque<HeaderField>,
    size: usize,
    max_size: usize,
    /// upper bound a size update may request, our SETTINGS_HEADER_TABLE_SIZE
    size_limit: usize,
    max_list_size: usize,
}

impl HpackDecoder {
    pub fn new(max_list_size: usize) -> Self {
        Self { dynamic: VecDeque::new(), size: 0, max_size: DEFAULT_TABLE_SIZE, size_limit: DEFAULT_TABLE_SIZE, max_list_size }
    }

    /// Current dynamic table size in HPACK octets.
    pub fn table_size(&self) -> usize {
        self.size
    }

    fn field(&self, index: usize) -> Result<HeaderField, ParseError> {
        if index == 0 {
            return Err(ParseError::compression("index 0 is not a valid table index"));
        }
        if index <= STATIC_TABLE.len() {
            return static_field(index).ok_or_else(|| ParseError::compression("invalid static index"));
        }
        self.dynamic
            .get(index - STATIC_TABLE.len() - 1)
            .cloned()
            .ok_or_else(|| ParseError::compression(format!("dynamic table index {index} out of range")))
    }

    fn insert(&mut self, field: HeaderField) {
        let size = field.size();
        if size > self.max_size {
            // an oversized entry empties the table and is not stored
            self.dynamic.clear();
            self.size = 0;
            return;
        }
        self.size += size;
        self.dynamic.push_front(field);
        self.evict();
    }

    fn evict(&mut self) {
        while self.size > self.max_size {
            match self.dynamic.pop_back() {
                Some(evicted) => self.size -= evicted.size(),
                None => break,
            }
        }
    }

    fn literal(&self, block: &[u8], prefix_bits: u8) -> Result<(HeaderField, usize), ParseError> {
        let (index, mut consumed) = decode_integer(block, prefix_bits)?;
        let name = if index == 0 {
            let (name, used) = decode_string(&block[consumed..], 7)?;
            consumed += used;
            name
        } else {
            self.field(index)?.name
        };
        let (value, used) = decode_string(&block[consumed..], 7)?;
        Ok((HeaderField::new(name, value), consumed + used))
    }

    /// Decodes one complete header block.
    pub fn decode(&mut self, mut block: &[u8]) -> Result<Vec<HeaderField>, ParseError> {
        let mut fields = Vec::new();
        let mut list_size = 0usize;

        while let Some(&first) = block.first() {
            let (field, consumed) = if first & 0x80 != 0 {
                let (index, consumed) = decode_integer(block, 7)?;
                (Some(self.field(index)?), consumed)
            } else if first & 0xc0 == 0x40 {
                let (field, consumed) = self.literal(block, 6)?;
                self.insert(field.clone());
                (Some(field), consumed)
            } else if first & 0xe0 == 0x20 {
                if !fields.is_empty() {
                    return Err(ParseError::compression("table size update after the first field"));
                }
                let (size, consumed) = decode_integer(block, 5)?;
                if size > self.size_limit {
                    return Err(ParseError::compression(format!("table size update {size} exceeds {}", self.size_limit)));
                }
                trace!(size, "hpack dynamic table size update");
                self.max_size = size;
                self.evict();
                (None, consumed)
            } else {
                // literal without indexing (0000) and never indexed (0001)
                let (field, consumed) = self.literal(block, 4)?;
                (Some(field), consumed)
            };

            if let Some(field) = field {
                list_size += field.size();
                if list_size > self.max_list_size {
                    return Err(ParseError::too_large_header(list_size, self.max_list_size));
                }
                fields.push(field);
            }
            block = &block[consumed..];
        }

        Ok(fields)
    }
}

/// Stateless encoder: static references and literals only.
#[derive(Debug, Default)]
pub struct HpackEncoder;

impl HpackEncoder {
    fn find(field: &HeaderField) -> (Option<usize>, bool) {
        let mut name_index = None;
        for (i, (name, value)) in STATIC_TABLE.iter().enumerate() {
            if name.as_bytes() == &field.name[..] {
                if value.as_bytes() == &field.value[..] {
                    return (Some(i + 1), true);
                }
                name_index.get_or_insert(i + 1);
            }
        }
        (name_index, false)
    }

    pub fn encode(&mut self, fields: &[HeaderField], dst: &mut BytesMut) {
        for field in fields {
            let sensitive = is_sensitive(&field.name);
            match Self::find(field) {
                (Some(index), true) if !sensitive => encode_integer(index, 7, 0x80, dst),
                (Some(index), _) => {
                    encode_integer(index, 4, if sensitive { 0x10 } else { 0x00 }, dst);
                    encode_string(&field.value, 7, 0, dst);
                }
                (None, _) => {
                    dst.extend_from_slice(if sensitive { &[0x10] } else { &[0x00] });
                    encode_string(&field.name, 7, 0, dst);
                    encode_string(&field.value, 7, 0, dst);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(fields: &[HeaderField]) -> Vec<(&[u8], &[u8])> {
        fields.iter().map(|f| (&f.name[..], &f.value[..])).collect()
    }

    #[test]
    fn literal_with_indexing_grows_table() {
        let block = [
            0x40, 0x0a, b'c', b'u', b's', b't', b'o', b'm', b'-', b'k', b'e', b'y', 0x0d, b'c', b'u', b's', b't', b'o', b'm', b'-', b'h', b'e', b'a',
            b'd', b'e', b'r',
        ];
        let mut decoder = HpackDecoder::new(8192);
        let fields = decoder.decode(&block).unwrap();

        assert_eq!(pairs(&fields), vec![(&b"custom-key"[..], &b"custom-header"[..])]);
        assert_eq!(decoder.table_size(), 55);
    }

    #[test]
    fn requests_share_dynamic_table() {
        let mut decoder = HpackDecoder::new(8192);

        let mut first = vec![0x82, 0x86, 0x84, 0x41, 0x0f];
        first.extend_from_slice(b"www.example.com");
        let fields = decoder.decode(&first).unwrap();
        assert_eq!(
            pairs(&fields),
            vec![
                (&b":method"[..], &b"GET"[..]),
                (&b":scheme"[..], &b"http"[..]),
                (&b":path"[..], &b"/"[..]),
                (&b":authority"[..], &b"www.example.com"[..]),
            ]
        );

        let mut second = vec![0x82, 0x86, 0x84, 0xbe, 0x58, 0x08];
        second.extend_from_slice(b"no-cache");
        let fields = decoder.decode(&second).unwrap();
        assert_eq!(fields[3].value, Bytes::from_static(b"www.example.com"));
        assert_eq!(pairs(&fields)[4], (&b"cache-control"[..], &b"no-cache"[..]));
        assert_eq!(decoder.table_size(), 110);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let mut decoder = HpackDecoder::new(8192);
        assert!(decoder.decode(&[0xbe]).is_err());
        assert!(decoder.decode(&[0x80]).is_err());
    }

    #[test]
    fn huffman_literal_is_rejected() {
        let mut decoder = HpackDecoder::new(8192);
        let block = [0x41, 0x8c, 0xf1, 0xe3, 0xc2, 0xe5, 0xf2, 0x3a, 0x6b, 0xa0, 0xab, 0x90, 0xf4, 0xff];
        assert!(matches!(decoder.decode(&block), Err(ParseError::Compression { .. })));
    }

    #[test]
    fn header_list_limit_is_enforced() {
        let mut decoder = HpackDecoder::new(40);
        let mut block = vec![0x00, 0x04];
        block.extend_from_slice(b"name");
        block.push(0x10);
        block.extend_from_slice(b"0123456789abcdef");
        assert!(matches!(decoder.decode(&block), Err(ParseError::TooLargeHeader { .. })));
    }

    #[test]
    fn encoded_block_decodes_to_same_fields() {
        let fields = vec![
            HeaderField::new(Bytes::from_static(b":status"), Bytes::from_static(b"200")),
            HeaderField::new(Bytes::from_static(b"content-type"), Bytes::from_static(b"text/plain")),
            HeaderField::new(Bytes::from_static(b"x-trace"), Bytes::from_static(b"abc")),
            HeaderField::new(Bytes::from_static(b"cookie"), Bytes::from_static(b"id=1")),
        ];
        let mut dst = BytesMut::new();
        HpackEncoder.encode(&fields, &mut dst);

        // :status 200 is a full static match
        assert_eq!(dst[0], 0x88);

        let mut decoder = HpackDecoder::new(8192);
        assert_eq!(decoder.decode(&dst).unwrap(), fields);
        assert_eq!(decoder.table_size(), 0);
    }
}

use bytes::Bytes;
use http::HeaderMap;
use http_body::SizeHint;

/// One piece of an entity body, inbound or outbound.
///
/// A body is a sequence of zero or more `Chunk`s closed by exactly one `Last`.
/// Trailers can only ride on the `Last` item, so nothing can be appended to a
/// body once its trailers are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem {
    /// A chunk of payload data
    Chunk(Bytes),
    /// The terminal chunk, with the (possibly empty) trailer set
    Last { data: Bytes, trailers: HeaderMap },
}

/// Represents the size information of an HTTP payload.
///
/// This enum is used to determine how the payload should be framed:
/// - Known length: Process exact number of bytes
/// - Chunked: length unknown ahead of time (chunked encoding on HTTP/1.1)
/// - Empty: No payload to process
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes
    Length(u64),
    /// Payload using chunked transfer encoding
    Chunked,
    /// Empty payload (no body)
    Empty,
}

impl PayloadSize {
    /// Returns true if the payload uses chunked transfer encoding
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    /// Returns true if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }
}

impl From<SizeHint> for PayloadSize {
    fn from(size_hint: SizeHint) -> Self {
        match size_hint.exact() {
            Some(0) => PayloadSize::Empty,
            Some(length) => PayloadSize::Length(length),
            None => PayloadSize::Chunked,
        }
    }
}

impl From<PayloadSize> for SizeHint {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(length) => SizeHint::with_exact(length),
            PayloadSize::Chunked => SizeHint::new(),
            PayloadSize::Empty => SizeHint::with_exact(0),
        }
    }
}

impl PayloadItem {
    /// An empty terminal chunk without trailers.
    pub fn eof() -> Self {
        Self::Last { data: Bytes::new(), trailers: HeaderMap::new() }
    }

    /// A terminal chunk carrying data and no trailers.
    pub fn last(data: Bytes) -> Self {
        Self::Last { data, trailers: HeaderMap::new() }
    }

    /// A terminal chunk carrying data and trailers.
    pub fn last_with_trailers(data: Bytes, trailers: HeaderMap) -> Self {
        Self::Last { data, trailers }
    }

    /// Returns true if this item terminates the body
    #[inline]
    pub fn is_last(&self) -> bool {
        matches!(self, PayloadItem::Last { .. })
    }

    /// Returns true if this item is an intermediate chunk
    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }

    /// Returns a reference to the carried bytes
    pub fn as_bytes(&self) -> &Bytes {
        match self {
            PayloadItem::Chunk(bytes) => bytes,
            PayloadItem::Last { data, .. } => data,
        }
    }

    /// Returns the trailers if this is the terminal chunk
    pub fn trailers(&self) -> Option<&HeaderMap> {
        match self {
            PayloadItem::Chunk(_) => None,
            PayloadItem::Last { trailers, .. } => Some(trailers),
        }
    }

    /// Consumes the item and returns the carried bytes
    pub fn into_bytes(self) -> Bytes {
        match self {
            PayloadItem::Chunk(bytes) => bytes,
            PayloadItem::Last { data, .. } => data,
        }
    }
}

impl From<Bytes> for PayloadItem {
    fn from(bytes: Bytes) -> Self {
        Self::Chunk(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn last_item_carries_trailers() {
        let mut trailers = HeaderMap::new();
        trailers.insert("x-checksum", HeaderValue::from_static("abc"));

        let item = PayloadItem::last_with_trailers(Bytes::from_static(b"tail"), trailers);
        assert!(item.is_last());
        assert_eq!(item.as_bytes(), &Bytes::from_static(b"tail"));
        assert_eq!(item.trailers().and_then(|t| t.get("x-checksum")).unwrap(), "abc");

        let chunk = PayloadItem::from(Bytes::from_static(b"body"));
        assert!(chunk.is_chunk());
        assert!(chunk.trailers().is_none());
    }

    #[test]
    fn size_hint_conversion() {
        assert_eq!(PayloadSize::from(SizeHint::with_exact(0)), PayloadSize::Empty);
        assert_eq!(PayloadSize::from(SizeHint::with_exact(12)), PayloadSize::Length(12));
        assert_eq!(PayloadSize::from(SizeHint::new()), PayloadSize::Chunked);
    }
}

//! Decoder implementation for HTTP chunked transfer encoding.
//!
//! This module provides functionality to decode HTTP messages that use chunked transfer encoding
//! as specified in [RFC 9112 Section 7.1](https://www.rfc-editor.org/rfc/rfc9112#section-7.1).
//!
//! The chunked encoding allows the sender to transmit message data in a series of chunks,
//! indicating the size of each chunk before its data. Trailer fields following the last chunk
//! are collected and surfaced on the terminal [`PayloadItem`].

use crate::protocol::{ParseError, PayloadItem};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue};
use std::io;
use std::io::ErrorKind;
use std::task::Poll;
use tokio_util::codec::Decoder;
use tracing::trace;
use ChunkedState::*;

/// Maximum size of the trailer section
const MAX_TRAILER_BYTES: usize = 8 * 1024;

/// Maximum number of trailer fields
const MAX_TRAILER_NUM: usize = 32;

/// A decoder for handling HTTP chunked transfer encoding.
///
/// The decoder processes incoming bytes according to the chunked format:
/// - Each chunk starts with its size in hexadecimal
/// - Followed by optional extensions and CRLF
/// - Then the chunk data and CRLF
/// - A zero-sized chunk indicates the end of the message, optionally followed by trailers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
    trailer: BytesMut,
}

impl ChunkedDecoder {
    /// Creates a new ChunkedDecoder instance.
    ///
    /// The decoder starts in the Size state, ready to read the size of the first chunk.
    pub fn new() -> Self {
        Self { state: Size, remaining_size: 0, trailer: BytesMut::new() }
    }

    fn parse_trailers(&mut self) -> Result<HeaderMap, ParseError> {
        if self.trailer.is_empty() {
            return Ok(HeaderMap::new());
        }

        self.trailer.put_slice(b"\r\n");
        let raw = self.trailer.split().freeze();

        let mut fields = [httparse::EMPTY_HEADER; MAX_TRAILER_NUM];
        let parsed = match httparse::parse_headers(&raw, &mut fields) {
            Ok(httparse::Status::Complete((_, parsed))) => parsed,
            Ok(httparse::Status::Partial) => return Err(ParseError::invalid_body("incomplete chunked trailer section")),
            Err(httparse::Error::TooManyHeaders) => return Err(ParseError::too_many_headers(MAX_TRAILER_NUM)),
            Err(e) => return Err(ParseError::invalid_header(e)),
        };

        let mut trailers = HeaderMap::with_capacity(parsed.len());
        for field in parsed {
            let name = HeaderName::from_bytes(field.name.as_bytes()).map_err(ParseError::invalid_header)?;
            let value = HeaderValue::from_bytes(field.value).map_err(ParseError::invalid_header)?;
            trailers.append(name, value);
        }
        Ok(trailers)
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Read the chunk size in hex
    Size,
    /// Handle whitespace after size
    SizeLws,
    /// Skip chunk extensions
    Extension,
    /// Read LF after chunk size
    SizeLf,
    /// Read chunk data
    Body,
    /// Read CR after chunk data
    BodyCr,
    /// Read LF after chunk data
    BodyLf,
    /// Read trailer field bytes
    Trailer,
    /// Read LF after trailer
    TrailerLf,
    /// Read final CR, or the first byte of a trailer field
    EndCr,
    /// Read final LF
    EndLf,
    /// Final state after reading last chunk
    End,
    /// Terminal item already handed out
    Done,
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    /// Decodes chunked transfer encoded data from the input buffer.
    ///
    /// # Returns
    /// - `Ok(Some(PayloadItem::Chunk(bytes)))` when a chunk is successfully decoded
    /// - `Ok(Some(PayloadItem::Last { .. }))` once the final chunk and trailers are processed
    /// - `Ok(None)` when more data is needed
    /// - `Err(ParseError)` if the chunked encoding is invalid
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                End => {
                    trace!("finished reading chunked data");
                    self.state = Done;
                    let trailers = self.parse_trailers()?;
                    return Ok(Some(PayloadItem::Last { data: Bytes::new(), trailers }));
                }
                Done => return Ok(None),
                _ => {}
            }

            if src.is_empty() {
                // need more data
                return Ok(None);
            }

            let mut buf = None;

            self.state = match self.state.step(src, &mut self.remaining_size, &mut buf, &mut self.trailer) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(new_state)) => new_state,
                Poll::Ready(Err(e)) => return Err(ParseError::io(e)),
            };

            if let Some(bytes) = buf {
                trace!(len = bytes.len(), "read chunked bytes");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }
        }
    }
}

macro_rules! try_next_byte {
    ($src:ident) => {{
        if $src.len() > 0 {
            $src.get_u8()
        } else {
            return Poll::Pending;
        }
    }};
}

impl ChunkedState {
    /// Processes the next step in the chunked decoding state machine.
    fn step(
        self,
        src: &mut BytesMut,
        remaining_size: &mut u64,
        buf: &mut Option<Bytes>,
        trailer: &mut BytesMut,
    ) -> Poll<Result<ChunkedState, io::Error>> {
        match self {
            Size => ChunkedState::read_size(src, remaining_size),
            SizeLws => ChunkedState::read_size_lws(src),
            Extension => ChunkedState::read_extension(src),
            SizeLf => ChunkedState::read_size_lf(src, *remaining_size),
            Body => ChunkedState::read_body(src, remaining_size, buf),
            BodyCr => ChunkedState::read_body_cr(src),
            BodyLf => ChunkedState::read_body_lf(src),
            Trailer => ChunkedState::read_trailer(src, trailer),
            TrailerLf => ChunkedState::read_trailer_lf(src, trailer),
            EndCr => ChunkedState::read_end_cr(src, trailer),
            EndLf => ChunkedState::read_end_lf(src),
            End => Poll::Ready(Ok(End)),
            Done => Poll::Ready(Ok(Done)),
        }
    }

    /// Reads and parses the chunk size in hexadecimal format.
    ///
    /// # State Transitions
    /// - On hex digit (0-9, a-f, A-F): Stay in Size state to read more digits
    /// - On whitespace (tab/space): Transition to SizeLws state
    /// - On semicolon: Transition to Extension state to handle chunk extensions
    /// - On CR: Transition to SizeLf state to finish size line
    /// - On invalid character: Return error
    fn read_size(src: &mut BytesMut, size_per_chunk: &mut u64) -> Poll<Result<ChunkedState, io::Error>> {
        let digit = match try_next_byte!(src) {
            b @ b'0'..=b'9' => b - b'0',
            b @ b'a'..=b'f' => b + 10 - b'a',
            b @ b'A'..=b'F' => b + 10 - b'A',
            b'\t' | b' ' => return Poll::Ready(Ok(SizeLws)),
            b';' => return Poll::Ready(Ok(Extension)),
            b'\r' => return Poll::Ready(Ok(SizeLf)),
            _ => return Poll::Ready(Err(io::Error::new(ErrorKind::InvalidInput, "invalid chunk size line: Invalid Size"))),
        };

        match size_per_chunk.checked_mul(16).and_then(|size| size.checked_add(u64::from(digit))) {
            Some(size) => *size_per_chunk = size,
            None => return Poll::Ready(Err(io::Error::new(ErrorKind::InvalidInput, "invalid overflow chunked length"))),
        }

        Poll::Ready(Ok(Size))
    }

    /// Processes linear whitespace (LWS) after the chunk size.
    fn read_size_lws(src: &mut BytesMut) -> Poll<Result<ChunkedState, io::Error>> {
        match try_next_byte!(src) {
            // LWS can follow the chunk size, but no more digits can come
            b'\t' | b' ' => Poll::Ready(Ok(SizeLws)),
            b';' => Poll::Ready(Ok(Extension)),
            b'\r' => Poll::Ready(Ok(SizeLf)),
            _ => Poll::Ready(Err(io::Error::new(ErrorKind::InvalidInput, "invalid chunk size linear white space"))),
        }
    }

    /// Skips chunk extensions up to the CR of the size line.
    ///
    /// Extensions containing a plain LF are rejected.
    fn read_extension(src: &mut BytesMut) -> Poll<Result<ChunkedState, io::Error>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(SizeLf)),
            b'\n' => Poll::Ready(Err(io::Error::new(ErrorKind::InvalidInput, "invalid chunk extension contains newline"))),
            _ => Poll::Ready(Ok(Extension)), // no supported extensions
        }
    }

    /// Validates the LF byte after the chunk size line.
    ///
    /// # State Transitions
    /// - On LF with size 0: Move to EndCr state for trailers or the final CRLF
    /// - On LF with size > 0: Move to Body state to read chunk data
    /// - On any other byte: Return error
    fn read_size_lf(src: &mut BytesMut, size_per_chunk: u64) -> Poll<Result<ChunkedState, io::Error>> {
        match try_next_byte!(src) {
            b'\n' if size_per_chunk == 0 => Poll::Ready(Ok(EndCr)),
            b'\n' => Poll::Ready(Ok(Body)),
            _ => Poll::Ready(Err(io::Error::new(ErrorKind::InvalidInput, "invalid chunk size LF"))),
        }
    }

    /// Reads up to the remaining bytes of the current chunk.
    fn read_body(src: &mut BytesMut, size_per_chunk: &mut u64, buf: &mut Option<Bytes>) -> Poll<Result<ChunkedState, io::Error>> {
        if src.is_empty() {
            return Poll::Ready(Ok(Body));
        }

        if *size_per_chunk == 0 {
            return Poll::Ready(Ok(BodyCr));
        }

        // cap remaining bytes at the max capacity of usize
        let remaining = usize::try_from(*size_per_chunk).unwrap_or(usize::MAX);
        let read_size = std::cmp::min(remaining, src.len());

        *size_per_chunk -= read_size as u64;
        *buf = Some(src.split_to(read_size).freeze());

        if *size_per_chunk > 0 { Poll::Ready(Ok(Body)) } else { Poll::Ready(Ok(BodyCr)) }
    }

    fn read_body_cr(src: &mut BytesMut) -> Poll<Result<ChunkedState, io::Error>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(BodyLf)),
            _ => Poll::Ready(Err(io::Error::new(ErrorKind::InvalidInput, "invalid chunk body CR"))),
        }
    }

    fn read_body_lf(src: &mut BytesMut) -> Poll<Result<ChunkedState, io::Error>> {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(Size)),
            _ => Poll::Ready(Err(io::Error::new(ErrorKind::InvalidInput, "invalid chunk body LF"))),
        }
    }

    /// Collects the bytes of one trailer field line.
    ///
    /// # State Transitions
    /// - On CR: Move to TrailerLf state
    /// - On any other byte: Stay in Trailer state
    fn read_trailer(src: &mut BytesMut, trailer: &mut BytesMut) -> Poll<Result<ChunkedState, io::Error>> {
        let byte = try_next_byte!(src);
        if trailer.len() >= MAX_TRAILER_BYTES {
            return Poll::Ready(Err(io::Error::new(ErrorKind::InvalidData, "chunked trailer section too large")));
        }
        trailer.put_u8(byte);

        match byte {
            b'\r' => Poll::Ready(Ok(TrailerLf)),
            _ => Poll::Ready(Ok(Trailer)),
        }
    }

    fn read_trailer_lf(src: &mut BytesMut, trailer: &mut BytesMut) -> Poll<Result<ChunkedState, io::Error>> {
        match try_next_byte!(src) {
            b'\n' => {
                trailer.put_u8(b'\n');
                Poll::Ready(Ok(EndCr))
            }
            _ => Poll::Ready(Err(io::Error::new(ErrorKind::InvalidInput, "invalid trailer end LF"))),
        }
    }

    /// Reads the final CR, or the first byte of the next trailer field.
    ///
    /// # State Transitions
    /// - On CR: Move to EndLf state
    /// - On any other byte: keep it and move to Trailer state
    fn read_end_cr(src: &mut BytesMut, trailer: &mut BytesMut) -> Poll<Result<ChunkedState, io::Error>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(EndLf)),
            byte => {
                trailer.put_u8(byte);
                Poll::Ready(Ok(Trailer))
            }
        }
    }

    fn read_end_lf(src: &mut BytesMut) -> Poll<Result<ChunkedState, io::Error>> {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(End)),
            _ => Poll::Ready(Err(io::Error::new(ErrorKind::InvalidInput, "invalid chunk end LF"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic() {
        let mut buffer: BytesMut = BytesMut::from(&b"10\r\n1234567890abcdef\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(item.is_chunk());
        assert_eq!(item.as_bytes().len(), 16);
        assert_eq!(std::str::from_utf8(&item.as_bytes()[..]).unwrap(), "1234567890abcdef");

        let last = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(last.is_last());
        assert!(last.trailers().unwrap().is_empty());
    }

    #[test]
    fn test_multiple_chunks() {
        let mut buffer: BytesMut = BytesMut::from(&b"5\r\nhello\r\n7\r\n, world\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes(), &Bytes::copy_from_slice(b"hello"));

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes(), &Bytes::copy_from_slice(b", world"));

        let last = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(last.is_last());

        // nothing is handed out after the terminal item
        assert!(decoder.decode(&mut buffer).unwrap().is_none());
    }

    #[test]
    fn test_chunks_with_extensions() {
        let mut buffer: BytesMut = BytesMut::from(&b"5;chunk-ext=value\r\nhello\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes(), &Bytes::copy_from_slice(b"hello"));

        let last = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(last.is_last());
    }

    #[test]
    fn test_chunks_with_trailers() {
        let mut buffer: BytesMut = BytesMut::from(&b"5\r\nhello\r\n0\r\nX-Checksum: abc\r\nExpires: never\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes(), &Bytes::copy_from_slice(b"hello"));

        let last = decoder.decode(&mut buffer).unwrap().unwrap();
        let trailers = last.trailers().unwrap();
        assert_eq!(trailers.len(), 2);
        assert_eq!(trailers.get("x-checksum").unwrap(), "abc");
        assert_eq!(trailers.get("expires").unwrap(), "never");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_trailers_split_across_reads() {
        let mut buffer: BytesMut = BytesMut::from(&b"0\r\nX-Check"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"sum: abc\r\n\r\n");
        let last = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(last.trailers().unwrap().get("x-checksum").unwrap(), "abc");
    }

    #[test]
    fn test_incomplete_chunk() {
        let mut buffer: BytesMut = BytesMut::from(&b"5\r\nhel"[..]);
        let mut decoder = ChunkedDecoder::new();

        // Should return Some when received partial chunk
        let chunk = decoder.decode(&mut buffer).unwrap();
        assert_eq!(chunk.unwrap().as_bytes(), &Bytes::copy_from_slice(b"hel"));

        buffer.extend_from_slice(b"lo\r\n0\r\n\r\n");

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes(), &Bytes::copy_from_slice(b"lo"));

        let last = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(last.is_last());
    }

    #[test]
    fn test_invalid_chunk_size() {
        let mut buffer: BytesMut = BytesMut::from(&b"xyz\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert!(decoder.decode(&mut buffer).is_err());
    }

    #[test]
    fn test_missing_crlf() {
        let mut buffer: BytesMut = BytesMut::from(&b"5\r\nhelloBad"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes(), &Bytes::copy_from_slice(b"hello"));

        assert!(decoder.decode(&mut buffer).is_err());
    }

    #[test]
    fn test_large_chunk() {
        let size = 1024 * 1024;
        let mut data = Vec::with_capacity(size + 16);
        data.extend(format!("{size:x}\r\n").into_bytes());
        data.extend(vec![b'A'; size]);
        data.extend(b"\r\n0\r\n\r\n");

        let mut buffer = BytesMut::from(&data[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().len(), size);
        assert!(chunk.as_bytes().iter().all(|&b| b == b'A'));

        let last = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(last.is_last());
    }

    #[test]
    fn test_zero_size_chunk() {
        let mut buffer: BytesMut = BytesMut::from(&b"0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let last = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(last.is_last());
    }
}

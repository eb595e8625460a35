//! Decoder for bodies framed by `Content-Length`.

use std::cmp;

use crate::protocol::{ParseError, PayloadItem};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Decodes exactly `length` bytes, the chunk that completes the body is
/// returned as the terminal item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    length: u64,
    finished: bool,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { length, finished: false }
    }
}

impl Decoder for LengthDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.finished {
            return Ok(None);
        }

        if self.length == 0 {
            self.finished = true;
            return Ok(Some(PayloadItem::eof()));
        }

        if src.is_empty() {
            return Ok(None);
        }

        let len = cmp::min(self.length, src.len() as u64);
        #[allow(clippy::cast_possible_truncation, reason = "len is bounded by src.len()")]
        let bytes = src.split_to(len as usize).freeze();

        self.length -= bytes.len() as u64;
        if self.length == 0 {
            self.finished = true;
            return Ok(Some(PayloadItem::last(bytes)));
        }
        Ok(Some(PayloadItem::Chunk(bytes)))
    }
}

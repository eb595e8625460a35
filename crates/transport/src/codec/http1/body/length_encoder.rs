//! Encoder for bodies framed by `Content-Length`.

use crate::protocol::{PayloadItem, SendError};
use bytes::BytesMut;
use tokio_util::codec::Encoder;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    length: u64,
    finished: bool,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { length, finished: false }
    }

    pub fn is_finish(&self) -> bool {
        self.finished
    }

    fn put(&mut self, bytes: &[u8], dst: &mut BytesMut) -> Result<(), SendError> {
        if bytes.is_empty() {
            return Ok(());
        }

        if bytes.len() as u64 > self.length {
            return Err(SendError::invalid_body(format!("body exceeds content-length by {} bytes", bytes.len() as u64 - self.length)));
        }

        dst.extend_from_slice(bytes);
        self.length -= bytes.len() as u64;
        Ok(())
    }
}

impl Encoder<PayloadItem> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.finished {
            warn!("encode payload_item but no need to encode anymore");
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(bytes) => self.put(&bytes, dst),
            PayloadItem::Last { data, trailers } => {
                self.finished = true;
                if !trailers.is_empty() {
                    warn!(trailers = trailers.len(), "trailers can't be sent with a content-length body, dropped");
                }
                self.put(&data, dst)?;
                if self.length > 0 {
                    return Err(SendError::invalid_body(format!("body ended {} bytes short of content-length", self.length)));
                }
                Ok(())
            }
        }
    }
}

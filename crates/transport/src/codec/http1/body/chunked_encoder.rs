//! Encoder for HTTP chunked transfer encoding, including trailer fields.

use crate::protocol::{PayloadItem, SendError};
use bytes::{BufMut, BytesMut};
use http::HeaderMap;
use std::io::Write;

use tokio_util::codec::Encoder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedEncoder {
    eof: bool,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self { eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }

    fn put_chunk(bytes: &[u8], dst: &mut BytesMut) -> Result<(), SendError> {
        // a zero sized chunk would terminate the body
        if bytes.is_empty() {
            return Ok(());
        }
        write!(helper::Writer(dst), "{:X}\r\n", bytes.len())?;
        dst.reserve(bytes.len() + 2);
        dst.extend_from_slice(bytes);
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }

    fn put_last(trailers: &HeaderMap, dst: &mut BytesMut) {
        dst.put_slice(b"0\r\n");
        for (name, value) in trailers {
            dst.put_slice(name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
    }
}

impl Default for ChunkedEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder<PayloadItem> for ChunkedEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(bytes) => Self::put_chunk(&bytes, dst),
            PayloadItem::Last { data, trailers } => {
                self.eof = true;
                Self::put_chunk(&data, dst)?;
                Self::put_last(&trailers, dst);
                Ok(())
            }
        }
    }
}

mod helper {
    use bytes::{BufMut, BytesMut};
    use std::io;

    pub struct Writer<'a>(pub &'a mut BytesMut);

    impl io::Write for Writer<'_> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.put_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

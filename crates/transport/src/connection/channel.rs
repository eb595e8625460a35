use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::codec::{Codec, FrameCodec};
use crate::config::ProtocolVersion;
use crate::protocol::{InboundFrame, OutboundFrame, ParseError, SendError};

/// Where a stream's state machine puts its outbound frames.
///
/// Writes are fire-and-forget: the frame is queued and the outcome of the
/// actual I/O surfaces later as a connection event. An `Err` means the frame
/// could not even be queued, typically because the peer is already gone.
pub trait Channel {
    fn write_frame(&mut self, frame: OutboundFrame) -> Result<(), SendError>;
}

/// A codec plus the read and write buffers of one connection.
///
/// One codec serves both directions, because the HTTP/1.1 codec needs to know
/// what was written to frame what it reads next.
#[derive(Debug)]
pub struct FramedChannel {
    codec: Codec,
    read_buf: BytesMut,
    write_buf: BytesMut,
    closed: bool,
}

impl FramedChannel {
    pub fn with_capacity(codec: Codec, buffer_size: usize) -> Self {
        Self { codec, read_buf: BytesMut::with_capacity(buffer_size), write_buf: BytesMut::with_capacity(buffer_size), closed: false }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.codec.version()
    }

    pub fn is_multiplexed(&self) -> bool {
        self.codec.is_multiplexed()
    }

    pub fn cancel_code(&self) -> u64 {
        self.codec.cancel_code()
    }

    pub fn refused_code(&self) -> u64 {
        self.codec.refused_code()
    }

    pub fn protocol_error_code(&self) -> u64 {
        self.codec.protocol_error_code()
    }

    pub fn malformed_code(&self) -> u64 {
        self.codec.malformed_code()
    }

    /// Marks the peer as gone. Later writes fail without touching the codec.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Decodes the next frame already buffered, if any.
    pub fn decode(&mut self) -> Result<Option<InboundFrame>, ParseError> {
        self.codec.decode(&mut self.read_buf)
    }

    /// Decodes what is left once the peer stopped sending.
    ///
    /// Yields the frames the end of input completes, such as the end of an
    /// upgraded stream, then `None`.
    pub fn decode_eof(&mut self) -> Result<Option<InboundFrame>, ParseError> {
        self.codec.decode_eof(&mut self.read_buf)
    }

    /// Reads more bytes, returns the number read, 0 at end of stream.
    pub async fn fill<R>(&mut self, reader: &mut R) -> Result<usize, ParseError>
    where
        R: AsyncRead + Unpin,
    {
        let n = reader.read_buf(&mut self.read_buf).await?;
        trace!(bytes = n, buffered = self.read_buf.len(), "read from channel");
        Ok(n)
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.write_buf.is_empty()
    }

    #[inline]
    pub async fn flush<W>(&mut self, writer: &mut W) -> Result<(), SendError>
    where
        W: AsyncWrite + Unpin,
    {
        if self.write_buf.is_empty() {
            return Ok(());
        }

        let result = async {
            writer.write_all(self.write_buf.as_ref()).await?;
            writer.flush().await
        }
        .await;
        self.write_buf.clear();

        if let Err(e) = result {
            self.closed = true;
            return Err(SendError::io(e));
        }
        Ok(())
    }
}

impl Channel for FramedChannel {
    fn write_frame(&mut self, frame: OutboundFrame) -> Result<(), SendError> {
        if self.closed {
            return Err(SendError::ChannelClosed);
        }
        self.codec.encode(frame, &mut self.write_buf)
    }
}

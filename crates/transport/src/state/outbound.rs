use std::fmt;

use http::StatusCode;
use tracing::{trace, warn};

use crate::connection::Channel;
use crate::protocol::{MessageHead, OutboundFrame, PayloadItem, PayloadSize, SendError, StreamIdentity};

/// Send direction of one stream.
#[derive(Debug)]
pub enum OutboundState {
    /// Nothing written yet, the header block is next.
    SendingHeaders,
    /// Headers are on the wire, body chunks follow in order.
    SendingEntityBody { payload: PayloadSize },
    /// The terminal chunk (and any trailers) has been written.
    Completed,
    Failed,
}

/// What a write did to the send direction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Progress {
    /// The call was not legal in the current state and was dropped.
    Ignored,
    Sent,
    /// This write ended the send direction.
    Finished,
}

impl OutboundState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OutboundState::Completed | OutboundState::Failed)
    }

    /// Returns true once the header block has been written.
    pub fn has_begun(&self) -> bool {
        !matches!(self, OutboundState::SendingHeaders)
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutboundState::SendingHeaders => "SendingHeaders",
            OutboundState::SendingEntityBody { .. } => "SendingEntityBody",
            OutboundState::Completed => "Completed",
            OutboundState::Failed => "Failed",
        }
    }

    pub(crate) fn send_interim<C: Channel + ?Sized>(&mut self, channel: &mut C, identity: &StreamIdentity, status: StatusCode) -> Result<Progress, SendError> {
        if !matches!(self, OutboundState::SendingHeaders) {
            warn!(stream_id = %identity, state = self.name(), %status, "interim response after headers, ignore");
            return Ok(Progress::Ignored);
        }
        channel.write_frame(OutboundFrame::Interim { stream: identity.stream_id(), status })?;
        Ok(Progress::Sent)
    }

    /// Writes the header block. Headers are written exactly once, a second
    /// call is reported and dropped.
    ///
    /// A failed write leaves the state where it was; the caller decides how
    /// the exchange ends.
    pub(crate) fn send_headers<C: Channel + ?Sized>(
        &mut self,
        channel: &mut C,
        identity: &StreamIdentity,
        head: MessageHead,
        payload: PayloadSize,
    ) -> Result<Progress, SendError> {
        if !matches!(self, OutboundState::SendingHeaders) {
            warn!(stream_id = %identity, state = self.name(), "duplicate header block, ignore");
            return Ok(Progress::Ignored);
        }

        channel.write_frame(OutboundFrame::Headers { stream: identity.stream_id(), head, payload })?;
        if payload.is_empty() {
            *self = OutboundState::Completed;
            return Ok(Progress::Finished);
        }
        *self = OutboundState::SendingEntityBody { payload };
        Ok(Progress::Sent)
    }

    /// Writes one body item.
    ///
    /// The terminal item carries the end-of-stream marker on its data frame
    /// when it has no trailers. With trailers, the data frame goes out without
    /// the marker and a trailers frame carrying it follows.
    pub(crate) fn send_body<C: Channel + ?Sized>(&mut self, channel: &mut C, identity: &StreamIdentity, item: PayloadItem) -> Result<Progress, SendError> {
        if !matches!(self, OutboundState::SendingEntityBody { .. }) {
            warn!(stream_id = %identity, state = self.name(), last = item.is_last(), "body write in unexpected state, ignore");
            return Ok(Progress::Ignored);
        }

        let stream = identity.stream_id();
        match item {
            PayloadItem::Chunk(data) => {
                if data.is_empty() {
                    trace!(stream_id = %identity, "skip empty body chunk");
                    return Ok(Progress::Sent);
                }
                channel.write_frame(OutboundFrame::Data { stream, data, end_stream: false })?;
                Ok(Progress::Sent)
            }
            PayloadItem::Last { data, trailers } if trailers.is_empty() => {
                channel.write_frame(OutboundFrame::Data { stream, data, end_stream: true })?;
                *self = OutboundState::Completed;
                Ok(Progress::Finished)
            }
            PayloadItem::Last { data, trailers } => {
                channel.write_frame(OutboundFrame::Data { stream, data, end_stream: false })?;
                channel.write_frame(OutboundFrame::Trailers { stream, trailers })?;
                *self = OutboundState::Completed;
                Ok(Progress::Finished)
            }
        }
    }

    /// Ends the send direction. Returns false if it had already ended.
    pub(crate) fn fail(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        *self = OutboundState::Failed;
        true
    }
}

impl fmt::Display for OutboundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

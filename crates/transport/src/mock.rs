//! Test doubles shared by the unit tests.

use std::io;

use crate::connection::Channel;
use crate::protocol::{OutboundFrame, SendError};

/// A channel that records every frame written to it.
#[derive(Debug, Default)]
pub(crate) struct RecordingChannel {
    frames: Vec<OutboundFrame>,
    rejecting: bool,
}

impl RecordingChannel {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A channel whose peer is already gone.
    pub(crate) fn rejecting() -> Self {
        Self { frames: Vec::new(), rejecting: true }
    }

    pub(crate) fn reject_writes(&mut self) {
        self.rejecting = true;
    }

    pub(crate) fn frames(&self) -> &[OutboundFrame] {
        &self.frames
    }
}

impl Channel for RecordingChannel {
    fn write_frame(&mut self, frame: OutboundFrame) -> Result<(), SendError> {
        if self.rejecting {
            return Err(SendError::io(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        self.frames.push(frame);
        Ok(())
    }
}

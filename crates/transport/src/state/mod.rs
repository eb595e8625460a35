//! Per-stream duplex state machine.
//!
//! Every logical stream (a whole connection for HTTP/1.1, one stream id for
//! HTTP/2 and HTTP/3) owns one context:
//!
//! - [`ListenerContext`] on the server: receives a request, sends a response
//! - [`SenderContext`] on the client: sends a request, receives a response
//!
//! Both are built from the same two half-machines. [`InboundState`] tracks the
//! message being received and [`OutboundState`] tracks the message being sent.
//! They advance independently, so a request body that keeps streaming while
//! the response is written never touches the writer's state.
//!
//! Handlers never fail across this boundary. Illegal (state, event) pairs are
//! logged and ignored; terminal failures resolve the exchange's completion
//! once. What is left for the connection driver is the [`Disposition`] every
//! handler returns.

mod inbound;
mod listener;
mod outbound;
mod sender;

pub use inbound::InboundState;
pub use listener::ListenerContext;
pub use outbound::{OutboundState, Progress};
pub use sender::SenderContext;

/// What the connection driver does with a stream after an event.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The exchange is still in progress.
    Continue,
    /// Both directions ended cleanly, drop the stream.
    Retire,
    /// The exchange failed, tear the stream down. On HTTP/2 and HTTP/3 that is
    /// a stream reset, on HTTP/1.1 the connection is closed.
    Abort,
}

impl Disposition {
    pub fn is_done(self) -> bool {
        !matches!(self, Disposition::Continue)
    }
}

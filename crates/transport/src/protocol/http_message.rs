//! The protocol-agnostic message handed across the dispatch boundary.

use std::time::Instant;

use http::{HeaderMap, Request, Response, Version};

use crate::future::Completion;
use crate::protocol::body::{IoFailure, MessageBody};
use crate::protocol::{MessageHead, TransportError};

/// One HTTP request or response as seen by the application.
///
/// Inbound messages are created when their header block has been decoded. The
/// body streams in afterwards through [`MessageBody`]; the failure slot is
/// shared with the stream's state machine and is set at most once.
#[derive(Debug)]
pub struct HttpMessage {
    head: MessageHead,
    body: Option<MessageBody>,
    arrived_at: Instant,
    failure: IoFailure,
    response_status: Option<Completion<()>>,
}

impl HttpMessage {
    pub(crate) fn new(head: MessageHead, body: MessageBody, failure: IoFailure) -> Self {
        Self { head, body: Some(body), arrived_at: Instant::now(), failure, response_status: None }
    }

    /// Attaches the completion that reports how the paired response went.
    pub(crate) fn with_response_status(mut self, completion: Completion<()>) -> Self {
        self.response_status = Some(completion);
        self
    }

    pub fn head(&self) -> &MessageHead {
        &self.head
    }

    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    pub fn version(&self) -> Version {
        self.head.version()
    }

    /// When the header block of this message was decoded.
    pub fn arrived_at(&self) -> Instant {
        self.arrived_at
    }

    /// The terminal I/O failure recorded against this message, if any.
    pub fn io_error(&self) -> Option<&TransportError> {
        self.failure.get()
    }

    /// Takes the body out of the message, an empty body once it was taken.
    pub fn take_body(&mut self) -> MessageBody {
        self.body.take().unwrap_or_default()
    }

    /// Takes the completion that resolves once the response to this request
    /// has been fully written, or has failed.
    pub fn take_response_status(&mut self) -> Option<Completion<()>> {
        self.response_status.take()
    }

    /// The protocol the peer asks to switch to, such as `websocket`.
    pub fn upgrade_protocol(&self) -> Option<&str> {
        self.head.as_request().and_then(|request| request.upgrade_protocol())
    }

    /// Converts an inbound request into an `http::Request`.
    ///
    /// Returns the message unchanged if it is a response.
    pub fn into_request(mut self) -> Result<Request<MessageBody>, Self> {
        let body = self.take_body();
        match self.head {
            MessageHead::Request(header) => Ok(header.body(body)),
            head @ MessageHead::Response(_) => Err(Self { head, body: Some(body), ..self }),
        }
    }

    /// Converts an inbound response into an `http::Response`.
    ///
    /// Returns the message unchanged if it is a request.
    pub fn into_response(mut self) -> Result<Response<MessageBody>, Self> {
        let body = self.take_body();
        match self.head {
            MessageHead::Response(head) => Ok(head.map(|()| body)),
            head @ MessageHead::Request(_) => Err(Self { head, body: Some(body), ..self }),
        }
    }
}

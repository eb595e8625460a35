//! HTTP response header handling and the direction-agnostic message head.

use http::{HeaderMap, Response, StatusCode, Version};

use crate::protocol::RequestHeader;

/// Type alias for HTTP response headers.
///
/// This type represents the header portion of an HTTP response, using
/// `http::Response<()>` with an empty body placeholder.
pub type ResponseHead = Response<()>;

/// The head of either side of an exchange.
///
/// The codecs and the state machine only care about the header block and the
/// version; whether it is a request line or a status line matters when the
/// head is serialised.
#[derive(Debug)]
pub enum MessageHead {
    Request(RequestHeader),
    Response(ResponseHead),
}

impl MessageHead {
    pub fn headers(&self) -> &HeaderMap {
        match self {
            MessageHead::Request(request) => request.headers(),
            MessageHead::Response(response) => response.headers(),
        }
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        match self {
            MessageHead::Request(request) => request.headers_mut(),
            MessageHead::Response(response) => response.headers_mut(),
        }
    }

    pub fn version(&self) -> Version {
        match self {
            MessageHead::Request(request) => request.version(),
            MessageHead::Response(response) => response.version(),
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, MessageHead::Request(_))
    }

    pub fn as_request(&self) -> Option<&RequestHeader> {
        match self {
            MessageHead::Request(request) => Some(request),
            MessageHead::Response(_) => None,
        }
    }

    pub fn as_response(&self) -> Option<&ResponseHead> {
        match self {
            MessageHead::Request(_) => None,
            MessageHead::Response(response) => Some(response),
        }
    }

    /// The response status, `None` for requests.
    pub fn status(&self) -> Option<StatusCode> {
        self.as_response().map(Response::status)
    }

    /// Returns true for `1xx` responses, which never carry a body.
    pub fn is_informational(&self) -> bool {
        self.status().is_some_and(|status| status.is_informational())
    }
}

impl From<RequestHeader> for MessageHead {
    fn from(request: RequestHeader) -> Self {
        MessageHead::Request(request)
    }
}

impl From<ResponseHead> for MessageHead {
    fn from(response: ResponseHead) -> Self {
        MessageHead::Response(response)
    }
}

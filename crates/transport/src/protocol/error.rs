use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },

    #[error("transport error: {source}")]
    TransportError {
        #[from]
        source: TransportError,
    },
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid http status")]
    InvalidStatus,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("header compression error: {reason}")]
    Compression { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn invalid_frame<S: ToString>(str: S) -> Self {
        Self::InvalidFrame { reason: str.to_string() }
    }

    pub fn compression<S: ToString>(str: S) -> Self {
        Self::Compression { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("channel closed")]
    ChannelClosed,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// Where in a request/response exchange a terminal failure happened.
///
/// The `Display` text is the phrase used in [`TransportError`] messages and in
/// the diagnostics logged when a completion is resolved with an error.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorPhase {
    ReadingRequestHeaders,
    ReadingRequestBody,
    BeforeResponseInitiation,
    WritingResponseHeaders,
    WritingResponseBody,
    WritingRequestHeaders,
    WritingRequestBody,
    BeforeResponseReceived,
    ReadingResponseHeaders,
    ReadingResponseBody,
}

impl fmt::Display for ErrorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorPhase::ReadingRequestHeaders => "while reading inbound request headers",
            ErrorPhase::ReadingRequestBody => "while reading inbound request body",
            ErrorPhase::BeforeResponseInitiation => "before response initiation",
            ErrorPhase::WritingResponseHeaders => "while writing outbound response headers",
            ErrorPhase::WritingResponseBody => "while writing outbound response body",
            ErrorPhase::WritingRequestHeaders => "while writing outbound request headers",
            ErrorPhase::WritingRequestBody => "while writing outbound request body",
            ErrorPhase::BeforeResponseReceived => "before inbound response initiation",
            ErrorPhase::ReadingResponseHeaders => "while reading inbound response headers",
            ErrorPhase::ReadingResponseBody => "while reading inbound response body",
        };
        f.write_str(text)
    }
}

/// Terminal failure of one logical stream.
///
/// This is what completion futures and message bodies report. It is `Clone`
/// so that the same failure can be recorded on the in-flight message and
/// delivered to whoever awaits the exchange.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("remote closed {phase}")]
    RemoteClosed { phase: ErrorPhase },

    #[error("idle timeout triggered {phase}")]
    IdleTimeout { phase: ErrorPhase },

    #[error("stream cancelled {phase}")]
    Cancelled { phase: ErrorPhase },

    #[error("stream reset by peer, error code {code:#x}")]
    Reset { code: u64 },

    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    #[error("io error: {source}")]
    Io { source: Arc<io::Error> },

    #[error("exchange dropped before completion")]
    Abandoned,
}

impl TransportError {
    pub fn remote_closed(phase: ErrorPhase) -> Self {
        Self::RemoteClosed { phase }
    }

    pub fn idle_timeout(phase: ErrorPhase) -> Self {
        Self::IdleTimeout { phase }
    }

    pub fn cancelled(phase: ErrorPhase) -> Self {
        Self::Cancelled { phase }
    }

    pub fn protocol<S: ToString>(reason: S) -> Self {
        Self::Protocol { reason: reason.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: Arc::new(e.into()) }
    }

    /// The exchange phase this error was raised in, if it carries one.
    pub fn phase(&self) -> Option<ErrorPhase> {
        match self {
            TransportError::RemoteClosed { phase }
            | TransportError::IdleTimeout { phase }
            | TransportError::Cancelled { phase } => Some(*phase),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::IdleTimeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled { .. } | TransportError::Reset { .. })
    }
}

impl From<ParseError> for TransportError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Io { source } => Self::io(source),
            e => Self::protocol(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_closed_names_the_phase() {
        let error = TransportError::remote_closed(ErrorPhase::BeforeResponseInitiation);
        assert_eq!(error.to_string(), "remote closed before response initiation");
        assert_eq!(error.phase(), Some(ErrorPhase::BeforeResponseInitiation));
    }

    #[test]
    fn timeout_is_distinguishable_from_closure() {
        let timeout = TransportError::idle_timeout(ErrorPhase::WritingResponseHeaders);
        let closed = TransportError::remote_closed(ErrorPhase::WritingResponseHeaders);
        assert!(timeout.is_timeout());
        assert!(!closed.is_timeout());
        assert_eq!(timeout.to_string(), "idle timeout triggered while writing outbound response headers");
    }

    #[test]
    fn parse_error_becomes_protocol_error() {
        let error: TransportError = ParseError::invalid_frame("bad length").into();
        assert!(matches!(error, TransportError::Protocol { .. }));
        assert!(error.to_string().contains("bad length"));
    }
}

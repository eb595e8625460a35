//! HTTP request header handling implementation.
//!
//! This module wraps the standard `http::Request<()>` type so that the head of
//! an inbound or outbound request can travel through the codecs and the state
//! machine independently of its body.

use http::header::{CONNECTION, EXPECT, UPGRADE};
use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};

/// Represents an HTTP request header.
#[derive(Debug)]
pub struct RequestHeader {
    inner: Request<()>,
}

impl AsRef<Request<()>> for RequestHeader {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl AsMut<Request<()>> for RequestHeader {
    fn as_mut(&mut self) -> &mut Request<()> {
        &mut self.inner
    }
}

impl RequestHeader {
    /// Consumes the header and returns the inner `Request<()>`.
    pub fn into_inner(self) -> Request<()> {
        self.inner
    }

    /// Attaches a body to this header, converting it into a full `Request<T>`.
    pub fn body<T>(self, body: T) -> Request<T> {
        self.inner.map(|_| body)
    }

    /// Returns a reference to the request's HTTP method.
    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    /// Returns a reference to the request's URI.
    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    /// Returns the request's HTTP version.
    pub fn version(&self) -> Version {
        self.inner.version()
    }

    /// Returns a reference to the request's headers.
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Returns a mutable reference to the request's headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    /// Determines if this request requires a body based on its HTTP method.
    ///
    /// Returns false for methods that typically don't have bodies:
    /// - GET
    /// - HEAD
    /// - DELETE
    /// - OPTIONS
    /// - CONNECT
    pub fn need_body(&self) -> bool {
        !matches!(self.method(), &Method::GET | &Method::HEAD | &Method::DELETE | &Method::OPTIONS | &Method::CONNECT)
    }

    /// Returns true if the client asked for an interim `100 Continue`.
    pub fn expects_continue(&self) -> bool {
        self.headers()
            .get(EXPECT)
            .is_some_and(|value| value.as_bytes().len() >= 4 && value.as_bytes()[..4].eq_ignore_ascii_case(b"100-"))
    }

    /// The protocol named in the `Upgrade` header, when `Connection` lists `upgrade`.
    ///
    /// Only meaningful for HTTP/1.1, other versions have no upgrade mechanism.
    pub fn upgrade_protocol(&self) -> Option<&str> {
        if self.version() != Version::HTTP_11 {
            return None;
        }

        let connection_upgrade = self
            .headers()
            .get_all(CONNECTION)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));

        if !connection_upgrade {
            return None;
        }

        self.headers().get(UPGRADE).and_then(|value| value.to_str().ok()).map(str::trim)
    }
}

/// Converts request parts into a RequestHeader.
impl From<Parts> for RequestHeader {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

/// Converts a bodyless request into a RequestHeader.
impl From<Request<()>> for RequestHeader {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn header_with(headers: &[(&'static str, &'static str)]) -> RequestHeader {
        let mut builder = Request::builder().method(Method::GET).uri("/chat").version(Version::HTTP_11);
        for (name, value) in headers {
            builder = builder.header(*name, HeaderValue::from_static(value));
        }
        RequestHeader::from(builder.body(()).unwrap())
    }

    #[test]
    fn detects_websocket_upgrade() {
        let header = header_with(&[("connection", "keep-alive, Upgrade"), ("upgrade", "websocket")]);
        assert_eq!(header.upgrade_protocol(), Some("websocket"));
    }

    #[test]
    fn upgrade_needs_connection_token() {
        let header = header_with(&[("upgrade", "websocket")]);
        assert_eq!(header.upgrade_protocol(), None);
    }

    #[test]
    fn detects_expect_continue() {
        assert!(header_with(&[("expect", "100-continue")]).expects_continue());
        assert!(!header_with(&[]).expects_continue());
    }

    #[test]
    fn get_needs_no_body() {
        assert!(!header_with(&[]).need_body());
    }
}

use std::fmt;

use http::Uri;
use http::uri::Scheme;
use thiserror::Error;

use crate::config::TransportConfig;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("uri `{uri}` has no host")]
    MissingHost { uri: String },

    #[error("unsupported scheme `{scheme}`")]
    UnsupportedScheme { scheme: String },
}

/// Identity of a remote endpoint, used as the key for connection reuse.
///
/// Equality and hashing cover all four parts. Two routes to the same host and
/// port with different configuration fingerprints are different endpoints, so
/// a connection set up without TLS is never handed out for a route that
/// expects it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HttpRoute {
    scheme: Scheme,
    host: String,
    port: u16,
    config_fingerprint: u64,
}

impl HttpRoute {
    pub fn new(scheme: Scheme, host: &str, port: u16, config_fingerprint: u64) -> Self {
        Self { scheme, host: host.to_ascii_lowercase(), port, config_fingerprint }
    }

    /// Derives the route a request to `uri` takes under `config`.
    ///
    /// A uri without scheme uses `https` when the configuration carries TLS
    /// material and `http` otherwise; a missing port defaults per scheme.
    pub fn from_uri(uri: &Uri, config: &TransportConfig) -> Result<Self, RouteError> {
        let host = uri.host().ok_or_else(|| RouteError::MissingHost { uri: uri.to_string() })?;
        let scheme = match uri.scheme() {
            Some(scheme) => scheme.clone(),
            None if config.is_tls() => Scheme::HTTPS,
            None => Scheme::HTTP,
        };
        let default_port = match scheme.as_str() {
            "http" => 80,
            "https" => 443,
            other => return Err(RouteError::UnsupportedScheme { scheme: other.to_owned() }),
        };

        Ok(Self::new(scheme, host, uri.port_u16().unwrap_or(default_port), config.fingerprint()))
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn config_fingerprint(&self) -> u64 {
        self.config_fingerprint
    }
}

impl fmt::Display for HttpRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}-{}", self.scheme, self.host, self.port, self.config_fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn tls_config() -> TransportConfig {
        serde_json::from_str(r#"{ "tls": { "cert_path": "/etc/tls/cert.pem", "key_path": "/etc/tls/key.pem" } }"#).unwrap()
    }

    #[test]
    fn ports_default_per_scheme() {
        let config = TransportConfig::default();

        let plain = HttpRoute::from_uri(&Uri::from_static("http://Example.com/items"), &config).unwrap();
        assert_eq!(plain.scheme(), &Scheme::HTTP);
        assert_eq!(plain.host(), "example.com");
        assert_eq!(plain.port(), 80);

        let secure = HttpRoute::from_uri(&Uri::from_static("https://example.com:8443"), &config).unwrap();
        assert_eq!(secure.port(), 8443);
        assert_eq!(secure.to_string(), format!("https-example.com-8443-{}", config.fingerprint()));
    }

    #[test]
    fn fingerprint_separates_otherwise_equal_routes() {
        let uri = Uri::from_static("https://example.com");
        let plain = HttpRoute::from_uri(&uri, &TransportConfig::default()).unwrap();
        let tls = HttpRoute::from_uri(&uri, &tls_config()).unwrap();
        assert_ne!(plain, tls);

        let routes: HashSet<_> = [plain.clone(), tls, plain].into_iter().collect();
        assert_eq!(routes.len(), 2);
    }

    #[test]
    fn scheme_follows_tls_when_absent() {
        let route = HttpRoute::from_uri(&Uri::from_static("example.com:9000"), &tls_config()).unwrap();
        assert_eq!(route.scheme(), &Scheme::HTTPS);
        assert_eq!(route.port(), 9000);
    }

    #[test]
    fn unroutable_uris() {
        let config = TransportConfig::default();
        assert!(matches!(HttpRoute::from_uri(&Uri::from_static("/relative"), &config), Err(RouteError::MissingHost { .. })));
        assert!(matches!(HttpRoute::from_uri(&Uri::from_static("ftp://example.com"), &config), Err(RouteError::UnsupportedScheme { .. })));
    }
}

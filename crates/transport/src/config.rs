//! Connection setup configuration.
//!
//! [`TransportConfig`] is consumed once when a connection is created. The state
//! machine itself never looks at it; only the connection drivers and the codec
//! selection do.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::codec::{Codec, Role};

pub const DEFAULT_MAX_HEADER_BYTES: usize = 8 * 1024;
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 60_000;

/// The protocol generation a connection speaks.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVersion {
    #[default]
    #[serde(alias = "http/1.1", alias = "1.1")]
    Http11,
    #[serde(alias = "h2", alias = "2")]
    Http2,
    #[serde(alias = "h3", alias = "3")]
    Http3,
}

impl ProtocolVersion {
    pub fn is_multiplexed(self) -> bool {
        !matches!(self, ProtocolVersion::Http11)
    }
}

/// TLS material locations. They are opaque to the transport and only take part
/// in route identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    #[serde(default)]
    pub key_password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub version: ProtocolVersion,
    pub port: u16,
    pub idle_timeout_ms: u64,
    pub max_header_bytes: usize,
    pub max_concurrent_streams: usize,
    pub body_buffer_chunks: usize,
    pub server_name: Option<String>,
    pub tls: Option<TlsConfig>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            version: ProtocolVersion::Http11,
            port: 8080,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_concurrent_streams: 100,
            body_buffer_chunks: 16,
            server_name: None,
            tls: None,
        }
    }
}

impl TransportConfig {
    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout_ms = u64::try_from(idle_timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// `None` disables the idle timeout.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Hash of the settings that make two connections to the same endpoint
    /// non-interchangeable.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.version.hash(&mut hasher);
        self.tls.hash(&mut hasher);
        self.idle_timeout_ms.hash(&mut hasher);
        hasher.finish()
    }

    /// Builds the codec for this configuration.
    pub fn codec(&self, role: Role) -> Codec {
        Codec::new(self.version, role, self.max_header_bytes)
    }
}

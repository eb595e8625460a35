//! Endpoint identity and connection reuse.
//!
//! An [`HttpRoute`] names a remote endpoint together with the fingerprint of
//! the configuration a connection to it was set up with. The
//! [`ConnectionPool`] keeps live connections per route and hands them out as
//! reference-counted [`Lease`]s; a connection can only be evicted once no
//! lease on it is left.

mod http_route;
mod pool;

pub use http_route::{HttpRoute, RouteError};
pub use pool::{ConnectionPool, Lease};

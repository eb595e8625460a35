//! HTTP/2 framing (RFC 9113) with HPACK header compression.
//!
//! Flow control is left to the connection driver, which returns window
//! credit as inbound data is handed to the application.

mod codec;
pub mod frame;
mod hpack;

pub use codec::Http2Codec;
pub use hpack::{HpackDecoder, HpackEncoder};

//! HTTP/1.1 message heads.
//!
//! - [`HeaderDecoder`]: parses request lines (server) and status lines
//!   (client), enforcing the head size and header count limits
//! - [`HeaderEncoder`]: serializes request and response heads and fixes up the
//!   framing headers

mod header_decoder;
mod header_encoder;

pub use header_decoder::HeaderDecoder;
pub use header_encoder::HeaderEncoder;

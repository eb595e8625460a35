//! HTTP/1.1 wire codec.
//!
//! HTTP/1.1 carries a single stream per connection, always addressed as
//! [`StreamId::CONNECTION`](crate::protocol::StreamId::CONNECTION). Exchanges are
//! serialized: on the server side the next request head is not decoded before
//! the response to the current one has been fully encoded.

mod body;
mod codec;
mod header;

pub use body::{PayloadDecoder, PayloadEncoder};
pub use codec::Http1Codec;
pub use header::{HeaderDecoder, HeaderEncoder};

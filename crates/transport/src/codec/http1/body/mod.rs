//! HTTP/1.1 body framing.
//!
//! ## Decoders
//! - [`ChunkedDecoder`](chunked_decoder::ChunkedDecoder): chunked transfer coding, trailers included
//! - [`LengthDecoder`](length_decoder::LengthDecoder): `Content-Length` framed bodies
//! - [`PayloadDecoder`]: picks one of the above from the head's [`PayloadSize`](crate::protocol::PayloadSize)
//!
//! ## Encoders
//! - [`ChunkedEncoder`](chunked_encoder::ChunkedEncoder): chunked transfer coding with trailer support
//! - [`LengthEncoder`](length_encoder::LengthEncoder): fixed-length bodies, trailers are dropped
//! - [`PayloadEncoder`]: picks one of the above

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;

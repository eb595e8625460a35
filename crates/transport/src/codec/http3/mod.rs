//! HTTP/3 (RFC 9114) over QUIC STREAM frames, with static-table QPACK.

mod codec;
pub mod frame;
mod qpack;
pub mod varint;

pub use codec::Http3Codec;
pub use qpack::{QpackDecoder, QpackEncoder};

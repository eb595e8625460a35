//! QUIC variable-length integers (RFC 9000 section 16).

use bytes::{BufMut, BytesMut};

use crate::protocol::SendError;

pub const MAX: u64 = (1 << 62) - 1;

/// Reads one varint, `None` when the buffer ends before it does.
pub fn decode(src: &[u8]) -> Option<(u64, usize)> {
    let first = *src.first()?;
    let len = 1usize << (first >> 6);
    let bytes = src.get(..len)?;

    let mut value = u64::from(first & 0x3f);
    for byte in &bytes[1..] {
        value = (value << 8) | u64::from(*byte);
    }
    Some((value, len))
}

pub fn encoded_len(value: u64) -> usize {
    match value {
        0..=63 => 1,
        64..=16_383 => 2,
        16_384..=1_073_741_823 => 4,
        _ => 8,
    }
}

#[allow(clippy::cast_possible_truncation, reason = "each arm is bounded by encoded_len")]
pub fn encode(value: u64, dst: &mut BytesMut) -> Result<(), SendError> {
    if value > MAX {
        return Err(SendError::invalid_body(format!("varint {value} out of range")));
    }
    match encoded_len(value) {
        1 => dst.put_u8(value as u8),
        2 => dst.put_u16(0x4000 | value as u16),
        4 => dst.put_u32(0x8000_0000 | value as u32),
        _ => dst.put_u64(0xc000_0000_0000_0000 | value),
    }
    Ok(())
}

/// Encodes lengths and counts, which always fit.
pub fn encode_len(value: usize, dst: &mut BytesMut) -> Result<(), SendError> {
    encode(u64::try_from(value).unwrap_or(u64::MAX), dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc_sample_values() {
        let samples: [(u64, &[u8]); 4] = [
            (151_288_809_941_952_652, &[0xc2, 0x19, 0x7c, 0x5e, 0xff, 0x14, 0xe8, 0x8c]),
            (494_878_333, &[0x9d, 0x7f, 0x3e, 0x7d]),
            (15_293, &[0x7b, 0xbd]),
            (37, &[0x25]),
        ];
        for (value, wire) in samples {
            let mut buf = BytesMut::new();
            encode(value, &mut buf).unwrap();
            assert_eq!(&buf[..], wire);
            assert_eq!(decode(wire), Some((value, wire.len())));
        }
    }

    #[test]
    fn truncated_varint_needs_more() {
        assert_eq!(decode(&[0x9d, 0x7f]), None);
        assert_eq!(decode(&[]), None);
    }

    #[test]
    fn out_of_range_is_rejected() {
        assert!(encode(MAX + 1, &mut BytesMut::new()).is_err());
    }
}

//! Bit-stream primitives. Bits travel as `Vec<u8>` holding 0/1 values,
//! big-endian (MSB first) throughout.

use crate::error::{ModemError, Result};

/// Render an integer as a fixed-width big-endian bit array.
pub fn int_to_bits(value: u64, num_bits: usize) -> Result<Vec<u8>> {
    if num_bits == 0 {
        return Err(ModemError::InvalidArgument(
            "num_bits must be positive".to_string(),
        ));
    }
    if num_bits < 64 && value >= 1u64 << num_bits {
        return Err(ModemError::InvalidArgument(format!(
            "value {value} won't fit into {num_bits} bits"
        )));
    }
    Ok((0..num_bits)
        .map(|i| {
            let shift = num_bits - 1 - i;
            if shift >= u64::BITS as usize {
                0
            } else {
                ((value >> shift) & 1) as u8
            }
        })
        .collect())
}

/// Parse a hex string into a bit array of exactly `expected_bits`, left
/// padding the string with zeros. Widths must be whole bytes.
pub fn hex_to_bits(hex: &str, expected_bits: usize) -> Result<Vec<u8>> {
    if expected_bits == 0 || expected_bits % 8 != 0 {
        return Err(ModemError::InvalidArgument(
            "expected_bits must be a positive multiple of 8 for hex conversion".to_string(),
        ));
    }
    let digits = expected_bits / 4;
    if hex.len() > digits {
        return Err(ModemError::InvalidArgument(format!(
            "hex string '{hex}' does not fit in {expected_bits} bits"
        )));
    }
    let padded = format!("{hex:0>digits$}");
    let mut bits = Vec::with_capacity(expected_bits);
    for ch in padded.chars() {
        let nibble = ch.to_digit(16).ok_or_else(|| {
            ModemError::InvalidArgument(format!("invalid hex digit '{ch}' in '{hex}'"))
        })?;
        for i in (0..4).rev() {
            bits.push(((nibble >> i) & 1) as u8);
        }
    }
    Ok(bits)
}

/// Expand a UTF-8 string to its bit stream, MSB first per byte.
pub fn string_to_bits(text: &str) -> Vec<u8> {
    let mut bits = Vec::with_capacity(text.len() * 8);
    for byte in text.bytes() {
        for i in (0..8).rev() {
            bits.push((byte >> i) & 1);
        }
    }
    bits
}

/// Pack a bit stream back into bytes, dropping any trailing partial byte.
pub fn pack_bits(bits: &[u8]) -> Vec<u8> {
    bits.chunks_exact(8)
        .map(|chunk| chunk.iter().fold(0u8, |acc, &b| (acc << 1) | (b & 1)))
        .collect()
}

/// Compact rendering of a bit prefix for trace output.
pub fn bits_to_str(bits: &[u8], limit: usize) -> String {
    bits.iter()
        .take(limit)
        .map(|&b| if b == 0 { '0' } else { '1' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_to_bits_fixed_width() {
        assert_eq!(
            int_to_bits(0xAB, 12).unwrap(),
            vec![0, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 1]
        );
    }

    #[test]
    fn int_to_bits_rejects_bad_width() {
        assert!(matches!(
            int_to_bits(1, 0),
            Err(ModemError::InvalidArgument(_))
        ));
        assert!(matches!(
            int_to_bits(16, 4),
            Err(ModemError::InvalidArgument(_))
        ));
        // boundary: value just fits
        assert_eq!(int_to_bits(15, 4).unwrap(), vec![1, 1, 1, 1]);
    }

    #[test]
    fn int_to_bits_round_trips() {
        for v in [0u64, 1, 2, 127, 255, 0xDEADBEEF] {
            let bits = int_to_bits(v, 40).unwrap();
            let back = bits.iter().fold(0u64, |acc, &b| (acc << 1) | b as u64);
            assert_eq!(back, v);
        }
    }

    #[test]
    fn hex_to_bits_expected_width() {
        let bits = hex_to_bits("A5A5", 16).unwrap();
        assert_eq!(bits.len(), 16);
        assert_eq!(&bits[..8], &[1, 0, 1, 0, 0, 1, 0, 1]);
        assert_eq!(bits_to_str(&bits, 16), "1010010110100101");
    }

    #[test]
    fn hex_to_bits_left_pads() {
        assert_eq!(
            hex_to_bits("F", 8).unwrap(),
            vec![0, 0, 0, 0, 1, 1, 1, 1]
        );
    }

    #[test]
    fn hex_to_bits_rejects_odd_width() {
        assert!(hex_to_bits("A5", 12).is_err());
        assert!(hex_to_bits("XY", 16).is_err());
    }

    #[test]
    fn string_round_trips_through_bits() {
        for text in ["Chimera", "", "Rust makes acoustic links fun! \u{4f60}\u{597d}"] {
            let bits = string_to_bits(text);
            assert_eq!(bits.len(), text.len() * 8);
            assert_eq!(pack_bits(&bits), text.as_bytes());
        }
    }
}

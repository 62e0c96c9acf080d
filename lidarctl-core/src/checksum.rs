//! Control frame checksums
//!
//! Every control frame carries two checksums:
//! 1. CRC-16/CCITT-FALSE over the first 18 header bytes (poly 0x1021, init 0xFFFF)
//! 2. CRC-32 (IEEE) over the payload

use tracing::trace;

const CRC16_POLY: u16 = 0x1021;
const CRC16_INIT: u16 = 0xFFFF;

/// Calculate the header checksum
///
/// # Algorithm
///
/// ```text
/// crc = 0xFFFF
/// for each byte b:
///     crc ^= b << 8
///     repeat 8 times:
///         crc = (crc & 0x8000) ? (crc << 1) ^ 0x1021 : crc << 1
/// ```
///
/// # Examples
///
/// ```
/// use lidarctl_core::checksum;
///
/// assert_eq!(checksum::crc16(b"123456789"), 0x29B1);
/// ```
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = CRC16_INIT;

    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC16_POLY
            } else {
                crc << 1
            };
        }
    }

    trace!(
        len = data.len(),
        crc16 = format!("0x{:04X}", crc),
        "Calculated header checksum"
    );

    crc
}

/// Calculate the payload checksum
///
/// An empty payload has checksum 0.
pub fn crc32(data: &[u8]) -> u32 {
    if data.is_empty() {
        return 0;
    }

    crc32fast::hash(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_check_value() {
        // Standard check input for CRC-16/CCITT-FALSE
        assert_eq!(crc16(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_crc16_empty() {
        assert_eq!(crc16(&[]), CRC16_INIT);
    }

    #[test]
    fn test_crc32_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_crc32_empty_payload() {
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn test_crc16_detects_single_bit_flip() {
        let data = b"livox control frame";
        let mut flipped = data.to_vec();
        flipped[3] ^= 0x01;

        assert_ne!(crc16(data), crc16(&flipped));
    }
}

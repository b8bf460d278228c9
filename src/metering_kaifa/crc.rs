use crc16::{State, KERMIT};

/// CRC16 over `length` bytes of `data` starting at `start`, reflected
/// polynomial 0x8408 with zero init (the KERMIT table class). This is the
/// checksum of the framing layer; the telegram decoder itself never calls it.
pub fn compute(data: &[u8], start: usize, length: usize) -> u16 {
    let mut state = State::<KERMIT>::new();
    state.update(&data[start..start + length]);
    state.get()
}

/// Checks and strips a trailing big-endian CRC16. Returns the telegram
/// without the checksum bytes, or the expected/found pair on mismatch.
pub fn verify_trailing(data: &[u8]) -> Result<&[u8], (u16, u16)> {
    if data.len() < 2 {
        return Err((0, 0));
    }
    let body = &data[..data.len() - 2];
    let expected = compute(data, 0, body.len());
    let found = u16::from_be_bytes([data[data.len() - 2], data[data.len() - 1]]);
    if expected == found {
        Ok(body)
    } else {
        Err((expected, found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_check_value() {
        // Catalog check value for the KERMIT class.
        assert_eq!(compute(b"123456789", 0, 9), 0x2189);
    }

    #[test]
    fn test_compute_subrange() {
        let data = b"xx123456789yy";
        assert_eq!(compute(data, 2, 9), 0x2189);
    }

    #[test]
    fn test_verify_trailing() {
        let mut telegram = b"123456789".to_vec();
        telegram.extend_from_slice(&0x2189u16.to_be_bytes());
        assert_eq!(verify_trailing(&telegram).unwrap(), b"123456789");

        telegram[3] ^= 0xFF;
        assert!(verify_trailing(&telegram).is_err());
    }
}

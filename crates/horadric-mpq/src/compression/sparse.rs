//! Sparse (zero run-length) decoding
//!
//! The stream starts with the big-endian decoded size. Each control byte
//! then either introduces `(b & 0x7F) + 1` literal bytes (high bit set) or
//! stands for `(b & 0x7F) + 3` zero bytes.

use crate::error::{MpqError, MpqResult};

const METHOD: u8 = 0x20;

/// Decode a sparse stream
pub fn decompress(input: &[u8]) -> MpqResult<Vec<u8>> {
    let (size, mut rest) = input
        .split_first_chunk::<4>()
        .ok_or_else(|| MpqError::Decompression {
            method: METHOD,
            reason: "missing size prefix".to_string(),
        })?;
    let size = u32::from_be_bytes(*size) as usize;

    let mut output = Vec::with_capacity(size.min(super::MAX_SECTOR_OUTPUT));

    while let Some((&control, tail)) = rest.split_first() {
        if output.len() >= size {
            break;
        }
        let remaining = size - output.len();

        if control & 0x80 != 0 {
            let count = (usize::from(control & 0x7F) + 1).min(remaining);
            if tail.len() < count {
                return Err(MpqError::Decompression {
                    method: METHOD,
                    reason: "literal run past end of input".to_string(),
                });
            }
            output.extend_from_slice(&tail[..count]);
            rest = &tail[count..];
        } else {
            let count = (usize::from(control & 0x7F) + 3).min(remaining);
            output.resize(output.len() + count, 0);
            rest = tail;
        }
    }

    Ok(output)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_literals_and_zeros() {
        let input = [0, 0, 0, 6, 0x00, 0x81, 1, 2, 0x80, 3];
        assert_eq!(decompress(&input).unwrap(), vec![0, 0, 0, 1, 2, 3]);
    }

    #[test]
    fn test_output_capped_at_size() {
        let input = [0, 0, 0, 4, 0x7F];
        assert_eq!(decompress(&input).unwrap(), vec![0; 4]);
    }

    #[test]
    fn test_truncated_literal() {
        assert!(decompress(&[0, 0, 0, 4, 0x83, 1]).is_err());
        assert!(decompress(&[0, 0]).is_err());
    }
}

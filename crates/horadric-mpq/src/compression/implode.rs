//! PKWARE Data Compression Library "explode"
//!
//! Old MPQ archives implode data both as the `0x08` sector method and for
//! blocks flagged `IMPLODE`. Decoding is done by the `explode` crate; this
//! module bounds the output and maps its errors.

use crate::error::{MpqError, MpqResult};

const METHOD: u8 = 0x08;

/// Explode an imploded stream
///
/// The whole stream is decoded up to its end-of-stream code. When a limit is
/// given the output is cut to at most `limit` bytes.
pub fn explode(input: &[u8], limit: Option<usize>) -> MpqResult<Vec<u8>> {
    let mut output = ::explode::explode(input).map_err(|e| MpqError::Decompression {
        method: METHOD,
        reason: format!("{e:?}"),
    })?;

    if let Some(limit) = limit {
        output.truncate(limit);
    }

    Ok(output)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reference_stream() {
        // Raw literals, 1 KiB dictionary, one back-reference
        let input = [0x00, 0x04, 0x82, 0x24, 0x25, 0x8f, 0x80, 0x7f];
        assert_eq!(explode(&input, None).unwrap(), b"AIAIAIAIAIAIA".to_vec());
    }

    #[test]
    fn test_uncoded_literals() {
        // "AB" as raw literals followed by the end code
        let input = [0x00, 0x04, 0x82, 0x08, 0x05, 0xfc, 0x03];
        assert_eq!(explode(&input, None).unwrap(), b"AB".to_vec());
    }

    #[test]
    fn test_builder_literals_explode() {
        let data = b"Tristram cathedral, level 1".to_vec();
        let imploded = crate::test_utils::implode_literals(&data);
        assert_eq!(explode(&imploded, None).unwrap(), data);
    }

    #[test]
    fn test_limit_truncates() {
        let input = [0x00, 0x04, 0x82, 0x24, 0x25, 0x8f, 0x80, 0x7f];
        assert_eq!(explode(&input, Some(4)).unwrap(), b"AIAI".to_vec());
    }

    #[test]
    fn test_bad_header() {
        assert!(explode(&[0x02, 0x04], None).is_err());
        assert!(explode(&[0x00, 0x07], None).is_err());
        assert!(explode(&[0x00], None).is_err());
    }

    #[test]
    fn test_truncated_stream() {
        let input = [0x00, 0x04, 0x82, 0x24];
        let err = explode(&input, None).expect_err("truncated");
        assert!(matches!(err, MpqError::Decompression { method: 0x08, .. }));
    }
}

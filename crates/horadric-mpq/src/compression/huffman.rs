//! Storm adaptive Huffman
//!
//! WAV files in early archives are Huffman coded on their own (`0x01`) or as
//! the outer stage over IMA ADPCM (`0x41`, `0x81`). The decoder and its weight
//! tables come from `wow-mpq`; this module bounds the output and maps errors.

use crate::error::{MpqError, MpqResult};

const METHOD: u8 = 0x01;

/// Decode a Huffman payload (method byte already stripped)
///
/// Output longer than `limit` bytes is an error. For the ADPCM combinations
/// the limit is the final PCM length, which the ADPCM stream never exceeds.
pub fn decompress(payload: &[u8], limit: usize) -> MpqResult<Vec<u8>> {
    let output = wow_mpq::compression::decompress(payload, METHOD, limit).map_err(|e| {
        MpqError::Decompression {
            method: METHOD,
            reason: e.to_string(),
        }
    })?;

    if output.len() > limit {
        return Err(MpqError::Decompression {
            method: METHOD,
            reason: format!("output exceeds {limit} bytes"),
        });
    }

    Ok(output)
}

//! IMA ADPCM variant used for WAV sectors
//!
//! Output is 16-bit little-endian PCM. The input starts with one ignored
//! byte, a shift byte, then one raw initial sample per channel. Each following
//! byte is either a control code (high bit set) or a 6-bit delta for the
//! current channel; stereo streams alternate channels byte by byte.

use crate::error::{MpqError, MpqResult};

const INITIAL_STEP_INDEX: usize = 0x2C;
const MAX_STEP_INDEX: usize = 0x58;

const STEP_SIZES: [i32; 89] = [
    0x0007, 0x0008, 0x0009, 0x000A, 0x000B, 0x000C, 0x000D, 0x000E, 0x0010, 0x0011, 0x0013,
    0x0015, 0x0017, 0x0019, 0x001C, 0x001F, 0x0022, 0x0025, 0x0029, 0x002D, 0x0032, 0x0037,
    0x003C, 0x0042, 0x0049, 0x0050, 0x0058, 0x0061, 0x006B, 0x0076, 0x0082, 0x008F, 0x009D,
    0x00AD, 0x00BE, 0x00D1, 0x00E6, 0x00FD, 0x0117, 0x0133, 0x0151, 0x0173, 0x0198, 0x01C1,
    0x01EE, 0x0220, 0x0256, 0x0292, 0x02D4, 0x031C, 0x036C, 0x03C3, 0x0424, 0x048E, 0x0502,
    0x0583, 0x0610, 0x06AB, 0x0756, 0x0812, 0x08E0, 0x09C3, 0x0ABD, 0x0BD0, 0x0CFF, 0x0E4C,
    0x0FBA, 0x114C, 0x1307, 0x14EE, 0x1706, 0x1954, 0x1BDC, 0x1EA5, 0x21B6, 0x2515, 0x28CA,
    0x2CDF, 0x315B, 0x364B, 0x3BB9, 0x41B2, 0x4844, 0x4F7E, 0x5771, 0x602F, 0x69CE, 0x7462,
    0x7FFF,
];

const INDEX_ADJUST: [i32; 32] = [
    -1, 0, -1, 4, -1, 2, -1, 6, -1, 1, -1, 5, -1, 3, -1, 7, -1, 1, -1, 5, -1, 3, -1, 7, -1, 2,
    -1, 4, -1, 6, -1, 8,
];

/// Per-channel decoder state
#[derive(Debug, Clone, Copy)]
struct Channel {
    step_index: usize,
    sample: i32,
}

/// Decode an ADPCM payload with `channels` (1 or 2) channels
pub fn decompress(input: &[u8], channels: usize) -> MpqResult<Vec<u8>> {
    let method = if channels == 2 { 0x80 } else { 0x40 };
    let header_len = 2 + 2 * channels;
    if !(1..=2).contains(&channels) || input.len() < header_len {
        return Err(MpqError::Decompression {
            method,
            reason: format!("ADPCM payload of {} bytes has no header", input.len()),
        });
    }

    let shift = u32::from(input[1]);
    let mut state = [Channel {
        step_index: INITIAL_STEP_INDEX,
        sample: 0,
    }; 2];

    let mut output = Vec::with_capacity(input.len() * 4);
    for (c, chunk) in input[2..header_len].chunks_exact(2).enumerate() {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        state[c].sample = i32::from(sample);
        output.extend_from_slice(&sample.to_le_bytes());
    }

    let stereo = channels == 2;
    let mut channel = channels - 1;

    for &value in &input[header_len..] {
        if stereo {
            channel = 1 - channel;
        }
        let current = &mut state[channel];

        if value & 0x80 != 0 {
            match value & 0x7F {
                0 => {
                    current.step_index = current.step_index.saturating_sub(1);
                    output.extend_from_slice(&(current.sample as i16).to_le_bytes());
                }
                1 => {
                    current.step_index = (current.step_index + 8).min(MAX_STEP_INDEX);
                    if stereo {
                        channel = 1 - channel;
                    }
                }
                2 => {}
                _ => {
                    current.step_index = current.step_index.saturating_sub(8);
                    if stereo {
                        channel = 1 - channel;
                    }
                }
            }
            continue;
        }

        let step = STEP_SIZES[current.step_index];
        let mut delta = step.checked_shr(shift).unwrap_or(0);
        for bit in 0..6 {
            if value & (1 << bit) != 0 {
                delta += step >> bit;
            }
        }

        current.sample = if value & 0x40 != 0 {
            (current.sample - delta).max(i32::from(i16::MIN))
        } else {
            (current.sample + delta).min(i32::from(i16::MAX))
        };
        output.extend_from_slice(&(current.sample as i16).to_le_bytes());

        let adjusted = current.step_index as i32 + INDEX_ADJUST[usize::from(value & 0x1F)];
        current.step_index = adjusted.clamp(0, MAX_STEP_INDEX as i32) as usize;
    }

    Ok(output)
}

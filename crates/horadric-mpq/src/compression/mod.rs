//! Sector codec dispatcher
//!
//! A compressed sector starts with one method byte. Single codecs use one
//! bit; two-stage methods combine bits and are undone in a fixed order.
//!
//! | Tag | Stages | Supported |
//! |-----|--------|-----------|
//! | `0x02` | zlib | yes |
//! | `0x08` | PKWARE DCL explode | yes |
//! | `0x40` / `0x80` | IMA ADPCM mono / stereo | yes |
//! | `0x48` / `0x88` | explode, then ADPCM | yes |
//! | `0x22` | zlib, then sparse | yes |
//! | `0x01` | Huffman | yes |
//! | `0x41` / `0x81` | Huffman, then ADPCM mono / stereo | yes |
//! | `0x10`, `0x30` | BZip2 (+ sparse) | no |
//! | `0x12` | LZMA | no |
//!
//! Unsupported and unknown tags return
//! [`MpqError::UnsupportedCompression`](crate::MpqError::UnsupportedCompression).

pub mod adpcm;
pub mod huffman;
pub mod implode;
pub mod sparse;

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::{MpqError, MpqResult};
use crate::header::{BASE_SECTOR_SIZE, MAX_SECTOR_SIZE_SHIFT};

/// Upper bound for any single decoded sector
pub const MAX_SECTOR_OUTPUT: usize = (BASE_SECTOR_SIZE as usize) << MAX_SECTOR_SIZE_SHIFT;

/// Known compression method tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompressionMethod {
    /// Huffman coding
    Huffman = 0x01,
    /// zlib/deflate
    Zlib = 0x02,
    /// PKWARE DCL implode
    Implode = 0x08,
    /// BZip2
    Bzip2 = 0x10,
    /// LZMA
    Lzma = 0x12,
    /// Sparse, then zlib
    SparseZlib = 0x22,
    /// Sparse, then BZip2
    SparseBzip2 = 0x30,
    /// IMA ADPCM, one channel
    AdpcmMono = 0x40,
    /// IMA ADPCM mono, then Huffman
    HuffmanAdpcmMono = 0x41,
    /// IMA ADPCM mono, then implode
    ImplodeAdpcmMono = 0x48,
    /// IMA ADPCM, two channels
    AdpcmStereo = 0x80,
    /// IMA ADPCM stereo, then Huffman
    HuffmanAdpcmStereo = 0x81,
    /// IMA ADPCM stereo, then implode
    ImplodeAdpcmStereo = 0x88,
}

impl CompressionMethod {
    /// Parse a method byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Huffman),
            0x02 => Some(Self::Zlib),
            0x08 => Some(Self::Implode),
            0x10 => Some(Self::Bzip2),
            0x12 => Some(Self::Lzma),
            0x22 => Some(Self::SparseZlib),
            0x30 => Some(Self::SparseBzip2),
            0x40 => Some(Self::AdpcmMono),
            0x41 => Some(Self::HuffmanAdpcmMono),
            0x48 => Some(Self::ImplodeAdpcmMono),
            0x80 => Some(Self::AdpcmStereo),
            0x81 => Some(Self::HuffmanAdpcmStereo),
            0x88 => Some(Self::ImplodeAdpcmStereo),
            _ => None,
        }
    }

    /// Method byte
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether this reader can decode the method
    pub fn is_supported(self) -> bool {
        matches!(
            self,
            Self::Huffman
                | Self::Zlib
                | Self::Implode
                | Self::SparseZlib
                | Self::AdpcmMono
                | Self::AdpcmStereo
                | Self::HuffmanAdpcmMono
                | Self::HuffmanAdpcmStereo
                | Self::ImplodeAdpcmMono
                | Self::ImplodeAdpcmStereo
        )
    }
}

/// Decode one compressed sector
///
/// `data` includes the leading method byte. `expected_len` is the sector's
/// uncompressed length and bounds single-stage output; the caller checks the
/// final length.
pub fn decompress_sector(data: &[u8], expected_len: usize) -> MpqResult<Vec<u8>> {
    let (&tag, payload) = data.split_first().ok_or_else(|| MpqError::Decompression {
        method: 0,
        reason: "empty sector".to_string(),
    })?;

    let method = CompressionMethod::from_byte(tag)
        .filter(|m| m.is_supported())
        .ok_or(MpqError::UnsupportedCompression(tag))?;

    match method {
        CompressionMethod::Zlib => inflate(payload, expected_len),
        CompressionMethod::Huffman => huffman::decompress(payload, expected_len),
        CompressionMethod::Implode => implode::explode(payload, Some(expected_len)),
        CompressionMethod::SparseZlib => {
            let sparse = inflate(payload, MAX_SECTOR_OUTPUT)?;
            sparse::decompress(&sparse)
        }
        CompressionMethod::AdpcmMono => adpcm::decompress(payload, 1),
        CompressionMethod::AdpcmStereo => adpcm::decompress(payload, 2),
        CompressionMethod::HuffmanAdpcmMono => {
            adpcm::decompress(&huffman::decompress(payload, expected_len)?, 1)
        }
        CompressionMethod::HuffmanAdpcmStereo => {
            adpcm::decompress(&huffman::decompress(payload, expected_len)?, 2)
        }
        CompressionMethod::ImplodeAdpcmMono => {
            adpcm::decompress(&implode::explode(payload, None)?, 1)
        }
        CompressionMethod::ImplodeAdpcmStereo => {
            adpcm::decompress(&implode::explode(payload, None)?, 2)
        }
        _ => Err(MpqError::UnsupportedCompression(tag)),
    }
}

/// Inflate a zlib stream, refusing output beyond `limit` bytes
pub fn inflate(data: &[u8], limit: usize) -> MpqResult<Vec<u8>> {
    let decoder = ZlibDecoder::new(data);
    let mut output = Vec::with_capacity(limit.min(MAX_SECTOR_OUTPUT));

    decoder
        .take(limit as u64 + 1)
        .read_to_end(&mut output)
        .map_err(|e| MpqError::Decompression {
            method: CompressionMethod::Zlib.as_byte(),
            reason: e.to_string(),
        })?;

    if output.len() > limit {
        return Err(MpqError::Decompression {
            method: CompressionMethod::Zlib.as_byte(),
            reason: format!("output exceeds {limit} bytes"),
        });
    }

    Ok(output)
}

//! MPQ archive header

use binrw::{BinRead, BinWrite};

use crate::error::{MpqError, MpqResult};

/// Archive signature, `MPQ\x1A`
pub const MPQ_MAGIC: [u8; 4] = *b"MPQ\x1A";

/// On-disk size of the format version 0 header
pub const HEADER_SIZE: u32 = 32;

/// Base sector size, shifted left by [`ArchiveHeader::sector_size_shift`]
pub const BASE_SECTOR_SIZE: u32 = 0x200;

/// Largest accepted sector-size shift (16 MiB sectors)
pub const MAX_SECTOR_SIZE_SHIFT: u16 = 15;

/// Fixed archive header at offset 0
///
/// All fields are little-endian. The magic is checked while parsing, so a
/// successfully read header always carries the right signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little, magic = b"MPQ\x1A")]
pub struct ArchiveHeader {
    /// Size of this header in bytes
    pub header_size: u32,
    /// Declared size of the whole archive
    pub archive_size: u32,
    /// Format version (0 for the original layout)
    pub format_version: u16,
    /// Sector size is `0x200 << sector_size_shift`
    pub sector_size_shift: u16,
    /// Offset of the hash table from the archive start
    pub hash_table_offset: u32,
    /// Offset of the block table from the archive start
    pub block_table_offset: u32,
    /// Number of hash table entries
    pub hash_table_entries: u32,
    /// Number of block table entries
    pub block_table_entries: u32,
}

impl ArchiveHeader {
    /// Sector size in bytes
    pub fn sector_size(&self) -> u32 {
        BASE_SECTOR_SIZE << self.sector_size_shift.min(MAX_SECTOR_SIZE_SHIFT)
    }

    /// Structural checks beyond the signature
    pub fn validate(&self) -> MpqResult<()> {
        if self.header_size < HEADER_SIZE {
            return Err(MpqError::InvalidFormat(format!(
                "header size {} smaller than {HEADER_SIZE}",
                self.header_size
            )));
        }

        if self.sector_size_shift > MAX_SECTOR_SIZE_SHIFT {
            return Err(MpqError::InvalidFormat(format!(
                "sector size shift {} out of range",
                self.sector_size_shift
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use binrw::BinReaderExt;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn sample() -> ArchiveHeader {
        ArchiveHeader {
            header_size: HEADER_SIZE,
            archive_size: 0x1000,
            format_version: 0,
            sector_size_shift: 3,
            hash_table_offset: 0x20,
            block_table_offset: 0x120,
            hash_table_entries: 16,
            block_table_entries: 4,
        }
    }

    fn encode(header: &ArchiveHeader) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        header.write(&mut cursor).expect("header should encode");
        cursor.into_inner()
    }

    #[test]
    fn test_layout() {
        let bytes = encode(&sample());
        assert_eq!(bytes.len(), HEADER_SIZE as usize);
        assert_eq!(&bytes[0..4], &MPQ_MAGIC);
        assert_eq!(&bytes[4..8], &32u32.to_le_bytes());
        assert_eq!(&bytes[14..16], &3u16.to_le_bytes());
        assert_eq!(&bytes[28..32], &4u32.to_le_bytes());

        let parsed: ArchiveHeader = Cursor::new(bytes).read_le().expect("header should parse");
        assert_eq!(parsed, sample());
        assert_eq!(parsed.sector_size(), 0x1000);
    }

    #[test]
    fn test_truncated_header_is_invalid_format() {
        let bytes = &encode(&sample())[..20];
        let err: MpqError = ArchiveHeader::read(&mut Cursor::new(bytes))
            .expect_err("short header must fail")
            .into();
        assert!(matches!(err, MpqError::InvalidFormat(_)));
    }

    #[test]
    fn test_validate_shift() {
        let mut header = sample();
        assert!(header.validate().is_ok());
        header.sector_size_shift = 40;
        assert!(header.validate().is_err());
    }

    proptest! {
        #[test]
        fn any_magic_mutation_is_rejected(index in 0usize..4, flip in 1u8..=255) {
            let mut bytes = encode(&sample());
            bytes[index] ^= flip;
            let err: MpqError = ArchiveHeader::read(&mut Cursor::new(bytes))
                .expect_err("mutated magic must fail")
                .into();
            prop_assert!(matches!(err, MpqError::InvalidFormat(_)));
        }
    }
}

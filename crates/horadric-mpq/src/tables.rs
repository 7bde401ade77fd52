//! Hash table and block table
//!
//! Both tables are stored encrypted as runs of 16-byte records. They are
//! decrypted as whole `u32` word arrays by `horadric-crypto` and then split
//! into entries here. Neither table changes after an archive is opened.

use std::collections::HashMap;

use bitflags::bitflags;
use horadric_crypto::FileNameHash;

/// Block index of a never-used hash slot
pub const HASH_ENTRY_EMPTY: u32 = 0xFFFF_FFFF;

/// Block index of a slot whose file was deleted
pub const HASH_ENTRY_DELETED: u32 = 0xFFFF_FFFE;

/// Locale of language-neutral files
pub const LOCALE_NEUTRAL: u16 = 0;

bitflags! {
    /// Block table flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BlockFlags: u32 {
        /// PKWARE DCL imploded without a method byte
        const IMPLODE = 0x0000_0100;
        /// Sectors carry a leading compression-method byte
        const COMPRESS = 0x0000_0200;
        /// Payload is encrypted
        const ENCRYPTED = 0x0001_0000;
        /// Key is adjusted by file position and size
        const FIX_KEY = 0x0002_0000;
        /// Incremental patch payload
        const PATCH_FILE = 0x0010_0000;
        /// Stored as one unit instead of sectors
        const SINGLE_UNIT = 0x0100_0000;
        /// File deleted by a later patch archive
        const DELETE_MARKER = 0x0200_0000;
        /// Sector checksums follow the sector offsets
        const SECTOR_CRC = 0x0400_0000;
        /// Entry describes a real file
        const EXISTS = 0x8000_0000;
    }
}

/// One hash table record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashEntry {
    /// [`horadric_crypto::HashType::NameA`] hash of the path
    pub hash_a: u32,
    /// [`horadric_crypto::HashType::NameB`] hash of the path
    pub hash_b: u32,
    /// Locale tag (0 = neutral)
    pub locale: u16,
    /// Platform tag
    pub platform: u16,
    /// Index into the block table, or one of the sentinels
    pub block_index: u32,
}

impl HashEntry {
    /// Build from four decrypted words
    ///
    /// The third word packs locale in the high half and platform in the low
    /// half.
    pub fn from_words(words: [u32; 4]) -> Self {
        Self {
            hash_a: words[0],
            hash_b: words[1],
            locale: (words[2] >> 16) as u16,
            platform: (words[2] & 0xFFFF) as u16,
            block_index: words[3],
        }
    }

    /// The four plaintext words of this record
    pub fn to_words(&self) -> [u32; 4] {
        [
            self.hash_a,
            self.hash_b,
            (u32::from(self.locale) << 16) | u32::from(self.platform),
            self.block_index,
        ]
    }

    /// Whether the slot points at a block
    pub fn is_occupied(&self) -> bool {
        self.block_index != HASH_ENTRY_EMPTY && self.block_index != HASH_ENTRY_DELETED
    }

    /// Lookup key
    pub fn name_hash(&self) -> FileNameHash {
        FileNameHash::from_parts(self.hash_a, self.hash_b)
    }
}

/// Decrypted hash table with an in-memory index
#[derive(Debug, Clone, Default)]
pub struct HashTable {
    entries: Vec<HashEntry>,
    index: HashMap<u64, usize>,
}

impl HashTable {
    /// Build from the decrypted word array
    ///
    /// Empty and deleted slots stay in [`Self::entries`] but never enter the
    /// index. When several occupied slots share a name, the neutral-locale
    /// slot wins, otherwise the first one in table order.
    pub fn from_words(words: &[u32]) -> Self {
        let entries: Vec<HashEntry> = words
            .chunks_exact(4)
            .map(|w| HashEntry::from_words([w[0], w[1], w[2], w[3]]))
            .collect();

        let mut index: HashMap<u64, usize> = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            if !entry.is_occupied() {
                continue;
            }

            let key = entry.name_hash().key();
            match index.get(&key) {
                Some(&existing)
                    if entries[existing].locale != LOCALE_NEUTRAL
                        && entry.locale == LOCALE_NEUTRAL =>
                {
                    index.insert(key, position);
                }
                Some(_) => {}
                None => {
                    index.insert(key, position);
                }
            }
        }

        Self { entries, index }
    }

    /// Probe by precomputed hashes
    pub fn find(&self, hash_a: u32, hash_b: u32) -> Option<&HashEntry> {
        self.get(FileNameHash::from_parts(hash_a, hash_b))
    }

    /// Probe by name hash
    pub fn get(&self, hash: FileNameHash) -> Option<&HashEntry> {
        self.index.get(&hash.key()).map(|&i| &self.entries[i])
    }

    /// All slots, including empty and deleted ones
    pub fn entries(&self) -> &[HashEntry] {
        &self.entries
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no slots
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct indexed names
    pub fn file_count(&self) -> usize {
        self.index.len()
    }
}

/// One block table record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEntry {
    /// Offset of the file data from the archive start
    pub file_position: u32,
    /// Stored size
    pub compressed_size: u32,
    /// Size after decompression
    pub uncompressed_size: u32,
    /// Block flags
    pub flags: BlockFlags,
}

impl BlockEntry {
    /// Build from four decrypted words
    ///
    /// Unknown flag bits are preserved.
    pub fn from_words(words: [u32; 4]) -> Self {
        Self {
            file_position: words[0],
            compressed_size: words[1],
            uncompressed_size: words[2],
            flags: BlockFlags::from_bits_retain(words[3]),
        }
    }

    /// The four plaintext words of this record
    pub fn to_words(&self) -> [u32; 4] {
        [
            self.file_position,
            self.compressed_size,
            self.uncompressed_size,
            self.flags.bits(),
        ]
    }

    /// Whether sectors are compressed or imploded
    pub fn is_compressed(&self) -> bool {
        self.flags
            .intersects(BlockFlags::COMPRESS | BlockFlags::IMPLODE)
    }

    /// Whether the payload is encrypted
    pub fn is_encrypted(&self) -> bool {
        self.flags.contains(BlockFlags::ENCRYPTED)
    }

    /// Whether the file is stored as one unit
    pub fn is_single_unit(&self) -> bool {
        self.flags.contains(BlockFlags::SINGLE_UNIT)
    }

    /// Whether the file data starts with a sector offset table
    pub fn has_sector_table(&self) -> bool {
        self.is_compressed() && !self.is_single_unit()
    }

    /// Number of sectors for a given sector size
    pub fn sector_count(&self, sector_size: u32) -> u32 {
        self.uncompressed_size.div_ceil(sector_size)
    }
}

/// Decrypted block table
#[derive(Debug, Clone, Default)]
pub struct BlockTable {
    entries: Vec<BlockEntry>,
}

impl BlockTable {
    /// Build from the decrypted word array
    pub fn from_words(words: &[u32]) -> Self {
        Self {
            entries: words
                .chunks_exact(4)
                .map(|w| BlockEntry::from_words([w[0], w[1], w[2], w[3]]))
                .collect(),
        }
    }

    /// Entry at `index`, if in range
    pub fn get(&self, index: u32) -> Option<&BlockEntry> {
        self.entries.get(index as usize)
    }

    /// All entries
    pub fn entries(&self) -> &[BlockEntry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

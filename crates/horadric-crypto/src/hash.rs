//! Storm name hashing
//!
//! MPQ archives never store file names in their index. Instead each name is
//! folded through the crypt table three ways: two independent hashes form the
//! 64-bit lookup key and a third locates the hash-table slot. A fourth
//! variant derives encryption keys from table names and file names.
//!
//! Hashing is case-insensitive: every byte is upper-cased (ASCII) before it
//! is mixed in, so `data\global\x.dc6` and `DATA\GLOBAL\X.DC6` collide on
//! purpose.

use crate::table::CryptTable;
use std::fmt;

/// Seed of the primary accumulator
const HASH_SEED_1: u32 = 0x7FED_7FED;

/// Seed of the secondary accumulator
const HASH_SEED_2: u32 = 0xEEEE_EEEE;

/// Which section of the crypt table a hash uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum HashType {
    /// Hash-table slot index
    TableOffset = 0,
    /// First half of the lookup key
    NameA = 1,
    /// Second half of the lookup key
    NameB = 2,
    /// Encryption key for tables and files
    FileKey = 3,
}

impl HashType {
    /// Offset of this hash type's section in the crypt table
    #[inline]
    const fn table_offset(self) -> usize {
        (self as usize) * 0x100
    }
}

/// Hash raw name bytes
///
/// # Examples
///
/// ```
/// use horadric_crypto::{hash_bytes, HashType};
///
/// assert_eq!(hash_bytes(b"arr\\units.dat", HashType::TableOffset), 0xF4E6_C69D);
/// ```
pub fn hash_bytes(name: &[u8], hash_type: HashType) -> u32 {
    let table = CryptTable::global();
    let offset = hash_type.table_offset();

    let mut seed1 = HASH_SEED_1;
    let mut seed2 = HASH_SEED_2;

    for &byte in name {
        let ch = byte.to_ascii_uppercase();
        seed1 = table.get(offset + usize::from(ch)) ^ seed1.wrapping_add(seed2);
        seed2 = u32::from(ch)
            .wrapping_add(seed1)
            .wrapping_add(seed2)
            .wrapping_add(seed2 << 5)
            .wrapping_add(3);
    }

    seed1
}

/// Hash a name string
pub fn hash_string(name: &str, hash_type: HashType) -> u32 {
    hash_bytes(name.as_bytes(), hash_type)
}

/// Encryption key of a stored file
///
/// Only the last path component is hashed; the directory part never
/// contributes, which is why a renamed-directory file still decrypts.
pub fn file_key(path: &str) -> u32 {
    let name = path.rsplit(|c| c == '\\' || c == '/').next().unwrap_or(path);
    hash_string(name, HashType::FileKey)
}

/// The two independent name hashes that identify a file in the hash table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileNameHash {
    /// [`HashType::NameA`] hash
    pub hash_a: u32,
    /// [`HashType::NameB`] hash
    pub hash_b: u32,
}

impl FileNameHash {
    /// Hash a virtual path
    pub fn new(path: &str) -> Self {
        Self {
            hash_a: hash_string(path, HashType::NameA),
            hash_b: hash_string(path, HashType::NameB),
        }
    }

    /// Create from raw components
    pub const fn from_parts(hash_a: u32, hash_b: u32) -> Self {
        Self { hash_a, hash_b }
    }

    /// Composite 64-bit lookup key (`hash_a` high, `hash_b` low)
    pub const fn key(self) -> u64 {
        ((self.hash_a as u64) << 32) | self.hash_b as u64
    }
}

impl fmt::Display for FileNameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}:{:08x}", self.hash_a, self.hash_b)
    }
}

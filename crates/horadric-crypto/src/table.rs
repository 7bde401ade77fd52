//! Storm crypt table
//!
//! Every hash and cipher operation in the MPQ format indexes into a single
//! table of 0x500 pseudo-random words. The table is produced by a seeded
//! linear congruential generator and must match the format exactly, so it is
//! generated once and then shared read-only for the life of the process.

use std::sync::OnceLock;

/// Number of words in the crypt table
pub const CRYPT_TABLE_SIZE: usize = 0x500;

/// Initial LCG seed
const GENERATOR_SEED: u32 = 0x0010_0001;

/// LCG modulus
const GENERATOR_MODULUS: u32 = 0x002A_AAAB;

/// Offset of the table section used by the block cipher
pub const CIPHER_OFFSET: usize = 0x400;

/// The 1280-word table shared by hashing and decryption
pub struct CryptTable {
    entries: [u32; CRYPT_TABLE_SIZE],
}

impl CryptTable {
    /// Generate the table from scratch
    ///
    /// Each of the 256 columns receives five words, one per 0x100-word
    /// section. Every word consumes two generator steps: the first supplies
    /// the high half, the second the low half.
    pub fn generate() -> Self {
        let mut entries = [0u32; CRYPT_TABLE_SIZE];
        let mut seed = GENERATOR_SEED;

        for column in 0..0x100 {
            let mut index = column;
            for _ in 0..5 {
                seed = next_seed(seed);
                let high = (seed & 0xFFFF) << 16;
                seed = next_seed(seed);
                let low = seed & 0xFFFF;

                entries[index] = high | low;
                index += 0x100;
            }
        }

        Self { entries }
    }

    /// Process-wide table, generated on first access
    pub fn global() -> &'static Self {
        static TABLE: OnceLock<CryptTable> = OnceLock::new();
        TABLE.get_or_init(Self::generate)
    }

    /// Word at `index`
    ///
    /// Callers derive the index from a hash type (0..=3) or the cipher offset
    /// plus a masked byte, so it is always below [`CRYPT_TABLE_SIZE`].
    #[inline]
    pub fn get(&self, index: usize) -> u32 {
        self.entries[index % CRYPT_TABLE_SIZE]
    }

    /// All table words
    pub fn as_slice(&self) -> &[u32] {
        &self.entries
    }
}

impl std::fmt::Debug for CryptTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptTable")
            .field("len", &self.entries.len())
            .field("first", &format_args!("{:#010x}", self.entries[0]))
            .finish()
    }
}

/// One step of the table generator
#[inline]
const fn next_seed(seed: u32) -> u32 {
    // seed < modulus, so seed * 125 + 3 stays well inside u32
    (seed * 125 + 3) % GENERATOR_MODULUS
}

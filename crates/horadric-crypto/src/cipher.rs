//! Storm block cipher
//!
//! The cipher works on little-endian 32-bit words. Two seeds advance per
//! word: the key is rotated through a fixed shift/add recurrence and the
//! second seed folds in the crypt table plus the plaintext word. Because the
//! plaintext feeds back into the state, decryption and encryption differ
//! only in which word (input or output) is fed back.
//!
//! Hash and block tables are keyed with the [`HashType::FileKey`] hash of
//! their fixed names; file sectors are keyed with the file key plus the
//! sector index.
//!
//! ```
//! use horadric_crypto::{decrypt_block, encrypt_block};
//!
//! let mut words = [1u32, 2, 3, 4];
//! encrypt_block(&mut words, 0xC3AF_3770);
//! assert_ne!(words, [1, 2, 3, 4]);
//! decrypt_block(&mut words, 0xC3AF_3770);
//! assert_eq!(words, [1, 2, 3, 4]);
//! ```

use crate::error::CryptoError;
use crate::hash::{HashType, hash_string};
use crate::table::{CIPHER_OFFSET, CryptTable};
use std::io::Read;

/// Initial value of the secondary seed
const CIPHER_SEED: u32 = 0xEEEE_EEEE;

/// Name of the encrypted hash table
pub const HASH_TABLE_KEY_NAME: &str = "(hash table)";

/// Name of the encrypted block table
pub const BLOCK_TABLE_KEY_NAME: &str = "(block table)";

/// Streaming Storm cipher state
///
/// Each call consumes one word of the keystream, so a single instance must
/// see the words of one encrypted region in order.
#[derive(Debug, Clone)]
pub struct StormCipher {
    key: u32,
    seed: u32,
    table: &'static CryptTable,
}

impl StormCipher {
    /// Start a keystream for `key`
    pub fn new(key: u32) -> Self {
        Self {
            key,
            seed: CIPHER_SEED,
            table: CryptTable::global(),
        }
    }

    /// Start a keystream keyed by a table name such as `"(hash table)"`
    pub fn for_table(name: &str) -> Self {
        Self::new(table_key(name))
    }

    #[inline]
    fn advance(&mut self, plain: u32) {
        self.key = ((!self.key) << 21).wrapping_add(0x1111_1111) | (self.key >> 11);
        self.seed = plain
            .wrapping_add(self.seed)
            .wrapping_add(self.seed << 5)
            .wrapping_add(3);
    }

    /// Decrypt one word
    #[inline]
    pub fn decrypt_word(&mut self, value: u32) -> u32 {
        self.seed = self
            .seed
            .wrapping_add(self.table.get(CIPHER_OFFSET + (self.key & 0xFF) as usize));
        let plain = value ^ self.key.wrapping_add(self.seed);
        self.advance(plain);
        plain
    }

    /// Encrypt one word
    #[inline]
    pub fn encrypt_word(&mut self, value: u32) -> u32 {
        self.seed = self
            .seed
            .wrapping_add(self.table.get(CIPHER_OFFSET + (self.key & 0xFF) as usize));
        let cipher = value ^ self.key.wrapping_add(self.seed);
        self.advance(value);
        cipher
    }
}

/// Key used for a named table
pub fn table_key(name: &str) -> u32 {
    hash_string(name, HashType::FileKey)
}

/// Decrypt words in place
pub fn decrypt_block(data: &mut [u32], key: u32) {
    let mut cipher = StormCipher::new(key);
    for word in data {
        *word = cipher.decrypt_word(*word);
    }
}

/// Encrypt words in place
pub fn encrypt_block(data: &mut [u32], key: u32) {
    let mut cipher = StormCipher::new(key);
    for word in data {
        *word = cipher.encrypt_word(*word);
    }
}

/// Decrypt a byte buffer in place
///
/// The buffer is processed as little-endian words. A trailing partial word
/// (fewer than 4 bytes) is stored in the clear and left untouched.
pub fn decrypt_bytes(data: &mut [u8], key: u32) {
    let mut cipher = StormCipher::new(key);
    for chunk in data.chunks_exact_mut(4) {
        let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&cipher.decrypt_word(word).to_le_bytes());
    }
}

/// Encrypt a byte buffer in place
pub fn encrypt_bytes(data: &mut [u8], key: u32) {
    let mut cipher = StormCipher::new(key);
    for chunk in data.chunks_exact_mut(4) {
        let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&cipher.encrypt_word(word).to_le_bytes());
    }
}

/// Read and decrypt a 16-byte-per-entry archive table
///
/// Reads `entry_count * 4` words from `reader` and decrypts them with the
/// key derived from `table_name`. A short read is reported as
/// [`CryptoError::TableTruncated`]; a wrong key is not detectable here and
/// simply yields garbage.
pub fn decrypt_table<R: Read>(
    reader: &mut R,
    entry_count: u32,
    table_name: &str,
) -> Result<Vec<u32>, CryptoError> {
    let word_count = entry_count as usize * 4;
    let expected = word_count * 4;

    let mut raw = Vec::with_capacity(expected);
    reader
        .take(expected as u64)
        .read_to_end(&mut raw)?;

    if raw.len() != expected {
        return Err(CryptoError::TableTruncated {
            name: table_name.to_string(),
            expected,
            actual: raw.len(),
        });
    }

    let mut cipher = StormCipher::for_table(table_name);
    let words = raw
        .chunks_exact(4)
        .map(|chunk| cipher.decrypt_word(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])))
        .collect();

    Ok(words)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    #[test]
    fn test_decrypt_known_words() {
        let mut words = [0x1234_5678, 0x9ABC_DEF0, 0x0000_0000, 0xFFFF_FFFF];
        decrypt_block(&mut words, 0xC3AF_3770);
        assert_eq!(words, [0x9408_99B4, 0x6169_1E7C, 0xD715_7B15, 0xCB16_448A]);
    }

    #[test]
    fn test_encrypt_known_words() {
        let mut words = [1, 2, 3, 4];
        encrypt_block(&mut words, table_key(HASH_TABLE_KEY_NAME));
        assert_eq!(words, [0x863C_CFCD, 0x67CD_26DB, 0x6090_8C8B, 0x16B1_8032]);
    }

    #[test]
    fn test_decrypt_bytes_leaves_tail() {
        let mut data = vec![0u8; 10];
        encrypt_bytes(&mut data, 0x1234);
        assert_eq!(&data[8..], &[0, 0]);
        decrypt_bytes(&mut data, 0x1234);
        assert_eq!(data, vec![0u8; 10]);
    }

    #[test]
    fn test_bytes_match_words() {
        let words = [0xDEAD_BEEF_u32, 0x0102_0304, 0xCAFE_F00D];
        let mut bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let mut expected = words;

        decrypt_bytes(&mut bytes, 0xABCD_EF01);
        decrypt_block(&mut expected, 0xABCD_EF01);

        let expected_bytes: Vec<u8> = expected.iter().flat_map(|w| w.to_le_bytes()).collect();
        assert_eq!(bytes, expected_bytes);
    }

    #[test]
    fn test_decrypt_table_round_trip() {
        let mut words: Vec<u32> = (0..8).collect();
        encrypt_block(&mut words, table_key(BLOCK_TABLE_KEY_NAME));
        let raw: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();

        let table = decrypt_table(&mut Cursor::new(raw), 2, BLOCK_TABLE_KEY_NAME)
            .expect("table should decrypt");
        assert_eq!(table, (0..8).collect::<Vec<u32>>());
    }

    #[test]
    fn test_decrypt_table_truncated() {
        let raw = vec![0u8; 20];
        let err = decrypt_table(&mut Cursor::new(raw), 2, HASH_TABLE_KEY_NAME)
            .expect_err("short table must fail");

        match err {
            CryptoError::TableTruncated {
                expected, actual, ..
            } => {
                assert_eq!(expected, 32);
                assert_eq!(actual, 20);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    proptest! {
        #[test]
        fn encrypt_then_decrypt_restores(words in prop::collection::vec(any::<u32>(), 0..64), key in any::<u32>()) {
            let mut data = words.clone();
            encrypt_block(&mut data, key);
            decrypt_block(&mut data, key);
            prop_assert_eq!(data, words);
        }
    }
}

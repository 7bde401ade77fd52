//! Storm hashing and encryption primitives for MPQ archives
//!
//! MPQ archives index their files by hashed names and protect both their
//! index tables and (optionally) file payloads with a simple stream cipher.
//! Both are built on one 1280-entry pseudo-random table that the format
//! fixes bit for bit.
//!
//! # Components
//!
//! - **Crypt table**: [`CryptTable`], generated once per process on first use
//! - **Hashing**: [`hash_string`] with the four [`HashType`] variants, and
//!   [`FileNameHash`] for the 64-bit lookup key
//! - **Cipher**: [`StormCipher`] plus the slice helpers [`decrypt_block`],
//!   [`decrypt_bytes`] and [`decrypt_table`]
//!
//! # Examples
//!
//! ## Name hashing
//!
//! ```
//! use horadric_crypto::{hash_string, HashType};
//!
//! assert_eq!(hash_string("(hash table)", HashType::FileKey), 0xC3AF_3770);
//! ```
//!
//! ## Lookup key
//!
//! ```
//! use horadric_crypto::FileNameHash;
//!
//! let hash = FileNameHash::new("data\\global\\palette\\act1\\pal.dat");
//! assert_eq!(hash, FileNameHash::new("DATA\\GLOBAL\\PALETTE\\ACT1\\PAL.DAT"));
//! println!("lookup key: {hash}");
//! ```

#![warn(missing_docs)]

pub mod cipher;
pub mod error;
pub mod hash;
pub mod table;

pub use error::CryptoError;

// Re-export commonly used types
pub use cipher::{
    BLOCK_TABLE_KEY_NAME, HASH_TABLE_KEY_NAME, StormCipher, decrypt_block, decrypt_bytes,
    decrypt_table, encrypt_block, encrypt_bytes, table_key,
};
pub use hash::{FileNameHash, HashType, file_key, hash_bytes, hash_string};
pub use table::CryptTable;

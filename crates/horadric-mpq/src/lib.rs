//! Read-only MPQ archive support
//!
//! MPQ is the container format of Diablo II era games. An archive holds a
//! fixed header, an encrypted hash table indexing hashed file names, an
//! encrypted block table describing where and how each file is stored, and
//! the file data itself, split into independently compressed and optionally
//! encrypted sectors.
//!
//! # Components
//!
//! - [`ArchiveHeader`]: the 32-byte header, parsed with `binrw`
//! - [`HashTable`] / [`BlockTable`]: decrypted index tables
//! - [`Archive`]: open archive with `contains`, `read_file` and listfile
//!   enumeration
//! - [`FileStream`]: `Read + Seek` access to one stored file, decoding
//!   sectors on demand
//! - [`compression`]: sector codec dispatcher and codecs
//!
//! # Example
//!
//! ```no_run
//! use horadric_mpq::Archive;
//!
//! let archive = Archive::open("d2data.mpq")?;
//! if archive.contains("data\\global\\excel\\armor.txt") {
//!     let text = archive.read_text("data\\global\\excel\\armor.txt")?;
//!     println!("{} bytes", text.len());
//! }
//! # Ok::<(), horadric_mpq::MpqError>(())
//! ```

#![warn(missing_docs)]

pub mod archive;
pub mod compression;
pub mod error;
pub mod header;
pub mod stream;
pub mod tables;

/// Archive builder for tests
#[cfg(any(test, feature = "test-utils"))]
#[allow(clippy::expect_used, clippy::unwrap_used)]
pub mod test_utils;

pub use archive::{Archive, LISTFILE_NAME};
pub use compression::CompressionMethod;
pub use error::{ErrorKind, MpqError, MpqResult};
pub use header::{ArchiveHeader, MPQ_MAGIC};
pub use stream::{FileStream, encryption_seed};
pub use tables::{BlockEntry, BlockFlags, BlockTable, HashEntry, HashTable};

//! In-memory archive builder for tests
//!
//! Assembles small but structurally complete archives: header, file data,
//! encrypted hash table and encrypted block table. Files can be stored raw,
//! zlib-compressed, imploded (literal-only streams), or tagged with an
//! arbitrary method byte, and optionally encrypted with or without `FIX_KEY`.
//!
//! An encoded sector that would not fit in one sector is stored raw instead,
//! as real archive writers do.

use std::io::{Cursor, Write};

use binrw::BinWrite;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use horadric_crypto::{
    BLOCK_TABLE_KEY_NAME, FileNameHash, HASH_TABLE_KEY_NAME, HashType, encrypt_block,
    encrypt_bytes, hash_string, table_key,
};

use crate::archive::LISTFILE_NAME;
use crate::header::{ArchiveHeader, BASE_SECTOR_SIZE, HEADER_SIZE};
use crate::stream::encryption_seed;
use crate::tables::{BlockEntry, BlockFlags, HASH_ENTRY_EMPTY, HashEntry};

/// How file data is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Storage {
    /// Raw bytes
    #[default]
    Stored,
    /// `0x02` zlib sectors, falling back to raw when compression does not help
    Zlib,
    /// `IMPLODE` flag with literal-only implode streams
    Implode,
    /// `COMPRESS` flag with the given method byte in front of raw bytes
    Tagged(u8),
}

/// Per-file build options
#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    /// Storage method
    pub storage: Storage,
    /// Store as one unit instead of sectors
    pub single_unit: bool,
    /// Encrypt the payload
    pub encrypted: bool,
    /// Adjust the key by position and size
    pub fix_key: bool,
    /// Hash entry locale
    pub locale: u16,
    /// Additional block flags
    pub extra_flags: BlockFlags,
    /// Write a sector offset table whose first entry is off by four
    pub tamper_sector_table: bool,
    /// Keep encoded sectors even when they outgrow the sector size
    pub oversize_sectors: bool,
    /// Uncompressed size to record instead of the real one
    pub size_override: Option<u32>,
    /// Block index to record instead of the real one
    pub block_index_override: Option<u32>,
}

/// Builder for in-memory archives
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    sector_size_shift: u16,
    files: Vec<(String, Vec<u8>, FileOptions)>,
    listfile: bool,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveBuilder {
    /// Empty archive with 4 KiB sectors
    pub fn new() -> Self {
        Self {
            sector_size_shift: 3,
            files: Vec::new(),
            listfile: false,
        }
    }

    /// Set the sector size shift
    #[must_use]
    pub fn sector_size_shift(mut self, shift: u16) -> Self {
        self.sector_size_shift = shift;
        self
    }

    /// Add a file
    #[must_use]
    pub fn add_file(mut self, name: impl Into<String>, data: Vec<u8>, options: FileOptions) -> Self {
        self.files.push((name.into(), data, options));
        self
    }

    /// Append a `(listfile)` naming every added file
    #[must_use]
    pub fn with_listfile(mut self) -> Self {
        self.listfile = true;
        self
    }

    /// Assemble the archive bytes
    pub fn build(&self) -> Vec<u8> {
        let sector_size = (BASE_SECTOR_SIZE << self.sector_size_shift) as usize;

        let mut files = self.files.clone();
        if self.listfile {
            let mut listing = String::new();
            for (name, _, _) in &self.files {
                listing.push_str(name);
                listing.push_str("\r\n");
            }
            files.push((
                LISTFILE_NAME.to_string(),
                listing.into_bytes(),
                FileOptions::default(),
            ));
        }

        let mut out = vec![0u8; HEADER_SIZE as usize];
        let mut blocks = Vec::with_capacity(files.len());

        for (name, data, options) in &files {
            let mut flags = BlockFlags::EXISTS | options.extra_flags;
            match options.storage {
                Storage::Stored => {}
                Storage::Zlib | Storage::Tagged(_) => flags |= BlockFlags::COMPRESS,
                Storage::Implode => flags |= BlockFlags::IMPLODE,
            }
            if options.single_unit {
                flags |= BlockFlags::SINGLE_UNIT;
            }
            if options.encrypted {
                flags |= BlockFlags::ENCRYPTED;
            }
            if options.fix_key {
                flags |= BlockFlags::FIX_KEY;
            }

            let mut block = BlockEntry {
                file_position: out.len() as u32,
                compressed_size: 0,
                uncompressed_size: options.size_override.unwrap_or(data.len() as u32),
                flags,
            };
            let seed = encryption_seed(name, &block);
            let encrypt_payload = options.encrypted && block.uncompressed_size > 3;

            let stored = if options.single_unit {
                let mut unit = encode_unit(data, options.storage);
                if encrypt_payload {
                    encrypt_bytes(&mut unit, seed);
                }
                unit
            } else if options.storage == Storage::Stored {
                let mut raw = Vec::with_capacity(data.len());
                for (i, chunk) in data.chunks(sector_size).enumerate() {
                    let mut sector = chunk.to_vec();
                    if encrypt_payload {
                        encrypt_bytes(&mut sector, seed.wrapping_add(i as u32));
                    }
                    raw.extend(sector);
                }
                raw
            } else {
                let chunks: Vec<&[u8]> = data.chunks(sector_size).collect();
                let mut offsets = vec![((chunks.len() + 1) * 4) as u32];
                let mut body = Vec::new();

                for (i, chunk) in chunks.iter().enumerate() {
                    let mut sector = encode_unit(chunk, options.storage);
                    if sector.len() > sector_size && !options.oversize_sectors {
                        sector = chunk.to_vec();
                    }
                    if encrypt_payload {
                        encrypt_bytes(&mut sector, seed.wrapping_add(i as u32));
                    }
                    body.extend(sector);
                    offsets.push(offsets[0] + body.len() as u32);
                }

                if options.tamper_sector_table {
                    offsets[0] += 4;
                }
                if options.encrypted {
                    encrypt_block(&mut offsets, seed.wrapping_sub(1));
                }

                let mut stored: Vec<u8> = offsets.iter().flat_map(|o| o.to_le_bytes()).collect();
                stored.extend(body);
                stored
            };

            block.compressed_size = stored.len() as u32;
            out.extend(stored);
            blocks.push(block);
        }

        let hash_table_size = (files.len() * 2).max(4).next_power_of_two();
        let mut slots = vec![HashEntry::from_words([HASH_ENTRY_EMPTY; 4]); hash_table_size];
        let mut used = vec![false; hash_table_size];
        for (index, (name, _, options)) in files.iter().enumerate() {
            let hash = FileNameHash::new(name);
            let mut slot = hash_string(name, HashType::TableOffset) as usize % hash_table_size;
            while used[slot] {
                slot = (slot + 1) % hash_table_size;
            }
            used[slot] = true;
            slots[slot] = HashEntry {
                hash_a: hash.hash_a,
                hash_b: hash.hash_b,
                locale: options.locale,
                platform: 0,
                block_index: options.block_index_override.unwrap_or(index as u32),
            };
        }

        let hash_table_offset = out.len() as u32;
        let mut hash_words: Vec<u32> = slots.iter().flat_map(HashEntry::to_words).collect();
        encrypt_block(&mut hash_words, table_key(HASH_TABLE_KEY_NAME));
        out.extend(hash_words.iter().flat_map(|w| w.to_le_bytes()));

        let block_table_offset = out.len() as u32;
        let mut block_words: Vec<u32> = blocks.iter().flat_map(BlockEntry::to_words).collect();
        encrypt_block(&mut block_words, table_key(BLOCK_TABLE_KEY_NAME));
        out.extend(block_words.iter().flat_map(|w| w.to_le_bytes()));

        let header = ArchiveHeader {
            header_size: HEADER_SIZE,
            archive_size: out.len() as u32,
            format_version: 0,
            sector_size_shift: self.sector_size_shift,
            hash_table_offset,
            block_table_offset,
            hash_table_entries: hash_table_size as u32,
            block_table_entries: blocks.len() as u32,
        };
        let mut cursor = Cursor::new(&mut out[..HEADER_SIZE as usize]);
        header.write(&mut cursor).expect("header fits its slot");

        out
    }
}

/// Encode one sector or single unit
fn encode_unit(data: &[u8], storage: Storage) -> Vec<u8> {
    match storage {
        Storage::Stored => data.to_vec(),
        Storage::Zlib => {
            let mut encoder = ZlibEncoder::new(vec![0x02], Compression::best());
            encoder.write_all(data).expect("writing to a Vec cannot fail");
            let compressed = encoder.finish().expect("writing to a Vec cannot fail");
            if compressed.len() < data.len() {
                compressed
            } else {
                data.to_vec()
            }
        }
        Storage::Implode => implode_literals(data),
        Storage::Tagged(tag) => {
            let mut tagged = Vec::with_capacity(data.len() + 1);
            tagged.push(tag);
            tagged.extend_from_slice(data);
            tagged
        }
    }
}

/// Implode stream of raw literals with a 1 KiB dictionary
///
/// Always longer than its input, so readers never mistake it for raw data.
pub fn implode_literals(data: &[u8]) -> Vec<u8> {
    let mut writer = BitWriter::default();
    writer.put(0, 8);
    writer.put(4, 8);
    for &byte in data {
        writer.put(0, 1);
        writer.put(u32::from(byte), 8);
    }
    // Length code 519: flag bit, seven inverted code bits, eight extra bits
    writer.put(1, 1);
    writer.put(0, 7);
    writer.put(0xFF, 8);
    writer.finish()
}

#[derive(Default)]
struct BitWriter {
    out: Vec<u8>,
    buffer: u32,
    count: u32,
}

impl BitWriter {
    fn put(&mut self, value: u32, bits: u32) {
        self.buffer |= value << self.count;
        self.count += bits;
        while self.count >= 8 {
            self.out.push((self.buffer & 0xFF) as u8);
            self.buffer >>= 8;
            self.count -= 8;
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.count > 0 {
            self.out.push((self.buffer & 0xFF) as u8);
        }
        self.out
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::archive::Archive;
    use pretty_assertions::assert_eq;

    fn sector_offsets(options: FileOptions) -> Vec<u32> {
        let bytes = ArchiveBuilder::new()
            .sector_size_shift(0)
            .add_file("f.bin", vec![0x5A; 1400], options)
            .build();
        let archive = Archive::from_reader(Cursor::new(bytes.clone())).unwrap();
        let start = archive.lookup("f.bin").unwrap().file_position as usize;
        bytes[start..start + 16]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn test_sectors_fit_the_sector_size() {
        for storage in [Storage::Implode, Storage::Tagged(0x10)] {
            let offsets = sector_offsets(FileOptions {
                storage,
                ..FileOptions::default()
            });
            // Two full sectors fall back to raw, the 376-byte tail stays encoded
            assert_eq!(offsets[1] - offsets[0], 512, "{storage:?}");
            assert_eq!(offsets[2] - offsets[1], 512, "{storage:?}");
            assert!(offsets[3] - offsets[2] > 376, "{storage:?}");
        }
    }

    #[test]
    fn test_oversize_sectors_are_kept_on_request() {
        let offsets = sector_offsets(FileOptions {
            storage: Storage::Implode,
            oversize_sectors: true,
            ..FileOptions::default()
        });
        assert!(offsets[1] - offsets[0] > 512);
    }
}

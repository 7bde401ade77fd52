//! Per-file streaming reader
//!
//! A [`FileStream`] maps logical file offsets onto stored sectors. It keeps
//! at most one decoded sector in memory: reading inside that sector copies
//! from the buffer, reading elsewhere loads (and replaces) it. Single-unit
//! files are decoded whole on first access.
//!
//! Streams carry mutable cursor state and are not meant to be shared; open
//! one per reader instead.

use std::io::{self, Read, Seek, SeekFrom};

use horadric_crypto::{decrypt_block, decrypt_bytes, file_key};
use tracing::debug;

use crate::archive::Archive;
use crate::compression::{decompress_sector, implode};
use crate::error::{MpqError, MpqResult};
use crate::tables::{BlockEntry, BlockFlags};

/// Cap on up-front allocation when reading a whole file
const MAX_PREALLOCATION: usize = 64 * 1024 * 1024;

/// Decryption key of a stored file
///
/// Derived from the last path component; blocks flagged `FIX_KEY` further
/// mix in their position and size.
pub fn encryption_seed(path: &str, block: &BlockEntry) -> u32 {
    let seed = file_key(path);
    if block.flags.contains(BlockFlags::FIX_KEY) {
        seed.wrapping_add(block.file_position) ^ block.uncompressed_size
    } else {
        seed
    }
}

#[derive(Debug)]
enum SectorBuffer {
    Unbuffered,
    Buffered { index: u32, data: Vec<u8> },
}

/// Streaming reader over one stored file
pub struct FileStream<'a, R> {
    archive: &'a Archive<R>,
    name: String,
    block: BlockEntry,
    sector_size: u32,
    seed: u32,
    sector_offsets: Option<Vec<u32>>,
    position: u64,
    buffer: SectorBuffer,
}

impl<'a, R: Read + Seek> FileStream<'a, R> {
    pub(crate) fn new(archive: &'a Archive<R>, block: BlockEntry, name: &str) -> Self {
        Self {
            archive,
            name: name.to_string(),
            block,
            sector_size: archive.sector_size(),
            seed: encryption_seed(name, &block),
            sector_offsets: None,
            position: 0,
            buffer: SectorBuffer::Unbuffered,
        }
    }

    /// Uncompressed file size
    pub fn len(&self) -> u64 {
        u64::from(self.block.uncompressed_size)
    }

    /// Whether the file is empty
    pub fn is_empty(&self) -> bool {
        self.block.uncompressed_size == 0
    }

    /// Current cursor position
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Block table entry of this file
    pub fn block(&self) -> &BlockEntry {
        &self.block
    }

    /// Read up to `buf.len()` bytes starting at `offset`
    ///
    /// Moves the cursor to the end of the read. Returns fewer bytes only at
    /// end of file.
    pub fn read_at(&mut self, buf: &mut [u8], offset: u64) -> MpqResult<usize> {
        self.position = offset;
        let mut total = 0;
        while total < buf.len() {
            let read = self.read_step(&mut buf[total..])?;
            if read == 0 {
                break;
            }
            total += read;
        }
        Ok(total)
    }

    /// Decode the whole file
    pub fn read_all(&mut self) -> MpqResult<Vec<u8>> {
        let size = self.block.uncompressed_size as usize;
        if size == 0 {
            return Ok(Vec::new());
        }

        let data = if self.block.is_single_unit() {
            self.load_single_unit()?
        } else {
            let mut data = Vec::with_capacity(size.min(MAX_PREALLOCATION));
            for index in 0..self.block.sector_count(self.sector_size) {
                data.extend(self.load_sector(index)?);
            }
            data
        };

        self.position = self.len();
        Ok(data)
    }

    /// Copy from the current position, loading at most one sector
    fn read_step(&mut self, buf: &mut [u8]) -> MpqResult<usize> {
        if self.position >= self.len() || buf.is_empty() {
            return Ok(0);
        }

        let (index, local) = if self.block.is_single_unit() {
            (0, self.position as usize)
        } else {
            let sector_size = u64::from(self.sector_size);
            (
                (self.position / sector_size) as u32,
                (self.position % sector_size) as usize,
            )
        };

        let data = self.buffered(index)?;
        let available = data.len().saturating_sub(local);
        let count = available.min(buf.len());
        buf[..count].copy_from_slice(&data[local..local + count]);

        self.position += count as u64;
        Ok(count)
    }

    /// Decoded data for `index`, loading it if another sector is buffered
    fn buffered(&mut self, index: u32) -> MpqResult<&[u8]> {
        let loaded = matches!(self.buffer, SectorBuffer::Buffered { index: current, .. } if current == index);
        if !loaded {
            let data = if self.block.is_single_unit() {
                self.load_single_unit()?
            } else {
                self.load_sector(index)?
            };
            self.buffer = SectorBuffer::Buffered { index, data };
        }

        match &self.buffer {
            SectorBuffer::Buffered { data, .. } => Ok(data),
            SectorBuffer::Unbuffered => Ok(&[]),
        }
    }

    fn decrypt(&self, data: &mut [u8], offset: u32) -> MpqResult<()> {
        if !self.block.is_encrypted() || self.block.uncompressed_size <= 3 {
            return Ok(());
        }

        if self.seed == 0 {
            return Err(MpqError::DecryptionFailed(format!(
                "no encryption key for {}",
                self.name
            )));
        }

        decrypt_bytes(data, self.seed.wrapping_add(offset));
        Ok(())
    }

    fn load_single_unit(&self) -> MpqResult<Vec<u8>> {
        let expected = self.block.uncompressed_size as usize;
        let mut data = self.archive.read_raw(
            u64::from(self.block.file_position),
            self.block.compressed_size as usize,
        )?;
        self.decrypt(&mut data, 0)?;

        if data.len() == expected {
            return Ok(data);
        }

        let decoded = if self.block.flags.contains(BlockFlags::COMPRESS) {
            decompress_sector(&data, expected)?
        } else if self.block.flags.contains(BlockFlags::IMPLODE) {
            implode::explode(&data, Some(expected))?
        } else {
            data
        };

        check_length(0, expected, decoded)
    }

    /// Load and validate the sector offset table
    fn sector_offsets(&mut self) -> MpqResult<&[u32]> {
        if self.sector_offsets.is_none() {
            let offsets = self.load_sector_offsets()?;
            self.sector_offsets = Some(offsets);
        }

        Ok(self.sector_offsets.as_deref().unwrap_or_default())
    }

    fn load_sector_offsets(&self) -> MpqResult<Vec<u32>> {
        let count = self.block.sector_count(self.sector_size) as usize + 1;
        let table_bytes = count * 4;

        let raw = self
            .archive
            .read_raw(u64::from(self.block.file_position), table_bytes)?;
        let mut offsets: Vec<u32> = raw
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        // A wrong key shows up as a table that cannot belong to this block
        if self.block.is_encrypted() {
            if self.seed == 0 {
                return Err(MpqError::DecryptionFailed(format!(
                    "no encryption key for {}",
                    self.name
                )));
            }
            decrypt_block(&mut offsets, self.seed.wrapping_sub(1));
            self.check_decrypted_offsets(&offsets, table_bytes as u32)?;
        }

        if offsets.windows(2).any(|w| w[1] < w[0])
            || offsets.last().is_some_and(|&last| last > self.block.compressed_size)
        {
            return Err(MpqError::InvalidFormat(format!(
                "sector offsets of {} are not ordered within the block",
                self.name
            )));
        }

        debug!("Loaded {} sector offsets for {}", count, self.name);
        Ok(offsets)
    }

    fn check_decrypted_offsets(&self, offsets: &[u32], table_size: u32) -> MpqResult<()> {
        let first = offsets[0];
        let with_crc = self.block.flags.contains(BlockFlags::SECTOR_CRC);
        if first != table_size && !(with_crc && first == table_size + 4) {
            return Err(MpqError::DecryptionFailed(format!(
                "sector offset table of {}: first offset {first:#x}, expected {table_size:#x}",
                self.name
            )));
        }

        let limit = first + self.sector_size;
        if let Some(&second) = offsets.get(1).filter(|&&second| second > limit) {
            return Err(MpqError::DecryptionFailed(format!(
                "sector offset table of {}: second offset {second:#x} exceeds {limit:#x} (first offset plus sector size)",
                self.name
            )));
        }

        Ok(())
    }

    fn load_sector(&mut self, index: u32) -> MpqResult<Vec<u8>> {
        let sector_size = self.sector_size;
        let file_size = self.block.uncompressed_size;
        let expected = (file_size - index * sector_size).min(sector_size) as usize;

        let (start, len) = if self.block.has_sector_table() {
            let offsets = self.sector_offsets()?;
            let i = index as usize;
            (offsets[i], (offsets[i + 1] - offsets[i]) as usize)
        } else {
            (index * sector_size, expected)
        };

        let mut data = self
            .archive
            .read_raw(u64::from(self.block.file_position) + u64::from(start), len)?;
        self.decrypt(&mut data, index)?;

        if data.len() == expected {
            return Ok(data);
        }

        let decoded = if self.block.flags.contains(BlockFlags::COMPRESS) {
            decompress_sector(&data, expected)?
        } else if self.block.flags.contains(BlockFlags::IMPLODE) {
            implode::explode(&data, Some(expected))?
        } else {
            data
        };

        check_length(index, expected, decoded)
    }
}

fn check_length(sector: u32, expected: usize, data: Vec<u8>) -> MpqResult<Vec<u8>> {
    if data.len() == expected {
        Ok(data)
    } else {
        Err(MpqError::SectorSizeMismatch {
            sector,
            expected,
            actual: data.len(),
        })
    }
}

impl<R: Read + Seek> Read for FileStream<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_step(buf)?)
    }
}

impl<R: Read + Seek> Seek for FileStream<'_, R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };

        self.position = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file")
        })?;
        Ok(self.position)
    }
}

impl<R> std::fmt::Debug for FileStream<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStream")
            .field("name", &self.name)
            .field("block", &self.block)
            .field("position", &self.position)
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_utils::{ArchiveBuilder, FileOptions, Storage};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    type MemArchive = Archive<Cursor<Vec<u8>>>;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 253) as u8).collect()
    }

    fn archive_with(name: &str, data: Vec<u8>, options: FileOptions) -> MemArchive {
        let bytes = ArchiveBuilder::new()
            .sector_size_shift(0)
            .add_file(name, data, options)
            .build();
        Archive::from_reader(Cursor::new(bytes)).expect("archive should open")
    }

    #[test]
    fn test_fix_key_seed() {
        let block = BlockEntry {
            file_position: 0x1000,
            compressed_size: 10,
            uncompressed_size: 20,
            flags: BlockFlags::EXISTS | BlockFlags::ENCRYPTED,
        };
        assert_eq!(encryption_seed("data\\global\\x.dc6", &block), 0x8BB0_C09E);

        let fixed = BlockEntry {
            flags: block.flags | BlockFlags::FIX_KEY,
            ..block
        };
        assert_eq!(
            encryption_seed("x.dc6", &fixed),
            0x8BB0_C09Eu32.wrapping_add(0x1000) ^ 20
        );
    }

    #[test]
    fn test_storage_variants() {
        // Last sector is 376 bytes, short enough to stay imploded
        let data = payload(1400);
        let variants = [
            FileOptions::default(),
            FileOptions {
                storage: Storage::Zlib,
                ..FileOptions::default()
            },
            FileOptions {
                storage: Storage::Implode,
                ..FileOptions::default()
            },
            FileOptions {
                storage: Storage::Zlib,
                encrypted: true,
                ..FileOptions::default()
            },
            FileOptions {
                storage: Storage::Zlib,
                encrypted: true,
                fix_key: true,
                ..FileOptions::default()
            },
            FileOptions {
                encrypted: true,
                ..FileOptions::default()
            },
            FileOptions {
                storage: Storage::Implode,
                encrypted: true,
                ..FileOptions::default()
            },
            FileOptions {
                storage: Storage::Implode,
                single_unit: true,
                ..FileOptions::default()
            },
            FileOptions {
                storage: Storage::Zlib,
                single_unit: true,
                encrypted: true,
                fix_key: true,
                ..FileOptions::default()
            },
        ];

        for options in variants {
            let archive = archive_with("units\\monstats.txt", data.clone(), options.clone());
            let read = archive
                .read_file("units\\monstats.txt")
                .unwrap_or_else(|e| panic!("{options:?}: {e}"));
            assert_eq!(read, data, "{options:?}");
        }
    }

    #[test]
    fn test_streaming_reads_and_seeks() {
        let data = payload(2000);
        let archive = archive_with(
            "a.bin",
            data.clone(),
            FileOptions {
                storage: Storage::Zlib,
                encrypted: true,
                ..FileOptions::default()
            },
        );

        let mut stream = archive.open_file("a.bin").unwrap();
        assert_eq!(stream.len(), 2000);

        // Crosses the sector boundary at 512
        let mut buf = vec![0u8; 100];
        assert_eq!(stream.read_at(&mut buf, 480).unwrap(), 100);
        assert_eq!(buf, data[480..580].to_vec());
        assert_eq!(stream.position(), 580);

        stream.seek(SeekFrom::End(-10)).unwrap();
        let mut tail = Vec::new();
        stream.read_to_end(&mut tail).unwrap();
        assert_eq!(tail, data[1990..].to_vec());

        stream.seek(SeekFrom::Start(0)).unwrap();
        let mut head = [0u8; 4];
        stream.read_exact(&mut head).unwrap();
        assert_eq!(head.to_vec(), data[..4].to_vec());

        assert!(stream.seek(SeekFrom::Current(-100)).is_err());
    }

    #[test]
    fn test_read_past_end() {
        let archive = archive_with("a", payload(10), FileOptions::default());
        let mut stream = archive.open_file("a").unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(stream.read_at(&mut buf, 8).unwrap(), 2);
        assert_eq!(stream.read_at(&mut buf, 50).unwrap(), 0);
    }

    #[test]
    fn test_empty_file() {
        let archive = archive_with("empty", Vec::new(), FileOptions::default());
        let mut stream = archive.open_file("empty").unwrap();
        assert!(stream.is_empty());
        assert!(stream.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_sector_table_is_decryption_failure() {
        let archive = archive_with(
            "bad.bin",
            payload(1500),
            FileOptions {
                storage: Storage::Zlib,
                encrypted: true,
                tamper_sector_table: true,
                ..FileOptions::default()
            },
        );

        let err = archive.read_file("bad.bin").expect_err("sanity check must fail");
        assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
        assert!(err.to_string().contains("first offset"), "{err}");
    }

    #[test]
    fn test_unencrypted_oversize_sectors_are_decoded() {
        // Imploded literals outgrow the 512-byte sector; without encryption
        // the offset table is taken as stored
        let data = payload(1500);
        let archive = archive_with(
            "big.bin",
            data.clone(),
            FileOptions {
                storage: Storage::Implode,
                oversize_sectors: true,
                ..FileOptions::default()
            },
        );
        assert_eq!(archive.read_file("big.bin").unwrap(), data);

        let archive = archive_with(
            "bz.bin",
            payload(600),
            FileOptions {
                storage: Storage::Tagged(0x10),
                oversize_sectors: true,
                ..FileOptions::default()
            },
        );
        let err = archive.read_file("bz.bin").expect_err("bzip2 unsupported");
        assert!(matches!(err, MpqError::UnsupportedCompression(0x10)));
    }

    #[test]
    fn test_encrypted_oversize_first_sector_fails_sanity_check() {
        let archive = archive_with(
            "big.bin",
            payload(1500),
            FileOptions {
                storage: Storage::Implode,
                encrypted: true,
                oversize_sectors: true,
                ..FileOptions::default()
            },
        );

        let err = archive.read_file("big.bin").expect_err("second offset too far");
        assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
        let message = err.to_string();
        assert!(message.contains("second offset"), "{message}");
        assert!(!message.contains("first offset 0x"), "{message}");
    }

    #[test]
    fn test_unordered_offsets_are_invalid_format() {
        let data = payload(1500);
        let mut bytes = ArchiveBuilder::new()
            .sector_size_shift(0)
            .add_file(
                "swap.bin",
                data,
                FileOptions {
                    storage: Storage::Implode,
                    ..FileOptions::default()
                },
            )
            .build();
        let archive = Archive::from_reader(Cursor::new(bytes.clone())).unwrap();
        let position = archive.lookup("swap.bin").unwrap().file_position as usize;

        // Second offset pointing past the third one
        let third = u32::from_le_bytes(bytes[position + 8..position + 12].try_into().unwrap());
        bytes[position + 4..position + 8].copy_from_slice(&(third + 1).to_le_bytes());

        let archive = Archive::from_reader(Cursor::new(bytes)).unwrap();
        let err = archive.read_file("swap.bin").expect_err("unordered");
        assert_eq!(err.kind(), ErrorKind::InvalidFormat);
    }

    #[test]
    fn test_wrong_name_is_decryption_failure() {
        // Same hashes, different key: store under one name, read the block
        // through a stream keyed by another
        let archive = archive_with(
            "right.bin",
            payload(1500),
            FileOptions {
                storage: Storage::Zlib,
                encrypted: true,
                ..FileOptions::default()
            },
        );
        let block = *archive.lookup("right.bin").unwrap();

        let mut stream = FileStream::new(&archive, block, "wrong.bin");
        let err = stream.read_all().expect_err("wrong key");
        assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
    }

    #[test]
    fn test_unsupported_method_in_sector() {
        let archive = archive_with(
            "bz.bin",
            payload(600),
            FileOptions {
                storage: Storage::Tagged(0x10),
                ..FileOptions::default()
            },
        );

        let err = archive.read_file("bz.bin").expect_err("bzip2 unsupported");
        assert!(matches!(err, MpqError::UnsupportedCompression(0x10)));
    }

    #[test]
    fn test_sector_size_mismatch() {
        let archive = archive_with(
            "short.bin",
            vec![b'x'; 600],
            FileOptions {
                storage: Storage::Zlib,
                size_override: Some(700),
                ..FileOptions::default()
            },
        );

        let err = archive.read_file("short.bin").expect_err("mismatch");
        assert!(matches!(err, MpqError::SectorSizeMismatch { sector: 1, .. }));
    }
}

//! Opened MPQ archive
//!
//! Opening reads the header and decrypts both tables in one step; an archive
//! value therefore always has a complete index. File data is read lazily
//! through [`FileStream`], sharing the underlying reader behind a mutex so
//! one archive can serve several threads.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use binrw::BinRead;
use horadric_crypto::{BLOCK_TABLE_KEY_NAME, FileNameHash, HASH_TABLE_KEY_NAME, decrypt_table};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{MpqError, MpqResult};
use crate::header::ArchiveHeader;
use crate::stream::FileStream;
use crate::tables::{BlockEntry, BlockFlags, BlockTable, HashEntry, HashTable};

/// Name of the optional file manifest
pub const LISTFILE_NAME: &str = "(listfile)";

/// A read-only MPQ archive
pub struct Archive<R = File> {
    path: Option<PathBuf>,
    source: Mutex<R>,
    source_len: u64,
    header: ArchiveHeader,
    hash_table: HashTable,
    block_table: BlockTable,
}

impl Archive<File> {
    /// Open an archive file
    ///
    /// If no file exists at `path`, the parent directory is searched for a
    /// file whose name matches ignoring ASCII case.
    pub fn open(path: impl AsRef<Path>) -> MpqResult<Self> {
        let (file, resolved) = open_ignore_case(path.as_ref())?;
        let mut archive = Self::from_reader(file)?;

        info!(
            "Opened MPQ archive {} ({} hash entries, {} blocks)",
            resolved.display(),
            archive.hash_table.len(),
            archive.block_table.len()
        );

        archive.path = Some(resolved);
        Ok(archive)
    }
}

impl<R: Read + Seek> Archive<R> {
    /// Parse an archive from any seekable reader
    pub fn from_reader(mut reader: R) -> MpqResult<Self> {
        let source_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let header = ArchiveHeader::read(&mut reader)?;
        header.validate()?;

        let hash_words = load_table(
            &mut reader,
            source_len,
            header.hash_table_offset,
            header.hash_table_entries,
            HASH_TABLE_KEY_NAME,
        )?;
        let hash_table = HashTable::from_words(&hash_words);

        let block_words = load_table(
            &mut reader,
            source_len,
            header.block_table_offset,
            header.block_table_entries,
            BLOCK_TABLE_KEY_NAME,
        )?;
        let block_table = BlockTable::from_words(&block_words);

        debug!(
            "Loaded tables: {} names indexed, {} blocks, sector size {}",
            hash_table.file_count(),
            block_table.len(),
            header.sector_size()
        );

        Ok(Self {
            path: None,
            source: Mutex::new(reader),
            source_len,
            header,
            hash_table,
            block_table,
        })
    }

    /// Path the archive was opened from
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Archive header
    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    /// Decrypted hash table
    pub fn hash_table(&self) -> &HashTable {
        &self.hash_table
    }

    /// Decrypted block table
    pub fn block_table(&self) -> &BlockTable {
        &self.block_table
    }

    /// Declared archive size
    pub fn size(&self) -> u32 {
        self.header.archive_size
    }

    /// Sector size in bytes
    pub fn sector_size(&self) -> u32 {
        self.header.sector_size()
    }

    fn find(&self, path: &str) -> Option<(&HashEntry, &BlockEntry)> {
        let hash = FileNameHash::new(&path.replace('/', "\\"));
        let entry = self.hash_table.get(hash)?;
        let block = self.block_table.get(entry.block_index)?;
        Some((entry, block))
    }

    /// Whether the archive indexes `path`
    ///
    /// Delete markers count as contained: they shadow the path for archives
    /// later in a load order even though reading them fails.
    pub fn contains(&self, path: &str) -> bool {
        self.find(path).is_some()
    }

    /// Block entry for `path`
    pub fn lookup(&self, path: &str) -> MpqResult<&BlockEntry> {
        self.find(path)
            .map(|(_, block)| block)
            .ok_or_else(|| MpqError::NotFound(path.to_string()))
    }

    /// Open a stream over a stored file
    pub fn open_file(&self, path: &str) -> MpqResult<FileStream<'_, R>> {
        let block = *self.lookup(path)?;

        if block.flags.contains(BlockFlags::DELETE_MARKER)
            || !block.flags.contains(BlockFlags::EXISTS)
        {
            return Err(MpqError::NotFound(path.to_string()));
        }

        if block.flags.contains(BlockFlags::PATCH_FILE) {
            return Err(MpqError::UnsupportedFeature(format!(
                "patch file {path}"
            )));
        }

        Ok(FileStream::new(self, block, path))
    }

    /// Read a whole file
    pub fn read_file(&self, path: &str) -> MpqResult<Vec<u8>> {
        self.open_file(path)?.read_all()
    }

    /// Read a whole file as text, replacing invalid UTF-8
    pub fn read_text(&self, path: &str) -> MpqResult<String> {
        let data = self.read_file(path)?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// Paths listed in the archive's `(listfile)`
    pub fn list_files(&self) -> MpqResult<Vec<String>> {
        let text = self.read_text(LISTFILE_NAME)?;

        Ok(text
            .trim_end_matches('\0')
            .split(|c| c == '\r' || c == '\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    /// Read `len` raw bytes at an absolute archive offset
    pub(crate) fn read_raw(&self, offset: u64, len: usize) -> MpqResult<Vec<u8>> {
        if offset.saturating_add(len as u64) > self.source_len {
            return Err(MpqError::InvalidFormat(format!(
                "{len} bytes at offset {offset} extend past end of archive ({} bytes)",
                self.source_len
            )));
        }

        let mut data = vec![0u8; len];
        let mut source = self.source.lock();
        source.seek(SeekFrom::Start(offset))?;
        source.read_exact(&mut data)?;
        Ok(data)
    }
}

impl<R> std::fmt::Debug for Archive<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field("header", &self.header)
            .field("hash_entries", &self.hash_table.len())
            .field("block_entries", &self.block_table.len())
            .finish_non_exhaustive()
    }
}

fn load_table<R: Read + Seek>(
    reader: &mut R,
    source_len: u64,
    offset: u32,
    entries: u32,
    name: &str,
) -> MpqResult<Vec<u32>> {
    let end = u64::from(offset) + u64::from(entries) * 16;
    if end > source_len {
        return Err(MpqError::InvalidFormat(format!(
            "{name} ends at {end}, past end of archive ({source_len} bytes)"
        )));
    }

    reader.seek(SeekFrom::Start(u64::from(offset)))?;
    Ok(decrypt_table(reader, entries, name)?)
}

fn open_ignore_case(path: &Path) -> MpqResult<(File, PathBuf)> {
    match File::open(path) {
        Ok(file) => return Ok((file, path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let not_found = || {
        MpqError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("archive not found: {}", path.display()),
        ))
    };

    let wanted = path.file_name().ok_or_else(not_found)?.to_string_lossy();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let Ok(entries) = fs::read_dir(parent) else {
        return Err(not_found());
    };

    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy().eq_ignore_ascii_case(&wanted) {
            let resolved = entry.path();
            debug!("Resolved {} to {}", path.display(), resolved.display());
            return Ok((File::open(&resolved)?, resolved));
        }
    }

    Err(not_found())
}

//! Load-order asset resolution
//!
//! The resolver owns the configured load order and two weighted caches: one
//! for open archive handles (weighted by declared archive size) and one for
//! file bytes (weighted by length). A virtual path belongs to the first
//! archive in load order that indexes it, so patch archives placed early
//! shadow base content.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use horadric_cache::{CacheError, CacheStats, WeightedCache, WeightedCacheConfig};
use horadric_mpq::Archive;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::error::{AssetError, AssetResult};
use crate::path::PathNormalizer;

struct LoadedArchive {
    path: PathBuf,
    archive: Arc<Archive>,
}

struct ResolverState {
    config: ResolverConfig,
    normalizer: PathNormalizer,
    /// Archives in load order, opened on first use
    archives: Option<Arc<[LoadedArchive]>>,
}

/// Resolves virtual asset paths against an ordered list of archives
pub struct AssetResolver {
    state: Mutex<ResolverState>,
    files: WeightedCache<String, Arc<[u8]>>,
    archives: WeightedCache<PathBuf, Arc<Archive>>,
}

impl AssetResolver {
    /// Create a resolver from a validated configuration
    ///
    /// Archives are opened lazily; call [`open_load_order`](Self::open_load_order)
    /// to surface misconfiguration at startup.
    pub fn new(config: ResolverConfig) -> AssetResult<Self> {
        config.validate()?;

        let files = WeightedCache::new(
            WeightedCacheConfig::new()
                .with_name("files")
                .with_budget(config.file_cache_budget),
        )?;
        let archives = WeightedCache::new(
            WeightedCacheConfig::new()
                .with_name("archives")
                .with_budget(config.archive_cache_budget),
        )?;

        Ok(Self {
            state: Mutex::new(ResolverState {
                normalizer: PathNormalizer::new(&config.language, &config.font_locale),
                config,
                archives: None,
            }),
            files,
            archives,
        })
    }

    /// Replace the load order and archive directory
    ///
    /// Cached file bytes are dropped since ownership may change. Archive
    /// handles stay cached, so archives kept in the new order are not
    /// parsed again.
    pub fn configure<I, S>(&self, load_order: I, base_path: impl AsRef<Path>) -> AssetResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut state = self.state.lock();
            let config = state
                .config
                .clone()
                .with_load_order(load_order)
                .with_base_path(base_path);
            config.validate()?;

            info!(
                "Configured load order {:?} under {}",
                config.load_order,
                config.base_path.display()
            );
            state.config = config;
            state.archives = None;
        }

        self.files.clear();
        Ok(())
    }

    /// Current configuration
    pub fn config(&self) -> ResolverConfig {
        self.state.lock().config.clone()
    }

    /// Normalize a virtual path with the configured placeholders
    pub fn normalize(&self, path: &str) -> String {
        self.state.lock().normalizer.normalize(path)
    }

    /// Open every archive in the load order, returning how many are open
    pub fn open_load_order(&self) -> AssetResult<usize> {
        Ok(self.loaded_archives()?.len())
    }

    /// Load a file's bytes from the first archive that contains it
    pub fn load_file(&self, path: &str) -> AssetResult<Arc<[u8]>> {
        let key = self.normalize(path);
        if let Some(data) = self.files.retrieve(key.as_str()) {
            return Ok(data);
        }

        let (archive_path, archive) = self
            .find_owner(&key)?
            .ok_or_else(|| AssetError::NotFound(path.to_string()))?;

        let data: Arc<[u8]> = archive.read_file(&key)?.into();
        debug!(
            "Loaded {key} ({} bytes) from {}",
            data.len(),
            archive_path.display()
        );

        insert_or_ignore(&self.files, key, Arc::clone(&data), data.len() as u64)?;
        Ok(data)
    }

    /// Load a file as text, replacing invalid UTF-8
    pub fn load_text(&self, path: &str) -> AssetResult<String> {
        let data = self.load_file(path)?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// Load several files, one result per path in input order
    ///
    /// A failure on one path is logged and does not stop the others.
    pub fn load_files<I, S>(&self, paths: I) -> Vec<AssetResult<Arc<[u8]>>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        paths
            .into_iter()
            .map(|path| {
                let path = path.as_ref();
                let result = self.load_file(path);
                if let Err(e) = &result {
                    warn!("Skipping asset {path}: {e}");
                }
                result
            })
            .collect()
    }

    /// Whether any archive in the load order contains the path
    pub fn file_exists(&self, path: &str) -> AssetResult<bool> {
        let key = self.normalize(path);
        if self.files.contains_key(key.as_str()) {
            return Ok(true);
        }
        Ok(self.find_owner(&key)?.is_some())
    }

    /// Archive that owns the path
    pub fn archive_for(&self, path: &str) -> AssetResult<Arc<Archive>> {
        let key = self.normalize(path);
        self.find_owner(&key)?
            .map(|(_, archive)| archive)
            .ok_or_else(|| AssetError::NotFound(path.to_string()))
    }

    /// Drop cached file bytes and archive handles
    pub fn clear_caches(&self) {
        self.state.lock().archives = None;
        self.files.clear();
        self.archives.clear();
    }

    /// Statistics for the file and archive caches
    pub fn cache_stats(&self) -> Vec<CacheStats> {
        vec![self.files.stats(), self.archives.stats()]
    }

    fn find_owner(&self, key: &str) -> AssetResult<Option<(PathBuf, Arc<Archive>)>> {
        for entry in self.loaded_archives()?.iter() {
            if entry.archive.contains(key) {
                let archive = self.touch_archive(entry)?;
                return Ok(Some((entry.path.clone(), archive)));
            }
        }
        Ok(None)
    }

    fn loaded_archives(&self) -> AssetResult<Arc<[LoadedArchive]>> {
        let mut state = self.state.lock();
        if let Some(archives) = &state.archives {
            return Ok(Arc::clone(archives));
        }

        let paths = state.config.archive_paths();
        let mut loaded = Vec::with_capacity(paths.len());
        for path in paths {
            let archive = self.load_archive(&path)?;
            loaded.push(LoadedArchive { path, archive });
        }

        let loaded: Arc<[LoadedArchive]> = loaded.into();
        state.archives = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    fn load_archive(&self, path: &Path) -> AssetResult<Arc<Archive>> {
        if let Some(archive) = self.archives.retrieve(path) {
            return Ok(archive);
        }

        let archive = Archive::open(path).map_err(|source| AssetError::ArchiveOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let archive = Arc::new(archive);
        insert_or_ignore(
            &self.archives,
            path.to_path_buf(),
            Arc::clone(&archive),
            u64::from(archive.size()),
        )?;
        Ok(archive)
    }

    /// Promote an archive in the handle cache, re-adding it if evicted
    fn touch_archive(&self, entry: &LoadedArchive) -> AssetResult<Arc<Archive>> {
        if let Some(archive) = self.archives.retrieve(entry.path.as_path()) {
            return Ok(archive);
        }

        insert_or_ignore(
            &self.archives,
            entry.path.clone(),
            Arc::clone(&entry.archive),
            u64::from(entry.archive.size()),
        )?;
        Ok(Arc::clone(&entry.archive))
    }
}

/// Insert, treating a concurrent insert of the same key as success
fn insert_or_ignore<K, V>(cache: &WeightedCache<K, V>, key: K, value: V, weight: u64) -> AssetResult<()>
where
    K: Eq + std::hash::Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    match cache.insert(key, value, weight) {
        Ok(()) | Err(CacheError::DuplicateKey(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

impl std::fmt::Debug for AssetResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetResolver")
            .field("config", &self.state.lock().config)
            .field("files", &self.files)
            .field("archives", &self.archives)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use horadric_mpq::test_utils::{ArchiveBuilder, FileOptions, Storage};
    use horadric_mpq::{BlockFlags, ErrorKind};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write_archive(dir: &Path, name: &str, files: &[(&str, &[u8])]) {
        let mut builder = ArchiveBuilder::new().with_listfile();
        for (path, data) in files {
            builder = builder.add_file(*path, data.to_vec(), FileOptions::default());
        }
        std::fs::write(dir.join(name), builder.build()).expect("write archive");
    }

    fn resolver(dir: &TempDir, load_order: &[&str]) -> AssetResolver {
        AssetResolver::new(
            ResolverConfig::new(dir.path()).with_load_order(load_order.iter().copied()),
        )
        .expect("valid config")
    }

    #[test]
    fn test_load_file_round_trip() {
        let dir = TempDir::new().expect("tempdir");
        write_archive(
            dir.path(),
            "d2data.mpq",
            &[("data\\global\\excel\\armor.txt", b"name\tcode\r\nCap\tcap\r\n")],
        );

        let resolver = resolver(&dir, &["d2data.mpq"]);
        let data = resolver
            .load_file("/Data/Global/Excel/Armor.txt")
            .expect("load file");
        assert_eq!(&*data, b"name\tcode\r\nCap\tcap\r\n");
    }

    #[test]
    fn test_load_order_precedence() {
        let dir = TempDir::new().expect("tempdir");
        write_archive(
            dir.path(),
            "patch.mpq",
            &[("data\\shared.txt", b"patched")],
        );
        write_archive(
            dir.path(),
            "base.mpq",
            &[("data\\shared.txt", b"original"), ("data\\base.txt", b"base only")],
        );

        let resolver = resolver(&dir, &["patch.mpq", "base.mpq"]);
        assert_eq!(resolver.open_load_order().expect("open"), 2);
        assert_eq!(&*resolver.load_file("data/shared.txt").expect("load"), b"patched");
        assert_eq!(&*resolver.load_file("data/base.txt").expect("load"), b"base only");

        let owner = resolver.archive_for("data/shared.txt").expect("owner");
        assert_eq!(
            owner.path().and_then(Path::file_name),
            Some(std::ffi::OsStr::new("patch.mpq"))
        );

        resolver
            .configure(["base.mpq", "patch.mpq"], dir.path())
            .expect("reconfigure");
        assert_eq!(&*resolver.load_file("data/shared.txt").expect("load"), b"original");
    }

    #[test]
    fn test_file_cache_hits() {
        let dir = TempDir::new().expect("tempdir");
        write_archive(dir.path(), "d2data.mpq", &[("data\\a.txt", b"alpha")]);
        let resolver = resolver(&dir, &["d2data.mpq"]);

        let first = resolver.load_file("data/a.txt").expect("load");
        let second = resolver.load_file("DATA\\A.TXT").expect("load");
        assert!(Arc::ptr_eq(&first, &second));

        let stats = resolver.cache_stats();
        assert_eq!(stats[0].name, "files");
        assert_eq!(stats[0].entry_count, 1);
        assert_eq!(stats[0].total_weight, 5);
        assert_eq!(stats[0].hit_count, 1);
        assert_eq!(stats[1].name, "archives");
        assert_eq!(stats[1].entry_count, 1);

        resolver.clear_caches();
        let stats = resolver.cache_stats();
        assert_eq!(stats[0].entry_count, 0);
        assert_eq!(stats[1].entry_count, 0);
        assert_eq!(&*resolver.load_file("data/a.txt").expect("reload"), b"alpha");
    }

    #[test]
    fn test_not_found() {
        let dir = TempDir::new().expect("tempdir");
        write_archive(dir.path(), "d2data.mpq", &[("data\\a.txt", b"alpha")]);
        let resolver = resolver(&dir, &["d2data.mpq"]);

        let err = resolver.load_file("data/missing.txt").unwrap_err();
        assert!(matches!(err, AssetError::NotFound(ref p) if p == "data/missing.txt"));
        assert!(err.is_not_found());
        assert!(!resolver.file_exists("data/missing.txt").expect("probe"));
        assert!(resolver.file_exists("/DATA/A.TXT").expect("probe"));
    }

    #[test]
    fn test_missing_archive_is_reported_with_path() {
        let dir = TempDir::new().expect("tempdir");
        let resolver = resolver(&dir, &["d2data.mpq"]);

        let err = resolver.open_load_order().unwrap_err();
        let expected = dir.path().join("d2data.mpq");
        assert!(matches!(&err, AssetError::ArchiveOpen { path, .. } if *path == expected));
        assert_eq!(err.kind(), Some(ErrorKind::Io));
    }

    #[test]
    fn test_batch_load_skips_unsupported_codec() {
        let dir = TempDir::new().expect("tempdir");
        let bytes = ArchiveBuilder::new()
            .add_file("data\\good.txt", b"good".to_vec(), FileOptions::default())
            .add_file(
                "data\\bzip2.txt",
                vec![b'z'; 64],
                FileOptions {
                    storage: Storage::Tagged(0x10),
                    ..FileOptions::default()
                },
            )
            .build();
        std::fs::write(dir.path().join("d2data.mpq"), bytes).expect("write archive");

        let resolver = resolver(&dir, &["d2data.mpq"]);
        let results = resolver.load_files(["data/bzip2.txt", "data/good.txt", "data/none.txt"]);

        assert_eq!(results.len(), 3);
        let err = results[0].as_ref().unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::UnsupportedCompression));
        assert_eq!(&**results[1].as_ref().expect("good file"), b"good");
        assert!(results[2].as_ref().unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_marker_shadows_later_archives() {
        let dir = TempDir::new().expect("tempdir");
        let patch = ArchiveBuilder::new()
            .add_file(
                "data\\removed.txt",
                Vec::new(),
                FileOptions {
                    extra_flags: BlockFlags::DELETE_MARKER,
                    ..FileOptions::default()
                },
            )
            .build();
        std::fs::write(dir.path().join("patch.mpq"), patch).expect("write archive");
        write_archive(dir.path(), "base.mpq", &[("data\\removed.txt", b"stale")]);

        let resolver = resolver(&dir, &["patch.mpq", "base.mpq"]);
        let err = resolver.load_file("data/removed.txt").unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(err, AssetError::Archive(_)));
    }

    #[test]
    fn test_placeholders_and_text() {
        let dir = TempDir::new().expect("tempdir");
        write_archive(
            dir.path(),
            "d2data.mpq",
            &[
                ("data\\local\\ui\\eng\\expansioncredits.txt", b"Credits"),
                ("data\\local\\font\\latin\\font16.tbl", b"\x01\x02"),
            ],
        );
        let resolver = resolver(&dir, &["d2data.mpq"]);

        assert_eq!(
            resolver
                .load_text("/data/local/ui/{LANG}/ExpansionCredits.txt")
                .expect("load text"),
            "Credits"
        );
        assert_eq!(
            &*resolver
                .load_file("/data/local/FONT/{LANG_FONT}/font16.tbl")
                .expect("load font"),
            b"\x01\x02"
        );
    }

    #[test]
    fn test_configure_rejects_empty_load_order() {
        let dir = TempDir::new().expect("tempdir");
        let resolver = resolver(&dir, &["d2data.mpq"]);
        let result = resolver.configure(Vec::<String>::new(), dir.path());
        assert!(matches!(result, Err(AssetError::Config(_))));
        assert_eq!(resolver.config().load_order, vec!["d2data.mpq"]);
    }

    #[test]
    fn test_concurrent_loads() {
        let dir = TempDir::new().expect("tempdir");
        let names: Vec<String> = (0..8).map(|i| format!("data\\file{i}.bin")).collect();
        let mut builder = ArchiveBuilder::new();
        for (i, name) in names.iter().enumerate() {
            builder = builder.add_file(name.as_str(), vec![i as u8; 5000], FileOptions {
                storage: Storage::Zlib,
                ..FileOptions::default()
            });
        }
        std::fs::write(dir.path().join("d2data.mpq"), builder.build()).expect("write archive");

        let resolver = Arc::new(resolver(&dir, &["d2data.mpq"]));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                let names = names.clone();
                std::thread::spawn(move || {
                    for (i, name) in names.iter().enumerate() {
                        let data = resolver.load_file(name).expect("load");
                        assert_eq!(data.len(), 5000);
                        assert!(data.iter().all(|&b| b == i as u8));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker thread");
        }

        assert_eq!(resolver.cache_stats()[0].entry_count, 8);
    }
}

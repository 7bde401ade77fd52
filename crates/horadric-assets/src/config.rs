//! Resolver configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AssetError, AssetResult};

/// Configuration for the asset resolver
///
/// Usually loaded from JSON. Missing fields take their defaults, so a file
/// can be as small as `{"base_path": "...", "load_order": ["d2data.mpq"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Directory holding the archives
    pub base_path: PathBuf,

    /// Archive file names relative to `base_path`, highest priority first
    pub load_order: Vec<String>,

    /// Language code substituted for `{LANG}`
    pub language: String,

    /// Font directory substituted for `{LANG_FONT}` (except for `chi`)
    pub font_locale: String,

    /// Budget of the file-bytes cache, in bytes
    pub file_cache_budget: u64,

    /// Budget of the archive-handle cache, in declared archive bytes
    pub archive_cache_budget: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            load_order: Vec::new(),
            language: "eng".to_string(),
            font_locale: "latin".to_string(),
            file_cache_budget: 32 * 1024 * 1024,     // 32 MiB
            archive_cache_budget: 128 * 1024 * 1024, // 128 MiB
        }
    }
}

impl ResolverConfig {
    /// Create a configuration for archives under `base_path`
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> AssetResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Set the archive directory
    #[must_use]
    pub fn with_base_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.base_path = path.as_ref().to_path_buf();
        self
    }

    /// Set the load order
    #[must_use]
    pub fn with_load_order<I, S>(mut self, archives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.load_order = archives.into_iter().map(Into::into).collect();
        self
    }

    /// Set the language code
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set the font locale
    #[must_use]
    pub fn with_font_locale(mut self, font_locale: impl Into<String>) -> Self {
        self.font_locale = font_locale.into();
        self
    }

    /// Set the file-bytes cache budget
    #[must_use]
    pub const fn with_file_cache_budget(mut self, budget: u64) -> Self {
        self.file_cache_budget = budget;
        self
    }

    /// Set the archive-handle cache budget
    #[must_use]
    pub const fn with_archive_cache_budget(mut self, budget: u64) -> Self {
        self.archive_cache_budget = budget;
        self
    }

    /// Full paths of the archives in load order
    pub fn archive_paths(&self) -> Vec<PathBuf> {
        self.load_order
            .iter()
            .map(|name| self.base_path.join(name))
            .collect()
    }

    /// Validate the configuration
    pub fn validate(&self) -> AssetResult<()> {
        if self.load_order.is_empty() {
            return Err(AssetError::Config(
                "load_order must name at least one archive".to_string(),
            ));
        }

        if let Some(name) = self.load_order.iter().find(|name| name.trim().is_empty()) {
            return Err(AssetError::Config(format!(
                "load_order contains an empty archive name: {name:?}"
            )));
        }

        if self.language.is_empty() {
            return Err(AssetError::Config("language must not be empty".to_string()));
        }

        if self.file_cache_budget == 0 || self.archive_cache_budget == 0 {
            return Err(AssetError::Config(
                "cache budgets must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

//! Virtual path normalization
//!
//! Asset paths are written with forward slashes, mixed case and language
//! placeholders (`/data/local/ui/{LANG}/options.dc6`). Archives index them
//! lower-cased with back-slash separators and no leading separator.

/// Placeholder replaced by the configured language code
pub const LANGUAGE_TOKEN: &str = "{LANG}";

/// Placeholder replaced by the font directory for the configured language
pub const LANGUAGE_FONT_TOKEN: &str = "{LANG_FONT}";

/// Language code whose fonts live under the language directory itself
const CHINESE_LANGUAGE: &str = "chi";

/// Rewrites virtual paths into archive paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathNormalizer {
    language: String,
    font_locale: String,
}

impl PathNormalizer {
    /// Create a normalizer for a language code and font locale
    pub fn new(language: impl Into<String>, font_locale: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            font_locale: font_locale.into(),
        }
    }

    /// Directory substituted for `{LANG_FONT}`
    pub fn font_directory(&self) -> &str {
        if self.language.eq_ignore_ascii_case(CHINESE_LANGUAGE) {
            &self.language
        } else {
            &self.font_locale
        }
    }

    /// Normalize a virtual path
    ///
    /// Substitutes placeholders, lower-cases ASCII, converts `/` to `\` and
    /// strips leading separators. Applying it twice gives the same result.
    pub fn normalize(&self, path: &str) -> String {
        let substituted = path
            .replace(LANGUAGE_TOKEN, &self.language)
            .replace(LANGUAGE_FONT_TOKEN, self.font_directory());

        let normalized = substituted.to_ascii_lowercase().replace('/', "\\");
        normalized.trim_start_matches('\\').to_string()
    }
}

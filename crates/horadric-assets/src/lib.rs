//! Asset resolution over a load order of MPQ archives
//!
//! Game code asks for virtual paths such as
//! `/data/local/ui/{LANG}/options.dc6`. The resolver normalizes the path,
//! finds the first archive in the configured load order that contains it and
//! returns the file bytes, caching both the bytes and the open archives.
//!
//! # Example
//!
//! ```no_run
//! use horadric_assets::{AssetResolver, ResolverConfig};
//!
//! let config = ResolverConfig::new("/games/diablo2")
//!     .with_load_order(["patch_d2.mpq", "d2exp.mpq", "d2data.mpq"]);
//! let resolver = AssetResolver::new(config)?;
//! resolver.open_load_order()?;
//!
//! let palette = resolver.load_file("/data/global/palette/act1/pal.dat")?;
//! println!("{} bytes", palette.len());
//! # Ok::<(), horadric_assets::AssetError>(())
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod path;
pub mod resolver;

pub use config::ResolverConfig;
pub use error::{AssetError, AssetResult};
pub use path::{LANGUAGE_FONT_TOKEN, LANGUAGE_TOKEN, PathNormalizer};
pub use resolver::AssetResolver;

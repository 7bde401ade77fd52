//! Weighted LRU caching for decoded game assets
//!
//! A single generic cache type, [`WeightedCache`], shared by every layer that
//! keeps decoded data around: raw file bytes, open archive handles, palettes,
//! animations. Each instance has its own budget expressed as a sum of
//! caller-supplied weights.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use horadric_cache::WeightedCache;
//!
//! let cache = WeightedCache::with_budget("files", 1024)?;
//! let bytes = Arc::new(vec![0u8; 600]);
//! cache.insert("data\\a.dc6".to_string(), Arc::clone(&bytes), 600)?;
//! cache.insert("data\\b.dc6".to_string(), Arc::new(vec![0u8; 600]), 600)?;
//!
//! // Over budget: the least recently used entry went first
//! assert!(cache.retrieve("data\\a.dc6").is_none());
//! assert_eq!(cache.total_weight(), 600);
//! # Ok::<(), horadric_cache::CacheError>(())
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod stats;
pub mod weighted;

pub use config::WeightedCacheConfig;
pub use error::{CacheError, CacheResult};
pub use stats::CacheStats;
pub use weighted::WeightedCache;

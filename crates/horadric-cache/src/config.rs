//! Cache configuration

use serde::{Deserialize, Serialize};

/// Weighted cache configuration
///
/// The budget is a sum of caller-chosen weights: bytes for raw file data,
/// declared archive size for archive handles, or plain entry counts when
/// every entry is inserted with weight 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedCacheConfig {
    /// Name used in log output and statistics
    pub name: String,
    /// Maximum total weight before least-recently-used entries are evicted
    pub budget: u64,
}

impl Default for WeightedCacheConfig {
    fn default() -> Self {
        Self {
            name: "cache".to_string(),
            budget: 32 * 1024 * 1024, // 32 MiB
        }
    }
}

impl WeightedCacheConfig {
    /// Create a new weighted cache configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the weight budget
    #[must_use]
    pub fn with_budget(mut self, budget: u64) -> Self {
        self.budget = budget;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.budget == 0 {
            return Err("budget must be greater than 0".to_string());
        }

        if self.name.is_empty() {
            return Err("name must not be empty".to_string());
        }

        Ok(())
    }
}

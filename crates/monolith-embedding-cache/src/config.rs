//! Configuration of an embedding cache.
//!
//! # Example
//!
//! ```
//! use monolith_embedding_cache::CacheConfigBuilder;
//!
//! let config = CacheConfigBuilder::new()
//!     .hashmap_capacity(4096)
//!     .cache_capacity(1024)
//!     .row_width(16)
//!     .emb_max_num(1_000_000)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.cache_capacity, 1024);
//! assert_eq!(config.first_step(), 0);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

fn default_initial_step() -> i64 {
    -2
}

/// Sizes and policies of an embedding cache.
///
/// Every cache is warm-started: ids `0..cache_capacity` are preloaded into
/// rows `0..cache_capacity`, stamped with `initial_step`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Number of slots in the hash index.
    pub hashmap_capacity: usize,
    /// Number of rows in the cache table.
    pub cache_capacity: usize,
    /// Elements per embedding row.
    pub row_width: usize,
    /// Exclusive upper bound of valid embedding ids.
    pub emb_max_num: i64,
    /// Bound on eviction scan length; unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_eviction_scan: Option<usize>,
    /// Step stamped on warm-start entries. They are stale from
    /// `initial_step + 2` onwards.
    #[serde(default = "default_initial_step")]
    pub initial_step: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hashmap_capacity: 4096,
            cache_capacity: 1024,
            row_width: 16,
            emb_max_num: 1 << 20,
            max_eviction_scan: None,
            initial_step: default_initial_step(),
        }
    }
}

impl CacheConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        tracing::debug!(path = %path.display(), "Loaded cache config");
        Ok(config)
    }

    /// Serializes the configuration as pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks that the sizes are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.hashmap_capacity == 0 || self.cache_capacity == 0 || self.row_width == 0 {
            return Err(CacheError::config(
                "hashmap_capacity, cache_capacity and row_width must be positive",
            ));
        }
        if self.hashmap_capacity <= self.cache_capacity {
            return Err(CacheError::config(format!(
                "hashmap_capacity ({}) must exceed cache_capacity ({})",
                self.hashmap_capacity, self.cache_capacity
            )));
        }
        if self.emb_max_num < 0 {
            return Err(CacheError::config(format!(
                "emb_max_num must be non-negative, got {}",
                self.emb_max_num
            )));
        }
        if (self.emb_max_num as u64) < self.cache_capacity as u64 {
            return Err(CacheError::config(format!(
                "warm start needs emb_max_num ({}) >= cache_capacity ({})",
                self.emb_max_num, self.cache_capacity
            )));
        }
        if self.max_eviction_scan == Some(0) {
            return Err(CacheError::config("max_eviction_scan must be positive"));
        }
        if self.initial_step > i64::MAX - 2 {
            return Err(CacheError::config(format!(
                "initial_step {} leaves no admissible step",
                self.initial_step
            )));
        }
        if i64::try_from(self.cache_capacity).is_err() {
            return Err(CacheError::config("cache_capacity does not fit in i64"));
        }
        Ok(())
    }

    /// Returns `cache_capacity` as the overflow row id reported by lookup.
    pub fn cache_max_num(&self) -> i64 {
        self.cache_capacity as i64
    }

    /// Returns the first step at which warm-start entries can be evicted.
    pub fn first_step(&self) -> i64 {
        self.initial_step.saturating_add(2)
    }
}

/// Builder for [`CacheConfig`].
#[derive(Debug, Clone, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    /// Starts from [`CacheConfig::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of hash index slots.
    pub fn hashmap_capacity(mut self, capacity: usize) -> Self {
        self.config.hashmap_capacity = capacity;
        self
    }

    /// Sets the number of cache rows.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    /// Sets the row width.
    pub fn row_width(mut self, width: usize) -> Self {
        self.config.row_width = width;
        self
    }

    /// Sets the exclusive upper bound of valid ids.
    pub fn emb_max_num(mut self, emb_max_num: i64) -> Self {
        self.config.emb_max_num = emb_max_num;
        self
    }

    /// Bounds the eviction scan.
    pub fn max_eviction_scan(mut self, limit: usize) -> Self {
        self.config.max_eviction_scan = Some(limit);
        self
    }

    /// Sets the step stamped on warm-start entries.
    pub fn initial_step(mut self, step: i64) -> Self {
        self.config.initial_step = step;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<CacheConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_is_valid() {
        CacheConfig::default().validate().unwrap();
    }

    #[test]
    fn test_json_defaults() {
        let config = CacheConfig::from_json_str(
            r#"{"hashmap_capacity": 64, "cache_capacity": 16, "row_width": 4, "emb_max_num": 1000}"#,
        )
        .unwrap();
        assert_eq!(config.initial_step, -2);
        assert_eq!(config.first_step(), 0);
        assert_eq!(config.max_eviction_scan, None);
        assert_eq!(config.cache_max_num(), 16);
    }

    #[test]
    fn test_json_round_trip() {
        let config = CacheConfigBuilder::new()
            .hashmap_capacity(100)
            .cache_capacity(10)
            .row_width(3)
            .emb_max_num(500)
            .max_eviction_scan(200)
            .build()
            .unwrap();
        let json = config.to_json_string().unwrap();
        assert_eq!(CacheConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_validation_errors() {
        let too_small = CacheConfigBuilder::new()
            .hashmap_capacity(16)
            .cache_capacity(16)
            .build();
        assert!(matches!(too_small, Err(CacheError::Config { .. })));

        let zero_width = CacheConfigBuilder::new().row_width(0).build();
        assert!(matches!(zero_width, Err(CacheError::Config { .. })));

        let few_ids = CacheConfigBuilder::new()
            .cache_capacity(100)
            .hashmap_capacity(400)
            .emb_max_num(10)
            .build();
        assert!(matches!(few_ids, Err(CacheError::Config { .. })));

        let zero_scan = CacheConfigBuilder::new().max_eviction_scan(0).build();
        assert!(matches!(zero_scan, Err(CacheError::Config { .. })));

        let late_start = CacheConfigBuilder::new().initial_step(i64::MAX).build();
        assert!(matches!(late_start, Err(CacheError::Config { .. })));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"hashmap_capacity": 32, "cache_capacity": 8, "row_width": 2, "emb_max_num": 64, "initial_step": 5}}"#
        )
        .unwrap();
        let config = CacheConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.hashmap_capacity, 32);
        assert_eq!(config.first_step(), 7);

        let missing = CacheConfig::from_json_file(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(CacheError::Io(_))));
    }

    #[test]
    fn test_cold_start_option_is_rejected() {
        // A cache without preloaded occupants could never evict a victim.
        let result = CacheConfig::from_json_str(
            r#"{"hashmap_capacity": 64, "cache_capacity": 16, "row_width": 4, "emb_max_num": 1000, "warm_start": false}"#,
        );
        assert!(matches!(result, Err(CacheError::Json(_))));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            CacheConfig::from_json_str("{"),
            Err(CacheError::Json(_))
        ));
    }
}

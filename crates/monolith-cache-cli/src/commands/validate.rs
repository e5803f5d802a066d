//! Validate Command Implementation
//!
//! Loads a cache configuration file, checks it and prints the normalized
//! configuration with every default filled in.

use anyhow::{Context, Result};
use clap::Args;
use monolith_embedding_cache::CacheConfig;
use std::path::PathBuf;
use tracing::info;

/// Validate a cache configuration file
///
/// # Example
///
/// ```bash
/// monolith-cache validate --config /path/to/cache.json
/// ```
#[derive(Args, Debug, Clone)]
pub struct ValidateCommand {
    /// Path to the JSON cache configuration
    #[arg(long, short = 'c', env = "MONOLITH_CACHE_CONFIG")]
    pub config: PathBuf,

    /// Only report success or failure, without printing the configuration
    #[arg(long, short = 'q')]
    pub quiet: bool,
}

impl ValidateCommand {
    /// Execute the validate command
    pub fn run(&self) -> Result<()> {
        let config = self.load()?;
        info!(
            path = %self.config.display(),
            hashmap_capacity = config.hashmap_capacity,
            cache_capacity = config.cache_capacity,
            "Cache configuration is valid"
        );
        if !self.quiet {
            println!("{}", config.to_json_string()?);
        }
        Ok(())
    }

    /// Loads and validates the configuration file.
    pub fn load(&self) -> Result<CacheConfig> {
        CacheConfig::from_json_file(&self.config)
            .with_context(|| format!("Invalid cache config {:?}", self.config))
    }
}

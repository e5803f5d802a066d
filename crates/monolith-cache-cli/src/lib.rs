//! Monolith embedding cache CLI library.
//!
//! This crate provides the command-line interface for the embedding cache:
//!
//! - **Validate**: Load and check a cache configuration file
//! - **Simulate**: Drive the cache with a synthetic multi-step workload
//!
//! # Example
//!
//! ```bash
//! # Check a configuration
//! monolith-cache validate --config /path/to/cache.json
//!
//! # Run 500 steps of a skewed workload and print JSON statistics
//! monolith-cache simulate --config /path/to/cache.json --steps 500 --json
//! ```

pub mod commands;

use clap::{Parser, Subcommand};

pub use commands::{SimulateCommand, SimulationReport, ValidateCommand};

/// Monolith embedding cache tools
///
/// Validate cache configurations and exercise the admission/eviction engine
/// against synthetic training workloads.
#[derive(Parser, Debug)]
#[command(name = "monolith-cache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a cache configuration file
    Validate(ValidateCommand),

    /// Run a synthetic workload against the cache
    Simulate(SimulateCommand),
}

impl Cli {
    /// Log filter directive matching the requested verbosity.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Result type alias for CLI operations
pub type CliResult<T> = anyhow::Result<T>;

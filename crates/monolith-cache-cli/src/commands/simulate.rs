//! Simulate Command Implementation
//!
//! Drives an [`EmbeddingCache`] with a synthetic training workload: every
//! step draws a Zipf-distributed batch of ids, prefetches them into the
//! cache, writes evicted rows back to an in-memory slow storage table and
//! applies a fake gradient update to the rows it used. At the end every
//! resident row is flushed and the storage is checked against the number of
//! updates each id received.

use anyhow::{ensure, Context, Result};
use clap::Args;
use monolith_embedding_cache::{CacheConfig, CacheConfigBuilder, CacheStats, EmbeddingCache};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Zipf};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

/// Run a synthetic workload against the cache
///
/// # Example
///
/// ```bash
/// monolith-cache simulate \
///     --config /path/to/cache.json \
///     --steps 1000 \
///     --batch-size 512 \
///     --zipf-exponent 1.05
/// ```
#[derive(Args, Debug, Clone)]
pub struct SimulateCommand {
    /// Path to the JSON cache configuration (defaults to a small built-in cache)
    #[arg(long, short = 'c', env = "MONOLITH_CACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of training steps to simulate
    #[arg(long, short = 's', default_value = "100")]
    pub steps: i64,

    /// Number of ids looked up per step
    #[arg(long, short = 'b', default_value = "256")]
    pub batch_size: usize,

    /// Zipf exponent of the id distribution (larger is more skewed)
    #[arg(long, default_value = "1.1")]
    pub zipf_exponent: f64,

    /// Seed of the id generator
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Outcome of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Configuration the cache ran with.
    pub config: CacheConfig,
    /// Number of simulated steps.
    pub steps: i64,
    /// Ids per step.
    pub batch_size: usize,
    /// Cache telemetry at the end of the run.
    pub stats: CacheStats,
    /// Hit rate over all in-range lookups.
    pub hit_rate: f64,
    /// Occupied fraction of the hash index at the end of the run.
    pub load_factor: f64,
    /// Rows written back to slow storage during the run.
    pub rows_written_back: u64,
    /// Ids whose storage row was checked after the final flush.
    pub verified_ids: usize,
}

impl SimulateCommand {
    /// Execute the simulate command
    pub fn run(&self) -> Result<SimulationReport> {
        let report = self.simulate()?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!("steps:             {}", report.steps);
            println!("batch size:        {}", report.batch_size);
            println!("hit rate:          {:.4}", report.hit_rate);
            println!("load factor:       {:.4}", report.load_factor);
            println!("admissions:        {}", report.stats.admissions);
            println!("evictions:         {}", report.stats.evictions);
            println!("avg insert probes: {:.3}", report.stats.avg_insert_probes);
            println!("avg evict length:  {:.3}", report.stats.avg_evict_length);
            println!("rows written back: {}", report.rows_written_back);
            println!("verified ids:      {}", report.verified_ids);
        }
        Ok(report)
    }

    fn load_config(&self) -> Result<CacheConfig> {
        match &self.config {
            Some(path) => {
                info!("Loading cache config from: {:?}", path);
                CacheConfig::from_json_file(path)
                    .with_context(|| format!("Invalid cache config {:?}", path))
            }
            None => CacheConfigBuilder::new()
                .hashmap_capacity(8192)
                .cache_capacity(2048)
                .row_width(8)
                .emb_max_num(100_000)
                .build()
                .context("Invalid built-in cache config"),
        }
    }

    /// Runs the simulation without printing anything.
    pub fn simulate(&self) -> Result<SimulationReport> {
        ensure!(self.steps > 0, "--steps must be positive");
        ensure!(self.batch_size > 0, "--batch-size must be positive");

        let config = self.load_config()?;
        let width = config.row_width;
        let emb_max_num = config.emb_max_num;
        ensure!(emb_max_num > 0, "emb_max_num must be positive to draw ids");
        let num_ids = usize::try_from(emb_max_num).context("emb_max_num does not fit in memory")?;

        info!(
            steps = self.steps,
            batch_size = self.batch_size,
            zipf_exponent = self.zipf_exponent,
            "Starting cache simulation"
        );

        let zipf = Zipf::new(emb_max_num as u64, self.zipf_exponent)
            .map_err(|e| anyhow::anyhow!("Invalid Zipf distribution: {}", e))?;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut storage = vec![0.0f32; num_ids * width];
        let mut updates = vec![0u32; num_ids];
        let mut cache = EmbeddingCache::new_with(config.clone(), |id, row| {
            let start = id as usize * width;
            row.copy_from_slice(&storage[start..start + width]);
        })
        .context("Failed to create embedding cache")?;

        let mut rows_written_back = 0u64;
        let mut keys = vec![0i64; self.batch_size];
        let mut touched_rows = Vec::with_capacity(self.batch_size);
        let mut gradient_rows = Vec::with_capacity(self.batch_size * width);

        let first_step = config.first_step();
        for step in first_step..first_step.saturating_add(self.steps) {
            for key in keys.iter_mut() {
                *key = zipf.sample(&mut rng) as i64 - 1;
            }

            let prefetch = cache
                .prefetch(&keys, step, |id, row| {
                    let start = id as usize * width;
                    row.copy_from_slice(&storage[start..start + width]);
                })
                .with_context(|| format!("Prefetch failed at step {}", step))?;

            for (id, row) in prefetch.evicted(width) {
                let start = id as usize * width;
                storage[start..start + width].copy_from_slice(row);
                rows_written_back += 1;
            }

            // One update per distinct row per step.
            touched_rows.clear();
            gradient_rows.clear();
            for (&key, &row) in keys.iter().zip(&prefetch.cache_idx) {
                if row < 0 || key >= emb_max_num || touched_rows.contains(&row) {
                    continue;
                }
                let current = cache
                    .table()
                    .row(row as usize)
                    .with_context(|| format!("Cache row {} out of range", row))?;
                touched_rows.push(row);
                gradient_rows.extend(current.iter().map(|v| v + 1.0));
                updates[key as usize] += 1;
            }
            cache.update_cache(&touched_rows, &gradient_rows)?;

            debug!(step, hits = prefetch.hits, evicted = prefetch.evicted_ids.len(), "Simulated step");
        }

        // Flush resident rows so storage holds the latest value of every id.
        for (_, slot) in cache.index().iter() {
            let row = cache
                .table()
                .row(slot.value as usize)
                .with_context(|| format!("Cache row {} out of range", slot.value))?;
            let start = slot.key as usize * width;
            storage[start..start + width].copy_from_slice(row);
        }

        let mut verified_ids = 0;
        for (id, &count) in updates.iter().enumerate() {
            let row = &storage[id * width..(id + 1) * width];
            ensure!(
                row.iter().all(|&v| v == count as f32),
                "Storage row of id {} is {:?}, expected {} updates",
                id,
                row,
                count
            );
            verified_ids += 1;
        }

        let stats = cache.stats().clone();
        let report = SimulationReport {
            hit_rate: stats.hit_rate(),
            load_factor: cache.index().load_factor(),
            config,
            steps: self.steps,
            batch_size: self.batch_size,
            stats,
            rows_written_back,
            verified_ids,
        };
        info!(
            hit_rate = report.hit_rate,
            evictions = report.stats.evictions,
            "Cache simulation finished"
        );
        Ok(report)
    }
}

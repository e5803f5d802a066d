//! The embedding cache context object.
//!
//! [`EmbeddingCache`] owns the hash index and the cache table of one
//! embedding table and exposes the four per-step operations on them. It can
//! also drive a whole step with [`EmbeddingCache::prefetch`]:
//!
//! ```text
//! lookup ──(misses)──> admission ──(swap plan)──> data move ──> write-back
//! ```
//!
//! The cache is single-threaded. One step's lookup, admission and move must
//! finish before the next step starts.

use crate::admission::{cache_swap_hashmap, AdmissionParams, SwapPlan};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::index::HashIndex;
use crate::lookup::{search_cache_idx, LookupOutput, LookupParams, NO_ENTRY};
use crate::mover::cache_swap_table;
use crate::stats::CacheStats;
use crate::table::CacheTable;
use crate::writer::update_cache;

/// Result of a full prefetch step.
#[derive(Debug, Clone, PartialEq)]
pub struct Prefetch<T> {
    /// Cache row per query position. `cache_max_num` for out-of-range ids,
    /// `-1` for positions that could not be resolved (full index).
    pub cache_idx: Vec<i64>,
    /// Ids evicted during the step, one per swapped row.
    pub evicted_ids: Vec<i64>,
    /// Rows of the evicted ids, `evicted_ids.len() x row_width`.
    pub evicted_rows: Vec<T>,
    /// Number of query positions that hit without admission.
    pub hits: usize,
}

impl<T> Prefetch<T> {
    /// Iterates over `(evicted_id, row)` pairs for write-back.
    pub fn evicted(&self, row_width: usize) -> impl Iterator<Item = (i64, &[T])> + '_ {
        self.evicted_ids
            .iter()
            .copied()
            .zip(self.evicted_rows.chunks_exact(row_width.max(1)))
    }

    /// Returns `true` if every position resolved to a row.
    pub fn is_resolved(&self) -> bool {
        self.cache_idx.iter().all(|&row| row != NO_ENTRY)
    }
}

/// Hash index, cache table and configuration of one cached embedding table.
///
/// # Example
///
/// ```
/// use monolith_embedding_cache::{CacheConfigBuilder, EmbeddingCache};
///
/// let config = CacheConfigBuilder::new()
///     .hashmap_capacity(32)
///     .cache_capacity(4)
///     .row_width(2)
///     .emb_max_num(1000)
///     .build()
///     .unwrap();
/// let mut cache = EmbeddingCache::<f32>::new(config).unwrap();
///
/// // Slow storage: every id's row is [id, id].
/// let step = cache
///     .prefetch(&[100, 101, 100], 1, |id, row| row.fill(id as f32))
///     .unwrap();
/// assert!(step.is_resolved());
/// assert_eq!(step.cache_idx[0], step.cache_idx[2]);
/// assert_eq!(cache.row_of(101), Some(&[101.0, 101.0][..]));
/// ```
#[derive(Debug, Clone)]
pub struct EmbeddingCache<T> {
    config: CacheConfig,
    index: HashIndex,
    table: CacheTable<T>,
}

impl<T: Copy + Default> EmbeddingCache<T> {
    /// Creates a cache with a default-filled table.
    ///
    /// Ids `0..cache_capacity` are warm-started into rows `0..cache_capacity`
    /// so admission always has an occupant to evict. They are written back
    /// with whatever those rows hold when evicted. Use
    /// [`EmbeddingCache::new_with`] to load their real data.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::new_with(config, |_, _| {})
    }

    /// Creates a cache, filling the warm-start rows with `fetch(id, row)`.
    pub fn new_with<F>(config: CacheConfig, mut fetch: F) -> Result<Self>
    where
        F: FnMut(i64, &mut [T]),
    {
        config.validate()?;
        let mut index = HashIndex::new(config.hashmap_capacity)?;
        let mut table = CacheTable::new(config.cache_capacity, config.row_width)?;

        let keys: Vec<i64> = (0..config.cache_max_num()).collect();
        index.preload(&keys, config.initial_step)?;
        for &key in &keys {
            if let Some(row) = table.row_mut(key as usize) {
                fetch(key, row);
            }
        }

        tracing::info!(
            hashmap_capacity = config.hashmap_capacity,
            cache_capacity = config.cache_capacity,
            row_width = config.row_width,
            initial_step = config.initial_step,
            "Created embedding cache"
        );
        Ok(Self {
            config,
            index,
            table,
        })
    }
}

impl<T: Copy> EmbeddingCache<T> {
    /// Assembles a cache from an existing index and table.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] if the sizes disagree with `config`,
    /// or [`CacheError::InvariantViolation`] if the index is corrupt.
    pub fn from_parts(config: CacheConfig, index: HashIndex, table: CacheTable<T>) -> Result<Self> {
        config.validate()?;
        if index.capacity() != config.hashmap_capacity {
            return Err(CacheError::config(format!(
                "index has {} slots, config expects {}",
                index.capacity(),
                config.hashmap_capacity
            )));
        }
        if table.rows() != config.cache_capacity || table.row_width() != config.row_width {
            return Err(CacheError::config(format!(
                "table is [{}, {}], config expects [{}, {}]",
                table.rows(),
                table.row_width(),
                config.cache_capacity,
                config.row_width
            )));
        }
        index.check_invariants()?;
        Ok(Self {
            config,
            index,
            table,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the hash index.
    pub fn index(&self) -> &HashIndex {
        &self.index
    }

    /// Returns the cache table.
    pub fn table(&self) -> &CacheTable<T> {
        &self.table
    }

    /// Returns the telemetry counters.
    pub fn stats(&self) -> &CacheStats {
        self.index.stats()
    }

    /// Resets the telemetry counters.
    pub fn reset_stats(&mut self) {
        self.index.stats_mut().reset();
    }

    /// Returns the cached row of `key`, if it is resident.
    pub fn row_of(&self, key: i64) -> Option<&[T]> {
        let slot = self.index.get(key)?;
        self.table.row(usize::try_from(slot.value).ok()?)
    }

    /// Consumes the cache and returns its index and table.
    pub fn into_parts(self) -> (HashIndex, CacheTable<T>) {
        (self.index, self.table)
    }

    /// Looks up `keys` at `step`. See [`search_cache_idx`].
    pub fn lookup(&mut self, keys: &[i64], step: i64) -> Result<LookupOutput> {
        let params = LookupParams::new(step, self.config.emb_max_num, self.config.cache_max_num());
        search_cache_idx(&mut self.index, keys, params)
    }

    /// Admits missed ids at `step`. See [`cache_swap_hashmap`].
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidParameter`] if `step` is not past the
    /// warm-start window (see [`EmbeddingCache::check_step`]).
    pub fn admit(&mut self, miss_emb_idx: &[i64], step: i64) -> Result<SwapPlan> {
        self.check_step(step)?;
        let params = self.admission_params(step);
        cache_swap_hashmap(&mut self.index, miss_emb_idx, params)
    }

    /// Rejects steps at which warm-start entries are still in use.
    ///
    /// Entries preloaded at `initial_step` stay in the recency window through
    /// `initial_step + 1`; admitting at such a step would find no victim.
    pub fn check_step(&self, step: i64) -> Result<()> {
        let first = self.config.first_step();
        if step < first {
            return Err(CacheError::invalid(format!(
                "step {} is inside the warm-start window, the first admissible step is {}",
                step, first
            )));
        }
        Ok(())
    }

    /// Writes rows by cache row index, bounded by the cache capacity.
    /// See [`update_cache`].
    pub fn update_cache(&mut self, indices: &[i64], update: &[T]) -> Result<usize> {
        let max_index = self.config.cache_max_num();
        update_cache(&mut self.table, indices, update, max_index)
    }

    fn admission_params(&self, step: i64) -> AdmissionParams {
        AdmissionParams {
            step,
            max_eviction_scan: self.config.max_eviction_scan,
        }
    }
}

impl<T: Copy + Default> EmbeddingCache<T> {
    /// Moves incoming rows into the table. See [`cache_swap_table`].
    pub fn swap_table(&mut self, swap_cache_idx: &[i64], miss_value: &[T]) -> Result<Vec<T>> {
        cache_swap_table(&mut self.table, swap_cache_idx, miss_value)
    }

    /// Runs one training step for `keys`.
    ///
    /// Missed ids are admitted, their rows are read from slow storage with
    /// `fetch(id, row)` and swapped into the table. The displaced rows and
    /// their ids are returned for write-back. `fetch` is infallible because
    /// the index has already been updated when it runs.
    pub fn prefetch<F>(&mut self, keys: &[i64], step: i64, mut fetch: F) -> Result<Prefetch<T>>
    where
        F: FnMut(i64, &mut [T]),
    {
        self.check_step(step)?;
        let lookup = self.lookup(keys, step)?;
        let hits = lookup
            .cache_idx
            .iter()
            .zip(keys)
            .filter(|&(&row, &key)| row >= 0 && key < self.config.emb_max_num)
            .count();
        let mut cache_idx = lookup.cache_idx;

        if lookup.miss_emb_idx.iter().all(|&id| id < 0) {
            return Ok(Prefetch {
                cache_idx,
                evicted_ids: Vec::new(),
                evicted_rows: Vec::new(),
                hits,
            });
        }

        let plan = self.admit(&lookup.miss_emb_idx, step)?;

        let width = self.config.row_width;
        let mut miss_value = vec![T::default(); keys.len() * width];
        for (i, _, _) in plan.swaps() {
            fetch(lookup.miss_emb_idx[i], &mut miss_value[i * width..(i + 1) * width]);
        }
        let old_value = self.swap_table(&plan.swap_cache_idx, &miss_value)?;

        let mut evicted_ids = Vec::new();
        let mut evicted_rows = Vec::new();
        for (i, row, old_id) in plan.swaps() {
            cache_idx[i] = row;
            evicted_ids.push(old_id);
            evicted_rows.extend_from_slice(&old_value[i * width..(i + 1) * width]);
        }

        // Repeated ids are admitted once; later positions pick up that row.
        for (i, &key) in lookup.miss_emb_idx.iter().enumerate() {
            if key >= 0 && cache_idx[i] == NO_ENTRY {
                if let Some(slot) = self.index.get(key) {
                    cache_idx[i] = slot.value;
                }
            }
        }

        tracing::debug!(
            step,
            batch = keys.len(),
            hits,
            evicted = evicted_ids.len(),
            "Prefetched embedding rows"
        );
        Ok(Prefetch {
            cache_idx,
            evicted_ids,
            evicted_rows,
            hits,
        })
    }
}

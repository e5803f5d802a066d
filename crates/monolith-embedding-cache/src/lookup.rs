//! Resolving embedding ids to cache rows.

use crate::error::{CacheError, Result};
use crate::index::{HashIndex, Probe};

/// Sentinel for "no data at this batch position".
pub const NO_ENTRY: i64 = -1;

/// Scalar parameters of a lookup call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupParams {
    /// Current training step; hits are stamped with it.
    pub step: i64,
    /// Exclusive upper bound of valid embedding ids.
    pub emb_max_num: i64,
    /// Cache capacity, reported as the cache row of out-of-range ids.
    pub cache_max_num: i64,
}

impl LookupParams {
    /// Creates lookup parameters.
    pub fn new(step: i64, emb_max_num: i64, cache_max_num: i64) -> Self {
        Self {
            step,
            emb_max_num,
            cache_max_num,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.emb_max_num < 0 {
            return Err(CacheError::invalid(format!(
                "emb_max_num must be non-negative, got {}",
                self.emb_max_num
            )));
        }
        if self.cache_max_num < 0 {
            return Err(CacheError::invalid(format!(
                "cache_max_num must be non-negative, got {}",
                self.cache_max_num
            )));
        }
        Ok(())
    }
}

/// Per-position result of a lookup batch.
///
/// For every position `i` exactly one of these holds:
///
/// - hit: `cache_idx[i]` is the cache row, `miss_idx[i] == miss_emb_idx[i] == -1`
/// - miss: `cache_idx[i] == -1`, `miss_idx[i] == i`, `miss_emb_idx[i]` is the id
/// - overflow: `cache_idx[i] == cache_max_num`, both miss fields `-1`
/// - unresolved (index full): all three fields `-1`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupOutput {
    /// Cache row per position.
    pub cache_idx: Vec<i64>,
    /// Batch position of each miss, `-1` elsewhere.
    pub miss_idx: Vec<i64>,
    /// Embedding id of each miss, `-1` elsewhere.
    pub miss_emb_idx: Vec<i64>,
}

impl LookupOutput {
    /// Creates an output sized for `batch_size` positions, filled with `-1`.
    pub fn with_batch_size(batch_size: usize) -> Self {
        let mut output = Self::default();
        output.reset(batch_size);
        output
    }

    fn reset(&mut self, batch_size: usize) {
        for buffer in [&mut self.cache_idx, &mut self.miss_idx, &mut self.miss_emb_idx] {
            buffer.clear();
            buffer.resize(batch_size, NO_ENTRY);
        }
    }

    /// Returns the number of positions.
    pub fn batch_size(&self) -> usize {
        self.cache_idx.len()
    }

    /// Returns the number of missed positions.
    pub fn miss_count(&self) -> usize {
        self.miss_emb_idx.iter().filter(|&&id| id >= 0).count()
    }

    /// Returns `true` if no position missed.
    pub fn all_hit(&self) -> bool {
        self.miss_count() == 0
    }
}

/// Looks up a batch of embedding ids.
///
/// Hits refresh the slot's step to `params.step`; misses create nothing.
/// Ids at or above `emb_max_num` skip the index and report
/// `cache_max_num`, the overflow row.
///
/// # Errors
///
/// Returns [`CacheError::InvalidParameter`] for negative bounds.
///
/// # Example
///
/// ```
/// use monolith_embedding_cache::{search_cache_idx, HashIndex, LookupParams};
///
/// let mut index = HashIndex::new(16).unwrap();
/// index.insert(5, 2, 0);
///
/// let out = search_cache_idx(&mut index, &[5, 6, 100], LookupParams::new(1, 50, 8)).unwrap();
/// assert_eq!(out.cache_idx, vec![2, -1, 8]);
/// assert_eq!(out.miss_idx, vec![-1, 1, -1]);
/// assert_eq!(out.miss_emb_idx, vec![-1, 6, -1]);
/// ```
pub fn search_cache_idx(
    index: &mut HashIndex,
    keys: &[i64],
    params: LookupParams,
) -> Result<LookupOutput> {
    let mut output = LookupOutput::default();
    search_cache_idx_into(index, keys, params, &mut output)?;
    Ok(output)
}

/// Same as [`search_cache_idx`], reusing the buffers of `output`.
pub fn search_cache_idx_into(
    index: &mut HashIndex,
    keys: &[i64],
    params: LookupParams,
    output: &mut LookupOutput,
) -> Result<()> {
    params.validate()?;
    output.reset(keys.len());

    let mut hits = 0u64;
    let mut misses = 0u64;
    let mut overflow = 0u64;
    let mut skipped = 0u64;

    for (i, &key) in keys.iter().enumerate() {
        if key >= params.emb_max_num {
            output.cache_idx[i] = params.cache_max_num;
            overflow += 1;
            continue;
        }
        match index.probe(key) {
            Probe::Hit { position, .. } => {
                output.cache_idx[i] = index.slot(position).value;
                index.touch(position, params.step);
                hits += 1;
            }
            Probe::Vacant { .. } => {
                output.miss_idx[i] = i as i64;
                output.miss_emb_idx[i] = key;
                misses += 1;
            }
            Probe::Full => {
                tracing::warn!(
                    key,
                    position = i,
                    capacity = index.capacity(),
                    "Hash index is full, lookup position left unresolved"
                );
                skipped += 1;
            }
        }
    }

    let stats = index.stats_mut();
    stats.lookups += keys.len() as u64;
    stats.hits += hits;
    stats.misses += misses;
    stats.overflow_lookups += overflow;
    stats.skipped_full += skipped;

    tracing::debug!(
        step = params.step,
        batch = keys.len(),
        hits,
        misses,
        overflow,
        "Searched cache index"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated_index() -> HashIndex {
        let mut index = HashIndex::new(32).unwrap();
        index.insert(10, 0, 1);
        index.insert(11, 1, 1);
        index.insert(12, 2, 1);
        index
    }

    #[test]
    fn test_hits_misses_and_overflow() {
        let mut index = populated_index();
        let out = search_cache_idx(&mut index, &[12, 99, 10, 1000, 13], LookupParams::new(5, 500, 3))
            .unwrap();

        assert_eq!(out.cache_idx, vec![2, -1, 0, 3, -1]);
        assert_eq!(out.miss_idx, vec![-1, 1, -1, -1, 4]);
        assert_eq!(out.miss_emb_idx, vec![-1, 99, -1, -1, 13]);
        assert_eq!(out.miss_count(), 2);
        assert!(!out.all_hit());

        let stats = index.stats();
        assert_eq!(stats.lookups, 5);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.overflow_lookups, 1);
    }

    #[test]
    fn test_hit_refreshes_step_only() {
        let mut index = populated_index();
        let before = *index.get(11).unwrap();
        search_cache_idx(&mut index, &[11], LookupParams::new(9, 100, 3)).unwrap();
        let after = *index.get(11).unwrap();
        assert_eq!(after.step, 9);
        assert_eq!(after.key, before.key);
        assert_eq!(after.value, before.value);
        assert_eq!(after.tag, before.tag);
        // Untouched keys keep their step.
        assert_eq!(index.get(10).unwrap().step, 1);
    }

    #[test]
    fn test_miss_creates_nothing() {
        let mut index = populated_index();
        search_cache_idx(&mut index, &[50, 51], LookupParams::new(2, 100, 3)).unwrap();
        assert_eq!(index.len(), 3);
        assert!(!index.contains(50));
    }

    #[test]
    fn test_overflow_ignores_index_contents() {
        let mut index = HashIndex::new(8).unwrap();
        index.insert(20, 4, 1);
        let out = search_cache_idx(&mut index, &[20], LookupParams::new(2, 20, 6)).unwrap();
        assert_eq!(out.cache_idx, vec![6]);
        assert_eq!(out.miss_idx, vec![-1]);
        // Overflow lookups never touch the slot.
        assert_eq!(index.get(20).unwrap().step, 1);
    }

    #[test]
    fn test_full_index_leaves_position_unresolved() {
        let mut index = HashIndex::new(2).unwrap();
        index.insert(1, 0, 1);
        index.insert(2, 1, 1);
        let out = search_cache_idx(&mut index, &[3, 1], LookupParams::new(2, 100, 2)).unwrap();
        assert_eq!(out.cache_idx, vec![-1, 0]);
        assert_eq!(out.miss_idx, vec![-1, -1]);
        assert_eq!(out.miss_emb_idx, vec![-1, -1]);
        assert_eq!(index.stats().skipped_full, 1);
    }

    #[test]
    fn test_into_reuses_buffers() {
        let mut index = populated_index();
        let mut output = LookupOutput::with_batch_size(8);
        search_cache_idx_into(&mut index, &[10], LookupParams::new(2, 100, 3), &mut output)
            .unwrap();
        assert_eq!(output.batch_size(), 1);
        assert_eq!(output.cache_idx, vec![0]);
    }

    #[test]
    fn test_rejects_negative_bounds() {
        let mut index = populated_index();
        assert!(matches!(
            search_cache_idx(&mut index, &[1], LookupParams::new(1, -1, 3)),
            Err(CacheError::InvalidParameter { .. })
        ));
        assert!(matches!(
            search_cache_idx(&mut index, &[1], LookupParams::new(1, 10, -3)),
            Err(CacheError::InvalidParameter { .. })
        ));
    }
}

//! Admitting missed ids into the index and planning cache row swaps.
//!
//! For every missed id the admission inserts the id, finds the nearest stale
//! occupant after the new slot, hands the occupant's cache row to the new id
//! and removes the occupant with backward-shift compression. Positions are
//! processed strictly in order, so later positions observe earlier ones:
//! an id admitted earlier in the batch is in use and never chosen as a
//! victim, and a repeated id is recognized as already present.

use crate::error::{check_len, Result};
use crate::index::{HashIndex, Insertion};
use crate::lookup::NO_ENTRY;

/// Scalar parameters of an admission call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionParams {
    /// Current training step; admitted ids are stamped with it.
    pub step: i64,
    /// Optional bound on the eviction scan length. `None` scans until a
    /// stale slot turns up.
    pub max_eviction_scan: Option<usize>,
}

impl AdmissionParams {
    /// Creates parameters with an unbounded eviction scan.
    pub fn new(step: i64) -> Self {
        Self {
            step,
            max_eviction_scan: None,
        }
    }

    /// Bounds the eviction scan to `limit` slots.
    pub fn with_max_eviction_scan(mut self, limit: usize) -> Self {
        self.max_eviction_scan = Some(limit);
        self
    }
}

/// The swap plan produced by an admission batch.
///
/// Position `i` either holds the cache row handed to the admitted id and the
/// id evicted from it, or `-1` in both fields when nothing was swapped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwapPlan {
    /// Cache row to overwrite per position.
    pub swap_cache_idx: Vec<i64>,
    /// Evicted embedding id per position, for write-back.
    pub old_emb_idx: Vec<i64>,
}

impl SwapPlan {
    /// Creates a plan of `batch_size` no-op positions.
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            swap_cache_idx: vec![NO_ENTRY; batch_size],
            old_emb_idx: vec![NO_ENTRY; batch_size],
        }
    }

    /// Returns the number of positions.
    pub fn batch_size(&self) -> usize {
        self.swap_cache_idx.len()
    }

    /// Iterates over `(position, cache_row, evicted_id)` of every real swap.
    pub fn swaps(&self) -> impl Iterator<Item = (usize, i64, i64)> + '_ {
        self.swap_cache_idx
            .iter()
            .zip(&self.old_emb_idx)
            .enumerate()
            .filter(|(_, (&row, _))| row >= 0)
            .map(|(i, (&row, &old))| (i, row, old))
    }
}

/// Admits every missed id of a batch and returns the swap plan.
///
/// `miss_emb_idx[i] < 0` marks a position that needs no admission. A
/// position is skipped (left at `-1`) when the index is full for its id,
/// when the id is already present, or when a bounded eviction scan finds no
/// stale slot; the latter two are counted in the index statistics.
///
/// # Example
///
/// ```
/// use monolith_embedding_cache::{cache_swap_hashmap, AdmissionParams, HashIndex};
///
/// let mut index = HashIndex::new(16).unwrap();
/// index.preload(&[0, 1, 2, 3], -1).unwrap();
///
/// let plan = cache_swap_hashmap(&mut index, &[-1, 42], AdmissionParams::new(1)).unwrap();
/// assert_eq!(plan.swap_cache_idx[0], -1);
/// let row = plan.swap_cache_idx[1];
/// assert!((0..4).contains(&row));
/// assert_eq!(index.get(42).map(|s| s.value), Some(row));
/// assert!(!index.contains(plan.old_emb_idx[1]));
/// ```
pub fn cache_swap_hashmap(
    index: &mut HashIndex,
    miss_emb_idx: &[i64],
    params: AdmissionParams,
) -> Result<SwapPlan> {
    let mut plan = SwapPlan::with_batch_size(miss_emb_idx.len());
    cache_swap_hashmap_into(index, miss_emb_idx, params, &mut plan)?;
    Ok(plan)
}

/// Same as [`cache_swap_hashmap`], writing into an existing plan.
///
/// # Errors
///
/// Returns [`crate::CacheError::ShapeMismatch`] if `plan` is not sized for
/// the batch.
pub fn cache_swap_hashmap_into(
    index: &mut HashIndex,
    miss_emb_idx: &[i64],
    params: AdmissionParams,
    plan: &mut SwapPlan,
) -> Result<()> {
    check_len("swap_cache_idx", miss_emb_idx.len(), plan.swap_cache_idx.len())?;
    check_len("old_emb_idx", miss_emb_idx.len(), plan.old_emb_idx.len())?;
    plan.swap_cache_idx.fill(NO_ENTRY);
    plan.old_emb_idx.fill(NO_ENTRY);

    let step = params.step;
    let mut admitted = 0usize;

    for (i, &key) in miss_emb_idx.iter().enumerate() {
        if key < 0 {
            continue;
        }

        let (position, probes) = match index.insert(key, NO_ENTRY, step) {
            Insertion::Inserted { position, probes } => (position, probes),
            Insertion::Present { .. } => {
                index.stats_mut().duplicate_admissions += 1;
                continue;
            }
            Insertion::Full => {
                tracing::warn!(
                    key,
                    position = i,
                    capacity = index.capacity(),
                    "Hash index is full, admission skipped"
                );
                index.stats_mut().skipped_full += 1;
                continue;
            }
        };

        let Some(victim) = index.eviction_scan(position, step, params.max_eviction_scan) else {
            index.remove_and_compress(position);
            tracing::warn!(
                key,
                position = i,
                step,
                limit = ?params.max_eviction_scan,
                "No stale slot within the eviction scan limit, admission rolled back"
            );
            index.stats_mut().stalled_evictions += 1;
            continue;
        };

        let evicted = *index.slot(victim.position);
        plan.swap_cache_idx[i] = evicted.value;
        plan.old_emb_idx[i] = evicted.key;

        // The row is assigned before compression may shift the new slot.
        index.set_value(position, evicted.value);
        let compressed = index.remove_and_compress(victim.position);

        let stats = index.stats_mut();
        stats.record_insert(probes);
        stats.record_eviction(victim.scanned + compressed);
        admitted += 1;
    }

    let stats = index.stats();
    tracing::debug!(
        step,
        batch = miss_emb_idx.len(),
        admitted,
        avg_insert_probes = stats.avg_insert_probes,
        avg_evict_length = stats.avg_evict_length,
        "Swapped cache hashmap"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::index::tests::keys_with_home;
    use crate::lookup::{search_cache_idx, LookupParams};

    fn warm_index(capacity: usize, rows: i64) -> HashIndex {
        let mut index = HashIndex::new(capacity).unwrap();
        let keys: Vec<i64> = (0..rows).collect();
        index.preload(&keys, -1).unwrap();
        index
    }

    #[test]
    fn test_admission_swaps_stale_rows() {
        let mut index = warm_index(32, 8);
        let plan = cache_swap_hashmap(&mut index, &[100, -1, 101], AdmissionParams::new(1)).unwrap();

        assert_eq!(plan.batch_size(), 3);
        assert_eq!(plan.swap_cache_idx[1], -1);
        assert_eq!(plan.old_emb_idx[1], -1);

        let swaps: Vec<_> = plan.swaps().collect();
        assert_eq!(swaps.len(), 2);
        assert_ne!(swaps[0].1, swaps[1].1);
        for (i, row, old) in swaps {
            assert!((0..8).contains(&row));
            assert!((0..8).contains(&old));
            assert!(!index.contains(old));
            let admitted = [100, -1, 101][i];
            let slot = index.get(admitted).unwrap();
            assert_eq!(slot.value, row);
            assert_eq!(slot.step, 1);
        }
        assert_eq!(index.len(), 8);
        assert_eq!(index.stats().admissions, 2);
        assert_eq!(index.stats().evictions, 2);
        index.check_invariants().unwrap();
    }

    #[test]
    fn test_victim_is_nearest_stale_slot_after_new_key() {
        let capacity = 16;
        let stale = keys_with_home(5, capacity, 1)[0];
        let fresh = keys_with_home(6, capacity, 1)[0];
        let far_stale = keys_with_home(9, capacity, 1)[0];
        let incoming = keys_with_home(4, capacity, 1)[0];

        let mut index = HashIndex::new(capacity).unwrap();
        index.insert(stale, 0, 0);
        index.insert(fresh, 1, 3);
        index.insert(far_stale, 2, 0);

        let plan = cache_swap_hashmap(&mut index, &[incoming], AdmissionParams::new(3)).unwrap();
        assert_eq!(plan.swap_cache_idx, vec![0]);
        assert_eq!(plan.old_emb_idx, vec![stale]);
        assert!(index.contains(fresh));
        assert!(index.contains(far_stale));
        index.check_invariants().unwrap();
    }

    #[test]
    fn test_admission_then_lookup_round_trip() {
        let mut index = warm_index(32, 8);
        let plan = cache_swap_hashmap(&mut index, &[500], AdmissionParams::new(2)).unwrap();
        let row = plan.swap_cache_idx[0];
        let evicted = plan.old_emb_idx[0];

        let out = search_cache_idx(&mut index, &[500, evicted], LookupParams::new(2, 1000, 8))
            .unwrap();
        assert_eq!(out.cache_idx[0], row);
        assert_eq!(out.cache_idx[1], -1);
        assert_eq!(out.miss_emb_idx[1], evicted);
    }

    #[test]
    fn test_duplicate_ids_in_one_batch() {
        let mut index = warm_index(32, 8);
        let plan = cache_swap_hashmap(&mut index, &[77, 77], AdmissionParams::new(1)).unwrap();
        assert!(plan.swap_cache_idx[0] >= 0);
        assert_eq!(plan.swap_cache_idx[1], -1);
        assert_eq!(plan.old_emb_idx[1], -1);
        assert_eq!(index.stats().duplicate_admissions, 1);
        index.check_invariants().unwrap();
    }

    #[test]
    fn test_batch_never_evicts_its_own_admissions() {
        let mut index = warm_index(16, 4);
        let plan =
            cache_swap_hashmap(&mut index, &[100, 101, 102, 103], AdmissionParams::new(1)).unwrap();
        let mut rows = plan.swap_cache_idx.clone();
        rows.sort_unstable();
        assert_eq!(rows, vec![0, 1, 2, 3]);
        for key in [100, 101, 102, 103] {
            assert!(index.contains(key));
        }
        for key in 0..4 {
            assert!(!index.contains(key));
        }
    }

    #[test]
    fn test_full_index_skips_position() {
        let capacity = 4;
        let mut index = HashIndex::new(capacity).unwrap();
        for key in 0..capacity as i64 {
            index.insert(key, key, -5);
        }
        let plan = cache_swap_hashmap(&mut index, &[99], AdmissionParams::new(1)).unwrap();
        assert_eq!(plan.swap_cache_idx, vec![-1]);
        assert_eq!(plan.old_emb_idx, vec![-1]);
        assert_eq!(index.stats().skipped_full, 1);
        assert_eq!(index.len(), capacity);
    }

    #[test]
    fn test_bounded_scan_rolls_back_admission() {
        let mut index = HashIndex::new(8).unwrap();
        index.insert(1, 0, 5);
        index.insert(2, 1, 5);
        let before = index.slots().to_vec();

        let params = AdmissionParams::new(5).with_max_eviction_scan(16);
        let plan = cache_swap_hashmap(&mut index, &[3], params).unwrap();
        assert_eq!(plan.swap_cache_idx, vec![-1]);
        assert!(!index.contains(3));
        assert_eq!(index.len(), 2);
        assert_eq!(index.stats().stalled_evictions, 1);
        for (a, b) in index.slots().iter().zip(&before) {
            assert_eq!(a.is_empty(), b.is_empty());
            if !a.is_empty() {
                assert_eq!(a, b);
            }
        }
        index.check_invariants().unwrap();
    }

    #[test]
    fn test_into_rejects_mis_sized_plan() {
        let mut index = warm_index(16, 4);
        let mut plan = SwapPlan::with_batch_size(1);
        let err = cache_swap_hashmap_into(&mut index, &[1, 2], AdmissionParams::new(1), &mut plan)
            .unwrap_err();
        assert!(matches!(err, CacheError::ShapeMismatch { .. }));
        assert_eq!(index.len(), 4);
    }
}

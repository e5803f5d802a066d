//! Moving row data according to an admission swap plan.

use crate::error::{check_len, Result};
use crate::table::CacheTable;

/// Swaps incoming rows into the cache table and returns the displaced rows.
///
/// For every position `i` with `swap_cache_idx[i] >= 0`, the current
/// contents of that cache row are copied to `old_value[i]` and the row is
/// overwritten with `miss_value[i]`. Positions with a negative index leave
/// `old_value[i]` at `T::default()` and the table untouched. Positions are
/// applied in order.
///
/// Together with `old_emb_idx` from the swap plan, the returned rows are
/// what the caller writes back to slow storage.
///
/// # Errors
///
/// * [`crate::CacheError::ShapeMismatch`] - If `miss_value` is not `B x row_width`
/// * [`crate::CacheError::CopyOutOfBounds`] - If an index is past the last row
///
/// # Example
///
/// ```
/// use monolith_embedding_cache::{cache_swap_table, CacheTable};
///
/// let mut table = CacheTable::from_vec(vec![1, 1, 2, 2, 3, 3], 3, 2).unwrap();
/// let old = cache_swap_table(&mut table, &[-1, 2], &[7, 7, 8, 8]).unwrap();
/// assert_eq!(old, vec![0, 0, 3, 3]);
/// assert_eq!(table.as_slice(), &[1, 1, 2, 2, 8, 8]);
/// ```
pub fn cache_swap_table<T: Copy + Default>(
    table: &mut CacheTable<T>,
    swap_cache_idx: &[i64],
    miss_value: &[T],
) -> Result<Vec<T>> {
    let mut old_value = vec![T::default(); swap_cache_idx.len() * table.row_width()];
    cache_swap_table_into(table, swap_cache_idx, miss_value, &mut old_value)?;
    Ok(old_value)
}

/// Same as [`cache_swap_table`], writing displaced rows into `old_value`.
///
/// `old_value` is zero-filled (`T::default()`) before any row is copied.
pub fn cache_swap_table_into<T: Copy + Default>(
    table: &mut CacheTable<T>,
    swap_cache_idx: &[i64],
    miss_value: &[T],
    old_value: &mut [T],
) -> Result<()> {
    let width = table.row_width();
    let expected = swap_cache_idx.len() * width;
    check_len("miss_value", expected, miss_value.len())?;
    check_len("old_value", expected, old_value.len())?;
    for &row in swap_cache_idx.iter().filter(|&&row| row >= 0) {
        table.row_range(row)?;
    }

    old_value.fill(T::default());
    let mut swapped = 0usize;
    for (i, &row) in swap_cache_idx.iter().enumerate() {
        if row < 0 {
            continue;
        }
        let span = i * width..(i + 1) * width;
        table.copy_row_out(row, &mut old_value[span.clone()])?;
        table.copy_row_in(row, &miss_value[span])?;
        swapped += 1;
    }

    tracing::debug!(batch = swap_cache_idx.len(), swapped, "Swapped cache table rows");
    Ok(())
}

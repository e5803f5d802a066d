//! Writing rows into the cache table by row index.

use crate::error::{check_len, Result};
use crate::table::CacheTable;

/// Overwrites cache rows by index, bypassing the hash index.
///
/// Row `indices[i]` is replaced with `update[i]` when
/// `0 <= indices[i] < max_index`; any other index is skipped. Returns the
/// number of rows written.
///
/// # Errors
///
/// * [`crate::CacheError::ShapeMismatch`] - If `update` is not `B x row_width`
/// * [`crate::CacheError::CopyOutOfBounds`] - If an index below `max_index`
///   is past the last row of the table
///
/// # Example
///
/// ```
/// use monolith_embedding_cache::{update_cache, CacheTable};
///
/// let mut table = CacheTable::<f32>::new(3, 1).unwrap();
/// let written = update_cache(&mut table, &[2, 5, -1], &[1.0, 2.0, 3.0], 3).unwrap();
/// assert_eq!(written, 1);
/// assert_eq!(table.as_slice(), &[0.0, 0.0, 1.0]);
/// ```
pub fn update_cache<T: Copy>(
    table: &mut CacheTable<T>,
    indices: &[i64],
    update: &[T],
    max_index: i64,
) -> Result<usize> {
    let width = table.row_width();
    check_len("update", indices.len() * width, update.len())?;
    let in_range = |row: i64| (0..max_index).contains(&row);
    for &row in indices.iter().filter(|&&row| in_range(row)) {
        table.row_range(row)?;
    }

    let mut written = 0usize;
    for (i, &row) in indices.iter().enumerate() {
        if !in_range(row) {
            continue;
        }
        table.copy_row_in(row, &update[i * width..(i + 1) * width])?;
        written += 1;
    }

    tracing::debug!(
        batch = indices.len(),
        written,
        skipped = indices.len() - written,
        "Updated cache rows"
    );
    Ok(written)
}

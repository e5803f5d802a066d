//! The dense cache table holding embedding rows.

use std::ops::Range;

use crate::error::{check_len, CacheError, Result};

/// A row-major buffer of `rows x row_width` elements.
///
/// Row `r` holds the live data of whichever embedding id the hash index
/// currently maps to `r`. The table is allocated once and never resized.
///
/// # Example
///
/// ```
/// use monolith_embedding_cache::CacheTable;
///
/// let mut table = CacheTable::<f32>::new(4, 2).unwrap();
/// table.row_mut(1).unwrap().copy_from_slice(&[1.0, 2.0]);
/// assert_eq!(table.row(1), Some(&[1.0, 2.0][..]));
/// assert_eq!(table.row(4), None);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CacheTable<T> {
    data: Vec<T>,
    rows: usize,
    row_width: usize,
}

impl<T: Copy + Default> CacheTable<T> {
    /// Creates a zero-filled table.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidParameter`] if either dimension is zero.
    pub fn new(rows: usize, row_width: usize) -> Result<Self> {
        Self::validate_dims(rows, row_width)?;
        Ok(Self {
            data: vec![T::default(); rows * row_width],
            rows,
            row_width,
        })
    }
}

impl<T: Copy> CacheTable<T> {
    /// Wraps an existing row-major buffer.
    ///
    /// # Errors
    ///
    /// * [`CacheError::InvalidParameter`] - If either dimension is zero
    /// * [`CacheError::ShapeMismatch`] - If `data.len() != rows * row_width`
    pub fn from_vec(data: Vec<T>, rows: usize, row_width: usize) -> Result<Self> {
        Self::validate_dims(rows, row_width)?;
        check_len("cache table", rows * row_width, data.len())?;
        Ok(Self {
            data,
            rows,
            row_width,
        })
    }

    fn validate_dims(rows: usize, row_width: usize) -> Result<()> {
        if rows == 0 || row_width == 0 {
            return Err(CacheError::invalid(format!(
                "cache table dimensions must be positive, got [{}, {}]",
                rows, row_width
            )));
        }
        Ok(())
    }

    /// Returns the number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Returns the number of elements per row.
    #[inline]
    pub fn row_width(&self) -> usize {
        self.row_width
    }

    /// Returns row `row`, or `None` if it is out of range.
    pub fn row(&self, row: usize) -> Option<&[T]> {
        (row < self.rows).then(|| &self.data[row * self.row_width..(row + 1) * self.row_width])
    }

    /// Returns row `row` mutably, or `None` if it is out of range.
    pub fn row_mut(&mut self, row: usize) -> Option<&mut [T]> {
        if row >= self.rows {
            return None;
        }
        let width = self.row_width;
        Some(&mut self.data[row * width..(row + 1) * width])
    }

    /// Returns the whole buffer.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Returns the whole buffer mutably.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consumes the table and returns its buffer.
    pub fn into_inner(self) -> Vec<T> {
        self.data
    }

    /// Element range of `row`, or [`CacheError::CopyOutOfBounds`].
    pub(crate) fn row_range(&self, row: i64) -> Result<Range<usize>> {
        match usize::try_from(row) {
            Ok(r) if r < self.rows => Ok(r * self.row_width..(r + 1) * self.row_width),
            _ => Err(CacheError::CopyOutOfBounds {
                what: "cache table",
                row,
                rows: self.rows,
            }),
        }
    }

    pub(crate) fn copy_row_out(&self, row: i64, dst: &mut [T]) -> Result<()> {
        let range = self.row_range(row)?;
        dst.copy_from_slice(&self.data[range]);
        Ok(())
    }

    pub(crate) fn copy_row_in(&mut self, row: i64, src: &[T]) -> Result<()> {
        let range = self.row_range(row)?;
        self.data[range].copy_from_slice(src);
        Ok(())
    }
}

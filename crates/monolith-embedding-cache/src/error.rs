//! Error types for embedding cache operations.

use thiserror::Error;

/// Errors that can occur during embedding cache operations.
///
/// Every operation validates its inputs before touching the index or the
/// cache table, so an error always leaves both structures unchanged. A full
/// hash index is not an error: the affected batch position is skipped and
/// logged instead.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A parameter was missing, empty, or out of its valid range.
    #[error("invalid parameter: {message}")]
    InvalidParameter {
        /// Description of the invalid parameter.
        message: String,
    },

    /// Two batch-sized buffers disagree in length.
    #[error("shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// The buffer whose length is wrong.
        what: &'static str,
        /// Expected number of elements.
        expected: usize,
        /// Actual number of elements provided.
        actual: usize,
    },

    /// The slot matrix is not a rank-2 `N x 4` integer matrix.
    #[error("invalid slot matrix shape {shape:?}: expected [N, 4]")]
    InvalidSlotMatrix {
        /// The shape that was provided.
        shape: Vec<usize>,
    },

    /// A slot field cannot be represented in the requested integer width.
    #[error("slot {position} field `{field}` value {value} does not fit the target integer width")]
    SlotValueOverflow {
        /// Position of the slot in the index.
        position: usize,
        /// Name of the overflowing field.
        field: &'static str,
        /// The value that did not fit.
        value: i64,
    },

    /// A row copy would read or write outside of its buffer.
    #[error("row copy out of bounds: row {row} of {rows} rows in {what}")]
    CopyOutOfBounds {
        /// The buffer being copied from or into.
        what: &'static str,
        /// The offending row index.
        row: i64,
        /// Number of rows in the buffer.
        rows: usize,
    },

    /// The hash index violates one of its structural invariants.
    #[error("index invariant violated at slot {position}: {message}")]
    InvariantViolation {
        /// Position of the offending slot.
        position: usize,
        /// Description of the violation.
        message: String,
    },

    /// The cache configuration is invalid.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Reading a configuration file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing or serializing JSON failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CacheError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// A specialized Result type for embedding cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Returns a [`CacheError::ShapeMismatch`] unless `actual == expected`.
pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(CacheError::ShapeMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

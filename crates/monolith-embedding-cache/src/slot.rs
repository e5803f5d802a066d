//! Slot records of the cache hash index.

use serde::{Deserialize, Serialize};

/// Tag value marking an empty slot.
pub const NULL_TAG: i64 = 0;

/// Number of integer fields per slot in the external slot matrix.
pub const SLOT_FIELDS: usize = 4;

/// One record of the fixed-size hash index.
///
/// A slot maps an embedding id (`key`) to the cache row (`value`) that
/// currently holds its data. `step` is the last training step at which the
/// slot was inserted or hit, and `tag` is one plus the probe distance from
/// the key's home position, with [`NULL_TAG`] marking an empty slot.
///
/// # Example
///
/// ```
/// use monolith_embedding_cache::Slot;
///
/// let slot = Slot::occupied(42, 3, 10, 1);
/// assert!(!slot.is_empty());
/// assert!(slot.is_using(11));
/// assert!(!slot.is_using(12));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Slot {
    /// Embedding id stored in this slot.
    pub key: i64,
    /// Cache row assigned to `key`.
    pub value: i64,
    /// Training step of the last touch.
    pub step: i64,
    /// `1 + probe distance`, or [`NULL_TAG`] when empty.
    pub tag: i64,
}

impl Slot {
    /// An empty slot.
    pub const EMPTY: Slot = Slot {
        key: 0,
        value: 0,
        step: 0,
        tag: NULL_TAG,
    };

    /// Creates an occupied slot.
    pub fn occupied(key: i64, value: i64, step: i64, tag: i64) -> Self {
        Self {
            key,
            value,
            step,
            tag,
        }
    }

    /// Returns `true` if the slot holds no key.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tag == NULL_TAG
    }

    /// Returns `true` if the slot was touched in `step` or the step before it.
    ///
    /// This one-step grace window is the whole recency policy: a slot that is
    /// not "using" is a candidate for eviction.
    #[inline]
    pub fn is_using(&self, step: i64) -> bool {
        self.step >= step.saturating_sub(1)
    }

    /// Marks the slot as empty. The remaining fields are left as-is.
    #[inline]
    pub fn clear(&mut self) {
        self.tag = NULL_TAG;
    }

    /// Returns the slot as its four matrix fields `[key, value, step, tag]`.
    pub fn fields(&self) -> [i64; SLOT_FIELDS] {
        [self.key, self.value, self.step, self.tag]
    }
}

/// An integer type usable as a slot matrix element.
///
/// The slot matrix exchanged with callers stores `key`, `value`, `step` and
/// `tag` in one integer width, either 32 or 64 bits.
pub trait SlotWord: Copy {
    /// Widens the word to `i64`.
    fn to_i64(self) -> i64;

    /// Narrows an `i64` into this word, or `None` if it does not fit.
    fn from_i64(value: i64) -> Option<Self>;
}

impl SlotWord for i64 {
    #[inline]
    fn to_i64(self) -> i64 {
        self
    }

    #[inline]
    fn from_i64(value: i64) -> Option<Self> {
        Some(value)
    }
}

impl SlotWord for i32 {
    #[inline]
    fn to_i64(self) -> i64 {
        i64::from(self)
    }

    #[inline]
    fn from_i64(value: i64) -> Option<Self> {
        i32::try_from(value).ok()
    }
}

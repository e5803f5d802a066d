//! Open-addressing hash index mapping embedding ids to cache rows.
//!
//! The index is a fixed array of [`Slot`]s using linear probing with
//! golden-ratio multiplicative hashing. Deletion uses backward-shift
//! compression instead of tombstones: every slot carries its probe distance
//! in `tag`, which lets later entries slide back into the gap left by a
//! removed key.
//!
//! Two invariants hold between operations:
//!
//! - **Reachability**: an occupied slot at position `p` with tag `t` sits
//!   exactly `t - 1` positions past `hash(key)`, and every slot between the
//!   two is occupied.
//! - **Uniqueness**: no key appears in more than one slot.
//!
//! [`HashIndex::check_invariants`] verifies both.

use hashbrown::HashSet;

use crate::error::{CacheError, Result};
use crate::slot::{Slot, SlotWord, SLOT_FIELDS};
use crate::stats::CacheStats;

/// Fractional part of the golden ratio used by [`hash_func`].
const GOLDEN_RATIO_FRAC: f64 = 0.618_033_988_7;

/// Computes the home position of `key` in an index of `capacity` slots.
///
/// `floor(frac(φ · key) · capacity)`, clamped into `[0, capacity)`.
///
/// # Example
///
/// ```
/// use monolith_embedding_cache::hash_func;
///
/// let home = hash_func(12345, 64);
/// assert!(home < 64);
/// assert_eq!(home, hash_func(12345, 64));
/// ```
#[inline]
pub fn hash_func(key: i64, capacity: usize) -> usize {
    let product = key as f64 * GOLDEN_RATIO_FRAC;
    let frac = product - product.floor();
    let position = (frac * capacity as f64) as usize;
    position.min(capacity.saturating_sub(1))
}

/// Outcome of probing the index for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// The key is stored at `position`, `probes` steps past its home.
    Hit {
        /// Slot holding the key.
        position: usize,
        /// Probe distance from the home position.
        probes: usize,
    },
    /// The key is absent; `position` is the first empty slot on its chain.
    Vacant {
        /// First empty slot reached.
        position: usize,
        /// Probe distance from the home position.
        probes: usize,
    },
    /// The scan wrapped around to the home position without finding the key
    /// or an empty slot.
    Full,
}

/// Outcome of inserting a key into the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// The key was written into a previously empty slot.
    Inserted {
        /// Slot now holding the key.
        position: usize,
        /// Probe distance from the home position.
        probes: usize,
    },
    /// The key was already present; only its step was refreshed.
    Present {
        /// Slot holding the key.
        position: usize,
    },
    /// No empty slot was reachable.
    Full,
}

/// An occupied, stale slot chosen for eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionCandidate {
    /// Position of the victim slot.
    pub position: usize,
    /// Number of slots visited to find it.
    pub scanned: usize,
}

/// A fixed-capacity linear-probing index of [`Slot`]s.
///
/// The index never grows: its capacity is chosen once and the slot array is
/// mutated in place for the lifetime of the training job. It is not
/// synchronized; callers serialize access.
///
/// # Example
///
/// ```
/// use monolith_embedding_cache::{HashIndex, Insertion, Probe};
///
/// let mut index = HashIndex::new(16).unwrap();
/// assert!(matches!(index.insert(7, 3, 1), Insertion::Inserted { .. }));
///
/// match index.probe(7) {
///     Probe::Hit { position, .. } => assert_eq!(index.slot(position).value, 3),
///     other => panic!("expected a hit, got {:?}", other),
/// }
/// ```
#[derive(Debug, Clone)]
pub struct HashIndex {
    slots: Vec<Slot>,
    occupied: usize,
    stats: CacheStats,
}

impl HashIndex {
    /// Creates an empty index with `capacity` slots.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidParameter`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(CacheError::invalid("hash index capacity must be positive"));
        }
        Ok(Self {
            slots: vec![Slot::EMPTY; capacity],
            occupied: 0,
            stats: CacheStats::new(),
        })
    }

    /// Builds an index from an external `N x 4` slot matrix.
    ///
    /// Rows are `[key, value, step, tag]` in row-major order.
    ///
    /// # Errors
    ///
    /// * [`CacheError::InvalidSlotMatrix`] - If `shape` is not `[N, 4]` with `N > 0`
    /// * [`CacheError::ShapeMismatch`] - If `data` does not hold `N * 4` elements
    pub fn from_matrix<W: SlotWord>(data: &[W], shape: &[usize]) -> Result<Self> {
        let rows = match shape {
            [rows, fields] if *fields == SLOT_FIELDS && *rows > 0 => *rows,
            _ => {
                return Err(CacheError::InvalidSlotMatrix {
                    shape: shape.to_vec(),
                })
            }
        };
        crate::error::check_len("slot matrix", rows * SLOT_FIELDS, data.len())?;

        let slots: Vec<Slot> = data
            .chunks_exact(SLOT_FIELDS)
            .map(|row| Slot {
                key: row[0].to_i64(),
                value: row[1].to_i64(),
                step: row[2].to_i64(),
                tag: row[3].to_i64(),
            })
            .collect();
        let occupied = slots.iter().filter(|s| !s.is_empty()).count();

        Ok(Self {
            slots,
            occupied,
            stats: CacheStats::new(),
        })
    }

    /// Writes the index into an external `N x 4` slot matrix.
    ///
    /// # Errors
    ///
    /// * [`CacheError::ShapeMismatch`] - If `out` does not hold `N * 4` elements
    /// * [`CacheError::SlotValueOverflow`] - If a field does not fit in `W`
    pub fn write_matrix<W: SlotWord>(&self, out: &mut [W]) -> Result<()> {
        crate::error::check_len("slot matrix", self.slots.len() * SLOT_FIELDS, out.len())?;

        // Narrow everything first so a failure leaves `out` untouched.
        let mut narrowed = Vec::with_capacity(out.len());
        for (position, slot) in self.slots.iter().enumerate() {
            for (field, value) in ["key", "value", "step", "tag"].into_iter().zip(slot.fields()) {
                let word = W::from_i64(value).ok_or(CacheError::SlotValueOverflow {
                    position,
                    field,
                    value,
                })?;
                narrowed.push(word);
            }
        }
        out.copy_from_slice(&narrowed);
        Ok(())
    }

    /// Returns the index as a freshly allocated `N x 4` slot matrix.
    pub fn to_matrix<W: SlotWord + Default>(&self) -> Result<Vec<W>> {
        let mut out = vec![W::default(); self.slots.len() * SLOT_FIELDS];
        self.write_matrix(&mut out)?;
        Ok(out)
    }

    /// Returns the number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of occupied slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.occupied
    }

    /// Returns `true` if no slot is occupied.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Returns the occupied fraction of the index.
    pub fn load_factor(&self) -> f64 {
        self.occupied as f64 / self.slots.len() as f64
    }

    /// Returns the slot at `position`.
    ///
    /// # Panics
    ///
    /// Panics if `position >= capacity()`.
    #[inline]
    pub fn slot(&self, position: usize) -> &Slot {
        &self.slots[position]
    }

    /// Returns the raw slot array.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Iterates over occupied slots with their positions.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Slot)> {
        self.slots.iter().enumerate().filter(|(_, s)| !s.is_empty())
    }

    /// Returns the slot holding `key`, if any.
    pub fn get(&self, key: i64) -> Option<&Slot> {
        match self.probe(key) {
            Probe::Hit { position, .. } => Some(&self.slots[position]),
            _ => None,
        }
    }

    /// Returns `true` if `key` is stored in the index.
    pub fn contains(&self, key: i64) -> bool {
        self.get(key).is_some()
    }

    /// Returns the telemetry counters.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut CacheStats {
        &mut self.stats
    }

    /// Returns the home position of `key`.
    #[inline]
    pub fn home(&self, key: i64) -> usize {
        hash_func(key, self.slots.len())
    }

    /// Scans forward from the home position of `key` until it finds the key
    /// or an empty slot.
    pub fn probe(&self, key: i64) -> Probe {
        let capacity = self.slots.len();
        let mut position = self.home(key);
        for probes in 0..capacity {
            let slot = &self.slots[position];
            if slot.is_empty() {
                return Probe::Vacant { position, probes };
            }
            if slot.key == key {
                return Probe::Hit { position, probes };
            }
            position = (position + 1) % capacity;
        }
        Probe::Full
    }

    /// Inserts `key` at the first empty slot on its probe chain.
    ///
    /// If the key is already present its step is refreshed and nothing else
    /// changes.
    pub fn insert(&mut self, key: i64, value: i64, step: i64) -> Insertion {
        match self.probe(key) {
            Probe::Vacant { position, probes } => {
                self.slots[position] = Slot::occupied(key, value, step, probes as i64 + 1);
                self.occupied += 1;
                Insertion::Inserted { position, probes }
            }
            Probe::Hit { position, .. } => {
                self.slots[position].step = step;
                Insertion::Present { position }
            }
            Probe::Full => Insertion::Full,
        }
    }

    /// Refreshes the step of the slot at `position`.
    #[inline]
    pub(crate) fn touch(&mut self, position: usize, step: i64) {
        self.slots[position].step = step;
    }

    /// Assigns the cache row of the slot at `position`.
    #[inline]
    pub(crate) fn set_value(&mut self, position: usize, value: i64) {
        self.slots[position].value = value;
    }

    /// Finds the nearest occupied slot after `after` that is not within the
    /// recency window of `step`.
    ///
    /// With `limit = None` the scan is unbounded: if every occupied slot is
    /// in use it keeps cycling, logging a warning on every full wrap, and
    /// only returns once some slot goes stale. With `Some(limit)` it gives up
    /// after visiting `limit` slots and returns `None`.
    pub fn eviction_scan(
        &self,
        after: usize,
        step: i64,
        limit: Option<usize>,
    ) -> Option<EvictionCandidate> {
        let capacity = self.slots.len();
        let mut position = (after + 1) % capacity;
        let mut scanned = 1;
        loop {
            let slot = &self.slots[position];
            if !slot.is_empty() && !slot.is_using(step) {
                return Some(EvictionCandidate { position, scanned });
            }
            if limit.is_some_and(|limit| scanned >= limit) {
                return None;
            }
            if scanned % capacity == 0 {
                tracing::warn!(
                    step,
                    scanned,
                    capacity,
                    "Eviction scan wrapped the index without finding a stale slot"
                );
            }
            position = (position + 1) % capacity;
            scanned += 1;
        }
    }

    /// Empties the slot at `position` and shifts later entries of the same
    /// cluster back to close the gap.
    ///
    /// Returns the number of occupied slots examined after the removed one.
    pub fn remove_and_compress(&mut self, position: usize) -> usize {
        if self.slots[position].is_empty() {
            return 0;
        }
        self.slots[position].clear();
        self.occupied -= 1;

        let capacity = self.slots.len();
        let mut gap = position;
        let mut offset: i64 = 1;
        let mut current = (position + 1) % capacity;
        let mut examined = 0;

        // `gap` is always empty, so the scan stops before wrapping past it.
        while !self.slots[current].is_empty() {
            examined += 1;
            if self.slots[current].tag > offset {
                let mut moved = self.slots[current];
                moved.tag -= offset;
                self.slots[gap] = moved;
                self.slots[current].clear();
                gap = current;
                offset = 0;
            }
            offset += 1;
            current = (current + 1) % capacity;
        }
        examined
    }

    /// Removes `key` from the index, returning its slot if it was present.
    pub fn remove(&mut self, key: i64) -> Option<Slot> {
        match self.probe(key) {
            Probe::Hit { position, .. } => {
                let removed = self.slots[position];
                self.remove_and_compress(position);
                Some(removed)
            }
            _ => None,
        }
    }

    /// Inserts `keys[i]` mapped to cache row `i`, stamped with `step`.
    ///
    /// Used to warm-start a fresh index so admission always has an occupant
    /// to evict. At least one slot must remain empty afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidParameter`] if the keys would fill the
    /// index or a key is already present. The index is unchanged on error.
    pub fn preload(&mut self, keys: &[i64], step: i64) -> Result<()> {
        if self.occupied + keys.len() >= self.slots.len() {
            return Err(CacheError::invalid(format!(
                "preloading {} keys into an index of {} slots with {} occupied leaves no empty slot",
                keys.len(),
                self.slots.len(),
                self.occupied
            )));
        }
        let mut seen = HashSet::with_capacity(keys.len());
        for &key in keys {
            if !seen.insert(key) || self.contains(key) {
                return Err(CacheError::invalid(format!("duplicate preload key {}", key)));
            }
        }

        // Placeholders, not admissions: stats are left untouched.
        for (row, &key) in keys.iter().enumerate() {
            self.insert(key, row as i64, step);
        }
        tracing::debug!(keys = keys.len(), step, "Preloaded hash index");
        Ok(())
    }

    /// Verifies the reachability and uniqueness invariants.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvariantViolation`] for the first bad slot.
    pub fn check_invariants(&self) -> Result<()> {
        let capacity = self.slots.len();
        let mut keys = HashSet::with_capacity(self.occupied);
        let mut occupied = 0;

        for (position, slot) in self.iter() {
            occupied += 1;
            let violation = |message: String| CacheError::InvariantViolation { position, message };

            if slot.tag < 1 || slot.tag as usize > capacity {
                return Err(violation(format!("tag {} out of range", slot.tag)));
            }
            let home = self.home(slot.key);
            let distance = slot.tag as usize - 1;
            if (home + distance) % capacity != position {
                return Err(violation(format!(
                    "key {} with tag {} should sit {} slots past home {}",
                    slot.key, slot.tag, distance, home
                )));
            }
            for step in 0..distance {
                if self.slots[(home + step) % capacity].is_empty() {
                    return Err(violation(format!(
                        "empty slot {} breaks the probe chain of key {}",
                        (home + step) % capacity,
                        slot.key
                    )));
                }
            }
            if !keys.insert(slot.key) {
                return Err(violation(format!("key {} stored twice", slot.key)));
            }
        }

        if occupied != self.occupied {
            return Err(CacheError::InvariantViolation {
                position: 0,
                message: format!(
                    "occupancy counter {} disagrees with {} occupied slots",
                    self.occupied, occupied
                ),
            });
        }
        Ok(())
    }
}

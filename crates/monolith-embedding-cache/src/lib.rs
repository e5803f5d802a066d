//! Host-side admission and eviction for cached embedding tables.
//!
//! When an embedding table is too large for fast memory, a small cache table
//! holds the hot rows and this crate tracks which embedding id lives in
//! which cache row. Each training step streams hot rows in and cold rows
//! out.
//!
//! # Overview
//!
//! The main components are:
//!
//! - [`HashIndex`] - Fixed-capacity linear-probing index of [`Slot`]s with
//!   tombstone-free backward-shift deletion
//! - [`search_cache_idx`] - Resolves ids to cache rows and reports misses
//! - [`cache_swap_hashmap`] - Admits missed ids, evicting stale occupants,
//!   and emits a [`SwapPlan`]
//! - [`cache_swap_table`] - Applies a swap plan to a [`CacheTable`]
//! - [`update_cache`] - Overwrites cache rows by index
//! - [`EmbeddingCache`] - Context object owning index, table and config
//!
//! # Example
//!
//! ```
//! use monolith_embedding_cache::{
//!     cache_swap_hashmap, cache_swap_table, search_cache_idx, AdmissionParams, CacheTable,
//!     HashIndex, LookupParams,
//! };
//!
//! let mut index = HashIndex::new(64).unwrap();
//! let mut table = CacheTable::<f32>::new(8, 4).unwrap();
//! index.preload(&(0..8).collect::<Vec<i64>>(), -1).unwrap();
//!
//! let step = 1;
//! let lookup = search_cache_idx(&mut index, &[3, 500], LookupParams::new(step, 10_000, 8)).unwrap();
//! assert_eq!(lookup.cache_idx[0], 3);
//! assert_eq!(lookup.miss_emb_idx[1], 500);
//!
//! let plan = cache_swap_hashmap(&mut index, &lookup.miss_emb_idx, AdmissionParams::new(step)).unwrap();
//! let incoming = vec![0.0, 0.0, 0.0, 0.0, 5.0, 5.0, 5.0, 5.0];
//! let evicted_rows = cache_swap_table(&mut table, &plan.swap_cache_idx, &incoming).unwrap();
//!
//! let row = plan.swap_cache_idx[1] as usize;
//! assert_eq!(table.row(row), Some(&[5.0, 5.0, 5.0, 5.0][..]));
//! assert_eq!(evicted_rows.len(), 8);
//! ```

mod admission;
mod cache;
pub mod config;
mod error;
mod index;
mod lookup;
mod mover;
mod slot;
pub mod stats;
mod table;
mod writer;

pub use admission::{cache_swap_hashmap, cache_swap_hashmap_into, AdmissionParams, SwapPlan};
pub use cache::{EmbeddingCache, Prefetch};
pub use config::{CacheConfig, CacheConfigBuilder};
pub use error::{CacheError, Result};
pub use index::{hash_func, EvictionCandidate, HashIndex, Insertion, Probe};
pub use lookup::{search_cache_idx, search_cache_idx_into, LookupOutput, LookupParams, NO_ENTRY};
pub use mover::{cache_swap_table, cache_swap_table_into};
pub use slot::{Slot, SlotWord, NULL_TAG, SLOT_FIELDS};
pub use stats::CacheStats;
pub use table::CacheTable;
pub use writer::update_cache;

use monolith_embedding_cache::{
    cache_swap_hashmap, cache_swap_table, search_cache_idx, update_cache, AdmissionParams,
    CacheConfigBuilder, CacheTable, EmbeddingCache, HashIndex, LookupParams,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const EMB_MAX_NUM: i64 = 10_000;
const CACHE_ROWS: i64 = 16;

fn warm_index() -> HashIndex {
    let mut index = HashIndex::new(64).unwrap();
    index.preload(&(0..CACHE_ROWS).collect::<Vec<_>>(), -1).unwrap();
    index
}

fn params(step: i64) -> LookupParams {
    LookupParams::new(step, EMB_MAX_NUM, CACHE_ROWS)
}

#[test]
fn admitted_key_resolves_and_evicted_key_misses() {
    let mut index = warm_index();
    let misses = search_cache_idx(&mut index, &[777, 778], params(1)).unwrap();
    let plan = cache_swap_hashmap(&mut index, &misses.miss_emb_idx, AdmissionParams::new(1)).unwrap();

    for (i, row, evicted) in plan.swaps() {
        let key = [777, 778][i];
        let out = search_cache_idx(&mut index, &[key, evicted], params(2)).unwrap();
        assert_eq!(out.cache_idx[0], row);
        assert_eq!(out.cache_idx[1], -1);
        assert_eq!(out.miss_idx[1], 1);
        assert_eq!(out.miss_emb_idx[1], evicted);
    }
}

#[test]
fn consecutive_lookups_are_identical() {
    let mut index = warm_index();
    let keys = [3, 400, 7, EMB_MAX_NUM + 1, 3, 15];
    let first = search_cache_idx(&mut index, &keys, params(4)).unwrap();
    let slots_after_first = index.slots().to_vec();
    let second = search_cache_idx(&mut index, &keys, params(4)).unwrap();

    assert_eq!(first, second);
    assert_eq!(index.slots(), &slots_after_first[..]);
}

#[test]
fn overflow_keys_always_report_cache_max_num() {
    let mut rng = StdRng::seed_from_u64(11);
    let mut index = warm_index();
    // Put some keys above the bound into the index directly.
    index.insert(EMB_MAX_NUM, 0, 0);
    index.insert(EMB_MAX_NUM + 3, 1, 0);

    let keys: Vec<i64> = (0..200)
        .map(|_| rng.gen_range(EMB_MAX_NUM..EMB_MAX_NUM + 10))
        .collect();
    let out = search_cache_idx(&mut index, &keys, params(1)).unwrap();
    assert!(out.cache_idx.iter().all(|&row| row == CACHE_ROWS));
    assert!(out.miss_idx.iter().all(|&i| i == -1));
    assert!(out.miss_emb_idx.iter().all(|&id| id == -1));
}

#[test]
fn data_mover_reference_scenario() {
    let rows = 10;
    let width = 4;
    let initial: Vec<f32> = (0..rows * width).map(|v| v as f32).collect();
    let mut table = CacheTable::from_vec(initial.clone(), rows, width).unwrap();
    let swap_cache_idx = [-1, -1, 2, 3, -1];
    let miss_value: Vec<f32> = (0..5 * width).map(|v| 100.0 + v as f32).collect();

    let old_value = cache_swap_table(&mut table, &swap_cache_idx, &miss_value).unwrap();

    assert_eq!(table.row(2), Some(&miss_value[8..12]));
    assert_eq!(table.row(3), Some(&miss_value[12..16]));
    for untouched in [0, 1, 4, 5, 6, 7, 8, 9] {
        assert_eq!(
            table.row(untouched),
            Some(&initial[untouched * width..(untouched + 1) * width])
        );
    }

    assert_eq!(&old_value[0..4], &[0.0; 4]);
    assert_eq!(&old_value[4..8], &[0.0; 4]);
    assert_eq!(&old_value[8..12], &initial[8..12]);
    assert_eq!(&old_value[12..16], &initial[12..16]);
    assert_eq!(&old_value[16..20], &[0.0; 4]);
}

#[test]
fn bulk_writer_random_batches() {
    let mut rng = StdRng::seed_from_u64(3);
    let rows = 12usize;
    let width = 3usize;
    let max_index = 9i64;
    let mut table = CacheTable::<i32>::new(rows, width).unwrap();
    let mut expected = vec![0i32; rows * width];

    for round in 0..50 {
        let batch = rng.gen_range(1..8);
        let indices: Vec<i64> = (0..batch).map(|_| rng.gen_range(-3..max_index + 3)).collect();
        let update: Vec<i32> = (0..batch * width).map(|v| round * 100 + v as i32).collect();

        update_cache(&mut table, &indices, &update, max_index).unwrap();

        for (i, &row) in indices.iter().enumerate() {
            if (0..max_index).contains(&row) {
                let row = row as usize;
                expected[row * width..(row + 1) * width]
                    .copy_from_slice(&update[i * width..(i + 1) * width]);
            }
        }
        assert_eq!(table.as_slice(), &expected[..]);
    }
    // Rows at or above max_index were never written.
    assert!(table.as_slice()[max_index as usize * width..].iter().all(|&v| v == 0));
}

#[test]
fn multi_step_prefetch_keeps_cache_consistent_with_storage() {
    let width = 3;
    let emb_max_num = 500i64;
    let config = CacheConfigBuilder::new()
        .hashmap_capacity(128)
        .cache_capacity(32)
        .row_width(width)
        .emb_max_num(emb_max_num)
        .build()
        .unwrap();

    // Slow storage; each row starts as [id, id, id].
    let mut storage: Vec<f32> = (0..emb_max_num)
        .flat_map(|id| std::iter::repeat(id as f32).take(width))
        .collect();
    let mut cache = EmbeddingCache::new_with(config, |id, row| {
        let start = id as usize * width;
        row.copy_from_slice(&storage[start..start + width]);
    })
    .unwrap();

    let mut rng = StdRng::seed_from_u64(99);
    for step in 1..=200i64 {
        let keys: Vec<i64> = (0..12)
            .map(|_| {
                if rng.gen_bool(0.7) {
                    rng.gen_range(0..40)
                } else {
                    rng.gen_range(0..emb_max_num + 20)
                }
            })
            .collect();

        let result = cache
            .prefetch(&keys, step, |id, row| {
                let start = id as usize * width;
                row.copy_from_slice(&storage[start..start + width]);
            })
            .unwrap();
        assert!(result.is_resolved());

        for (id, row) in result.evicted(width) {
            let start = id as usize * width;
            storage[start..start + width].copy_from_slice(row);
        }

        // Training writes new values into the rows it used.
        let mut touched = Vec::new();
        let mut update = Vec::new();
        for (&key, &row) in keys.iter().zip(&result.cache_idx) {
            if key < emb_max_num && !touched.contains(&row) {
                touched.push(row);
                update.extend(std::iter::repeat(key as f32 + step as f32 * 1000.0).take(width));
            }
        }
        cache.update_cache(&touched, &update).unwrap();

        for (&key, &row) in keys.iter().zip(&result.cache_idx) {
            if key < emb_max_num {
                assert_eq!(cache.index().get(key).map(|s| s.value), Some(row));
            } else {
                assert_eq!(row, 32);
            }
        }
        cache.index().check_invariants().unwrap();
    }

    // Every resident row, written back, matches what training last wrote.
    let (index, table) = cache.into_parts();
    for (_, slot) in index.iter() {
        let row = table.row(slot.value as usize).unwrap();
        assert!(row.iter().all(|&v| v == row[0]));
        let id_part = row[0] % 1000.0;
        assert_eq!(id_part, slot.key as f32);
    }
}

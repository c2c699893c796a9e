use hnswam_core::config::META_PAGE_SIZE;
use hnswam_core::hnsw::node::layer_capacity;
use hnswam_core::{DistanceMetric, HnswError, HnswIndex, IndexOptions, TupleId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::path::Path;
use tempfile::TempDir;

/// `clusters` blobs of `per_cluster` points in `dim` dimensions.
fn clustered(clusters: usize, per_cluster: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let centers: Vec<Vec<f32>> = (0..clusters)
        .map(|_| (0..dim).map(|_| rng.gen_range(-50.0..50.0)).collect())
        .collect();
    let mut out = Vec::with_capacity(clusters * per_cluster);
    for _ in 0..per_cluster {
        for c in &centers {
            out.push(c.iter().map(|x| x + rng.gen_range(-2.0..2.0)).collect());
        }
    }
    out
}

fn rows(vectors: &[Vec<f32>]) -> impl Iterator<Item = (TupleId, &Vec<f32>)> {
    vectors.iter().enumerate().map(|(i, v)| (TupleId(i as u64), v))
}

fn options(m: usize, ef_construction: usize) -> IndexOptions {
    IndexOptions {
        m,
        ef_construction,
        ..IndexOptions::default()
    }
}

/// Check capacity, duplicate, self-reference and range invariants of every list.
fn assert_graph_invariants(index: &HnswIndex) {
    let stats = index.stats();
    let m = stats.options.m;
    for id in 0..stats.node_count as u32 {
        let node = index.read_node(id).unwrap();
        for (layer, list) in node.neighbors.iter().enumerate() {
            assert!(
                list.len() <= layer_capacity(m, layer),
                "node {id} layer {layer} holds {} neighbors",
                list.len()
            );
            let unique: HashSet<u32> = list.iter().copied().collect();
            assert_eq!(unique.len(), list.len(), "duplicate in node {id} layer {layer}");
            assert!(!list.contains(&id), "self-reference at node {id}");
            for &n in list {
                assert!((n as usize) < stats.node_count, "node {id} references {n}");
                let target = index.read_node(n).unwrap();
                assert!(target.max_layer() >= layer, "node {id} links {n} above its top layer");
            }
        }
    }
}

fn recall_at_k(index: &HnswIndex, queries: &[Vec<f32>], k: usize, ef: usize) -> f64 {
    let mut total = 0.0;
    for q in queries {
        let exact: HashSet<TupleId> = index
            .brute_force(q, k)
            .unwrap()
            .iter()
            .map(|h| h.tuple)
            .collect();
        let found = index
            .search(q, k, ef)
            .unwrap()
            .iter()
            .filter(|h| exact.contains(&h.tuple))
            .count();
        total += found as f64 / k as f64;
    }
    total / queries.len() as f64
}

// ── Scenario ──

#[test]
fn test_four_point_scenario() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("four.hnsw");
    let points: Vec<Vec<f32>> = vec![
        vec![0.0, 0.0],
        vec![1.0, 0.0],
        vec![0.0, 1.0],
        vec![10.0, 10.0],
    ];
    let (index, result) = HnswIndex::build(&path, options(4, 10), 2, rows(&points)).unwrap();
    assert_eq!(result.node_count, 4);
    assert_eq!(result.page_count, 5);

    let mut scan = index.begin_scan(&[0.0, 0.0], 1, 10).unwrap();
    let hit = scan.next_tuple().unwrap();
    assert_eq!(hit.tuple, TupleId(0));
    assert_eq!(hit.distance, 0.0);
    assert!(scan.next_tuple().is_none());
    scan.end_scan();

    let far: Vec<_> = index.begin_scan(&[9.0, 9.0], 1, 10).unwrap().collect();
    assert_eq!(far[0].tuple, TupleId(3));
    assert!((far[0].distance - 2.0f32.sqrt()).abs() < 1e-6);
}

// ── Recall ──

#[test]
fn test_clustered_self_recall() {
    let vectors = clustered(10, 100, 16, 7);
    let (index, _) = HnswIndex::build_in_memory(options(16, 64), 16, rows(&vectors)).unwrap();
    let hits = vectors
        .iter()
        .enumerate()
        .filter(|(i, v)| {
            let found = index.search(v, 1, 64).unwrap();
            found.first().map(|h| h.tuple) == Some(TupleId(*i as u64))
        })
        .count();
    let recall = hits as f64 / vectors.len() as f64;
    assert!(recall >= 0.95, "self recall {recall:.3}");
    assert_graph_invariants(&index);
}

#[test]
fn test_insert_order_independence() {
    let vectors = clustered(8, 60, 8, 11);
    let forward: Vec<(TupleId, Vec<f32>)> =
        vectors.iter().enumerate().map(|(i, v)| (TupleId(i as u64), v.clone())).collect();
    let mut backward = forward.clone();
    backward.reverse();

    let (a, _) = HnswIndex::build_in_memory(options(8, 64), 8, forward).unwrap();
    let (b, _) = HnswIndex::build_in_memory(options(8, 64), 8, backward).unwrap();

    let mut rng = StdRng::seed_from_u64(3);
    let queries: Vec<Vec<f32>> = (0..40)
        .map(|_| {
            let base = &vectors[rng.gen_range(0..vectors.len())];
            base.iter().map(|x| x + rng.gen_range(-1.0..1.0)).collect()
        })
        .collect();
    let ra = recall_at_k(&a, &queries, 10, 64);
    let rb = recall_at_k(&b, &queries, 10, 64);
    assert!(ra >= 0.9 && rb >= 0.9, "recall {ra:.3} / {rb:.3}");
    assert!((ra - rb).abs() <= 0.1);
}

#[test]
fn test_incremental_inserts_match_build_quality() {
    let vectors = clustered(5, 80, 8, 21);
    let (index, _) = HnswIndex::build_in_memory(options(8, 48), 8, rows(&vectors[..1])).unwrap();
    for (i, v) in vectors.iter().enumerate().skip(1) {
        index.insert(TupleId(i as u64), v).unwrap();
    }
    assert_eq!(index.stats().node_count, vectors.len());
    assert_graph_invariants(&index);
    let recall = recall_at_k(&index, &vectors[..50], 5, 48);
    assert!(recall >= 0.9, "recall {recall:.3}");
}

// ── Persistence ──

#[test]
fn test_reopen_reproduces_graph() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("idx.hnsw");
    let vectors = clustered(4, 50, 6, 5);
    let opts = IndexOptions {
        metric: DistanceMetric::Cosine,
        random_seed: 99,
        ..options(6, 32)
    };
    let (index, _) = HnswIndex::build(&path, opts.clone(), 6, rows(&vectors)).unwrap();
    index.insert(TupleId(10_000), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let before_stats = index.stats();
    let before: Vec<_> = (0..before_stats.node_count as u32)
        .map(|id| index.read_node(id).unwrap())
        .collect();
    let before_hits = index.search(&vectors[17], 5, 32).unwrap();
    drop(index);

    let reopened = HnswIndex::open(&path).unwrap();
    let stats = reopened.stats();
    assert_eq!(stats.options, opts);
    assert_eq!(stats.node_count, before_stats.node_count);
    assert_eq!(stats.entry_point, before_stats.entry_point);
    for node in &before {
        let again = reopened.read_node(node.id).unwrap();
        assert_eq!(&again, node);
        let same_bits = again
            .vector
            .iter()
            .zip(&node.vector)
            .all(|(a, b)| a.to_bits() == b.to_bits());
        assert!(same_bits);
    }
    assert_eq!(reopened.search(&vectors[17], 5, 32).unwrap(), before_hits);
}

#[test]
fn test_failed_build_leaves_unpublished_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partial.hnsw");
    let mut vectors = clustered(2, 10, 3, 1);
    vectors[12][1] = f32::NAN;
    let err = HnswIndex::build(&path, options(4, 16), 3, rows(&vectors)).unwrap_err();
    assert!(matches!(err, HnswError::InvalidVector(_)));
    assert!(path.exists());
    assert!(matches!(HnswIndex::open(&path), Err(HnswError::Unpublished)));
}

fn flip_byte(path: &Path, offset: usize) {
    let mut bytes = std::fs::read(path).unwrap();
    bytes[offset] ^= 0x5A;
    std::fs::write(path, bytes).unwrap();
}

#[test]
fn test_corrupt_node_page_detected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("idx.hnsw");
    let vectors = clustered(2, 20, 4, 2);
    drop(HnswIndex::build(&path, options(4, 16), 4, rows(&vectors)).unwrap());

    flip_byte(&path, META_PAGE_SIZE + 24);
    assert!(matches!(
        HnswIndex::open(&path),
        Err(HnswError::CorruptPage { .. })
    ));
}

#[test]
fn test_corrupt_meta_page_detected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("idx.hnsw");
    let vectors = clustered(2, 5, 4, 2);
    drop(HnswIndex::build(&path, options(4, 16), 4, rows(&vectors)).unwrap());

    flip_byte(&path, 20);
    assert!(matches!(
        HnswIndex::open(&path),
        Err(HnswError::CorruptPage { offset: 0, .. })
    ));
}

// ── Validation ──

#[test]
fn test_rejected_insert_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("idx.hnsw");
    let vectors = clustered(2, 10, 4, 9);
    let (index, _) = HnswIndex::build(&path, options(4, 16), 4, rows(&vectors)).unwrap();
    let before = index.stats();
    let file_before = std::fs::read(&path).unwrap();

    assert!(matches!(
        index.insert(TupleId(50), &[1.0, 2.0]),
        Err(HnswError::DimensionMismatch { expected: 4, actual: 2 })
    ));
    assert!(matches!(
        index.insert(TupleId(51), &[1.0, f32::INFINITY, 0.0, 0.0]),
        Err(HnswError::InvalidVector(_))
    ));
    assert_eq!(index.stats(), before);
    assert_eq!(std::fs::read(&path).unwrap(), file_before);
}

#[test]
fn test_cosine_rejects_zero_vector() {
    let (index, _) = HnswIndex::build_in_memory(
        IndexOptions {
            metric: DistanceMetric::Cosine,
            ..options(4, 16)
        },
        2,
        [(TupleId(0), [1.0f32, 0.0])],
    )
    .unwrap();
    assert!(matches!(
        index.insert(TupleId(1), &[0.0, 0.0]),
        Err(HnswError::InvalidVector(_))
    ));
    assert!(matches!(
        index.begin_scan(&[0.0, 0.0], 1, 10),
        Err(HnswError::InvalidVector(_))
    ));
}

// ── Delete and vacuum ──

#[test]
fn test_delete_vacuum_invariants_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("idx.hnsw");
    let vectors = clustered(6, 50, 8, 13);
    let (index, _) = HnswIndex::build(&path, options(6, 48), 8, rows(&vectors)).unwrap();

    let dead = |t: TupleId| t.0 % 10 < 3;
    let deleted = index.bulk_delete(dead).unwrap();
    assert_eq!(deleted.tuples_removed, 90);
    assert_eq!(deleted.num_index_tuples, 210);

    // Tombstoned tuples are invisible before vacuum.
    for v in vectors.iter().take(30) {
        for hit in index.search(v, 10, 48).unwrap() {
            assert!(!dead(hit.tuple));
        }
    }

    let stats = index.vacuum_cleanup().unwrap();
    assert_eq!(stats.nodes_reclaimed, 90);
    assert_eq!(stats.num_index_tuples, 210);
    assert_eq!(stats.num_pages, 211);
    assert!(stats.short_lists <= stats.lists_repaired);
    assert_graph_invariants(&index);
    drop(index);

    let reopened = HnswIndex::open(&path).unwrap();
    assert_eq!(reopened.stats().node_count, 210);
    assert_eq!(reopened.stats().tombstones, 0);
    assert_graph_invariants(&reopened);
    let survivors: HashSet<TupleId> = (0..210u32)
        .map(|id| reopened.read_node(id).unwrap().tuple)
        .collect();
    assert!(survivors.iter().all(|&t| !dead(t)));
    assert_eq!(survivors.len(), 210);

    let live: Vec<Vec<f32>> = vectors
        .iter()
        .enumerate()
        .filter(|(i, _)| !dead(TupleId(*i as u64)))
        .map(|(_, v)| v.clone())
        .take(40)
        .collect();
    let recall = recall_at_k(&reopened, &live, 5, 48);
    assert!(recall >= 0.9, "recall after vacuum {recall:.3}");

    // The index keeps accepting inserts after renumbering.
    let id = reopened.insert(TupleId(777), &vectors[0]).unwrap();
    assert_eq!(id, 210);
    let hit = reopened.search(&vectors[0], 1, 48).unwrap();
    assert_eq!(hit[0].tuple, TupleId(777));
}

#[test]
fn test_failed_vacuum_keeps_index_usable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("idx.hnsw");
    let points: Vec<Vec<f32>> = (0..30).map(|i| vec![i as f32, 0.0]).collect();
    let (index, _) = HnswIndex::build(&path, options(4, 32), 2, rows(&points)).unwrap();
    index.bulk_delete(|t| t.0 < 25).unwrap();

    let tmp_path = dir.path().join("idx.hnsw.tmp");
    std::fs::create_dir(&tmp_path).unwrap();
    assert!(matches!(index.vacuum_cleanup(), Err(HnswError::Io(_))));

    let stats = index.stats();
    assert_eq!((stats.node_count, stats.tombstones, stats.live_count), (30, 25, 5));
    let hits = index.search(&[27.0, 0.0], 3, 64).unwrap();
    let found: HashSet<TupleId> = hits.iter().map(|h| h.tuple).collect();
    assert_eq!(found, HashSet::from([TupleId(26), TupleId(27), TupleId(28)]));

    let id = index.insert(TupleId(30), &[30.0, 0.0]).unwrap();
    assert_eq!(id, 30);
    drop(index);

    std::fs::remove_dir(&tmp_path).unwrap();
    let reopened = HnswIndex::open(&path).unwrap();
    assert_eq!(reopened.stats().node_count, 31);
    let stats = reopened.vacuum_cleanup().unwrap();
    assert_eq!(stats.nodes_reclaimed, 25);
    assert_eq!(stats.num_index_tuples, 6);
    assert_graph_invariants(&reopened);
    let hit = reopened.search(&[30.0, 0.0], 1, 16).unwrap();
    assert_eq!(hit[0].tuple, TupleId(30));
}

#[test]
fn test_insert_after_deleting_everything_is_searchable() {
    let points: Vec<Vec<f32>> = (0..20).map(|i| vec![i as f32 * 0.5, (i % 3) as f32]).collect();
    let (index, _) = HnswIndex::build_in_memory(options(4, 16), 2, rows(&points)).unwrap();
    index.bulk_delete(|_| true).unwrap();
    assert!(index.search(&[5.0, 0.5], 1, 16).unwrap().is_empty());

    index.insert(TupleId(99), &[5.0, 0.5]).unwrap();
    let hits = index.search(&[5.0, 0.5], 1, 16).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].tuple, TupleId(99));
}

use std::cell::Cell;
use std::sync::Arc;

use ingredient_matrix::cache::{ArtifactCache, Cacheable};
use ingredient_matrix::projection::{
    ClusterAssignment, ClusterProjector, EmbeddingParams, Embedder, KMeansPartitioner,
    Partitioner, ProjectionError, CLUSTERING_NAMESPACE,
};
use ingredient_matrix::selection::SubsetSelector;
use ingredient_matrix::types::{CooccurrenceMatrix, FrequencyTable};
use tempfile::tempdir;

/// Places row `i` at `(i, first feature)` and records what it was given.
#[derive(Default)]
struct LineEmbedder {
    calls: Cell<usize>,
    last_perplexity: Cell<f64>,
}

impl Embedder for LineEmbedder {
    fn embed(&self, rows: &[Vec<f64>], params: &EmbeddingParams) -> Result<Vec<[f64; 2]>, ProjectionError> {
        self.calls.set(self.calls.get() + 1);
        self.last_perplexity.set(params.perplexity);
        Ok(rows
            .iter()
            .enumerate()
            .map(|(i, r)| [i as f64, r.first().copied().unwrap_or(0.0)])
            .collect())
    }
}

/// Alternates labels `0..k`.
struct RoundRobin;

impl Partitioner for RoundRobin {
    fn partition(&self, rows: &[Vec<f64>], k: usize, _seed: u64) -> Result<Vec<usize>, ProjectionError> {
        Ok((0..rows.len()).map(|i| i % k).collect())
    }
}

/// Two blocks of five ingredients that only co-occur within their block.
fn two_block_matrix() -> CooccurrenceMatrix {
    let labels: Vec<String> = (0..10).map(|i| format!("ing{}", i)).collect();
    let mut values = Vec::with_capacity(100);
    for i in 0..10 {
        for j in 0..10 {
            values.push(if i / 5 == j / 5 { 100 } else { 0 });
        }
    }
    CooccurrenceMatrix::new(labels, values).unwrap()
}

#[test]
fn invariant_kmeans_separates_disjoint_blocks() {
    let projector = ClusterProjector::with_embedder(LineEmbedder::default());
    let assignment = projector.cluster(&two_block_matrix(), 2).unwrap();

    assert_eq!(assignment.labels.len(), 10);
    assert_eq!(assignment.n_clusters, 2);
    assert!(assignment.labels[..5].iter().all(|&l| l == assignment.labels[0]));
    assert!(assignment.labels[5..].iter().all(|&l| l == assignment.labels[5]));
    assert_ne!(assignment.labels[0], assignment.labels[5]);
}

#[test]
fn invariant_kmeans_is_seeded() {
    let rows = two_block_matrix().feature_rows();
    let a = KMeansPartitioner::default().partition(&rows, 2, 42).unwrap();
    let b = KMeansPartitioner::default().partition(&rows, 2, 42).unwrap();
    assert_eq!(a, b);
}

#[test]
fn invariant_best_of_several_fits_is_no_worse_than_one() {
    use ingredient_matrix::projection::kmeans::inertia;

    let rows = two_block_matrix().feature_rows();
    let single = KMeansPartitioner::default().with_n_init(1).partition(&rows, 2, 7).unwrap();
    let several = KMeansPartitioner::default().with_n_init(5).partition(&rows, 2, 7).unwrap();

    assert!(inertia(&rows, &several) <= inertia(&rows, &single));
    assert_eq!(inertia(&rows, &several), 0.0);
}

#[test]
fn invariant_cluster_count_must_fit_rows() {
    let projector = ClusterProjector::new(RoundRobin, LineEmbedder::default());
    let m = two_block_matrix();

    assert!(matches!(
        projector.cluster(&m, 11),
        Err(ProjectionError::InvalidClusterCount { k: 11, rows: 10 })
    ));
    assert!(matches!(
        projector.cluster(&m, 0),
        Err(ProjectionError::InvalidClusterCount { k: 0, .. })
    ));
    assert!(matches!(
        projector.cluster(&CooccurrenceMatrix::empty(), 1),
        Err(ProjectionError::EmptyMatrix)
    ));
}

#[test]
fn invariant_perplexity_is_clamped_and_echoed() {
    let projector = ClusterProjector::new(RoundRobin, LineEmbedder::default());
    let m = two_block_matrix();
    let assignment = projector.cluster(&m, 2).unwrap();

    let projection = projector.project(&m, &assignment, 30.0).unwrap();

    assert_eq!(projection.params.perplexity, 9.0);
    assert_eq!(projection.params.requested_perplexity, 30.0);
    assert_eq!(projection.params.random_state, 42);
    assert_eq!(projection.params.max_iter, 1000);
    assert_eq!(projection.params.method, "tsne");
    assert_eq!(projection.n_clusters, 2);
    assert_eq!(projector.embedder().last_perplexity.get(), 9.0);

    let p3 = &projection.points[3];
    assert_eq!(p3.ingredient, "ing3");
    assert_eq!((p3.x, p3.y), (3.0, 100.0));
    assert_eq!(p3.cluster, 1);
}

#[test]
fn invariant_small_perplexity_passes_through() {
    let embedder = LineEmbedder::default();
    let projector = ClusterProjector::new(RoundRobin, embedder);
    let m = two_block_matrix();
    let assignment = projector.cluster(&m, 2).unwrap();

    let projection = projector.project(&m, &assignment, 5.0).unwrap();
    assert_eq!(projection.params.perplexity, 5.0);
}

#[test]
fn project_rejects_mismatched_labels() {
    let projector = ClusterProjector::new(RoundRobin, LineEmbedder::default());
    let err = projector
        .project(&two_block_matrix(), &ClusterAssignment::new(vec![0, 1]), 5.0)
        .unwrap_err();
    assert!(matches!(
        err,
        ProjectionError::LabelCountMismatch {
            expected: 10,
            actual: 2
        }
    ));
}

#[test]
fn project_rejects_non_positive_perplexity() {
    let projector = ClusterProjector::new(RoundRobin, LineEmbedder::default());
    let m = two_block_matrix();
    let assignment = projector.cluster(&m, 2).unwrap();
    assert!(matches!(
        projector.project(&m, &assignment, 0.0),
        Err(ProjectionError::InvalidPerplexity(_))
    ));
}

#[test]
fn analyze_is_cached_per_parameters() {
    let dir = tempdir().unwrap();
    let cache = Arc::new(ArtifactCache::new(dir.path()).unwrap());
    let projector = ClusterProjector::new(RoundRobin, LineEmbedder::default()).with_cache(cache.clone());

    let m = two_block_matrix();
    let freq = FrequencyTable::from_pairs(m.labels().iter().map(|l| (l.clone(), 1)));
    let selection = SubsetSelector::new().select(&m, &freq, 10).unwrap();

    let first = projector.analyze(&selection, 2, 5.0).unwrap();
    let second = projector.analyze(&selection, 2, 5.0).unwrap();
    assert_eq!(first, second);
    assert_eq!(projector.embedder().calls.get(), 1);
    assert_eq!(projector.cache_info().unwrap().entries, 1);

    projector.analyze(&selection, 3, 5.0).unwrap();
    let info = cache.info();
    assert_eq!(info.namespaces[CLUSTERING_NAMESPACE].operations["analyze"].entries, 2);

    assert_eq!(projector.clear_cache(None), 2);
}

#[test]
fn analyze_failures_are_not_cached() {
    let dir = tempdir().unwrap();
    let cache = Arc::new(ArtifactCache::new(dir.path()).unwrap());
    let projector = ClusterProjector::new(RoundRobin, LineEmbedder::default()).with_cache(cache.clone());

    let m = two_block_matrix();
    let freq = FrequencyTable::from_pairs(m.labels().iter().map(|l| (l.clone(), 1)));
    let selection = SubsetSelector::new().select(&m, &freq, 10).unwrap();

    assert!(projector.analyze(&selection, 50, 5.0).is_err());
    assert_eq!(cache.info().total_entries, 0);
}

#[test]
fn disabled_cache_recomputes() {
    let dir = tempdir().unwrap();
    let cache = Arc::new(ArtifactCache::new(dir.path()).unwrap());
    let mut projector = ClusterProjector::new(RoundRobin, LineEmbedder::default()).with_cache(cache);
    if let Some(handle) = projector.cache_handle_mut() {
        handle.set_enabled(false);
    }

    let m = two_block_matrix();
    let freq = FrequencyTable::from_pairs(m.labels().iter().map(|l| (l.clone(), 1)));
    let selection = SubsetSelector::new().select(&m, &freq, 10).unwrap();

    projector.analyze(&selection, 2, 5.0).unwrap();
    projector.analyze(&selection, 2, 5.0).unwrap();
    assert_eq!(projector.embedder().calls.get(), 2);
    assert_eq!(projector.cache_info().unwrap().entries, 0);
}

pub mod kmeans;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::cache::{ArtifactCache, CacheHandle, Cacheable};
use crate::types::matrix::CooccurrenceMatrix;
use crate::types::selection::SelectionResult;
pub use kmeans::KMeansPartitioner;

pub const DEFAULT_RANDOM_STATE: u64 = 42;
pub const DEFAULT_EMBEDDING_MAX_ITER: usize = 1000;
pub const CLUSTERING_NAMESPACE: &str = "clustering";

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Matrix has no rows")]
    EmptyMatrix,
    #[error("Cannot form {k} clusters from {rows} rows")]
    InvalidClusterCount { k: usize, rows: usize },
    #[error("Expected {expected} cluster labels, got {actual}")]
    LabelCountMismatch { expected: usize, actual: usize },
    #[error("Perplexity must be positive, got {0}")]
    InvalidPerplexity(f64),
    #[error("Partitioning failed: {0}")]
    Partition(String),
    #[error("Embedding failed: {0}")]
    Embedding(String),
}

/// Splits feature rows into `k` groups.
pub trait Partitioner {
    fn partition(&self, rows: &[Vec<f64>], k: usize, seed: u64) -> Result<Vec<usize>, ProjectionError>;
}

/// Maps feature rows to 2D coordinates, one point per row.
pub trait Embedder {
    fn method(&self) -> &str {
        "tsne"
    }

    fn embed(&self, rows: &[Vec<f64>], params: &EmbeddingParams) -> Result<Vec<[f64; 2]>, ProjectionError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    /// One cluster id per matrix row.
    pub labels: Vec<usize>,
    /// Distinct ids actually used.
    pub n_clusters: usize,
}

impl ClusterAssignment {
    pub fn new(labels: Vec<usize>) -> Self {
        let mut distinct = labels.clone();
        distinct.sort_unstable();
        distinct.dedup();
        Self {
            n_clusters: distinct.len(),
            labels,
        }
    }

    /// Row count per cluster id, indexed by id.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let len = self.labels.iter().max().map_or(0, |m| m + 1);
        let mut sizes = vec![0; len];
        for &l in &self.labels {
            sizes[l] += 1;
        }
        sizes
    }

    /// Names of the rows assigned to `cluster`, in row order.
    pub fn members<'a>(&self, cluster: usize, names: &'a [String]) -> Vec<&'a str> {
        self.labels
            .iter()
            .zip(names)
            .filter(|&(&l, _)| l == cluster)
            .map(|(_, name)| name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingParams {
    /// Value handed to the embedder.
    pub perplexity: f64,
    pub requested_perplexity: f64,
    pub max_iter: usize,
    pub random_state: u64,
    pub method: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedPoint {
    pub ingredient: String,
    pub x: f64,
    pub y: f64,
    pub cluster: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub points: Vec<ProjectedPoint>,
    pub n_clusters: usize,
    pub params: EmbeddingParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAnalysis {
    pub assignment: ClusterAssignment,
    pub projection: Projection,
}

/// Perplexity must stay below the number of points.
pub fn effective_perplexity(requested: f64, rows: usize) -> f64 {
    let ceiling = rows.saturating_sub(1) as f64;
    if requested >= rows as f64 {
        ceiling
    } else {
        requested
    }
}

/// Groups the selected ingredients and lays them out in 2D.
pub struct ClusterProjector<P, E> {
    partitioner: P,
    embedder: E,
    random_state: u64,
    max_iter: usize,
    cache: Option<CacheHandle>,
}

impl<E: Embedder> ClusterProjector<KMeansPartitioner, E> {
    pub fn with_embedder(embedder: E) -> Self {
        Self::new(KMeansPartitioner::default(), embedder)
    }
}

impl<P: Partitioner, E: Embedder> ClusterProjector<P, E> {
    pub fn new(partitioner: P, embedder: E) -> Self {
        Self {
            partitioner,
            embedder,
            random_state: DEFAULT_RANDOM_STATE,
            max_iter: DEFAULT_EMBEDDING_MAX_ITER,
            cache: None,
        }
    }

    pub fn with_random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Cache `analyze` results under the `clustering` namespace.
    pub fn with_cache(mut self, cache: Arc<ArtifactCache>) -> Self {
        self.cache = Some(CacheHandle::new(cache, CLUSTERING_NAMESPACE));
        self
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn cache_handle_mut(&mut self) -> Option<&mut CacheHandle> {
        self.cache.as_mut()
    }

    pub fn cluster(&self, matrix: &CooccurrenceMatrix, k: usize) -> Result<ClusterAssignment, ProjectionError> {
        let rows = matrix.len();
        if rows == 0 {
            return Err(ProjectionError::EmptyMatrix);
        }
        if k == 0 || k > rows {
            return Err(ProjectionError::InvalidClusterCount { k, rows });
        }

        let labels = self
            .partitioner
            .partition(&matrix.feature_rows(), k, self.random_state)?;
        if labels.len() != rows {
            return Err(ProjectionError::Partition(format!(
                "partitioner returned {} labels for {} rows",
                labels.len(),
                rows
            )));
        }

        let assignment = ClusterAssignment::new(labels);
        info!(
            k,
            rows,
            sizes = ?assignment.cluster_sizes(),
            "Clustering complete"
        );
        Ok(assignment)
    }

    pub fn project(
        &self,
        matrix: &CooccurrenceMatrix,
        assignment: &ClusterAssignment,
        perplexity: f64,
    ) -> Result<Projection, ProjectionError> {
        let rows = matrix.len();
        if rows == 0 {
            return Err(ProjectionError::EmptyMatrix);
        }
        if assignment.labels.len() != rows {
            return Err(ProjectionError::LabelCountMismatch {
                expected: rows,
                actual: assignment.labels.len(),
            });
        }
        if !(perplexity.is_finite() && perplexity > 0.0) {
            return Err(ProjectionError::InvalidPerplexity(perplexity));
        }

        let effective = effective_perplexity(perplexity, rows);
        if effective != perplexity {
            warn!(requested = perplexity, effective, rows, "Perplexity clamped");
        }
        let params = EmbeddingParams {
            perplexity: effective,
            requested_perplexity: perplexity,
            max_iter: self.max_iter,
            random_state: self.random_state,
            method: self.embedder.method().to_string(),
        };

        let coords = self.embedder.embed(&matrix.feature_rows(), &params)?;
        if coords.len() != rows {
            return Err(ProjectionError::Embedding(format!(
                "embedder returned {} points for {} rows",
                coords.len(),
                rows
            )));
        }

        let points = matrix
            .labels()
            .iter()
            .zip(coords)
            .zip(&assignment.labels)
            .map(|((ingredient, [x, y]), &cluster)| ProjectedPoint {
                ingredient: ingredient.clone(),
                x,
                y,
                cluster,
            })
            .collect();

        Ok(Projection {
            points,
            n_clusters: assignment.n_clusters,
            params,
        })
    }

    /// Cluster then project a selection; cached when a handle is attached.
    pub fn analyze(
        &self,
        selection: &SelectionResult,
        k: usize,
        perplexity: f64,
    ) -> Result<ClusterAnalysis, ProjectionError> {
        let matrix = &selection.sub_matrix;
        let params = json!({
            "labels": matrix.labels(),
            "matrix": matrix_digest(matrix),
            "k": k,
            "perplexity": perplexity,
            "random_state": self.random_state,
            "max_iter": self.max_iter,
            "method": self.embedder.method(),
        });

        self.try_cached::<ClusterAnalysis, ProjectionError, _>("analyze", Some(&params), || {
            let assignment = self.cluster(matrix, k)?;
            let projection = self.project(matrix, &assignment, perplexity)?;
            Ok(ClusterAnalysis {
                assignment,
                projection,
            })
        })
    }
}

impl<P: Partitioner, E: Embedder> Cacheable for ClusterProjector<P, E> {
    fn cache_handle(&self) -> Option<&CacheHandle> {
        self.cache.as_ref()
    }

    fn default_cache_params(&self) -> serde_json::Value {
        json!({
            "random_state": self.random_state,
            "max_iter": self.max_iter,
        })
    }
}

/// SHA-256 over the labels and cell values, hex encoded.
pub fn matrix_digest(matrix: &CooccurrenceMatrix) -> String {
    let mut hasher = Sha256::new();
    for label in matrix.labels() {
        hasher.update(label.as_bytes());
        hasher.update([0u8]);
    }
    for v in matrix.values() {
        hasher.update(v.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

use smartcore::cluster::kmeans::{KMeans, KMeansParameters};
use smartcore::linalg::basic::arrays::Array2;
use smartcore::linalg::basic::matrix::DenseMatrix;
use tracing::debug;

use crate::projection::{Partitioner, ProjectionError};

const DEFAULT_KMEANS_MAX_ITER: usize = 300;
const DEFAULT_N_INIT: usize = 10;

/// Seeded Lloyd k-means over the matrix rows.
///
/// Runs `n_init` fits from seeds derived from the caller's seed and keeps the
/// one with the lowest inertia. Equal inertia keeps the earlier fit.
#[derive(Debug, Clone, Copy)]
pub struct KMeansPartitioner {
    max_iter: usize,
    n_init: usize,
}

impl Default for KMeansPartitioner {
    fn default() -> Self {
        Self {
            max_iter: DEFAULT_KMEANS_MAX_ITER,
            n_init: DEFAULT_N_INIT,
        }
    }
}

impl KMeansPartitioner {
    pub fn new(max_iter: usize) -> Self {
        Self {
            max_iter,
            ..Self::default()
        }
    }

    /// Number of fits to try; at least one always runs.
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init.max(1);
        self
    }

    pub fn n_init(&self) -> usize {
        self.n_init
    }

    fn fit_once(&self, x: &DenseMatrix<f64>, k: usize, seed: u64) -> Result<Vec<usize>, ProjectionError> {
        let params = KMeansParameters {
            k,
            max_iter: self.max_iter,
            seed: Some(seed),
        };
        let km = KMeans::fit(x, params).map_err(|e| ProjectionError::Partition(e.to_string()))?;
        km.predict(x)
            .map_err(|e| ProjectionError::Partition(e.to_string()))
    }
}

impl Partitioner for KMeansPartitioner {
    fn partition(&self, rows: &[Vec<f64>], k: usize, seed: u64) -> Result<Vec<usize>, ProjectionError> {
        let n = rows.len();
        let f = rows.first().map_or(0, Vec::len);
        if n == 0 || f == 0 {
            return Err(ProjectionError::EmptyMatrix);
        }
        debug_assert!(rows.iter().all(|r| r.len() == f), "ragged feature rows");

        // Row-major
        let x: DenseMatrix<f64> =
            DenseMatrix::from_iterator(rows.iter().flatten().copied(), n, f, 0);

        let mut best: Option<(f64, Vec<usize>)> = None;
        for trial in 0..self.n_init.max(1) {
            let trial_seed = seed.wrapping_add(trial as u64);
            let labels = self.fit_once(&x, k, trial_seed)?;
            let score = inertia(rows, &labels);
            debug!(trial, seed = trial_seed, inertia = score, "k-means fit");
            if best.as_ref().map_or(true, |(b, _)| score < *b) {
                best = Some((score, labels));
            }
        }

        best.map(|(_, labels)| labels)
            .ok_or_else(|| ProjectionError::Partition("no k-means fit ran".to_string()))
    }
}

/// Sum of squared distances from each row to the mean of its cluster.
pub fn inertia(rows: &[Vec<f64>], labels: &[usize]) -> f64 {
    let f = rows.first().map_or(0, Vec::len);
    let k = labels.iter().max().map_or(0, |m| m + 1);
    let mut sums = vec![vec![0.0; f]; k];
    let mut counts = vec![0usize; k];
    for (row, &label) in rows.iter().zip(labels) {
        counts[label] += 1;
        for (s, v) in sums[label].iter_mut().zip(row) {
            *s += v;
        }
    }
    for (sum, &count) in sums.iter_mut().zip(&counts) {
        if count > 0 {
            sum.iter_mut().for_each(|s| *s /= count as f64);
        }
    }

    rows.iter()
        .zip(labels)
        .map(|(row, &label)| {
            row.iter()
                .zip(&sums[label])
                .map(|(v, c)| (v - c) * (v - c))
                .sum::<f64>()
        })
        .sum()
}

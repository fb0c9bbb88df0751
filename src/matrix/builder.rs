use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::ingredient::{read_recipes, NormalizedRecipe, RawRecipe, RecipeSourceError};
use crate::matrix::io::{write_frequencies, write_matrix, FREQUENCY_FILE_NAME, MATRIX_FILE_NAME};
use crate::types::matrix::{CooccurrenceMatrix, FrequencyTable};

const PROGRESS_EVERY: usize = 10_000;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Source(#[from] RecipeSourceError),
    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error writing {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Corpus-level figures gathered while building.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildStats {
    pub recipes: usize,
    pub mentions_before: usize,
    pub mentions_after: usize,
    pub reduction_percent: f64,
    pub unique_ingredients: usize,
    pub max_frequency: u64,
    pub min_selected_frequency: u64,
    pub matrix_max: u64,
    pub matrix_mean: f64,
    pub diagonal_mean: f64,
}

#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub matrix: CooccurrenceMatrix,
    /// Selected ingredients with their counts, in matrix row order.
    pub frequencies: FrequencyTable,
    pub stats: BuildStats,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub matrix: PathBuf,
    pub frequencies: PathBuf,
}

/// Offline builder for the co-occurrence matrix.
///
/// Single-threaded; run it as an exclusive step. Concurrent runs against the
/// same output directory are not coordinated.
pub struct MatrixBuilder {
    top_n: usize,
}

impl MatrixBuilder {
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.top_n)
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    pub fn build(&self, recipes: &[RawRecipe]) -> BuildOutput {
        info!(recipes = recipes.len(), top_n = self.top_n, "Building co-occurrence matrix");

        // 1. Normalize and dedup within each recipe
        let mut mentions_before = 0;
        let normalized: Vec<NormalizedRecipe> = recipes
            .iter()
            .enumerate()
            .map(|(idx, recipe)| {
                if idx > 0 && idx % PROGRESS_EVERY == 0 {
                    info!("Normalizing: {}/{} recipes", idx, recipes.len());
                }
                mentions_before += recipe.ingredients.len();
                recipe.normalized()
            })
            .collect();
        let mentions_after: usize = normalized.iter().map(|r| r.ingredients.len()).sum();

        // 2. Global counts and top-N
        let counts = count_frequencies(&normalized);
        let top = select_top(&counts, self.top_n);

        // 3. Matrix over the selected labels
        let labels: Vec<String> = top.iter().map(|(label, _)| label.clone()).collect();
        let matrix = count_cooccurrences(&normalized, labels);

        let values = matrix.values();
        let diagonal = matrix.diagonal();
        let stats = BuildStats {
            recipes: recipes.len(),
            mentions_before,
            mentions_after,
            reduction_percent: if mentions_before == 0 {
                0.0
            } else {
                (1.0 - mentions_after as f64 / mentions_before as f64) * 100.0
            },
            unique_ingredients: counts.len(),
            max_frequency: top.first().map(|(_, c)| *c).unwrap_or(0),
            min_selected_frequency: top.last().map(|(_, c)| *c).unwrap_or(0),
            matrix_max: values.iter().copied().max().unwrap_or(0),
            matrix_mean: mean(values.iter().copied()),
            diagonal_mean: mean(diagonal.iter().copied()),
        };

        info!(
            unique = stats.unique_ingredients,
            selected = matrix.len(),
            max_value = stats.matrix_max,
            reduction_percent = stats.reduction_percent,
            "Matrix built"
        );

        BuildOutput {
            matrix,
            frequencies: FrequencyTable::from_pairs(top),
            stats,
        }
    }

    /// Read a recipe source, build, and persist both artifacts.
    ///
    /// The source is read completely before anything is written.
    pub fn run(&self, source: &Path, output_dir: &Path) -> Result<(BuildOutput, ArtifactPaths), BuildError> {
        let batch = read_recipes(source)?;
        if batch.malformed_rows > 0 {
            warn!(
                malformed = batch.malformed_rows,
                "Some ingredient lists could not be parsed and were treated as empty"
            );
        }
        let output = self.build(&batch.recipes);
        let paths = write_artifacts(&output, output_dir)?;
        Ok((output, paths))
    }
}

/// Count how many recipes contain each canonical ingredient.
///
/// Returned in first-seen order; this order breaks frequency ties.
pub fn count_frequencies(recipes: &[NormalizedRecipe]) -> Vec<(String, u64)> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<(String, u64)> = Vec::new();
    for recipe in recipes {
        for ingredient in &recipe.ingredients {
            match positions.get(ingredient.as_str()) {
                Some(&pos) => counts[pos].1 += 1,
                None => {
                    positions.insert(ingredient.as_str(), counts.len());
                    counts.push((ingredient.clone(), 1));
                }
            }
        }
    }
    counts
}

/// The `n` most frequent entries, equal counts kept in input order.
pub fn select_top(counts: &[(String, u64)], n: usize) -> Vec<(String, u64)> {
    let mut ranked = counts.to_vec();
    // stable sort
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(n);
    ranked
}

/// Symmetric pair counts over `labels`; the diagonal counts recipes
/// containing the ingredient.
pub fn count_cooccurrences(recipes: &[NormalizedRecipe], labels: Vec<String>) -> CooccurrenceMatrix {
    let n = labels.len();
    let index: HashMap<&str, usize> = labels
        .iter()
        .enumerate()
        .map(|(i, label)| (label.as_str(), i))
        .collect();

    let mut values = vec![0u64; n * n];
    for (idx, recipe) in recipes.iter().enumerate() {
        if idx > 0 && idx % PROGRESS_EVERY == 0 {
            info!("Counting pairs: {}/{} recipes", idx, recipes.len());
        }

        let present: Vec<usize> = recipe
            .ingredients
            .iter()
            .filter_map(|ing| index.get(ing.as_str()).copied())
            .collect();

        for (pos, &a) in present.iter().enumerate() {
            for &b in &present[pos..] {
                values[a * n + b] += 1;
                if a != b {
                    values[b * n + a] += 1;
                }
            }
        }
    }
    drop(index);

    CooccurrenceMatrix::from_trusted(labels, values)
}

/// Write both artifacts into `output_dir` via temporary files and renames.
pub fn write_artifacts(output: &BuildOutput, output_dir: &Path) -> Result<ArtifactPaths, BuildError> {
    fs::create_dir_all(output_dir).map_err(io_error(output_dir))?;

    let paths = ArtifactPaths {
        matrix: output_dir.join(MATRIX_FILE_NAME),
        frequencies: output_dir.join(FREQUENCY_FILE_NAME),
    };
    let tmp_matrix = paths.matrix.with_extension("csv.tmp");
    let tmp_frequencies = paths.frequencies.with_extension("csv.tmp");

    let result = write_both(output, &paths, &tmp_matrix, &tmp_frequencies);
    if result.is_err() {
        let _ = fs::remove_file(&tmp_matrix);
        let _ = fs::remove_file(&tmp_frequencies);
    }
    result?;

    info!(
        matrix = %paths.matrix.display(),
        frequencies = %paths.frequencies.display(),
        "Artifacts written"
    );
    Ok(paths)
}

fn write_both(
    output: &BuildOutput,
    paths: &ArtifactPaths,
    tmp_matrix: &Path,
    tmp_frequencies: &Path,
) -> Result<(), BuildError> {
    let f = fs::File::create(tmp_matrix).map_err(io_error(tmp_matrix))?;
    write_matrix(&output.matrix, &f).map_err(|source| BuildError::Csv {
        path: paths.matrix.clone(),
        source,
    })?;
    f.sync_all().map_err(io_error(tmp_matrix))?;

    let f = fs::File::create(tmp_frequencies).map_err(io_error(tmp_frequencies))?;
    write_frequencies(&output.frequencies, &f).map_err(|source| BuildError::Csv {
        path: paths.frequencies.clone(),
        source,
    })?;
    f.sync_all().map_err(io_error(tmp_frequencies))?;

    publish_pair(paths, tmp_matrix, tmp_frequencies)
}

/// Move both temporaries into place as a unit.
///
/// The previous matrix is parked under a backup name until the frequency
/// file has landed; if that second rename fails the old matrix comes back
/// (or the new one is removed when there was none).
fn publish_pair(paths: &ArtifactPaths, tmp_matrix: &Path, tmp_frequencies: &Path) -> Result<(), BuildError> {
    let backup = paths.matrix.with_extension("csv.bak");
    let had_previous = match fs::rename(&paths.matrix, &backup) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => return Err(io_error(&paths.matrix)(e)),
    };

    if let Err(e) = fs::rename(tmp_matrix, &paths.matrix) {
        if had_previous {
            let _ = fs::rename(&backup, &paths.matrix);
        }
        return Err(io_error(&paths.matrix)(e));
    }

    if let Err(e) = fs::rename(tmp_frequencies, &paths.frequencies) {
        // Key point: never leave a new matrix next to a stale frequency file
        let restored = if had_previous {
            fs::rename(&backup, &paths.matrix)
        } else {
            fs::remove_file(&paths.matrix)
        };
        if let Err(restore) = restored {
            warn!(
                path = %paths.matrix.display(),
                error = %restore,
                "Could not roll back matrix after failed write"
            );
        }
        return Err(io_error(&paths.frequencies)(e));
    }

    if had_previous {
        let _ = fs::remove_file(&backup);
    }
    Ok(())
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> BuildError {
    let path = path.to_path_buf();
    move |source| BuildError::Io { path, source }
}

fn mean(values: impl ExactSizeIterator<Item = u64>) -> f64 {
    let len = values.len();
    if len == 0 {
        return 0.0;
    }
    values.map(|v| v as f64).sum::<f64>() / len as f64
}

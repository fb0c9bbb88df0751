//! Ingredient co-occurrence analysis.
//!
//! An offline build turns a recipe corpus into a symmetric co-occurrence
//! matrix over the most frequent canonical ingredients, plus a frequency
//! table. The online side loads and repairs those two artifacts, selects a
//! frequency-ranked sub-matrix, and clusters and projects it for display.
//! Expensive derived results go through a disk cache keyed by a content hash
//! of their parameters.
//!
//! The build and the selection are deterministic: identical inputs produce
//! identical artifacts and identical sub-matrices.

pub mod cache;
pub mod config;
pub mod ingredient;
pub mod matrix;
pub mod projection;
pub mod selection;
pub mod types;

pub use cache::{ArtifactCache, CacheHandle, Cacheable};
pub use config::{ConfigError, PipelineConfig};
pub use ingredient::{normalize, read_recipes, RawRecipe};
pub use matrix::{MatrixBuilder, MatrixSanitizer};
pub use projection::{ClusterProjector, KMeansPartitioner};
pub use selection::SubsetSelector;
pub use types::{CooccurrenceMatrix, FrequencyTable, SelectionResult};

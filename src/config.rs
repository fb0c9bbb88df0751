use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::matrix::{FREQUENCY_FILE_NAME, MATRIX_FILE_NAME};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Config parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid config: {0}")]
    Invalid(String),
}

// Key point:
// Serializable
// Comparable
// Explicit defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub recipes_path: PathBuf,
    pub output_dir: PathBuf,
    pub matrix_path: PathBuf,
    pub frequency_path: PathBuf,
    pub cache_dir: PathBuf,
    /// Ingredients kept by the offline build.
    pub top_n: usize,
    /// Ingredients kept by online selection.
    pub n_ingredients: usize,
    pub n_clusters: usize,
    pub perplexity: f64,
    pub random_seed: u64,
    pub embedding_max_iter: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let data = PathBuf::from("data");
        Self {
            recipes_path: data.join("RAW_recipes.csv"),
            matrix_path: data.join(MATRIX_FILE_NAME),
            frequency_path: data.join(FREQUENCY_FILE_NAME),
            output_dir: data,
            cache_dir: PathBuf::from("cache"),
            top_n: 300,
            n_ingredients: 40,
            n_clusters: 4,
            perplexity: 30.0,
            random_seed: 42,
            embedding_max_iter: 1000,
        }
    }
}

impl PipelineConfig {
    /// Load from JSON; fields absent from the file keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_n == 0 {
            return Err(ConfigError::Invalid("top_n must be positive".into()));
        }
        if self.n_ingredients == 0 {
            return Err(ConfigError::Invalid("n_ingredients must be positive".into()));
        }
        if self.n_ingredients > self.top_n {
            return Err(ConfigError::Invalid(format!(
                "n_ingredients ({}) exceeds top_n ({})",
                self.n_ingredients, self.top_n
            )));
        }
        if self.n_clusters == 0 {
            return Err(ConfigError::Invalid("n_clusters must be positive".into()));
        }
        if self.n_clusters > self.n_ingredients {
            return Err(ConfigError::Invalid(format!(
                "n_clusters ({}) exceeds n_ingredients ({})",
                self.n_clusters, self.n_ingredients
            )));
        }
        if !(self.perplexity.is_finite() && self.perplexity > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "perplexity must be positive, got {}",
                self.perplexity
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.matrix_path,
            Path::new("data").join("ingredients_cooccurrence_matrix.csv")
        );
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, r#"{"n_ingredients": 20, "cache_dir": "/tmp/x"}"#).unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.n_ingredients, 20);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/x"));
        assert_eq!(config.top_n, 300);
        assert_eq!(config.random_seed, 42);
    }

    #[test]
    fn rejects_inconsistent_sizes() {
        let config = PipelineConfig {
            n_clusters: 50,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = PipelineConfig {
            perplexity: 0.0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            PipelineConfig::from_json_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}

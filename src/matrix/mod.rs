pub mod builder;
pub mod io;
pub mod sanitizer;
pub mod stats;

pub use builder::{
    count_cooccurrences, count_frequencies, select_top, write_artifacts, ArtifactPaths,
    BuildError, BuildOutput, BuildStats, MatrixBuilder,
};
pub use io::{TableError, FREQUENCY_FILE_NAME, MATRIX_FILE_NAME};
pub use sanitizer::{
    load_frequencies, LoadedArtifacts, MatrixSanitizer, RepairStep, SanitizeError,
    SanitizeReport, MIN_MATRIX_SIZE,
};
pub use stats::{MatrixSummary, PairAnalysis, PairStrength};

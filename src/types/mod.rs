pub mod identifiers;
pub mod matrix;
pub mod selection;

pub use identifiers::{CacheKey, CacheKeyError, CACHE_KEY_LEN};
pub use matrix::{
    CooccurrenceMatrix, FrequencyEntry, FrequencyTable, LabeledMatrix, LabeledTable, MatrixError,
};
pub use selection::{SelectionError, SelectionMetadata, SelectionResult, TableSelection};

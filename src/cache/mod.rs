pub mod cache;
pub mod cacheable;
pub mod entry;

pub use cache::ArtifactCache;
pub use cacheable::{CacheHandle, Cacheable};
pub use entry::{CacheEntry, CacheInfo, CacheLookup, NamespaceInfo, OperationInfo};

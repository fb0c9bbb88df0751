use std::convert::Infallible;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::cache::cache::ArtifactCache;
use crate::cache::entry::{CacheLookup, NamespaceInfo};

/// An analyzer's view of the shared cache: which namespace it writes to and
/// whether caching is currently switched on.
#[derive(Debug, Clone)]
pub struct CacheHandle {
    cache: Arc<ArtifactCache>,
    namespace: String,
    enabled: bool,
}

impl CacheHandle {
    pub fn new(cache: Arc<ArtifactCache>, namespace: impl Into<String>) -> Self {
        Self {
            cache,
            namespace: namespace.into(),
            enabled: true,
        }
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

/// Memoization of expensive operations through an [`ArtifactCache`].
///
/// Implementors only supply [`Cacheable::cache_handle`]; everything else has
/// a default. Without a handle, or with caching disabled, every call
/// computes directly.
pub trait Cacheable {
    fn cache_handle(&self) -> Option<&CacheHandle>;

    /// Params used when an operation is called without explicit ones.
    fn default_cache_params(&self) -> Value {
        Value::Object(serde_json::Map::new())
    }

    fn cached<T, F>(&self, operation: &str, params: Option<&Value>, compute: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        match self.try_cached(operation, params, || Ok::<T, Infallible>(compute())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`Cacheable::cached`] for fallible work. Errors are returned as is
    /// and never stored.
    fn try_cached<T, E, F>(&self, operation: &str, params: Option<&Value>, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, E>,
    {
        let handle = match self.cache_handle() {
            Some(handle) if handle.is_enabled() => handle,
            _ => return compute(),
        };

        let defaults;
        let params = match params {
            Some(params) => params,
            None => {
                defaults = self.default_cache_params();
                &defaults
            }
        };

        let cache = handle.cache();
        let namespace = handle.namespace();
        if let CacheLookup::Hit(value) = cache.lookup(namespace, operation, params) {
            return Ok(value);
        }

        debug!(namespace, operation, "Computing uncached result");
        let value = compute()?;
        cache.set(namespace, operation, params, &value);
        Ok(value)
    }

    /// Remove this analyzer's entries, optionally for one operation only.
    fn clear_cache(&self, operation: Option<&str>) -> usize {
        match self.cache_handle() {
            Some(handle) => handle.cache().clear(Some(handle.namespace()), operation),
            None => 0,
        }
    }

    fn cache_info(&self) -> Option<NamespaceInfo> {
        self.cache_handle()
            .map(|handle| handle.cache().namespace_info(handle.namespace()))
    }
}

// This is intentionally forgiving:
// reads never fail, they miss
// writes never fail, they report false
// the caller always has a way to recompute

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::entry::{CacheEntry, CacheInfo, CacheLookup, NamespaceInfo, OperationInfo};
use crate::config::PipelineConfig;
use crate::types::identifiers::{validate_segment, CacheKey, CacheKeyError};

const ENTRY_EXTENSION: &str = "json";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Disk-backed store for derived results.
///
/// Entries live at `root/<namespace>/<operation>/<key>.json`. Writes go
/// through a uniquely named temporary file and a rename, so a reader never
/// sees a partially written entry.
#[derive(Debug)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    /// Open a cache rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "Cache opened");
        Ok(Self { root })
    }

    /// The process-wide cache is just a shared handle over the configured
    /// directory; pass the `Arc` to every analyzer that should share it.
    pub fn open_default(config: &PipelineConfig) -> io::Result<Arc<Self>> {
        Self::new(&config.cache_dir).map(Arc::new)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn key<P: Serialize + ?Sized>(
        namespace: &str,
        operation: &str,
        params: &P,
    ) -> Result<CacheKey, CacheKeyError> {
        CacheKey::derive(namespace, operation, params)
    }

    pub fn entry_path(&self, namespace: &str, operation: &str, key: &CacheKey) -> PathBuf {
        self.root
            .join(namespace)
            .join(operation)
            .join(format!("{}.{}", key.as_str(), ENTRY_EXTENSION))
    }

    pub fn lookup<T, P>(&self, namespace: &str, operation: &str, params: &P) -> CacheLookup<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let key = match Self::key(namespace, operation, params) {
            Ok(key) => key,
            Err(e) => {
                warn!(namespace, operation, error = %e, "Cache key could not be derived");
                return CacheLookup::Miss;
            }
        };
        let path = self.entry_path(namespace, operation, &key);

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(namespace, operation, key = %key, "Cache miss");
                return CacheLookup::Miss;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cache entry unreadable");
                return CacheLookup::Corrupt(e.to_string());
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cache entry corrupt");
                return CacheLookup::Corrupt(e.to_string());
            }
        };

        // The key addresses the file, the body must agree with it
        if entry.key != key || entry.namespace != namespace || entry.operation != operation {
            warn!(path = %path.display(), "Cache entry does not match its address");
            return CacheLookup::Corrupt("entry address mismatch".to_string());
        }

        debug!(namespace, operation, key = %key, "Cache hit");
        CacheLookup::Hit(entry.data)
    }

    pub fn get<T, P>(&self, namespace: &str, operation: &str, params: &P) -> Option<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        self.lookup(namespace, operation, params).into_hit()
    }

    /// Store `data`; `false` means nothing was written.
    pub fn set<T, P>(&self, namespace: &str, operation: &str, params: &P, data: &T) -> bool
    where
        T: Serialize + ?Sized,
        P: Serialize + ?Sized,
    {
        match self.try_set(namespace, operation, params, data) {
            Ok(path) => {
                debug!(path = %path.display(), "Cache entry stored");
                true
            }
            Err(e) => {
                warn!(namespace, operation, error = %e, "Cache entry not stored");
                false
            }
        }
    }

    fn try_set<T, P>(
        &self,
        namespace: &str,
        operation: &str,
        params: &P,
        data: &T,
    ) -> Result<PathBuf, Box<dyn std::error::Error + Send + Sync>>
    where
        T: Serialize + ?Sized,
        P: Serialize + ?Sized,
    {
        let key = Self::key(namespace, operation, params)?;
        let entry = CacheEntry {
            key: key.clone(),
            namespace: namespace.to_string(),
            operation: operation.to_string(),
            params: serde_json::to_value(params)?,
            created_at: Utc::now(),
            data,
        };
        // Serialize fully before touching the disk
        let bytes = serde_json::to_vec(&entry)?;

        let path = self.entry_path(namespace, operation, &key);
        let dir = path.parent().unwrap_or(self.root.as_path());
        fs::create_dir_all(dir)?;

        let tmp = dir.join(format!(
            "{}.{}.{}.tmp",
            key.as_str(),
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let written = write_synced(&tmp, &bytes).and_then(|()| fs::rename(&tmp, &path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(path)
    }

    /// Remove one entry. Returns whether a file was deleted.
    pub fn remove<P: Serialize + ?Sized>(&self, namespace: &str, operation: &str, params: &P) -> bool {
        match Self::key(namespace, operation, params) {
            Ok(key) => fs::remove_file(self.entry_path(namespace, operation, &key)).is_ok(),
            Err(_) => false,
        }
    }

    /// Delete entries, optionally scoped to a namespace and/or an operation.
    ///
    /// Returns the number of entry files removed. An invalid scope removes
    /// nothing.
    pub fn clear(&self, namespace: Option<&str>, operation: Option<&str>) -> usize {
        if namespace.map_or(false, |ns| validate_segment(ns).is_err())
            || operation.map_or(false, |op| validate_segment(op).is_err())
        {
            warn!(?namespace, ?operation, "Refusing to clear an invalid cache scope");
            return 0;
        }

        let namespaces: Vec<String> = match namespace {
            Some(ns) => vec![ns.to_string()],
            None => subdirectories(&self.root),
        };

        let mut removed = 0;
        for ns in &namespaces {
            let ns_dir = self.root.join(ns);
            let operations: Vec<String> = match operation {
                Some(op) => vec![op.to_string()],
                None => subdirectories(&ns_dir),
            };
            for op in &operations {
                let op_dir = ns_dir.join(op);
                for (file, _) in entry_files(&op_dir) {
                    if fs::remove_file(&file).is_ok() {
                        removed += 1;
                    }
                }
                let _ = fs::remove_dir_all(&op_dir);
            }
            // Only drop the namespace directory once it is empty
            let _ = fs::remove_dir(&ns_dir);
        }

        info!(?namespace, ?operation, removed, "Cache cleared");
        removed
    }

    /// Entry counts and sizes, grouped by namespace and operation.
    pub fn info(&self) -> CacheInfo {
        let mut namespaces = BTreeMap::new();
        let mut total_entries = 0;
        let mut total_size_bytes = 0;

        for ns in subdirectories(&self.root) {
            let ns_dir = self.root.join(&ns);
            let mut ns_info = NamespaceInfo::default();
            for op in subdirectories(&ns_dir) {
                let files = entry_files(&ns_dir.join(&op));
                let op_info = OperationInfo {
                    entries: files.len(),
                    size_bytes: files.iter().map(|(_, size)| size).sum(),
                };
                ns_info.entries += op_info.entries;
                ns_info.size_bytes += op_info.size_bytes;
                ns_info.operations.insert(op, op_info);
            }
            total_entries += ns_info.entries;
            total_size_bytes += ns_info.size_bytes;
            namespaces.insert(ns, ns_info);
        }

        CacheInfo {
            base_directory: self.root.clone(),
            total_entries,
            total_size_bytes,
            namespaces,
        }
    }

    pub fn namespace_info(&self, namespace: &str) -> NamespaceInfo {
        self.info()
            .namespaces
            .remove(namespace)
            .unwrap_or_default()
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut f = fs::File::create(path)?;
    f.write_all(bytes)?;
    f.sync_all()
}

fn subdirectories(dir: &Path) -> Vec<String> {
    let Ok(read) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = read
        .filter_map(Result::ok)
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort();
    names
}

/// Finished entry files with their sizes; temporaries are skipped.
fn entry_files(dir: &Path) -> Vec<(PathBuf, u64)> {
    let Ok(read) = fs::read_dir(dir) else {
        return Vec::new();
    };
    read.filter_map(Result::ok)
        .filter_map(|e| {
            let path = e.path();
            let meta = e.metadata().ok()?;
            let is_entry = meta.is_file()
                && path.extension().and_then(|x| x.to_str()) == Some(ENTRY_EXTENSION);
            is_entry.then(|| (path, meta.len()))
        })
        .collect()
}

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::types::identifiers::CacheKey;

// Key point:
// payload and metadata live in one file
// metadata is informational, the key addresses the entry
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CacheEntry<T> {
    pub key: CacheKey,
    pub namespace: String,
    pub operation: String,
    pub params: serde_json::Value,
    pub created_at: DateTime<Utc>, // informational only
    pub data: T,
}

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    Hit(T),
    Miss,
    /// The entry exists but could not be read back.
    Corrupt(String),
}

impl<T> CacheLookup<T> {
    pub fn into_hit(self) -> Option<T> {
        match self {
            CacheLookup::Hit(v) => Some(v),
            CacheLookup::Miss | CacheLookup::Corrupt(_) => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OperationInfo {
    pub entries: usize,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NamespaceInfo {
    pub entries: usize,
    pub size_bytes: u64,
    pub operations: BTreeMap<String, OperationInfo>,
}

impl NamespaceInfo {
    pub fn size_mb(&self) -> f64 {
        bytes_to_mb(self.size_bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CacheInfo {
    pub base_directory: PathBuf,
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub namespaces: BTreeMap<String, NamespaceInfo>,
}

impl CacheInfo {
    pub fn total_size_mb(&self) -> f64 {
        bytes_to_mb(self.total_size_bytes)
    }
}

fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

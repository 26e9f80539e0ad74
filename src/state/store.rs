//! In-memory `path -> hash` store

use crate::hasher::{HashListener, HashSource};
use crate::model::{Hash, HashRecord, Path, ROOT_PATH};
use crate::Result;
use dashmap::DashMap;

/// Concurrent map from path to its latest hash.
///
/// Serves as the hash source of the next pass and, as a listener, records
/// every leaf and internal hash a pass produces.
#[derive(Debug, Default)]
pub struct MemoryHashStore {
    hashes: DashMap<Path, Hash>,
}

impl MemoryHashStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: Path) -> Option<Hash> {
        self.hashes.get(&path).map(|h| *h)
    }

    pub fn put(&self, path: Path, hash: Hash) {
        self.hashes.insert(path, hash);
    }

    pub fn root(&self) -> Option<Hash> {
        self.get(ROOT_PATH)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Drop hashes for paths past the end of a shrunken tree
    pub fn purge_beyond(&self, last: Path) {
        self.hashes.retain(|path, _| *path <= last);
    }

    pub fn clear(&self) {
        self.hashes.clear();
    }

    /// All records, sorted by path
    pub fn records(&self) -> Vec<HashRecord> {
        let mut records: Vec<_> = self
            .hashes
            .iter()
            .map(|entry| HashRecord::new(*entry.key(), *entry.value()))
            .collect();
        records.sort_unstable_by_key(|r| r.path);
        records
    }
}

impl HashSource for MemoryHashStore {
    fn read_hash(&self, path: Path) -> Result<Option<Hash>> {
        Ok(self.get(path))
    }
}

impl HashListener for MemoryHashStore {
    fn on_leaf_hashed(&self, path: Path, hash: Hash) {
        self.put(path, hash);
    }

    fn on_node_hashed(&self, path: Path, hash: Hash) {
        self.put(path, hash);
    }
}

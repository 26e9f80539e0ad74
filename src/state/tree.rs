//! Key/value map laid out on virtual tree paths
//!
//! `n` entries always occupy paths `n-1 ..= 2n-2`. Appending splits the
//! first leaf: it moves one rank down to become the left child of its old
//! path and the new entry takes the right child. Removing fills the hole
//! with the last leaf, then pulls the leaf left of the end up into its
//! parent. Every write or move marks the leaf's path dirty, and
//! [`VirtualTree::root_hash`] rehashes only those.

use super::store::MemoryHashStore;
use crate::hasher::{empty_root_hash, HashListener, HashingStats, VirtualHasher};
use crate::model::path::{self, Path};
use crate::model::{Hash, LeafExtent, LeafRecord};
use crate::{Error, Result};
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::trace;

pub struct VirtualTree {
    hasher: Arc<VirtualHasher>,
    store: Arc<MemoryHashStore>,
    /// key -> path of its leaf
    index: HashMap<Bytes, Path>,
    leaves: HashMap<Path, LeafRecord>,
    extent: Option<LeafExtent>,
    /// Leaf paths written or moved since the last hash
    dirty: BTreeSet<Path>,
    root: Option<Hash>,
    last_stats: Option<HashingStats>,
}

impl VirtualTree {
    pub fn new(hasher: Arc<VirtualHasher>) -> Self {
        VirtualTree {
            hasher,
            store: Arc::new(MemoryHashStore::new()),
            index: HashMap::new(),
            leaves: HashMap::new(),
            extent: None,
            dirty: BTreeSet::new(),
            root: None,
            last_stats: None,
        }
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    pub fn extent(&self) -> Option<LeafExtent> {
        self.extent
    }

    pub fn store(&self) -> &MemoryHashStore {
        &self.store
    }

    pub fn get(&self, key: &[u8]) -> Option<&Bytes> {
        let path = self.index.get(key)?;
        self.leaves.get(path).map(|leaf| &leaf.value)
    }

    pub fn path_of(&self, key: &[u8]) -> Option<Path> {
        self.index.get(key).copied()
    }

    pub fn leaf_at(&self, path: Path) -> Option<&LeafRecord> {
        self.leaves.get(&path)
    }

    /// Leaves in path order
    pub fn leaves(&self) -> Vec<&LeafRecord> {
        let mut leaves: Vec<_> = self.leaves.values().collect();
        leaves.sort_unstable_by_key(|leaf| leaf.path);
        leaves
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Stats of the most recent hashing pass
    pub fn last_stats(&self) -> Option<HashingStats> {
        self.last_stats
    }

    /// Insert or overwrite `key`
    pub fn put(&mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) {
        let key = key.into();
        let value = value.into();

        if let Some(&path) = self.index.get(&key) {
            self.leaves.insert(path, LeafRecord::new(path, key, value));
            self.mark_dirty(path);
            return;
        }

        let count = self.leaves.len() as u64;
        if let Some(extent) = self.extent {
            if count > 1 {
                self.relocate(extent.first(), extent.last() + 1);
            }
        }
        self.extent = LeafExtent::for_leaf_count(count + 1);
        let path = match self.extent {
            Some(extent) => extent.last(),
            None => return,
        };

        trace!(path, "appending leaf");
        self.index.insert(key.clone(), path);
        self.leaves.insert(path, LeafRecord::new(path, key, value));
        self.mark_dirty(path);
    }

    /// Remove `key`, returning its value
    pub fn remove(&mut self, key: &[u8]) -> Option<Bytes> {
        let path = self.index.remove(key)?;
        let removed = self.leaves.remove(&path)?.value;
        self.dirty.remove(&path);
        let extent = self.extent?;

        match extent.leaf_count() {
            1 => {
                self.extent = None;
                self.dirty.clear();
                self.store.clear();
                self.root = None;
                return Some(removed);
            }
            count => {
                let last = extent.last();
                if path != last {
                    self.relocate(last, path);
                }
                if count == 2 {
                    // The survivor always ends up at path 1
                    if self.leaves.contains_key(&2) {
                        self.relocate(2, 1);
                    } else {
                        self.mark_dirty(1);
                    }
                } else {
                    self.relocate(last - 1, path::parent(last - 1));
                }
                self.extent = LeafExtent::for_leaf_count(count - 1);
            }
        }

        if let Some(extent) = self.extent {
            self.store.purge_beyond(extent.last());
        }
        trace!(path, "removed leaf");
        Some(removed)
    }

    /// Root hash of the current contents, rehashing whatever is dirty
    pub fn root_hash(&mut self) -> Result<Hash> {
        self.root_hash_observed(None)
    }

    /// [`root_hash`](Self::root_hash), also reporting the pass to `observer`
    pub fn root_hash_observed(&mut self, observer: Option<&dyn HashListener>) -> Result<Hash> {
        if self.dirty.is_empty() {
            if let Some(root) = self.root {
                return Ok(root);
            }
            let stored = self.extent.and_then(|_| self.store.root());
            return Ok(stored.unwrap_or_else(empty_root_hash));
        }

        let extent = self
            .extent
            .ok_or_else(|| Error::Scheduler("dirty leaves in an empty tree".into()))?;
        let dirty: Vec<LeafRecord> = self
            .dirty
            .iter()
            .filter_map(|path| self.leaves.get(path).cloned())
            .collect();

        let recorder = Recorder {
            store: &self.store,
            observer,
        };
        let (root, stats) = self
            .hasher
            .hash_with_stats(
                self.store.as_ref(),
                Some(dirty),
                extent.first(),
                extent.last(),
                Some(&recorder),
            )?
            .ok_or_else(|| Error::Scheduler("dirty leaves produced no hash".into()))?;

        self.dirty.clear();
        self.root = Some(root);
        self.last_stats = Some(stats);
        Ok(root)
    }

    fn mark_dirty(&mut self, path: Path) {
        self.dirty.insert(path);
        self.root = None;
    }

    /// Move the leaf at `from` to the empty path `to`
    fn relocate(&mut self, from: Path, to: Path) {
        let Some(leaf) = self.leaves.remove(&from) else {
            return;
        };
        self.dirty.remove(&from);
        self.index.insert(leaf.key.clone(), to);
        self.leaves.insert(to, leaf.moved_to(to));
        self.mark_dirty(to);
    }
}

/// Persists a pass into the store, forwarding to an optional observer
struct Recorder<'a> {
    store: &'a MemoryHashStore,
    observer: Option<&'a dyn HashListener>,
}

impl HashListener for Recorder<'_> {
    fn on_hashing_started(&self) {
        if let Some(observer) = self.observer {
            observer.on_hashing_started();
        }
    }

    fn on_leaf_hashed(&self, path: Path, hash: Hash) {
        self.store.on_leaf_hashed(path, hash);
        if let Some(observer) = self.observer {
            observer.on_leaf_hashed(path, hash);
        }
    }

    fn on_node_hashed(&self, path: Path, hash: Hash) {
        self.store.on_node_hashed(path, hash);
        if let Some(observer) = self.observer {
            observer.on_node_hashed(path, hash);
        }
    }

    fn on_hashing_completed(&self) {
        if let Some(observer) = self.observer {
            observer.on_hashing_completed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::rebuild::rebuild_root;
    use crate::model::VirtualLeaf;

    fn tree() -> VirtualTree {
        VirtualTree::new(Arc::new(VirtualHasher::with_threads(2).unwrap()))
    }

    fn key(i: u32) -> Bytes {
        Bytes::from(format!("key-{i}"))
    }

    fn reference_root(tree: &VirtualTree) -> Hash {
        rebuild_root(tree.extent(), |p| tree.leaf_at(p).map(|l| l.leaf_hash())).unwrap()
    }

    fn assert_layout(tree: &VirtualTree) {
        match tree.extent() {
            None => assert!(tree.is_empty()),
            Some(extent) => {
                assert_eq!(extent.leaf_count() as usize, tree.len());
                for p in extent.first()..=extent.last() {
                    let leaf = tree.leaf_at(p).expect("every extent path holds a leaf");
                    assert_eq!(tree.path_of(&leaf.key), Some(p));
                }
            }
        }
    }

    #[test]
    fn test_empty_tree_root() {
        let mut tree = tree();
        assert_eq!(tree.root_hash().unwrap(), empty_root_hash());
    }

    #[test]
    fn test_append_layout() {
        let mut tree = tree();
        tree.put(key(0), "a");
        assert_eq!(tree.path_of(&key(0)), Some(1));
        tree.put(key(1), "b");
        assert_eq!(tree.path_of(&key(1)), Some(2));
        tree.put(key(2), "c");
        // key 0 moved down from 1 to 3
        assert_eq!(tree.path_of(&key(0)), Some(3));
        assert_eq!(tree.path_of(&key(2)), Some(4));
        assert_eq!(tree.extent(), LeafExtent::new(2, 4).ok());
        assert_layout(&tree);
    }

    #[test]
    fn test_incremental_matches_rebuild_while_growing() {
        let mut tree = tree();
        for i in 0..40 {
            tree.put(key(i), format!("value-{i}"));
            assert_eq!(tree.root_hash().unwrap(), reference_root(&tree), "after {i}");
        }
        assert_layout(&tree);
    }

    #[test]
    fn test_update_in_place() {
        let mut tree = tree();
        for i in 0..10 {
            tree.put(key(i), "v");
        }
        let before = tree.root_hash().unwrap();
        let path = tree.path_of(&key(4)).unwrap();
        tree.put(key(4), "changed");
        assert_eq!(tree.path_of(&key(4)), Some(path));
        assert_eq!(tree.dirty_count(), 1);
        let after = tree.root_hash().unwrap();
        assert_ne!(before, after);
        assert_eq!(after, reference_root(&tree));
        assert_eq!(tree.get(&key(4)).map(|v| v.as_ref()), Some(&b"changed"[..]));
    }

    #[test]
    fn test_remove_keeps_layout_and_hash() {
        let mut tree = tree();
        for i in 0..20 {
            tree.put(key(i), format!("value-{i}"));
        }
        tree.root_hash().unwrap();
        for i in (0..20).step_by(3) {
            assert!(tree.remove(&key(i)).is_some());
            assert_layout(&tree);
            assert_eq!(tree.root_hash().unwrap(), reference_root(&tree), "after removing {i}");
        }
        assert_eq!(tree.remove(&key(0)), None);
    }

    #[test]
    fn test_remove_down_to_empty() {
        let mut tree = tree();
        for i in 0..3 {
            tree.put(key(i), "v");
        }
        tree.root_hash().unwrap();

        tree.remove(&key(2));
        assert_eq!(tree.root_hash().unwrap(), reference_root(&tree));
        tree.remove(&key(0));
        assert_eq!(tree.extent(), LeafExtent::new(1, 1).ok());
        assert_eq!(tree.root_hash().unwrap(), reference_root(&tree));
        tree.remove(&key(1));
        assert!(tree.is_empty());
        assert_eq!(tree.root_hash().unwrap(), empty_root_hash());
    }

    #[test]
    fn test_clean_tree_reuses_root() {
        let mut tree = tree();
        for i in 0..5 {
            tree.put(key(i), "v");
        }
        let root = tree.root_hash().unwrap();
        assert_eq!(tree.dirty_count(), 0);
        assert_eq!(tree.root_hash().unwrap(), root);
        assert_eq!(tree.store().root(), Some(root));
    }
}

//! Observer of a hashing pass

use crate::model::{Hash, Path};

/// Receives the results of one hashing pass.
///
/// A pass that does work calls `on_hashing_started` once, then the per-node
/// callbacks, then `on_hashing_completed` once, after every per-node call
/// has returned. Per-node callbacks arrive from worker threads concurrently
/// and in no particular order; implementations with state must synchronize
/// it themselves. A listener belongs to a single pass and must not be
/// shared by two passes running at the same time.
///
/// A failed pass never reports completion.
pub trait HashListener: Send + Sync {
    fn on_hashing_started(&self) {}

    /// Called once per dirty leaf with the digest fed into its parent
    fn on_leaf_hashed(&self, _path: Path, _hash: Hash) {}

    /// Called once per recomputed internal node, the root included.
    /// Never called for leaves or for nodes whose hash was reused.
    fn on_node_hashed(&self, _path: Path, _hash: Hash) {}

    fn on_hashing_completed(&self) {}
}

/// Listener that ignores everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

impl HashListener for NoopListener {}

impl<T: HashListener + ?Sized> HashListener for &T {
    fn on_hashing_started(&self) {
        (**self).on_hashing_started()
    }

    fn on_leaf_hashed(&self, path: Path, hash: Hash) {
        (**self).on_leaf_hashed(path, hash)
    }

    fn on_node_hashed(&self, path: Path, hash: Hash) {
        (**self).on_node_hashed(path, hash)
    }

    fn on_hashing_completed(&self) {
        (**self).on_hashing_completed()
    }
}

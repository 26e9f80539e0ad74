//! Incremental hashing of a virtual binary tree
//!
//! Given the leaves that changed since the last pass, [`VirtualHasher`]
//! recomputes exactly the internal nodes on their paths to the root and
//! reuses every other hash from a [`HashSource`]. The resulting root hash
//! is identical to hashing the whole tree from scratch, whatever the
//! thread count.

mod combine;
mod listener;
pub mod rebuild;
mod scheduler;
pub mod source;

pub use combine::{
    combine, combine_at, empty_root_hash, NodeKind, NODE_FORMAT_VERSION, NULL_HASH,
};
pub use listener::{HashListener, NoopListener};
pub use scheduler::HashingStats;
pub use source::{EmptySource, HashSource};

use crate::config::HasherConfig;
use crate::model::{Hash, LeafExtent, Path, VirtualLeaf};
use crate::{Error, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};
use scheduler::Pass;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Computes root hashes for a virtual tree.
///
/// Owns the worker pool and nothing else, so one hasher can serve any
/// number of trees. Passes on the same hasher may run concurrently as long
/// as each has its own listener.
pub struct VirtualHasher {
    pool: ThreadPool,
    config: HasherConfig,
}

impl VirtualHasher {
    /// Hasher with the default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(HasherConfig::default())
    }

    pub fn with_config(config: HasherConfig) -> Result<Self> {
        config.validate()?;
        let threads = config.thread_count();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("vhash-hasher-{i}"))
            .build()?;
        debug!(threads, chunk_size = config.chunk_size, "virtual hasher ready");
        Ok(VirtualHasher { pool, config })
    }

    /// Hasher with exactly `threads` workers
    pub fn with_threads(threads: usize) -> Result<Self> {
        Self::with_config(HasherConfig {
            hash_threads: Some(threads),
            ..Default::default()
        })
    }

    pub fn config(&self) -> &HasherConfig {
        &self.config
    }

    pub fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Hash the dirty leaves and every ancestor they invalidate.
    ///
    /// * `source` - stored hashes for clean paths. Never asked for a path
    ///   on a dirty leaf's chain to the root.
    /// * `dirty_leaves` - the changed leaves in strictly increasing path
    ///   order. `None` is an error; an empty stream is a no-op that returns
    ///   `Ok(None)` whatever the extent.
    /// * `first_leaf_path`, `last_leaf_path` - the leaf extent. Checked only
    ///   when there is something to hash.
    /// * `listener` - notified of every recomputed hash. See
    ///   [`HashListener`] for the ordering rules.
    ///
    /// Returns the new root hash.
    pub fn hash<S, I, L>(
        &self,
        source: &S,
        dirty_leaves: Option<I>,
        first_leaf_path: Path,
        last_leaf_path: Path,
        listener: Option<&dyn HashListener>,
    ) -> Result<Option<Hash>>
    where
        S: HashSource + ?Sized,
        I: IntoIterator<Item = L>,
        L: VirtualLeaf,
    {
        Ok(self
            .hash_with_stats(source, dirty_leaves, first_leaf_path, last_leaf_path, listener)?
            .map(|(root, _)| root))
    }

    /// [`hash`](Self::hash), also reporting what the pass did
    pub fn hash_with_stats<S, I, L>(
        &self,
        source: &S,
        dirty_leaves: Option<I>,
        first_leaf_path: Path,
        last_leaf_path: Path,
        listener: Option<&dyn HashListener>,
    ) -> Result<Option<(Hash, HashingStats)>>
    where
        S: HashSource + ?Sized,
        I: IntoIterator<Item = L>,
        L: VirtualLeaf,
    {
        let dirty_leaves = dirty_leaves
            .ok_or_else(|| Error::InvalidArgument("dirty leaf stream is absent".into()))?;

        // Nothing changed: no hash, even over an extent we would reject.
        let mut leaves = dirty_leaves.into_iter().peekable();
        if leaves.peek().is_none() {
            trace!(first_leaf_path, last_leaf_path, "no dirty leaves, skipping pass");
            return Ok(None);
        }

        let extent = LeafExtent::new(first_leaf_path, last_leaf_path)?;
        let listener: &dyn HashListener = match listener {
            Some(listener) => listener,
            None => &NoopListener,
        };

        let started = Instant::now();
        debug!(%extent, threads = self.thread_count(), "hashing pass started");
        listener.on_hashing_started();

        let pass = Pass::new(
            extent,
            source,
            listener,
            self.config.chunk_size,
            self.config.in_flight_chunks(),
        );
        match pass.run(&self.pool, leaves) {
            Ok((root, stats)) => {
                debug!(
                    %extent,
                    root = %root.short(),
                    dirty_leaves = stats.dirty_leaves,
                    internal_nodes = stats.internal_nodes,
                    source_reads = stats.source_reads,
                    peak_open_nodes = stats.peak_open_nodes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "hashing pass completed"
                );
                listener.on_hashing_completed();
                Ok(Some((root, stats)))
            }
            Err(err) => {
                warn!(%extent, error = %err, "hashing pass failed");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HashRecord;
    use std::collections::HashMap;

    fn leaf(path: Path) -> HashRecord {
        HashRecord::new(path, crate::Hash::digest(&path.to_le_bytes()))
    }

    #[test]
    fn test_absent_stream_is_rejected() {
        let hasher = VirtualHasher::with_threads(1).unwrap();
        let result =
            hasher.hash::<_, Vec<HashRecord>, _>(&EmptySource, None, 1, 1, None);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_empty_stream_yields_nothing() {
        let hasher = VirtualHasher::with_threads(1).unwrap();
        let none: Vec<HashRecord> = Vec::new();
        assert_eq!(hasher.hash(&EmptySource, Some(none.clone()), 52, 104, None).unwrap(), None);
        assert_eq!(hasher.hash(&EmptySource, Some(none), 0, 0, None).unwrap(), None);
    }

    #[test]
    fn test_single_leaf_tree() {
        let hasher = VirtualHasher::with_threads(2).unwrap();
        let root = hasher
            .hash(&EmptySource, Some(vec![leaf(1)]), 1, 1, None)
            .unwrap()
            .unwrap();
        assert_eq!(root, combine_at(0, &leaf(1).hash, &NULL_HASH));
    }

    #[test]
    fn test_two_leaf_tree_reads_clean_sibling() {
        let hasher = VirtualHasher::with_threads(2).unwrap();
        let mut stored = HashMap::new();
        stored.insert(1, leaf(1).hash);
        let (root, stats) = hasher
            .hash_with_stats(&stored, Some(vec![leaf(2)]), 1, 2, None)
            .unwrap()
            .unwrap();
        assert_eq!(root, combine_at(0, &leaf(1).hash, &leaf(2).hash));
        assert_eq!(stats.source_reads, 1);
        assert_eq!(stats.internal_nodes, 1);
        assert_eq!(stats.dirty_leaves, 1);
    }

    #[test]
    fn test_missing_clean_hash_fails() {
        let hasher = VirtualHasher::with_threads(2).unwrap();
        let result = hasher.hash(&EmptySource, Some(vec![leaf(2)]), 1, 2, None);
        assert!(matches!(result, Err(Error::MissingHash { path: 1 })));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = HasherConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            VirtualHasher::with_config(config),
            Err(Error::Config(_))
        ));
    }
}

//! The contiguous range of paths holding leaves

use super::path::{self, Path, INVALID_PATH, ROOT_PATH};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `(first_leaf_path, last_leaf_path)` of a non-empty tree.
///
/// Leaves can straddle two ranks. Every path below `first` is internal,
/// every path above `last` is absent. An extent with `last < 2 * first`
/// leaves some internal nodes with no leaves at all; those hash as absent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafExtent {
    first: Path,
    last: Path,
}

impl LeafExtent {
    /// Validate a caller-supplied extent.
    ///
    /// Rejects bounds at or below the root, the invalid sentinel,
    /// inverted bounds, and ranges where a leaf's own child would also be
    /// a leaf.
    pub fn new(first: Path, last: Path) -> Result<Self> {
        if first == INVALID_PATH || last == INVALID_PATH {
            return Err(Error::InvalidArgument(format!(
                "leaf extent ({first}, {last}) uses the invalid path"
            )));
        }
        if first <= ROOT_PATH || last <= ROOT_PATH {
            return Err(Error::InvalidArgument(format!(
                "leaf extent ({first}, {last}) must lie below the root"
            )));
        }
        if last < first {
            return Err(Error::InvalidArgument(format!(
                "last leaf path {last} is before first leaf path {first}"
            )));
        }
        if last > first.saturating_mul(2) || path::rank(last) > path::MAX_RANK {
            return Err(Error::InvalidArgument(format!(
                "leaf extent ({first}, {last}) cannot hold a binary tree"
            )));
        }
        Ok(LeafExtent { first, last })
    }

    /// Extent of a tree holding `count` leaves packed the usual way:
    /// `first = count - 1`, `last = 2 * count - 2`, a single leaf at path 1.
    pub fn for_leaf_count(count: u64) -> Option<Self> {
        match count {
            0 => None,
            1 => Some(LeafExtent { first: 1, last: 1 }),
            n => Some(LeafExtent {
                first: n - 1,
                last: 2 * n - 2,
            }),
        }
    }

    pub fn first(&self) -> Path {
        self.first
    }

    pub fn last(&self) -> Path {
        self.last
    }

    pub fn leaf_count(&self) -> u64 {
        self.last - self.first + 1
    }

    pub fn contains(&self, path: Path) -> bool {
        path >= self.first && path <= self.last
    }

    pub fn is_internal(&self, path: Path) -> bool {
        path < self.first
    }

    /// True when no leaf lives at or under `path`. Covers every path past
    /// `last`, and internal nodes whose children all fall past it.
    pub fn is_absent(&self, path: Path) -> bool {
        self.last_leaf_under(path).is_none()
    }

    pub fn min_leaf_rank(&self) -> u32 {
        path::rank(self.first)
    }

    pub fn max_leaf_rank(&self) -> u32 {
        path::rank(self.last)
    }

    /// Highest leaf path under `node`, or `None` when its subtree has no
    /// leaves.
    ///
    /// Leaves under a node form at most two runs: one on the max leaf rank
    /// and one on the rank above. The run on the max rank always holds the
    /// higher paths.
    pub fn last_leaf_under(&self, node: Path) -> Option<Path> {
        if node == INVALID_PATH || node > self.last {
            return None;
        }
        if node >= self.first {
            return Some(node);
        }
        let node_rank = path::rank(node);
        let mut ranks = [self.max_leaf_rank(), self.min_leaf_rank()];
        if ranks[0] == ranks[1] {
            ranks[1] = u32::MAX;
        }
        for leaf_rank in ranks {
            if leaf_rank == u32::MAX || leaf_rank < node_rank {
                continue;
            }
            let Some((lo, hi)) = path::descendants_at_depth(node, leaf_rank - node_rank) else {
                continue;
            };
            let lo = lo.max(self.first);
            let hi = hi.min(self.last);
            if lo <= hi {
                return Some(hi);
            }
        }
        None
    }
}

impl fmt::Display for LeafExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..={}]", self.first, self.last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_bounds() {
        assert!(LeafExtent::new(0, 0).is_err());
        assert!(LeafExtent::new(0, 4).is_err());
        assert!(LeafExtent::new(4, 0).is_err());
        assert!(LeafExtent::new(10, 5).is_err());
        assert!(LeafExtent::new(INVALID_PATH, INVALID_PATH).is_err());
        assert!(LeafExtent::new(3, 9).is_err());
    }

    #[test]
    fn test_accepts_straddling_extent() {
        let extent = LeafExtent::new(52, 104).unwrap();
        assert_eq!(extent.leaf_count(), 53);
        assert_eq!(extent.min_leaf_rank(), 5);
        assert_eq!(extent.max_leaf_rank(), 6);
        assert!(extent.is_internal(51));
        assert!(extent.contains(52));
        assert!(extent.is_absent(105));
    }

    #[test]
    fn test_for_leaf_count() {
        assert_eq!(LeafExtent::for_leaf_count(0), None);
        let one = LeafExtent::for_leaf_count(1).unwrap();
        assert_eq!((one.first(), one.last()), (1, 1));
        let two = LeafExtent::for_leaf_count(2).unwrap();
        assert_eq!((two.first(), two.last()), (1, 2));
        let many = LeafExtent::for_leaf_count(53).unwrap();
        assert_eq!((many.first(), many.last()), (52, 104));
        for n in 1..300 {
            let e = LeafExtent::for_leaf_count(n).unwrap();
            assert_eq!(e.leaf_count(), n);
            assert!(LeafExtent::new(e.first(), e.last()).is_ok());
        }
    }

    #[test]
    fn test_last_leaf_under() {
        let extent = LeafExtent::new(52, 104).unwrap();
        // 25 covers 51 (internal, over 103 and 104) and leaf 52
        assert_eq!(extent.last_leaf_under(25), Some(104));
        assert_eq!(extent.last_leaf_under(30), Some(62));
        assert_eq!(extent.last_leaf_under(0), Some(104));
        assert_eq!(extent.last_leaf_under(1), Some(94));
        assert_eq!(extent.last_leaf_under(60), Some(60));
        assert_eq!(extent.last_leaf_under(105), None);
    }

    #[test]
    fn test_last_leaf_under_single_rank() {
        let extent = LeafExtent::new(7, 14).unwrap();
        assert_eq!(extent.last_leaf_under(1), Some(10));
        assert_eq!(extent.last_leaf_under(2), Some(14));
        assert_eq!(extent.last_leaf_under(0), Some(14));
    }

    #[test]
    fn test_single_leaf_extent() {
        let extent = LeafExtent::new(1, 1).unwrap();
        assert_eq!(extent.last_leaf_under(0), Some(1));
        assert_eq!(extent.last_leaf_under(2), None);
        assert!(extent.is_absent(2));
    }

    #[test]
    fn test_leafless_internal_node_is_absent() {
        // Leaves 3 and 4 both hang off node 1, node 2 has nothing under it
        let extent = LeafExtent::new(3, 4).unwrap();
        assert!(extent.is_internal(2));
        assert!(extent.is_absent(2));
        assert!(!extent.is_absent(1));
        assert!(!extent.is_absent(4));
    }
}

//! Path arithmetic for the implicit complete binary tree
//!
//! Paths number nodes breadth-first, starting with the root at 0:
//!
//! ```text
//!                 0                  rank 0
//!          1             2           rank 1
//!      3      4      5       6       rank 2
//!     7 8    9 10  11 12   13 14     rank 3
//! ```
//!
//! Nothing here allocates; the tree exists only as these formulas.

/// Position of a node in the virtual tree
pub type Path = u64;

/// Path of the root node
pub const ROOT_PATH: Path = 0;

/// "No such node". Returned for the parent of the root and for children
/// whose path would not fit in a `Path`.
pub const INVALID_PATH: Path = u64::MAX;

/// Deepest rank a valid path can sit on
pub const MAX_RANK: u32 = 62;

/// Depth of `path`, the root being rank 0
#[inline]
pub fn rank(path: Path) -> u32 {
    debug_assert_ne!(path, INVALID_PATH, "rank of INVALID_PATH");
    (path + 1).ilog2()
}

/// Parent of `path`, or [`INVALID_PATH`] for the root
#[inline]
pub fn parent(path: Path) -> Path {
    if path == ROOT_PATH || path == INVALID_PATH {
        INVALID_PATH
    } else {
        (path - 1) >> 1
    }
}

#[inline]
pub fn left_child(path: Path) -> Path {
    path.checked_mul(2)
        .and_then(|p| p.checked_add(1))
        .filter(|p| *p != INVALID_PATH)
        .unwrap_or(INVALID_PATH)
}

#[inline]
pub fn right_child(path: Path) -> Path {
    path.checked_mul(2)
        .and_then(|p| p.checked_add(2))
        .filter(|p| *p != INVALID_PATH)
        .unwrap_or(INVALID_PATH)
}

#[inline]
pub fn is_left(path: Path) -> bool {
    path != ROOT_PATH && path != INVALID_PATH && path & 1 == 1
}

#[inline]
pub fn is_right(path: Path) -> bool {
    path != ROOT_PATH && path != INVALID_PATH && path & 1 == 0
}

/// The other child of `path`'s parent, or [`INVALID_PATH`] for the root
#[inline]
pub fn sibling(path: Path) -> Path {
    if path == ROOT_PATH || path == INVALID_PATH {
        INVALID_PATH
    } else if is_left(path) {
        path + 1
    } else {
        path - 1
    }
}

/// Leftmost path on `rank`
#[inline]
pub fn first_path_in_rank(rank: u32) -> Path {
    debug_assert!(rank <= MAX_RANK);
    (1u64 << rank) - 1
}

/// Rightmost path on `rank`
#[inline]
pub fn last_path_in_rank(rank: u32) -> Path {
    debug_assert!(rank <= MAX_RANK);
    (1u64 << (rank + 1)) - 2
}

/// Zero-based position of `path` within its own rank
#[inline]
pub fn index_in_rank(path: Path) -> u64 {
    path - first_path_in_rank(rank(path))
}

#[inline]
pub fn is_first_in_rank(path: Path) -> bool {
    path != INVALID_PATH && (path + 1).is_power_of_two()
}

#[inline]
pub fn is_last_in_rank(path: Path) -> bool {
    path != INVALID_PATH && (path + 2).is_power_of_two()
}

/// Inclusive range of paths under `path` that sit `depth` ranks below it.
///
/// Returns `None` when the range does not fit in a `Path`.
pub fn descendants_at_depth(path: Path, depth: u32) -> Option<(Path, Path)> {
    if depth >= 64 {
        return None;
    }
    let scale = 1u128 << depth;
    let lo = (path as u128 + 1) * scale - 1;
    let hi = (path as u128 + 2) * scale - 2;
    if hi >= INVALID_PATH as u128 {
        return None;
    }
    Some((lo as Path, hi as Path))
}

/// Whether `ancestor` lies on the chain from `path` up to the root
/// (a path counts as its own ancestor).
pub fn is_ancestor(ancestor: Path, path: Path) -> bool {
    if ancestor == INVALID_PATH || path == INVALID_PATH {
        return false;
    }
    let (ra, rp) = (rank(ancestor), rank(path));
    if ra > rp {
        return false;
    }
    let mut p = path;
    for _ in 0..(rp - ra) {
        p = parent(p);
    }
    p == ancestor
}

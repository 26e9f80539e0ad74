//! Sequential from-scratch root computation.
//!
//! Hashes every internal node of the tree bottom-up on the calling thread.
//! Slow, but it shares nothing with the incremental scheduler except the
//! combiner, which makes it the yardstick the incremental result is
//! checked against.

use super::combine::{combine_at, empty_root_hash, NULL_HASH};
use crate::model::path::{self, Path, ROOT_PATH};
use crate::model::{Hash, LeafExtent};
use crate::{Error, Result};

/// Root hash of the tree over `extent`, or the empty root when there is
/// no extent. `leaf_hash` must return the digest of every leaf path.
pub fn rebuild_root<F>(extent: Option<LeafExtent>, leaf_hash: F) -> Result<Hash>
where
    F: Fn(Path) -> Option<Hash>,
{
    match extent {
        None => Ok(empty_root_hash()),
        Some(extent) => rebuild_subtree(&extent, &leaf_hash, ROOT_PATH, &mut |_, _| {}),
    }
}

/// Like [`rebuild_root`], also handing every internal hash to `visit`
pub fn rebuild_all<F, V>(extent: &LeafExtent, leaf_hash: F, mut visit: V) -> Result<Hash>
where
    F: Fn(Path) -> Option<Hash>,
    V: FnMut(Path, Hash),
{
    rebuild_subtree(extent, &leaf_hash, ROOT_PATH, &mut visit)
}

fn rebuild_subtree<F, V>(extent: &LeafExtent, leaf_hash: &F, node: Path, visit: &mut V) -> Result<Hash>
where
    F: Fn(Path) -> Option<Hash>,
    V: FnMut(Path, Hash),
{
    if extent.is_absent(node) {
        return Ok(NULL_HASH);
    }
    if extent.contains(node) {
        return leaf_hash(node).ok_or(Error::MissingHash { path: node });
    }
    // Recursion depth is bounded by the rank of the last leaf
    let left = rebuild_subtree(extent, leaf_hash, path::left_child(node), visit)?;
    let right = rebuild_subtree(extent, leaf_hash, path::right_child(node), visit)?;
    let hash = combine_at(node, &left, &right);
    visit(node, hash);
    Ok(hash)
}

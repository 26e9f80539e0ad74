//! Internal node hash combination
//!
//! Every node hash is `BLAKE3(kind tag || format version || left || right)`.
//! The byte layout is consensus relevant: two nodes agree on a root only
//! if they agree on every byte fed in here.

use crate::model::{Hash, Path, ROOT_PATH};

/// Current node hash format. Bumping it changes every internal hash.
pub const NODE_FORMAT_VERSION: u32 = 1;

/// Hash contributed by a child that does not exist
pub const NULL_HASH: Hash = Hash::ZERO;

/// Role of a node in the tree, mixed into its hash
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Root,
    Internal,
}

impl NodeKind {
    pub fn of(path: Path) -> Self {
        if path == ROOT_PATH {
            NodeKind::Root
        } else {
            NodeKind::Internal
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            NodeKind::Root => 0x01,
            NodeKind::Internal => 0x02,
        }
    }
}

/// Hash a node from its two children
pub fn combine(kind: NodeKind, version: u32, left: &Hash, right: &Hash) -> Hash {
    Hash::digest_many(&[
        &[kind.tag()],
        &version.to_le_bytes(),
        left.as_bytes(),
        right.as_bytes(),
    ])
}

/// [`combine`] with the kind derived from `path` and the current version
pub fn combine_at(path: Path, left: &Hash, right: &Hash) -> Hash {
    combine(NodeKind::of(path), NODE_FORMAT_VERSION, left, right)
}

/// Root hash of a tree that holds no leaves
pub fn empty_root_hash() -> Hash {
    combine(NodeKind::Root, NODE_FORMAT_VERSION, &NULL_HASH, &NULL_HASH)
}

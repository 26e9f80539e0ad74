//! Leaf and hash records exchanged with the hasher

use super::{Hash, Path};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Domain tag mixed into every leaf digest so a leaf can never collide
/// with an internal node built from the same bytes.
const LEAF_DOMAIN: u8 = 0x00;

/// Anything the hasher can consume as a dirty leaf.
///
/// The hasher never looks inside a leaf; it only needs where the leaf
/// lives and its digest.
pub trait VirtualLeaf: Send {
    fn path(&self) -> Path;

    /// Content digest of this leaf
    fn leaf_hash(&self) -> Hash;
}

/// A key/value entry stored at a leaf path
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafRecord {
    pub path: Path,
    pub key: Bytes,
    pub value: Bytes,
}

impl LeafRecord {
    pub fn new(path: Path, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        LeafRecord {
            path,
            key: key.into(),
            value: value.into(),
        }
    }

    /// Same entry at another path
    pub fn moved_to(&self, path: Path) -> Self {
        LeafRecord {
            path,
            key: self.key.clone(),
            value: self.value.clone(),
        }
    }
}

impl VirtualLeaf for LeafRecord {
    fn path(&self) -> Path {
        self.path
    }

    // Key length is included so ("ab", "c") and ("a", "bc") differ.
    fn leaf_hash(&self) -> Hash {
        Hash::digest_many(&[
            &[LEAF_DOMAIN],
            &(self.key.len() as u64).to_le_bytes(),
            &self.key,
            &self.value,
        ])
    }
}

/// A node hash at a path. Doubles as a pre-hashed leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRecord {
    pub path: Path,
    pub hash: Hash,
}

impl HashRecord {
    pub fn new(path: Path, hash: Hash) -> Self {
        HashRecord { path, hash }
    }
}

impl VirtualLeaf for HashRecord {
    fn path(&self) -> Path {
        self.path
    }

    fn leaf_hash(&self) -> Hash {
        self.hash
    }
}

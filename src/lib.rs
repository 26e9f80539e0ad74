//! # virtual_hasher
//!
//! Incremental, concurrent root hashing for a virtual binary Merkle tree.
//!
//! The tree is never materialized. Nodes are addressed by a `u64` path
//! (root 0, children of `p` at `2p+1` and `2p+2`) and the leaves occupy a
//! contiguous range of paths. When some leaves change, only the internal
//! nodes on their way to the root are recomputed; every other hash comes
//! from a caller-supplied source.
//!
//! ## Core Concepts
//!
//! - **Paths**: implicit node addresses, see [`model::path`]
//! - **Leaf extent**: the `[first, last]` range of leaf paths
//! - **Hash source**: where clean hashes from earlier passes are read
//! - **Listener**: receives every hash a pass recomputes
//!
//! ## Example
//!
//! ```
//! use virtual_hasher::{EmptySource, LeafRecord, VirtualHasher};
//!
//! let hasher = VirtualHasher::with_threads(2)?;
//! // Three leaves live at paths 2, 3 and 4
//! let leaves = vec![
//!     LeafRecord::new(2, "a", "1"),
//!     LeafRecord::new(3, "b", "2"),
//!     LeafRecord::new(4, "c", "3"),
//! ];
//! let root = hasher.hash(&EmptySource, Some(leaves), 2, 4, None)?;
//! assert!(root.is_some());
//! # Ok::<(), virtual_hasher::Error>(())
//! ```

pub mod config;
pub mod hasher;
pub mod model;
pub mod state;

mod error;

pub use config::HasherConfig;
pub use error::{Error, Result};
pub use hasher::rebuild::rebuild_root;
pub use hasher::{
    combine, combine_at, empty_root_hash, EmptySource, HashListener, HashSource, HashingStats,
    NodeKind, NoopListener, VirtualHasher, NODE_FORMAT_VERSION, NULL_HASH,
};
pub use model::{Hash, HashRecord, LeafExtent, LeafRecord, Path, VirtualLeaf, INVALID_PATH, ROOT_PATH};
pub use state::{MemoryHashStore, VirtualTree};

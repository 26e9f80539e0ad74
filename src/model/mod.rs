//! Core value types: paths, extents, hashes and records

mod extent;
mod hash;
pub mod path;
mod record;

pub use extent::LeafExtent;
pub use hash::{Hash, HASH_LEN};
pub use path::{Path, INVALID_PATH, ROOT_PATH};
pub use record::{HashRecord, LeafRecord, VirtualLeaf};

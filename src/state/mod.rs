//! Caller-side state around the hasher: where hashes are kept between
//! passes, and a key/value map laid out on virtual paths.

mod store;
mod tree;

pub use store::MemoryHashStore;
pub use tree::VirtualTree;

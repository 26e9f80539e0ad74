//! Read access to previously computed hashes

use crate::model::{Hash, Path};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Supplies the stored hash of a clean path.
///
/// The hasher only asks for paths whose subtree holds no dirty leaf, and
/// may ask from several worker threads at once. Implementations may block
/// (disk, network); returning `Ok(None)` for an in-range path fails the
/// pass with [`crate::Error::MissingHash`].
pub trait HashSource: Sync {
    fn read_hash(&self, path: Path) -> Result<Option<Hash>>;
}

impl<T: HashSource + ?Sized> HashSource for &T {
    fn read_hash(&self, path: Path) -> Result<Option<Hash>> {
        (**self).read_hash(path)
    }
}

impl<T: HashSource + Send + ?Sized> HashSource for Arc<T> {
    fn read_hash(&self, path: Path) -> Result<Option<Hash>> {
        (**self).read_hash(path)
    }
}

impl HashSource for HashMap<Path, Hash> {
    fn read_hash(&self, path: Path) -> Result<Option<Hash>> {
        Ok(self.get(&path).copied())
    }
}

/// Adapts a closure into a [`HashSource`]
pub struct FnSource<F>(F);

impl<F> HashSource for FnSource<F>
where
    F: Fn(Path) -> Result<Option<Hash>> + Sync,
{
    fn read_hash(&self, path: Path) -> Result<Option<Hash>> {
        (self.0)(path)
    }
}

pub fn from_fn<F>(f: F) -> FnSource<F>
where
    F: Fn(Path) -> Result<Option<Hash>> + Sync,
{
    FnSource(f)
}

/// A source with nothing in it. Fine for passes where every leaf is dirty.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptySource;

impl HashSource for EmptySource {
    fn read_hash(&self, _path: Path) -> Result<Option<Hash>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_map_source() {
        let mut map = HashMap::new();
        map.insert(4, Hash::digest(b"four"));
        assert_eq!(map.read_hash(4).unwrap(), Some(Hash::digest(b"four")));
        assert_eq!(map.read_hash(5).unwrap(), None);
    }

    #[test]
    fn test_fn_source_propagates_errors() {
        let source = from_fn(|path| {
            if path == 3 {
                Err(Error::Source("disk gone".into()))
            } else {
                Ok(Some(Hash::ZERO))
            }
        });
        assert!(source.read_hash(2).unwrap().is_some());
        assert!(matches!(source.read_hash(3), Err(Error::Source(_))));
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(EmptySource.read_hash(0).unwrap(), None);
    }
}

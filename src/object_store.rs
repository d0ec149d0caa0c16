use crate::object_id::ObjectId;

pub mod directory;
pub mod in_memory;

/// Append-only content addressed storage. Objects are never rewritten
/// or removed individually; an [`ObjectId`] always names the same bytes.
pub trait ObjectStore {
    type Error;

    fn has(&self, id: ObjectId) -> Result<bool, Self::Error>;

    fn read(&self, id: ObjectId) -> Result<Option<Vec<u8>>, Self::Error>;

    fn insert(&mut self, object: &[u8]) -> Result<ObjectId, Self::Error>;

    /// Every id whose hexadecimal form starts with `prefix`.
    fn find_prefix(&self, prefix: &str) -> Result<Vec<ObjectId>, Self::Error>;
}

use std::{collections::BTreeMap, convert::Infallible};

use crate::object_id::ObjectId;

use super::ObjectStore;

/// Scratch store used when only the ids of some content are wanted,
/// e.g. to compare the working tree against a revision without
/// writing anything into `.rev`.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: BTreeMap<ObjectId, Vec<u8>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectStore for InMemoryObjectStore {
    type Error = Infallible;

    fn has(&self, id: ObjectId) -> Result<bool, Self::Error> {
        Ok(self.objects.contains_key(&id))
    }

    fn read(&self, id: ObjectId) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.objects.get(&id).cloned())
    }

    fn insert(&mut self, object: &[u8]) -> Result<ObjectId, Self::Error> {
        let id: ObjectId = object.into();
        if !self.has(id)? {
            self.objects.insert(id, Vec::from(object));
        }
        Ok(id)
    }

    fn find_prefix(&self, prefix: &str) -> Result<Vec<ObjectId>, Self::Error> {
        Ok(self
            .objects
            .keys()
            .filter(|id| id.to_string().starts_with(prefix))
            .copied()
            .collect())
    }
}

#[test]
fn test_in_memory_object_store() {
    let mut store = InMemoryObjectStore::new();
    store.insert(b"hello, world").unwrap();
    store.insert(b"hello, world").unwrap();
    let b: &[u8] = b"hello, world";
    assert!(store.has(b.into()).unwrap());
    assert_eq!(store.read(b.into()).unwrap(), Some(Vec::from(b)));
    assert_eq!(store.find_prefix("").unwrap().len(), 1);
    let id = ObjectId::from(b);
    assert_eq!(store.find_prefix(&id.to_string()[..6]).unwrap(), vec![id]);
}

use std::{
    fs::{create_dir, create_dir_all, read_dir, File},
    io::{ErrorKind, Read, Write},
    path::PathBuf,
};

use crate::{hex::is_hex_digit, object_id::ObjectId};

use super::ObjectStore;

/// A persistent [`ObjectStore`] stored in a directory,
/// using the first two hexadecimal characters of the [`ObjectId`]
/// to determine which directory to place the binary object in
/// and creating a file with the rest of the hexadecimal characters
/// as the file name.
#[derive(Debug, Clone)]
pub struct DirectoryObjectStore {
    root: PathBuf,
}

impl DirectoryObjectStore {
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        if !root.try_exists()? {
            log::info!("creating directory store root: {:?}", root);
            create_dir_all(&root)?;
        }
        Ok(Self { root })
    }

    fn object_path(&self, id: ObjectId) -> PathBuf {
        let s: String = format!("{}", id);
        let subdir: &str = &s[0..2];
        let filename: &str = &s[2..];
        self.root.join(subdir).join(filename)
    }
}

impl ObjectStore for DirectoryObjectStore {
    type Error = std::io::Error;

    fn has(&self, id: ObjectId) -> Result<bool, Self::Error> {
        log::debug!("checking whether {} is contained in {:?}", id, self.root);
        self.object_path(id).try_exists()
    }

    fn read(&self, id: ObjectId) -> Result<Option<Vec<u8>>, Self::Error> {
        log::debug!("reading {} from {:?}", id, self.root);
        match File::options().read(true).open(self.object_path(id)) {
            Ok(mut f) => {
                let mut v = Vec::new();
                f.read_to_end(&mut v)?;
                Ok(Some(v))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn insert(&mut self, object: &[u8]) -> Result<ObjectId, Self::Error> {
        let id: ObjectId = object.into();
        if self.has(id)? {
            log::debug!("{} already stored", id);
            return Ok(id);
        }
        let path = self.object_path(id);
        log::info!("inserting {} into {:?}", id, self.root);
        if let Some(subdir_path) = path.parent() {
            if !subdir_path.try_exists()? {
                log::info!("creating subdir path {:?} in {:?}", subdir_path, self.root);
                create_dir(subdir_path)?;
            }
        }
        let mut f = File::options().create(true).write(true).truncate(true).open(path)?;
        f.write_all(object)?;
        Ok(id)
    }

    fn find_prefix(&self, prefix: &str) -> Result<Vec<ObjectId>, Self::Error> {
        let mut found = Vec::new();
        if !prefix.bytes().all(is_hex_digit) {
            return Ok(found);
        }
        for subdir in read_dir(&self.root)? {
            let subdir = subdir?;
            let subdir_name = subdir.file_name().to_string_lossy().into_owned();
            if subdir_name.len() != 2
                || !subdir_name.bytes().all(is_hex_digit)
                || !subdir.file_type()?.is_dir()
            {
                continue;
            }
            let shared = prefix.len().min(2);
            if subdir_name[..shared] != prefix[..shared] {
                continue;
            }
            for object in read_dir(subdir.path())? {
                let name = format!("{}{}", subdir_name, object?.file_name().to_string_lossy());
                if name.starts_with(prefix) {
                    if let Ok(id) = name.parse() {
                        found.push(id);
                    }
                }
            }
        }
        found.sort();
        Ok(found)
    }
}

#[test]
fn test_directory_object_store() {
    let tempdir = tempfile::tempdir().unwrap();
    let mut store = DirectoryObjectStore::new(tempdir.path().into()).unwrap();
    store.insert(b"hello, world").unwrap();
    let b: &[u8] = b"hello, world";
    assert!(store.has(b.into()).unwrap());
    assert_eq!(store.read(b.into()).unwrap(), Some(Vec::from(b)));
    let missing: &[u8] = b"never inserted";
    assert!(!store.has(missing.into()).unwrap());
    assert_eq!(store.read(missing.into()).unwrap(), None);
}

#[test]
fn test_find_prefix() {
    let tempdir = tempfile::tempdir().unwrap();
    let mut store = DirectoryObjectStore::new(tempdir.path().join("store")).unwrap();
    let a = store.insert(b"first").unwrap();
    let b = store.insert(b"second").unwrap();
    let a_hex = a.to_string();
    assert_eq!(store.find_prefix(&a_hex[..8]).unwrap(), vec![a]);
    assert_eq!(store.find_prefix(&a_hex).unwrap(), vec![a]);
    assert!(store.find_prefix(&a_hex[..1]).unwrap().contains(&a));
    assert!(store.find_prefix("xyz").unwrap().is_empty());
    let mut both = vec![a, b];
    both.sort();
    assert_eq!(store.find_prefix("").unwrap(), both);
}

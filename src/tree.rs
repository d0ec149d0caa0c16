use std::{
    collections::BTreeMap,
    fs::read_dir,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    dot_rev::DOT_REV, error::Error, ignore::IgnoreMatcher, object_id::ObjectId,
    object_store::ObjectStore,
};

/// A directory structure with names of files pointing to an [`ObjectId`].
#[derive(PartialEq, Eq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tree {
    pub entries: BTreeMap<String, TreeEntry>,
}

#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
pub enum TreeEntry {
    Directory(Box<Tree>),
    File(ObjectId),
}

impl Tree {
    /// Records every regular file below `root` into `store`, skipping the
    /// `.rev` metadata directory and whatever `ignores` excludes.
    pub fn scan<S>(root: &Path, ignores: &IgnoreMatcher, store: &mut S) -> Result<Tree, Error>
    where
        S: ObjectStore,
        Error: From<S::Error>,
    {
        Self::scan_dir(root, "", ignores, store)
    }

    fn scan_dir<S>(dir: &Path, rel: &str, ignores: &IgnoreMatcher, store: &mut S) -> Result<Tree, Error>
    where
        S: ObjectStore,
        Error: From<S::Error>,
    {
        let mut entries = BTreeMap::new();
        for f in read_dir(dir)? {
            let dir_entry = f?;
            let name = match dir_entry.file_name().into_string() {
                Ok(name) => name,
                Err(name) => {
                    log::warn!("skipping non utf-8 file name {:?}", name);
                    continue;
                }
            };
            if rel.is_empty() && name == DOT_REV {
                continue;
            }
            let rel_path = if rel.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", rel, name)
            };
            if ignores.ignore(&rel_path) {
                continue;
            }
            let file_type = dir_entry.file_type()?;
            if file_type.is_dir() {
                let tree = Self::scan_dir(&dir_entry.path(), &rel_path, ignores, store)?;
                if !tree.entries.is_empty() {
                    entries.insert(name, TreeEntry::Directory(Box::new(tree)));
                }
            } else if file_type.is_file() {
                let content = std::fs::read(dir_entry.path())?;
                let id = store.insert(&content)?;
                entries.insert(name, TreeEntry::File(id));
            } else {
                log::warn!("skipping {:?}: neither a file nor a directory", rel_path);
            }
        }
        Ok(Tree { entries })
    }

    /// Flattens the tree into relative file paths.
    pub fn files(&self) -> BTreeMap<PathBuf, ObjectId> {
        let mut out = BTreeMap::new();
        self.collect(Path::new(""), &mut out);
        out
    }

    fn collect(&self, prefix: &Path, out: &mut BTreeMap<PathBuf, ObjectId>) {
        for (name, entry) in &self.entries {
            let path = prefix.join(name);
            match entry {
                TreeEntry::File(id) => {
                    out.insert(path, *id);
                }
                TreeEntry::Directory(tree) => tree.collect(&path, out),
            }
        }
    }
}

#[cfg(test)]
fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

#[test]
fn test_scan_tree() {
    use crate::object_store::in_memory::InMemoryObjectStore;

    let tempdir = tempfile::tempdir().unwrap();
    let root = tempdir.path();
    write(root, "README.md", "hello");
    write(root, "src/main.rs", "fn main() {}");
    write(root, "debug.log", "noise");
    write(root, ".rev/HEAD", "A");
    std::fs::create_dir_all(root.join("empty")).unwrap();

    let ignores = IgnoreMatcher::parse("*.log");
    let mut store = InMemoryObjectStore::new();
    let tree = Tree::scan(root, &ignores, &mut store).unwrap();

    let files = tree.files();
    let paths: Vec<&Path> = files.keys().map(PathBuf::as_path).collect();
    assert_eq!(paths, vec![Path::new("README.md"), Path::new("src/main.rs")]);
    let hello: &[u8] = b"hello";
    assert_eq!(files[Path::new("README.md")], ObjectId::from(hello));
    assert_eq!(store.find_prefix("").unwrap().len(), 2);
}

#[test]
fn test_ignored_directory_is_skipped_whole() {
    use crate::object_store::in_memory::InMemoryObjectStore;

    let tempdir = tempfile::tempdir().unwrap();
    let root = tempdir.path();
    write(root, "target/debug/app", "binary");
    write(root, "keep.txt", "kept");

    let tree = Tree::scan(
        root,
        &IgnoreMatcher::parse("target"),
        &mut InMemoryObjectStore::new(),
    )
    .unwrap();
    assert_eq!(tree.entries.len(), 1);
    assert!(tree.entries.contains_key("keep.txt"));
}

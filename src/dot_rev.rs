use std::{
    collections::{BTreeMap, BTreeSet},
    fs::{create_dir_all, read_dir, read_to_string, remove_dir, remove_file, write, File},
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    hex::is_hex_digit,
    ignore::IgnoreMatcher,
    object_id::ObjectId,
    object_store::{directory::DirectoryObjectStore, in_memory::InMemoryObjectStore, ObjectStore},
    revision::{Revision, Signature},
    tree::Tree,
};

/// Name of the metadata directory inside a working directory.
pub const DOT_REV: &str = ".rev";

const HEAD: &str = "HEAD";
const BRANCHES: &str = "branches";
const STORE: &str = "store";

/// Shortest id prefix [`DotRev::resolve`] accepts.
pub const MIN_PREFIX: usize = 4;

/// The revision store of one working directory, kept in its `.rev`
/// directory:
///
/// - `HEAD` names the current branch,
/// - `branches/<name>` holds the id of each branch's newest revision,
/// - `store/` holds trees, revisions and file contents by [`ObjectId`].
pub struct DotRev {
    workdir: PathBuf,
    root: PathBuf,
    store: DirectoryObjectStore,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CommitOptions {
    /// Record a revision even when the tree equals the parent's.
    pub allow_empty: bool,
}

impl DotRev {
    pub fn path(workdir: &Path) -> PathBuf {
        workdir.join(DOT_REV)
    }

    pub fn exists(workdir: &Path) -> Result<bool, Error> {
        Ok(Self::path(workdir).join(HEAD).try_exists()?)
    }

    /// Creates the store with `branch` as the current, still unborn,
    /// branch. An existing store is opened untouched.
    pub fn init(workdir: PathBuf, branch: &str) -> Result<Self, Error> {
        if Self::exists(&workdir)? {
            return Self::open(workdir);
        }
        let root = Self::path(&workdir);
        log::info!("creating revision store in {:?}", root);
        create_dir_all(root.join(BRANCHES))?;
        write(root.join(HEAD), branch)?;
        Self::open(workdir)
    }

    pub fn open(workdir: PathBuf) -> Result<Self, Error> {
        if !Self::exists(&workdir)? {
            return Err(Error::NotARepository(workdir));
        }
        let root = Self::path(&workdir);
        let store = DirectoryObjectStore::new(root.join(STORE))?;
        Ok(DotRev {
            workdir,
            root,
            store,
        })
    }

    pub fn head_branch(&self) -> Result<String, Error> {
        Ok(read_to_string(self.root.join(HEAD))?.trim().to_string())
    }

    fn set_head_branch(&self, branch: &str) -> Result<(), Error> {
        Ok(write(self.root.join(HEAD), branch)?)
    }

    fn branch_path(&self, branch: &str) -> Result<PathBuf, Error> {
        let valid = !branch.is_empty()
            && branch != "."
            && branch != ".."
            && branch != HEAD
            && !branch.contains(&['/', '\\', '~', '^'][..]);
        if !valid {
            return Err(Error::UnknownBranch(branch.to_string()));
        }
        Ok(self.root.join(BRANCHES).join(branch))
    }

    /// The newest revision of `branch`, `None` while it is unborn or absent.
    pub fn branch_id(&self, branch: &str) -> Result<Option<ObjectId>, Error> {
        match File::options().read(true).open(self.branch_path(branch)?) {
            Ok(f) => Ok(Some(serde_json::from_reader(f)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set_branch_id(&self, branch: &str, id: ObjectId) -> Result<(), Error> {
        write_json(&id, &self.branch_path(branch)?)
    }

    pub fn head_id(&self) -> Result<Option<ObjectId>, Error> {
        self.branch_id(&self.head_branch()?)
    }

    /// Names of all born branches, sorted.
    pub fn branches(&self) -> Result<Vec<String>, Error> {
        let mut names = Vec::new();
        for entry in read_dir(self.root.join(BRANCHES))? {
            if let Ok(name) = entry?.file_name().into_string() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Points a new branch at the current head. Neither HEAD nor the
    /// working directory change.
    pub fn create_branch(&self, branch: &str) -> Result<ObjectId, Error> {
        if self.branch_id(branch)?.is_some() {
            return Err(Error::BranchExists(branch.to_string()));
        }
        let head = self
            .head_id()?
            .ok_or_else(|| Error::UnresolvedReference(String::from(HEAD)))?;
        self.set_branch_id(branch, head)?;
        log::info!("created branch {} at {}", branch, head);
        Ok(head)
    }

    pub fn revision(&self, id: ObjectId) -> Result<Revision, Error> {
        self.store.read_json(id)
    }

    pub fn tree(&self, id: ObjectId) -> Result<Tree, Error> {
        self.store.read_json(id)
    }

    /// File contents by id, as recorded in the store.
    pub fn content(&self, id: ObjectId) -> Result<Vec<u8>, Error> {
        self.store.read(id)?.ok_or(Error::MissingObject(id))
    }

    fn revision_files(&self, id: Option<ObjectId>) -> Result<BTreeMap<PathBuf, ObjectId>, Error> {
        match id {
            None => Ok(BTreeMap::new()),
            Some(id) => Ok(self.tree(self.revision(id)?.tree)?.files()),
        }
    }

    /// Files as they currently are in the working directory. Nothing is
    /// written to the store.
    pub fn working_files(&self) -> Result<BTreeMap<PathBuf, ObjectId>, Error> {
        let mut scratch = InMemoryObjectStore::new();
        let ignores = IgnoreMatcher::load(&self.workdir);
        Ok(Tree::scan(&self.workdir, &ignores, &mut scratch)?.files())
    }

    /// Stages every addition, modification and deletion in the working
    /// directory and records it as a child of the current branch's head.
    pub fn commit(
        &mut self,
        message: &str,
        author: &Signature,
        options: CommitOptions,
    ) -> Result<ObjectId, Error> {
        let ignores = IgnoreMatcher::load(&self.workdir);
        let tree = Tree::scan(&self.workdir, &ignores, &mut self.store)?;
        let tree_id = self.store.insert_json(&tree)?;
        self.commit_tree(tree_id, message, author, options)
    }

    /// Records the stored `tree` as a child of the current branch's head.
    /// The working directory is not looked at.
    pub fn commit_tree(
        &mut self,
        tree: ObjectId,
        message: &str,
        author: &Signature,
        options: CommitOptions,
    ) -> Result<ObjectId, Error> {
        let branch = self.head_branch()?;
        let parent = self.branch_id(&branch)?;
        if let Some(parent) = parent {
            if !options.allow_empty && self.revision(parent)?.tree == tree {
                return Err(Error::NothingToCommit);
            }
        }
        let revision = Revision {
            message: message.to_string(),
            tree,
            parents: parent.into_iter().collect(),
            author: author.clone(),
            timestamp: Utc::now(),
        };
        let id = self.store.insert_json(&revision)?;
        self.set_branch_id(&branch, id)?;
        log::info!("committed {} on {} as {}: {:?}", id, branch, author, message);
        Ok(id)
    }

    /// Creates `branch` at the current head, switches to it and records
    /// `message` there, even with nothing changed. When any step fails,
    /// HEAD goes back to the previous branch and `branch` is removed.
    pub fn open_branch(
        &mut self,
        branch: &str,
        message: &str,
        author: &Signature,
    ) -> Result<ObjectId, Error> {
        let previous = self.head_branch()?;
        self.create_branch(branch)?;
        let opened = match self.checkout(branch, false) {
            Ok(()) => self.commit(message, author, CommitOptions { allow_empty: true }),
            Err(err) => Err(err),
        };
        if let Err(err) = &opened {
            log::warn!("dropping branch {}: {}", branch, err);
            self.set_head_branch(&previous)?;
            remove_file(self.branch_path(branch)?)?;
        }
        opened
    }

    /// Switches HEAD to `branch` and brings the working directory to its
    /// newest revision.
    ///
    /// Unless `force` is set, a path that differs between the two revisions
    /// and whose working copy matches neither of them aborts the switch with
    /// [`Error::WouldOverwrite`]. With `force`, local edits to tracked files
    /// are discarded.
    pub fn checkout(&mut self, branch: &str, force: bool) -> Result<(), Error> {
        let target = self
            .branch_id(branch)?
            .ok_or_else(|| Error::UnknownBranch(branch.to_string()))?;
        let current = self.revision_files(self.head_id()?)?;
        let wanted = self.revision_files(Some(target))?;
        if !force {
            let working = self.working_files()?;
            let paths: BTreeSet<&PathBuf> = current.keys().chain(wanted.keys()).collect();
            let conflicts: Vec<PathBuf> = paths
                .into_iter()
                .filter(|p| current.get(*p) != wanted.get(*p))
                .filter(|p| {
                    let local = working.get(*p);
                    local != current.get(*p) && local != wanted.get(*p)
                })
                .cloned()
                .collect();
            if !conflicts.is_empty() {
                return Err(Error::WouldOverwrite(conflicts));
            }
        }
        self.apply(&current, &wanted, force)?;
        self.set_head_branch(branch)?;
        log::info!("switched to {}", branch);
        Ok(())
    }

    /// Brings the tracked content of the working directory to `target`'s
    /// tree, discarding local edits, and returns that tree. Untracked files
    /// stay. The current branch keeps pointing at its head, so
    /// [`DotRev::commit_tree`] with the returned tree records exactly
    /// `target`'s content on top of it.
    pub fn reset_hard(&mut self, target: ObjectId) -> Result<ObjectId, Error> {
        let current = self.revision_files(self.head_id()?)?;
        let tree = self.revision(target)?.tree;
        let wanted = self.tree(tree)?.files();
        self.apply(&current, &wanted, true)?;
        log::info!("reset working directory to {}", target);
        Ok(tree)
    }

    fn apply(
        &self,
        current: &BTreeMap<PathBuf, ObjectId>,
        wanted: &BTreeMap<PathBuf, ObjectId>,
        overwrite_all: bool,
    ) -> Result<(), Error> {
        for (path, id) in wanted {
            if overwrite_all || current.get(path) != Some(id) {
                let full = self.workdir.join(path);
                if let Some(parent) = full.parent() {
                    create_dir_all(parent)?;
                }
                write(&full, self.content(*id)?)?;
            }
        }
        for path in current.keys().filter(|p| !wanted.contains_key(*p)) {
            let full = self.workdir.join(path);
            match remove_file(&full) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
            self.prune_empty_dirs(full.parent());
        }
        Ok(())
    }

    fn prune_empty_dirs(&self, mut dir: Option<&Path>) {
        while let Some(d) = dir {
            if d == self.workdir || !d.starts_with(&self.workdir) {
                break;
            }
            // fails once the directory still has entries
            if remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
    }

    /// Resolves `HEAD`, a branch name, a full id or a unique id prefix of
    /// at least [`MIN_PREFIX`] characters, optionally followed by `~N` or
    /// `^`s to step back along first parents.
    pub fn resolve(&self, reference: &str) -> Result<ObjectId, Error> {
        let unresolved = || Error::UnresolvedReference(reference.to_string());
        let (base, steps) = split_ancestry(reference).ok_or_else(unresolved)?;
        let mut id = self.resolve_base(base)?.ok_or_else(unresolved)?;
        for _ in 0..steps {
            id = *self.revision(id)?.parents.first().ok_or_else(unresolved)?;
        }
        Ok(id)
    }

    fn resolve_base(&self, base: &str) -> Result<Option<ObjectId>, Error> {
        if base == HEAD {
            return self.head_id();
        }
        match self.branch_id(base) {
            Ok(Some(id)) => return Ok(Some(id)),
            Ok(None) | Err(Error::UnknownBranch(_)) => {}
            Err(err) => return Err(err),
        }
        if base.len() < MIN_PREFIX || !base.bytes().all(is_hex_digit) {
            return Ok(None);
        }
        let candidates: Vec<ObjectId> = self
            .store
            .find_prefix(base)?
            .into_iter()
            .filter(|id| self.revision(*id).is_ok())
            .collect();
        match candidates.as_slice() {
            [id] => Ok(Some(*id)),
            _ => Ok(None),
        }
    }

    /// Every revision reachable from `from`, each exactly once, walking
    /// first parents before the others.
    pub fn log(&self, from: ObjectId) -> Result<Vec<(ObjectId, Revision)>, Error> {
        let mut seen = BTreeSet::new();
        let mut pending = vec![from];
        let mut out = Vec::new();
        while let Some(id) = pending.pop() {
            if !seen.insert(id) {
                continue;
            }
            let revision = self.revision(id)?;
            pending.extend(revision.parents.iter().rev().copied());
            out.push((id, revision));
        }
        Ok(out)
    }
}

/// Splits `name~3` into `("name", 3)` and `name^^` into `("name", 2)`.
fn split_ancestry(reference: &str) -> Option<(&str, usize)> {
    if let Some((base, n)) = reference.split_once('~') {
        let steps = if n.is_empty() { 1 } else { n.parse().ok()? };
        return Some((base, steps));
    }
    let base = reference.trim_end_matches('^');
    Some((base, reference.len() - base.len()))
}

/// A convenience trait for writing and reading JSON from the [`DirectoryObjectStore`].
pub trait InsertJson {
    /// Inserts a pretty JSON encoded version of the thing into the store.
    fn insert_json<A: Serialize>(&mut self, thing: &A) -> Result<ObjectId, Error>;

    /// Reads a JSON encoded thing of the given type from the store at that given [`ObjectId`].
    fn read_json<A: for<'de> Deserialize<'de>>(&self, object_id: ObjectId) -> Result<A, Error>;
}

impl InsertJson for DirectoryObjectStore {
    fn insert_json<A: Serialize>(&mut self, thing: &A) -> Result<ObjectId, Error> {
        Ok(self.insert(&serde_json::to_vec_pretty(thing)?)?)
    }

    fn read_json<A: for<'de> Deserialize<'de>>(&self, object_id: ObjectId) -> Result<A, Error> {
        match self.read(object_id)? {
            None => Err(Error::MissingObject(object_id)),
            Some(obj) => Ok(serde_json::from_slice(&obj)?),
        }
    }
}

fn write_json<A: Serialize>(thing: &A, path: &Path) -> Result<(), Error> {
    Ok(serde_json::to_writer_pretty(
        File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?,
        thing,
    )?)
}

#[cfg(test)]
fn bot() -> Signature {
    Signature {
        name: String::from("tester"),
        email: String::from("tester@example.com"),
    }
}

#[test]
fn test_init_is_idempotent() {
    let tempdir = tempfile::tempdir().unwrap();
    let workdir = tempdir.path().to_path_buf();
    assert!(!DotRev::exists(&workdir).unwrap());
    assert!(matches!(DotRev::open(workdir.clone()), Err(Error::NotARepository(_))));

    let mut rev = DotRev::init(workdir.clone(), "A").unwrap();
    assert_eq!(rev.head_branch().unwrap(), "A");
    assert_eq!(rev.head_id().unwrap(), None);
    let first = rev.commit("first", &bot(), CommitOptions { allow_empty: true }).unwrap();

    let reopened = DotRev::init(workdir, "Z").unwrap();
    assert_eq!(reopened.head_branch().unwrap(), "A");
    assert_eq!(reopened.head_id().unwrap(), Some(first));
    assert_eq!(reopened.branches().unwrap(), vec![String::from("A")]);
}

#[test]
fn test_commit_requires_changes() {
    let tempdir = tempfile::tempdir().unwrap();
    let workdir = tempdir.path().to_path_buf();
    let mut rev = DotRev::init(workdir.clone(), "A").unwrap();
    write(workdir.join("a.txt"), "one").unwrap();
    let first = rev.commit("one", &bot(), CommitOptions::default()).unwrap();
    assert!(matches!(
        rev.commit("again", &bot(), CommitOptions::default()),
        Err(Error::NothingToCommit)
    ));
    assert_eq!(rev.head_id().unwrap(), Some(first));

    remove_file(workdir.join("a.txt")).unwrap();
    let second = rev.commit("deleted", &bot(), CommitOptions::default()).unwrap();
    let revision = rev.revision(second).unwrap();
    assert_eq!(revision.parents, vec![first]);
    assert!(rev.tree(revision.tree).unwrap().entries.is_empty());
}

#[test]
fn test_resolve_references() {
    let tempdir = tempfile::tempdir().unwrap();
    let workdir = tempdir.path().to_path_buf();
    let mut rev = DotRev::init(workdir.clone(), "A").unwrap();
    write(workdir.join("a.txt"), "one").unwrap();
    let first = rev.commit("one", &bot(), CommitOptions::default()).unwrap();
    write(workdir.join("a.txt"), "two").unwrap();
    let second = rev.commit("two", &bot(), CommitOptions::default()).unwrap();
    write(workdir.join("a.txt"), "three").unwrap();
    let third = rev.commit("three", &bot(), CommitOptions::default()).unwrap();

    assert_eq!(rev.resolve("HEAD").unwrap(), third);
    assert_eq!(rev.resolve("A").unwrap(), third);
    assert_eq!(rev.resolve("A^").unwrap(), second);
    assert_eq!(rev.resolve("HEAD~2").unwrap(), first);
    assert_eq!(rev.resolve("A^^").unwrap(), first);
    assert_eq!(rev.resolve(&second.to_string()).unwrap(), second);
    assert_eq!(rev.resolve(&second.to_string()[..12]).unwrap(), second);
    assert!(matches!(rev.resolve("A~3"), Err(Error::UnresolvedReference(_))));
    assert!(matches!(rev.resolve("nope"), Err(Error::UnresolvedReference(_))));
    assert!(matches!(rev.resolve("../HEAD"), Err(Error::UnresolvedReference(_))));
    assert!(matches!(rev.resolve("A~x"), Err(Error::UnresolvedReference(_))));
}

#[test]
fn test_checkout_switches_content() {
    let tempdir = tempfile::tempdir().unwrap();
    let workdir = tempdir.path().to_path_buf();
    let mut rev = DotRev::init(workdir.clone(), "A").unwrap();
    write(workdir.join("shared.txt"), "base").unwrap();
    rev.commit("base", &bot(), CommitOptions::default()).unwrap();

    rev.create_branch("B").unwrap();
    rev.checkout("B", false).unwrap();
    create_dir_all(workdir.join("nested")).unwrap();
    write(workdir.join("nested/only-b.txt"), "b").unwrap();
    write(workdir.join("shared.txt"), "changed on b").unwrap();
    rev.commit("b work", &bot(), CommitOptions::default()).unwrap();

    rev.checkout("A", false).unwrap();
    assert_eq!(read_to_string(workdir.join("shared.txt")).unwrap(), "base");
    assert!(!workdir.join("nested").exists());

    write(workdir.join("shared.txt"), "local edit").unwrap();
    match rev.checkout("B", false) {
        Err(Error::WouldOverwrite(paths)) => assert_eq!(paths, vec![PathBuf::from("shared.txt")]),
        other => panic!("expected refusal, got {:?}", other.map(|_| ())),
    }
    assert_eq!(rev.head_branch().unwrap(), "A");

    rev.checkout("B", true).unwrap();
    assert_eq!(read_to_string(workdir.join("shared.txt")).unwrap(), "changed on b");
    assert_eq!(read_to_string(workdir.join("nested/only-b.txt")).unwrap(), "b");
    assert!(matches!(rev.checkout("Q", false), Err(Error::UnknownBranch(_))));
}

#[test]
fn test_log_visits_each_revision_once() {
    let tempdir = tempfile::tempdir().unwrap();
    let workdir = tempdir.path().to_path_buf();
    let mut rev = DotRev::init(workdir.clone(), "A").unwrap();
    let mut ids = Vec::new();
    for i in 0..4 {
        write(workdir.join("n.txt"), i.to_string()).unwrap();
        ids.push(rev.commit(&format!("c{}", i), &bot(), CommitOptions::default()).unwrap());
    }
    let log = rev.log(*ids.last().unwrap()).unwrap();
    let walked: Vec<ObjectId> = log.iter().map(|(id, _)| *id).rev().collect();
    assert_eq!(walked, ids);
}

#[test]
fn test_commit_tree_ignores_working_directory() {
    let tempdir = tempfile::tempdir().unwrap();
    let workdir = tempdir.path().to_path_buf();
    let mut rev = DotRev::init(workdir.clone(), "A").unwrap();
    write(workdir.join("a.txt"), "one").unwrap();
    let first = rev.commit("one", &bot(), CommitOptions::default()).unwrap();
    let tree = rev.revision(first).unwrap().tree;

    write(workdir.join("stray.txt"), "untracked").unwrap();
    assert!(matches!(
        rev.commit_tree(tree, "same", &bot(), CommitOptions::default()),
        Err(Error::NothingToCommit)
    ));
    let second = rev
        .commit_tree(tree, "same", &bot(), CommitOptions { allow_empty: true })
        .unwrap();
    let revision = rev.revision(second).unwrap();
    assert_eq!(revision.parents, vec![first]);
    assert_eq!(revision.tree, tree);
    assert_eq!(rev.head_id().unwrap(), Some(second));
}

use std::{
    fmt::Display,
    fs::remove_dir_all,
    path::{Path, PathBuf},
};

use derive_more::{Display, From};

use crate::{
    branches::{self, MAIN},
    dot_rev::{CommitOptions, DotRev},
    error::Error,
    object_id::ObjectId,
    revision::{HistoryEntry, Signature},
};

/// Identity that selects anonymous mode.
pub const ANONYMOUS_IDENTITY: &str = "default";
/// Text form of [`Outcome::Anonymous`].
pub const ANONYMOUS_SENTINEL: &str = "?";
/// Text form of [`Outcome::Failed`] and [`Outcome::NotInitialized`].
pub const FAILURE_SENTINEL: &str = "";
/// Message of the first revision on [`MAIN`].
pub const INIT_MESSAGE: &str = "Initialized";

pub const AUTHOR_NAME: &str = "Revision Bot";
pub const AUTHOR_EMAIL: &str = "bot@example.com";

#[derive(Debug, Display, From)]
pub enum WorkspaceError {
    #[display(fmt = "cannot set up revision store: {}", _0)]
    Setup(Error),
    #[display(fmt = "no revision store initialized")]
    NotInitialized,
    #[from]
    #[display(fmt = "{}", _0)]
    Engine(Error),
    #[display(fmt = "failed to remove {}: {}", "_0.display()", _1)]
    Purge(PathBuf, std::io::Error),
}

impl std::error::Error for WorkspaceError {}

/// Result of the operations that report failure without an error value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Done(T),
    /// The workspace runs without a store.
    Anonymous,
    /// The store was purged.
    NotInitialized,
    /// The store refused; the reason went to the log and nothing changed.
    Failed,
}

impl<T> Outcome<T> {
    pub fn done(self) -> Option<T> {
        match self {
            Outcome::Done(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }
}

impl<T: Display> Outcome<T> {
    /// The single string older callers expect: the value itself,
    /// [`ANONYMOUS_SENTINEL`] or [`FAILURE_SENTINEL`].
    pub fn sentinel(&self) -> String {
        match self {
            Outcome::Done(value) => value.to_string(),
            Outcome::Anonymous => String::from(ANONYMOUS_SENTINEL),
            Outcome::NotInitialized | Outcome::Failed => String::from(FAILURE_SENTINEL),
        }
    }
}

/// A fresh alternate line and the revision that opened it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branched {
    pub branch: String,
    pub revision: ObjectId,
}

impl Display for Branched {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.revision)
    }
}

enum Backend {
    Attached(DotRev),
    Anonymous,
    Purged,
}

/// A working directory versioned as one main line plus alternates that
/// are branched off, iterated on and promoted back.
///
/// The directory and its `.rev` store belong to this value alone; nothing
/// guards against a second instance or process working on the same store.
pub struct VersionedWorkspace {
    workdir: PathBuf,
    backend: Backend,
}

impl VersionedWorkspace {
    /// Opens the store in `workdir`, creating it with an initial revision on
    /// [`MAIN`] when there is none. [`ANONYMOUS_IDENTITY`] attaches no store.
    pub fn new(identity: &str, workdir: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let workdir = workdir.into();
        if identity == ANONYMOUS_IDENTITY {
            log::debug!("anonymous workspace in {:?}", workdir);
            return Ok(VersionedWorkspace {
                workdir,
                backend: Backend::Anonymous,
            });
        }
        let mut engine = DotRev::init(workdir.clone(), MAIN).map_err(WorkspaceError::Setup)?;
        if engine.head_id().map_err(WorkspaceError::Setup)?.is_none() {
            log::info!("initializing revision store in {:?} for {}", workdir, identity);
            engine
                .commit(INIT_MESSAGE, &author(), CommitOptions { allow_empty: true })
                .map_err(WorkspaceError::Setup)?;
        }
        Ok(VersionedWorkspace {
            workdir,
            backend: Backend::Attached(engine),
        })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn is_attached(&self) -> bool {
        matches!(self.backend, Backend::Attached(_))
    }

    /// Read access to the store, for inspection.
    pub fn engine(&self) -> Option<&DotRev> {
        match &self.backend {
            Backend::Attached(engine) => Some(engine),
            _ => None,
        }
    }

    /// Records all changes in the working directory on the current branch.
    pub fn commit(&mut self, message: &str) -> Outcome<ObjectId> {
        let engine = match &mut self.backend {
            Backend::Attached(engine) => engine,
            Backend::Anonymous => return Outcome::Anonymous,
            Backend::Purged => return Outcome::NotInitialized,
        };
        match engine.commit(message, &author(), CommitOptions::default()) {
            Ok(id) => Outcome::Done(id),
            Err(err) => {
                log::warn!("commit {:?} failed: {}", message, err);
                Outcome::Failed
            }
        }
    }

    /// Opens the next alternate line at the current head, switches to it and
    /// records a revision naming `base` and `comment`. The working directory
    /// is left as it is.
    pub fn branch_from(&mut self, base: &str, comment: &str) -> Outcome<Branched> {
        let engine = match &mut self.backend {
            Backend::Attached(engine) => engine,
            Backend::Anonymous => return Outcome::Anonymous,
            Backend::Purged => return Outcome::NotInitialized,
        };
        match open_branch(engine, base, comment) {
            Ok(Some(branched)) => Outcome::Done(branched),
            Ok(None) => {
                log::warn!("no branch name left after {} alternates", branches::MAX_ALTERNATES);
                Outcome::Failed
            }
            Err(err) => {
                log::warn!("branching from {} failed: {}", base, err);
                Outcome::Failed
            }
        }
    }

    /// The name [`VersionedWorkspace::branch_from`] would use next.
    pub fn next_branch_name(&self) -> Outcome<String> {
        let engine = match &self.backend {
            Backend::Attached(engine) => engine,
            Backend::Anonymous => return Outcome::Anonymous,
            Backend::Purged => return Outcome::NotInitialized,
        };
        match allocate(engine) {
            Ok(Some(name)) => Outcome::Done(name),
            Ok(None) => Outcome::Failed,
            Err(err) => {
                log::warn!("cannot list branches: {}", err);
                Outcome::Failed
            }
        }
    }

    /// One entry per revision reachable from the current head, in text
    /// order of `timestamp|message`, i.e. oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        let Some(engine) = self.engine() else {
            return Vec::new();
        };
        let walk = engine
            .head_id()
            .and_then(|head| match head {
                Some(head) => engine.log(head),
                None => Ok(Vec::new()),
            });
        match walk {
            Ok(revisions) => {
                let mut entries: Vec<HistoryEntry> =
                    revisions.iter().map(|(_, r)| HistoryEntry::from(r)).collect();
                entries.sort();
                entries
            }
            Err(err) => {
                log::warn!("cannot walk history: {}", err);
                Vec::new()
            }
        }
    }

    /// Switches to `branch`, refusing when local changes would be lost.
    pub fn checkout(&mut self, branch: &str) -> Result<(), WorkspaceError> {
        let engine = self.attached_mut()?;
        Ok(engine.checkout(branch, false)?)
    }

    /// Makes [`MAIN`]'s content equal to `source`'s and records that as one
    /// new revision on top of main's previous head. Local edits are
    /// discarded; untracked files stay in the working directory but are not
    /// recorded.
    pub fn rewrite_to_main(&mut self, source: &str, message: &str) -> Result<ObjectId, WorkspaceError> {
        let engine = self.attached_mut()?;
        engine.checkout(MAIN, true)?;
        let target = engine.resolve(source)?;
        let tree = engine.reset_hard(target)?;
        let options = CommitOptions { allow_empty: true };
        let id = engine.commit_tree(tree, message, &author(), options)?;
        log::info!("promoted {} ({}) to {} as {}", source, target, MAIN, id);
        Ok(id)
    }

    /// Deletes the whole store, leaving the working files alone. The
    /// workspace is unusable afterwards until constructed again.
    pub fn purge(&mut self) -> Result<(), WorkspaceError> {
        if let Backend::Anonymous = self.backend {
            return Ok(());
        }
        let root = DotRev::path(&self.workdir);
        match remove_dir_all(&root) {
            Ok(()) => log::info!("purged {:?}", root),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(WorkspaceError::Purge(root, err)),
        }
        self.backend = Backend::Purged;
        Ok(())
    }

    pub fn current_branch(&self) -> Option<String> {
        self.engine()?.head_branch().ok()
    }

    pub fn branches(&self) -> Vec<String> {
        match self.engine().map(DotRev::branches) {
            Some(Ok(names)) => names,
            Some(Err(err)) => {
                log::warn!("cannot list branches: {}", err);
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    fn attached_mut(&mut self) -> Result<&mut DotRev, WorkspaceError> {
        match &mut self.backend {
            Backend::Attached(engine) => Ok(engine),
            _ => Err(WorkspaceError::NotInitialized),
        }
    }
}

fn author() -> Signature {
    Signature {
        name: String::from(AUTHOR_NAME),
        email: String::from(AUTHOR_EMAIL),
    }
}

fn allocate(engine: &DotRev) -> Result<Option<String>, Error> {
    let names = engine.branches()?;
    Ok(branches::alternate_name(branches::count_alternates(
        names.iter().map(String::as_str),
    )))
}

fn open_branch(engine: &mut DotRev, base: &str, comment: &str) -> Result<Option<Branched>, Error> {
    let Some(branch) = allocate(engine)? else {
        return Ok(None);
    };
    let revision = engine.open_branch(
        &branch,
        &format!("Branched from {}: {}", base, comment),
        &author(),
    )?;
    log::info!("opened branch {} from {}", branch, base);
    Ok(Some(Branched { branch, revision }))
}

#[cfg(test)]
fn scratch() -> (tempfile::TempDir, crate::workspace::Workspace) {
    let tempdir = tempfile::tempdir().unwrap();
    let fs = crate::workspace::Workspace::new(tempdir.path()).unwrap();
    (tempdir, fs)
}

#[cfg(test)]
fn messages(vcr: &VersionedWorkspace) -> Vec<String> {
    vcr.history().into_iter().map(|entry| entry.message).collect()
}

#[test]
fn test_commit_and_history() {
    let (tempdir, fs) = scratch();
    fs.write("init", &["f1.txt"]).unwrap();
    let mut vcr = VersionedWorkspace::new("tester", tempdir.path()).unwrap();
    assert_eq!(vcr.current_branch().as_deref(), Some(MAIN));

    fs.write("first", &["f1.txt"]).unwrap();
    let first = vcr.commit("initial").done().unwrap();
    fs.write("second", &["f1.txt"]).unwrap();
    let second = vcr.commit("second").done().unwrap();
    assert_ne!(first, second);

    assert_eq!(messages(&vcr), vec![INIT_MESSAGE, "initial", "second"]);
    assert!(vcr.history().iter().all(|e| e.to_string().contains('|')));
}

#[test]
fn test_history_is_ascending() {
    let (tempdir, fs) = scratch();
    let mut vcr = VersionedWorkspace::new("tester", tempdir.path()).unwrap();
    for i in 1..=5 {
        fs.write(&i.to_string(), &["counter.txt"]).unwrap();
        assert!(vcr.commit(&format!("commit {}", i)).is_done());
    }
    let history = vcr.history();
    assert_eq!(history.len(), 6);
    let texts: Vec<String> = history.iter().map(ToString::to_string).collect();
    let mut sorted = texts.clone();
    sorted.sort();
    assert_eq!(texts, sorted);
    assert_eq!(
        messages(&vcr),
        vec![INIT_MESSAGE, "commit 1", "commit 2", "commit 3", "commit 4", "commit 5"]
    );
}

#[test]
fn test_commit_without_changes_fails() {
    let (tempdir, fs) = scratch();
    fs.write("content", &["a.txt"]).unwrap();
    let mut vcr = VersionedWorkspace::new("tester", tempdir.path()).unwrap();
    let outcome = vcr.commit("nothing new");
    assert_eq!(outcome, Outcome::Failed);
    assert_eq!(outcome.sentinel(), FAILURE_SENTINEL);
    assert_eq!(messages(&vcr), vec![INIT_MESSAGE]);
}

#[test]
fn test_anonymous_mode() {
    let (tempdir, fs) = scratch();
    fs.write("content", &["a.txt"]).unwrap();
    let mut vcr = VersionedWorkspace::new(ANONYMOUS_IDENTITY, tempdir.path()).unwrap();
    assert!(!vcr.is_attached());
    assert_eq!(vcr.workdir(), tempdir.path());
    assert!(!fs.exists(&[crate::dot_rev::DOT_REV]));

    let outcome = vcr.commit("ignored");
    assert_eq!(outcome, Outcome::Anonymous);
    assert_eq!(outcome.sentinel(), ANONYMOUS_SENTINEL);
    assert_eq!(vcr.branch_from(MAIN, "x").sentinel(), ANONYMOUS_SENTINEL);
    assert_eq!(vcr.next_branch_name(), Outcome::Anonymous);
    assert!(vcr.history().is_empty());
    assert!(vcr.branches().is_empty());
    assert!(matches!(vcr.checkout(MAIN), Err(WorkspaceError::NotInitialized)));
    assert!(matches!(
        vcr.rewrite_to_main("B", "promote"),
        Err(WorkspaceError::NotInitialized)
    ));
    vcr.purge().unwrap();
    assert!(!fs.exists(&[crate::dot_rev::DOT_REV]));
}

#[test]
fn test_branch_names_follow_main() {
    let (tempdir, _fs) = scratch();
    let mut vcr = VersionedWorkspace::new("tester", tempdir.path()).unwrap();
    assert_eq!(vcr.next_branch_name(), Outcome::Done(String::from("B")));

    let first = vcr.branch_from(MAIN, "exp1").done().unwrap();
    assert_eq!(first.branch, "B");
    let second = vcr.branch_from(MAIN, "exp2").done().unwrap();
    assert_eq!(second.branch, "C");
    assert_ne!(first.revision, second.revision);
    assert_eq!(second.to_string(), second.revision.to_string());

    assert_eq!(vcr.current_branch().as_deref(), Some("C"));
    assert_eq!(vcr.branches(), vec!["A", "B", "C"]);
    let history = messages(&vcr);
    assert!(history.contains(&String::from("Branched from A: exp1")));
    assert!(history.contains(&String::from("Branched from A: exp2")));
}

#[test]
fn test_branch_keeps_working_files() {
    let (tempdir, fs) = scratch();
    fs.write("committed", &["a.txt"]).unwrap();
    let mut vcr = VersionedWorkspace::new("tester", tempdir.path()).unwrap();
    fs.write("uncommitted", &["a.txt"]).unwrap();
    assert!(vcr.branch_from(MAIN, "keep").is_done());
    assert_eq!(fs.read(&["a.txt"]).unwrap(), "uncommitted");
}

#[test]
fn test_branch_allocation_is_capped() {
    let (tempdir, _fs) = scratch();
    let mut vcr = VersionedWorkspace::new("tester", tempdir.path()).unwrap();
    for i in 0..branches::MAX_ALTERNATES {
        let branched = vcr.branch_from(MAIN, &format!("exp{}", i)).done().unwrap();
        assert_eq!(Some(branched.branch), branches::alternate_name(i));
    }
    assert_eq!(vcr.current_branch().as_deref(), Some("Z"));
    assert_eq!(vcr.next_branch_name(), Outcome::Failed);
    assert_eq!(vcr.branch_from(MAIN, "one too many"), Outcome::Failed);
    assert_eq!(vcr.branches().len(), branches::MAX_ALTERNATES + 1);
}

#[test]
fn test_checkout_policy() {
    let (tempdir, fs) = scratch();
    fs.write("base", &["f.txt"]).unwrap();
    let mut vcr = VersionedWorkspace::new("tester", tempdir.path()).unwrap();
    vcr.branch_from(MAIN, "exp").done().unwrap();
    fs.write("experiment", &["f.txt"]).unwrap();
    vcr.commit("exp work").done().unwrap();

    vcr.checkout(MAIN).unwrap();
    assert_eq!(fs.read(&["f.txt"]).unwrap(), "base");

    fs.write("local", &["f.txt"]).unwrap();
    assert!(matches!(
        vcr.checkout("B"),
        Err(WorkspaceError::Engine(Error::WouldOverwrite(_)))
    ));
    assert_eq!(fs.read(&["f.txt"]).unwrap(), "local");
    assert!(matches!(
        vcr.checkout("Q"),
        Err(WorkspaceError::Engine(Error::UnknownBranch(_)))
    ));
}

#[test]
fn test_rewrite_to_main_promotes_content() {
    let (tempdir, fs) = scratch();
    fs.write("base", &["f.txt"]).unwrap();
    fs.write("gone soon", &["old.txt"]).unwrap();
    let mut vcr = VersionedWorkspace::new("tester", tempdir.path()).unwrap();
    vcr.branch_from(MAIN, "exp").done().unwrap();
    fs.write("experiment", &["f.txt"]).unwrap();
    fs.write("added", &["dir", "new.txt"]).unwrap();
    std::fs::remove_file(fs.path(&["old.txt"])).unwrap();
    vcr.commit("exp work").done().unwrap();
    fs.write("uncommitted", &["f.txt"]).unwrap();

    let engine = vcr.engine().unwrap();
    let prior = engine.branch_id(MAIN).unwrap().unwrap();
    let main_before = engine.log(prior).unwrap().len();
    let source_tree = engine.revision(engine.resolve("B").unwrap()).unwrap().tree;

    let id = vcr.rewrite_to_main("B", "promote exp").unwrap();

    assert_eq!(vcr.current_branch().as_deref(), Some(MAIN));
    assert_eq!(fs.read(&["f.txt"]).unwrap(), "experiment");
    assert_eq!(fs.read(&["dir", "new.txt"]).unwrap(), "added");
    assert!(!fs.exists(&["old.txt"]));

    let engine = vcr.engine().unwrap();
    assert_eq!(engine.branch_id(MAIN).unwrap(), Some(id));
    assert_eq!(engine.log(id).unwrap().len(), main_before + 1);
    let promoted = engine.revision(id).unwrap();
    assert_eq!(promoted.parents, vec![prior]);
    assert_eq!(promoted.tree, source_tree);
    assert_eq!(promoted.message, "promote exp");
}

#[test]
fn test_rewrite_to_main_leaves_untracked_files_out() {
    let (tempdir, fs) = scratch();
    let mut vcr = VersionedWorkspace::new("tester", tempdir.path()).unwrap();
    vcr.branch_from(MAIN, "exp").done().unwrap();
    fs.write("experiment", &["f.txt"]).unwrap();
    vcr.commit("exp work").done().unwrap();
    fs.write("never committed", &["scratch.txt"]).unwrap();

    let id = vcr.rewrite_to_main("B", "promote").unwrap();

    let engine = vcr.engine().unwrap();
    let promoted = engine.tree(engine.revision(id).unwrap().tree).unwrap().files();
    let source_id = engine.resolve("B").unwrap();
    let source = engine.tree(engine.revision(source_id).unwrap().tree).unwrap().files();
    assert_eq!(promoted, source);
    assert_eq!(
        promoted.keys().cloned().collect::<Vec<_>>(),
        vec![PathBuf::from("f.txt")]
    );
    assert_eq!(fs.read(&["scratch.txt"]).unwrap(), "never committed");
}

#[test]
fn test_rewrite_to_main_of_identical_content_still_adds_revision() {
    let (tempdir, fs) = scratch();
    fs.write("same", &["f.txt"]).unwrap();
    let mut vcr = VersionedWorkspace::new("tester", tempdir.path()).unwrap();
    vcr.branch_from(MAIN, "noop").done().unwrap();
    vcr.rewrite_to_main("B", "promote nothing").unwrap();
    assert_eq!(messages(&vcr), vec![INIT_MESSAGE, "promote nothing"]);
}

#[test]
fn test_rewrite_to_main_unknown_reference() {
    let (tempdir, _fs) = scratch();
    let mut vcr = VersionedWorkspace::new("tester", tempdir.path()).unwrap();
    assert!(matches!(
        vcr.rewrite_to_main("nowhere", "promote"),
        Err(WorkspaceError::Engine(Error::UnresolvedReference(_)))
    ));
    assert_eq!(messages(&vcr), vec![INIT_MESSAGE]);
}

#[test]
fn test_purge() {
    let (tempdir, fs) = scratch();
    fs.write("keep me", &["f.txt"]).unwrap();
    let mut vcr = VersionedWorkspace::new("tester", tempdir.path()).unwrap();
    assert!(fs.exists(&[crate::dot_rev::DOT_REV]));

    vcr.purge().unwrap();
    assert!(!fs.exists(&[crate::dot_rev::DOT_REV]));
    assert_eq!(fs.read(&["f.txt"]).unwrap(), "keep me");
    vcr.purge().unwrap();

    assert_eq!(vcr.commit("after purge"), Outcome::NotInitialized);
    assert_eq!(vcr.commit("after purge").sentinel(), FAILURE_SENTINEL);
    assert!(vcr.history().is_empty());
    assert!(matches!(vcr.checkout(MAIN), Err(WorkspaceError::NotInitialized)));

    let vcr = VersionedWorkspace::new("tester", tempdir.path()).unwrap();
    assert_eq!(messages(&vcr), vec![INIT_MESSAGE]);
}

#[test]
fn test_purge_failure_keeps_store_attached() {
    let (tempdir, fs) = scratch();
    let mut vcr = VersionedWorkspace::new("tester", tempdir.path()).unwrap();
    let rev = fs.path(&[crate::dot_rev::DOT_REV]);
    remove_dir_all(&rev).unwrap();
    fs.write("not a store", &[crate::dot_rev::DOT_REV]).unwrap();

    assert!(matches!(vcr.purge(), Err(WorkspaceError::Purge(path, _)) if path == rev));
    assert!(vcr.is_attached());
    assert_eq!(fs.read(&[crate::dot_rev::DOT_REV]).unwrap(), "not a store");
}

#[test]
fn test_failed_branch_leaves_no_trace() {
    let (tempdir, fs) = scratch();
    let mut vcr = VersionedWorkspace::new("tester", tempdir.path()).unwrap();
    let store = fs.path(&[crate::dot_rev::DOT_REV, "store"]);
    let content = (0..)
        .map(|i| format!("scratch {}", i))
        .find(|c| !store.join(&ObjectId::from(c.as_bytes()).to_string()[..2]).exists())
        .unwrap();
    let blocked = ObjectId::from(content.as_bytes()).to_string();
    std::fs::write(store.join(&blocked[..2]), "").unwrap();
    fs.write(&content, &["new.txt"]).unwrap();

    assert_eq!(vcr.branch_from(MAIN, "exp"), Outcome::Failed);
    assert_eq!(vcr.current_branch().as_deref(), Some(MAIN));
    assert_eq!(vcr.branches(), vec![MAIN]);
    assert_eq!(messages(&vcr), vec![INIT_MESSAGE]);

    std::fs::remove_file(store.join(&blocked[..2])).unwrap();
    assert_eq!(vcr.branch_from(MAIN, "exp").done().unwrap().branch, "B");
}

#[test]
fn test_reopen_does_not_reinitialize() {
    let (tempdir, fs) = scratch();
    let mut vcr = VersionedWorkspace::new("tester", tempdir.path()).unwrap();
    fs.write("one", &["f.txt"]).unwrap();
    vcr.commit("one").done().unwrap();
    vcr.branch_from(MAIN, "exp").done().unwrap();
    drop(vcr);

    let vcr = VersionedWorkspace::new("someone else", tempdir.path()).unwrap();
    assert_eq!(vcr.current_branch().as_deref(), Some("B"));
    let mut seen = messages(&vcr);
    seen.sort();
    assert_eq!(seen, vec!["Branched from A: exp", INIT_MESSAGE, "one"]);
}

#[test]
fn test_setup_failure() {
    let (tempdir, fs) = scratch();
    fs.write("not a directory", &["file"]).unwrap();
    assert!(matches!(
        VersionedWorkspace::new("tester", tempdir.path().join("file")),
        Err(WorkspaceError::Setup(_))
    ));
}

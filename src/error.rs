use std::{convert::Infallible, path::PathBuf};

use derive_more::{Display, From};

use crate::object_id::ObjectId;

/// Everything that can go wrong inside the revision store and its collaborators.
#[derive(Debug, Display, From)]
pub enum Error {
    #[from]
    #[display(fmt = "i/o error: {}", _0)]
    IO(std::io::Error),
    #[from]
    #[display(fmt = "serialization error: {}", _0)]
    Serde(serde_json::Error),
    #[from]
    #[display(fmt = "archive error: {}", _0)]
    Archive(zip::result::ZipError),
    #[display(fmt = "missing object {}", _0)]
    MissingObject(ObjectId),
    #[display(fmt = "no revision store in {}", "_0.display()")]
    NotARepository(PathBuf),
    #[display(fmt = "branch {} already exists", _0)]
    BranchExists(String),
    #[display(fmt = "no such branch: {}", _0)]
    UnknownBranch(String),
    #[display(fmt = "cannot resolve reference {:?}", _0)]
    UnresolvedReference(String),
    #[display(fmt = "nothing to commit")]
    NothingToCommit,
    #[display(fmt = "local changes would be overwritten: {:?}", _0)]
    WouldOverwrite(Vec<PathBuf>),
    #[display(fmt = "illegal archive entry: {}", _0)]
    IllegalPath(String),
}

impl std::error::Error for Error {}

impl From<Infallible> for Error {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

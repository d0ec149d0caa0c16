use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

/// Environment variable naming where archives are kept.
pub const STORAGE_ROOT_ENV: &str = "STORAGE_ROOT";
pub const STORAGE_ROOT_DEFAULT: &str = "/data/storage";

/// Where a tool invocation works: the versioned directory and the
/// storage area archives are unpacked into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub local_dir: PathBuf,
    pub storage_root: PathBuf,
}

impl Config {
    /// `local_dir` is made absolute and has to be an existing directory.
    pub fn new(local_dir: &Path) -> io::Result<Self> {
        let local_dir = std::path::absolute(local_dir)?;
        if !local_dir.is_dir() {
            return Err(io::Error::new(
                ErrorKind::NotFound,
                format!("directory does not exist: {}", local_dir.display()),
            ));
        }
        Ok(Config {
            local_dir,
            storage_root: Self::storage_root(),
        })
    }

    /// [`STORAGE_ROOT_ENV`] if set and not empty, else [`STORAGE_ROOT_DEFAULT`].
    pub fn storage_root() -> PathBuf {
        storage_root_from(std::env::var(STORAGE_ROOT_ENV).ok())
    }
}

fn storage_root_from(value: Option<String>) -> PathBuf {
    match value {
        Some(root) if !root.is_empty() => PathBuf::from(root),
        _ => PathBuf::from(STORAGE_ROOT_DEFAULT),
    }
}

#[test]
fn test_storage_root_fallback() {
    assert_eq!(storage_root_from(None), PathBuf::from("/data/storage"));
    assert_eq!(storage_root_from(Some(String::new())), PathBuf::from("/data/storage"));
    assert_eq!(storage_root_from(Some(String::from("/tmp/s"))), PathBuf::from("/tmp/s"));
}

#[test]
fn test_local_dir_must_exist() {
    let tempdir = tempfile::tempdir().unwrap();
    let config = Config::new(tempdir.path()).unwrap();
    assert!(config.local_dir.is_absolute());
    assert_eq!(config.local_dir, tempdir.path());

    let missing = Config::new(&tempdir.path().join("missing")).unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
}

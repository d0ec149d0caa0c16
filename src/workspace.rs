use std::{
    fs::{create_dir_all, read_to_string, write},
    io,
    path::{Path, PathBuf},
};

/// Plain file access relative to a fixed root directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Binds to `root`, made absolute against the current directory.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            root: std::path::absolute(root)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, segments: &[&str]) -> PathBuf {
        segments
            .iter()
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    /// Fails with [`io::ErrorKind::NotFound`] when the file is missing.
    pub fn read(&self, segments: &[&str]) -> io::Result<String> {
        read_to_string(self.path(segments))
    }

    /// Creates missing parent directories, then replaces the file.
    pub fn write(&self, content: &str, segments: &[&str]) -> io::Result<()> {
        let path = self.path(segments);
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        write(path, content)
    }

    pub fn exists(&self, segments: &[&str]) -> bool {
        self.path(segments).exists()
    }
}

#[test]
fn test_workspace_basic() {
    let tempdir = tempfile::tempdir().unwrap();
    let fs = Workspace::new(tempdir.path()).unwrap();

    assert!(!fs.exists(&["nofile.txt"]));
    assert_eq!(
        fs.read(&["nofile.txt"]).unwrap_err().kind(),
        io::ErrorKind::NotFound
    );

    fs.write("hello", &["test.txt"]).unwrap();
    assert!(fs.exists(&["test.txt"]));
    assert_eq!(fs.read(&["test.txt"]).unwrap(), "hello");

    fs.write("subfile", &["foo", "bar.txt"]).unwrap();
    assert_eq!(fs.read(&["foo", "bar.txt"]).unwrap(), "subfile");
    assert_eq!(fs.path(&["foo", "bar.txt"]), tempdir.path().join("foo").join("bar.txt"));

    fs.write("again", &["test.txt"]).unwrap();
    assert_eq!(fs.read(&["test.txt"]).unwrap(), "again");
}

#[test]
fn test_relative_root_is_made_absolute() {
    let fs = Workspace::new("some/relative/dir").unwrap();
    assert!(fs.root().is_absolute());
    assert!(fs.root().ends_with("some/relative/dir"));
}

//! Zip packaging of (parts of) a working directory.

use std::{
    fs::{create_dir_all, File},
    io::{self, Cursor, Read, Write},
    path::{Component, Path, PathBuf},
};

use walkdir::WalkDir;
use zip::{write::SimpleFileOptions, ZipArchive, ZipWriter};

use crate::{error::Error, ignore::IgnoreMatcher};

/// Zips every regular file below `root/subpath`. Entry names are relative
/// to `root` and use `/`; paths excluded by `root`'s ignore file are left
/// out, ignored directories with everything below them.
pub fn build_archive(root: &Path, subpath: &Path) -> Result<Vec<u8>, Error> {
    let ignores = IgnoreMatcher::load(root);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let walker = WalkDir::new(root.join(subpath))
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match entry_name(root, entry.path()) {
            Some(name) => name.is_empty() || !ignores.ignore(&name),
            None => false,
        });
    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry_name(root, entry.path()) else {
            continue;
        };
        writer.start_file(name, SimpleFileOptions::default())?;
        let mut content = Vec::new();
        File::open(entry.path())?.read_to_end(&mut content)?;
        writer.write_all(&content)?;
    }
    let archive = writer.finish()?.into_inner();
    log::info!("packed {:?} from {:?}: {} bytes", subpath, root, archive.len());
    Ok(archive)
}

fn entry_name(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = rel.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}

/// Recreates the entries of `archive` below `dest`. An entry that would
/// land outside `dest` fails the whole extraction with
/// [`Error::IllegalPath`] before it is written.
pub fn extract_archive(archive: &[u8], dest: &Path) -> Result<(), Error> {
    let mut reader = ZipArchive::new(Cursor::new(archive))?;
    for i in 0..reader.len() {
        let mut file = reader.by_index(i)?;
        let target = entry_target(dest, file.name())?;
        if file.is_dir() {
            create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut file, &mut out)?;
    }
    Ok(())
}

/// Where an entry named `name` goes below `dest`.
pub fn entry_target(dest: &Path, name: &str) -> Result<PathBuf, Error> {
    let illegal = || Error::IllegalPath(name.to_string());
    let mut target = dest.to_path_buf();
    let mut depth = 0usize;
    for component in Path::new(&name.replace('\\', "/")).components() {
        match component {
            Component::Normal(part) => {
                target.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                depth = depth.checked_sub(1).ok_or_else(illegal)?;
                target.pop();
            }
            Component::RootDir | Component::Prefix(_) => return Err(illegal()),
        }
    }
    if depth == 0 {
        return Err(illegal());
    }
    Ok(target)
}

#[test]
fn test_entry_target_guards_destination() {
    let dest = Path::new("/srv/unpack");
    assert_eq!(
        entry_target(dest, "a/b.txt").unwrap(),
        PathBuf::from("/srv/unpack/a/b.txt")
    );
    assert_eq!(
        entry_target(dest, "a/../c.txt").unwrap(),
        PathBuf::from("/srv/unpack/c.txt")
    );
    assert!(matches!(entry_target(dest, "../evil.txt"), Err(Error::IllegalPath(_))));
    assert!(matches!(entry_target(dest, "a/../../evil.txt"), Err(Error::IllegalPath(_))));
    assert!(matches!(entry_target(dest, "/etc/passwd"), Err(Error::IllegalPath(_))));
    assert!(matches!(entry_target(dest, "..\\evil.txt"), Err(Error::IllegalPath(_))));
    assert!(matches!(entry_target(dest, "."), Err(Error::IllegalPath(_))));
}

#[test]
fn test_archive_round_trip_honors_ignores() {
    let tempdir = tempfile::tempdir().unwrap();
    let root = tempdir.path().join("root");
    let fs = crate::workspace::Workspace::new(&root).unwrap();
    fs.write("*.log\ndocs/private", &[crate::ignore::IGNORE_FILE]).unwrap();
    fs.write("# notes", &["docs", "notes.md"]).unwrap();
    fs.write("secret", &["docs", "private", "key.txt"]).unwrap();
    fs.write("noise", &["debug.log"]).unwrap();
    fs.write("fn main() {}", &["src", "main.rs"]).unwrap();

    let archive = build_archive(&root, Path::new("")).unwrap();
    let dest = tempdir.path().join("out");
    extract_archive(&archive, &dest).unwrap();
    let out = crate::workspace::Workspace::new(&dest).unwrap();
    assert_eq!(out.read(&["docs", "notes.md"]).unwrap(), "# notes");
    assert_eq!(out.read(&["src", "main.rs"]).unwrap(), "fn main() {}");
    assert!(out.exists(&[crate::ignore::IGNORE_FILE]));
    assert!(!out.exists(&["debug.log"]));
    assert!(!out.exists(&["docs", "private"]));

    let docs_only = build_archive(&root, Path::new("docs")).unwrap();
    let dest = tempdir.path().join("docs-only");
    extract_archive(&docs_only, &dest).unwrap();
    let out = crate::workspace::Workspace::new(&dest).unwrap();
    assert!(out.exists(&["docs", "notes.md"]));
    assert!(!out.exists(&["src"]));
}

use std::{
    fs::read_to_string,
    io::ErrorKind,
    path::Path,
};

use glob::{MatchOptions, Pattern};

/// Name of the file holding one exclusion glob per line.
pub const IGNORE_FILE: &str = ".revignore";

/// Glob based exclusion list, matched against paths relative to the
/// directory the list was loaded from.
///
/// A pattern has to match the whole relative path and wildcards never
/// cross a `/`, so `*.log` excludes `debug.log` but not `logs/debug.log`.
#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    patterns: Vec<Pattern>,
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

impl IgnoreMatcher {
    /// Reads `base_dir/.revignore`. A missing or unreadable file yields an
    /// empty matcher.
    pub fn load(base_dir: &Path) -> Self {
        let path = base_dir.join(IGNORE_FILE);
        match read_to_string(&path) {
            Ok(content) => Self::parse(&content),
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    log::warn!("cannot read {:?}: {}", path, err);
                }
                Self::default()
            }
        }
    }

    /// Blank lines and `#` comments are skipped, as are patterns the glob
    /// syntax rejects.
    pub fn parse(content: &str) -> Self {
        let patterns = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| match Pattern::new(line) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    log::warn!("skipping ignore pattern {:?}: {}", line, err);
                    None
                }
            })
            .collect();
        IgnoreMatcher { patterns }
    }

    pub fn ignore(&self, rel_path: &str) -> bool {
        self.patterns
            .iter()
            .any(|pattern| pattern.matches_with(rel_path, MATCH_OPTIONS))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[test]
fn test_missing_file_is_empty() {
    let tempdir = tempfile::tempdir().unwrap();
    let matcher = IgnoreMatcher::load(tempdir.path());
    assert!(matcher.is_empty());
    assert!(!matcher.ignore("anything.txt"));
}

#[test]
fn test_single_segment_globs() {
    let tempdir = tempfile::tempdir().unwrap();
    std::fs::write(
        tempdir.path().join(IGNORE_FILE),
        "# scratch output\n*.log\n\n  build  \ncache/*.tmp\n[\n",
    )
    .unwrap();
    let matcher = IgnoreMatcher::load(tempdir.path());
    assert!(matcher.ignore("debug.log"));
    assert!(!matcher.ignore("logs/debug.log"));
    assert!(matcher.ignore("build"));
    assert!(!matcher.ignore("build/out.bin"));
    assert!(matcher.ignore("cache/a.tmp"));
    assert!(!matcher.ignore("cache/deep/a.tmp"));
    assert!(!matcher.ignore("notes.txt"));
}

//! Branch naming: the main line is `A`, alternates take the following
//! letters in order of creation.

/// The permanent main line.
pub const MAIN: &str = "A";

/// How many alternate lines fit after [`MAIN`] (`B` through `Z`).
pub const MAX_ALTERNATES: usize = 25;

/// Name for a new alternate line when `existing` alternates are live.
///
/// The name is derived from the live count, so a letter whose branch has
/// gone away is handed out again.
pub fn alternate_name(existing: usize) -> Option<String> {
    if existing >= MAX_ALTERNATES {
        return None;
    }
    let first = MAIN.as_bytes()[0] + 1;
    Some(char::from(first + existing as u8).to_string())
}

pub fn is_main(branch: &str) -> bool {
    branch == MAIN
}

/// Counts the names in `branches` that are not [`MAIN`].
pub fn count_alternates<'a>(branches: impl IntoIterator<Item = &'a str>) -> usize {
    branches.into_iter().filter(|b| !is_main(b)).count()
}

#[test]
fn test_alternate_names() {
    assert_eq!(alternate_name(0).as_deref(), Some("B"));
    assert_eq!(alternate_name(1).as_deref(), Some("C"));
    assert_eq!(alternate_name(24).as_deref(), Some("Z"));
    assert_eq!(alternate_name(MAX_ALTERNATES), None);
    assert_eq!(alternate_name(MAX_ALTERNATES + 1), None);
}

#[test]
fn test_count_alternates() {
    assert_eq!(count_alternates(["A"]), 0);
    assert_eq!(count_alternates(["A", "B", "C"]), 2);
    assert_eq!(count_alternates(Vec::<&str>::new()), 0);
}

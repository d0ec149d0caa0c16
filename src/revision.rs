use std::fmt::Display;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::object_id::ObjectId;

/// Who recorded a [`Revision`].
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

impl Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// A particular snapshot of the working directory.
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    /// The message added with the commit.
    pub message: String,
    /// The [`ObjectId`] of the [`crate::tree::Tree`].
    pub tree: ObjectId,
    /// The previous [`Revision`]s' [`ObjectId`]s. The first one is the
    /// line this revision extends; the initial revision has none.
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub timestamp: DateTime<Utc>,
}

/// Format of [`HistoryEntry::timestamp`]. Zero padded and fixed width, so
/// sorting the text sorts chronologically.
pub const MINUTE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Display projection of a [`Revision`].
///
/// Ordering compares the timestamp first and the message second, which is
/// the same as comparing the `timestamp|message` text.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone)]
pub struct HistoryEntry {
    pub timestamp: String,
    pub message: String,
}

impl From<&Revision> for HistoryEntry {
    fn from(revision: &Revision) -> Self {
        HistoryEntry {
            timestamp: revision
                .timestamp
                .with_timezone(&Local)
                .format(MINUTE_FORMAT)
                .to_string(),
            message: revision.message.clone(),
        }
    }
}

impl Display for HistoryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}", self.timestamp, self.message)
    }
}

#[test]
fn test_history_entry_format() {
    use chrono::TimeZone;

    let tree: &[u8] = b"{}";
    let revision = Revision {
        message: String::from("second"),
        tree: ObjectId::from(tree),
        parents: vec![],
        author: Signature {
            name: String::from("someone"),
            email: String::from("someone@example.com"),
        },
        timestamp: Utc.with_ymd_and_hms(2024, 3, 5, 7, 9, 59).unwrap(),
    };
    let entry = HistoryEntry::from(&revision);
    let local = revision.timestamp.with_timezone(&Local);
    assert_eq!(entry.timestamp, local.format("%Y-%m-%d %H:%M").to_string());
    assert_eq!(entry.timestamp.len(), 16);
    assert_eq!(entry.to_string(), format!("{}|second", entry.timestamp));
}

#[test]
fn test_history_entry_order_matches_text_order() {
    let mut entries = vec![
        HistoryEntry { timestamp: String::from("2024-03-05 10:00"), message: String::from("b") },
        HistoryEntry { timestamp: String::from("2024-03-05 09:59"), message: String::from("z") },
        HistoryEntry { timestamp: String::from("2024-03-05 10:00"), message: String::from("a") },
    ];
    let mut texts: Vec<String> = entries.iter().map(ToString::to_string).collect();
    entries.sort();
    texts.sort();
    let sorted: Vec<String> = entries.iter().map(ToString::to_string).collect();
    assert_eq!(sorted, texts);
    assert_eq!(sorted[0], "2024-03-05 09:59|z");
}

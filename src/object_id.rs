use crate::hex::{self, Hex};
use blake3::Hash;
use serde::{Deserialize, Serialize};

use std::{fmt::Display, str::FromStr};

/// An identifier for a particular piece of binary content.
/// Under the hood, this is a [`blake3`] hash.
///
/// It is displayed in hexadecimal format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectId(Hash);

/// Length of the hexadecimal form of an [`ObjectId`].
pub const HEX_LEN: usize = blake3::OUT_LEN * 2;

impl Ord for ObjectId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.as_bytes().cmp(other.0.as_bytes())
    }
}

impl PartialOrd for ObjectId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b: &[u8] = self.0.as_bytes();
        write!(f, "{}", hex::Hex::from(b))
    }
}

/// The text was not a full-length hexadecimal object id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseObjectIdError(pub String);

impl Display for ParseObjectIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "not an object id: {:?}", self.0)
    }
}

impl std::error::Error for ParseObjectIdError {}

impl FromStr for ObjectId {
    type Err = ParseObjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != HEX_LEN {
            return Err(ParseObjectIdError(s.to_string()));
        }
        let bytes: Vec<u8> = Hex::parse(s)
            .ok_or_else(|| ParseObjectIdError(s.to_string()))?
            .into();
        let arr: [u8; blake3::OUT_LEN] = bytes
            .try_into()
            .map_err(|_| ParseObjectIdError(s.to_string()))?;
        Ok(ObjectId(Hash::from(arr)))
    }
}

impl Serialize for ObjectId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s: String = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl From<&[u8]> for ObjectId {
    fn from(bytes: &[u8]) -> Self {
        ObjectId(blake3::hash(bytes))
    }
}

#[test]
fn test_parse_display() {
    let b: &[u8] = b"hello, world";
    let id = ObjectId::from(b);
    let text = id.to_string();
    assert_eq!(text.len(), HEX_LEN);
    assert_eq!(text.parse::<ObjectId>(), Ok(id));
    assert!(text[..10].parse::<ObjectId>().is_err());
    assert!("g".repeat(HEX_LEN).parse::<ObjectId>().is_err());
}

#[test]
fn test_serde_as_hex_string() {
    let b: &[u8] = b"snapshot";
    let id = ObjectId::from(b);
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{}\"", id));
    let back: ObjectId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

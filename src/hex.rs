use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// A valid hexadecimal encoding of binary data.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Hex(pub Vec<u8>);

impl Hex {
    /// Accepts lowercase hexadecimal text of even length.
    pub fn parse(s: &str) -> Option<Hex> {
        if s.len() % 2 != 0 || !s.bytes().all(is_hex_digit) {
            return None;
        }
        Some(Hex(s.as_bytes().to_vec()))
    }
}

pub fn is_hex_digit(b: u8) -> bool {
    b.is_ascii_digit() || (b'a'..=b'f').contains(&b)
}

impl Serialize for Hex {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        format!("{}", self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Hex {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s: String = String::deserialize(deserializer)?;
        Hex::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("not hex: {:?}", s)))
    }
}

impl Display for Hex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only ever constructed from hex digits.
        let s = String::from_utf8_lossy(&self.0);
        write!(f, "{}", s)
    }
}

impl<'a> From<&'a [u8]> for Hex {
    fn from(bytes: &[u8]) -> Self {
        fn hex_digit(b: u8) -> u8 {
            if b <= 9 {
                b + b'0'
            } else {
                b + b'a' - 10
            }
        }

        let mut out = vec![0u8; bytes.len() * 2];
        let mut i = 0;
        for &b in bytes {
            out[i] = hex_digit((b & 0b11110000) >> 4);
            out[i + 1] = hex_digit(b & 0b00001111);
            i += 2;
        }
        Hex(out)
    }
}

impl From<Hex> for Vec<u8> {
    fn from(value: Hex) -> Self {
        fn unhex_digit(h: u8) -> u8 {
            if h.is_ascii_digit() {
                h - b'0'
            } else {
                h - b'a' + 10
            }
        }
        let n = value.0.len();
        let mut v = vec![0u8; n / 2];

        for (i, out) in v.iter_mut().enumerate() {
            let j = i * 2;
            *out |= unhex_digit(value.0[j]) << 4;
            *out |= unhex_digit(value.0[j + 1]);
        }

        v
    }
}

#[test]
fn test_hex_round_trip() {
    let example: &[u8] = b"hello, world";
    let hex: Hex = Hex::from(example);
    let bytes: Vec<u8> = hex.into();
    let bytes_ref: &[u8] = &bytes;
    assert_eq!(example, bytes_ref);
}

#[test]
fn test_hex_parse_rejects_garbage() {
    assert!(Hex::parse("abc").is_none());
    assert!(Hex::parse("zz").is_none());
    assert!(Hex::parse("ABCD").is_none());
    assert_eq!(Hex::parse("0a1f").map(Vec::<u8>::from), Some(vec![0x0a, 0x1f]));
}

#[test]
fn test_hex_deserialize() {
    let example: &[u8] = b"hello, world";
    let hex: Hex = Hex::from(example);
    let json = serde_json::to_vec(&hex).unwrap();
    let hex_: Hex = serde_json::from_slice(&json).unwrap();
    assert_eq!(hex, hex_);
    assert!(serde_json::from_str::<Hex>("\"not hex\"").is_err());
}

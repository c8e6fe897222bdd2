//! Bijective base-26 column labels.
//!
//! Offsets are 0-based (`A` = 0, `Z` = 25, `AA` = 26). Labels are accepted in
//! either case and always rendered upper-case.

use core::fmt;
use std::error::Error;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors returned when decoding or shifting column labels.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ColumnError {
    /// The label was the empty string.
    Empty,
    /// A character outside `A-Z`/`a-z` was found at the given byte position.
    InvalidChar { ch: char, position: usize },
    /// The label (or shifted offset) does not fit in a `u32` offset.
    Overflow,
    /// A negative offset cannot be encoded.
    Negative(i64),
}

impl fmt::Display for ColumnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnError::Empty => write!(f, "column label is empty"),
            ColumnError::InvalidChar { ch, position } => write!(
                f,
                "column label must only contain letters, found `{ch}` at position {position}"
            ),
            ColumnError::Overflow => write!(f, "column label exceeds the supported range"),
            ColumnError::Negative(n) => write!(f, "column offset {n} is negative"),
        }
    }
}

impl Error for ColumnError {}

/// Encode a 0-based column offset as a label (`0` -> `A`, `26` -> `AA`).
pub fn encode(mut col: u32) -> String {
    let mut buf = Vec::new();
    loop {
        let rem = (col % 26) as u8;
        buf.push(b'A' + rem);
        col /= 26;
        if col == 0 {
            break;
        }
        col -= 1;
    }
    buf.reverse();
    // only ASCII A-Z is ever pushed
    buf.into_iter().map(char::from).collect()
}

/// Decode a label into its 0-based offset. Case-insensitive.
pub fn decode(label: &str) -> Result<u32, ColumnError> {
    if label.is_empty() {
        return Err(ColumnError::Empty);
    }
    let mut col: u32 = 0;
    for (position, ch) in label.char_indices() {
        if !ch.is_ascii_alphabetic() {
            return Err(ColumnError::InvalidChar { ch, position });
        }
        let val = (ch.to_ascii_uppercase() as u8 - b'A') as u32 + 1;
        col = col
            .checked_mul(26)
            .and_then(|c| c.checked_add(val))
            .ok_or(ColumnError::Overflow)?;
    }
    Ok(col - 1)
}

/// Normalised (upper-case) column label.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ColumnLabel(String);

impl ColumnLabel {
    pub fn from_offset(offset: u32) -> Self {
        Self(encode(offset))
    }

    /// Parse and normalise a label such as `"ab"` into `"AB"`.
    pub fn parse(label: &str) -> Result<Self, ColumnError> {
        let offset = decode(label)?;
        Ok(Self::from_offset(offset))
    }

    pub fn offset(&self) -> u32 {
        // constructors only ever store valid labels
        decode(&self.0).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Label `delta` columns to the right of this one.
    pub fn shifted(&self, delta: usize) -> Result<Self, ColumnError> {
        let delta = u32::try_from(delta).map_err(|_| ColumnError::Overflow)?;
        let offset = self
            .offset()
            .checked_add(delta)
            .ok_or(ColumnError::Overflow)?;
        Ok(Self::from_offset(offset))
    }
}

impl fmt::Display for ColumnLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ColumnLabel {
    type Err = ColumnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<i64> for ColumnLabel {
    type Error = ColumnError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < 0 {
            return Err(ColumnError::Negative(value));
        }
        let offset = u32::try_from(value).map_err(|_| ColumnError::Overflow)?;
        Ok(Self::from_offset(offset))
    }
}

impl AsRef<str> for ColumnLabel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(feature = "serde")]
impl Serialize for ColumnLabel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for ColumnLabel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        ColumnLabel::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encode_known_offsets() {
        assert_eq!(encode(0), "A");
        assert_eq!(encode(25), "Z");
        assert_eq!(encode(26), "AA");
        assert_eq!(encode(27), "AB");
        assert_eq!(encode(701), "ZZ");
        assert_eq!(encode(702), "AAA");
        assert_eq!(encode(18_277), "ZZZ");
    }

    #[test]
    fn decode_is_case_insensitive() {
        assert_eq!(decode("a"), Ok(0));
        assert_eq!(decode("A"), Ok(0));
        assert_eq!(decode("aB"), decode("AB"));
        assert_eq!(decode("zzz"), Ok(18_277));
    }

    #[test]
    fn decode_rejects_bad_labels() {
        assert_eq!(decode(""), Err(ColumnError::Empty));
        assert_eq!(
            decode("A1"),
            Err(ColumnError::InvalidChar {
                ch: '1',
                position: 1
            })
        );
        assert!(decode("A1").unwrap_err().to_string().contains("`1`"));
        assert_eq!(decode("ZZZZZZZZZ"), Err(ColumnError::Overflow));
    }

    #[test]
    fn negative_offsets_are_invalid() {
        assert_eq!(ColumnLabel::try_from(-1), Err(ColumnError::Negative(-1)));
        assert_eq!(ColumnLabel::try_from(3).unwrap().as_str(), "D");
    }

    #[test]
    fn label_shift_and_normalise() {
        let label = ColumnLabel::parse("c").unwrap();
        assert_eq!(label.as_str(), "C");
        assert_eq!(label.shifted(24).unwrap().as_str(), "AA");
        assert_eq!(label.offset(), 2);
    }

    proptest! {
        #[test]
        fn roundtrip_within_three_letters(n in 0u32..18_278) {
            let label = encode(n);
            prop_assert!(label.bytes().all(|b| b.is_ascii_uppercase()));
            prop_assert!(!label.is_empty());
            prop_assert_eq!(decode(&label), Ok(n));
        }
    }
}

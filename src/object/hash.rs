//! Identity and watched-value hashing

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Namespace for watched-value hashes (UUID v5).
const WATCHED_NS: Uuid = Uuid::from_bytes([
    0x5c, 0x3a, 0x91, 0x0e, 0x7b, 0x44, 0x4f, 0x2d, 0x9a, 0x16, 0xe2, 0x58, 0xc0, 0x7d, 0x13, 0x6f,
]);

/// Identity of an object within one source.
///
/// The composite key itself is the identity, so distinct
/// `(primary_id, secondary_id)` pairs can never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey {
    pub primary_id: String,
    pub secondary_id: String,
}

impl IdentityKey {
    pub fn new(primary_id: impl Into<String>, secondary_id: impl Into<String>) -> Self {
        Self {
            primary_id: primary_id.into(),
            secondary_id: secondary_id.into(),
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.primary_id, self.secondary_id)
    }
}

/// One of the four value slots a source may watch for change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WatchedSlot {
    #[serde(rename = "Watched_Value1", alias = "watched1")]
    Watched1,
    #[serde(rename = "Watched_Value2", alias = "watched2")]
    Watched2,
    #[serde(rename = "Watched_Value3", alias = "watched3")]
    Watched3,
    #[serde(rename = "Watched_Value4", alias = "watched4")]
    Watched4,
}

/// Hash over the values of a source's watched slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchedHash(Uuid);

impl WatchedHash {
    /// Hash the given slot values in order.
    ///
    /// Each value is length-prefixed so that `["ab", "c"]` and `["a", "bc"]`
    /// hash differently. An empty slice yields the same hash every time.
    pub fn of<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut input = String::new();
        for value in values {
            input.push_str(&value.len().to_string());
            input.push(':');
            input.push_str(value);
        }
        Self(Uuid::new_v5(&WATCHED_NS, input.as_bytes()))
    }
}

impl fmt::Display for WatchedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

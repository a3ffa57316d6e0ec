//! Object model
//!
//! Named row shapes for every stage of a run: the raw row a source produces,
//! the observed object built from it, the persisted object the store keeps,
//! and the immutable event emitted for reportable outcomes.

mod hash;
mod model;
mod row;
mod status;

pub use hash::{IdentityKey, WatchedHash, WatchedSlot};
pub use model::{Event, ObservedObject, PersistedObject, WatchedValues, TIMESTAMP_FORMAT};
pub use row::{RawRow, RowError, NULL_SENTINEL, ROW_FIELD_COUNT};
pub use status::{Status, StatusParseError};

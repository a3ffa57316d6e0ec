//! Raw rows as produced by a data source

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of positional fields every source row must carry.
pub const ROW_FIELD_COUNT: usize = 9;

/// Literal stored for optional fields that a query source left empty.
pub const NULL_SENTINEL: &str = "null";

/// Why a row was rejected before becoming an observation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("expected {ROW_FIELD_COUNT} fields, found {0}")]
    FieldCount(usize),

    #[error("primary id is empty")]
    MissingPrimaryId,
}

/// One row of source output, in the fixed nine-field shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    pub primary_id: String,
    pub secondary_id: String,
    pub changed_at: String,
    pub watched1: String,
    pub watched2: String,
    pub watched3: String,
    pub watched4: String,
    pub extra: String,
    pub foreign_key: String,
}

impl RawRow {
    /// Build a row from positional fields.
    ///
    /// Only the field count and a non-empty primary id are checked; no
    /// normalization is applied, so command output keeps empty fields as-is.
    pub fn from_fields<S: Into<String>>(fields: Vec<S>) -> Result<Self, RowError> {
        if fields.len() != ROW_FIELD_COUNT {
            return Err(RowError::FieldCount(fields.len()));
        }
        let mut it = fields.into_iter().map(Into::into);
        let mut next = || it.next().unwrap_or_default();

        let row = Self {
            primary_id: next(),
            secondary_id: next(),
            changed_at: next(),
            watched1: next(),
            watched2: next(),
            watched3: next(),
            watched4: next(),
            extra: next(),
            foreign_key: next(),
        };

        if row.primary_id.is_empty() {
            return Err(RowError::MissingPrimaryId);
        }
        Ok(row)
    }

    /// Parse one `|`-separated line of a command's output artifact.
    pub fn parse_line(line: &str) -> Result<Self, RowError> {
        Self::from_fields(line.split('|').collect())
    }

    /// Build a row from a query result, normalizing the optional fields.
    ///
    /// Query rows must have a primary id that is neither empty nor the null
    /// sentinel. `SecondaryId`, `Watched3` and `Watched4` map empty or absent
    /// values to [`NULL_SENTINEL`]; other absent values become empty strings.
    pub fn from_query_fields(fields: Vec<Option<String>>) -> Result<Self, RowError> {
        if fields.len() != ROW_FIELD_COUNT {
            return Err(RowError::FieldCount(fields.len()));
        }
        match fields[0].as_deref() {
            None | Some("") | Some(NULL_SENTINEL) => return Err(RowError::MissingPrimaryId),
            Some(_) => {}
        }

        let normalized = fields
            .into_iter()
            .enumerate()
            .map(|(i, value)| match i {
                1 | 5 | 6 => or_null_sentinel(value),
                _ => value.unwrap_or_default(),
            })
            .collect::<Vec<_>>();

        Self::from_fields(normalized)
    }

    /// Positional view, in the same order the row was produced.
    pub fn fields(&self) -> [&str; ROW_FIELD_COUNT] {
        [
            &self.primary_id,
            &self.secondary_id,
            &self.changed_at,
            &self.watched1,
            &self.watched2,
            &self.watched3,
            &self.watched4,
            &self.extra,
            &self.foreign_key,
        ]
    }
}

fn or_null_sentinel(value: Option<String>) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => NULL_SENTINEL.to_string(),
    }
}

//! Storage trait definitions

use crate::object::{Event, IdentityKey, PersistedObject, RawRow, Status};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Status {0} cannot be stored")]
    UnstorableStatus(Status),

    #[error("Object {0} has no index")]
    MissingIndex(IdentityKey),

    #[error("Object not found: index {0}")]
    ObjectNotFound(i64),

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Failed to attach {path}: {message}")]
    Attach { path: String, message: String },

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// One query result row; `None` is SQL NULL.
pub type QueryRow = Vec<Option<String>>;

/// A value written to a mapped table.
#[derive(Debug, Clone, PartialEq)]
pub enum MappedValue {
    Integer(i64),
    Text(String),
    Null,
}

/// Table and column names must be plain identifiers before they are quoted
/// into dynamic SQL.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

/// Operations available inside one reconciliation transaction.
pub trait ObjectTransaction {
    /// Every persisted object of a source.
    fn load_objects(&mut self, source_prefix: &str) -> StorageResult<Vec<PersistedObject>>;

    /// Insert new objects, returning the assigned indexes in input order.
    fn bulk_insert(&mut self, objects: &[PersistedObject]) -> StorageResult<Vec<i64>>;

    /// Overwrite existing objects keyed by their index.
    fn bulk_update(&mut self, objects: &[PersistedObject]) -> StorageResult<usize>;

    /// Append events.
    fn bulk_insert_events(&mut self, events: &[Event]) -> StorageResult<usize>;
}

/// Durable object/event store.
///
/// Implementations must serialize concurrent writers; readers never see a
/// half-applied transaction.
pub trait ObjectStore: Send + Sync {
    /// Run `f` in a single transaction: commit when it returns `Ok`, roll back
    /// when it returns `Err`.
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn ObjectTransaction) -> Result<T, E>,
        E: From<StorageError>;

    /// Append a batch of observed rows to the history table.
    fn append_history(
        &self,
        source_prefix: &str,
        rows: &[RawRow],
        observed_at: &str,
    ) -> StorageResult<usize>;

    /// Insert projected rows into a mapped table in their own transaction.
    fn insert_mapped(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<MappedValue>],
    ) -> StorageResult<usize>;
}

/// Executes source queries with arbitrary result width.
pub trait QueryExecutor: Send + Sync {
    fn query_rows(&self, sql: &str) -> StorageResult<Vec<QueryRow>>;

    /// Attach `db_path` read-only under `alias`, run `sql`, then detach.
    ///
    /// A failure to attach is reported as [`StorageError::Attach`].
    fn query_rows_attached(&self, db_path: &Path, alias: &str, sql: &str)
        -> StorageResult<Vec<QueryRow>>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: ObjectStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_must_be_plain() {
        assert!(is_valid_identifier("CurrentScan"));
        assert!(is_valid_identifier("cur_MAC"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1table"));
        assert!(!is_valid_identifier("a\"b"));
        assert!(!is_valid_identifier("t; DROP TABLE x"));
    }
}

//! Persistence gateway
//!
//! The object store owns persisted objects, events and observation history.
//! The engine dictates the transaction boundary through [`ObjectStore::transaction`];
//! `SqliteStore` is the implementation.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{
    is_valid_identifier, MappedValue, ObjectStore, ObjectTransaction, OpenStore, QueryExecutor,
    QueryRow, StorageError, StorageResult,
};

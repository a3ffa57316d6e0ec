//! Query sources against the primary store or an attached database

use super::params::unescape_quotes;
use super::traits::AdapterError;
use crate::object::RawRow;
use crate::source::SourceDescriptor;
use crate::storage::{QueryExecutor, QueryRow, StorageError};
use tracing::{info, warn};

/// Schema alias an external database is attached under.
pub const EXTERNAL_ALIAS: &str = "EXTERNAL";

/// Validate and normalize query rows; invalid rows are logged and skipped.
pub fn normalize_query_rows(source_prefix: &str, rows: Vec<QueryRow>) -> Vec<RawRow> {
    rows.into_iter()
        .filter_map(|fields| match RawRow::from_query_fields(fields) {
            Ok(row) => Some(row),
            Err(e) => {
                warn!(source = %source_prefix, error = %e, "skipped invalid query row");
                None
            }
        })
        .collect()
}

pub(super) fn produce_local_rows(
    descriptor: &SourceDescriptor,
    queries: &dyn QueryExecutor,
) -> Result<Vec<RawRow>, AdapterError> {
    let sql = unescape_quotes(&descriptor.command);
    info!(source = %descriptor.prefix, query = %sql, "executing query");

    let rows = queries.query_rows(&sql).map_err(AdapterError::Query)?;
    Ok(normalize_query_rows(&descriptor.prefix, rows))
}

pub(super) fn produce_external_rows(
    descriptor: &SourceDescriptor,
    queries: &dyn QueryExecutor,
) -> Result<Vec<RawRow>, AdapterError> {
    let path = descriptor
        .external_db_path
        .as_deref()
        .ok_or_else(|| AdapterError::Attachment("no external_db_path configured".to_string()))?;

    let sql = unescape_quotes(&descriptor.command);
    info!(source = %descriptor.prefix, db = %path.display(), query = %sql, "executing external query");

    let rows = queries
        .query_rows_attached(path, EXTERNAL_ALIAS, &sql)
        .map_err(|e| match e {
            StorageError::Attach { .. } => AdapterError::Attachment(e.to_string()),
            other => AdapterError::Query(other),
        })?;
    Ok(normalize_query_rows(&descriptor.prefix, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::NULL_SENTINEL;
    use crate::source::SourceKind;
    use crate::storage::{OpenStore, SqliteStore};

    const NINE_COLUMNS: &str = "SELECT mac, '', last_seen, ip, vendor, NULL, NULL, 'x', 'fk' FROM devices";

    fn store_with_devices() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .execute_batch(
                "CREATE TABLE devices (mac TEXT, ip TEXT, vendor TEXT, last_seen TEXT);
                 INSERT INTO devices VALUES ('aa', '10.0.0.1', 'acme', 't1');
                 INSERT INTO devices VALUES ('', '10.0.0.2', 'acme', 't1');
                 INSERT INTO devices VALUES ('null', '10.0.0.3', 'acme', 't1');",
            )
            .unwrap();
        store
    }

    #[test]
    fn local_query_skips_rows_without_identity() {
        let store = store_with_devices();
        let d = SourceDescriptor::new("DEV", SourceKind::LocalQuery, NINE_COLUMNS);
        let rows = produce_local_rows(&d, &store).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].primary_id, "aa");
        assert_eq!(rows[0].secondary_id, NULL_SENTINEL);
        assert_eq!(rows[0].watched3, NULL_SENTINEL);
    }

    #[test]
    fn local_query_rejects_wrong_width() {
        let store = store_with_devices();
        let d = SourceDescriptor::new("DEV", SourceKind::LocalQuery, "SELECT mac, ip FROM devices");
        assert!(produce_local_rows(&d, &store).unwrap().is_empty());
    }

    #[test]
    fn quote_token_is_unescaped_in_queries() {
        let store = store_with_devices();
        let sql = "SELECT mac, '', last_seen, ip, vendor, '', '', 'x', 'fk' FROM devices WHERE vendor = {s-quote}acme{s-quote} AND mac = {s-quote}aa{s-quote}";
        let d = SourceDescriptor::new("DEV", SourceKind::LocalQuery, sql);
        assert_eq!(produce_local_rows(&d, &store).unwrap().len(), 1);
    }

    #[test]
    fn invalid_sql_is_a_query_error() {
        let store = store_with_devices();
        let d = SourceDescriptor::new("DEV", SourceKind::LocalQuery, "SELECT FROM nowhere");
        assert!(matches!(produce_local_rows(&d, &store), Err(AdapterError::Query(_))));
    }

    #[test]
    fn external_query_reports_attachment_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        let d = SourceDescriptor::new("EXT", SourceKind::ExternalDbQuery, "SELECT 1")
            .with_external_db(dir.path().join("missing.db"));
        assert!(matches!(
            produce_external_rows(&d, &store),
            Err(AdapterError::Attachment(_))
        ));
    }

    #[test]
    fn external_query_reads_attached_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ext.db");
        {
            let ext = rusqlite::Connection::open(&path).unwrap();
            ext.execute_batch(
                "CREATE TABLE leases (mac TEXT, ip TEXT);
                 INSERT INTO leases VALUES ('aa', '10.0.0.9');",
            )
            .unwrap();
        }

        let store = SqliteStore::open_in_memory().unwrap();
        let d = SourceDescriptor::new(
            "EXT",
            SourceKind::ExternalDbQuery,
            "SELECT mac, 'lease', 't', ip, '', '', '', '', '' FROM EXTERNAL.leases",
        )
        .with_external_db(&path);
        let rows = produce_external_rows(&d, &store).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].watched1, "10.0.0.9");
        assert_eq!(rows[0].watched3, NULL_SENTINEL);
    }
}

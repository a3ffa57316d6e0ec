//! SQLite storage backend

use super::traits::{
    is_valid_identifier, MappedValue, ObjectStore, ObjectTransaction, OpenStore, QueryExecutor,
    QueryRow, StorageError, StorageResult,
};
use crate::object::{Event, PersistedObject, RawRow, Status, WatchedValues};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, ToSql, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

const OBJECT_COLUMNS: &str = "id, source_prefix, primary_id, secondary_id, created_at, changed_at,
     watched1, watched2, watched3, watched4, status, extra, user_data, foreign_key";

const EVENT_COLUMNS: &str = "object_index, source_prefix, primary_id, secondary_id, created_at, changed_at,
     watched1, watched2, watched3, watched4, status, extra, user_data, foreign_key";

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for MappedValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            MappedValue::Integer(v) => v.to_sql(),
            MappedValue::Text(v) => v.to_sql(),
            MappedValue::Null => Ok(ToSqlOutput::from(rusqlite::types::Null)),
        }
    }
}

/// SQLite-backed object store
///
/// Uses a single database file with tables for objects, events and
/// observation history. Thread-safe via internal mutex on the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS source_objects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_prefix TEXT NOT NULL,
                primary_id TEXT NOT NULL,
                secondary_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                changed_at TEXT NOT NULL,
                watched1 TEXT NOT NULL,
                watched2 TEXT NOT NULL,
                watched3 TEXT NOT NULL,
                watched4 TEXT NOT NULL,
                status TEXT NOT NULL,
                extra TEXT NOT NULL,
                user_data TEXT,
                foreign_key TEXT NOT NULL
            );

            -- One live object per identity within a source
            CREATE UNIQUE INDEX IF NOT EXISTS idx_objects_identity
                ON source_objects(source_prefix, primary_id, secondary_id);

            CREATE TABLE IF NOT EXISTS source_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                object_index INTEGER,
                source_prefix TEXT NOT NULL,
                primary_id TEXT NOT NULL,
                secondary_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                changed_at TEXT NOT NULL,
                watched1 TEXT NOT NULL,
                watched2 TEXT NOT NULL,
                watched3 TEXT NOT NULL,
                watched4 TEXT NOT NULL,
                status TEXT NOT NULL,
                extra TEXT NOT NULL,
                user_data TEXT,
                foreign_key TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_source
                ON source_events(source_prefix);

            CREATE TABLE IF NOT EXISTS source_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_prefix TEXT NOT NULL,
                observed_at TEXT NOT NULL,
                primary_id TEXT NOT NULL,
                secondary_id TEXT NOT NULL,
                changed_at TEXT NOT NULL,
                watched1 TEXT NOT NULL,
                watched2 TEXT NOT NULL,
                watched3 TEXT NOT NULL,
                watched4 TEXT NOT NULL,
                extra TEXT NOT NULL,
                foreign_key TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_history_source
                ON source_history(source_prefix);

            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn row_to_object(row: &rusqlite::Row<'_>) -> rusqlite::Result<PersistedObject> {
        Ok(PersistedObject {
            index: Some(row.get(0)?),
            source_prefix: row.get(1)?,
            primary_id: row.get(2)?,
            secondary_id: row.get(3)?,
            created_at: row.get(4)?,
            changed_at: row.get(5)?,
            watched: WatchedValues {
                watched1: row.get(6)?,
                watched2: row.get(7)?,
                watched3: row.get(8)?,
                watched4: row.get(9)?,
            },
            status: row.get(10)?,
            extra: row.get(11)?,
            user_data: row.get(12)?,
            foreign_key: row.get(13)?,
        })
    }

    fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
        Ok(Event {
            object_index: row.get(0)?,
            source_prefix: row.get(1)?,
            primary_id: row.get(2)?,
            secondary_id: row.get(3)?,
            created_at: row.get(4)?,
            changed_at: row.get(5)?,
            watched: WatchedValues {
                watched1: row.get(6)?,
                watched2: row.get(7)?,
                watched3: row.get(8)?,
                watched4: row.get(9)?,
            },
            status: row.get(10)?,
            extra: row.get(11)?,
            user_data: row.get(12)?,
            foreign_key: row.get(13)?,
        })
    }

    fn load_objects_with(conn: &Connection, source_prefix: &str) -> StorageResult<Vec<PersistedObject>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {OBJECT_COLUMNS} FROM source_objects WHERE source_prefix = ?1 ORDER BY id"
        ))?;
        let objects = stmt
            .query_map(params![source_prefix], Self::row_to_object)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(objects)
    }

    fn collect_rows(conn: &Connection, sql: &str) -> StorageResult<Vec<QueryRow>> {
        let mut stmt = conn.prepare(sql)?;
        let width = stmt.column_count();
        let mut rows = stmt.query([])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut fields = Vec::with_capacity(width);
            for i in 0..width {
                fields.push(value_to_text(row.get_ref(i)?));
            }
            out.push(fields);
        }
        Ok(out)
    }

    /// All persisted objects of a source, outside any reconciliation.
    pub fn objects(&self, source_prefix: &str) -> StorageResult<Vec<PersistedObject>> {
        let conn = self.lock()?;
        Self::load_objects_with(&conn, source_prefix)
    }

    /// All events of a source, oldest first.
    pub fn events(&self, source_prefix: &str) -> StorageResult<Vec<Event>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM source_events WHERE source_prefix = ?1 ORDER BY id"
        ))?;
        let events = stmt
            .query_map(params![source_prefix], Self::row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Number of history rows recorded for a source.
    pub fn history_count(&self, source_prefix: &str) -> StorageResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM source_history WHERE source_prefix = ?1",
            params![source_prefix],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Set the user-owned annotation of one object. Returns false when no
    /// object has that identity.
    pub fn set_user_data(
        &self,
        source_prefix: &str,
        primary_id: &str,
        secondary_id: &str,
        user_data: Option<&str>,
    ) -> StorageResult<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE source_objects SET user_data = ?1
             WHERE source_prefix = ?2 AND primary_id = ?3 AND secondary_id = ?4",
            params![user_data, source_prefix, primary_id, secondary_id],
        )?;
        Ok(rows > 0)
    }

    /// Run raw SQL statements against the primary store.
    pub fn execute_batch(&self, sql: &str) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql)?;
        Ok(())
    }
}

/// Render any SQLite value as text; NULL stays `None`.
fn value_to_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
    }
}

/// Read-only SQLite URI for an attached database.
fn read_only_uri(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let escaped = raw.replace('%', "%25").replace('?', "%3f").replace('#', "%23");
    format!("file:{escaped}?mode=ro")
}

fn check_storable(status: Status) -> StorageResult<()> {
    if status.is_storable() {
        Ok(())
    } else {
        Err(StorageError::UnstorableStatus(status))
    }
}

/// Transaction handle passed to reconciliation.
struct SqliteTransaction<'a, 'conn> {
    tx: &'a Transaction<'conn>,
}

impl ObjectTransaction for SqliteTransaction<'_, '_> {
    fn load_objects(&mut self, source_prefix: &str) -> StorageResult<Vec<PersistedObject>> {
        SqliteStore::load_objects_with(self.tx, source_prefix)
    }

    fn bulk_insert(&mut self, objects: &[PersistedObject]) -> StorageResult<Vec<i64>> {
        let mut stmt = self.tx.prepare_cached(
            r#"
            INSERT INTO source_objects (source_prefix, primary_id, secondary_id, created_at, changed_at,
                                        watched1, watched2, watched3, watched4, status, extra, user_data, foreign_key)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )?;

        let mut indexes = Vec::with_capacity(objects.len());
        for o in objects {
            check_storable(o.status)?;
            let index = stmt.insert(params![
                o.source_prefix,
                o.primary_id,
                o.secondary_id,
                o.created_at,
                o.changed_at,
                o.watched.watched1,
                o.watched.watched2,
                o.watched.watched3,
                o.watched.watched4,
                o.status,
                o.extra,
                o.user_data,
                o.foreign_key,
            ])?;
            indexes.push(index);
        }
        Ok(indexes)
    }

    fn bulk_update(&mut self, objects: &[PersistedObject]) -> StorageResult<usize> {
        let mut stmt = self.tx.prepare_cached(
            r#"
            UPDATE source_objects
            SET source_prefix = ?1, primary_id = ?2, secondary_id = ?3, created_at = ?4, changed_at = ?5,
                watched1 = ?6, watched2 = ?7, watched3 = ?8, watched4 = ?9, status = ?10, extra = ?11,
                user_data = ?12, foreign_key = ?13
            WHERE id = ?14
            "#,
        )?;

        for o in objects {
            check_storable(o.status)?;
            let index = o.index.ok_or_else(|| StorageError::MissingIndex(o.identity()))?;
            let rows = stmt.execute(params![
                o.source_prefix,
                o.primary_id,
                o.secondary_id,
                o.created_at,
                o.changed_at,
                o.watched.watched1,
                o.watched.watched2,
                o.watched.watched3,
                o.watched.watched4,
                o.status,
                o.extra,
                o.user_data,
                o.foreign_key,
                index,
            ])?;
            if rows == 0 {
                return Err(StorageError::ObjectNotFound(index));
            }
        }
        Ok(objects.len())
    }

    fn bulk_insert_events(&mut self, events: &[Event]) -> StorageResult<usize> {
        let mut stmt = self.tx.prepare_cached(&format!(
            "INSERT INTO source_events ({EVENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
        ))?;

        for e in events {
            check_storable(e.status)?;
            stmt.execute(params![
                e.object_index,
                e.source_prefix,
                e.primary_id,
                e.secondary_id,
                e.created_at,
                e.changed_at,
                e.watched.watched1,
                e.watched.watched2,
                e.watched.watched3,
                e.watched.watched4,
                e.status,
                e.extra,
                e.user_data,
                e.foreign_key,
            ])?;
        }
        Ok(events.len())
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl ObjectStore for SqliteStore {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn ObjectTransaction) -> Result<T, E>,
        E: From<StorageError>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StorageError::from)?;

        let result = f(&mut SqliteTransaction { tx: &tx });

        match result {
            Ok(value) => {
                tx.commit().map_err(StorageError::from)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }

    fn append_history(
        &self,
        source_prefix: &str,
        rows: &[RawRow],
        observed_at: &str,
    ) -> StorageResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                r#"
                INSERT INTO source_history (source_prefix, observed_at, primary_id, secondary_id, changed_at,
                                            watched1, watched2, watched3, watched4, extra, foreign_key)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )?;
            for r in rows {
                stmt.execute(params![
                    source_prefix,
                    observed_at,
                    r.primary_id,
                    r.secondary_id,
                    r.changed_at,
                    r.watched1,
                    r.watched2,
                    r.watched3,
                    r.watched4,
                    r.extra,
                    r.foreign_key,
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn insert_mapped(
        &self,
        table: &str,
        columns: &[String],
        rows: &[Vec<MappedValue>],
    ) -> StorageResult<usize> {
        if !is_valid_identifier(table) {
            return Err(StorageError::InvalidIdentifier(table.to_string()));
        }
        if let Some(bad) = columns.iter().find(|c| !is_valid_identifier(c)) {
            return Err(StorageError::InvalidIdentifier(bad.clone()));
        }

        let column_list = columns
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("INSERT INTO \"{table}\" ({column_list}) VALUES ({placeholders})");

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                stmt.execute(rusqlite::params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }
}

impl QueryExecutor for SqliteStore {
    fn query_rows(&self, sql: &str) -> StorageResult<Vec<QueryRow>> {
        let conn = self.lock()?;
        Self::collect_rows(&conn, sql)
    }

    fn query_rows_attached(
        &self,
        db_path: &Path,
        alias: &str,
        sql: &str,
    ) -> StorageResult<Vec<QueryRow>> {
        if !is_valid_identifier(alias) {
            return Err(StorageError::InvalidIdentifier(alias.to_string()));
        }

        let conn = self.lock()?;
        conn.execute(
            &format!("ATTACH DATABASE ?1 AS \"{alias}\""),
            params![read_only_uri(db_path)],
        )
        .map_err(|e| StorageError::Attach {
            path: db_path.display().to_string(),
            message: e.to_string(),
        })?;

        let result = Self::collect_rows(&conn, sql);

        if let Err(e) = conn.execute(&format!("DETACH DATABASE \"{alias}\""), []) {
            warn!(alias, error = %e, "failed to detach database");
        }
        result
    }
}

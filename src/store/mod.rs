//! Persistence adapter for the local record store.
//!
//! Wraps a single relational backend behind a small execute/query/close
//! surface. The connection is owned exclusively by [`Database`]; no other
//! component touches it. Statements commit immediately on success and
//! parameters are always bound positionally, never interpolated.

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{DatabaseConfig, StoreConfig};

/// Backend or handle failure. Never retried; callers surface it to the user
/// and keep the process alive.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unsupported backend type `{0}`")]
    UnsupportedBackend(String),
    #[error("database handle is closed")]
    Closed,
    #[error("failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Relational backend variant. A single variant today; the enum exists so a
/// remote backend can be added without touching call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sqlite,
}

impl BackendKind {
    pub fn from_config(backend_type: &str) -> Result<Self, StoreError> {
        match backend_type {
            "sqlite" => Ok(BackendKind::Sqlite),
            other => Err(StoreError::UnsupportedBackend(other.to_string())),
        }
    }
}

/// A single typed field of a record row
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

/// One record row: a fixed-arity ordered tuple matching the active schema
pub type Row = Vec<Value>;

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<rusqlite::types::Value> for Value {
    fn from(value: rusqlite::types::Value) -> Self {
        match value {
            rusqlite::types::Value::Null => Value::Null,
            rusqlite::types::Value::Integer(i) => Value::Integer(i),
            rusqlite::types::Value::Real(r) => Value::Real(r),
            rusqlite::types::Value::Text(s) => Value::Text(s),
            rusqlite::types::Value::Blob(b) => {
                Value::Text(String::from_utf8_lossy(&b).into_owned())
            }
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*r)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// Quote an identifier for use in generated DDL/queries
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Owns the one live connection to the backend
pub struct Database {
    kind: BackendKind,
    conn: Option<Connection>,
}

impl Database {
    /// Open the configured backend and ensure the expected schema exists.
    ///
    /// Schema creation is idempotent: a table that already exists is a
    /// silent no-op, never an error.
    ///
    /// # Errors
    /// Returns an error if the backend variant is unknown, the target cannot
    /// be opened, or schema creation fails.
    pub fn open(
        database: &DatabaseConfig,
        store: &StoreConfig,
        target: &Path,
    ) -> Result<Self, StoreError> {
        let kind = BackendKind::from_config(&database.backend_type)?;

        // First run: the data directory may not exist yet
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(target)?;
        Self::ensure_schema(&conn, store)?;
        info!("Opened {:?} record store at {:?}", kind, target);

        Ok(Self {
            kind,
            conn: Some(conn),
        })
    }

    fn ensure_schema(conn: &Connection, store: &StoreConfig) -> Result<(), StoreError> {
        let columns = store
            .columns
            .iter()
            .map(|col| format!("{} {}", quote_ident(&col.name), col.kind.sql_type()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&store.table),
            columns
        );
        conn.execute(&sql, [])?;
        debug!("Ensured schema for table `{}`", store.table);
        Ok(())
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    fn conn(&self) -> Result<&Connection, StoreError> {
        self.conn.as_ref().ok_or(StoreError::Closed)
    }

    /// Run a mutating statement with positional parameters, committing
    /// immediately on success. Returns the number of affected rows.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let affected = stmt.execute(params_from_iter(params.iter()))?;
        Ok(affected)
    }

    /// Run a read statement and materialize the full ordered result set
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let column_count = stmt.column_count();

        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Vec::with_capacity(column_count);
            for index in 0..column_count {
                let value: rusqlite::types::Value = row.get(index)?;
                record.push(Value::from(value));
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Release the connection. Later operations fail fast with
    /// [`StoreError::Closed`] instead of touching a dead handle.
    pub fn close(&mut self) {
        if self.conn.take().is_some() {
            info!("Closed record store");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn open_memory() -> Database {
        let config = Config::default();
        Database::open(&config.database, &config.store, Path::new(":memory:")).unwrap()
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = BackendKind::from_config("oracle").unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedBackend(_)));
    }

    #[test]
    fn test_schema_creation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.db");
        let config = Config::default();

        let first = Database::open(&config.database, &config.store, &path);
        assert!(first.is_ok());
        drop(first);

        // Opening again against the same file re-runs schema creation
        let second = Database::open(&config.database, &config.store, &path);
        assert!(second.is_ok());
    }

    #[test]
    fn test_execute_and_query_roundtrip_in_order() {
        let db = open_memory();

        db.execute(
            "INSERT INTO parts (type, model, qty, brand, location) VALUES (?, ?, ?, ?, ?)",
            &[
                Value::Text("cpu".into()),
                Value::Text("Z80".into()),
                Value::Integer(4),
                Value::Text("zilog".into()),
                Value::Text("A1".into()),
            ],
        )
        .unwrap();
        db.execute(
            "INSERT INTO parts (type, model, qty, brand, location) VALUES (?, ?, ?, ?, ?)",
            &[
                Value::Text("ram".into()),
                Value::Text("4164".into()),
                Value::Integer(8),
                Value::Text("mostek".into()),
                Value::Text("A2".into()),
            ],
        )
        .unwrap();

        let rows = db.query("SELECT * FROM parts", &[]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], Value::Text("cpu".into()));
        assert_eq!(rows[0][2], Value::Integer(4));
        assert_eq!(rows[1][1], Value::Text("4164".into()));
    }

    #[test]
    fn test_positional_parameter_binding() {
        let db = open_memory();

        // A value full of SQL metacharacters must be bound, not interpolated
        let hostile = "x'); DROP TABLE parts; --";
        db.execute(
            "INSERT INTO parts (type, model, qty, brand, location) VALUES (?, ?, ?, ?, ?)",
            &[
                Value::Text(hostile.into()),
                Value::Null,
                Value::Integer(1),
                Value::Null,
                Value::Null,
            ],
        )
        .unwrap();

        let rows = db
            .query(
                "SELECT model FROM parts WHERE type = ?",
                &[Value::Text(hostile.into())],
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], Value::Null);
    }

    #[test]
    fn test_closed_handle_fails_fast() {
        let mut db = open_memory();
        db.close();
        assert!(db.is_closed());

        let err = db.query("SELECT * FROM parts", &[]).unwrap_err();
        assert!(matches!(err, StoreError::Closed));
        let err = db.execute("DELETE FROM parts", &[]).unwrap_err();
        assert!(matches!(err, StoreError::Closed));
    }

    #[test]
    fn test_query_failure_propagates() {
        let db = open_memory();
        let err = db.query("SELECT * FROM missing_table", &[]).unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}

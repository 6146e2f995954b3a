//! Shared SQLite connection and raw SQL execution

use rusqlite::{types::ValueRef, Connection};
use serde_json::{Map, Number, Value};
use std::path::Path;
use std::sync::Mutex;

use crate::StoreError;

/// One result row: column name to value, in select-list order.
pub type Row = Map<String, Value>;

/// Anything the request handler can run model-generated SQL against.
pub trait QueryStore: Send + Sync {
    /// Execute `sql` verbatim and materialize every resulting row.
    fn run_query(&self, sql: &str) -> Result<Vec<Row>, StoreError>;
}

/// The measurement table's SQLite database, opened once per process.
///
/// `rusqlite::Connection` is `Send` but not `Sync`, so access is
/// serialized through a mutex.
pub struct ArgoStore {
    conn: Mutex<Connection>,
}

impl ArgoStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        tracing::info!(path = %path.as_ref().display(), "Opened measurement store");
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Run `f` with exclusive access to the underlying connection, for setup and loading.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&mut conn)
    }
}

impl QueryStore for ArgoStore {
    fn run_query(&self, sql: &str) -> Result<Vec<Row>, StoreError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();

            let mut rows = stmt.query([])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                let mut record = Row::with_capacity(columns.len());
                for (idx, name) in columns.iter().enumerate() {
                    record.insert(name.clone(), sqlite_value_to_json(row.get_ref(idx)?));
                }
                records.push(record);
            }

            tracing::debug!(rows = records.len(), columns = columns.len(), "Query executed");
            Ok(records)
        })
    }
}

/// Convert a SQLite value to JSON
fn sqlite_value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}

//! [`SqliteConnection`]: the persistence gateway over `rusqlite`.

use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;

use rowmodel_core::{Connection, Error, Executor, Result, Row, Value};
use rusqlite::types::{Value as SqliteValue, ValueRef};
use serde::Serialize;

use crate::config::{SqliteConfig, SqliteTarget};

/// Statement counters, reset only by reopening the connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    /// Every statement sent, including scripts and transaction control.
    pub statements: u64,
    /// Row-returning queries.
    pub queries: u64,
    /// INSERT/UPDATE/DELETE statements.
    pub writes: u64,
}

/// A single SQLite connection.
///
/// Not `Sync`: share it across threads through a session wrapper that
/// serializes access.
#[derive(Debug)]
pub struct SqliteConnection {
    conn: rusqlite::Connection,
    config: SqliteConfig,
    stats: Cell<ConnectionStats>,
}

fn db_error(err: rusqlite::Error) -> Error {
    Error::Connection(err.to_string())
}

fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::BigInt(i) => SqliteValue::Integer(*i),
        Value::Double(f) => SqliteValue::Real(*f),
        Value::Text(s) => SqliteValue::Text(s.clone()),
    }
}

fn from_sqlite(value: ValueRef<'_>, column: &str) -> Result<Value> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(i) => Ok(Value::BigInt(i)),
        ValueRef::Real(f) => Ok(Value::Double(f)),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(|s| Value::Text(s.to_string()))
            .map_err(|e| Error::Decode {
                column: column.to_string(),
                message: e.to_string(),
            }),
        ValueRef::Blob(_) => Err(Error::Decode {
            column: column.to_string(),
            message: "BLOB columns are not supported".to_string(),
        }),
    }
}

impl SqliteConnection {
    /// Open a private in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(SqliteConfig::memory())
    }

    /// Open a database as described by `config` and apply its pragmas.
    pub fn open(config: SqliteConfig) -> Result<Self> {
        let conn = match &config.target {
            SqliteTarget::Memory => rusqlite::Connection::open_in_memory(),
            SqliteTarget::Path(path) => rusqlite::Connection::open(path),
        }
        .map_err(db_error)?;

        let this = Self {
            conn,
            config,
            stats: Cell::new(ConnectionStats::default()),
        };
        this.apply_pragmas()?;
        tracing::info!(location = ?this.config.target, "opened sqlite connection");
        Ok(this)
    }

    fn apply_pragmas(&self) -> Result<()> {
        let foreign_keys = if self.config.foreign_keys { "ON" } else { "OFF" };
        self.conn
            .execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))
            .map_err(db_error)?;
        if !self.config.is_memory() {
            self.conn
                .execute_batch(&format!(
                    "PRAGMA journal_mode = {};",
                    self.config.journal_mode.pragma_value()
                ))
                .map_err(db_error)?;
        }
        self.conn
            .busy_timeout(Duration::from_millis(self.config.busy_timeout_ms))
            .map_err(db_error)?;
        Ok(())
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Counters since the connection was opened.
    pub fn stats(&self) -> ConnectionStats {
        self.stats.get()
    }

    /// Number of statements sent so far.
    pub fn statement_count(&self) -> u64 {
        self.stats.get().statements
    }

    /// Whether the connection is inside an open transaction.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn record(&self, sql: &str, params: &[Value], update: impl FnOnce(&mut ConnectionStats)) {
        tracing::debug!(sql = %sql, params = params.len(), "executing sql");
        let mut stats = self.stats.get();
        stats.statements += 1;
        update(&mut stats);
        self.stats.set(stats);
    }

    fn run(&self, sql: &str, params: &[Value]) -> Result<usize> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(db_error)?;
        stmt.execute(rusqlite::params_from_iter(params.iter().map(to_sqlite)))
            .map_err(db_error)
    }
}

impl Executor for SqliteConnection {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.record(sql, params, |s| s.queries += 1);

        let mut stmt = self.conn.prepare_cached(sql).map_err(db_error)?;
        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let mut rows = stmt
            .query(rusqlite::params_from_iter(params.iter().map(to_sqlite)))
            .map_err(db_error)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(db_error)? {
            let mut values = Vec::with_capacity(columns.len());
            for (idx, column) in columns.iter().enumerate() {
                values.push(from_sqlite(row.get_ref(idx).map_err(db_error)?, column)?);
            }
            out.push(Row::new(Arc::clone(&columns), values));
        }
        Ok(out)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.record(sql, params, |s| s.writes += 1);
        Ok(self.run(sql, params)? as u64)
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64> {
        self.record(sql, params, |s| s.writes += 1);
        self.run(sql, params)?;
        Ok(self.conn.last_insert_rowid())
    }
}

impl Connection for SqliteConnection {
    fn batch(&self, sql: &str) -> Result<()> {
        self.record(sql, &[], |_| {});
        self.conn.execute_batch(sql).map_err(db_error)
    }
}

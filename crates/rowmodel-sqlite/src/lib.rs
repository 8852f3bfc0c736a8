//! SQLite driver for rowmodel.
//!
//! [`SqliteConnection`] implements the [`Executor`](rowmodel_core::Executor)
//! and [`Connection`](rowmodel_core::Connection) traits over an embedded
//! `rusqlite` database. Values are bound positionally (`?1`, `?2`, ...) and
//! every statement is logged at debug level.
//!
//! ```ignore
//! let conn = SqliteConnection::open(SqliteConfig::path("app.db").busy_timeout_ms(1_000))?;
//! conn.batch("CREATE TABLE heroes (id INTEGER PRIMARY KEY, name TEXT)")?;
//! ```

pub mod config;
pub mod connection;

pub use config::{JournalMode, SqliteConfig, SqliteTarget};
pub use connection::{ConnectionStats, SqliteConnection};

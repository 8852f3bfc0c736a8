//! Connection configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqliteTarget {
    /// A private in-memory database, gone when the connection drops.
    #[default]
    Memory,
    /// A database file, created if missing.
    Path(PathBuf),
}

/// `SQLite` journal mode for file databases.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    /// Rollback journal deleted after each transaction.
    #[default]
    Delete,
    /// Write-ahead log.
    Wal,
}

impl JournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Wal => "wal",
        }
    }
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Configuration for [`SqliteConnection`](crate::SqliteConnection).
///
/// # Invariants
/// - `busy_timeout_ms` is interpreted as milliseconds.
/// - `journal_mode` is ignored for in-memory databases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Database location.
    #[serde(default)]
    pub target: SqliteTarget,
    /// Enforce `REFERENCES` constraints.
    #[serde(default = "enabled")]
    pub foreign_keys: bool,
    /// How long a statement waits on a locked database.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Journal mode for file databases.
    #[serde(default)]
    pub journal_mode: JournalMode,
}

const fn enabled() -> bool {
    true
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            target: SqliteTarget::Memory,
            foreign_keys: true,
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: JournalMode::default(),
        }
    }
}

impl SqliteConfig {
    /// In-memory database with default settings.
    pub fn memory() -> Self {
        Self::default()
    }

    /// File database at `path` with default settings.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self {
            target: SqliteTarget::Path(path.into()),
            ..Self::default()
        }
    }

    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    pub fn busy_timeout_ms(mut self, millis: u64) -> Self {
        self.busy_timeout_ms = millis;
        self
    }

    pub fn journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = mode;
        self
    }

    pub fn is_memory(&self) -> bool {
        self.target == SqliteTarget::Memory
    }
}

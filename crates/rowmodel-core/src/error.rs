//! Error taxonomy shared by every rowmodel crate.
//!
//! Validation failures on the non-strict paths are *not* errors: `save` returns
//! `Ok(false)` and the caller inspects the record's [`Errors`]. Everything else
//! propagates through [`Error`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::validate::Errors;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// The query clause a [`QueryError`] was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Clause {
    Select,
    Where,
    Order,
    Limit,
    Offset,
    Includes,
    Pluck,
    Scope,
    Join,
}

impl Clause {
    pub const fn as_str(self) -> &'static str {
        match self {
            Clause::Select => "select",
            Clause::Where => "where",
            Clause::Order => "order",
            Clause::Limit => "limit",
            Clause::Offset => "offset",
            Clause::Includes => "includes",
            Clause::Pluck => "pluck",
            Clause::Scope => "scope",
            Clause::Join => "join",
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A malformed query specification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {clause} clause: {message}")]
pub struct QueryError {
    pub clause: Clause,
    pub message: String,
}

impl QueryError {
    pub fn new(clause: Clause, message: impl Into<String>) -> Self {
        Self {
            clause,
            message: message.into(),
        }
    }

    pub fn unknown_column(clause: Clause, table: &str, column: &str) -> Self {
        Self::new(clause, format!("unknown column `{column}` on `{table}`"))
    }
}

/// Raised by the strict persistence paths when validation fails.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("validation failed for `{table}`: {}", errors.full_messages().join(", "))]
pub struct RecordInvalid {
    pub table: &'static str,
    pub errors: Errors,
}

impl RecordInvalid {
    pub fn new(table: &'static str, errors: Errors) -> Self {
        Self { table, errors }
    }
}

/// Every failure the engine can surface.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Malformed query specification.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Validation failed on a strict (`*_strict`) path.
    #[error(transparent)]
    RecordInvalid(#[from] RecordInvalid),

    /// A by-key lookup found nothing.
    #[error("no `{table}` record with id {id}")]
    NotFound { table: &'static str, id: i64 },

    /// The active unit of work has already been rolled back.
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),

    /// Unknown association name, wrong target type, or broken through chain.
    #[error("association error: {0}")]
    Association(String),

    /// A stored value could not be decoded into the declared Rust type.
    #[error("cannot decode column `{column}`: {message}")]
    Decode { column: String, message: String },

    /// An operation is not allowed in the record's current lifecycle state.
    #[error("invalid record state: {0}")]
    InvalidState(String),

    /// The persistence gateway reported a failure.
    #[error("database error: {0}")]
    Connection(String),
}

impl Error {
    /// Validation errors carried by a [`Error::RecordInvalid`].
    pub fn validation_errors(&self) -> Option<&Errors> {
        match self {
            Error::RecordInvalid(invalid) => Some(&invalid.errors),
            _ => None,
        }
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

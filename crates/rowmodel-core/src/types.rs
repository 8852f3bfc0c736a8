//! SQL column types.

use serde::{Deserialize, Serialize};

/// Declared type of a column.
///
/// Row decoding coerces according to this type; DDL generation uses
/// [`SqlType::sql_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    /// Integer column (also used for keys).
    Integer,
    /// 64-bit integer column.
    BigInt,
    /// Short string column.
    String,
    /// Unbounded text column.
    Text,
    /// Floating point column.
    Real,
    /// Boolean column.
    Boolean,
}

impl SqlType {
    /// SQLite spelling of the type.
    pub const fn sql_name(self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::String => "VARCHAR(255)",
            SqlType::Text => "TEXT",
            SqlType::Real => "REAL",
            SqlType::Boolean => "BOOLEAN",
        }
    }

    /// Whether values of this type are textual.
    pub const fn is_textual(self) -> bool {
        matches!(self, SqlType::String | SqlType::Text)
    }

    /// Whether values of this type are numeric.
    pub const fn is_numeric(self) -> bool {
        matches!(self, SqlType::Integer | SqlType::BigInt | SqlType::Real)
    }
}

//! Field and column definitions.

use crate::types::SqlType;

/// Metadata about a model column.
///
/// Declared once per model as a `static` slice and returned from
/// [`Model::fields`](crate::Model::fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    /// Database column name.
    pub name: &'static str,
    /// SQL type for this column.
    pub sql_type: SqlType,
    /// Whether this column accepts NULL.
    pub nullable: bool,
    /// Whether this is the primary key.
    pub primary_key: bool,
    /// Whether the key is assigned by the database on insert.
    pub auto_increment: bool,
    /// Foreign key reference (`table.column`).
    pub foreign_key: Option<&'static str>,
}

impl FieldInfo {
    /// Create a new non-nullable field.
    pub const fn new(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            sql_type,
            nullable: false,
            primary_key: false,
            auto_increment: false,
            foreign_key: None,
        }
    }

    /// The conventional auto-incrementing integer key column.
    pub const fn id() -> Self {
        Self::new("id", SqlType::Integer)
            .primary_key(true)
            .auto_increment(true)
    }

    /// Set nullable flag.
    pub const fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Set primary key flag.
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    /// Set auto-increment flag.
    pub const fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }

    /// Set foreign key reference.
    pub const fn foreign_key(mut self, reference: &'static str) -> Self {
        self.foreign_key = Some(reference);
        self
    }

    /// Split a `table.column` foreign key reference.
    pub fn foreign_key_parts(&self) -> Option<(&'static str, &'static str)> {
        self.foreign_key.and_then(|r| r.split_once('.'))
    }
}

/// Find a field by column name.
pub fn find_field<'a>(fields: &'a [FieldInfo], name: &str) -> Option<&'a FieldInfo> {
    fields.iter().find(|f| f.name == name)
}

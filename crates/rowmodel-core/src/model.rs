//! The `Model` trait and per-model static metadata.

use std::fmt;

use crate::error::Result;
use crate::field::FieldInfo;
use crate::relationship::RelationshipInfo;
use crate::row::Row;
use crate::spec::QuerySpec;
use crate::validate::Rule;
use crate::value::Value;

/// A typed domain entity stored in one table.
///
/// Implementations hold the *attributes* of a row. The primary key, the
/// persistence state and the validation errors are carried by the record
/// wrapper in `rowmodel-query`, so a model value never pretends to be saved.
///
/// Columns that can hold NULL (and any column whose absence should be
/// observable) are modelled as `Option<T>`.
///
/// # Example
///
/// ```
/// use rowmodel_core::{FieldInfo, Model, Result, Row, SqlType, Value};
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct User {
///     name: Option<String>,
/// }
///
/// impl Model for User {
///     const TABLE_NAME: &'static str = "users";
///
///     fn fields() -> &'static [FieldInfo] {
///         static FIELDS: &[FieldInfo] = &[
///             FieldInfo::id(),
///             FieldInfo::new("name", SqlType::String).nullable(true),
///         ];
///         FIELDS
///     }
///
///     fn to_row(&self) -> Vec<(&'static str, Value)> {
///         vec![("name", self.name.clone().into())]
///     }
///
///     fn from_row(row: &Row) -> Result<Self> {
///         Ok(Self { name: row.decode("name")? })
///     }
/// }
///
/// assert!(User::has_column("name"));
/// assert!(User::has_column("id"));
/// ```
pub trait Model: Clone + fmt::Debug + Sized + 'static {
    /// Table the model maps to.
    const TABLE_NAME: &'static str;

    /// Integer primary key column.
    const PRIMARY_KEY: &'static str = "id";

    /// Every declared column, primary key included.
    fn fields() -> &'static [FieldInfo];

    /// Association descriptors, resolved by name.
    fn relationships() -> &'static [RelationshipInfo] {
        &[]
    }

    /// Validation rules, evaluated in order.
    fn validations() -> &'static [Rule<Self>] {
        &[]
    }

    /// Named, reusable query fragments.
    fn scopes() -> &'static [Scope] {
        &[]
    }

    /// Non-key attributes as `(column, value)` pairs.
    fn to_row(&self) -> Vec<(&'static str, Value)>;

    /// Decode non-key attributes. Unknown columns must be ignored.
    fn from_row(row: &Row) -> Result<Self>;

    /// Whether `column` is declared on this model.
    fn has_column(column: &str) -> bool {
        column == Self::PRIMARY_KEY || Self::fields().iter().any(|f| f.name == column)
    }

    /// Current value of a non-key attribute.
    fn read_attribute(&self, column: &str) -> Option<Value> {
        self.to_row()
            .into_iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value)
    }

    /// Overwrite a non-key attribute by round-tripping through the row mapping.
    fn write_attribute(&mut self, column: &str, value: Value) -> Result<()> {
        let pairs = self
            .to_row()
            .into_iter()
            .map(|(name, current)| {
                let v = if name == column { value.clone() } else { current };
                (name, v)
            });
        *self = Self::from_row(&Row::from_pairs(pairs))?;
        Ok(())
    }
}

/// A named query fragment registered on a model.
///
/// `build` receives exactly `arity` arguments and returns the fragment that is
/// merged into the calling query.
#[derive(Clone, Copy)]
pub struct Scope {
    pub name: &'static str,
    pub arity: usize,
    pub build: fn(&[Value]) -> Result<QuerySpec>,
}

impl Scope {
    pub const fn new(
        name: &'static str,
        arity: usize,
        build: fn(&[Value]) -> Result<QuerySpec>,
    ) -> Self {
        Self { name, arity, build }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

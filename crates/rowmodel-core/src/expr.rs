//! Filter predicates and ordering terms.
//!
//! These are plain values: building a predicate never touches the database.
//! `rowmodel-query` compiles them into SQL with positional parameters, so values
//! are always bound, never interpolated.
//!
//! ```
//! use rowmodel_core::expr::{Expr, Predicate};
//!
//! let named = Expr::col("name").is_in(["user 2", "user 3"]);
//! let captioned = Expr::col("caption").like("%2%");
//! let both = Predicate::and([named, captioned]);
//! assert!(matches!(both, Predicate::And(ref parts) if parts.len() == 2));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A possibly table-qualified column reference (`caption` or `posts.caption`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub name: String,
}

impl ColumnRef {
    /// Parse `column` or `table.column`.
    pub fn parse(reference: &str) -> Self {
        match reference.split_once('.') {
            Some((table, name)) => Self::qualified(table, name),
            None => Self {
                table: None,
                name: reference.to_string(),
            },
        }
    }

    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            name: name.into(),
        }
    }
}

impl From<&str> for ColumnRef {
    fn from(reference: &str) -> Self {
        Self::parse(reference)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{table}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub const fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

/// A single filter condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// `column <op> value`; `Eq`/`Ne` against NULL become `IS [NOT] NULL`.
    Compare {
        column: ColumnRef,
        op: CompareOp,
        value: Value,
    },
    /// `column [NOT] LIKE pattern`.
    Like {
        column: ColumnRef,
        pattern: String,
        negated: bool,
    },
    /// `column [NOT] IN (values)`. An empty set matches nothing (or everything when negated).
    In {
        column: ColumnRef,
        values: Vec<Value>,
        negated: bool,
    },
    /// `column IS [NOT] NULL`.
    IsNull { column: ColumnRef, negated: bool },
    /// SQL fragment with `?` placeholders, one per entry in `params`.
    Raw { sql: String, params: Vec<Value> },
    /// Conjunction.
    And(Vec<Predicate>),
    /// Disjunction.
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Raw SQL fragment with bound parameters.
    pub fn raw<I, V>(sql: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::Raw {
            sql: sql.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    pub fn and(parts: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::And(parts.into_iter().collect())
    }

    pub fn or(parts: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::Or(parts.into_iter().collect())
    }

    /// A predicate no row satisfies.
    pub fn never() -> Self {
        Predicate::Raw {
            sql: "0 = 1".to_string(),
            params: Vec::new(),
        }
    }

    /// Every column referenced by this predicate (raw fragments are opaque).
    pub fn columns(&self) -> Vec<&ColumnRef> {
        match self {
            Predicate::Compare { column, .. }
            | Predicate::Like { column, .. }
            | Predicate::In { column, .. }
            | Predicate::IsNull { column, .. } => vec![column],
            Predicate::Raw { .. } => Vec::new(),
            Predicate::And(parts) | Predicate::Or(parts) => {
                parts.iter().flat_map(Predicate::columns).collect()
            }
        }
    }
}

/// Entry point for building column predicates.
pub struct Expr;

impl Expr {
    pub fn col(reference: &str) -> ColumnExpr {
        ColumnExpr(ColumnRef::parse(reference))
    }
}

/// A column awaiting a comparison.
#[derive(Debug, Clone)]
pub struct ColumnExpr(ColumnRef);

impl ColumnExpr {
    fn compare(self, op: CompareOp, value: impl Into<Value>) -> Predicate {
        Predicate::Compare {
            column: self.0,
            op,
            value: value.into(),
        }
    }

    pub fn eq(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Eq, value)
    }

    pub fn ne(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Ne, value)
    }

    pub fn gt(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Gt, value)
    }

    pub fn ge(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Ge, value)
    }

    pub fn lt(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Lt, value)
    }

    pub fn le(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Le, value)
    }

    pub fn like(self, pattern: impl Into<String>) -> Predicate {
        Predicate::Like {
            column: self.0,
            pattern: pattern.into(),
            negated: false,
        }
    }

    pub fn not_like(self, pattern: impl Into<String>) -> Predicate {
        Predicate::Like {
            column: self.0,
            pattern: pattern.into(),
            negated: true,
        }
    }

    pub fn is_in<I, V>(self, values: I) -> Predicate
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::In {
            column: self.0,
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in<I, V>(self, values: I) -> Predicate
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::In {
            column: self.0,
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn is_null(self) -> Predicate {
        Predicate::IsNull {
            column: self.0,
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Predicate {
        Predicate::IsNull {
            column: self.0,
            negated: true,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }

    pub const fn reverse(self) -> Self {
        match self {
            Direction::Asc => Direction::Desc,
            Direction::Desc => Direction::Asc,
        }
    }
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTerm {
    pub column: ColumnRef,
    pub direction: Direction,
}

impl OrderTerm {
    pub fn new(column: impl Into<ColumnRef>, direction: Direction) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }

    pub fn asc(column: impl Into<ColumnRef>) -> Self {
        Self::new(column, Direction::Asc)
    }

    pub fn desc(column: impl Into<ColumnRef>) -> Self {
        Self::new(column, Direction::Desc)
    }
}

//! Core types and traits for rowmodel.
//!
//! `rowmodel-core` is the **contract layer** of the workspace. It defines the data
//! types and traits every other crate builds on.
//!
//! # Role In The Architecture
//!
//! - **Contract layer**: `Model` is implemented by user record types, `Executor` and
//!   `Connection` by storage drivers and sessions.
//! - **Data model**: `Row`, `Value` and `SqlType` carry query inputs and outputs.
//! - **Static metadata**: `FieldInfo`, `RelationshipInfo`, `Rule` and `Scope` are
//!   declared once per model type and resolved by name at runtime.
//!
//! # Who Uses This Crate
//!
//! - `rowmodel-query` compiles `Model` metadata and `Value`s into SQL and maps rows
//!   back into records.
//! - `rowmodel-schema` turns `FieldInfo` into DDL.
//! - `rowmodel-session` drives `Connection` for unit-of-work flows.
//! - `rowmodel-sqlite` implements `Connection` on top of SQLite.

pub mod connection;
pub mod error;
pub mod expr;
pub mod field;
pub mod identifiers;
pub mod model;
pub mod relationship;
pub mod row;
pub mod spec;
pub mod types;
pub mod validate;
pub mod value;

pub use connection::{Connection, Executor, ScopeOutcome, ScopeTicket};
pub use error::{Clause, Error, QueryError, RecordInvalid, Result};
pub use expr::{ColumnExpr, ColumnRef, CompareOp, Direction, Expr, OrderTerm, Predicate};
pub use field::FieldInfo;
pub use identifiers::{humanize, quote_ident};
pub use model::{Model, Scope};
pub use relationship::{
    RelationshipInfo, RelationshipKind, ThroughChain, find_relationship, resolve_through,
    validate_relationships,
};
pub use row::Row;
pub use spec::{Join, LoadOrigin, QuerySpec};
pub use types::SqlType;
pub use validate::{BASE, Errors, Rule, RuleCheck, RuleTarget, matches_pattern, run_rules};
pub use value::{FromValue, Value};

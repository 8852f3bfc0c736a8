//! rowmodel: typed records and composable queries over SQLite.
//!
//! This crate is the single import surface for the workspace:
//!
//! - `rowmodel-core`: values, rows, model metadata, validation rules, errors
//! - `rowmodel-query`: [`Query`], [`Record`], associations, eager loading
//! - `rowmodel-session`: [`Session`], transactions, N+1 detection
//! - `rowmodel-schema`: [`SchemaBuilder`] for `CREATE TABLE` statements
//! - `rowmodel-sqlite` (feature `sqlite`, on by default): the SQLite driver
//!
//! # Declaring a model
//!
//! ```ignore
//! use rowmodel::prelude::*;
//!
//! #[derive(Debug, Clone, Default)]
//! struct Post {
//!     name: Option<String>,
//!     user_id: Option<i64>,
//! }
//!
//! impl Model for Post {
//!     const TABLE_NAME: &'static str = "posts";
//!
//!     fn fields() -> &'static [FieldInfo] {
//!         static FIELDS: &[FieldInfo] = &[
//!             FieldInfo::id(),
//!             FieldInfo::new("name", SqlType::String).nullable(true),
//!             FieldInfo::new("user_id", SqlType::Integer).nullable(true),
//!         ];
//!         FIELDS
//!     }
//!
//!     fn relationships() -> &'static [RelationshipInfo] {
//!         static RELATIONSHIPS: &[RelationshipInfo] =
//!             &[RelationshipInfo::to_one::<User>("user", "user_id")];
//!         RELATIONSHIPS
//!     }
//!
//!     fn validations() -> &'static [Rule<Self>] {
//!         static RULES: &[Rule<Post>] = &[Rule::presence("name")];
//!         RULES
//!     }
//!
//!     fn to_row(&self) -> Vec<(&'static str, Value)> {
//!         vec![("name", self.name.clone().into()), ("user_id", self.user_id.into())]
//!     }
//!
//!     fn from_row(row: &Row) -> Result<Self> {
//!         Ok(Self { name: row.decode("name")?, user_id: row.decode("user_id")? })
//!     }
//! }
//! ```
//!
//! # Using it
//!
//! ```ignore
//! let conn = SqliteConnection::open_memory()?;
//! SchemaBuilder::new().create_table::<User>().create_table::<Post>().apply(&conn)?;
//! let mut session = Session::new(conn);
//!
//! let mut user = Record::new(User::named("ann"));
//! user.build("posts", Post::named("hello"))?;
//! session.save_strict(&mut user)?;
//!
//! let latest = session
//!     .query::<Post>()
//!     .order("id", Direction::Desc)
//!     .limit(5)
//!     .includes("user")
//!     .all(&session)?;
//! ```

pub mod session;

pub use rowmodel_core::{
    Clause, ColumnRef, Connection, Direction, Error, Errors, Executor, Expr, FieldInfo, FromValue,
    Join, Model, OrderTerm, Predicate, QueryError, QuerySpec, RecordInvalid, RelationshipInfo,
    RelationshipKind, Result, Row, Rule, RuleCheck, RuleTarget, Scope, SqlType, Value,
    validate_relationships,
};
pub use rowmodel_query::{
    DeleteBuilder, InsertBuilder, Query, Record, RecordState, UpdateBuilder, persist,
};
pub use rowmodel_schema::SchemaBuilder;
pub use session::{Propagation, Session, SessionConfig, SharedSession, TransactionState};

#[cfg(feature = "sqlite")]
pub use rowmodel_sqlite::{
    ConnectionStats, JournalMode, SqliteConfig, SqliteConnection, SqliteTarget,
};

/// Low-level building blocks, for drivers and tooling.
pub mod core {
    pub use rowmodel_core::*;
}

/// Everything needed to declare models and run queries.
pub mod prelude {
    pub use crate::{
        Connection, Direction, Error, Errors, Executor, Expr, FieldInfo, Model, OrderTerm, Predicate,
        Propagation, Query, QuerySpec, Record, RecordState, RelationshipInfo, Result, Row, Rule,
        SchemaBuilder, Scope, Session, SessionConfig, SharedSession, SqlType, TransactionState,
        Value,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::{SqliteConfig, SqliteConnection};
}

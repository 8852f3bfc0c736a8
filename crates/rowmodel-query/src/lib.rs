//! Query building, row mapping and associations for rowmodel.
//!
//! `rowmodel-query` sits between the metadata declared in `rowmodel-core` and
//! a live [`Executor`](rowmodel_core::Executor).
//!
//! # Pieces
//!
//! - [`Query`] is an immutable, composable description of a SELECT. Every
//!   builder call returns a new value; terminals (`all`, `first`, `count`, ...)
//!   compile it to SQL with numbered placeholders and run it.
//! - [`Record`] wraps a model with its key, lifecycle state, validation errors,
//!   built children and eager-loaded association rows.
//! - [`compile`] renders [`QuerySpec`](rowmodel_core::QuerySpec)s; the
//!   [`builder`] module renders single-record writes.
//! - [`persist`] validates and writes record trees without opening a
//!   transaction; sessions add that.
//!
//! # Example
//!
//! ```ignore
//! let recent = Query::<Post>::new()
//!     .scope("with_caption_including", &["rust".into()])
//!     .order("id", Direction::Desc)
//!     .limit(5)
//!     .includes("user")
//!     .all(&conn)?;
//! ```

mod association;
pub mod builder;
pub mod compile;
pub mod persist;
pub mod record;
mod select;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::{DeleteBuilder, InsertBuilder, UpdateBuilder};
pub use compile::{Compiled, Projection, TableRef};
pub use persist::{destroy, persist_tree, save, save_strict};
pub use record::{Record, RecordState};
pub use select::Query;

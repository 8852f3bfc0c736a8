//! Schema definition for rowmodel.
//!
//! Table definitions are derived once from each model's [`FieldInfo`] list
//! and rendered as SQLite DDL. Nothing here inspects a live database; the
//! declared metadata is trusted as is.
//!
//! ```ignore
//! let stmts = SchemaBuilder::new()
//!     .create_table::<User>()
//!     .create_table::<Post>()
//!     .build();
//! for stmt in stmts {
//!     conn.batch(&stmt)?;
//! }
//! ```
//!
//! [`FieldInfo`]: rowmodel_core::FieldInfo

pub mod ddl;

pub use ddl::{ColumnDef, SchemaOperation, SqliteDdlGenerator, TableDef};

use rowmodel_core::{Connection, Model, Result};

/// Collects schema operations and renders them in order.
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    operations: Vec<SchemaOperation>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `CREATE TABLE IF NOT EXISTS` for `M`, plus foreign key indexes.
    pub fn create_table<M: Model>(mut self) -> Self {
        self.operations
            .push(SchemaOperation::CreateTable(TableDef::of::<M>()));
        self
    }

    /// `DROP TABLE IF EXISTS` for `M`.
    pub fn drop_table<M: Model>(mut self) -> Self {
        self.operations
            .push(SchemaOperation::DropTable(M::TABLE_NAME.to_string()));
        self
    }

    /// Add a (unique) index over columns of `M`.
    pub fn create_index<M: Model>(mut self, name: &str, columns: &[&str], unique: bool) -> Self {
        self.operations.push(SchemaOperation::CreateIndex {
            table: M::TABLE_NAME.to_string(),
            name: name.to_string(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            unique,
        });
        self
    }

    pub fn operations(&self) -> &[SchemaOperation] {
        &self.operations
    }

    /// Render every operation as SQL statements.
    pub fn build(&self) -> Vec<String> {
        let generator = SqliteDdlGenerator;
        self.operations
            .iter()
            .flat_map(|op| generator.generate(op))
            .collect()
    }

    /// Run the statements on `conn`, stopping at the first failure.
    pub fn apply<C: Connection + ?Sized>(&self, conn: &C) -> Result<()> {
        let stmts = self.build();
        tracing::info!(statements = stmts.len(), "applying schema");
        for stmt in &stmts {
            conn.batch(stmt)?;
        }
        Ok(())
    }
}

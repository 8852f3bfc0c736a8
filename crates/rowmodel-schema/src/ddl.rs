//! SQLite DDL generation.
//!
//! Key columns declared auto-increment become `INTEGER PRIMARY KEY
//! AUTOINCREMENT` so SQLite hands out monotonically increasing ids that are
//! never reused after a delete.

use rowmodel_core::{FieldInfo, Model, SqlType, quote_ident};
use serde::Serialize;

/// Column definition derived from [`FieldInfo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    /// `(table, column)` this column references.
    pub references: Option<(String, String)>,
}

impl From<&FieldInfo> for ColumnDef {
    fn from(field: &FieldInfo) -> Self {
        Self {
            name: field.name.to_string(),
            sql_type: field.sql_type,
            nullable: field.nullable,
            primary_key: field.primary_key,
            auto_increment: field.auto_increment,
            references: field
                .foreign_key_parts()
                .map(|(table, column)| (table.to_string(), column.to_string())),
        }
    }
}

/// Table definition derived from a [`Model`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn of<M: Model>() -> Self {
        Self {
            name: M::TABLE_NAME.to_string(),
            columns: M::fields().iter().map(ColumnDef::from).collect(),
        }
    }

    /// Columns that reference another table.
    pub fn foreign_key_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.references.is_some())
    }
}

/// A single schema change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SchemaOperation {
    /// Create a table plus an index for every foreign key column.
    CreateTable(TableDef),
    DropTable(String),
    CreateIndex {
        table: String,
        name: String,
        columns: Vec<String>,
        unique: bool,
    },
}

/// DDL generator for SQLite.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDdlGenerator;

impl SqliteDdlGenerator {
    pub fn dialect(&self) -> &'static str {
        "sqlite"
    }

    /// Render one operation as one or more statements.
    pub fn generate(&self, op: &SchemaOperation) -> Vec<String> {
        tracing::debug!(dialect = self.dialect(), op = ?op, "Generating DDL");

        match op {
            SchemaOperation::CreateTable(table) => {
                let mut stmts = vec![generate_create_table(table)];
                for column in table.foreign_key_columns() {
                    let name = format!("idx_{}_{}", table.name, column.name);
                    stmts.push(generate_create_index(
                        &table.name,
                        &name,
                        std::slice::from_ref(&column.name),
                        false,
                    ));
                }
                stmts
            }
            SchemaOperation::DropTable(name) => {
                vec![format!("DROP TABLE IF EXISTS {}", quote_ident(name))]
            }
            SchemaOperation::CreateIndex {
                table,
                name,
                columns,
                unique,
            } => vec![generate_create_index(table, name, columns, *unique)],
        }
    }
}

fn column_sql(column: &ColumnDef) -> String {
    let mut sql = format!("{} {}", quote_ident(&column.name), column.sql_type.sql_name());
    if column.primary_key {
        sql.push_str(" PRIMARY KEY");
        if column.auto_increment {
            sql.push_str(" AUTOINCREMENT");
        }
    } else if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    if let Some((table, target)) = &column.references {
        sql.push_str(&format!(
            " REFERENCES {}({})",
            quote_ident(table),
            quote_ident(target)
        ));
    }
    sql
}

fn generate_create_table(table: &TableDef) -> String {
    let columns: Vec<String> = table.columns.iter().map(column_sql).collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(&table.name),
        columns.join(", ")
    )
}

fn generate_create_index(table: &str, name: &str, columns: &[String], unique: bool) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {}({})",
        if unique { "UNIQUE " } else { "" },
        quote_ident(name),
        quote_ident(table),
        cols.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, sql_type: SqlType, nullable: bool) -> ColumnDef {
        ColumnDef {
            name: name.to_string(),
            sql_type,
            nullable,
            primary_key: false,
            auto_increment: false,
            references: None,
        }
    }

    fn heroes() -> TableDef {
        TableDef {
            name: "heroes".to_string(),
            columns: vec![
                ColumnDef::from(&FieldInfo::id()),
                column("name", SqlType::String, false),
                column("secret_name", SqlType::Text, true),
            ],
        }
    }

    #[test]
    fn test_create_table() {
        let stmts = SqliteDdlGenerator.generate(&SchemaOperation::CreateTable(heroes()));
        assert_eq!(stmts.len(), 1);
        assert_eq!(
            stmts[0],
            "CREATE TABLE IF NOT EXISTS \"heroes\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \
             \"name\" VARCHAR(255) NOT NULL, \"secret_name\" TEXT)"
        );
    }

    #[test]
    fn test_create_table_indexes_foreign_keys() {
        let mut table = heroes();
        let mut team = column("team_id", SqlType::Integer, true);
        team.references = Some(("teams".to_string(), "id".to_string()));
        table.columns.push(team);

        let stmts = SqliteDdlGenerator.generate(&SchemaOperation::CreateTable(table));
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("\"team_id\" INTEGER REFERENCES \"teams\"(\"id\")"));
        assert_eq!(
            stmts[1],
            "CREATE INDEX IF NOT EXISTS \"idx_heroes_team_id\" ON \"heroes\"(\"team_id\")"
        );
    }

    #[test]
    fn test_drop_table() {
        let stmts = SqliteDdlGenerator.generate(&SchemaOperation::DropTable("heroes".to_string()));
        assert_eq!(stmts, vec!["DROP TABLE IF EXISTS \"heroes\"".to_string()]);
    }

    #[test]
    fn test_unique_index() {
        let op = SchemaOperation::CreateIndex {
            table: "heroes".to_string(),
            name: "uk_heroes_name".to_string(),
            columns: vec!["name".to_string()],
            unique: true,
        };
        let stmts = SqliteDdlGenerator.generate(&op);
        assert_eq!(
            stmts[0],
            "CREATE UNIQUE INDEX IF NOT EXISTS \"uk_heroes_name\" ON \"heroes\"(\"name\")"
        );
    }
}

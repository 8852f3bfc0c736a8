//! Write statement builders for single records.
//!
//! Each builder renders SQL with SQLite-style numbered placeholders and hands
//! it to an [`Executor`]. They never validate; callers go through
//! [`persist`](crate::persist) for that.

use rowmodel_core::{Error, Executor, Model, Result, Value, quote_ident};

use crate::record::Record;

fn placeholder(n: usize) -> String {
    format!("?{n}")
}

/// INSERT builder.
///
/// The primary key column is written only when the record already carries
/// a key; otherwise the database assigns one.
///
/// # Example
///
/// ```ignore
/// let id = InsertBuilder::new(&post).execute(&conn)?;
/// ```
#[derive(Debug)]
pub struct InsertBuilder<'a, M: Model> {
    record: &'a Record<M>,
}

impl<'a, M: Model> InsertBuilder<'a, M> {
    pub fn new(record: &'a Record<M>) -> Self {
        Self { record }
    }

    /// Build the INSERT SQL and parameters.
    pub fn build(&self) -> (String, Vec<Value>) {
        let mut columns = Vec::new();
        let mut values = Vec::new();

        if let Some(id) = self.record.id() {
            columns.push(quote_ident(M::PRIMARY_KEY));
            values.push(Value::BigInt(id));
        }
        for (name, value) in self.record.model().to_row() {
            columns.push(quote_ident(name));
            values.push(value);
        }

        if columns.is_empty() {
            return (
                format!("INSERT INTO {} DEFAULT VALUES", quote_ident(M::TABLE_NAME)),
                values,
            );
        }

        let placeholders: Vec<_> = (1..=values.len()).map(placeholder).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(M::TABLE_NAME),
            columns.join(", "),
            placeholders.join(", ")
        );
        (sql, values)
    }

    /// Execute the INSERT and return the generated key.
    pub fn execute<E: Executor + ?Sized>(self, exec: &E) -> Result<i64> {
        let (sql, params) = self.build();
        exec.insert(&sql, &params)
    }
}

/// UPDATE builder keyed on the record's primary key.
///
/// ```ignore
/// UpdateBuilder::new(&post)?.set_only(&["caption"]).execute(&conn)?;
/// ```
#[derive(Debug)]
pub struct UpdateBuilder<'a, M: Model> {
    record: &'a Record<M>,
    id: i64,
    set_fields: Option<Vec<&'static str>>,
}

impl<'a, M: Model> UpdateBuilder<'a, M> {
    /// Fails with [`Error::InvalidState`] when the record has no key yet.
    pub fn new(record: &'a Record<M>) -> Result<Self> {
        let id = record.id().ok_or_else(|| {
            Error::InvalidState(format!("can not update an unsaved `{}`", M::TABLE_NAME))
        })?;
        Ok(Self {
            record,
            id,
            set_fields: None,
        })
    }

    /// Only update specific columns.
    pub fn set_only(mut self, fields: &[&'static str]) -> Self {
        self.set_fields = Some(fields.to_vec());
        self
    }

    /// Build the UPDATE SQL and parameters. Empty SQL means nothing to update.
    pub fn build(&self) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let mut set_clauses = Vec::new();

        for (name, value) in self.record.model().to_row() {
            if let Some(fields) = &self.set_fields {
                if !fields.contains(&name) {
                    continue;
                }
            }
            params.push(value);
            set_clauses.push(format!("{} = {}", quote_ident(name), placeholder(params.len())));
        }

        if set_clauses.is_empty() {
            return (String::new(), Vec::new());
        }

        params.push(Value::BigInt(self.id));
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            quote_ident(M::TABLE_NAME),
            set_clauses.join(", "),
            quote_ident(M::PRIMARY_KEY),
            placeholder(params.len())
        );
        (sql, params)
    }

    /// Execute the UPDATE and return rows affected.
    pub fn execute<E: Executor + ?Sized>(self, exec: &E) -> Result<u64> {
        let (sql, params) = self.build();
        if sql.is_empty() {
            return Ok(0);
        }
        exec.execute(&sql, &params)
    }
}

/// DELETE builder for one saved record.
#[derive(Debug)]
pub struct DeleteBuilder<M: Model> {
    id: i64,
    _marker: std::marker::PhantomData<fn() -> M>,
}

impl<M: Model> DeleteBuilder<M> {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            _marker: std::marker::PhantomData,
        }
    }

    /// Fails with [`Error::InvalidState`] when the record has no key.
    pub fn from_record(record: &Record<M>) -> Result<Self> {
        record.id().map(Self::new).ok_or_else(|| {
            Error::InvalidState(format!("can not delete an unsaved `{}`", M::TABLE_NAME))
        })
    }

    pub fn build(&self) -> (String, Vec<Value>) {
        (
            format!(
                "DELETE FROM {} WHERE {} = ?1",
                quote_ident(M::TABLE_NAME),
                quote_ident(M::PRIMARY_KEY)
            ),
            vec![Value::BigInt(self.id)],
        )
    }

    /// Execute the DELETE and return rows affected.
    pub fn execute<E: Executor + ?Sized>(self, exec: &E) -> Result<u64> {
        let (sql, params) = self.build();
        exec.execute(&sql, &params)
    }
}

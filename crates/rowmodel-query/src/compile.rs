//! SQL generation for read statements.
//!
//! Every value reaches the database as a positional parameter (`?1`, `?2`,
//! ...). Column references are checked against model metadata before any SQL
//! is produced, so a typo fails with a [`QueryError`] naming the clause instead
//! of silently matching nothing.

use rowmodel_core::{
    Clause, ColumnRef, CompareOp, FieldInfo, Join, Model, OrderTerm, Predicate, QueryError,
    QuerySpec, RelationshipInfo, Value, find_relationship, quote_ident,
};

/// Static description of the table a statement reads from.
#[derive(Debug, Clone, Copy)]
pub struct TableRef {
    pub name: &'static str,
    pub primary_key: &'static str,
    pub fields: fn() -> &'static [FieldInfo],
    pub relationships: fn() -> &'static [RelationshipInfo],
}

impl TableRef {
    pub fn of<M: Model>() -> Self {
        Self {
            name: M::TABLE_NAME,
            primary_key: M::PRIMARY_KEY,
            fields: M::fields,
            relationships: M::relationships,
        }
    }

    /// The target side of an association.
    pub fn related(info: &RelationshipInfo) -> Self {
        Self {
            name: info.related_table,
            primary_key: info.related_primary_key,
            fields: info.related_fields,
            relationships: info.related_relationships,
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        column == self.primary_key || (self.fields)().iter().any(|f| f.name == column)
    }

    /// `"table"."pk"` as a column reference.
    pub fn key(&self) -> ColumnRef {
        ColumnRef::qualified(self.name, self.primary_key)
    }
}

/// The SELECT list of a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `"table".*`
    Rows,
    /// `"table".*` followed by extra aliased columns.
    RowsWith(Vec<(ColumnRef, String)>),
    /// One column.
    Column(ColumnRef),
}

/// SQL text plus its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Compile a SELECT.
pub fn select(
    table: &TableRef,
    spec: &QuerySpec,
    projection: &Projection,
) -> Result<Compiled, QueryError> {
    let mut writer = SqlWriter::new(*table, &spec.joins);
    let sql = writer.select(spec, projection)?;
    Ok(Compiled {
        sql,
        params: writer.params,
    })
}

/// Compile `SELECT COUNT(*)` over the rows `spec` selects.
pub fn count(table: &TableRef, spec: &QuerySpec) -> Result<Compiled, QueryError> {
    let unordered = unordered(spec);
    let inner = select(table, &unordered, &Projection::Rows)?;
    Ok(Compiled {
        sql: format!("SELECT COUNT(*) FROM ({}) AS \"counted\"", inner.sql),
        params: inner.params,
    })
}

/// Compile `SELECT EXISTS (...)`.
pub fn exists(table: &TableRef, spec: &QuerySpec) -> Result<Compiled, QueryError> {
    let inner = select(table, &unordered(spec), &Projection::Rows)?;
    Ok(Compiled {
        sql: format!("SELECT EXISTS ({})", inner.sql),
        params: inner.params,
    })
}

/// Compile a DELETE of every row `spec` selects.
pub fn delete(table: &TableRef, spec: &QuerySpec) -> Result<Compiled, QueryError> {
    if !spec.includes.is_empty() {
        return Err(QueryError::new(
            Clause::Includes,
            "eager loading cannot be combined with delete_all",
        ));
    }
    let inner = select(table, spec, &Projection::Column(table.key()))?;
    Ok(Compiled {
        sql: format!(
            "DELETE FROM {} WHERE {} IN ({})",
            quote_ident(table.name),
            quote_ident(table.primary_key),
            inner.sql
        ),
        params: inner.params,
    })
}

/// Ordering never changes a count or an existence check, unless a limit or
/// offset picks which rows take part.
fn unordered(spec: &QuerySpec) -> QuerySpec {
    if spec.limit.is_some() || spec.offset.is_some() {
        spec.clone()
    } else {
        spec.reorder([]).default_order([])
    }
}

/// Find a numbered placeholder such as `?1` outside quoted literals.
///
/// Fragments are renumbered when spliced into a statement, so only bare `?`
/// placeholders can be bound.
pub fn numbered_placeholder(sql: &str) -> Option<usize> {
    let mut quote = None;
    let mut chars = sql.char_indices().peekable();
    while let Some((at, ch)) = chars.next() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None => match ch {
                '\'' | '"' => quote = Some(ch),
                '?' if chars.peek().is_some_and(|(_, next)| next.is_ascii_digit()) => {
                    return Some(at);
                }
                _ => {}
            },
        }
    }
    None
}

/// Count `?` placeholders outside quoted literals.
pub fn count_placeholders(sql: &str) -> usize {
    let mut quote = None;
    let mut count = 0;
    for ch in sql.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None => match ch {
                '\'' | '"' => quote = Some(ch),
                '?' => count += 1,
                _ => {}
            },
        }
    }
    count
}

struct SqlWriter<'a> {
    table: TableRef,
    joins: &'a [Join],
    params: Vec<Value>,
}

impl<'a> SqlWriter<'a> {
    fn new(table: TableRef, joins: &'a [Join]) -> Self {
        Self {
            table,
            joins,
            params: Vec::new(),
        }
    }

    fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        format!("?{}", self.params.len())
    }

    fn select(&mut self, spec: &QuerySpec, projection: &Projection) -> Result<String, QueryError> {
        if let Some(rejection) = &spec.rejection {
            return Err(rejection.clone());
        }
        for name in &spec.includes {
            if find_relationship((self.table.relationships)(), name).is_none() {
                return Err(QueryError::new(
                    Clause::Includes,
                    format!("unknown association `{name}` on `{}`", self.table.name),
                ));
            }
        }

        let table = quote_ident(self.table.name);
        let list = match projection {
            Projection::Rows => format!("{table}.*"),
            Projection::RowsWith(extra) => {
                let mut parts = vec![format!("{table}.*")];
                for (column, alias) in extra {
                    let column = self.column(Clause::Select, column)?;
                    parts.push(format!("{column} AS {}", quote_ident(alias)));
                }
                parts.join(", ")
            }
            Projection::Column(column) => self.column(Clause::Pluck, column)?,
        };

        let distinct = if spec.distinct { "DISTINCT " } else { "" };
        let mut sql = format!("SELECT {distinct}{list} FROM {table}");

        for join in self.joins {
            let left = self.column(Clause::Join, &join.left)?;
            let right = self.column(Clause::Join, &join.right)?;
            sql.push_str(&format!(
                " INNER JOIN {} ON {left} = {right}",
                quote_ident(&join.table)
            ));
        }

        if !spec.filters.is_empty() {
            let parts = spec
                .filters
                .iter()
                .map(|p| self.predicate(p))
                .collect::<Result<Vec<_>, _>>()?;
            sql.push_str(" WHERE ");
            sql.push_str(&parts.join(" AND "));
        }

        let order = spec.effective_order();
        if !order.is_empty() {
            let terms = order
                .iter()
                .map(|t| self.order_term(t))
                .collect::<Result<Vec<_>, _>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        match (spec.limit, spec.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            // SQLite only accepts OFFSET after a LIMIT.
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        Ok(sql)
    }

    fn column(&self, clause: Clause, column: &ColumnRef) -> Result<String, QueryError> {
        let qualified = |table: &str| format!("{}.{}", quote_ident(table), quote_ident(&column.name));
        match column.table.as_deref() {
            None => self.own_column(clause, column).map(|()| qualified(self.table.name)),
            Some(table) if table == self.table.name => {
                self.own_column(clause, column).map(|()| qualified(table))
            }
            Some(table) if self.joins.iter().any(|j| j.table == table) => Ok(qualified(table)),
            Some(table) => Err(QueryError::new(
                clause,
                format!("column `{column}` refers to `{table}`, which is not part of the query"),
            )),
        }
    }

    fn own_column(&self, clause: Clause, column: &ColumnRef) -> Result<(), QueryError> {
        if self.table.has_column(&column.name) {
            Ok(())
        } else {
            Err(QueryError::unknown_column(
                clause,
                self.table.name,
                &column.name,
            ))
        }
    }

    fn order_term(&self, term: &OrderTerm) -> Result<String, QueryError> {
        let column = self.column(Clause::Order, &term.column)?;
        Ok(format!("{column} {}", term.direction.as_sql()))
    }

    fn predicate(&mut self, predicate: &Predicate) -> Result<String, QueryError> {
        match predicate {
            Predicate::Compare { column, op, value } => {
                let col = self.column(Clause::Where, column)?;
                if value.is_null() {
                    return match op {
                        CompareOp::Eq => Ok(format!("{col} IS NULL")),
                        CompareOp::Ne => Ok(format!("{col} IS NOT NULL")),
                        _ => Err(QueryError::new(
                            Clause::Where,
                            format!("cannot compare `{column}` with NULL using `{}`", op.as_sql()),
                        )),
                    };
                }
                let placeholder = self.bind(value.clone());
                Ok(format!("{col} {} {placeholder}", op.as_sql()))
            }
            Predicate::Like {
                column,
                pattern,
                negated,
            } => {
                let col = self.column(Clause::Where, column)?;
                let placeholder = self.bind(Value::Text(pattern.clone()));
                let not = if *negated { "NOT " } else { "" };
                Ok(format!("{col} {not}LIKE {placeholder}"))
            }
            Predicate::In {
                column,
                values,
                negated,
            } => {
                let col = self.column(Clause::Where, column)?;
                if values.is_empty() {
                    return Ok(if *negated { "1 = 1" } else { "0 = 1" }.to_string());
                }
                let placeholders: Vec<_> = values.iter().map(|v| self.bind(v.clone())).collect();
                let not = if *negated { "NOT " } else { "" };
                Ok(format!("{col} {not}IN ({})", placeholders.join(", ")))
            }
            Predicate::IsNull { column, negated } => {
                let col = self.column(Clause::Where, column)?;
                let not = if *negated { "NOT " } else { "" };
                Ok(format!("{col} IS {not}NULL"))
            }
            Predicate::Raw { sql, params } => self.raw(sql, params),
            Predicate::And(parts) => self.group(parts, " AND ", "1 = 1"),
            Predicate::Or(parts) => self.group(parts, " OR ", "0 = 1"),
        }
    }

    fn group(&mut self, parts: &[Predicate], joiner: &str, empty: &str) -> Result<String, QueryError> {
        if parts.is_empty() {
            return Ok(empty.to_string());
        }
        let compiled = parts
            .iter()
            .map(|p| self.predicate(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!("({})", compiled.join(joiner)))
    }

    fn raw(&mut self, sql: &str, params: &[Value]) -> Result<String, QueryError> {
        if let Some(at) = numbered_placeholder(sql) {
            return Err(QueryError::new(
                Clause::Where,
                format!("`{sql}` uses a numbered placeholder at byte {at}; use `?` instead"),
            ));
        }
        let expected = count_placeholders(sql);
        if expected != params.len() {
            return Err(QueryError::new(
                Clause::Where,
                format!(
                    "`{sql}` has {expected} placeholder(s) but {} parameter(s) were given",
                    params.len()
                ),
            ));
        }

        let mut out = String::with_capacity(sql.len() + params.len() * 2);
        let mut quote = None;
        let mut next = params.iter();
        for ch in sql.chars() {
            match quote {
                Some(q) => {
                    if ch == q {
                        quote = None;
                    }
                    out.push(ch);
                }
                None => match ch {
                    '\'' | '"' => {
                        quote = Some(ch);
                        out.push(ch);
                    }
                    '?' => {
                        let value = next.next().cloned().unwrap_or_default();
                        out.push_str(&self.bind(value));
                    }
                    _ => out.push(ch),
                },
            }
        }
        Ok(format!("({out})"))
    }
}

//! The immutable, typed query builder.

use std::marker::PhantomData;

use rowmodel_core::{
    Clause, ColumnRef, Direction, Error, Executor, FromValue, Join, Model, OrderTerm, Predicate,
    QueryError, QuerySpec, Result, Row, Value,
};

use crate::association;
use crate::compile::{self, Compiled, Projection, TableRef};
use crate::record::Record;

/// A query over the rows of `M`.
///
/// Every builder method borrows `self` and returns a new query, so a query can
/// be shared and extended in several directions:
///
/// ```
/// use rowmodel_core::{Direction, Expr};
/// # use rowmodel_core::{FieldInfo, Model, Row, SqlType, Value};
/// # #[derive(Debug, Clone)]
/// # struct Post;
/// # impl Model for Post {
/// #     const TABLE_NAME: &'static str = "posts";
/// #     fn fields() -> &'static [FieldInfo] {
/// #         static F: &[FieldInfo] = &[FieldInfo::id(), FieldInfo::new("caption", SqlType::String)];
/// #         F
/// #     }
/// #     fn to_row(&self) -> Vec<(&'static str, Value)> { Vec::new() }
/// #     fn from_row(_: &Row) -> rowmodel_core::Result<Self> { Ok(Post) }
/// # }
/// use rowmodel_query::Query;
///
/// let captioned = Query::<Post>::new().filter(Expr::col("caption").like("%2%"));
/// let newest = captioned.order("id", Direction::Desc).limit(5);
/// let page_two = captioned.offset(5).limit(5);
///
/// assert_eq!(captioned.spec().limit, None);
/// assert_eq!(newest.spec().limit, Some(5));
/// assert_eq!(page_two.spec().offset, Some(5));
/// ```
#[derive(Debug)]
pub struct Query<M: Model> {
    spec: QuerySpec,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model> Clone for Query<M> {
    fn clone(&self) -> Self {
        Self::from_spec(self.spec.clone())
    }
}

impl<M: Model> Default for Query<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> Query<M> {
    /// All rows, ordered by primary key unless ordered explicitly.
    pub fn new() -> Self {
        Self::from_spec(QuerySpec::new().default_order([OrderTerm::asc(TableRef::of::<M>().key())]))
    }

    /// A query that matches no rows.
    pub fn none() -> Self {
        Self::new().filter(Predicate::never())
    }

    pub fn from_spec(spec: QuerySpec) -> Self {
        Self {
            spec,
            _marker: PhantomData,
        }
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn into_spec(self) -> QuerySpec {
        self.spec
    }

    fn with(&self, spec: QuerySpec) -> Self {
        Self::from_spec(spec)
    }

    // ------------------------------------------------------------------
    // Composition
    // ------------------------------------------------------------------

    /// AND a predicate onto the query.
    pub fn filter(&self, predicate: Predicate) -> Self {
        self.with(self.spec.filter(predicate))
    }

    /// AND a raw SQL condition with `?` placeholders.
    pub fn filter_sql<I, V>(&self, sql: &str, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.filter(Predicate::raw(sql, params))
    }

    /// Order by `column`. Ordering the same column again replaces its direction.
    pub fn order(&self, column: &str, direction: Direction) -> Self {
        self.with(self.spec.order(OrderTerm::new(column, direction)))
    }

    /// Replace any explicit ordering.
    pub fn reorder(&self, terms: impl IntoIterator<Item = OrderTerm>) -> Self {
        self.with(self.spec.reorder(terms))
    }

    pub fn limit(&self, n: u64) -> Self {
        self.with(self.spec.limit(n))
    }

    pub fn offset(&self, n: u64) -> Self {
        self.with(self.spec.offset(n))
    }

    /// Eager load an association for every row this query returns.
    pub fn includes(&self, association: &str) -> Self {
        self.with(self.spec.include(association))
    }

    pub fn distinct(&self, distinct: bool) -> Self {
        self.with(self.spec.distinct(distinct))
    }

    pub fn join(&self, join: Join) -> Self {
        self.with(self.spec.join(join))
    }

    /// Apply a named scope registered in [`Model::scopes`].
    ///
    /// An unknown name or a wrong number of arguments is reported as a
    /// [`QueryError`] on the `scope` clause when the query runs.
    pub fn scope(&self, name: &str, args: &[Value]) -> Self {
        let Some(scope) = M::scopes().iter().find(|s| s.name == name) else {
            return self.reject(QueryError::new(
                Clause::Scope,
                format!("unknown scope `{name}` on `{}`", M::TABLE_NAME),
            ));
        };
        if scope.arity != args.len() {
            return self.reject(QueryError::new(
                Clause::Scope,
                format!(
                    "scope `{name}` takes {} argument(s), got {}",
                    scope.arity,
                    args.len()
                ),
            ));
        }
        match (scope.build)(args) {
            Ok(fragment) => self.with(self.spec.merge(&fragment)),
            Err(Error::Query(err)) => self.reject(err),
            Err(other) => self.reject(QueryError::new(Clause::Scope, other.to_string())),
        }
    }

    /// Combine with another query on the same model.
    pub fn merge(&self, other: &Query<M>) -> Self {
        self.with(self.spec.merge(&other.spec))
    }

    fn reject(&self, error: QueryError) -> Self {
        self.with(self.spec.reject(error))
    }

    // ------------------------------------------------------------------
    // SQL
    // ------------------------------------------------------------------

    /// The SELECT this query runs.
    pub fn to_sql(&self) -> Result<(String, Vec<Value>)> {
        let compiled = self.compile(&Projection::Rows)?;
        Ok((compiled.sql, compiled.params))
    }

    fn compile(&self, projection: &Projection) -> Result<Compiled> {
        Ok(compile::select(&TableRef::of::<M>(), &self.spec, projection)?)
    }

    fn fetch<E: Executor + ?Sized>(&self, exec: &E, compiled: &Compiled) -> Result<Vec<Row>> {
        if let Some(origin) = self.spec.origin {
            exec.on_lazy_load(origin);
        }
        exec.query(&compiled.sql, &compiled.params)
    }

    // ------------------------------------------------------------------
    // Terminals
    // ------------------------------------------------------------------

    /// Every matching record, with included associations preloaded.
    pub fn all<E: Executor + ?Sized>(&self, exec: &E) -> Result<Vec<Record<M>>> {
        let compiled = self.compile(&Projection::Rows)?;
        let rows = self.fetch(exec, &compiled)?;
        let mut records = rows
            .iter()
            .map(Record::from_row)
            .collect::<Result<Vec<_>>>()?;
        for name in &self.spec.includes {
            association::preload(exec, &mut records, name)?;
        }
        Ok(records)
    }

    /// The first record in query order.
    pub fn first<E: Executor + ?Sized>(&self, exec: &E) -> Result<Option<Record<M>>> {
        Ok(self.limit(1).all(exec)?.into_iter().next())
    }

    /// The last record in query order.
    pub fn last<E: Executor + ?Sized>(&self, exec: &E) -> Result<Option<Record<M>>> {
        let reversed: Vec<_> = self
            .spec
            .effective_order()
            .iter()
            .map(|t| OrderTerm::new(t.column.clone(), t.direction.reverse()))
            .collect();
        self.reorder(reversed).first(exec)
    }

    /// Up to `n` records in query order.
    pub fn take<E: Executor + ?Sized>(&self, exec: &E, n: u64) -> Result<Vec<Record<M>>> {
        self.limit(n).all(exec)
    }

    /// The record with key `id` among the rows this query selects.
    pub fn find<E: Executor + ?Sized>(&self, exec: &E, id: i64) -> Result<Record<M>> {
        let key = TableRef::of::<M>().key();
        self.filter(Predicate::Compare {
            column: key,
            op: rowmodel_core::CompareOp::Eq,
            value: Value::BigInt(id),
        })
        .first(exec)?
        .ok_or(Error::NotFound {
            table: M::TABLE_NAME,
            id,
        })
    }

    pub fn exists<E: Executor + ?Sized>(&self, exec: &E) -> Result<bool> {
        let compiled = compile::exists(&TableRef::of::<M>(), &self.spec)?;
        let row = exec.query_one(&compiled.sql, &compiled.params)?;
        let found: Option<i64> = match row.as_ref().and_then(|r| r.get(0)) {
            Some(value) => FromValue::from_value(value, "exists")?,
            None => None,
        };
        Ok(found.unwrap_or(0) != 0)
    }

    pub fn count<E: Executor + ?Sized>(&self, exec: &E) -> Result<u64> {
        let compiled = compile::count(&TableRef::of::<M>(), &self.spec)?;
        let row = exec.query_one(&compiled.sql, &compiled.params)?;
        let count: i64 = match row.as_ref().and_then(|r| r.get(0)) {
            Some(value) => FromValue::from_value(value, "count")?,
            None => 0,
        };
        Ok(count.max(0) as u64)
    }

    /// One column of every matching row.
    pub fn pluck<T: FromValue, E: Executor + ?Sized>(&self, exec: &E, column: &str) -> Result<Vec<T>> {
        let compiled = self.compile(&Projection::Column(ColumnRef::parse(column)))?;
        let rows = self.fetch(exec, &compiled)?;
        rows.iter()
            .map(|row| T::from_value(row.get(0).unwrap_or(&Value::Null), column))
            .collect()
    }

    /// Primary keys of every matching row.
    pub fn ids<E: Executor + ?Sized>(&self, exec: &E) -> Result<Vec<i64>> {
        self.pluck(exec, M::PRIMARY_KEY)
    }

    /// Delete every matching row and return how many were removed.
    pub fn delete_all<E: Executor + ?Sized>(&self, exec: &E) -> Result<u64> {
        let compiled = compile::delete(&TableRef::of::<M>(), &self.spec)?;
        let affected = exec.execute(&compiled.sql, &compiled.params)?;
        tracing::info!(table = M::TABLE_NAME, affected, "deleted rows");
        Ok(affected)
    }
}

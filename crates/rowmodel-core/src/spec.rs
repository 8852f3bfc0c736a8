//! Immutable query specifications.
//!
//! A [`QuerySpec`] describes *what* to fetch: filters, joins, ordering,
//! pagination and eager-load directives. Every method takes `&self` and returns
//! a new specification, so a spec shared by two chains is never affected by
//! either of them.

use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::expr::{ColumnRef, OrderTerm, Predicate};

/// `INNER JOIN table ON left = right`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    pub table: String,
    pub left: ColumnRef,
    pub right: ColumnRef,
}

impl Join {
    pub fn inner(table: impl Into<String>, left: ColumnRef, right: ColumnRef) -> Self {
        Self {
            table: table.into(),
            left,
            right,
        }
    }
}

/// Where a query came from when it was produced by an association accessor.
///
/// Used by the session to count lazy loads per `(owner table, association)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOrigin {
    pub owner: &'static str,
    pub relation: &'static str,
}

/// An immutable description of a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuerySpec {
    /// Conjunctive filters.
    pub filters: Vec<Predicate>,
    /// Inner joins, in declaration order.
    pub joins: Vec<Join>,
    /// Explicit ordering. Empty means "use `default_order`".
    pub orders: Vec<OrderTerm>,
    /// Ordering applied when no explicit order was requested.
    pub default_order: Vec<OrderTerm>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Association names to eager load.
    pub includes: Vec<String>,
    /// Whether to select distinct rows.
    pub distinct: bool,
    /// First error raised while composing; reported when the query runs.
    #[serde(skip)]
    pub rejection: Option<QueryError>,
    #[serde(skip)]
    pub origin: Option<LoadOrigin>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// AND another predicate onto the filters.
    pub fn filter(&self, predicate: Predicate) -> Self {
        let mut next = self.clone();
        next.filters.push(predicate);
        next
    }

    /// Order by `term`. A later term for the same column replaces the earlier one.
    pub fn order(&self, term: OrderTerm) -> Self {
        let mut next = self.clone();
        next.push_order(term);
        next
    }

    fn push_order(&mut self, term: OrderTerm) {
        match self.orders.iter_mut().find(|t| t.column == term.column) {
            Some(existing) => existing.direction = term.direction,
            None => self.orders.push(term),
        }
    }

    /// Drop any explicit ordering and order by `terms` only.
    pub fn reorder(&self, terms: impl IntoIterator<Item = OrderTerm>) -> Self {
        let mut next = self.clone();
        next.orders.clear();
        for term in terms {
            next.push_order(term);
        }
        next
    }

    pub fn default_order(&self, terms: impl IntoIterator<Item = OrderTerm>) -> Self {
        let mut next = self.clone();
        next.default_order = terms.into_iter().collect();
        next
    }

    pub fn limit(&self, n: u64) -> Self {
        let mut next = self.clone();
        next.limit = Some(n);
        next
    }

    pub fn offset(&self, n: u64) -> Self {
        let mut next = self.clone();
        next.offset = Some(n);
        next
    }

    pub fn include(&self, association: &str) -> Self {
        let mut next = self.clone();
        if !next.includes.iter().any(|name| name == association) {
            next.includes.push(association.to_string());
        }
        next
    }

    pub fn join(&self, join: Join) -> Self {
        let mut next = self.clone();
        if !next.joins.contains(&join) {
            next.joins.push(join);
        }
        next
    }

    pub fn distinct(&self, distinct: bool) -> Self {
        let mut next = self.clone();
        next.distinct = distinct;
        next
    }

    /// Record a composition error. Only the first one is kept.
    pub fn reject(&self, error: QueryError) -> Self {
        let mut next = self.clone();
        if next.rejection.is_none() {
            next.rejection = Some(error);
        }
        next
    }

    pub fn with_origin(&self, origin: LoadOrigin) -> Self {
        let mut next = self.clone();
        next.origin = Some(origin);
        next
    }

    /// Ordering that will actually be emitted.
    pub fn effective_order(&self) -> &[OrderTerm] {
        if self.orders.is_empty() {
            &self.default_order
        } else {
            &self.orders
        }
    }

    /// Compose two specifications.
    ///
    /// Filters are ANDed, joins and includes are unioned, `other`'s ordering
    /// terms override `self`'s per column, and `other`'s pagination wins where
    /// it is set. Neither input is modified.
    pub fn merge(&self, other: &QuerySpec) -> Self {
        let mut next = self.clone();
        next.filters.extend(other.filters.iter().cloned());
        for join in &other.joins {
            if !next.joins.contains(join) {
                next.joins.push(join.clone());
            }
        }
        for term in &other.orders {
            next.push_order(term.clone());
        }
        if next.default_order.is_empty() {
            next.default_order.clone_from(&other.default_order);
        }
        next.limit = other.limit.or(self.limit);
        next.offset = other.offset.or(self.offset);
        for name in &other.includes {
            if !next.includes.contains(name) {
                next.includes.push(name.clone());
            }
        }
        next.distinct = self.distinct || other.distinct;
        if next.rejection.is_none() {
            next.rejection.clone_from(&other.rejection);
        }
        next.origin = self.origin.or(other.origin);
        next
    }
}

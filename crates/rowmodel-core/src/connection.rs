//! Persistence gateway traits.
//!
//! Query execution is blocking: every call suspends the caller until the
//! storage engine returns. Parameters are always bound positionally (`?1`,
//! `?2`, ...); SQL text never contains interpolated values.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::identifiers::quote_ident;
use crate::row::Row;
use crate::spec::LoadOrigin;
use crate::value::Value;

/// Something that can run SQL: a driver connection or a session wrapping one.
pub trait Executor {
    /// Execute a query and return all rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Execute a query and return the first row, if any.
    fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Execute a statement and return the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Execute an INSERT and return the generated row id.
    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64>;

    /// Notified when an association is read lazily. Sessions use this to spot
    /// N+1 access patterns; plain connections ignore it.
    fn on_lazy_load(&self, _origin: LoadOrigin) {}

    /// The innermost open transaction scope, when the executor tracks them.
    /// Writes outside a scope are final and report `None`.
    fn scope_ticket(&self) -> Option<ScopeTicket> {
        None
    }
}

impl<E: Executor + ?Sized> Executor for &E {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        (**self).query(sql, params)
    }

    fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        (**self).query_one(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        (**self).execute(sql, params)
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64> {
        (**self).insert(sql, params)
    }

    fn on_lazy_load(&self, origin: LoadOrigin) {
        (**self).on_lazy_load(origin);
    }

    fn scope_ticket(&self) -> Option<ScopeTicket> {
        (**self).scope_ticket()
    }
}

/// How a transaction scope ended, as far as is known yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeOutcome {
    Open,
    Committed,
    RolledBack,
}

/// A shared handle on the outcome of one transaction scope.
///
/// Records keep the ticket of the scope that gave them their key (or deleted
/// them), so a later rollback of that scope takes the change back. A nested
/// ticket (a savepoint) follows its parent once it is released.
#[derive(Debug, Clone)]
pub struct ScopeTicket {
    inner: Arc<TicketInner>,
}

#[derive(Debug)]
struct TicketInner {
    committed: AtomicBool,
    rolled_back: AtomicBool,
    parent: Option<ScopeTicket>,
}

impl ScopeTicket {
    /// Ticket for an outermost transaction.
    pub fn root() -> Self {
        Self::with_parent(None)
    }

    /// Ticket for a savepoint inside this scope.
    pub fn nested(&self) -> Self {
        Self::with_parent(Some(self.clone()))
    }

    fn with_parent(parent: Option<ScopeTicket>) -> Self {
        Self {
            inner: Arc::new(TicketInner {
                committed: AtomicBool::new(false),
                rolled_back: AtomicBool::new(false),
                parent,
            }),
        }
    }

    /// Mark an outermost scope committed. Nested tickets defer to their parent.
    pub fn commit(&self) {
        self.inner.committed.store(true, Ordering::Release);
    }

    pub fn roll_back(&self) {
        self.inner.rolled_back.store(true, Ordering::Release);
    }

    pub fn outcome(&self) -> ScopeOutcome {
        if self.inner.rolled_back.load(Ordering::Acquire) {
            return ScopeOutcome::RolledBack;
        }
        match &self.inner.parent {
            Some(parent) => parent.outcome(),
            None if self.inner.committed.load(Ordering::Acquire) => ScopeOutcome::Committed,
            None => ScopeOutcome::Open,
        }
    }

    /// Whether two handles refer to the same scope.
    pub fn same_scope(&self, other: &ScopeTicket) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// A database connection with transaction control.
pub trait Connection: Executor {
    /// Run a parameterless script (DDL, pragmas). May contain several statements.
    fn batch(&self, sql: &str) -> Result<()>;

    fn begin(&self) -> Result<()> {
        self.batch("BEGIN")
    }

    fn commit(&self) -> Result<()> {
        self.batch("COMMIT")
    }

    fn rollback(&self) -> Result<()> {
        self.batch("ROLLBACK")
    }

    fn savepoint(&self, name: &str) -> Result<()> {
        self.batch(&format!("SAVEPOINT {}", quote_ident(name)))
    }

    fn release_savepoint(&self, name: &str) -> Result<()> {
        self.batch(&format!("RELEASE SAVEPOINT {}", quote_ident(name)))
    }

    fn rollback_to_savepoint(&self, name: &str) -> Result<()> {
        // ROLLBACK TO keeps the savepoint open; release it so the stack unwinds.
        self.batch(&format!("ROLLBACK TO SAVEPOINT {}", quote_ident(name)))?;
        self.release_savepoint(name)
    }
}

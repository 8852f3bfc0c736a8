//! Transaction scopes.
//!
//! A session keeps a stack of scopes over one connection. The outermost scope
//! owns the real `BEGIN`/`COMMIT`; nested [`Propagation::Required`] scopes join
//! it, and [`Propagation::RequiresNew`] scopes open a `SAVEPOINT` so their
//! rollback discards only their own writes.
//!
//! Rolling back a joined scope cannot undo part of a transaction, so it rolls
//! back the whole unit and marks it aborted. Until the outermost scope ends,
//! writes and commits fail with [`Error::TransactionAborted`].
//!
//! Every root and savepoint scope carries a [`ScopeTicket`]. Records keyed or
//! deleted inside a scope hold its ticket, so when the scope rolls back they
//! fall back to their earlier key and state.

use rowmodel_core::{Connection, Error, Result, ScopeTicket};
use serde::{Deserialize, Serialize};

use crate::Session;

/// Lifecycle of the session's unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    /// No unit of work has been started.
    #[default]
    Idle,
    /// A transaction is open.
    Active,
    /// The unit was aborted by a nested scope; the outer scope has not ended.
    RollingBack,
    /// The last unit committed.
    Committed,
    /// The last unit rolled back.
    RolledBack,
}

/// How a new scope relates to an already active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Propagation {
    /// Join the active transaction, or start one.
    #[default]
    Required,
    /// Start an independent sub-unit (a savepoint when a transaction is open).
    RequiresNew,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Frame {
    Root,
    Joined,
    Savepoint(String),
}

impl<C: Connection> Session<C> {
    /// Open a scope with [`Propagation::Required`].
    pub fn begin(&mut self) -> Result<()> {
        self.begin_with(Propagation::Required)
    }

    /// Open a scope.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn begin_with(&mut self, propagation: Propagation) -> Result<()> {
        self.ensure_not_aborted()?;

        let frame = match (self.frames.is_empty(), propagation) {
            (true, _) => {
                self.conn.begin()?;
                self.tickets.push(ScopeTicket::root());
                self.state = TransactionState::Active;
                tracing::info!("Beginning transaction");
                Frame::Root
            }
            (false, Propagation::Required) => Frame::Joined,
            (false, Propagation::RequiresNew) => {
                self.savepoint_seq += 1;
                let name = format!("{}{}", self.config.savepoint_prefix, self.savepoint_seq);
                self.conn.savepoint(&name)?;
                let ticket = self
                    .tickets
                    .last()
                    .map_or_else(ScopeTicket::root, ScopeTicket::nested);
                self.tickets.push(ticket);
                tracing::debug!(savepoint = %name, "Opened savepoint");
                Frame::Savepoint(name)
            }
        };
        self.frames.push(frame);
        Ok(())
    }

    /// Close the innermost scope, keeping its writes.
    ///
    /// Only the outermost scope actually commits. Fails with
    /// [`Error::TransactionAborted`] when a nested scope rolled the unit back.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn commit(&mut self) -> Result<()> {
        let frame = self.pop_frame()?;
        let ticket = self.pop_ticket(&frame);

        if let Some(reason) = self.aborted.clone() {
            if frame == Frame::Root {
                self.finish(TransactionState::RolledBack);
            }
            return Err(Error::TransactionAborted(reason));
        }

        match frame {
            Frame::Root => {
                if let Err(err) = self.conn.commit() {
                    // SQLite keeps the transaction open after a failed COMMIT
                    let _ = self.conn.rollback();
                    if let Some(ticket) = ticket {
                        ticket.roll_back();
                    }
                    self.finish(TransactionState::RolledBack);
                    return Err(err);
                }
                if let Some(ticket) = ticket {
                    ticket.commit();
                }
                tracing::info!("Committed transaction");
                self.finish(TransactionState::Committed);
            }
            Frame::Joined => {}
            Frame::Savepoint(name) => self.conn.release_savepoint(&name)?,
        }
        Ok(())
    }

    /// Close the innermost scope, discarding writes.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn rollback(&mut self) -> Result<()> {
        let frame = self.pop_frame()?;
        let ticket = self.pop_ticket(&frame);
        if let Some(ticket) = &ticket {
            ticket.roll_back();
        }

        if self.aborted.is_some() {
            // the real transaction is already gone
            if frame == Frame::Root {
                self.finish(TransactionState::RolledBack);
            }
            return Ok(());
        }

        match frame {
            Frame::Root => {
                self.state = TransactionState::RollingBack;
                let result = self.conn.rollback();
                tracing::info!("Rolled back transaction");
                self.finish(TransactionState::RolledBack);
                result
            }
            Frame::Joined => {
                if let Some(root) = self.tickets.first() {
                    root.roll_back();
                }
                self.state = TransactionState::RollingBack;
                self.aborted = Some("a nested scope rolled back the transaction".to_string());
                tracing::info!(depth = self.frames.len(), "Nested scope rolled back the unit");
                self.conn.rollback()
            }
            Frame::Savepoint(name) => {
                tracing::debug!(savepoint = %name, "Rolling back to savepoint");
                self.conn.rollback_to_savepoint(&name)
            }
        }
    }

    /// Run `f` inside a [`Propagation::Required`] scope.
    pub fn transaction<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.transaction_with(Propagation::Required, f)
    }

    /// Run `f` inside a scope: commit on `Ok`, roll back on `Err`.
    ///
    /// The error returned by `f` is passed through unchanged.
    pub fn transaction_with<T>(
        &mut self,
        propagation: Propagation,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.begin_with(propagation)?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback() {
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Whether a scope is open (even an aborted one).
    pub fn in_transaction(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Number of open scopes.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    pub(crate) fn ensure_not_aborted(&self) -> Result<()> {
        match &self.aborted {
            Some(reason) => Err(Error::TransactionAborted(reason.clone())),
            None => Ok(()),
        }
    }

    fn pop_frame(&mut self) -> Result<Frame> {
        self.frames
            .pop()
            .ok_or_else(|| Error::InvalidState("no active transaction".to_string()))
    }

    /// Roll back every open scope at once. Used when the holder of the unit
    /// went away (a panic) without closing it.
    pub(crate) fn abandon_unit(&mut self) {
        if self.frames.is_empty() {
            return;
        }
        tracing::warn!(depth = self.frames.len(), "Rolling back an abandoned unit");
        self.frames.clear();
        if let Some(root) = self.tickets.first() {
            root.roll_back();
        }
        // an aborted unit already rolled the connection back
        if self.aborted.is_none() {
            if let Err(err) = self.conn.rollback() {
                tracing::warn!(error = %err, "Rollback failed");
            }
        }
        self.finish(TransactionState::RolledBack);
    }

    /// The ticket of a scope being closed; joined scopes have none of their own.
    fn pop_ticket(&mut self, frame: &Frame) -> Option<ScopeTicket> {
        match frame {
            Frame::Joined => None,
            Frame::Root | Frame::Savepoint(_) => self.tickets.pop(),
        }
    }

    /// The innermost open scope's ticket.
    pub(crate) fn current_ticket(&self) -> Option<ScopeTicket> {
        self.tickets.last().cloned()
    }

    fn finish(&mut self, state: TransactionState) {
        self.tickets.clear();
        self.state = state;
        self.aborted = None;
        self.n1.borrow_mut().reset();
    }
}

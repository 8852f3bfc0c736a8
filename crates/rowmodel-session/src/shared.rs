//! A session shared between threads.

use std::sync::{Arc, Mutex, MutexGuard};

use rowmodel_core::{Connection, Result};

use crate::{Session, SessionConfig};

/// A [`Session`] behind `Arc<Mutex<_>>`.
///
/// The connection is owned by one caller at a time: [`acquire`](Self::acquire)
/// blocks until the previous holder drops its guard, so a whole transaction
/// runs without interleaving.
#[derive(Debug)]
pub struct SharedSession<C: Connection> {
    inner: Arc<Mutex<Session<C>>>,
}

impl<C: Connection> Clone for SharedSession<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connection> SharedSession<C> {
    pub fn new(conn: C) -> Self {
        Self::from_session(Session::new(conn))
    }

    pub fn with_config(conn: C, config: SessionConfig) -> Self {
        Self::from_session(Session::with_config(conn, config))
    }

    pub fn from_session(session: Session<C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Exclusive access to the session.
    ///
    /// A previous holder that panicked mid-unit left its transaction open; it is
    /// rolled back here so the caller starts from a clean session.
    pub fn acquire(&self) -> MutexGuard<'_, Session<C>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                let mut guard = poisoned.into_inner();
                guard.abandon_unit();
                self.inner.clear_poison();
                guard
            }
        }
    }

    /// Run `f` as one transaction while holding the session.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut Session<C>) -> Result<T>) -> Result<T> {
        self.acquire().transaction(f)
    }
}

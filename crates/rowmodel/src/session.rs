//! Session re-exports.
//!
//! `rowmodel::Session` is the unit-of-work coordinator: validated saves,
//! transaction scopes with savepoint-backed `RequiresNew`, and lazy-load
//! tracking. The implementation lives in the separate `rowmodel-session` crate;
//! this module lets users depend on the facade alone.

pub use rowmodel_session::{
    N1QueryTracker, N1Stats, Propagation, Session, SessionConfig, SessionDebugInfo, SharedSession,
    TransactionState,
};

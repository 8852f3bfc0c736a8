//! Validated persistence of records and their built children.
//!
//! These functions issue the writes but do not open a transaction; the session
//! wraps them in a unit of work so a failing child undoes the owner's insert.

use rowmodel_core::{Error, Executor, Model, RecordInvalid, Result, find_relationship};

use crate::builder::{DeleteBuilder, InsertBuilder, UpdateBuilder};
use crate::record::Record;

/// Validate, then insert or update `record` and every built child.
///
/// Returns `Ok(false)` without writing anything when any record in the tree
/// is invalid; the errors are left on the records.
pub fn save<M: Model, E: Executor + ?Sized>(exec: &E, record: &mut Record<M>) -> Result<bool> {
    if !record.validate() {
        tracing::debug!(table = M::TABLE_NAME, errors = %record.errors(), "validation failed");
        return Ok(false);
    }
    persist_tree(exec, record)?;
    Ok(true)
}

/// Like [`save`], but an invalid record is an [`Error::RecordInvalid`].
pub fn save_strict<M: Model, E: Executor + ?Sized>(exec: &E, record: &mut Record<M>) -> Result<()> {
    if save(exec, record)? {
        Ok(())
    } else {
        Err(RecordInvalid::new(M::TABLE_NAME, record.errors().clone()).into())
    }
}

/// Write `record` and its built children without validating.
///
/// New records are inserted and receive their key; persisted records are
/// updated. Children get the owner's key in their foreign key column first.
pub fn persist_tree<M: Model, E: Executor + ?Sized>(exec: &E, record: &mut Record<M>) -> Result<()> {
    if record.is_destroyed() {
        return Err(Error::InvalidState(format!(
            "can not save a destroyed `{}` record",
            M::TABLE_NAME
        )));
    }

    if record.is_new_record() {
        let id = InsertBuilder::new(record).execute(exec)?;
        record.assign_id(id, exec.scope_ticket())?;
        tracing::info!(table = M::TABLE_NAME, id, "inserted record");
    } else {
        let affected = UpdateBuilder::new(record)?.execute(exec)?;
        // a key that matches no row means the row is gone; never report success
        if affected == 0 && !record.model().to_row().is_empty() {
            return Err(Error::NotFound {
                table: M::TABLE_NAME,
                id: record.id().unwrap_or_default(),
            });
        }
        tracing::debug!(table = M::TABLE_NAME, id = record.id(), "updated record");
    }

    let owner_id = record
        .id()
        .ok_or_else(|| Error::InvalidState(format!("`{}` has no key after save", M::TABLE_NAME)))?;
    for (name, children) in &mut record.pending {
        let info = find_relationship(M::relationships(), name).ok_or_else(|| {
            Error::Association(format!("unknown association `{name}` on `{}`", M::TABLE_NAME))
        })?;
        for child in children.iter_mut() {
            child.persist_child(&exec, info.foreign_key, owner_id)?;
        }
    }
    Ok(())
}

/// Delete a saved record and mark it destroyed.
pub fn destroy<M: Model, E: Executor + ?Sized>(exec: &E, record: &mut Record<M>) -> Result<()> {
    let affected = DeleteBuilder::from_record(record)?.execute(exec)?;
    record.mark_deleted(exec.scope_ticket());
    tracing::info!(table = M::TABLE_NAME, id = record.id(), affected, "destroyed record");
    Ok(())
}

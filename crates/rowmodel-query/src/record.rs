//! The row mapper: typed records with identity, lifecycle state and errors.

use std::any::Any;
use std::fmt;
use std::ops::{Deref, DerefMut};

use rowmodel_core::{
    Error, Errors, Executor, Model, RelationshipInfo, RelationshipKind, Result, Row, ScopeOutcome,
    ScopeTicket, Value, find_relationship, run_rules,
};
use serde::{Deserialize, Serialize};

/// Persistence state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecordState {
    /// Never inserted.
    #[default]
    New,
    /// Inserted (or loaded) and not deleted.
    Persisted,
    /// Deleted from the database.
    Deleted,
}

/// Key and state before a write made inside a transaction scope.
#[derive(Debug, Clone)]
struct Undo {
    id: Option<i64>,
    state: RecordState,
    ticket: ScopeTicket,
}

/// A mapped row of `M`.
///
/// The primary key is assigned once, on the first successful insert, and can
/// not be changed afterwards. An insert (or delete) whose transaction scope
/// rolls back is taken back: the record reports its earlier key and state.
/// Attribute access goes through `Deref` to `M`.
#[derive(Debug)]
pub struct Record<M: Model> {
    id: Option<i64>,
    state: RecordState,
    /// Changes made in scopes that have not committed yet, oldest first.
    undo: Vec<Undo>,
    model: M,
    errors: Errors,
    /// Built but not yet saved children, per association.
    pub(crate) pending: Vec<(&'static str, Vec<Box<dyn ErasedRecord>>)>,
    /// Eager-loaded rows, per association.
    pub(crate) loaded: Vec<(&'static str, Vec<Row>)>,
}

impl<M: Model> Record<M> {
    /// Wrap a model in an unsaved record.
    pub fn new(model: M) -> Self {
        Self {
            id: None,
            state: RecordState::New,
            undo: Vec::new(),
            model,
            errors: Errors::new(),
            pending: Vec::new(),
            loaded: Vec::new(),
        }
    }

    /// Build a record inside a callback. Nothing is persisted; children built in
    /// the callback stay `New` until the record is saved.
    pub fn new_with(model: M, build: impl FnOnce(&mut Self)) -> Self {
        let mut record = Self::new(model);
        build(&mut record);
        record
    }

    /// Decode a persisted record. Unknown columns are ignored.
    pub fn from_row(row: &Row) -> Result<Self> {
        let id: Option<i64> = row.decode(M::PRIMARY_KEY)?;
        let model = M::from_row(row)?;
        Ok(Self {
            id,
            state: RecordState::Persisted,
            undo: Vec::new(),
            model,
            errors: Errors::new(),
            pending: Vec::new(),
            loaded: Vec::new(),
        })
    }

    /// Encode the record, primary key first. An unsaved key encodes as NULL.
    pub fn to_row(&self) -> Row {
        let mut pairs = vec![(M::PRIMARY_KEY, Value::from(self.id()))];
        pairs.extend(self.model.to_row());
        Row::from_pairs(pairs)
    }

    pub fn id(&self) -> Option<i64> {
        self.resolved().0
    }

    pub fn state(&self) -> RecordState {
        self.resolved().1
    }

    pub fn is_new_record(&self) -> bool {
        self.state() == RecordState::New
    }

    pub fn is_persisted(&self) -> bool {
        self.state() == RecordState::Persisted
    }

    pub fn is_destroyed(&self) -> bool {
        self.state() == RecordState::Deleted
    }

    /// Key and state with rolled-back scopes taken into account.
    fn resolved(&self) -> (Option<i64>, RecordState) {
        self.undo
            .iter()
            .find(|u| u.ticket.outcome() == ScopeOutcome::RolledBack)
            .map_or((self.id, self.state), |u| (u.id, u.state))
    }

    /// Fold finished scopes into the stored key and state.
    fn settle(&mut self) {
        let (id, state) = self.resolved();
        if let Some(pos) = self
            .undo
            .iter()
            .position(|u| u.ticket.outcome() == ScopeOutcome::RolledBack)
        {
            self.undo.truncate(pos);
        }
        self.undo.retain(|u| u.ticket.outcome() == ScopeOutcome::Open);
        self.id = id;
        self.state = state;
    }

    fn remember(&mut self, ticket: Option<ScopeTicket>) {
        if let Some(ticket) = ticket {
            self.undo.push(Undo {
                id: self.id,
                state: self.state,
                ticket,
            });
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// Errors from the last validation run.
    pub fn errors(&self) -> &Errors {
        &self.errors
    }

    /// Mutable access for callers that add errors by hand.
    pub fn errors_mut(&mut self) -> &mut Errors {
        &mut self.errors
    }

    /// Run every rule of `M` and validate built children.
    ///
    /// The error set is cleared first. Returns whether it is empty afterwards.
    pub fn validate(&mut self) -> bool {
        let mut errors = run_rules(&self.model, M::validations());
        for (name, children) in &mut self.pending {
            let mut invalid = false;
            for child in children.iter_mut() {
                // validate every child so each one carries its own errors
                invalid |= !child.validate_erased();
            }
            if invalid {
                errors.add(name, "is invalid");
            }
        }
        self.errors = errors;
        self.errors.is_empty()
    }

    /// Fresh validation run.
    pub fn is_valid(&mut self) -> bool {
        self.validate()
    }

    /// Record the key from an insert made in `ticket`'s scope (`None` when
    /// the write was final).
    pub(crate) fn assign_id(&mut self, id: i64, ticket: Option<ScopeTicket>) -> Result<()> {
        self.settle();
        match self.id {
            Some(existing) if existing != id => Err(Error::InvalidState(format!(
                "`{}` record {existing} can not be re-keyed to {id}",
                M::TABLE_NAME
            ))),
            _ => {
                self.remember(ticket);
                self.id = Some(id);
                self.state = RecordState::Persisted;
                Ok(())
            }
        }
    }

    pub(crate) fn mark_deleted(&mut self, ticket: Option<ScopeTicket>) {
        self.settle();
        self.remember(ticket);
        self.state = RecordState::Deleted;
    }

    /// Association descriptor `name`, checked to target `T`.
    pub(crate) fn relationship<T: Model>(&self, name: &str) -> Result<&'static RelationshipInfo> {
        let info = find_relationship(M::relationships(), name).ok_or_else(|| {
            Error::Association(format!("unknown association `{name}` on `{}`", M::TABLE_NAME))
        })?;
        if info.related_table != T::TABLE_NAME {
            return Err(Error::Association(format!(
                "`{}.{name}` targets `{}`, not `{}`",
                M::TABLE_NAME,
                info.related_table,
                T::TABLE_NAME
            )));
        }
        Ok(info)
    }

    fn to_many<T: Model>(&self, name: &str) -> Result<&'static RelationshipInfo> {
        let info = self.relationship::<T>(name)?;
        if info.kind == RelationshipKind::ToMany {
            Ok(info)
        } else {
            Err(Error::Association(format!(
                "`{}.{name}` is not a to-many association; children can only be built on one",
                M::TABLE_NAME
            )))
        }
    }

    /// Queue a new child on a to-many association and return it for editing.
    ///
    /// When the owner already has a key the child's foreign key is set now,
    /// otherwise it is set when the owner is saved.
    pub fn build<T: Model>(&mut self, name: &str, model: T) -> Result<&mut Record<T>> {
        self.append(name, Record::new(model))?;
        self.pending_slot(name)
            .and_then(|children| children.last_mut())
            .and_then(|child| child.as_any_mut().downcast_mut::<Record<T>>())
            .ok_or_else(|| Error::Association(format!("`{name}` child was not queued")))
    }

    /// Build a child inside a callback (`user.posts.build do |post| ... end`).
    pub fn build_with<T: Model>(
        &mut self,
        name: &str,
        model: T,
        build: impl FnOnce(&mut Record<T>),
    ) -> Result<&mut Record<T>> {
        let child = self.build(name, model)?;
        build(&mut *child);
        Ok(child)
    }

    /// Queue an existing record on a to-many association. It is saved, with its
    /// foreign key pointing at this owner, when the owner is saved.
    pub fn append<T: Model>(&mut self, name: &str, mut child: Record<T>) -> Result<()> {
        let info = self.to_many::<T>(name)?;
        if let Some(id) = self.id() {
            child.write_attribute(info.foreign_key, Value::BigInt(id))?;
        }
        match self.pending.iter_mut().find(|(n, _)| *n == info.name) {
            Some((_, children)) => children.push(Box::new(child)),
            None => self.pending.push((info.name, vec![Box::new(child)])),
        }
        Ok(())
    }

    fn pending_slot(&mut self, name: &str) -> Option<&mut Vec<Box<dyn ErasedRecord>>> {
        self.pending
            .iter_mut()
            .find(|(n, _)| *n == name)
            .map(|(_, children)| children)
    }

    /// Children queued on `name` with [`build`](Self::build) or
    /// [`append`](Self::append), in queue order.
    pub fn built<T: Model>(&self, name: &str) -> Vec<&Record<T>> {
        self.pending
            .iter()
            .filter(|(n, _)| *n == name)
            .flat_map(|(_, children)| children.iter())
            .filter_map(|child| child.as_any().downcast_ref::<Record<T>>())
            .collect()
    }

    /// A standalone child of this saved owner, foreign key already set.
    /// Unlike [`build`](Self::build) the child is not queued on the owner.
    pub fn new_child<T: Model>(&self, name: &str, model: T) -> Result<Record<T>> {
        let info = self.to_many::<T>(name)?;
        let id = self.id().ok_or_else(|| {
            Error::InvalidState(format!(
                "can not create `{name}` for an unsaved `{}`",
                M::TABLE_NAME
            ))
        })?;
        let mut child = Record::new(model);
        child.write_attribute(info.foreign_key, Value::BigInt(id))?;
        Ok(child)
    }

    /// Point a to-one association at `target`, which must be saved.
    pub fn assign<T: Model>(&mut self, name: &str, target: &Record<T>) -> Result<()> {
        let info = self.relationship::<T>(name)?;
        if info.kind != RelationshipKind::ToOne {
            return Err(Error::Association(format!(
                "`{}.{name}` is not a to-one association",
                M::TABLE_NAME
            )));
        }
        let id = target.id.ok_or_else(|| {
            Error::InvalidState(format!(
                "can not assign an unsaved `{}` to `{}.{name}`",
                T::TABLE_NAME,
                M::TABLE_NAME
            ))
        })?;
        self.write_attribute(info.foreign_key, Value::BigInt(id))
    }

    /// Eager-loaded rows for `name`, if the association was included.
    pub(crate) fn loaded_rows(&self, name: &str) -> Option<&[Row]> {
        self.loaded
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, rows)| rows.as_slice())
    }

    pub(crate) fn set_loaded(&mut self, name: &'static str, rows: Vec<Row>) {
        match self.loaded.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = rows,
            None => self.loaded.push((name, rows)),
        }
    }

    /// Whether `name` was eager loaded.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded_rows(name).is_some()
    }

    /// Re-read the attributes from the database.
    pub fn reload<E: Executor + ?Sized>(&mut self, exec: &E) -> Result<()> {
        let id = self.id().ok_or_else(|| {
            Error::InvalidState(format!("can not reload an unsaved `{}`", M::TABLE_NAME))
        })?;
        let fresh = crate::Query::<M>::new().find(exec, id)?;
        self.model = fresh.model;
        self.loaded.clear();
        Ok(())
    }
}

impl<M: Model> Deref for Record<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.model
    }
}

impl<M: Model> DerefMut for Record<M> {
    fn deref_mut(&mut self) -> &mut M {
        &mut self.model
    }
}

impl<M: Model> Clone for Record<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            state: self.state,
            undo: self.undo.clone(),
            model: self.model.clone(),
            errors: self.errors.clone(),
            pending: self
                .pending
                .iter()
                .map(|(name, children)| (*name, children.iter().map(|c| c.clone_box()).collect()))
                .collect(),
            loaded: self.loaded.clone(),
        }
    }
}

/// Two records are equal when they have the same key and the same attributes.
impl<M: Model + PartialEq> PartialEq for Record<M> {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id() && self.model == other.model
    }
}

impl<M: Model + fmt::Display> fmt::Display for Record<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.model, f)
    }
}

/// A record of any model, as stored in an owner's pending children.
pub(crate) trait ErasedRecord: fmt::Debug {
    fn validate_erased(&mut self) -> bool;

    /// Set the foreign key to the owner and persist this record and its children.
    fn persist_child(&mut self, exec: &dyn Executor, foreign_key: &str, owner_id: i64)
    -> Result<()>;

    fn clone_box(&self) -> Box<dyn ErasedRecord>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<M: Model> ErasedRecord for Record<M> {
    fn validate_erased(&mut self) -> bool {
        self.validate()
    }

    fn persist_child(
        &mut self,
        exec: &dyn Executor,
        foreign_key: &str,
        owner_id: i64,
    ) -> Result<()> {
        self.write_attribute(foreign_key, Value::BigInt(owner_id))?;
        crate::persist::persist_tree(exec, self)
    }

    fn clone_box(&self) -> Box<dyn ErasedRecord> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

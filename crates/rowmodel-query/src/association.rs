//! Association resolution: scoped queries, lazy loads and eager preloading.
//!
//! | kind | query for one owner | preload for many owners |
//! |------|---------------------|-------------------------|
//! | to-one | `target.pk = owner.fk` | `target.pk IN (fks)` |
//! | to-many | `target.fk = owner.pk` | `target.fk IN (pks)` |
//! | through | `INNER JOIN` of the intermediate table, filtered on its key back to the owner | same join, `IN (pks)`, owner key selected alongside |

use std::collections::HashMap;

use rowmodel_core::{
    Clause, ColumnRef, CompareOp, Error, Executor, Join, LoadOrigin, Model, OrderTerm, Predicate,
    QueryError, QuerySpec, RelationshipInfo, RelationshipKind, Result, Row, Value,
    find_relationship, resolve_through,
};

use crate::compile::{self, Projection, TableRef};
use crate::record::Record;
use crate::select::Query;

/// Alias of the owner key selected alongside preloaded through rows.
const OWNER_KEY: &str = "__owner_key";

fn eq(column: ColumnRef, value: Value) -> Predicate {
    Predicate::Compare {
        column,
        op: CompareOp::Eq,
        value,
    }
}

fn within(column: ColumnRef, values: Vec<Value>) -> Predicate {
    Predicate::In {
        column,
        values,
        negated: false,
    }
}

/// Join, filter column and ordering that reach the target of a through
/// association from the intermediate table.
struct ThroughPlan {
    join: Join,
    /// Intermediate column holding the owner key.
    owner_column: ColumnRef,
    order: Vec<OrderTerm>,
    distinct: bool,
}

fn through_plan(owner: &TableRef, info: &RelationshipInfo) -> Result<ThroughPlan> {
    let chain = resolve_through(owner.name, (owner.relationships)(), info)?;
    let middle = TableRef::related(&chain.proximal);
    let target = TableRef::related(info);

    let join = match chain.distal.kind {
        // target.fk = middle.pk
        RelationshipKind::ToMany => Join::inner(
            middle.name,
            middle.key(),
            ColumnRef::qualified(target.name, chain.distal.foreign_key),
        ),
        // middle.fk = target.pk
        _ => Join::inner(
            middle.name,
            ColumnRef::qualified(middle.name, chain.distal.foreign_key),
            target.key(),
        ),
    };
    let order = if info.distinct {
        vec![OrderTerm::asc(target.key())]
    } else {
        vec![OrderTerm::asc(middle.key()), OrderTerm::asc(target.key())]
    };

    Ok(ThroughPlan {
        join,
        owner_column: ColumnRef::qualified(middle.name, chain.proximal.foreign_key),
        order,
        distinct: info.distinct,
    })
}

impl<M: Model> Record<M> {
    /// A query over the rows reachable through association `name`.
    ///
    /// The query chains like any other (`filter`, `scope`, `limit`, ...). For
    /// an unsaved owner, or a to-one whose key is empty, it matches nothing.
    pub fn association<T: Model>(&self, name: &str) -> Result<Query<T>> {
        let info = self.relationship::<T>(name)?;
        let origin = LoadOrigin {
            owner: M::TABLE_NAME,
            relation: info.name,
        };
        let base = Query::<T>::new();

        let spec = match info.kind {
            RelationshipKind::ToOne => {
                let key = self.read_attribute(info.foreign_key).unwrap_or_default();
                if key.is_null() {
                    return Ok(Query::none());
                }
                base.spec().filter(eq(TableRef::of::<T>().key(), key))
            }
            RelationshipKind::ToMany => {
                let Some(id) = self.id() else {
                    return Ok(Query::none());
                };
                base.spec().filter(eq(
                    ColumnRef::qualified(T::TABLE_NAME, info.foreign_key),
                    Value::BigInt(id),
                ))
            }
            RelationshipKind::ToManyThrough => {
                let plan = through_plan(&TableRef::of::<M>(), info)?;
                let Some(id) = self.id() else {
                    return Ok(Query::none());
                };
                base.spec()
                    .join(plan.join)
                    .filter(eq(plan.owner_column, Value::BigInt(id)))
                    .default_order(plan.order)
                    .distinct(plan.distinct)
            }
        };
        Ok(Query::from_spec(spec.with_origin(origin)))
    }

    /// Resolve a to-one association. `None` when the key is empty or dangling.
    pub fn load_one<T: Model, E: Executor + ?Sized>(
        &self,
        exec: &E,
        name: &str,
    ) -> Result<Option<Record<T>>> {
        let info = self.relationship::<T>(name)?;
        if info.kind != RelationshipKind::ToOne {
            return Err(Error::Association(format!(
                "`{}.{name}` is a collection; use load_many",
                M::TABLE_NAME
            )));
        }
        if let Some(rows) = self.loaded_rows(name) {
            return rows.first().map(Record::<T>::from_row).transpose();
        }
        if self.read_attribute(info.foreign_key).unwrap_or_default().is_null() {
            return Ok(None);
        }
        self.association::<T>(name)?.first(exec)
    }

    /// Materialize a collection association.
    ///
    /// Preloaded rows are used when present. An unsaved owner yields its built
    /// children; a saved owner yields stored rows followed by any children
    /// built since the last save.
    pub fn load_many<T: Model, E: Executor + ?Sized>(
        &self,
        exec: &E,
        name: &str,
    ) -> Result<Vec<Record<T>>> {
        let info = self.relationship::<T>(name)?;
        if info.kind == RelationshipKind::ToOne {
            return Err(Error::Association(format!(
                "`{}.{name}` is a to-one association; use load_one",
                M::TABLE_NAME
            )));
        }
        let unsaved = self
            .built::<T>(name)
            .into_iter()
            .filter(|child| child.is_new_record())
            .cloned();

        if let Some(rows) = self.loaded_rows(name) {
            let mut records = rows
                .iter()
                .map(Record::<T>::from_row)
                .collect::<Result<Vec<_>>>()?;
            records.extend(unsaved);
            return Ok(records);
        }
        if self.id().is_none() {
            return Ok(unsaved.collect());
        }
        let mut records = self.association::<T>(name)?.all(exec)?;
        records.extend(unsaved);
        Ok(records)
    }
}

/// Load association `name` for every record in `owners` with one query and
/// attach the rows to their owners.
pub(crate) fn preload<M: Model, E: Executor + ?Sized>(
    exec: &E,
    owners: &mut [Record<M>],
    name: &str,
) -> Result<()> {
    let owner_table = TableRef::of::<M>();
    let info = find_relationship(M::relationships(), name).ok_or_else(|| {
        QueryError::new(
            Clause::Includes,
            format!("unknown association `{name}` on `{}`", M::TABLE_NAME),
        )
    })?;
    let target = TableRef::related(info);

    // per owner, the value its related rows carry in the grouping column
    let owner_keys: Vec<Option<Value>> = owners
        .iter()
        .map(|owner| match info.kind {
            RelationshipKind::ToOne => owner
                .read_attribute(info.foreign_key)
                .filter(|v| !v.is_null()),
            _ => owner.id().map(Value::BigInt),
        })
        .collect();

    let mut keys: Vec<Value> = Vec::new();
    for key in owner_keys.iter().flatten() {
        if !keys.contains(key) {
            keys.push(key.clone());
        }
    }

    let mut grouped: HashMap<String, Vec<Row>> = HashMap::new();
    if !keys.is_empty() {
        let (spec, projection, group_by) = match info.kind {
            RelationshipKind::ToOne => (
                QuerySpec::new()
                    .filter(within(target.key(), keys))
                    .default_order([OrderTerm::asc(target.key())]),
                Projection::Rows,
                target.primary_key.to_string(),
            ),
            RelationshipKind::ToMany => (
                QuerySpec::new()
                    .filter(within(
                        ColumnRef::qualified(target.name, info.foreign_key),
                        keys,
                    ))
                    .default_order([OrderTerm::asc(target.key())]),
                Projection::Rows,
                info.foreign_key.to_string(),
            ),
            RelationshipKind::ToManyThrough => {
                let plan = through_plan(&owner_table, info)?;
                (
                    QuerySpec::new()
                        .join(plan.join)
                        .filter(within(plan.owner_column.clone(), keys))
                        .default_order(plan.order)
                        .distinct(plan.distinct),
                    Projection::RowsWith(vec![(plan.owner_column, OWNER_KEY.to_string())]),
                    OWNER_KEY.to_string(),
                )
            }
        };

        let compiled = compile::select(&target, &spec, &projection)?;
        let rows = exec.query(&compiled.sql, &compiled.params)?;
        tracing::debug!(
            owner = M::TABLE_NAME,
            association = info.name,
            owners = owners.len(),
            rows = rows.len(),
            "preloaded association"
        );
        for row in rows {
            let key = row.get_named(&group_by).cloned().unwrap_or_default();
            grouped.entry(key.to_string()).or_default().push(row);
        }
    }

    for (owner, key) in owners.iter_mut().zip(owner_keys) {
        let rows = key
            .and_then(|k| grouped.get(&k.to_string()).cloned())
            .unwrap_or_default();
        owner.set_loaded(info.name, rows);
    }
    Ok(())
}

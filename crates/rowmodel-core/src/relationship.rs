//! Association metadata.
//!
//! Associations are declared once per model as a static slice of
//! [`RelationshipInfo`] and resolved by name at runtime. Each descriptor carries
//! function pointers to the related model's metadata so a through chain can be
//! checked without reflection.

use crate::error::{Error, Result};
use crate::field::FieldInfo;
use crate::model::Model;

/// The kind of association between two models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RelationshipKind {
    /// `Post` belongs to one `User`; the key lives on the owner (`posts.user_id`).
    ToOne,
    /// One `User` has many `Post`s; the key lives on the target (`posts.user_id`).
    #[default]
    ToMany,
    /// `Physician` has many `Patient`s through `appointments`.
    ToManyThrough,
}

/// Metadata about one association.
#[derive(Debug, Clone, Copy)]
pub struct RelationshipInfo {
    /// Association name, used for lookup.
    pub name: &'static str,

    /// The related model's table name.
    pub related_table: &'static str,

    /// The related model's primary key column.
    pub related_primary_key: &'static str,

    /// Kind of association.
    pub kind: RelationshipKind,

    /// Foreign key column. On the owner for `ToOne`, on the target for
    /// `ToMany`, empty for `ToManyThrough`.
    pub foreign_key: &'static str,

    /// Proximal to-many association on the owner (`ToManyThrough` only).
    pub through: Option<&'static str>,

    /// Association on the intermediate model that reaches the target.
    /// Defaults to `name`.
    pub source: Option<&'static str>,

    /// Whether reads select distinct target rows.
    pub distinct: bool,

    /// The related model's association table.
    pub related_relationships: fn() -> &'static [RelationshipInfo],

    /// The related model's columns.
    pub related_fields: fn() -> &'static [FieldInfo],
}

impl RelationshipInfo {
    const fn of<T: Model>(
        name: &'static str,
        kind: RelationshipKind,
        foreign_key: &'static str,
    ) -> Self {
        Self {
            name,
            related_table: T::TABLE_NAME,
            related_primary_key: T::PRIMARY_KEY,
            kind,
            foreign_key,
            through: None,
            source: None,
            distinct: false,
            related_relationships: T::relationships,
            related_fields: T::fields,
        }
    }

    /// `belongs_to`: the owner stores `foreign_key` pointing at `T`.
    #[must_use]
    pub const fn to_one<T: Model>(name: &'static str, foreign_key: &'static str) -> Self {
        Self::of::<T>(name, RelationshipKind::ToOne, foreign_key)
    }

    /// `has_many`: every `T` stores `foreign_key` pointing at the owner.
    #[must_use]
    pub const fn to_many<T: Model>(name: &'static str, foreign_key: &'static str) -> Self {
        Self::of::<T>(name, RelationshipKind::ToMany, foreign_key)
    }

    /// `has_many ..., through:`: reach `T` via the owner's `through` association.
    #[must_use]
    pub const fn to_many_through<T: Model>(name: &'static str, through: &'static str) -> Self {
        let mut info = Self::of::<T>(name, RelationshipKind::ToManyThrough, "");
        info.through = Some(through);
        info
    }

    /// Name the association on the intermediate model explicitly.
    #[must_use]
    pub const fn source(mut self, source: &'static str) -> Self {
        self.source = Some(source);
        self
    }

    /// Enable/disable `SELECT DISTINCT` for reads through this association.
    #[must_use]
    pub const fn distinct(mut self, value: bool) -> Self {
        self.distinct = value;
        self
    }

    /// Association looked up on the intermediate model.
    pub fn source_name(&self) -> &'static str {
        self.source.unwrap_or(self.name)
    }
}

/// Find an association by name.
pub fn find_relationship<'a>(
    relationships: &'a [RelationshipInfo],
    name: &str,
) -> Option<&'a RelationshipInfo> {
    relationships.iter().find(|r| r.name == name)
}

/// A resolved `ToManyThrough` chain.
#[derive(Debug, Clone, Copy)]
pub struct ThroughChain {
    /// The owner's to-many association to the intermediate model.
    pub proximal: RelationshipInfo,
    /// The intermediate model's association to the target.
    pub distal: RelationshipInfo,
}

/// Resolve the proximal and distal halves of a through association declared
/// on `owner_relationships`.
pub fn resolve_through(
    owner_table: &str,
    owner_relationships: &[RelationshipInfo],
    info: &RelationshipInfo,
) -> Result<ThroughChain> {
    let through = info.through.ok_or_else(|| {
        Error::Association(format!(
            "`{owner_table}.{}` is not a through association",
            info.name
        ))
    })?;
    let proximal = find_relationship(owner_relationships, through).ok_or_else(|| {
        Error::Association(format!(
            "`{owner_table}.{}` goes through unknown association `{through}`",
            info.name
        ))
    })?;
    if proximal.kind != RelationshipKind::ToMany {
        return Err(Error::Association(format!(
            "`{owner_table}.{through}` must be a to-many association to be used as a through"
        )));
    }

    let source = info.source_name();
    let distal = find_relationship((proximal.related_relationships)(), source).ok_or_else(|| {
        Error::Association(format!(
            "`{}` has no association `{source}` for `{owner_table}.{}`",
            proximal.related_table, info.name
        ))
    })?;
    match distal.kind {
        RelationshipKind::ToOne | RelationshipKind::ToMany => {}
        RelationshipKind::ToManyThrough => {
            return Err(Error::Association(format!(
                "`{}.{source}` is itself a through association; nested chains are not supported",
                proximal.related_table
            )));
        }
    }
    if distal.related_table != info.related_table {
        return Err(Error::Association(format!(
            "`{}.{source}` targets `{}`, but `{owner_table}.{}` declares `{}`",
            proximal.related_table, distal.related_table, info.name, info.related_table
        )));
    }

    Ok(ThroughChain {
        proximal: *proximal,
        distal: *distal,
    })
}

/// Check every association declared on `M`.
///
/// Foreign key columns must exist on the side that stores them and every
/// through chain must resolve.
pub fn validate_relationships<M: Model>() -> Result<()> {
    for info in M::relationships() {
        match info.kind {
            RelationshipKind::ToOne => {
                if !M::has_column(info.foreign_key) {
                    return Err(Error::Association(format!(
                        "`{}.{}` uses missing key column `{}`",
                        M::TABLE_NAME,
                        info.name,
                        info.foreign_key
                    )));
                }
            }
            RelationshipKind::ToMany => {
                if !(info.related_fields)().iter().any(|f| f.name == info.foreign_key) {
                    return Err(Error::Association(format!(
                        "`{}.{}` uses key column `{}` missing on `{}`",
                        M::TABLE_NAME,
                        info.name,
                        info.foreign_key,
                        info.related_table
                    )));
                }
            }
            RelationshipKind::ToManyThrough => {
                resolve_through(M::TABLE_NAME, M::relationships(), info)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Row;
    use crate::types::SqlType;
    use crate::value::Value;

    macro_rules! bare_model {
        ($name:ident, $table:literal, $fields:expr, $rels:expr) => {
            #[derive(Debug, Clone)]
            struct $name;

            impl Model for $name {
                const TABLE_NAME: &'static str = $table;

                fn fields() -> &'static [FieldInfo] {
                    static FIELDS: &[FieldInfo] = $fields;
                    FIELDS
                }

                fn relationships() -> &'static [RelationshipInfo] {
                    static RELS: &[RelationshipInfo] = $rels;
                    RELS
                }

                fn to_row(&self) -> Vec<(&'static str, Value)> {
                    Vec::new()
                }

                fn from_row(_row: &Row) -> crate::Result<Self> {
                    Ok($name)
                }
            }
        };
    }

    bare_model!(
        Physician,
        "physicians",
        &[FieldInfo::id()],
        &[
            RelationshipInfo::to_many::<Appointment>("appointments", "physician_id"),
            RelationshipInfo::to_many_through::<Patient>("patients", "appointments"),
            RelationshipInfo::to_many_through::<Patient>("unique_patients", "appointments")
                .source("patient")
                .distinct(true),
            RelationshipInfo::to_many_through::<Patient>("broken", "missing"),
        ]
    );

    bare_model!(
        Appointment,
        "appointments",
        &[
            FieldInfo::id(),
            FieldInfo::new("physician_id", SqlType::Integer),
            FieldInfo::new("patient_id", SqlType::Integer),
        ],
        &[
            RelationshipInfo::to_one::<Physician>("physician", "physician_id"),
            RelationshipInfo::to_one::<Patient>("patient", "patient_id"),
            RelationshipInfo::to_one::<Patient>("patients", "patient_id"),
        ]
    );

    bare_model!(Patient, "patients", &[FieldInfo::id()], &[]);

    #[test]
    fn test_constructors_capture_related_metadata() {
        let info = RelationshipInfo::to_many::<Appointment>("appointments", "physician_id");
        assert_eq!(info.kind, RelationshipKind::ToMany);
        assert_eq!(info.related_table, "appointments");
        assert_eq!((info.related_fields)().len(), 3);
        assert_eq!((info.related_relationships)().len(), 3);
        assert!(!info.distinct);
    }

    #[test]
    fn test_find_relationship_by_name() {
        let found = find_relationship(Physician::relationships(), "patients");
        assert_eq!(found.map(|r| r.kind), Some(RelationshipKind::ToManyThrough));
        assert!(find_relationship(Physician::relationships(), "nurses").is_none());
    }

    #[test]
    fn test_resolve_through_uses_source_override() {
        let info = find_relationship(Physician::relationships(), "unique_patients").unwrap();
        let chain = resolve_through("physicians", Physician::relationships(), info).unwrap();
        assert_eq!(chain.proximal.name, "appointments");
        assert_eq!(chain.distal.name, "patient");
        assert_eq!(chain.distal.foreign_key, "patient_id");
        assert!(info.distinct);
    }

    #[test]
    fn test_resolve_through_rejects_unknown_proximal() {
        let info = find_relationship(Physician::relationships(), "broken").unwrap();
        let err = resolve_through("physicians", Physician::relationships(), info).unwrap_err();
        assert!(matches!(err, Error::Association(ref msg) if msg.contains("missing")));
    }

    #[test]
    fn test_validate_relationships_reports_broken_chain() {
        assert!(validate_relationships::<Appointment>().is_ok());
        assert!(validate_relationships::<Patient>().is_ok());
        assert!(validate_relationships::<Physician>().is_err());
    }
}

//! Blog and clinic models shared by the integration tests.

#![allow(dead_code)]

use rowmodel::prelude::*;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    pub name: Option<String>,
}

impl User {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
        }
    }
}

impl Model for User {
    const TABLE_NAME: &'static str = "users";

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::id(),
            FieldInfo::new("name", SqlType::String).nullable(true),
        ];
        FIELDS
    }

    fn relationships() -> &'static [RelationshipInfo] {
        static RELATIONSHIPS: &[RelationshipInfo] =
            &[RelationshipInfo::to_many::<Post>("posts", "user_id")];
        RELATIONSHIPS
    }

    fn validations() -> &'static [Rule<Self>] {
        static RULES: &[Rule<User>] = &[
            Rule::presence("name"),
            Rule::length("name", None, Some(40)),
        ];
        RULES
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![("name", self.name.clone().into())]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            name: row.decode("name")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Post {
    pub name: Option<String>,
    pub caption: Option<String>,
    pub user_id: Option<i64>,
}

impl Post {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }
}

fn with_caption_including(args: &[Value]) -> Result<QuerySpec> {
    Ok(QuerySpec::new().filter(Expr::col("caption").like(format!("%{}%", args[0]))))
}

fn without_caption_including(args: &[Value]) -> Result<QuerySpec> {
    Ok(QuerySpec::new().filter(Expr::col("caption").not_like(format!("%{}%", args[0]))))
}

fn recent(_: &[Value]) -> Result<QuerySpec> {
    Ok(QuerySpec::new()
        .order(OrderTerm::desc("id"))
        .limit(3))
}

impl Model for Post {
    const TABLE_NAME: &'static str = "posts";

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::id(),
            FieldInfo::new("name", SqlType::String).nullable(true),
            FieldInfo::new("caption", SqlType::String).nullable(true),
            FieldInfo::new("user_id", SqlType::Integer)
                .nullable(true)
                .foreign_key("users.id"),
        ];
        FIELDS
    }

    fn relationships() -> &'static [RelationshipInfo] {
        static RELATIONSHIPS: &[RelationshipInfo] =
            &[RelationshipInfo::to_one::<User>("user", "user_id")];
        RELATIONSHIPS
    }

    fn validations() -> &'static [Rule<Self>] {
        static RULES: &[Rule<Post>] = &[Rule::presence("name")];
        RULES
    }

    fn scopes() -> &'static [Scope] {
        static SCOPES: &[Scope] = &[
            Scope::new("with_caption_including", 1, with_caption_including),
            Scope::new("without_caption_including", 1, without_caption_including),
            Scope::new("recent", 0, recent),
        ];
        SCOPES
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("name", self.name.clone().into()),
            ("caption", self.caption.clone().into()),
            ("user_id", self.user_id.into()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            name: row.decode("name")?,
            caption: row.decode("caption")?,
            user_id: row.decode("user_id")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Physician {
    pub name: Option<String>,
}

impl Model for Physician {
    const TABLE_NAME: &'static str = "physicians";

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::id(),
            FieldInfo::new("name", SqlType::String).nullable(true),
        ];
        FIELDS
    }

    fn relationships() -> &'static [RelationshipInfo] {
        static RELATIONSHIPS: &[RelationshipInfo] = &[
            RelationshipInfo::to_many::<Appointment>("appointments", "physician_id"),
            RelationshipInfo::to_many_through::<Patient>("patients", "appointments")
                .source("patient"),
            RelationshipInfo::to_many_through::<Patient>("unique_patients", "appointments")
                .source("patient")
                .distinct(true),
        ];
        RELATIONSHIPS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![("name", self.name.clone().into())]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            name: row.decode("name")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Appointment {
    pub physician_id: Option<i64>,
    pub patient_id: Option<i64>,
}

impl Model for Appointment {
    const TABLE_NAME: &'static str = "appointments";

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::id(),
            FieldInfo::new("physician_id", SqlType::Integer)
                .nullable(true)
                .foreign_key("physicians.id"),
            FieldInfo::new("patient_id", SqlType::Integer)
                .nullable(true)
                .foreign_key("patients.id"),
        ];
        FIELDS
    }

    fn relationships() -> &'static [RelationshipInfo] {
        static RELATIONSHIPS: &[RelationshipInfo] = &[
            RelationshipInfo::to_one::<Physician>("physician", "physician_id"),
            RelationshipInfo::to_one::<Patient>("patient", "patient_id"),
        ];
        RELATIONSHIPS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("physician_id", self.physician_id.into()),
            ("patient_id", self.patient_id.into()),
        ]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            physician_id: row.decode("physician_id")?,
            patient_id: row.decode("patient_id")?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patient {
    pub name: Option<String>,
}

impl Model for Patient {
    const TABLE_NAME: &'static str = "patients";

    fn fields() -> &'static [FieldInfo] {
        static FIELDS: &[FieldInfo] = &[
            FieldInfo::id(),
            FieldInfo::new("name", SqlType::String).nullable(true),
        ];
        FIELDS
    }

    fn relationships() -> &'static [RelationshipInfo] {
        static RELATIONSHIPS: &[RelationshipInfo] = &[
            RelationshipInfo::to_many::<Appointment>("appointments", "patient_id"),
            RelationshipInfo::to_many_through::<Physician>("physicians", "appointments")
                .source("physician"),
        ];
        RELATIONSHIPS
    }

    fn to_row(&self) -> Vec<(&'static str, Value)> {
        vec![("name", self.name.clone().into())]
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            name: row.decode("name")?,
        })
    }
}

pub fn schema() -> SchemaBuilder {
    SchemaBuilder::new()
        .create_table::<User>()
        .create_table::<Post>()
        .create_table::<Physician>()
        .create_table::<Patient>()
        .create_table::<Appointment>()
}

pub fn session() -> Session<SqliteConnection> {
    let conn = SqliteConnection::open_memory().expect("open memory db");
    schema().apply(&conn).expect("create tables");
    Session::new(conn)
}

/// Ten users, each with ten posts. Post `n` (1-based id) has caption
/// `caption {n - 1}`.
pub fn seed_blog(session: &mut Session<SqliteConnection>) {
    for i in 0..10 {
        let mut user = Record::new(User::named(&format!("user {i}")));
        for j in 0..10 {
            let n = i * 10 + j;
            user.build(
                "posts",
                Post {
                    name: Some(format!("post {n}")),
                    caption: Some(format!("caption {n}")),
                    user_id: None,
                },
            )
            .expect("build post");
        }
        session.save_strict(&mut user).expect("save user");
    }
}

/// Physician 1 sees ann, bob and ann again; physician 2 sees bob.
pub fn seed_clinic(session: &mut Session<SqliteConnection>) -> Vec<Record<Physician>> {
    let physicians: Vec<_> = ["physician 1", "physician 2"]
        .into_iter()
        .map(|name| {
            session
                .create_strict(Physician {
                    name: Some(name.to_string()),
                })
                .expect("create physician")
        })
        .collect();
    for name in ["ann", "bob"] {
        session
            .create_strict(Patient {
                name: Some(name.to_string()),
            })
            .expect("create patient");
    }
    for (physician_id, patient_id) in [(1, 1), (1, 2), (1, 1), (2, 2)] {
        session
            .create_strict(Appointment {
                physician_id: Some(physician_id),
                patient_id: Some(patient_id),
            })
            .expect("create appointment");
    }
    physicians
}

//! Session and Unit of Work for rowmodel.
//!
//! A [`Session`] owns one connection and is the entry point for validated
//! persistence. Every save runs inside a transaction scope, so a failing child
//! insert also undoes the owner's insert.
//!
//! # Design Philosophy
//!
//! - **Explicit connection**: the session is handed its connection; nothing
//!   is global
//! - **Scoped transactions**: nested scopes join the outer unit unless
//!   [`Propagation::RequiresNew`] asks for a savepoint
//! - **Fail closed**: once a nested scope rolls the unit back, writes fail until
//!   the outer scope ends
//!
//! # Example
//!
//! ```ignore
//! let mut session = Session::new(SqliteConnection::open_memory()?);
//!
//! let mut user = Record::new(User::named("ann"));
//! user.build("posts", Post::named("hello"))?;
//! session.save_strict(&mut user)?;
//!
//! session.transaction(|s| {
//!     s.create_strict(User::named("bob"))?;
//!     s.create_strict(User::default()) // invalid: the unit rolls back
//! })?;
//! ```

pub mod n1_detection;
mod shared;
pub mod transaction;

pub use n1_detection::{N1QueryTracker, N1Stats};
pub use shared::SharedSession;
pub use transaction::{Propagation, TransactionState};

use std::cell::RefCell;

use rowmodel_core::{
    Connection, Error, Executor, LoadOrigin, Model, RecordInvalid, Result, Row, ScopeTicket,
    Value,
};
use rowmodel_query::{Query, Record, persist};
use serde::Serialize;

use crate::transaction::Frame;

// ============================================================================
// Session Configuration
// ============================================================================

/// Configuration for Session behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Count lazy association loads and warn on N+1 patterns.
    pub detect_n1: bool,
    /// Lazy loads per association before warning.
    pub n1_threshold: usize,
    /// Prefix for savepoints opened by [`Propagation::RequiresNew`].
    pub savepoint_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            detect_n1: true,
            n1_threshold: 3,
            savepoint_prefix: "rowmodel_sp_".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn detect_n1(mut self, enabled: bool) -> Self {
        self.detect_n1 = enabled;
        self
    }

    pub fn n1_threshold(mut self, threshold: usize) -> Self {
        self.n1_threshold = threshold;
        self
    }

    pub fn savepoint_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.savepoint_prefix = prefix.into();
        self
    }
}

// ============================================================================
// Session
// ============================================================================

/// The unit-of-work coordinator over one connection.
///
/// A session is itself an [`Executor`], so queries and association loads can
/// run through it; writes issued through it are refused while the current
/// unit is aborted.
#[derive(Debug)]
pub struct Session<C: Connection> {
    conn: C,
    config: SessionConfig,
    pub(crate) state: TransactionState,
    pub(crate) frames: Vec<Frame>,
    /// Tickets of the open root and savepoint scopes, outermost first.
    pub(crate) tickets: Vec<ScopeTicket>,
    pub(crate) aborted: Option<String>,
    pub(crate) savepoint_seq: u64,
    pub(crate) n1: RefCell<N1QueryTracker>,
}

impl<C: Connection> Session<C> {
    pub fn new(conn: C) -> Self {
        Self::with_config(conn, SessionConfig::default())
    }

    pub fn with_config(conn: C, config: SessionConfig) -> Self {
        let mut tracker = N1QueryTracker::new().with_threshold(config.n1_threshold);
        if !config.detect_n1 {
            tracker.disable();
        }
        Self {
            conn,
            config,
            state: TransactionState::Idle,
            frames: Vec::new(),
            tickets: Vec::new(),
            aborted: None,
            savepoint_seq: 0,
            n1: RefCell::new(tracker),
        }
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Give the connection back. An open transaction is left to the
    /// connection; SQLite rolls it back when the connection closes.
    pub fn into_connection(self) -> C {
        self.conn
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Validate and save `record` with its built children.
    ///
    /// Returns `Ok(false)` and leaves the record unsaved when any record in the
    /// tree is invalid. Writes happen in one transaction scope.
    #[tracing::instrument(level = "debug", skip(self, record), fields(table = M::TABLE_NAME))]
    pub fn save<M: Model>(&mut self, record: &mut Record<M>) -> Result<bool> {
        if !record.validate() {
            tracing::debug!(errors = %record.errors(), "Validation failed");
            return Ok(false);
        }
        self.transaction(|s| persist::persist_tree(&*s, record))?;
        Ok(true)
    }

    /// Like [`save`](Self::save), but invalid records are an
    /// [`Error::RecordInvalid`].
    pub fn save_strict<M: Model>(&mut self, record: &mut Record<M>) -> Result<()> {
        if self.save(record)? {
            Ok(())
        } else {
            Err(RecordInvalid::new(M::TABLE_NAME, record.errors().clone()).into())
        }
    }

    /// Save a new record. Check [`Record::is_persisted`] or its errors to see
    /// whether it was valid.
    pub fn create<M: Model>(&mut self, model: M) -> Result<Record<M>> {
        let mut record = Record::new(model);
        self.save(&mut record)?;
        Ok(record)
    }

    pub fn create_strict<M: Model>(&mut self, model: M) -> Result<Record<M>> {
        let mut record = Record::new(model);
        self.save_strict(&mut record)?;
        Ok(record)
    }

    /// Create a child on a to-many association of a saved owner
    /// (`user.posts.create(...)`).
    pub fn create_child<O: Model, T: Model>(
        &mut self,
        owner: &Record<O>,
        name: &str,
        model: T,
    ) -> Result<Record<T>> {
        let mut child = owner.new_child(name, model)?;
        self.save(&mut child)?;
        Ok(child)
    }

    /// Delete a saved record.
    #[tracing::instrument(level = "debug", skip(self, record), fields(table = M::TABLE_NAME))]
    pub fn destroy<M: Model>(&mut self, record: &mut Record<M>) -> Result<()> {
        self.transaction(|s| persist::destroy(&*s, record))
    }

    /// Delete every row of `M`.
    pub fn delete_all<M: Model>(&mut self) -> Result<u64> {
        Query::<M>::new().delete_all(&*self)
    }

    /// Look up a record by key; [`Error::NotFound`] when missing.
    pub fn find<M: Model>(&self, id: i64) -> Result<Record<M>> {
        Query::<M>::new().find(self, id)
    }

    /// A fresh query over `M`, to be run against this session.
    pub fn query<M: Model>(&self) -> Query<M> {
        Query::new()
    }

    // ========================================================================
    // Debug Diagnostics
    // ========================================================================

    pub fn n1_stats(&self) -> N1Stats {
        self.n1.borrow().stats()
    }

    /// Lazy loads of `relation` on `owner` records in the current unit.
    pub fn lazy_load_count(&self, owner: &str, relation: &str) -> usize {
        self.n1.borrow().count_for(owner, relation)
    }

    pub fn reset_n1(&self) {
        self.n1.borrow_mut().reset();
    }

    pub fn debug_state(&self) -> SessionDebugInfo {
        SessionDebugInfo {
            state: self.state,
            depth: self.frames.len(),
            aborted: self.aborted.is_some(),
            n1: self.n1_stats(),
        }
    }
}

impl<C: Connection> Executor for Session<C> {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.conn.query(sql, params)
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.ensure_not_aborted()?;
        self.conn.execute(sql, params)
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64> {
        self.ensure_not_aborted()?;
        self.conn.insert(sql, params)
    }

    fn on_lazy_load(&self, origin: LoadOrigin) {
        self.n1
            .borrow_mut()
            .record_load(origin.owner, origin.relation);
    }

    fn scope_ticket(&self) -> Option<ScopeTicket> {
        self.current_ticket()
    }
}

/// Debug information about session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionDebugInfo {
    pub state: TransactionState,
    /// Open transaction scopes.
    pub depth: usize,
    /// Whether a nested scope aborted the current unit.
    pub aborted: bool,
    pub n1: N1Stats,
}

impl SessionDebugInfo {
    /// Pretty JSON, for logs and bug reports.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidState(e.to_string()))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rowmodel_core::{FieldInfo, RelationshipInfo, Rule, SqlType};
    use rowmodel_schema::SchemaBuilder;
    use rowmodel_sqlite::SqliteConnection;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Author {
        name: Option<String>,
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Book {
        title: Option<String>,
        author_id: Option<i64>,
    }

    impl Model for Author {
        const TABLE_NAME: &'static str = "authors";

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: &[FieldInfo] = &[
                FieldInfo::id(),
                FieldInfo::new("name", SqlType::String).nullable(true),
            ];
            FIELDS
        }

        fn relationships() -> &'static [RelationshipInfo] {
            static RELATIONSHIPS: &[RelationshipInfo] =
                &[RelationshipInfo::to_many::<Book>("books", "author_id")];
            RELATIONSHIPS
        }

        fn validations() -> &'static [Rule<Self>] {
            static RULES: &[Rule<Author>] = &[Rule::presence("name")];
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

    impl Model for Book {
        const TABLE_NAME: &'static str = "books";

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: &[FieldInfo] = &[
                FieldInfo::id(),
                FieldInfo::new("title", SqlType::String).nullable(true),
                FieldInfo::new("author_id", SqlType::Integer)
                    .nullable(true)
                    .foreign_key("authors.id"),
            ];
            FIELDS
        }

        fn relationships() -> &'static [RelationshipInfo] {
            static RELATIONSHIPS: &[RelationshipInfo] =
                &[RelationshipInfo::to_one::<Author>("author", "author_id")];
            RELATIONSHIPS
        }

        fn validations() -> &'static [Rule<Self>] {
            static RULES: &[Rule<Book>] = &[Rule::presence("title")];
            RULES
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            vec![
                ("title", self.title.clone().into()),
                ("author_id", self.author_id.into()),
            ]
        }

        fn from_row(row: &Row) -> Result<Self> {
            Ok(Self {
                title: row.decode("title")?,
                author_id: row.decode("author_id")?,
            })
        }
    }

    fn author(name: &str) -> Author {
        Author {
            name: Some(name.to_string()),
        }
    }

    fn book(title: &str) -> Book {
        Book {
            title: Some(title.to_string()),
            author_id: None,
        }
    }

    fn session_with(config: SessionConfig) -> Session<SqliteConnection> {
        let conn = SqliteConnection::open_memory().unwrap();
        SchemaBuilder::new()
            .create_table::<Author>()
            .create_table::<Book>()
            .apply(&conn)
            .unwrap();
        Session::with_config(conn, config)
    }

    fn session() -> Session<SqliteConnection> {
        session_with(SessionConfig::default())
    }

    #[test]
    fn test_session_config_defaults() {
        let config = SessionConfig::default();
        assert!(config.detect_n1);
        assert_eq!(config.n1_threshold, 3);
        assert_eq!(config.savepoint_prefix, "rowmodel_sp_");
    }

    #[test]
    fn test_save_cascades_children_in_one_unit() {
        let mut session = session();
        let mut ann = Record::new(author("ann"));
        ann.build("books", book("one")).unwrap();
        ann.build("books", book("two")).unwrap();

        assert!(session.save(&mut ann).unwrap());
        assert_eq!(session.state(), TransactionState::Committed);
        let books = ann.association::<Book>("books").unwrap();
        assert_eq!(books.count(&session).unwrap(), 2);
    }

    #[test]
    fn test_invalid_child_blocks_whole_tree() {
        let mut session = session();
        let mut ann = Record::new(author("ann"));
        ann.build("books", Book::default()).unwrap();

        assert!(!session.save(&mut ann).unwrap());
        assert!(ann.is_new_record());
        assert_eq!(ann.errors().get("books"), ["is invalid"]);
        assert_eq!(session.query::<Author>().count(&session).unwrap(), 0);
        assert_eq!(session.state(), TransactionState::Idle);
    }

    #[test]
    fn test_create_strict_reports_errors() {
        let mut session = session();
        let err = session.create_strict(Author::default()).unwrap_err();
        assert_eq!(
            err.validation_errors().unwrap().full_messages(),
            vec!["Name can't be blank".to_string()]
        );

        let lenient = session.create(Author::default()).unwrap();
        assert!(lenient.is_new_record());
        assert!(!lenient.errors().is_empty());
    }

    #[test]
    fn test_create_child_sets_foreign_key() {
        let mut session = session();
        let ann = session.create_strict(author("ann")).unwrap();
        let book = session.create_child(&ann, "books", book("one")).unwrap();
        assert!(book.is_persisted());
        assert_eq!(book.author_id, ann.id());
        let owner = book.load_one::<Author, _>(&session, "author").unwrap();
        assert_eq!(owner.map(|a| a.id()), Some(ann.id()));
    }

    #[test]
    fn test_find_and_destroy() {
        let mut session = session();
        let ann = session.create_strict(author("ann")).unwrap();
        let id = ann.id().unwrap();
        let mut found = session.find::<Author>(id).unwrap();
        assert_eq!(found.name.as_deref(), Some("ann"));

        session.destroy(&mut found).unwrap();
        assert!(found.is_destroyed());
        assert!(session.find::<Author>(id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_atomic_unit_rolls_back_earlier_writes() {
        let mut session = session();
        let result = session.transaction(|s| {
            s.create_strict(author("ann"))?;
            s.create_strict(Author::default())
        });
        assert!(matches!(result, Err(Error::RecordInvalid(_))));
        assert_eq!(session.query::<Author>().count(&session).unwrap(), 0);
        assert_eq!(session.state(), TransactionState::RolledBack);
    }

    #[test]
    fn test_requires_new_keeps_outer_writes() {
        let mut session = session();
        session
            .transaction(|s| {
                s.create_strict(author("outer"))?;
                let inner = s.transaction_with(Propagation::RequiresNew, |s| {
                    s.create_strict(author("inner"))?;
                    s.create_strict(Author::default())
                });
                assert!(inner.is_err());
                Ok(())
            })
            .unwrap();

        let names: Vec<String> = session
            .query::<Author>()
            .pluck(&session, "name")
            .unwrap();
        assert_eq!(names, vec!["outer".to_string()]);
    }

    #[test]
    fn test_delete_all() {
        let mut session = session();
        for name in ["a", "b", "c"] {
            session.create_strict(author(name)).unwrap();
        }
        assert_eq!(session.delete_all::<Author>().unwrap(), 3);
        assert!(!session.query::<Author>().exists(&session).unwrap());
    }

    #[test]
    fn test_lazy_loads_are_counted() {
        let mut session = session_with(SessionConfig::default().n1_threshold(2));
        let ann = session.create_strict(author("ann")).unwrap();
        for title in ["one", "two", "three"] {
            session.create_child(&ann, "books", book(title)).unwrap();
        }

        let books = session.query::<Book>().all(&session).unwrap();
        for book in &books {
            book.load_one::<Author, _>(&session, "author").unwrap();
        }
        assert_eq!(session.lazy_load_count("books", "author"), 3);
        assert_eq!(session.n1_stats().potential_n1, 1);

        let eager = session
            .query::<Book>()
            .includes("author")
            .all(&session)
            .unwrap();
        session.reset_n1();
        for book in &eager {
            book.load_one::<Author, _>(&session, "author").unwrap();
        }
        assert_eq!(session.lazy_load_count("books", "author"), 0);
    }

    #[test]
    fn test_detection_can_be_disabled() {
        let mut session = session_with(SessionConfig::default().detect_n1(false));
        let ann = session.create_strict(author("ann")).unwrap();
        ann.association::<Book>("books")
            .unwrap()
            .all(&session)
            .unwrap();
        assert_eq!(session.n1_stats().total_loads, 0);
    }

    #[test]
    fn test_debug_state_json() {
        let mut session = session();
        session.begin().unwrap();
        let info = session.debug_state();
        assert_eq!(info.depth, 1);
        assert_eq!(info.state, TransactionState::Active);
        let json = info.to_json().unwrap();
        assert!(json.contains("\"state\": \"active\""));
        session.rollback().unwrap();
    }
}

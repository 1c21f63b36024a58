//! Database backend abstraction.
//!
//! The benchmark only needs three statements against one table, so a
//! backend is modeled as a session factory plus a table-setup hook, and a
//! session as something that can execute those statements and commit.

use std::sync::Arc;

use connpool::ConnectionFactory;

use crate::error::BackendError;

/// Name of the benchmark table.
pub const TABLE_NAME: &str = "benchmark_table";

/// DDL that recreates the benchmark table.
pub const CREATE_TABLE_SQL: &str = "\
DROP TABLE IF EXISTS benchmark_table;
CREATE TABLE benchmark_table (
    id SERIAL PRIMARY KEY,
    data TEXT
);";

/// Payload written by the insert workload.
pub const INSERT_DATA: &str = "Test data";

/// Payload written by the update workload.
pub const UPDATE_DATA: &str = "Updated data";

/// A statement issued by a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statement<'a> {
    /// Insert one row with the given payload.
    Insert {
        /// Row payload.
        data: &'a str,
    },
    /// Overwrite the payload of one row.
    Update {
        /// Row id.
        id: i32,
        /// New payload.
        data: &'a str,
    },
    /// Fetch one row by id.
    Select {
        /// Row id.
        id: i32,
    },
}

impl Statement<'_> {
    /// Parameterized SQL text for the statement.
    #[must_use]
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "INSERT INTO benchmark_table (data) VALUES ($1)",
            Self::Update { .. } => "UPDATE benchmark_table SET data = $2 WHERE id = $1",
            Self::Select { .. } => "SELECT id, data FROM benchmark_table WHERE id = $1",
        }
    }
}

/// A row of the benchmark table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Primary key.
    pub id: i32,
    /// Payload.
    pub data: String,
}

/// An open database session.
pub trait Session {
    /// Execute a write statement, returning the number of affected rows.
    ///
    /// Writes are transactional: they become visible on [`commit`](Self::commit).
    fn execute(&mut self, stmt: &Statement<'_>) -> Result<u64, BackendError>;

    /// Execute a read statement returning at most one row.
    fn query_one(&mut self, stmt: &Statement<'_>) -> Result<Option<Row>, BackendError>;

    /// Commit pending writes.
    fn commit(&mut self) -> Result<(), BackendError>;

    /// Discard pending writes.
    fn rollback(&mut self) -> Result<(), BackendError>;
}

/// A database the benchmark can run against.
pub trait Backend: Send + Sync + 'static {
    /// Session type opened by this backend.
    type Session: Session + Send + 'static;

    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Open a new session.
    fn connect(&self) -> Result<Self::Session, BackendError>;

    /// Drop and recreate the benchmark table.
    fn prepare_table(&self) -> Result<(), BackendError>;
}

/// Adapts a [`Backend`] into a pool [`ConnectionFactory`].
///
/// Reset rolls back any uncommitted work left on the session.
#[derive(Debug)]
pub struct SessionFactory<B> {
    backend: Arc<B>,
}

impl<B: Backend> SessionFactory<B> {
    /// Wrap a shared backend.
    #[must_use]
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// The underlying backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B> Clone for SessionFactory<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: Backend> ConnectionFactory for SessionFactory<B> {
    type Connection = B::Session;
    type Error = BackendError;

    fn create(&self) -> Result<B::Session, BackendError> {
        self.backend.connect()
    }

    fn reset(&self, conn: &mut B::Session) -> Result<(), BackendError> {
        conn.rollback()
    }

    fn destroy(&self, conn: B::Session) {
        tracing::trace!(backend = self.backend.name(), "closing session");
        drop(conn);
    }
}

//! In-process backend with simulated latency.
//!
//! Stands in for a database server when none is available. Opening a
//! session sleeps for `connect_latency` and every statement for
//! `statement_latency`, so the cost a pool saves is visible in the results.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::backend::{Backend, Row, Session, Statement};
use crate::error::BackendError;

#[derive(Debug, Default)]
struct MemoryTable {
    rows: BTreeMap<i32, String>,
    last_id: i32,
}

#[derive(Debug, Default)]
struct Counters {
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    statements: AtomicU64,
    commits: AtomicU64,
}

/// Snapshot of a [`MemoryBackend`]'s activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    /// Sessions opened.
    pub sessions_opened: u64,
    /// Sessions closed.
    pub sessions_closed: u64,
    /// Statements executed.
    pub statements: u64,
    /// Commits performed.
    pub commits: u64,
}

/// In-memory benchmark backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    table: Arc<Mutex<MemoryTable>>,
    counters: Arc<Counters>,
    connect_latency: Duration,
    statement_latency: Duration,
}

impl MemoryBackend {
    /// Create a backend with no simulated latency.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the simulated cost of opening a session.
    #[must_use]
    pub fn connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = latency;
        self
    }

    /// Set the simulated round trip of every statement.
    #[must_use]
    pub fn statement_latency(mut self, latency: Duration) -> Self {
        self.statement_latency = latency;
        self
    }

    /// Current activity counters.
    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            sessions_opened: self.counters.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: self.counters.sessions_closed.load(Ordering::Relaxed),
            statements: self.counters.statements.load(Ordering::Relaxed),
            commits: self.counters.commits.load(Ordering::Relaxed),
        }
    }

    /// Number of committed rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.table.lock().rows.len()
    }

    /// Committed payload of one row.
    #[must_use]
    pub fn row(&self, id: i32) -> Option<String> {
        self.table.lock().rows.get(&id).cloned()
    }
}

impl Backend for MemoryBackend {
    type Session = MemorySession;

    fn name(&self) -> &'static str {
        "memory"
    }

    fn connect(&self) -> Result<MemorySession, BackendError> {
        if !self.connect_latency.is_zero() {
            thread::sleep(self.connect_latency);
        }
        self.counters.sessions_opened.fetch_add(1, Ordering::Relaxed);
        Ok(MemorySession {
            table: Arc::clone(&self.table),
            counters: Arc::clone(&self.counters),
            statement_latency: self.statement_latency,
            pending: Vec::new(),
        })
    }

    fn prepare_table(&self) -> Result<(), BackendError> {
        let mut table = self.table.lock();
        table.rows.clear();
        table.last_id = 0;
        tracing::debug!("memory table recreated");
        Ok(())
    }
}

#[derive(Debug)]
enum PendingWrite {
    Insert(String),
    Update(i32, String),
}

/// Session on a [`MemoryBackend`].
///
/// Writes are buffered until commit and discarded on rollback or close.
#[derive(Debug)]
pub struct MemorySession {
    table: Arc<Mutex<MemoryTable>>,
    counters: Arc<Counters>,
    statement_latency: Duration,
    pending: Vec<PendingWrite>,
}

impl MemorySession {
    fn round_trip(&self) {
        if !self.statement_latency.is_zero() {
            thread::sleep(self.statement_latency);
        }
        self.counters.statements.fetch_add(1, Ordering::Relaxed);
    }
}

impl Session for MemorySession {
    fn execute(&mut self, stmt: &Statement<'_>) -> Result<u64, BackendError> {
        self.round_trip();
        match *stmt {
            Statement::Insert { data } => {
                self.pending.push(PendingWrite::Insert(data.to_owned()));
                Ok(1)
            }
            Statement::Update { id, data } => {
                let exists = self.table.lock().rows.contains_key(&id);
                if exists {
                    self.pending.push(PendingWrite::Update(id, data.to_owned()));
                }
                Ok(u64::from(exists))
            }
            Statement::Select { .. } => Err(BackendError::Statement(
                "SELECT must be issued with query_one".into(),
            )),
        }
    }

    fn query_one(&mut self, stmt: &Statement<'_>) -> Result<Option<Row>, BackendError> {
        self.round_trip();
        let Statement::Select { id } = *stmt else {
            return Err(BackendError::Statement(format!(
                "query_one expects a SELECT, got: {}",
                stmt.sql()
            )));
        };
        Ok(self
            .table
            .lock()
            .rows
            .get(&id)
            .map(|data| Row { id, data: data.clone() }))
    }

    fn commit(&mut self) -> Result<(), BackendError> {
        self.round_trip();
        let mut table = self.table.lock();
        for write in self.pending.drain(..) {
            match write {
                PendingWrite::Insert(data) => {
                    table.last_id += 1;
                    let id = table.last_id;
                    table.rows.insert(id, data);
                }
                PendingWrite::Update(id, data) => {
                    if let Some(row) = table.rows.get_mut(&id) {
                        *row = data;
                    }
                }
            }
        }
        self.counters.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), BackendError> {
        self.pending.clear();
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.counters.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_visible_after_commit() {
        let backend = MemoryBackend::new();
        let mut session = backend.connect().unwrap();

        session.execute(&Statement::Insert { data: "a" }).unwrap();
        session.execute(&Statement::Insert { data: "b" }).unwrap();
        assert_eq!(backend.row_count(), 0);

        session.commit().unwrap();
        assert_eq!(backend.row_count(), 2);
        assert_eq!(
            session.query_one(&Statement::Select { id: 2 }).unwrap(),
            Some(Row {
                id: 2,
                data: "b".into()
            })
        );
    }

    #[test]
    fn test_rollback_discards_writes() {
        let backend = MemoryBackend::new();
        let mut session = backend.connect().unwrap();
        session.execute(&Statement::Insert { data: "a" }).unwrap();
        session.rollback().unwrap();
        session.commit().unwrap();
        assert_eq!(backend.row_count(), 0);
    }

    #[test]
    fn test_update_missing_row_affects_nothing() {
        let backend = MemoryBackend::new();
        let mut session = backend.connect().unwrap();
        let affected = session
            .execute(&Statement::Update { id: 7, data: "x" })
            .unwrap();
        assert_eq!(affected, 0);
    }

    #[test]
    fn test_update_existing_row() {
        let backend = MemoryBackend::new();
        let mut session = backend.connect().unwrap();
        session.execute(&Statement::Insert { data: "old" }).unwrap();
        session.commit().unwrap();

        let affected = session
            .execute(&Statement::Update { id: 1, data: "new" })
            .unwrap();
        assert_eq!(affected, 1);
        session.commit().unwrap();
        assert_eq!(backend.row(1).as_deref(), Some("new"));
    }

    #[test]
    fn test_prepare_table_resets_ids() {
        let backend = MemoryBackend::new();
        let mut session = backend.connect().unwrap();
        session.execute(&Statement::Insert { data: "a" }).unwrap();
        session.commit().unwrap();

        backend.prepare_table().unwrap();
        session.execute(&Statement::Insert { data: "b" }).unwrap();
        session.commit().unwrap();
        assert_eq!(backend.row(1).as_deref(), Some("b"));
    }

    #[test]
    fn test_select_through_execute_rejected() {
        let backend = MemoryBackend::new();
        let mut session = backend.connect().unwrap();
        assert!(session.execute(&Statement::Select { id: 1 }).is_err());
        assert!(session.query_one(&Statement::Insert { data: "a" }).is_err());
    }

    #[test]
    fn test_session_counters() {
        let backend = MemoryBackend::new();
        {
            let mut session = backend.connect().unwrap();
            session.execute(&Statement::Insert { data: "a" }).unwrap();
            session.commit().unwrap();
        }
        let stats = backend.stats();
        assert_eq!(stats.sessions_opened, 1);
        assert_eq!(stats.sessions_closed, 1);
        assert_eq!(stats.statements, 2);
        assert_eq!(stats.commits, 1);
    }
}

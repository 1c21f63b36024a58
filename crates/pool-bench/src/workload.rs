//! Concurrent insert/update/read workloads.
//!
//! A workload runs a fixed number of worker threads. Each worker checks out
//! one connection, issues `records` statements on it, commits if it wrote
//! anything, and checks the connection back in.

use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use connpool::{Pool, PoolConfig};
use serde::Serialize;

use crate::backend::{Backend, INSERT_DATA, Session, SessionFactory, Statement, UPDATE_DATA};
use crate::error::BenchError;

/// A benchmarked workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Insert `records` rows per worker.
    Insert,
    /// Update rows `1..=records` per worker.
    Update,
    /// Read rows `1..=records` per worker.
    Read,
}

impl Operation {
    /// Every operation, in benchmark order.
    pub const ALL: [Operation; 3] = [Operation::Insert, Operation::Update, Operation::Read];

    /// Lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Read => "read",
        }
    }

    /// Capitalized name for report titles.
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            Self::Insert => "Insert",
            Self::Update => "Update",
            Self::Read => "Read",
        }
    }

    /// Whether the workload writes and therefore commits.
    #[must_use]
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Read)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "read" | "select" => Ok(Self::Read),
            other => Err(BenchError::Config(format!("unknown operation: {other}"))),
        }
    }
}

/// How workers obtain connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// All workers share one pool.
    Pooling,
    /// Every worker opens and closes its own connection.
    NoPooling,
}

impl Scenario {
    /// Both scenarios, in benchmark order.
    pub const ALL: [Scenario; 2] = [Scenario::Pooling, Scenario::NoPooling];

    /// Name used in reports.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pooling => "pooling",
            Self::NoPooling => "no_pooling",
        }
    }

    /// Capitalized name for report headers.
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            Self::Pooling => "Pooling",
            Self::NoPooling => "No pooling",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where workers get their connections from.
///
/// Both variants hand workers a [`Pool`]: the pooled source shares one, the
/// unpooled source builds a private single-connection pool per worker and
/// shuts it down when the worker is done.
#[derive(Debug)]
pub enum ConnectionSource<B: Backend> {
    /// One pool shared by every worker.
    Shared(Pool<SessionFactory<B>>),
    /// A fresh pool per worker.
    PerWorker {
        /// Factory for worker pools.
        factory: SessionFactory<B>,
        /// Configuration of each worker pool.
        config: PoolConfig,
    },
}

impl<B: Backend> ConnectionSource<B> {
    /// A shared pool built from `config`.
    pub fn pooled(factory: SessionFactory<B>, config: PoolConfig) -> Result<Self, BenchError> {
        Ok(Self::Shared(Pool::with_config(config, factory)?))
    }

    /// One private connection per worker.
    #[must_use]
    pub fn unpooled(factory: SessionFactory<B>) -> Self {
        Self::PerWorker {
            factory,
            config: PoolConfig::fixed(1),
        }
    }

    /// The scenario this source represents.
    #[must_use]
    pub fn scenario(&self) -> Scenario {
        match self {
            Self::Shared(_) => Scenario::Pooling,
            Self::PerWorker { .. } => Scenario::NoPooling,
        }
    }

    /// Shut down the shared pool, if any.
    pub fn close(self) {
        if let Self::Shared(pool) = self {
            pool.shutdown();
        }
    }

    fn worker_pool(&self) -> Result<Pool<SessionFactory<B>>, BenchError> {
        match self {
            Self::Shared(pool) => Ok(pool.clone()),
            Self::PerWorker { factory, config } => {
                Ok(Pool::with_config(config.clone(), factory.clone())?)
            }
        }
    }

    fn finish_worker(&self, pool: Pool<SessionFactory<B>>) {
        if let Self::PerWorker { .. } = self {
            pool.shutdown();
        }
    }
}

/// Result of one workload run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkloadOutcome {
    /// Wall-clock time from first spawn to last join.
    pub elapsed: Duration,
    /// Rows written or found, summed over workers.
    pub rows: u64,
}

/// Run `operation` on `threads` concurrent workers.
///
/// Every worker is joined before returning. The first worker error is
/// returned; a panicking worker yields [`BenchError::WorkerPanicked`].
pub fn run_workload<B: Backend>(
    source: &ConnectionSource<B>,
    operation: Operation,
    threads: usize,
    records: u32,
) -> Result<WorkloadOutcome, BenchError> {
    let start = Instant::now();

    let rows = thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|_| scope.spawn(move || run_worker(source, operation, records)))
            .collect();

        let mut rows = 0;
        let mut first_error = None;
        for handle in handles {
            match handle.join() {
                Ok(Ok(n)) => rows += n,
                Ok(Err(err)) => {
                    first_error.get_or_insert(err);
                }
                Err(_) => {
                    first_error.get_or_insert(BenchError::WorkerPanicked);
                }
            }
        }
        first_error.map_or(Ok(rows), Err)
    })?;

    let outcome = WorkloadOutcome {
        elapsed: start.elapsed(),
        rows,
    };
    tracing::debug!(
        operation = %operation,
        scenario = %source.scenario(),
        threads,
        records,
        rows,
        elapsed = ?outcome.elapsed,
        "workload finished"
    );
    Ok(outcome)
}

fn run_worker<B: Backend>(
    source: &ConnectionSource<B>,
    operation: Operation,
    records: u32,
) -> Result<u64, BenchError> {
    let pool = source.worker_pool()?;
    let mut conn = pool.acquire()?;
    let last_id = i32::try_from(records)
        .map_err(|_| BenchError::Config(format!("too many records: {records}")))?;

    let mut rows = 0;
    match operation {
        Operation::Insert => {
            for _ in 0..records {
                rows += conn.execute(&Statement::Insert { data: INSERT_DATA })?;
            }
        }
        Operation::Update => {
            for id in 1..=last_id {
                rows += conn.execute(&Statement::Update {
                    id,
                    data: UPDATE_DATA,
                })?;
            }
        }
        Operation::Read => {
            for id in 1..=last_id {
                if conn.query_one(&Statement::Select { id })?.is_some() {
                    rows += 1;
                }
            }
        }
    }
    if operation.is_write() {
        conn.commit()?;
    }

    pool.release(conn)?;
    source.finish_worker(pool);
    Ok(rows)
}

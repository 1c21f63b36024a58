//! Error types for the benchmark harness.

use connpool::PoolError;
use thiserror::Error;

/// Errors raised by a database backend.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    /// Opening a session failed.
    #[error("connection failed: {0}")]
    Connect(String),

    /// A statement was rejected.
    #[error("statement failed: {0}")]
    Statement(String),

    /// Error from the PostgreSQL driver.
    #[cfg(feature = "postgres")]
    #[error("postgres error: {0}")]
    Postgres(#[from] ::postgres::Error),
}

/// Errors that can occur while running a benchmark.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BenchError {
    /// Connection pool error.
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    /// Backend error.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Benchmark configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A worker thread panicked.
    #[error("worker thread panicked")]
    WorkerPanicked,

    /// Writing a report failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding failed.
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV encoding failed.
    #[error("CSV encoding error: {0}")]
    Csv(#[from] csv::Error),
}

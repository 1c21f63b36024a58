//! # pool-bench
//!
//! Measures the throughput of pooled vs. unpooled database connections
//! under concurrent insert, update and read workloads.
//!
//! Both scenarios go through [`connpool::Pool`]: the pooled run shares one
//! pool across all workers, the unpooled run gives every worker a private
//! single-connection pool that is opened and closed around its workload.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pool_bench::{BenchConfig, Benchmark, BenchmarkResults, MemoryBackend, report};
//!
//! let config = BenchConfig::default().pool_sizes(vec![5, 10]);
//! let bench = Benchmark::new(MemoryBackend::new(), config)?;
//!
//! let mut results = BenchmarkResults::new(bench.backend_name(), bench.config());
//! bench.run(&mut results)?;
//!
//! println!("{}", report::render_table(&results));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod backend;
pub mod config;
pub mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod pg;
pub mod report;
pub mod results;
pub mod runner;
pub mod workload;

pub use backend::{Backend, Row, Session, SessionFactory, Statement};
pub use config::{BenchConfig, DbConfig};
pub use error::{BackendError, BenchError};
pub use memory::MemoryBackend;
#[cfg(feature = "postgres")]
pub use pg::PostgresBackend;
pub use results::{BenchmarkResults, Measurement};
pub use runner::Benchmark;
pub use workload::{ConnectionSource, Operation, Scenario, WorkloadOutcome, run_workload};

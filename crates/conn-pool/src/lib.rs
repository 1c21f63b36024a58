//! # connpool
//!
//! Fixed-capacity blocking connection pool.
//!
//! The pool owns a bounded set of reusable connections and loans them to
//! concurrent callers one at a time. Callers block while the pool is
//! exhausted and are woken in (best-effort) arrival order as connections
//! are checked back in.
//!
//! ## Features
//!
//! - Eager creation at construction, optional lazy fill up to capacity
//! - Round-robin reuse: check-in pushes to the back of the idle queue,
//!   checkout pops the front
//! - Bounded waits via [`Pool::acquire_timeout`]
//! - RAII return on drop, or explicit [`Pool::release`]
//! - Graceful [`Pool::shutdown`] that waits for outstanding loans
//! - Optional reset hook on check-in
//!
//! ## Example
//!
//! ```rust,ignore
//! use connpool::{Pool, PoolConfig};
//! use std::time::Duration;
//!
//! // Five eagerly-created connections
//! let pool = Pool::new(5, || Session::connect(&url))?;
//!
//! // Or two eager, up to ten on demand
//! let pool = Pool::builder()
//!     .min_connections(2)
//!     .max_connections(10)
//!     .acquire_timeout(Duration::from_secs(5))
//!     .build(|| Session::connect(&url))?;
//!
//! let mut conn = pool.acquire()?;
//! conn.execute("SELECT 1")?;
//! pool.release(conn)?;
//!
//! let status = pool.status();
//! println!("Pool utilization: {:.1}%", status.utilization());
//!
//! pool.shutdown();
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pool;

// Configuration
pub use config::PoolConfig;

// Error types
pub use error::{BoxError, PoolError, ReleaseError};

// Pool types
pub use pool::{Pool, PoolBuilder, PoolMetrics, PoolStatus, PooledConnection};

// Lifecycle management
pub use lifecycle::{ConnectionFactory, ConnectionId, ConnectionMetadata, ConnectionState};

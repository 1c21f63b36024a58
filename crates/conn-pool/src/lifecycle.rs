//! Connection lifecycle management.
//!
//! A pool never talks to a backend directly. It creates, resets and destroys
//! connections through a [`ConnectionFactory`] supplied by the caller, and
//! tracks each connection's identity and usage in [`ConnectionMetadata`].

use std::fmt;
use std::time::{Duration, Instant};

use crate::error::BoxError;

/// Source of backend connections for a pool.
///
/// Any `Fn() -> Result<C, E>` closure is a factory with no-op reset and
/// drop-based destroy. Implement the trait directly to customize those hooks.
pub trait ConnectionFactory: Send + Sync + 'static {
    /// The connection type handed out by the pool.
    type Connection: Send + 'static;

    /// Error produced when creating or resetting a connection.
    type Error: Into<BoxError>;

    /// Open a new backend connection.
    fn create(&self) -> Result<Self::Connection, Self::Error>;

    /// Restore session state before an in-use connection goes back to idle.
    ///
    /// Only called when [`PoolConfig::reset_on_release`](crate::PoolConfig::reset_on_release)
    /// is set. A failure destroys the connection.
    fn reset(&self, _conn: &mut Self::Connection) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Close a connection the pool is giving up.
    fn destroy(&self, conn: Self::Connection) {
        drop(conn);
    }
}

impl<F, C, E> ConnectionFactory for F
where
    F: Fn() -> Result<C, E> + Send + Sync + 'static,
    C: Send + 'static,
    E: Into<BoxError>,
{
    type Connection = C;
    type Error = E;

    fn create(&self) -> Result<C, E> {
        self()
    }
}

/// Identity of a pooled connection.
///
/// Unique across all pools in the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    pool: u64,
    seq: u64,
}

impl ConnectionId {
    pub(crate) fn new(pool: u64, seq: u64) -> Self {
        Self { pool, seq }
    }

    /// Identifier of the pool that created the connection.
    #[must_use]
    pub fn pool_id(&self) -> u64 {
        self.pool
    }

    /// Creation sequence number within the owning pool, starting at 1.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.pool, self.seq)
    }
}

/// The two states a pooled connection can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Owned by the pool and available for checkout.
    Idle,
    /// Loaned to exactly one caller.
    InUse,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::InUse => f.write_str("in-use"),
        }
    }
}

/// Bookkeeping for a single pooled connection.
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// Connection identity.
    pub id: ConnectionId,
    /// When the connection was created.
    pub created_at: Instant,
    /// When the connection was last checked out.
    pub last_checkout: Option<Instant>,
    /// Number of times the connection has been checked out.
    pub checkout_count: u64,
}

impl ConnectionMetadata {
    pub(crate) fn new(id: ConnectionId) -> Self {
        Self {
            id,
            created_at: Instant::now(),
            last_checkout: None,
            checkout_count: 0,
        }
    }

    pub(crate) fn mark_checkout(&mut self) {
        self.last_checkout = Some(Instant::now());
        self.checkout_count += 1;
    }

    /// Time since the connection was created.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

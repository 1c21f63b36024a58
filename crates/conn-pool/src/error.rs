//! Pool error types.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::lifecycle::ConnectionId;

/// Type-erased error returned by a connection factory.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during pool operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// The factory failed while the pool was being built.
    ///
    /// Connections created before the failure have already been destroyed.
    #[error("pool initialization failed after {created} connection(s): {source}")]
    Init {
        /// Connections successfully created before the failure.
        created: u32,
        /// Factory error.
        #[source]
        source: BoxError,
    },

    /// The factory failed while filling a lazy slot during checkout.
    #[error("failed to create connection: {0}")]
    Connect(#[source] BoxError),

    /// The handle is not checked out from this pool.
    #[error("invalid connection handle {0}: not checked out from this pool")]
    InvalidHandle(ConnectionId),

    /// The pool has been shut down.
    #[error("pool is closed")]
    PoolClosed,

    /// A bounded wait expired.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The pool configuration is inconsistent.
    #[error("invalid pool configuration: {0}")]
    Configuration(String),
}

impl PoolError {
    /// Whether the caller may reasonably retry the failed operation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connect(_))
    }
}

/// A rejected check-in, handing the connection back to the caller.
pub struct ReleaseError<C> {
    error: PoolError,
    connection: C,
}

impl<C> ReleaseError<C> {
    pub(crate) fn new(error: PoolError, connection: C) -> Self {
        Self { error, connection }
    }

    /// The reason the check-in was rejected.
    #[must_use]
    pub fn error(&self) -> &PoolError {
        &self.error
    }

    /// Recover the connection that was not accepted.
    #[must_use]
    pub fn into_connection(self) -> C {
        self.connection
    }

    /// Split into the error and the connection.
    #[must_use]
    pub fn into_parts(self) -> (PoolError, C) {
        (self.error, self.connection)
    }
}

impl<C> fmt::Debug for ReleaseError<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<C> fmt::Display for ReleaseError<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl<C> std::error::Error for ReleaseError<C> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<C> From<ReleaseError<C>> for PoolError {
    fn from(err: ReleaseError<C>) -> Self {
        err.error
    }
}

//! # pool-testing
//!
//! Test infrastructure for `connpool` and the benchmark harness.
//!
//! Pool-level concurrency tests live in this crate's `tests/` directory so
//! that `connpool` itself carries no dev-dependency back onto this crate.
//!
//! ## Contents
//!
//! - [`MockFactory`]: configurable connection factory that counts creations,
//!   resets and destroys, and can be told to fail
//! - [`ConcurrencyProbe`]: records the peak number of concurrent holders

#![warn(missing_docs)]
#![deny(unsafe_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use connpool::ConnectionFactory;
use parking_lot::Mutex;
use thiserror::Error;

/// Errors produced by [`MockFactory`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MockError {
    /// Connection creation was configured to fail.
    #[error("mock backend refused connection #{0}")]
    ConnectRefused(u64),

    /// Connection reset was configured to fail.
    #[error("mock reset failed for connection #{0}")]
    ResetFailed(u64),
}

/// A fake backend session.
#[derive(Debug, PartialEq, Eq)]
pub struct MockConnection {
    /// Creation order, starting at 1.
    pub serial: u64,
    /// Work done through this connection.
    pub uses: u64,
}

impl MockConnection {
    /// Record one unit of work.
    pub fn touch(&mut self) {
        self.uses += 1;
    }
}

/// Counters shared between a [`MockFactory`] and its clones.
#[derive(Debug, Default)]
struct Counters {
    attempts: AtomicU64,
    created: AtomicU64,
    destroyed: AtomicU64,
    resets: AtomicU64,
    live: AtomicUsize,
    peak_live: AtomicUsize,
}

/// Snapshot of a [`MockFactory`]'s counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactoryStats {
    /// Successful creations.
    pub created: u64,
    /// Connections handed to `destroy`.
    pub destroyed: u64,
    /// Successful resets.
    pub resets: u64,
    /// Connections currently alive (created and not destroyed).
    pub live: usize,
    /// Highest `live` value observed.
    pub peak_live: usize,
}

/// Configurable connection factory for tests.
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    counters: Arc<Counters>,
    fail_after: Option<u64>,
    fail_resets: bool,
    create_delay: Option<Duration>,
    destroyed_serials: Arc<Mutex<Vec<u64>>>,
}

impl MockFactory {
    /// A factory that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every creation after the first `count`.
    #[must_use]
    pub fn fail_after(mut self, count: u64) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Make every reset fail.
    #[must_use]
    pub fn fail_resets(mut self, enabled: bool) -> Self {
        self.fail_resets = enabled;
        self
    }

    /// Sleep this long in every creation.
    #[must_use]
    pub fn create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    /// Current counter values.
    #[must_use]
    pub fn stats(&self) -> FactoryStats {
        FactoryStats {
            created: self.counters.created.load(Ordering::SeqCst),
            destroyed: self.counters.destroyed.load(Ordering::SeqCst),
            resets: self.counters.resets.load(Ordering::SeqCst),
            live: self.counters.live.load(Ordering::SeqCst),
            peak_live: self.counters.peak_live.load(Ordering::SeqCst),
        }
    }

    /// Serial numbers of destroyed connections, in destroy order.
    #[must_use]
    pub fn destroyed_serials(&self) -> Vec<u64> {
        self.destroyed_serials.lock().clone()
    }
}

impl ConnectionFactory for MockFactory {
    type Connection = MockConnection;
    type Error = MockError;

    fn create(&self) -> Result<MockConnection, MockError> {
        if let Some(delay) = self.create_delay {
            thread::sleep(delay);
        }

        let attempt = self.counters.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_after.is_some_and(|limit| attempt > limit) {
            tracing::debug!(attempt, "mock factory refusing connection");
            return Err(MockError::ConnectRefused(attempt));
        }

        let serial = self.counters.created.fetch_add(1, Ordering::SeqCst) + 1;
        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak_live.fetch_max(live, Ordering::SeqCst);
        Ok(MockConnection { serial, uses: 0 })
    }

    fn reset(&self, conn: &mut MockConnection) -> Result<(), MockError> {
        if self.fail_resets {
            return Err(MockError::ResetFailed(conn.serial));
        }
        self.counters.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn destroy(&self, conn: MockConnection) {
        self.counters.destroyed.fetch_add(1, Ordering::SeqCst);
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
        self.destroyed_serials.lock().push(conn.serial);
    }
}

/// Tracks how many threads are inside a critical region at once.
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyProbe {
    /// Create a new probe.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the region; leaving happens when the guard drops.
    #[must_use]
    pub fn enter(&self) -> ProbeGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ProbeGuard { probe: self }
    }

    /// Threads inside the region right now.
    #[must_use]
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Highest concurrent occupancy observed.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Guard returned by [`ConcurrencyProbe::enter`].
#[derive(Debug)]
pub struct ProbeGuard<'a> {
    probe: &'a ConcurrencyProbe,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.probe.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Poll `condition` every millisecond until it holds or `timeout` passes.
///
/// Returns whether the condition was met.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

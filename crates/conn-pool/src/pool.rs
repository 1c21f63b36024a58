//! Connection pool implementation.
//!
//! All bookkeeping (idle queue, in-use set, waiter tickets, metrics) lives
//! behind one mutex per pool. Factory calls always run with the lock
//! released; a lazily-created connection reserves its slot first so the
//! capacity bound holds while it is being opened.

use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::config::PoolConfig;
use crate::error::{BoxError, PoolError, ReleaseError};
use crate::lifecycle::{ConnectionFactory, ConnectionId, ConnectionMetadata, ConnectionState};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// A fixed-capacity blocking connection pool.
///
/// Cloning a `Pool` is cheap and yields another handle to the same pool.
///
/// # Fairness
///
/// Blocked callers take a ticket and are served in ticket order. New callers
/// do not overtake existing waiters. Ordering between callers that arrive at
/// the same instant is unspecified, so fairness is best-effort FIFO rather
/// than strict.
///
/// # Example
///
/// ```rust,ignore
/// use connpool::Pool;
///
/// let pool = Pool::new(5, || Session::connect(&url))?;
///
/// let conn = pool.acquire()?;
/// // Use connection...
/// pool.release(conn)?;
///
/// pool.shutdown();
/// ```
pub struct Pool<F: ConnectionFactory> {
    inner: Arc<PoolInner<F>>,
}

struct PoolInner<F: ConnectionFactory> {
    /// Process-unique pool identifier.
    id: u64,

    /// Pool configuration.
    config: PoolConfig,

    /// Source of new connections.
    factory: F,

    /// Mirror of `PoolState::closed` for lock-free reads.
    closed: AtomicBool,

    /// When the pool was created.
    created_at: Instant,

    /// Idle/in-use bookkeeping.
    state: Mutex<PoolState<F::Connection>>,

    /// Signalled when a connection or slot frees up, or the pool closes.
    available: Condvar,

    /// Signalled when a slot is given up after shutdown began.
    drained: Condvar,
}

struct IdleConnection<C> {
    conn: C,
    meta: ConnectionMetadata,
}

struct PoolState<C> {
    /// Idle connections; checkout pops the front, check-in pushes the back.
    idle: VecDeque<IdleConnection<C>>,

    /// Loaned connections keyed by sequence number.
    in_use: HashMap<u64, ConnectionMetadata>,

    /// Idle + in-use + slots reserved for connections being created.
    total: u32,

    /// Last sequence number handed out.
    next_seq: u64,

    /// Tickets of blocked callers in arrival order.
    waiters: VecDeque<u64>,

    /// Next ticket to hand out.
    next_ticket: u64,

    /// Whether shutdown has begun.
    closed: bool,

    metrics: PoolMetricsInner,
}

/// What a caller got when it reached the front of the queue.
enum Slot<C> {
    Idle(IdleConnection<C>),
    Create(ConnectionId),
}

impl<C> PoolState<C> {
    fn has_capacity(&self, max: u32) -> bool {
        !self.idle.is_empty() || self.total < max
    }

    fn take_slot(&mut self, pool_id: u64, max: u32) -> Option<Slot<C>> {
        if let Some(idle) = self.idle.pop_front() {
            return Some(Slot::Idle(idle));
        }
        if self.total < max {
            self.total += 1;
            self.next_seq += 1;
            return Some(Slot::Create(ConnectionId::new(pool_id, self.next_seq)));
        }
        None
    }

    fn remove_waiter(&mut self, ticket: u64) {
        if let Some(pos) = self.waiters.iter().position(|t| *t == ticket) {
            self.waiters.remove(pos);
        }
    }
}

/// Internal metrics tracking.
#[derive(Debug, Default)]
struct PoolMetricsInner {
    /// Total connections created.
    connections_created: u64,
    /// Total connections destroyed.
    connections_closed: u64,
    /// Total successful checkouts.
    checkouts_successful: u64,
    /// Total failed checkouts (timeouts, closed pool, creation errors).
    checkouts_failed: u64,
    /// Total checkouts that gave up waiting.
    timeouts: u64,
    /// Total resets performed.
    resets_performed: u64,
    /// Total reset failures.
    resets_failed: u64,
}

impl<F: ConnectionFactory> Pool<F> {
    /// Create a new pool builder.
    #[must_use]
    pub fn builder() -> PoolBuilder<F> {
        PoolBuilder::new()
    }

    /// Create a pool of `capacity` connections, all opened up front.
    ///
    /// If any creation fails, the connections already opened are destroyed
    /// and [`PoolError::Init`] is returned.
    pub fn new(capacity: u32, factory: F) -> Result<Self, PoolError> {
        Self::with_config(PoolConfig::fixed(capacity), factory)
    }

    /// Create a pool with the given configuration.
    ///
    /// `min_connections` are opened up front; the rest are opened on demand.
    pub fn with_config(config: PoolConfig, factory: F) -> Result<Self, PoolError> {
        config.validate()?;

        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let mut idle = VecDeque::with_capacity(config.max_connections as usize);

        for seq in 1..=u64::from(config.min_connections) {
            match factory.create() {
                Ok(conn) => idle.push_back(IdleConnection {
                    conn,
                    meta: ConnectionMetadata::new(ConnectionId::new(id, seq)),
                }),
                Err(err) => {
                    let created = idle.len() as u32;
                    for entry in idle {
                        factory.destroy(entry.conn);
                    }
                    let source: BoxError = err.into();
                    tracing::warn!(
                        pool_id = id,
                        created,
                        error = %source,
                        "connection pool initialization failed"
                    );
                    return Err(PoolError::Init { created, source });
                }
            }
        }

        let created = idle.len() as u32;
        let state = PoolState {
            idle,
            in_use: HashMap::new(),
            total: created,
            next_seq: u64::from(created),
            waiters: VecDeque::new(),
            next_ticket: 0,
            closed: false,
            metrics: PoolMetricsInner {
                connections_created: u64::from(created),
                ..PoolMetricsInner::default()
            },
        };

        tracing::info!(
            pool_id = id,
            min = config.min_connections,
            max = config.max_connections,
            "connection pool created"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                id,
                config,
                factory,
                closed: AtomicBool::new(false),
                created_at: Instant::now(),
                state: Mutex::new(state),
                available: Condvar::new(),
                drained: Condvar::new(),
            }),
        })
    }

    /// Get a connection from the pool.
    ///
    /// Blocks until a connection is idle or a free slot can be filled. Waits
    /// at most the configured `acquire_timeout`, if any. Fails with
    /// [`PoolError::PoolClosed`] once shutdown has begun, including for
    /// callers that were already waiting.
    pub fn acquire(&self) -> Result<PooledConnection<F>, PoolError> {
        let deadline = self
            .inner
            .config
            .acquire_timeout
            .and_then(deadline_after);
        self.inner
            .checkout(deadline)
            .map(|(conn, meta)| PooledConnection::new(conn, meta, Arc::clone(&self.inner)))
    }

    /// Get a connection, waiting at most `timeout`.
    ///
    /// Fails with [`PoolError::Timeout`] if nothing frees up in time. The
    /// pool state is unchanged by a timed-out call.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection<F>, PoolError> {
        self.inner
            .checkout(deadline_after(timeout))
            .map(|(conn, meta)| PooledConnection::new(conn, meta, Arc::clone(&self.inner)))
    }

    /// Try to get a connection without waiting.
    ///
    /// Returns `None` if nothing is immediately available or other callers
    /// are already queued.
    pub fn try_acquire(&self) -> Result<Option<PooledConnection<F>>, PoolError> {
        let mut state = self.inner.state.lock();
        if state.closed {
            state.metrics.checkouts_failed += 1;
            return Err(PoolError::PoolClosed);
        }
        if !state.waiters.is_empty() {
            return Ok(None);
        }
        let Some(slot) = state.take_slot(self.inner.id, self.inner.config.max_connections) else {
            return Ok(None);
        };
        self.inner
            .finish_checkout(state, slot)
            .map(|(conn, meta)| Some(PooledConnection::new(conn, meta, Arc::clone(&self.inner))))
    }

    /// Return a connection to the pool.
    ///
    /// Equivalent to dropping it, except that a connection checked out from
    /// a different pool is reported as [`PoolError::InvalidHandle`]. Such a
    /// connection still goes back to the pool it came from.
    pub fn release(&self, conn: PooledConnection<F>) -> Result<(), PoolError> {
        if !Arc::ptr_eq(&conn.pool, &self.inner) {
            let id = conn.id();
            tracing::warn!(
                pool_id = self.inner.id,
                connection_id = %id,
                "rejected release of connection from another pool"
            );
            return Err(PoolError::InvalidHandle(id));
        }
        drop(conn);
        Ok(())
    }

    /// Return a connection detached with [`PooledConnection::into_parts`].
    ///
    /// Fails if `id` was not issued by this pool or is not currently checked
    /// out (for example a second check-in of the same id). The connection is
    /// then handed back inside the error and the pool state is unchanged.
    pub fn check_in(
        &self,
        id: ConnectionId,
        conn: F::Connection,
    ) -> Result<(), ReleaseError<F::Connection>> {
        self.inner.check_in(id, conn)
    }

    /// Close the pool.
    ///
    /// New and waiting acquirers fail with [`PoolError::PoolClosed`]. Idle
    /// connections are destroyed immediately; loaned connections are
    /// destroyed as they come back. Returns once every connection is gone.
    /// Calling it again is a no-op that returns once the pool is drained.
    ///
    /// Must not be called from a thread that still holds a connection from
    /// this pool, or it will wait forever.
    pub fn shutdown(&self) {
        self.inner.close();
        self.inner.wait_drained(None);
    }

    /// Close the pool, waiting at most `timeout` for loaned connections.
    ///
    /// On [`PoolError::Timeout`] the pool stays closed and connections still
    /// out are destroyed when they are returned.
    pub fn shutdown_timeout(&self, timeout: Duration) -> Result<(), PoolError> {
        self.inner.close();
        let deadline = deadline_after(timeout).map(|(at, _)| at);
        if self.inner.wait_drained(deadline) {
            Ok(())
        } else {
            Err(PoolError::Timeout(timeout))
        }
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// The state of a connection, or `None` if this pool does not hold it.
    #[must_use]
    pub fn state_of(&self, id: ConnectionId) -> Option<ConnectionState> {
        if id.pool_id() != self.inner.id {
            return None;
        }
        let state = self.inner.state.lock();
        if state.in_use.contains_key(&id.sequence()) {
            Some(ConnectionState::InUse)
        } else if state.idle.iter().any(|entry| entry.meta.id == id) {
            Some(ConnectionState::Idle)
        } else {
            None
        }
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            available: state.idle.len() as u32,
            in_use: state.in_use.len() as u32,
            total: state.total,
            max: self.inner.config.max_connections,
            waiting: state.waiters.len(),
        }
    }

    /// Get pool metrics.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let state = self.inner.state.lock();
        let inner = &state.metrics;
        PoolMetrics {
            connections_created: inner.connections_created,
            connections_closed: inner.connections_closed,
            checkouts_successful: inner.checkouts_successful,
            checkouts_failed: inner.checkouts_failed,
            timeouts: inner.timeouts,
            resets_performed: inner.resets_performed,
            resets_failed: inner.resets_failed,
            uptime: self.inner.created_at.elapsed(),
        }
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Process-unique identifier of this pool.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }
}

/// Deadline `timeout` from now, or `None` (wait forever) if it overflows.
fn deadline_after(timeout: Duration) -> Option<(Instant, Duration)> {
    Instant::now()
        .checked_add(timeout)
        .map(|deadline| (deadline, timeout))
}

impl<F: ConnectionFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ConnectionFactory> fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.inner.id)
            .field("config", &self.inner.config)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl<F: ConnectionFactory> PoolInner<F> {
    fn checkout(
        &self,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<(F::Connection, ConnectionMetadata), PoolError> {
        let mut state = self.state.lock();
        if state.closed {
            state.metrics.checkouts_failed += 1;
            return Err(PoolError::PoolClosed);
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waiters.push_back(ticket);

        let slot = loop {
            if state.closed {
                state.remove_waiter(ticket);
                state.metrics.checkouts_failed += 1;
                return Err(PoolError::PoolClosed);
            }

            if state.waiters.front() == Some(&ticket) {
                if let Some(slot) = state.take_slot(self.id, self.config.max_connections) {
                    state.waiters.pop_front();
                    break slot;
                }
            }

            match deadline {
                Some((at, timeout)) => {
                    if Instant::now() >= at {
                        state.remove_waiter(ticket);
                        state.metrics.checkouts_failed += 1;
                        state.metrics.timeouts += 1;
                        // Someone else may be at the front now.
                        self.available.notify_all();
                        tracing::debug!(
                            pool_id = self.id,
                            ?timeout,
                            "connection checkout timed out"
                        );
                        return Err(PoolError::Timeout(timeout));
                    }
                    self.available.wait_until(&mut state, at);
                }
                None => self.available.wait(&mut state),
            }
        };

        if !state.waiters.is_empty() && state.has_capacity(self.config.max_connections) {
            self.available.notify_all();
        }

        self.finish_checkout(state, slot)
    }

    fn finish_checkout(
        &self,
        mut state: MutexGuard<'_, PoolState<F::Connection>>,
        slot: Slot<F::Connection>,
    ) -> Result<(F::Connection, ConnectionMetadata), PoolError> {
        match slot {
            Slot::Idle(IdleConnection { conn, mut meta }) => {
                meta.mark_checkout();
                state.in_use.insert(meta.id.sequence(), meta.clone());
                state.metrics.checkouts_successful += 1;
                drop(state);

                tracing::trace!(connection_id = %meta.id, "connection checked out");
                Ok((conn, meta))
            }
            Slot::Create(id) => {
                drop(state);
                tracing::debug!(connection_id = %id, "opening connection");
                let created = self.factory.create();

                let mut state = self.state.lock();
                match created {
                    Ok(conn) => {
                        state.metrics.connections_created += 1;
                        if state.closed {
                            state.total -= 1;
                            state.metrics.connections_closed += 1;
                            state.metrics.checkouts_failed += 1;
                            self.drained.notify_all();
                            drop(state);
                            self.factory.destroy(conn);
                            return Err(PoolError::PoolClosed);
                        }

                        let mut meta = ConnectionMetadata::new(id);
                        meta.mark_checkout();
                        state.in_use.insert(id.sequence(), meta.clone());
                        state.metrics.checkouts_successful += 1;
                        drop(state);

                        tracing::trace!(connection_id = %id, "connection checked out");
                        Ok((conn, meta))
                    }
                    Err(err) => {
                        state.total -= 1;
                        state.metrics.checkouts_failed += 1;
                        self.available.notify_all();
                        self.drained.notify_all();
                        drop(state);

                        let source: BoxError = err.into();
                        tracing::warn!(
                            connection_id = %id,
                            error = %source,
                            "failed to open connection"
                        );
                        Err(PoolError::Connect(source))
                    }
                }
            }
        }
    }

    fn check_in(
        &self,
        id: ConnectionId,
        mut conn: F::Connection,
    ) -> Result<(), ReleaseError<F::Connection>> {
        if id.pool_id() != self.id {
            tracing::warn!(pool_id = self.id, connection_id = %id, "rejected foreign connection");
            return Err(ReleaseError::new(PoolError::InvalidHandle(id), conn));
        }

        let reset = if self.config.reset_on_release {
            let closed = {
                let state = self.state.lock();
                if !state.in_use.contains_key(&id.sequence()) {
                    drop(state);
                    tracing::warn!(connection_id = %id, "rejected check-in of idle connection");
                    return Err(ReleaseError::new(PoolError::InvalidHandle(id), conn));
                }
                state.closed
            };
            (!closed).then(|| self.factory.reset(&mut conn))
        } else {
            None
        };

        let mut state = self.state.lock();
        let Some(meta) = state.in_use.remove(&id.sequence()) else {
            drop(state);
            tracing::warn!(connection_id = %id, "rejected check-in of idle connection");
            return Err(ReleaseError::new(PoolError::InvalidHandle(id), conn));
        };

        match reset {
            Some(Err(err)) => {
                state.total -= 1;
                state.metrics.resets_failed += 1;
                state.metrics.connections_closed += 1;
                self.available.notify_all();
                self.drained.notify_all();
                drop(state);

                let source: BoxError = err.into();
                tracing::warn!(
                    connection_id = %id,
                    error = %source,
                    "connection reset failed; discarding connection"
                );
                self.factory.destroy(conn);
                return Ok(());
            }
            Some(Ok(())) => state.metrics.resets_performed += 1,
            None => {}
        }

        if state.closed {
            state.total -= 1;
            state.metrics.connections_closed += 1;
            self.drained.notify_all();
            drop(state);

            tracing::trace!(connection_id = %id, "connection returned to closed pool");
            self.factory.destroy(conn);
            return Ok(());
        }

        state.idle.push_back(IdleConnection { conn, meta });
        self.available.notify_all();
        drop(state);

        tracing::trace!(connection_id = %id, "connection checked in");
        Ok(())
    }

    /// Begin shutdown and destroy idle connections.
    fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            self.closed.store(true, Ordering::Release);
            tracing::info!(
                pool_id = self.id,
                in_use = state.in_use.len(),
                waiting = state.waiters.len(),
                "connection pool closing"
            );
        }

        let idle: Vec<_> = state.idle.drain(..).collect();
        state.total -= idle.len() as u32;
        state.metrics.connections_closed += idle.len() as u64;
        self.available.notify_all();
        drop(state);

        for entry in idle {
            self.factory.destroy(entry.conn);
        }
    }

    /// Wait until every connection has been destroyed.
    ///
    /// Returns `false` if `deadline` passed first.
    fn wait_drained(&self, deadline: Option<Instant>) -> bool {
        let mut state = self.state.lock();
        while state.total > 0 {
            match deadline {
                Some(at) => {
                    if Instant::now() >= at {
                        tracing::debug!(
                            pool_id = self.id,
                            outstanding = state.total,
                            "pool shutdown timed out"
                        );
                        return false;
                    }
                    self.drained.wait_until(&mut state, at);
                }
                None => self.drained.wait(&mut state),
            }
        }
        tracing::info!(pool_id = self.id, "connection pool closed");
        true
    }
}

impl<F: ConnectionFactory> Drop for PoolInner<F> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for entry in state.idle.drain(..) {
            self.factory.destroy(entry.conn);
        }
    }
}

/// Builder for creating a connection pool.
///
/// # Example
///
/// ```rust,ignore
/// let pool = Pool::builder()
///     .min_connections(2)
///     .max_connections(10)
///     .build(factory)?;
/// ```
pub struct PoolBuilder<F> {
    pool_config: PoolConfig,
    _factory: PhantomData<fn() -> F>,
}

impl<F: ConnectionFactory> PoolBuilder<F> {
    /// Create a new pool builder with default settings.
    pub fn new() -> Self {
        Self {
            pool_config: PoolConfig::default(),
            _factory: PhantomData,
        }
    }

    /// Set the pool configuration.
    #[must_use]
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Set the number of eagerly-created connections.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.pool_config.min_connections = count;
        self
    }

    /// Set the pool capacity.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.pool_config.max_connections = count;
        self
    }

    /// Set the default acquire timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.acquire_timeout = Some(timeout);
        self
    }

    /// Enable or disable the reset hook on check-in.
    #[must_use]
    pub fn reset_on_release(mut self, enabled: bool) -> Self {
        self.pool_config.reset_on_release = enabled;
        self
    }

    /// Build the pool.
    pub fn build(self, factory: F) -> Result<Pool<F>, PoolError> {
        Pool::with_config(self.pool_config, factory)
    }
}

impl<F: ConnectionFactory> Default for PoolBuilder<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: u32,
    /// Number of connections currently in use.
    pub in_use: u32,
    /// Total number of connections, including ones being opened.
    pub total: u32,
    /// Maximum allowed connections.
    pub max: u32,
    /// Number of callers blocked in `acquire`.
    pub waiting: usize,
}

impl PoolStatus {
    /// Calculate the utilization percentage.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        (self.in_use as f64 / self.max as f64) * 100.0
    }

    /// Check if the pool is at capacity.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.total >= self.max
    }
}

/// Metrics collected from the pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Total connections created since pool start.
    pub connections_created: u64,
    /// Total connections destroyed since pool start.
    pub connections_closed: u64,
    /// Successful connection checkouts.
    pub checkouts_successful: u64,
    /// Failed connection checkouts (timeouts, pool closed, etc.).
    pub checkouts_failed: u64,
    /// Checkouts that gave up waiting.
    pub timeouts: u64,
    /// Connection resets performed.
    pub resets_performed: u64,
    /// Connection resets that failed.
    pub resets_failed: u64,
    /// Time since pool creation.
    pub uptime: Duration,
}

impl PoolMetrics {
    /// Calculate checkout success rate (0.0 to 1.0).
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let total = self.checkouts_successful + self.checkouts_failed;
        if total == 0 {
            return 1.0;
        }
        self.checkouts_successful as f64 / total as f64
    }

    /// Calculate reset success rate (0.0 to 1.0).
    #[must_use]
    pub fn reset_success_rate(&self) -> f64 {
        let total = self.resets_performed + self.resets_failed;
        if total == 0 {
            return 1.0;
        }
        self.resets_performed as f64 / total as f64
    }
}

/// A connection retrieved from the pool.
///
/// When dropped, the connection is automatically returned to the pool.
/// Use [`into_parts()`](PooledConnection::into_parts) to take it out of
/// automatic return.
pub struct PooledConnection<F: ConnectionFactory> {
    /// `None` only after `into_parts` or during drop.
    conn: Option<F::Connection>,
    /// Connection metadata as of checkout.
    metadata: ConnectionMetadata,
    /// Reference to the pool for returning the connection.
    pool: Arc<PoolInner<F>>,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    fn new(conn: F::Connection, metadata: ConnectionMetadata, pool: Arc<PoolInner<F>>) -> Self {
        Self {
            conn: Some(conn),
            metadata,
            pool,
        }
    }

    /// The connection's identity.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.metadata.id
    }

    /// Get the connection metadata.
    #[must_use]
    pub fn metadata(&self) -> &ConnectionMetadata {
        &self.metadata
    }

    /// Detach the connection from automatic return.
    ///
    /// The slot stays in use until the connection is handed back with
    /// [`Pool::check_in`].
    #[must_use]
    pub fn into_parts(mut self) -> (ConnectionId, F::Connection) {
        let id = self.metadata.id;
        (id, self.take())
    }

    #[allow(clippy::expect_used)]
    fn take(&mut self) -> F::Connection {
        self.conn.take().expect("pooled connection already taken")
    }
}

impl<F: ConnectionFactory> Deref for PooledConnection<F> {
    type Target = F::Connection;

    #[allow(clippy::expect_used)]
    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("pooled connection already taken")
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<F> {
    #[allow(clippy::expect_used)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("pooled connection already taken")
    }
}

impl<F: ConnectionFactory> fmt::Debug for PooledConnection<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.metadata.id)
            .finish_non_exhaustive()
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if let Err(err) = self.pool.check_in(self.metadata.id, conn) {
            let (error, conn) = err.into_parts();
            tracing::warn!(
                connection_id = %self.metadata.id,
                %error,
                "failed to return connection to pool"
            );
            self.pool.factory.destroy(conn);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    type TestFactory = fn() -> Result<u32, std::io::Error>;

    fn counter() -> Result<u32, std::io::Error> {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        Ok(NEXT.fetch_add(1, Ordering::Relaxed) as u32)
    }

    fn pool(capacity: u32) -> Pool<TestFactory> {
        Pool::new(capacity, counter as TestFactory).unwrap()
    }

    /// Factory that fails after `limit` creations and counts destroys.
    struct LimitedFactory {
        limit: usize,
        created: Arc<AtomicUsize>,
        destroyed: Arc<AtomicUsize>,
    }

    impl ConnectionFactory for LimitedFactory {
        type Connection = usize;
        type Error = std::io::Error;

        fn create(&self) -> Result<usize, std::io::Error> {
            let n = self.created.fetch_add(1, Ordering::SeqCst);
            if n >= self.limit {
                return Err(std::io::Error::other("backend unavailable"));
            }
            Ok(n)
        }

        fn destroy(&self, _conn: usize) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_pool_status_utilization() {
        let status = PoolStatus {
            available: 5,
            in_use: 5,
            total: 10,
            max: 20,
            waiting: 0,
        };
        assert!((status.utilization() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pool_status_at_capacity() {
        let status = PoolStatus {
            available: 0,
            in_use: 10,
            total: 10,
            max: 10,
            waiting: 3,
        };
        assert!(status.is_at_capacity());

        let status2 = PoolStatus {
            available: 5,
            in_use: 5,
            total: 10,
            max: 20,
            waiting: 0,
        };
        assert!(!status2.is_at_capacity());
    }

    #[test]
    fn test_pool_metrics_success_rates() {
        let metrics = PoolMetrics {
            connections_created: 10,
            connections_closed: 2,
            checkouts_successful: 90,
            checkouts_failed: 10,
            timeouts: 4,
            resets_performed: 95,
            resets_failed: 5,
            uptime: Duration::from_secs(3600),
        };

        assert!((metrics.checkout_success_rate() - 0.9).abs() < f64::EPSILON);
        assert!((metrics.reset_success_rate() - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn test_builder_default() {
        let builder = PoolBuilder::<TestFactory>::new();
        assert_eq!(builder.pool_config.min_connections, 1);
        assert_eq!(builder.pool_config.max_connections, 10);
    }

    #[test]
    fn test_builder_fluent() {
        let builder = Pool::<TestFactory>::builder()
            .min_connections(5)
            .max_connections(50)
            .reset_on_release(true);

        assert_eq!(builder.pool_config.min_connections, 5);
        assert_eq!(builder.pool_config.max_connections, 50);
        assert!(builder.pool_config.reset_on_release);
    }

    #[test]
    fn test_new_creates_all_connections_eagerly() {
        let pool = pool(3);
        let status = pool.status();
        assert_eq!(status.available, 3);
        assert_eq!(status.total, 3);
        assert_eq!(pool.metrics().connections_created, 3);
    }

    #[test]
    fn test_checkout_is_round_robin() {
        let pool = pool(3);
        let mut seen = Vec::new();
        for _ in 0..6 {
            let conn = pool.acquire().unwrap();
            seen.push(conn.id().sequence());
            pool.release(conn).unwrap();
        }
        assert_eq!(seen, vec![1, 2, 3, 1, 2, 3]);
    }

    #[test]
    fn test_sequential_acquire_release_never_exhausts() {
        let pool = pool(1);
        for _ in 0..1000 {
            let conn = pool.try_acquire().unwrap().unwrap();
            pool.release(conn).unwrap();
        }
        assert_eq!(pool.status().available, 1);
        assert_eq!(pool.metrics().checkouts_successful, 1000);
    }

    #[test]
    fn test_try_acquire_when_exhausted() {
        let pool = pool(2);
        let a = pool.try_acquire().unwrap().unwrap();
        let b = pool.try_acquire().unwrap().unwrap();
        assert!(pool.try_acquire().unwrap().is_none());
        assert_eq!(pool.state_of(a.id()), Some(ConnectionState::InUse));
        drop(b);
        assert!(pool.try_acquire().unwrap().is_some());
    }

    #[test]
    fn test_acquire_timeout_leaves_state_unchanged() {
        let pool = pool(1);
        let held = pool.acquire().unwrap();
        let before = pool.status();

        let err = pool.acquire_timeout(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, PoolError::Timeout(_)));
        assert!(err.is_retryable());
        assert_eq!(pool.status(), before);
        assert_eq!(pool.metrics().timeouts, 1);
        drop(held);
    }

    #[test]
    fn test_unrepresentable_timeout_waits_without_deadline() {
        let pool = pool(1);
        let conn = pool.acquire_timeout(Duration::MAX).unwrap();
        assert_eq!(pool.status().in_use, 1);
        drop(conn);

        let pool = Pool::with_config(
            PoolConfig::fixed(1).acquire_timeout(Duration::from_secs(u64::MAX)),
            counter as TestFactory,
        )
        .unwrap();
        drop(pool.acquire().unwrap());

        pool.shutdown_timeout(Duration::MAX).unwrap();
        assert!(pool.is_closed());
    }

    #[test]
    fn test_configured_acquire_timeout() {
        let pool = Pool::builder()
            .min_connections(1)
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(10))
            .build(counter as TestFactory)
            .unwrap();
        let _held = pool.acquire().unwrap();
        assert!(matches!(pool.acquire(), Err(PoolError::Timeout(_))));
    }

    #[test]
    fn test_double_check_in_rejected() {
        let pool = pool(2);
        let (id, conn) = pool.acquire().unwrap().into_parts();
        assert_eq!(pool.state_of(id), Some(ConnectionState::InUse));

        pool.check_in(id, conn).unwrap();
        assert_eq!(pool.state_of(id), Some(ConnectionState::Idle));
        let before = pool.status();

        let err = pool.check_in(id, 999).unwrap_err();
        assert!(matches!(err.error(), PoolError::InvalidHandle(bad) if *bad == id));
        assert_eq!(err.into_connection(), 999);
        assert_eq!(pool.status(), before);
    }

    #[test]
    fn test_release_to_foreign_pool_rejected() {
        let home = pool(1);
        let other = pool(1);

        let conn = home.acquire().unwrap();
        let id = conn.id();
        let err = other.release(conn).unwrap_err();
        assert!(matches!(err, PoolError::InvalidHandle(bad) if bad == id));

        // The rejected handle went back to its own pool.
        assert_eq!(home.state_of(id), Some(ConnectionState::Idle));
        assert_eq!(other.status().available, 1);
    }

    #[test]
    fn test_foreign_check_in_rejected() {
        let home = pool(1);
        let other = pool(1);
        let (id, conn) = home.acquire().unwrap().into_parts();

        let (err, conn) = other.check_in(id, conn).unwrap_err().into_parts();
        assert!(matches!(err, PoolError::InvalidHandle(_)));
        home.check_in(id, conn).unwrap();
    }

    #[test]
    fn test_lazy_creation_respects_capacity() {
        let pool = Pool::builder()
            .min_connections(0)
            .max_connections(2)
            .build(counter as TestFactory)
            .unwrap();
        assert_eq!(pool.status().total, 0);

        let a = pool.try_acquire().unwrap().unwrap();
        let b = pool.try_acquire().unwrap().unwrap();
        assert!(pool.try_acquire().unwrap().is_none());
        assert_eq!(pool.metrics().connections_created, 2);
        drop((a, b));
        assert_eq!(pool.status().available, 2);
    }

    #[test]
    fn test_init_failure_destroys_created_connections() {
        let created = Arc::new(AtomicUsize::new(0));
        let destroyed = Arc::new(AtomicUsize::new(0));
        let factory = LimitedFactory {
            limit: 2,
            created: Arc::clone(&created),
            destroyed: Arc::clone(&destroyed),
        };

        let err = Pool::new(4, factory).unwrap_err();
        assert!(matches!(err, PoolError::Init { created: 2, .. }));
        assert_eq!(destroyed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_lazy_creation_failure_frees_slot() {
        let factory = LimitedFactory {
            limit: 0,
            created: Arc::new(AtomicUsize::new(0)),
            destroyed: Arc::new(AtomicUsize::new(0)),
        };
        let pool = Pool::builder()
            .min_connections(0)
            .max_connections(1)
            .build(factory)
            .unwrap();

        assert!(matches!(pool.try_acquire(), Err(PoolError::Connect(_))));
        assert_eq!(pool.status().total, 0);
        assert_eq!(pool.metrics().checkouts_failed, 1);
    }

    #[test]
    fn test_shutdown_rejects_acquire() {
        let pool = pool(2);
        pool.shutdown();
        assert!(pool.is_closed());
        assert!(matches!(pool.acquire(), Err(PoolError::PoolClosed)));
        assert!(matches!(pool.try_acquire(), Err(PoolError::PoolClosed)));
        assert_eq!(pool.status().total, 0);
        assert_eq!(pool.metrics().connections_closed, 2);

        // Idempotent.
        pool.shutdown();
        assert_eq!(pool.metrics().connections_closed, 2);
    }

    #[test]
    fn test_shutdown_timeout_with_outstanding_connection() {
        let pool = pool(2);
        let held = pool.acquire().unwrap();

        let err = pool.shutdown_timeout(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, PoolError::Timeout(_)));
        assert_eq!(pool.status().total, 1);

        drop(held);
        assert_eq!(pool.status().total, 0);
        pool.shutdown_timeout(Duration::from_millis(10)).unwrap();
    }

    #[test]
    fn test_checkout_metadata() {
        let pool = pool(1);
        for _ in 0..3 {
            drop(pool.acquire().unwrap());
        }
        let conn = pool.acquire().unwrap();
        assert_eq!(conn.id().pool_id(), pool.id());
        assert_eq!(conn.metadata().checkout_count, 4);
        assert!(conn.metadata().last_checkout.is_some());
    }
}

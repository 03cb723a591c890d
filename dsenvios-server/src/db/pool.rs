//! Connection pool
//!
//! A bounded set of reusable connections shared by every request.
//!
//! - Capacity is enforced by a semaphore: a lease holds one permit, so the
//!   number of leased connections never exceeds `max_connections`
//! - Waiters queue in FIFO order; returning a connection wakes exactly one
//! - Idle connections are validated lazily: one idle for longer than
//!   `validate_after_idle` is pinged before reuse and replaced if dead
//! - A connection that timed out, lost its socket, or was dropped mid
//!   transaction is discarded instead of going back to the idle list
//! - `close()` refuses new leases, wakes waiters with `PoolError::Closed`,
//!   and closes idle connections; leased ones close when returned

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dsenvios_core::{DatabaseConfig, QueueMode};
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::connection::{Connection, Connector};
use super::error::{PoolError, QueryError};
use super::statement::Statement;
use super::value::QueryResult;

#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub statement_timeout: Duration,
    pub validate_after_idle: Duration,
    pub queue: QueueMode,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self::from_config(&DatabaseConfig::default())
    }
}

impl PoolOptions {
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            acquire_timeout: config.acquire_timeout(),
            statement_timeout: config.statement_timeout(),
            validate_after_idle: config.validate_after_idle(),
            queue: config.queue,
        }
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    pub fn validate_after_idle(mut self, idle: Duration) -> Self {
        self.validate_after_idle = idle;
        self
    }

    pub fn queue(mut self, queue: QueueMode) -> Self {
        self.queue = queue;
        self
    }
}

/// Point-in-time pool counters for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub capacity: u32,
    pub leased: usize,
    pub idle: usize,
    pub closed: bool,
}

struct IdleConnection {
    conn: Box<dyn Connection>,
    since: Instant,
}

struct PoolInner {
    connector: Box<dyn Connector>,
    options: PoolOptions,
    permits: Arc<Semaphore>,
    idle: Mutex<VecDeque<IdleConnection>>,
    closed: AtomicBool,
    leased: AtomicUsize,
    opened: AtomicU64,
    discarded: AtomicU64,
}

impl PoolInner {
    fn idle(&self) -> MutexGuard<'_, VecDeque<IdleConnection>> {
        // The idle list stays consistent even if a holder panicked.
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Shared handle to the pool. Cloning is cheap; all clones share one pool.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("options", &self.inner.options)
            .field("status", &self.status())
            .finish()
    }
}

impl Pool {
    /// Build a pool. No connection is opened until the first lease.
    pub fn new(connector: impl Connector, options: PoolOptions) -> Self {
        let capacity = options.max_connections.max(1) as usize;
        Self {
            inner: Arc::new(PoolInner {
                connector: Box::new(connector),
                permits: Arc::new(Semaphore::new(capacity)),
                options,
                idle: Mutex::new(VecDeque::with_capacity(capacity)),
                closed: AtomicBool::new(false),
                leased: AtomicUsize::new(0),
                opened: AtomicU64::new(0),
                discarded: AtomicU64::new(0),
            }),
        }
    }

    /// Build a pool and check that one connection can be opened.
    pub async fn open(connector: impl Connector, options: PoolOptions) -> Result<Self, PoolError> {
        let pool = Self::new(connector, options);
        pool.acquire().await?.release();
        info!(
            capacity = pool.inner.options.max_connections,
            queue = ?pool.inner.options.queue,
            "connection pool ready"
        );
        Ok(pool)
    }

    pub fn options(&self) -> &PoolOptions {
        &self.inner.options
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Lease a connection, waiting up to the configured acquire timeout.
    pub async fn acquire(&self) -> Result<PoolConnection, PoolError> {
        self.acquire_within(self.inner.options.acquire_timeout).await
    }

    /// Lease a connection, waiting at most `wait` when the pool is at capacity.
    pub async fn acquire_within(&self, wait: Duration) -> Result<PoolConnection, PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        let permit = match self.inner.options.queue {
            QueueMode::FailFast => match self.inner.permits.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(TryAcquireError::NoPermits) => {
                    warn!("connection pool at capacity, failing fast");
                    return Err(PoolError::Exhausted {
                        waited: Duration::ZERO,
                    });
                }
                Err(TryAcquireError::Closed) => return Err(PoolError::Closed),
            },
            QueueMode::Wait => {
                let started = Instant::now();
                match tokio::time::timeout(wait, self.inner.permits.clone().acquire_owned()).await {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) => return Err(PoolError::Closed),
                    Err(_) => {
                        let waited = started.elapsed();
                        warn!(waited_ms = waited.as_millis() as u64, "connection pool exhausted");
                        return Err(PoolError::Exhausted { waited });
                    }
                }
            }
        };

        let conn = self.checkout().await?;
        self.inner.leased.fetch_add(1, Ordering::SeqCst);
        Ok(PoolConnection {
            conn: Some(conn),
            permit: Some(permit),
            pool: self.clone(),
            in_transaction: false,
            broken: false,
        })
    }

    /// Reuse an idle connection if a healthy one exists, else open a new one.
    async fn checkout(&self) -> Result<Box<dyn Connection>, PoolError> {
        loop {
            let next = self.inner.idle().pop_back();
            let Some(idle) = next else { break };

            let mut conn = idle.conn;
            if idle.since.elapsed() < self.inner.options.validate_after_idle || conn.ping().await {
                return Ok(conn);
            }

            warn!("idle connection failed validation, replacing it");
            self.inner.discarded.fetch_add(1, Ordering::Relaxed);
            conn.close().await;
        }

        let conn = self
            .inner
            .connector
            .connect()
            .await
            .map_err(PoolError::Connect)?;
        let opened = self.inner.opened.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(opened, "opened new connection");
        Ok(conn)
    }

    /// Park a healthy connection. The closed flag is read under the idle
    /// lock, so a concurrent `close()` either drains it or it is discarded here.
    fn checkin(&self, conn: Box<dyn Connection>) {
        let mut idle = self.inner.idle();
        if self.is_closed() {
            drop(idle);
            self.discard(conn);
            return;
        }
        idle.push_back(IdleConnection {
            conn,
            since: Instant::now(),
        });
    }

    fn discard(&self, conn: Box<dyn Connection>) {
        self.inner.discarded.fetch_add(1, Ordering::Relaxed);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(conn.close());
            }
            Err(_) => drop(conn),
        }
    }

    /// Stop leasing, close idle connections, and wake every waiter.
    ///
    /// Safe to call more than once; later calls do nothing.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.permits.close();

        let drained: Vec<IdleConnection> = self.inner.idle().drain(..).collect();
        let count = drained.len();
        for idle in drained {
            idle.conn.close().await;
        }
        info!(
            closed_idle = count,
            still_leased = self.inner.leased.load(Ordering::SeqCst),
            "connection pool closed"
        );
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            capacity: self.inner.options.max_connections,
            leased: self.inner.leased.load(Ordering::SeqCst),
            idle: self.inner.idle().len(),
            closed: self.is_closed(),
        }
    }

    /// Connections opened over the pool's lifetime.
    pub fn connections_opened(&self) -> u64 {
        self.inner.opened.load(Ordering::Relaxed)
    }

    /// Connections thrown away as broken or unusable.
    pub fn connections_discarded(&self) -> u64 {
        self.inner.discarded.load(Ordering::Relaxed)
    }
}

/// Exclusive lease on one connection. Returned to the pool on drop.
pub struct PoolConnection {
    conn: Option<Box<dyn Connection>>,
    permit: Option<OwnedSemaphorePermit>,
    pool: Pool,
    in_transaction: bool,
    broken: bool,
}

impl fmt::Debug for PoolConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConnection")
            .field("in_transaction", &self.in_transaction)
            .field("broken", &self.broken)
            .finish()
    }
}

impl PoolConnection {
    fn conn_mut(&mut self) -> Result<&mut Box<dyn Connection>, QueryError> {
        self.conn
            .as_mut()
            .ok_or_else(|| QueryError::connection_lost("connection already released"))
    }

    fn observe<T>(&mut self, result: &Result<T, QueryError>) {
        if let Err(err) = result {
            if err.poisons_connection() {
                self.broken = true;
            }
        }
    }

    /// Run one statement, bounded by its own timeout or the pool default.
    pub async fn execute(&mut self, statement: &Statement) -> Result<QueryResult, QueryError> {
        let limit = statement
            .timeout()
            .unwrap_or(self.pool.inner.options.statement_timeout);
        let conn = self.conn_mut()?;
        let result = bounded(limit, conn.execute(statement)).await;
        self.observe(&result);
        result
    }

    pub async fn begin(&mut self) -> Result<(), QueryError> {
        let limit = self.pool.inner.options.statement_timeout;
        let result = bounded(limit, self.conn_mut()?.begin()).await;
        self.observe(&result);
        if result.is_ok() {
            self.in_transaction = true;
        }
        result
    }

    /// Commit. On failure the outcome is unknown, so the connection is discarded.
    pub async fn commit(&mut self) -> Result<(), QueryError> {
        let limit = self.pool.inner.options.statement_timeout;
        let result = bounded(limit, self.conn_mut()?.commit()).await;
        match &result {
            Ok(()) => self.in_transaction = false,
            Err(_) => self.broken = true,
        }
        result
    }

    pub async fn rollback(&mut self) -> Result<(), QueryError> {
        let limit = self.pool.inner.options.statement_timeout;
        let result = bounded(limit, self.conn_mut()?.rollback()).await;
        match &result {
            Ok(()) => self.in_transaction = false,
            Err(_) => self.broken = true,
        }
        result
    }

    /// Force this connection to be closed instead of reused.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    /// Give the connection back. Same as dropping the lease.
    pub fn release(self) {}
}

impl Drop for PoolConnection {
    fn drop(&mut self) {
        self.pool.inner.leased.fetch_sub(1, Ordering::SeqCst);
        if let Some(conn) = self.conn.take() {
            if self.broken || self.in_transaction || self.pool.is_closed() {
                if self.in_transaction {
                    warn!("connection dropped inside a transaction, discarding");
                } else if self.broken {
                    warn!("discarding broken connection");
                }
                self.pool.discard(conn);
            } else {
                self.pool.checkin(conn);
            }
        }
        // Permit goes last so the woken waiter finds the connection idle.
        self.permit.take();
    }
}

async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, QueryError>>,
) -> Result<T, QueryError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(QueryError::timeout(format!(
            "no response within {} ms",
            limit.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryBackend, QueryErrorKind, QueryExecutor};

    fn ping() -> Statement {
        Statement::new("/* health.ping */ SELECT 1 AS ok")
    }

    fn pool_with(options: PoolOptions) -> (MemoryBackend, Pool) {
        let backend = MemoryBackend::new();
        (backend.clone(), Pool::new(backend, options))
    }

    #[tokio::test]
    async fn release_wakes_exactly_one_waiter() {
        let (_, pool) = pool_with(PoolOptions::default().max_connections(2));
        let first = pool.acquire().await.unwrap();
        let _second = pool.acquire().await.unwrap();
        assert_eq!(pool.status().leased, 2);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        for waiter in 0..2 {
            let pool = pool.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let conn = pool.acquire().await.unwrap();
                tx.send(waiter).unwrap();
                tokio::time::sleep(Duration::from_secs(3600)).await;
                drop(conn);
            });
        }

        let quiet = Duration::from_millis(50);
        assert!(tokio::time::timeout(quiet, rx.recv()).await.is_err());

        drop(first);
        assert!(tokio::time::timeout(quiet, rx.recv()).await.unwrap().is_some());
        assert!(tokio::time::timeout(quiet, rx.recv()).await.is_err());
        assert_eq!(pool.status().leased, 2);
        assert_eq!(pool.connections_opened(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_past_timeout_is_exhausted() {
        let (_, pool) = pool_with(
            PoolOptions::default()
                .max_connections(1)
                .acquire_timeout(Duration::from_millis(100)),
        );
        let _held = pool.acquire().await.unwrap();

        match pool.acquire().await {
            Err(PoolError::Exhausted { waited }) => assert!(waited >= Duration::from_millis(100)),
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn fail_fast_does_not_wait() {
        let (_, pool) = pool_with(
            PoolOptions::default()
                .max_connections(1)
                .queue(QueueMode::FailFast),
        );
        let held = pool.acquire().await.unwrap();
        assert_eq!(
            pool.acquire().await.unwrap_err(),
            PoolError::Exhausted { waited: Duration::ZERO }
        );

        drop(held);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn released_connections_are_reused() {
        let (backend, pool) = pool_with(PoolOptions::default());
        let exec = QueryExecutor::new(&pool);
        for _ in 0..5 {
            exec.execute(&ping()).await.unwrap();
        }
        assert_eq!(backend.connections_opened(), 1);
        assert_eq!(pool.status().idle, 1);
        assert_eq!(pool.status().leased, 0);
    }

    #[tokio::test]
    async fn lost_connection_is_discarded() {
        let (backend, pool) = pool_with(PoolOptions::default());
        backend.inject_fault("health.ping", QueryError::connection_lost("reset"));

        let exec = QueryExecutor::new(&pool);
        assert!(exec.execute(&ping()).await.is_err());
        assert_eq!(pool.connections_discarded(), 1);
        assert_eq!(pool.status().idle, 0);

        exec.execute(&ping()).await.unwrap();
        assert_eq!(backend.connections_opened(), 2);
    }

    #[tokio::test]
    async fn constraint_errors_keep_the_connection() {
        let (backend, pool) = pool_with(PoolOptions::default());
        backend.inject_fault("health.ping", QueryError::constraint("dup"));

        let exec = QueryExecutor::new(&pool);
        assert!(exec.execute(&ping()).await.is_err());
        exec.execute(&ping()).await.unwrap();
        assert_eq!(pool.connections_discarded(), 0);
        assert_eq!(backend.connections_opened(), 1);
    }

    #[tokio::test]
    async fn stale_idle_connection_is_replaced() {
        let (backend, pool) = pool_with(PoolOptions::default().validate_after_idle(Duration::ZERO));
        let exec = QueryExecutor::new(&pool);
        exec.execute(&ping()).await.unwrap();

        backend.break_connections();
        exec.execute(&ping()).await.unwrap();

        assert_eq!(pool.connections_opened(), 2);
        assert_eq!(pool.connections_discarded(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_statement_times_out_and_is_discarded() {
        let (backend, pool) = pool_with(PoolOptions::default().statement_timeout(Duration::from_secs(1)));
        backend.set_latency(Some(Duration::from_secs(10)));

        let err = QueryExecutor::new(&pool).execute(&ping()).await.unwrap_err();
        assert!(matches!(err, crate::db::DbError::Query(ref e) if e.kind == QueryErrorKind::Timeout));
        assert_eq!(pool.connections_discarded(), 1);
        assert_eq!(pool.status().leased, 0);
    }

    #[tokio::test]
    async fn dropped_transaction_is_discarded() {
        let (_, pool) = pool_with(PoolOptions::default());
        let mut conn = pool.acquire().await.unwrap();
        conn.begin().await.unwrap();
        drop(conn);

        assert_eq!(pool.connections_discarded(), 1);
        assert_eq!(pool.status().idle, 0);
    }

    #[tokio::test]
    async fn close_refuses_new_leases_and_wakes_waiters() {
        let (_, pool) = pool_with(PoolOptions::default().max_connections(1));
        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|_| ()) })
        };
        tokio::task::yield_now().await;

        pool.close().await;
        pool.close().await;
        assert_eq!(waiter.await.unwrap(), Err(PoolError::Closed));
        assert_eq!(pool.acquire().await.unwrap_err(), PoolError::Closed);

        drop(held);
        let status = pool.status();
        assert!(status.closed);
        assert_eq!((status.leased, status.idle), (0, 0));
    }

    #[tokio::test]
    async fn connection_returned_after_close_is_not_parked() {
        let (backend, pool) = pool_with(PoolOptions::default());
        let late = backend.connect().await.unwrap();
        pool.close().await;

        // A return that lost the race with close() still gets discarded.
        pool.checkin(late);
        assert_eq!(pool.status().idle, 0);
        assert_eq!(pool.connections_discarded(), 1);
    }

    #[tokio::test]
    async fn open_checks_connectivity() {
        let backend = MemoryBackend::new();
        backend.set_offline(true);
        let err = Pool::open(backend.clone(), PoolOptions::default()).await.unwrap_err();
        assert!(matches!(err, PoolError::Connect(ref e) if e.kind == QueryErrorKind::ConnectionLost));

        backend.set_offline(false);
        let pool = Pool::open(backend, PoolOptions::default()).await.unwrap();
        assert_eq!(pool.status().idle, 1);
    }
}

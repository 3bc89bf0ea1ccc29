//! Bounded connection pool
//!
//! The only shared mutable state in the gateway. Callers own a connection
//! exclusively between `acquire` and the drop of the returned guard, and
//! acquisition fails fast once the configured wait elapses.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::GatewayError;

type Factory<T> = Box<dyn Fn() -> anyhow::Result<T> + Send + Sync>;
type HealthCheck<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

struct PoolState<T> {
    idle: Vec<T>,
}

/// A bounded pool for reusable connection-like objects.
pub struct Pool<T> {
    max: usize,
    factory: Factory<T>,
    health_check: Option<HealthCheck<T>>,
    state: Mutex<PoolState<T>>,
    available: Condvar,
    in_flight: AtomicUsize,
    closed: AtomicBool,
}

#[derive(Debug)]
pub enum AcquireError {
    Timeout(Duration),
    Closed,
    Connect(anyhow::Error),
}

impl fmt::Display for AcquireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquireError::Timeout(waited) => {
                write!(f, "no connection available after {}ms", waited.as_millis())
            }
            AcquireError::Closed => write!(f, "connection pool is closed"),
            AcquireError::Connect(e) => write!(f, "failed to open connection: {:#}", e),
        }
    }
}

impl From<AcquireError> for GatewayError {
    fn from(err: AcquireError) -> Self {
        match err {
            AcquireError::Timeout(waited) => GatewayError::PoolExhausted {
                waited_ms: waited.as_millis() as u64,
            },
            other => GatewayError::execution(other),
        }
    }
}

/// A pooled value that returns to the pool on drop.
pub struct Pooled<T> {
    pool: Arc<Pool<T>>,
    value: Option<T>,
}

impl<T> Pool<T> {
    pub fn new<F>(max: usize, factory: F) -> Arc<Self>
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::build(max, Box::new(factory), None)
    }

    /// Create a pool that checks idle values before handing them out again
    pub fn with_health_check<F, H>(max: usize, factory: F, health_check: H) -> Arc<Self>
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
        H: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::build(max, Box::new(factory), Some(Box::new(health_check)))
    }

    fn build(max: usize, factory: Factory<T>, health_check: Option<HealthCheck<T>>) -> Arc<Self> {
        Arc::new(Self {
            max: max.max(1),
            factory,
            health_check,
            state: Mutex::new(PoolState { idle: Vec::new() }),
            available: Condvar::new(),
            in_flight: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take an idle value or open a new one, waiting at most `timeout`
    pub fn acquire(self: &Arc<Self>, timeout: Duration) -> Result<Pooled<T>, AcquireError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut state = self.lock_state();
        loop {
            if self.is_closed() {
                return Err(AcquireError::Closed);
            }

            if let Some(item) = state.idle.pop() {
                let Some(check) = &self.health_check else {
                    return Ok(self.wrap(item));
                };
                drop(state);
                if check(&item) {
                    return Ok(self.wrap(item));
                }
                tracing::debug!("Discarding idle connection that failed its health check");
                drop(item);
                state = self.lock_state();
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                continue;
            }

            if self.in_flight.load(Ordering::SeqCst) < self.max {
                self.in_flight.fetch_add(1, Ordering::SeqCst);
                drop(state);
                return match (self.factory)() {
                    Ok(item) => {
                        tracing::debug!(in_flight = self.in_flight(), "Opened pooled connection");
                        Ok(self.wrap(item))
                    }
                    Err(e) => {
                        self.discard();
                        Err(AcquireError::Connect(e))
                    }
                };
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(AcquireError::Timeout(now - started));
            }
            let (guard, _) = self
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Stop handing out values and drop everything idle
    ///
    /// Values still checked out are dropped when their guards are released.
    pub fn close(&self) {
        let drained: Vec<T> = {
            let mut state = self.lock_state();
            if self.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            let drained: Vec<T> = state.idle.drain(..).collect();
            self.in_flight.fetch_sub(drained.len(), Ordering::SeqCst);
            self.available.notify_all();
            drained
        };
        tracing::info!(dropped = drained.len(), "Connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn max_size(&self) -> usize {
        self.max
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn idle_count(&self) -> usize {
        self.lock_state().idle.len()
    }

    fn wrap(self: &Arc<Self>, item: T) -> Pooled<T> {
        Pooled {
            pool: Arc::clone(self),
            value: Some(item),
        }
    }

    // Counter updates and notifications happen under the state lock so a
    // waiter between its capacity check and `wait_timeout` cannot miss them.
    fn release(&self, item: T) {
        let mut state = self.lock_state();
        if self.is_closed() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.available.notify_one();
            drop(state);
            drop(item);
            return;
        }
        state.idle.push(item);
        self.available.notify_one();
    }

    fn discard(&self) {
        let _state = self.lock_state();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.available.notify_one();
    }
}

impl<T> Pooled<T> {
    /// Drop the value instead of returning it, freeing its slot
    pub fn discard(mut self) {
        if self.value.take().is_some() {
            self.pool.discard();
        }
    }
}

impl<T> std::ops::Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `discard` and `drop` take the value, and both consume the guard.
        self.value
            .as_ref()
            .expect("Pooled value missing (already released)")
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(item) = self.value.take() {
            self.pool.release(item);
        }
    }
}

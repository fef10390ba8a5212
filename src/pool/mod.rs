//! Fixed-size connection pool.
//!
//! Connections are opened eagerly and parked in a bounded crossbeam channel.
//! [`DbPool::acquire`] takes one out (waiting up to the configured timeout)
//! and the returned [`PooledConnection`] puts it back on drop.
//!
//! A connection is only health-checked on release when one of its calls
//! failed at the connection level; an unhealthy one is replaced. A slot whose
//! replacement could not be opened is counted as lost and reopened by a later
//! [`DbPool::acquire`] that finds no idle connection.

pub mod config;

use crate::connection::{self, ConnectionError};
use crate::executor::{DbError, PgExecutor};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use self::config::DatabaseConfig;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Count of slots whose connection was dropped without a replacement.
#[derive(Debug, Default)]
struct LostSlots(AtomicUsize);

impl LostSlots {
    fn record(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    /// Take one lost slot to reopen; `false` when none is lost.
    fn claim(&self) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    fn count(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }
}

struct PoolInner {
    url: String,
    idle_tx: Sender<PgExecutor>,
    idle_rx: Receiver<PgExecutor>,
    timeout: Duration,
    lost: LostSlots,
}

impl PoolInner {
    /// Open a connection for a lost slot, if there is one.
    fn reopen_lost_slot(&self) -> Option<PgExecutor> {
        if !self.lost.claim() {
            return None;
        }
        match connection::connect(&self.url) {
            Ok(client) => {
                log::info!("reopened lost pooled connection");
                Some(PgExecutor::new(client))
            }
            Err(e) => {
                self.lost.record();
                log::warn!(
                    "could not reopen lost pooled connection ({} lost): {e}",
                    self.lost.count()
                );
                None
            }
        }
    }
}

/// Shared handle to the pool; cheap to clone.
#[derive(Clone)]
pub struct DbPool {
    inner: Arc<PoolInner>,
}

impl DbPool {
    /// Open `max_connections` connections described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError` if the URL is invalid or any connection fails.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, ConnectionError> {
        connection::validate_connection_string(&config.url)?;
        let size = config.max_connections.max(1);
        let (idle_tx, idle_rx) = bounded(size);

        for _ in 0..size {
            let client = connection::connect(&config.url)?;
            idle_tx
                .send(PgExecutor::new(client))
                .map_err(|_| ConnectionError::Other("pool channel closed".to_string()))?;
        }
        log::info!("database pool ready with {size} connection(s)");

        Ok(Self {
            inner: Arc::new(PoolInner {
                url: config.url.clone(),
                idle_tx,
                idle_rx,
                timeout: Duration::from_secs(config.pool_timeout_seconds),
                lost: LostSlots::default(),
            }),
        })
    }

    /// Check a connection out of the pool.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Other` when no connection frees up within the pool timeout.
    pub fn acquire(&self) -> Result<PooledConnection, DbError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::acquire_connection_span().entered();

        let start = Instant::now();
        let idle = self
            .inner
            .idle_rx
            .try_recv()
            .ok()
            .or_else(|| self.inner.reopen_lost_slot());
        let waited = match idle {
            Some(executor) => Ok(executor),
            None => self.inner.idle_rx.recv_timeout(self.inner.timeout),
        };
        let executor = match waited {
            Ok(executor) => executor,
            Err(RecvTimeoutError::Timeout) => {
                log::error!(
                    "no database connection available after {}s",
                    self.inner.timeout.as_secs()
                );
                return Err(DbError::Other(format!(
                    "timed out after {}s waiting for a pooled connection",
                    self.inner.timeout.as_secs()
                )));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(DbError::Other("connection pool is closed".to_string()));
            }
        };

        #[cfg(feature = "metrics")]
        crate::metrics::METRICS.record_connection_wait(start.elapsed());
        #[cfg(not(feature = "metrics"))]
        let _ = start;

        Ok(PooledConnection {
            executor: Some(executor),
            pool: Arc::clone(&self.inner),
        })
    }
}

/// A checked-out connection; derefs to [`PgExecutor`].
pub struct PooledConnection {
    executor: Option<PgExecutor>,
    pool: Arc<PoolInner>,
}

impl Deref for PooledConnection {
    type Target = PgExecutor;

    fn deref(&self) -> &PgExecutor {
        // Only `Drop` takes the executor out.
        self.executor.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(executor) = self.executor.take() else {
            return;
        };

        let executor = if !executor.needs_health_check() {
            executor
        } else if matches!(executor.check_health(), Ok(true)) {
            executor.mark_healthy();
            executor
        } else {
            match connection::connect(&self.pool.url) {
                Ok(client) => {
                    log::warn!("replaced unhealthy pooled connection");
                    PgExecutor::new(client)
                }
                Err(e) => {
                    self.pool.lost.record();
                    log::error!(
                        "failed to replace unhealthy pooled connection ({} lost): {e}",
                        self.pool.lost.count()
                    );
                    return;
                }
            }
        };

        let _ = self.pool.idle_tx.send(executor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lost_slots_are_claimed_once_each() {
        let lost = LostSlots::default();
        assert!(!lost.claim());

        lost.record();
        lost.record();
        assert_eq!(lost.count(), 2);
        assert!(lost.claim());
        assert!(lost.claim());
        assert!(!lost.claim());
        assert_eq!(lost.count(), 0);
    }

    #[test]
    fn test_concurrent_claims_never_exceed_lost_count() {
        let lost = Arc::new(LostSlots::default());
        for _ in 0..3 {
            lost.record();
        }
        let claimed: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let lost = Arc::clone(&lost);
                    s.spawn(move || usize::from(lost.claim()))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(claimed, 3);
        assert_eq!(lost.count(), 0);
    }
}

//! Periodic sweeps of expired nonces and stale rate-limit windows.
//!
//! Runs off the request path. Each sweep step holds a store lock for one
//! batch or one key at a time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::Result;
use crate::nonce::NonceStore;
use crate::rate_limit::RateLimiter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub nonces_deleted: usize,
    pub rate_entries_evicted: usize,
}

#[derive(Clone)]
pub struct Maintenance {
    nonces: NonceStore,
    limiter: Arc<RateLimiter>,
    retention_days: u32,
}

impl Maintenance {
    pub fn new(nonces: NonceStore, limiter: Arc<RateLimiter>, retention_days: u32) -> Self {
        Self {
            nonces,
            limiter,
            retention_days,
        }
    }

    /// One pass over both stores.
    pub fn run_once(&self) -> Result<SweepReport> {
        let rate_entries_evicted = self.limiter.sweep();
        let nonces_deleted = self.nonces.sweep_expired(self.retention_days)?;
        tracing::debug!(nonces_deleted, rate_entries_evicted, "maintenance sweep done");
        Ok(SweepReport {
            nonces_deleted,
            rate_entries_evicted,
        })
    }

    /// Run [`run_once`](Self::run_once) every `every` on the current tokio
    /// runtime, starting immediately. Sweeps run on the blocking pool.
    pub fn spawn(self, every: Duration) -> MaintenanceHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }
                let job = self.clone();
                match tokio::task::spawn_blocking(move || job.run_once()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "maintenance sweep failed"),
                    Err(e) => tracing::error!(error = %e, "maintenance sweep panicked"),
                }
            }
            tracing::debug!("maintenance task stopped");
        });
        MaintenanceHandle {
            shutdown: shutdown_tx,
            task: Some(task),
        }
    }
}

/// Owner of a running maintenance task. Dropping it aborts the task.
pub struct MaintenanceHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Stop after the sweep in progress, if any, and wait for the task.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, Utc};

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RateLimitConfig;
    use crate::nonce::MemoryNonceBackend;

    fn parts() -> (Maintenance, NonceStore, Arc<RateLimiter>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let nonces = NonceStore::new(Arc::new(MemoryNonceBackend::new()), clock.clone());
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default(), clock.clone()));
        let maintenance = Maintenance::new(nonces.clone(), limiter.clone(), 7);
        (maintenance, nonces, limiter, clock)
    }

    #[test]
    fn run_once_sweeps_both_stores() {
        let (maintenance, nonces, limiter, clock) = parts();
        let old = nonces.mint("doc-1").unwrap();
        limiter.check_default("1.2.3.4", "mint");

        clock.advance(ChronoDuration::days(8));
        let fresh = nonces.mint("doc-1").unwrap();

        let report = maintenance.run_once().unwrap();
        assert_eq!(
            report,
            SweepReport {
                nonces_deleted: 1,
                rate_entries_evicted: 1
            }
        );
        assert!(nonces.peek(&old.nonce).unwrap().is_none());
        assert!(nonces.peek(&fresh.nonce).unwrap().is_some());
        assert!(limiter.is_empty());
    }

    #[tokio::test]
    async fn spawned_task_sweeps_and_shuts_down() {
        let (maintenance, _, limiter, clock) = parts();
        limiter.check_default("1.2.3.4", "mint");
        clock.advance(ChronoDuration::minutes(5));

        let handle = maintenance.spawn(Duration::from_millis(10));
        for _ in 0..100 {
            if limiter.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(limiter.is_empty());
        handle.shutdown().await;
    }
}

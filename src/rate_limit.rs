//! Fixed-window request counter keyed by (client identity, endpoint).
//!
//! Fixed, not sliding: a client can get up to twice the nominal rate across a
//! window boundary (the tail of one window plus the head of the next). That
//! is a known property of the scheme and acceptable for abuse throttling.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::RateLimitConfig;

/// Windows longer than a year are clamped to keep timestamp arithmetic in range.
const MAX_WINDOW_MS: u64 = 365 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RateKey {
    client: String,
    endpoint: String,
}

#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    count: u32,
    window_start: DateTime<Utc>,
    window: Duration,
}

impl RateLimitEntry {
    /// The count is only meaningful while `now - window_start < window`.
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now - self.window_start < self.window
    }

    fn reset_at(&self) -> DateTime<Utc> {
        self.window_start + self.window
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

/// In-process rate limiter. Construct one per server and share it by `Arc`.
pub struct RateLimiter {
    entries: Mutex<HashMap<RateKey, RateLimitEntry>>,
    defaults: RateLimitConfig,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(defaults: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            defaults,
            clock,
        }
    }

    /// Check with the configured default limit and window.
    pub fn check_default(&self, client: &str, endpoint: &str) -> RateLimitDecision {
        self.check(
            client,
            endpoint,
            self.defaults.max_requests,
            self.defaults.window_ms,
        )
    }

    /// Count one request and decide whether it is admitted.
    ///
    /// Lookup, window roll-over and increment happen under one lock, so
    /// concurrent requests on the same key never undercount.
    pub fn check(
        &self,
        client: &str,
        endpoint: &str,
        limit: u32,
        window_ms: u64,
    ) -> RateLimitDecision {
        let now = self.clock.now();
        let window = Duration::milliseconds(window_ms.min(MAX_WINDOW_MS) as i64);

        // A zero window can never hold a count, so it would admit everything.
        if limit == 0 || window_ms == 0 {
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: now + window,
            };
        }

        let key = RateKey {
            client: client.to_string(),
            endpoint: endpoint.to_string(),
        };
        let mut entries = self.entries.lock();

        match entries.get_mut(&key) {
            Some(entry) if entry.is_live(now) => {
                if entry.count >= limit {
                    tracing::debug!(client, endpoint, "rate limit exceeded");
                    return RateLimitDecision {
                        allowed: false,
                        remaining: 0,
                        reset_at: entry.reset_at(),
                    };
                }
                entry.count += 1;
                RateLimitDecision {
                    allowed: true,
                    remaining: limit - entry.count,
                    reset_at: entry.reset_at(),
                }
            }
            _ => {
                // Absent or stale: replace, never increment a dead window.
                let entry = RateLimitEntry {
                    count: 1,
                    window_start: now,
                    window,
                };
                entries.insert(key, entry);
                RateLimitDecision {
                    allowed: true,
                    remaining: limit - 1,
                    reset_at: entry.reset_at(),
                }
            }
        }
    }

    /// Current window state without counting a request.
    pub fn info(&self, client: &str, endpoint: &str, limit: u32) -> Option<RateLimitDecision> {
        let now = self.clock.now();
        let key = RateKey {
            client: client.to_string(),
            endpoint: endpoint.to_string(),
        };
        let entries = self.entries.lock();
        let entry = entries.get(&key).filter(|e| e.is_live(now))?;
        Some(RateLimitDecision {
            allowed: entry.count < limit,
            remaining: limit.saturating_sub(entry.count),
            reset_at: entry.reset_at(),
        })
    }

    /// Clear one endpoint, or every endpoint, for a client.
    pub fn reset(&self, client: &str, endpoint: Option<&str>) {
        let mut entries = self.entries.lock();
        match endpoint {
            Some(endpoint) => {
                entries.remove(&RateKey {
                    client: client.to_string(),
                    endpoint: endpoint.to_string(),
                });
            }
            None => entries.retain(|k, _| k.client != client),
        }
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Evict entries whose window has elapsed.
    ///
    /// Keys are snapshotted first and then removed one lock acquisition at a
    /// time, re-checking staleness, so a request that renewed the window in
    /// between is not lost. The snapshot scan holds the lock for a read over
    /// the map but performs no mutation; each removal holds it for one entry.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let stale: Vec<RateKey> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, e)| !e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect();

        let mut removed = 0;
        for key in stale {
            let mut entries = self.entries.lock();
            if entries.get(&key).is_some_and(|e| !e.is_live(now)) {
                entries.remove(&key);
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "stale rate-limit entries swept");
        }
        removed
    }
}

//! Rate limiting of failed logins per identity.
//!
//! Entries live for one window from the first failure. Expiry is checked
//! lazily whenever an entry is read or incremented, and stores drop expired
//! entries while recording new ones; nothing sweeps in the background.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

use super::{error::StoreError, types::RateLimitEntry};

pub const DEFAULT_MAX_FAILURES: u32 = 5;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Map size above which the in-memory store drops expired entries on increment.
const PRUNE_THRESHOLD: usize = 1024;

/// Failed-attempt bookkeeping. `increment` must be atomic per identity.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Current entry, `None` when absent or when its window has elapsed.
    async fn get(&self, identity: &str) -> Result<Option<RateLimitEntry>, StoreError>;

    /// Count one attempt, opening a new window if none is active.
    async fn increment(&self, identity: &str) -> Result<RateLimitEntry, StoreError>;

    async fn clear(&self, identity: &str) -> Result<(), StoreError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitPolicy {
    max_failures: u32,
    window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_failures: DEFAULT_MAX_FAILURES,
            window: DEFAULT_WINDOW,
        }
    }
}

impl RateLimitPolicy {
    #[must_use]
    pub fn new(max_failures: u32, window: Duration) -> Self {
        Self {
            max_failures: max_failures.max(1),
            window,
        }
    }

    #[must_use]
    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Remaining lockout for `entry` at `now`, or `None` when attempts are allowed.
    #[must_use]
    pub fn retry_after(&self, entry: &RateLimitEntry, now: DateTime<Utc>) -> Option<Duration> {
        if entry.failure_count < self.max_failures || window_elapsed(entry, self.window, now) {
            return None;
        }

        let expires_at = entry
            .window_start
            .checked_add_signed(window_delta(self.window))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let remaining = expires_at.signed_duration_since(now);
        let millis = u64::try_from(remaining.num_milliseconds()).unwrap_or(0);
        Some(Duration::from_secs(millis.div_ceil(1000).max(1)))
    }
}

pub(crate) fn window_delta(window: Duration) -> TimeDelta {
    TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX)
}

pub(crate) fn window_elapsed(entry: &RateLimitEntry, window: Duration, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(entry.window_start) >= window_delta(window)
}

/// In-process store for single-instance deployments and tests.
#[derive(Debug)]
pub struct MemoryRateLimitStore {
    window: Duration,
    prune_threshold: usize,
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl MemoryRateLimitStore {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            prune_threshold: PRUNE_THRESHOLD,
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_prune_threshold(mut self, entries: usize) -> Self {
        self.prune_threshold = entries;
        self
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn get(&self, identity: &str) -> Result<Option<RateLimitEntry>, StoreError> {
        let mut entries = self.entries.lock().await;
        let now = Utc::now();
        if entries
            .get(identity)
            .is_some_and(|entry| window_elapsed(entry, self.window, now))
        {
            entries.remove(identity);
        }
        Ok(entries.get(identity).cloned())
    }

    async fn increment(&self, identity: &str) -> Result<RateLimitEntry, StoreError> {
        let mut entries = self.entries.lock().await;
        let now = Utc::now();
        if entries.len() >= self.prune_threshold {
            entries.retain(|_, entry| !window_elapsed(entry, self.window, now));
        }

        let entry = entries
            .entry(identity.to_string())
            .or_insert_with(|| RateLimitEntry {
                identity: identity.to_string(),
                failure_count: 0,
                window_start: now,
            });

        if window_elapsed(entry, self.window, now) {
            entry.failure_count = 0;
            entry.window_start = now;
        }
        entry.failure_count = entry.failure_count.saturating_add(1);

        Ok(entry.clone())
    }

    async fn clear(&self, identity: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(identity);
        Ok(())
    }
}

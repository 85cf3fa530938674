use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::domain::types::RateLimitRecord;
use crate::error::ErrorKind;

/// Fixed-window attempt counter keyed by identifier.
///
/// Each `check` counts as one attempt. The first attempt opens a window of
/// `window` length; once more than `max_attempts` land in it, further checks
/// fail until the window closes.
pub struct RateLimiter {
    max_attempts: u32,
    window: Duration,
    records: DashMap<String, RateLimitRecord>,
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            window,
            records: DashMap::new(),
        }
    }

    pub fn check(&self, identifier: &str) -> Result<RateLimitRecord, ErrorKind> {
        self.check_at(identifier, Utc::now())
    }

    /// Record one attempt at `now` and return the updated window.
    pub fn check_at(
        &self,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<RateLimitRecord, ErrorKind> {
        // The entry guard holds the shard lock, so increment and read are one step.
        let mut entry = self
            .records
            .entry(identifier.to_owned())
            .or_insert_with(|| RateLimitRecord {
                identifier: identifier.to_owned(),
                window_start: now,
                attempts: 0,
                retry_at: now + self.window,
            });

        if now >= entry.retry_at {
            entry.window_start = now;
            entry.attempts = 0;
            entry.retry_at = now + self.window;
        }
        entry.attempts = entry.attempts.saturating_add(1);

        if entry.attempts > self.max_attempts {
            return Err(ErrorKind::RateLimitExceeded {
                retry_at: entry.retry_at,
            });
        }
        Ok((*entry).clone())
    }

    /// Attempts counted in the identifier's current window.
    pub fn attempts(&self, identifier: &str) -> u32 {
        self.attempts_at(identifier, Utc::now())
    }

    pub fn attempts_at(&self, identifier: &str, now: DateTime<Utc>) -> u32 {
        self.records
            .get(identifier)
            .filter(|r| now < r.retry_at)
            .map_or(0, |r| r.attempts)
    }

    pub fn purge_expired(&self) -> u64 {
        self.purge_expired_at(Utc::now())
    }

    /// Drop windows closed at `now`. Returns how many were removed.
    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> u64 {
        let before = self.records.len();
        self.records.retain(|_, r| now < r.retry_at);
        before.saturating_sub(self.records.len()) as u64
    }
}

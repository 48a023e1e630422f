//! Fixed-window request limiter keyed by client address, backed by DashMap.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: DateTime<Utc>,
}

/// Allows at most `per_minute` requests per key in each one-minute window.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    per_minute: u32,
}

impl RateLimiter {
    /// A limit of zero disables limiting.
    pub fn new(per_minute: u32) -> Self {
        Self {
            windows: DashMap::new(),
            per_minute,
        }
    }

    /// Check and consume one request for `key`.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Utc::now())
    }

    pub fn check_at(&self, key: &str, now: DateTime<Utc>) -> bool {
        if self.per_minute == 0 {
            return true;
        }

        let mut window = self.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            started: now,
        });
        if now.signed_duration_since(window.started) >= Duration::minutes(1) {
            window.count = 0;
            window.started = now;
        }
        if window.count >= self.per_minute {
            return false;
        }
        window.count += 1;
        true
    }

    /// Drop windows that have been idle for over a minute.
    pub fn prune(&self, now: DateTime<Utc>) {
        self.windows
            .retain(|_, w| now.signed_duration_since(w.started) < Duration::minutes(1));
    }
}

//! Per-key exponential requeue backoff.
//!
//! Each failed attempt for a key doubles (scaled by `speed`) the delay
//! before the next one, up to a cap. Failure counts expire once a key has
//! been quiet for 1.3 times the cap, so a long-idle object starts over.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

struct Failures {
    count: u32,
    last: Instant,
}

pub struct ItemBackoff<K> {
    base: Duration,
    max: Duration,
    speed: f64,
    expiry: Duration,
    failures: Mutex<HashMap<K, Failures>>,
}

impl<K: Eq + Hash + Clone> ItemBackoff<K> {
    pub fn new(base: Duration, max: Duration, speed: f64) -> Self {
        Self {
            base,
            max,
            speed,
            expiry: max.mul_f64(1.3),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// 100ms doubling up to 10 minutes. Replaces immediate requeues.
    pub fn quick() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(600), 2.0)
    }

    /// 1s doubling up to 10 minutes.
    pub fn slow_1s() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(600), 2.0)
    }

    /// 10s doubling up to 10 minutes.
    pub fn slow_10s() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(600), 2.0)
    }

    /// 1 minute doubling up to 1 hour, one step per failure.
    pub fn ultra_slow_1m() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(3600), 1.0)
    }

    /// Record a failure for `key` and return the delay before its next attempt.
    pub fn when(&self, key: &K) -> Duration {
        let now = Instant::now();
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);

        let entry = failures.entry(key.clone()).or_insert(Failures {
            count: 0,
            last: now,
        });
        if now.duration_since(entry.last) > self.expiry {
            entry.count = 0;
        }
        let exp = entry.count;
        entry.count += 1;
        entry.last = now;

        let nanos = self.base.as_nanos() as f64 * 2f64.powf(self.speed * f64::from(exp));
        if !nanos.is_finite() || nanos >= self.max.as_nanos() as f64 {
            return self.max;
        }
        Duration::from_nanos(nanos as u64)
    }

    /// Number of failures recorded for `key`.
    pub fn requeues(&self, key: &K) -> u32 {
        let failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        match failures.get(key) {
            Some(f) if f.last.elapsed() <= self.expiry => f.count,
            _ => 0,
        }
    }

    /// Reset the failure count for `key`.
    pub fn forget(&self, key: &K) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

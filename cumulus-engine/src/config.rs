//! Backoff tiers used by the error classifier and the driver.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Requeue delays assigned to classified failures.
///
/// The right values depend on provider quotas, so they are configuration and
/// not constants. Built once at start-up and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Expected steady-state backoff: rate limiting and conflicts.
    #[serde(with = "duration_secs")]
    pub short: Duration,
    /// Failures that need an external fix: credentials, unknown errors.
    #[serde(with = "duration_secs")]
    pub long: Duration,
}

impl BackoffPolicy {
    pub fn new(short: Duration, long: Duration) -> Self {
        Self { short, long }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            short: Duration::from_secs(10),
            long: Duration::from_secs(300),
        }
    }
}

/// Serialize a `Duration` as whole seconds.
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

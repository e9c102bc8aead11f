//! Injectable time source for deterministic threshold math.
//!
//! All elapsed-time comparisons in the orchestrator (escalation ladders,
//! reminder cooldowns, reference sequences) read the current instant from a
//! `Clock` rather than calling `Utc::now()` ad hoc, so sweeps can be driven
//! with fixed timestamps in tests.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, RwLock};

/// A source of "now".
pub trait Clock: Send + Sync {
    /// Current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Shared reference to a clock.
pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to an explicit instant, advanced manually.
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    /// Create a clock pinned to `instant`.
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(instant),
        }
    }

    /// Replace the pinned instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut now = match self.now.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *now = instant;
    }

    /// Move the pinned instant forward.
    pub fn advance(&self, delta: Duration) {
        let mut now = match self.now.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *now += delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

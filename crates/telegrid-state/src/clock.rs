//! Injectable wall-clock abstraction.
//!
//! Every timestamp persisted by the manager comes through a [`Clock`], so
//! tests can pin time and make scenario expectations exact.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Nanosecond-resolution time source.
pub trait Clock: Send + Sync {
    fn now_ns(&self) -> u64;
}

/// Wall time since the Unix epoch.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ns(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64
    }
}

/// Clock that only moves when told to, for deterministic tests.
#[derive(Debug, Default)]
pub struct FixedClock {
    now_ns: AtomicU64,
}

impl FixedClock {
    pub fn at(now_ns: u64) -> Self {
        Self {
            now_ns: AtomicU64::new(now_ns),
        }
    }

    pub fn set(&self, now_ns: u64) {
        self.now_ns.store(now_ns, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ns: u64) {
        self.now_ns.fetch_add(delta_ns, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
}

/// Converts seconds to nanoseconds.
#[inline]
pub const fn sec_to_ns(sec: u64) -> u64 {
    sec * 1_000_000_000
}

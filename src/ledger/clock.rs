//! Ledger time source.
//!
//! Timestamps are unix seconds. The ledger reads the clock once per
//! transaction, and the value travels inside the journalled event so replay
//! never consults the clock again.

use chrono::Utc;

pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall-clock time from the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        Utc::now().timestamp().max(0) as u64
    }
}

#[cfg(test)]
pub use manual::ManualClock;

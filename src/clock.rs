//! Wall-clock abstraction supplying script timestamps.

use std::time::{SystemTime, UNIX_EPOCH};

/// Thread-safe time source for the coordinator.
///
/// Every script invocation receives the current time from this trait, in
/// microseconds since the UNIX epoch. The scripts trust the *calling* client's
/// clock, so processes sharing a rule must keep their clocks synchronized
/// (NTP; drift within one window period). Calls must be safe concurrently.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current wall-clock time in microseconds since the UNIX epoch.
    fn now_micros(&self) -> u64;
}

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    /// Returns 0 if the system clock reads before the epoch.
    fn now_micros(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
    }
}

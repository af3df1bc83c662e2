//! Time adapters.
//!
//! - [`SystemTimeAdapter`]: `std::time::Instant` for the monotonic reading
//!   and `SystemTime` for the wall clock. Used by the simulator.
//! - [`ManualTime`]: shared, hand-advanced time for tests and replays.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::app::ports::TimePort;

/// Host clock.
pub struct SystemTimeAdapter {
    start: Instant,
    offset_millis: i64,
}

impl Default for SystemTimeAdapter {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SystemTimeAdapter {
    /// `offset_millis` is reported as the local timezone + DST offset.
    pub fn new(offset_millis: i64) -> Self {
        Self {
            start: Instant::now(),
            offset_millis,
        }
    }
}

impl TimePort for SystemTimeAdapter {
    fn monotonic_millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn system_utc_millis(&self) -> i64 {
        // A host clock set before 1970 reads as the epoch.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as i64)
    }

    fn local_offset_millis(&self) -> i64 {
        self.offset_millis
    }
}

/// Hand-driven time. Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    monotonic: Arc<AtomicU64>,
    utc: Arc<AtomicI64>,
    offset: Arc<AtomicI64>,
}

impl ManualTime {
    pub fn new(monotonic_millis: u64, utc_millis: i64, offset_millis: i64) -> Self {
        Self {
            monotonic: Arc::new(AtomicU64::new(monotonic_millis)),
            utc: Arc::new(AtomicI64::new(utc_millis)),
            offset: Arc::new(AtomicI64::new(offset_millis)),
        }
    }

    /// Move both monotonic and wall time forward.
    pub fn advance(&self, millis: u64) {
        self.monotonic.fetch_add(millis, Ordering::SeqCst);
        self.utc.fetch_add(millis as i64, Ordering::SeqCst);
    }

    pub fn set_utc_millis(&self, millis: i64) {
        self.utc.store(millis, Ordering::SeqCst);
    }

    pub fn set_offset_millis(&self, millis: i64) {
        self.offset.store(millis, Ordering::SeqCst);
    }
}

impl TimePort for ManualTime {
    fn monotonic_millis(&self) -> u64 {
        self.monotonic.load(Ordering::SeqCst)
    }

    fn system_utc_millis(&self) -> i64 {
        self.utc.load(Ordering::SeqCst)
    }

    fn local_offset_millis(&self) -> i64 {
        self.offset.load(Ordering::SeqCst)
    }
}

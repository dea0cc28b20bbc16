//! Abstract clock, consumed by the core instead of calling `SystemTime` directly.
//!
//! The core is single-writer and cooperative (see the design spec's
//! concurrency model); every timestamp and every timer tick flows through
//! this trait so tests can drive time deterministically without sleeping.

use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    /// Current time as Unix seconds, used for Nostr `created_at` and packet timestamps.
    fn unix_seconds(&self) -> u64;

    /// Monotonic milliseconds, used for retry/staleness/rotation bookkeeping.
    fn monotonic_millis(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_secs()
    }

    fn monotonic_millis(&self) -> u64 {
        // Instant has no fixed epoch; callers only ever diff two readings,
        // so anchoring to process start is sufficient here.
        use std::sync::OnceLock;
        use std::time::Instant;
        static START: OnceLock<Instant> = OnceLock::new();
        let start = *START.get_or_init(Instant::now);
        start.elapsed().as_millis() as u64
    }
}

/// Deterministic clock for tests: advances only when told to.
#[derive(Debug, Default)]
pub struct FakeClock {
    secs: std::sync::atomic::AtomicU64,
    millis: std::sync::atomic::AtomicU64,
}

impl FakeClock {
    pub fn new(start_secs: u64) -> Self {
        Self {
            secs: std::sync::atomic::AtomicU64::new(start_secs),
            millis: std::sync::atomic::AtomicU64::new(start_secs * 1000),
        }
    }

    pub fn advance(&self, secs: u64) {
        self.secs.fetch_add(secs, std::sync::atomic::Ordering::SeqCst);
        self.millis.fetch_add(secs * 1000, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn advance_millis(&self, millis: u64) {
        self.millis.fetch_add(millis, std::sync::atomic::Ordering::SeqCst);
        self.secs.fetch_add(millis / 1000, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn unix_seconds(&self) -> u64 {
        self.secs.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn monotonic_millis(&self) -> u64 {
        self.millis.load(std::sync::atomic::Ordering::SeqCst)
    }
}

//! Monotonic time source and process-wide drain signal (spec §2.1, §5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

/// A monotonic time source. Exists as a trait so tests can supply a fixed
/// or steppable clock instead of wall time.
pub trait Clock: Send + Sync {
    /// Monotonic instant, suitable for measuring durations and TTL expiry.
    fn now(&self) -> Instant;

    /// Wall-clock instant, suitable for stamping `Transmutation::time`.
    fn utc_now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A process-wide "draining" flag, observable by any in-flight task.
///
/// One state transition: `running -> draining`. Monotonic: once set, it
/// never reverts. Checked at every stage boundary (before each Extract
/// call, before each Transform, before each Load) per spec §5.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    draining: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            draining: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flip to `draining`. Idempotent.
    pub fn begin_drain(&self) {
        self.draining.store(true, Ordering::SeqCst);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// A per-task cancellation flag, with the same monotonic semantics as
/// `ShutdownSignal` but scoped to one scheduled Configuration (spec §4.9).
#[derive(Debug, Clone)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for CancellationFlag {
    fn default() -> Self {
        Self::new()
    }
}

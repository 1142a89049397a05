use chrono::{DateTime, Duration as ChronoDuration, Local};
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of time for the engine.
/// `now_ms` is monotonic and drives every interval and elapsed-time diff;
/// `now_local` is wall time and is only used for the `actionDate` shown to the user.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
    fn now_local(&self) -> DateTime<Local>;
}

/// Production clock on top of the tokio monotonic clock.
/// Using `tokio::time::Instant` (not std) lets driver tests run on paused time.
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn now_local(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Hand-driven clock: time moves only through `advance` / `set`.
pub struct ManualClock {
    now_ms: AtomicU64,
    wall_origin: DateTime<Local>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now_ms: AtomicU64::new(0),
            wall_origin: Local::now(),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn now_local(&self) -> DateTime<Local> {
        self.wall_origin + ChronoDuration::milliseconds(self.now_ms() as i64)
    }
}

/// `YYYY-MM-DD HH:MM:SS`, the format the tray expects in `actionDate`.
pub fn format_action_date(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

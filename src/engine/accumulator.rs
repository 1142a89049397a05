use crate::config::TICK_MS;

/// Elapsed active milliseconds for the current session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeAccumulator {
    accumulated_ms: u64,
}

impl TimeAccumulator {
    pub fn new(accumulated_ms: u64) -> Self {
        Self { accumulated_ms }
    }

    pub fn get(&self) -> u64 {
        self.accumulated_ms
    }

    pub fn set(&mut self, ms: u64) {
        self.accumulated_ms = ms;
    }

    /// One fixed one-second step.
    pub fn tick(&mut self) {
        self.accumulated_ms = self.accumulated_ms.saturating_add(TICK_MS);
    }

    /// Apply a one-shot delta and clamp the result to `[min, max]`.
    pub fn adjust(&mut self, delta_ms: i64, min: u64, max: u64) -> u64 {
        let next = if delta_ms >= 0 {
            self.accumulated_ms.saturating_add(delta_ms as u64)
        } else {
            self.accumulated_ms.saturating_sub(delta_ms.unsigned_abs())
        };
        self.accumulated_ms = next.clamp(min, max);
        self.accumulated_ms
    }

    /// Idle discount: subtract, floored at zero, no upper clamp.
    pub fn discount(&mut self, ms: u64) -> u64 {
        self.accumulated_ms = self.accumulated_ms.saturating_sub(ms);
        self.accumulated_ms
    }
}

use super::TimeAccumulator;
use tracing::debug;

/// Timestamp that replaces per-second ticking while the window is hidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilitySnapshot {
    pub accumulated_ms_at_hide: u64,
    pub hidden_at_ms: u64,
}

impl VisibilitySnapshot {
    fn resolve(&self, now_ms: u64) -> u64 {
        self.accumulated_ms_at_hide
            .saturating_add(now_ms.saturating_sub(self.hidden_at_ms))
    }
}

/// Window visibility bookkeeping.
/// The engine owns the tick role; these methods only report whether it
/// should be stopped or restarted.
#[derive(Debug, Default)]
pub struct VisibilityOptimizer {
    hidden: bool,
    snapshot: Option<VisibilitySnapshot>,
}

impl VisibilityOptimizer {
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn snapshot(&self) -> Option<VisibilitySnapshot> {
        self.snapshot
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    pub(crate) fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    /// Record the hide. Returns true when a new snapshot was armed (caller stops ticking).
    pub fn on_hide(&mut self, running: bool, acc: &TimeAccumulator, now_ms: u64) -> bool {
        self.hidden = true;
        if !running || self.snapshot.is_some() {
            return false;
        }
        self.arm(acc, now_ms);
        true
    }

    /// Fold hidden time back in. Returns true when a snapshot was consumed
    /// (caller restarts ticking if still running).
    pub fn on_show(&mut self, acc: &mut TimeAccumulator, now_ms: u64) -> bool {
        self.hidden = false;
        self.take(acc, now_ms)
    }

    /// Fold hidden time in and re-arm a fresh snapshot at `now_ms`, without
    /// resuming ticks. Used by checkpoints and by edits made while hidden.
    pub fn resolve_without_restoring(&mut self, acc: &mut TimeAccumulator, now_ms: u64) -> bool {
        if self.take(acc, now_ms) {
            self.arm(acc, now_ms);
            return true;
        }
        false
    }

    pub(crate) fn arm(&mut self, acc: &TimeAccumulator, now_ms: u64) {
        self.snapshot = Some(VisibilitySnapshot {
            accumulated_ms_at_hide: acc.get(),
            hidden_at_ms: now_ms,
        });
    }

    /// Consume the snapshot into `acc`.
    pub(crate) fn take(&mut self, acc: &mut TimeAccumulator, now_ms: u64) -> bool {
        match self.snapshot.take() {
            Some(snap) => {
                let resolved = snap.resolve(now_ms);
                debug!(
                    "[VISIBILITY] Resolved hidden time: {}ms -> {}ms",
                    snap.accumulated_ms_at_hide, resolved
                );
                acc.set(resolved);
                true
            }
            None => false,
        }
    }

    /// Drop the snapshot without folding (session ended).
    pub(crate) fn clear(&mut self) {
        self.snapshot = None;
    }

    pub(crate) fn projected_ms(&self, now_ms: u64) -> Option<u64> {
        self.snapshot.map(|s| s.resolve(now_ms))
    }
}

//! Named, cancellable timers keyed by role.
//! A role has at most one live task; starting a role that is already live is refused.
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Periodic processes owned by the session controller.
/// Declaration order is the tie-break when two deadlines coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Tick,
    Idle,
    Grace,
    IdleResume,
    Checkpoint,
}

impl Role {
    pub fn name(self) -> &'static str {
        match self {
            Role::Tick => "tick",
            Role::Idle => "idle",
            Role::Grace => "grace",
            Role::IdleResume => "idle-resume",
            Role::Checkpoint => "checkpoint",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What an interval does when the loop wakes up after several periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missed {
    /// Fire once per elapsed period.
    CatchUp,
    /// Fire once, then wait for the next period boundary.
    Skip,
}

#[derive(Debug, Clone, Copy)]
enum Repeat {
    Once,
    Every { period_ms: u64, missed: Missed },
}

#[derive(Debug, Clone, Copy)]
struct Task {
    due_ms: u64,
    repeat: Repeat,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: BTreeMap<Role, Task>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a repeating task; first fire at `now_ms + period_ms`.
    pub fn start_interval(&mut self, role: Role, period_ms: u64, now_ms: u64, missed: Missed) -> bool {
        if self.refuse_duplicate(role) {
            return false;
        }
        let period_ms = period_ms.max(1);
        self.tasks.insert(
            role,
            Task {
                due_ms: now_ms.saturating_add(period_ms),
                repeat: Repeat::Every { period_ms, missed },
            },
        );
        debug!("[SCHEDULER] Started {} every {}ms", role, period_ms);
        true
    }

    /// Arm a one-shot task; removed when it fires.
    pub fn start_timeout(&mut self, role: Role, delay_ms: u64, now_ms: u64) -> bool {
        if self.refuse_duplicate(role) {
            return false;
        }
        self.tasks.insert(
            role,
            Task {
                due_ms: now_ms.saturating_add(delay_ms),
                repeat: Repeat::Once,
            },
        );
        debug!("[SCHEDULER] Armed {} in {}ms", role, delay_ms);
        true
    }

    fn refuse_duplicate(&self, role: Role) -> bool {
        if self.tasks.contains_key(&role) {
            warn!(
                "[SCHEDULER] Refusing to start {}: an instance is already live",
                role
            );
            return true;
        }
        false
    }

    pub fn cancel(&mut self, role: Role) -> bool {
        let removed = self.tasks.remove(&role).is_some();
        if removed {
            debug!("[SCHEDULER] Cancelled {}", role);
        }
        removed
    }

    pub fn cancel_all(&mut self) {
        if !self.tasks.is_empty() {
            debug!("[SCHEDULER] Cancelling {} task(s)", self.tasks.len());
        }
        self.tasks.clear();
    }

    pub fn is_active(&self, role: Role) -> bool {
        self.tasks.contains_key(&role)
    }

    pub fn live_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn live_roles(&self) -> Vec<Role> {
        self.tasks.keys().copied().collect()
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.tasks.values().map(|t| t.due_ms).min()
    }

    /// Take the earliest task due at or before `now_ms` and re-arm it.
    /// Returns the role and the deadline it was due at.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<(Role, u64)> {
        let (role, task) = self
            .tasks
            .iter()
            .filter(|(_, t)| t.due_ms <= now_ms)
            .min_by_key(|(role, t)| (t.due_ms, **role))
            .map(|(role, t)| (*role, *t))?;

        match task.repeat {
            Repeat::Once => {
                self.tasks.remove(&role);
            }
            Repeat::Every { period_ms, missed } => {
                let next_due = match missed {
                    Missed::CatchUp => task.due_ms + period_ms,
                    Missed::Skip => {
                        let behind = (now_ms - task.due_ms) / period_ms;
                        task.due_ms + (behind + 1) * period_ms
                    }
                };
                if let Some(t) = self.tasks.get_mut(&role) {
                    t.due_ms = next_due;
                }
            }
        }
        Some((role, task.due_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_role_is_refused() {
        let mut s = Scheduler::new();
        assert!(s.start_interval(Role::Tick, 1000, 0, Missed::CatchUp));
        assert!(!s.start_interval(Role::Tick, 500, 0, Missed::CatchUp));
        assert!(!s.start_timeout(Role::Tick, 10, 0));
        assert_eq!(s.live_count(), 1);
        // the first period survives
        assert_eq!(s.next_deadline(), Some(1000));
    }

    #[test]
    fn test_catch_up_fires_every_missed_period() {
        let mut s = Scheduler::new();
        s.start_interval(Role::Tick, 1000, 0, Missed::CatchUp);
        let mut fired = 0;
        while s.pop_due(3500).is_some() {
            fired += 1;
        }
        assert_eq!(fired, 3);
        assert_eq!(s.next_deadline(), Some(4000));
    }

    #[test]
    fn test_skip_fires_once_and_realigns() {
        let mut s = Scheduler::new();
        s.start_interval(Role::Idle, 1000, 0, Missed::Skip);
        assert_eq!(s.pop_due(3500), Some((Role::Idle, 1000)));
        assert_eq!(s.pop_due(3500), None);
        assert_eq!(s.next_deadline(), Some(4000));
    }

    #[test]
    fn test_timeout_is_removed_after_firing() {
        let mut s = Scheduler::new();
        s.start_timeout(Role::Grace, 15_000, 100);
        assert_eq!(s.pop_due(15_099), None);
        assert_eq!(s.pop_due(15_100), Some((Role::Grace, 15_100)));
        assert!(!s.is_active(Role::Grace));
    }

    #[test]
    fn test_ties_break_by_role_order() {
        let mut s = Scheduler::new();
        s.start_interval(Role::Checkpoint, 1000, 0, Missed::Skip);
        s.start_interval(Role::Tick, 1000, 0, Missed::CatchUp);
        assert_eq!(s.pop_due(1000).map(|(r, _)| r), Some(Role::Tick));
        assert_eq!(s.pop_due(1000).map(|(r, _)| r), Some(Role::Checkpoint));
    }
}

use crate::config::IDLE_RESUME_CHECK_MS;
use crate::engine::{EngineError, TimerEngine, TimerStatus};
use crate::ipc::Notification;
use crate::scheduler::{Missed, Role};
use tracing::{debug, info, warn};

impl TimerEngine {
    /// Query the oracle. Failure fails open: `None` means "treat as active".
    fn query_idle(&mut self) -> Option<u64> {
        match self.oracle.idle_ms() {
            Ok(ms) => {
                self.last_idle_ms = Some(ms);
                Some(ms)
            }
            Err(e) => {
                warn!("[IDLE] Idle query failed, treating operator as active: {}", e);
                None
            }
        }
    }

    pub fn last_idle_ms(&self) -> Option<u64> {
        self.last_idle_ms
    }

    /// Periodic idle poll while running. An armed grace timer means we are
    /// already warning; nothing to do until it elapses.
    pub(crate) fn on_idle_check(&mut self, now: u64) {
        let Some(idle) = self.session.idle else {
            self.scheduler.cancel(Role::Idle);
            return;
        };
        if self.scheduler.is_active(Role::Grace) {
            return;
        }
        let Some(idle_ms) = self.query_idle() else {
            return;
        };
        debug!("[IDLE] Idle for {}ms (threshold {}ms)", idle_ms, idle.threshold_ms);
        if idle_ms > idle.threshold_ms {
            info!(
                "[IDLE] Idle threshold exceeded ({}ms), pausing in {}ms unless input resumes",
                idle_ms, idle.grace_ms
            );
            self.notify(Notification::critical(format!(
                "Timer will be paused if system continues idle for another {} seconds.",
                idle.grace_ms / 1000
            )));
            self.scheduler.start_timeout(Role::Grace, idle.grace_ms, now);
        }
    }

    /// Grace period over: re-query and decide.
    pub(crate) fn on_grace_elapsed(&mut self) {
        let Some(idle) = self.session.idle else {
            return;
        };
        match self.query_idle() {
            Some(idle_ms) if idle_ms > idle.threshold_ms => {
                if let Err(e) = self.force_idle_pause(idle_ms) {
                    warn!("[IDLE] Auto-pause skipped: {}", e);
                }
            }
            _ => info!("[IDLE] Input resumed during grace period, keep tracking"),
        }
    }

    /// Auto-pause after sustained idleness. With discard enabled the observed
    /// idle duration is subtracted (floored at zero) before the checkpoint.
    pub fn force_idle_pause(&mut self, idle_ms: u64) -> Result<(), EngineError> {
        if self.state.status != TimerStatus::Running {
            warn!("[FSM] Invalid transition: idle pause while {}", self.state.status);
            return Err(EngineError::InvalidTransition {
                op: "idle pause",
                from: self.state.status,
            });
        }
        let now = self.now_ms();
        self.visibility.take(&mut self.state.accumulator, now);

        let discard = self
            .session
            .idle
            .map(|c| c.discard_idle_time)
            .unwrap_or(self.settings.idle_time_discard);
        if discard {
            let before = self.state.accumulated_ms();
            let after = self.state.accumulator.discount(idle_ms);
            info!(
                "[IDLE] Discarding {}ms of idle time: {}ms -> {}ms",
                idle_ms, before, after
            );
        }

        self.pause_running(now);

        let minutes = idle_ms as f64 / 60_000.0;
        let suffix = if discard { " (discarded from timer)" } else { "" };
        self.notify(
            Notification::critical(format!(
                "Timer is paused because the system was idle for {:.2} minutes{}",
                minutes, suffix
            ))
            .kept(),
        );

        if self.session.idle.is_some() {
            self.scheduler
                .start_interval(Role::IdleResume, IDLE_RESUME_CHECK_MS, now, Missed::Skip);
        }
        Ok(())
    }

    /// Watcher after an idle pause: remind once when the operator is back.
    /// Never resumes the timer itself.
    pub(crate) fn on_idle_resume_check(&mut self) {
        let Some(idle) = self.session.idle else {
            self.scheduler.cancel(Role::IdleResume);
            return;
        };
        // Unknown input state: keep watching
        let Some(idle_ms) = self.query_idle() else {
            return;
        };
        if idle_ms < idle.threshold_ms {
            info!("[IDLE] Operator is back after idle pause");
            self.notify(Notification::info(
                "Timer was paused and you are here again. Remember to resume it.",
            ));
            self.scheduler.cancel(Role::IdleResume);
        }
    }

    /// External "input observed" signal (pointer movement in the main window).
    pub fn user_active(&mut self) {
        if self.scheduler.is_active(Role::IdleResume) {
            self.on_idle_resume_check();
        }
    }
}

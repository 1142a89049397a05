use crate::database::StoreError;
use crate::engine::{SessionConfig, TimerEngine, TimerStatus};
use crate::models::Checkpoint;
use crate::scheduler::Role;
use tracing::{debug, error, info, warn};

/// Store key of the recovery checkpoint.
pub const CHECKPOINT_KEY: &str = "tracking.checkpoint";

impl TimerEngine {
    /// Write `{item, accumulated, comment}` as it stands. No-op when stopped.
    pub(crate) fn write_checkpoint(&mut self) -> Result<(), StoreError> {
        let Some(item) = self.item.clone() else {
            return Ok(());
        };
        let checkpoint = Checkpoint {
            item,
            accumulated_ms: self.state.accumulated_ms(),
            comment: self.state.comment.clone(),
            saved_at: crate::clock::format_action_date(&self.clock.now_local()),
            paused: self.state.status == TimerStatus::Paused,
        };
        let json = serde_json::to_string(&checkpoint)?;
        self.store.set(CHECKPOINT_KEY, &json)?;
        self.state.modified = false;
        debug!(
            "[CHECKPOINT] Saved {}ms for #{}",
            checkpoint.accumulated_ms, checkpoint.item.id
        );
        Ok(())
    }

    /// Explicit save (comment edited, shutdown). Folds hidden time first.
    pub fn save_state(&mut self) -> Result<(), StoreError> {
        if self.state.status == TimerStatus::Stopped {
            return Ok(());
        }
        let now = self.now_ms();
        self.visibility
            .resolve_without_restoring(&mut self.state.accumulator, now);
        self.write_checkpoint()
    }

    /// Periodic checkpoint. A failed write waits for the next interval.
    pub(crate) fn on_checkpoint_tick(&mut self, now: u64) {
        if self.state.status != TimerStatus::Running {
            self.scheduler.cancel(Role::Checkpoint);
            return;
        }
        self.visibility
            .resolve_without_restoring(&mut self.state.accumulator, now);
        if let Err(e) = self.write_checkpoint() {
            warn!(
                "[CHECKPOINT] Failed to save checkpoint, retrying at next interval: {}",
                e
            );
        }
    }

    /// Write through a manual edit when no checkpoint role will pick it up
    /// (paused session, or checkpoints off).
    pub(crate) fn persist_edit(&mut self) {
        if !self.state.modified || self.scheduler.is_active(Role::Checkpoint) {
            return;
        }
        if let Err(e) = self.save_state() {
            warn!("[CHECKPOINT] Failed to save edit, kept for next save: {}", e);
        }
    }

    pub(crate) fn clear_checkpoint(&self) {
        if let Err(e) = self.store.delete(CHECKPOINT_KEY) {
            warn!("[CHECKPOINT] Failed to clear recovery checkpoint: {}", e);
        }
    }

    /// Restore the last checkpoint at process start. A recovered session comes
    /// back Paused; the operator resumes it explicitly.
    /// Never fails: a broken record is logged and discarded.
    pub fn restore(&mut self) -> bool {
        if self.state.status != TimerStatus::Stopped {
            warn!("[RECOVERY] Restore skipped: a session is already {}", self.state.status);
            return false;
        }

        let raw = match self.store.get(CHECKPOINT_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                info!("[RECOVERY] No saved checkpoint found, starting fresh");
                return false;
            }
            Err(e) => {
                error!(
                    "[RECOVERY] Failed to load checkpoint: {}. Starting with default state.",
                    e
                );
                return false;
            }
        };

        let checkpoint: Checkpoint = match serde_json::from_str(&raw) {
            Ok(c) => c,
            Err(e) => {
                warn!("[RECOVERY] Discarding unreadable checkpoint: {}", e);
                self.clear_checkpoint();
                return false;
            }
        };

        info!(
            "[RECOVERY] Restored #{} with {}ms (saved at {}, was {})",
            checkpoint.item.id,
            checkpoint.accumulated_ms,
            checkpoint.saved_at,
            if checkpoint.paused { "paused" } else { "running" }
        );
        self.item = Some(checkpoint.item);
        self.state.status = TimerStatus::Paused;
        self.state.accumulator.set(checkpoint.accumulated_ms);
        self.state.comment = checkpoint.comment;
        self.state.last_action = Some(self.clock.now_local());
        self.state.modified = false;
        self.session = SessionConfig {
            idle: self.settings.idle_config(),
            checkpoint_ms: self.settings.checkpoint_ms(),
        };
        self.emit_status();
        true
    }
}

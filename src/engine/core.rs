use crate::config::{ConfigError, MAX_ADJUSTED_MS, TICK_MS};
use crate::engine::{EngineError, SessionConfig, TimerEngine, TimerState, TimerStatus};
use crate::ipc::{
    ControlCommand, Inbound, Notification, Outbound, TimerAction, TimerCommand, TimerInfo,
    WindowAction,
};
use crate::models::{FinishedEntry, TrackedItem};
use crate::scheduler::{Missed, Role};
use tracing::{debug, error, info, trace, warn};

const MAX_COMMENT_CHARS: usize = 255;

impl TimerEngine {
    pub(crate) fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    fn invalid(&self, op: &'static str) -> EngineError {
        warn!("[FSM] Invalid transition: {} while {}", op, self.state.status);
        EngineError::InvalidTransition {
            op,
            from: self.state.status,
        }
    }

    pub(crate) fn emit_status(&self) {
        let info = TimerInfo {
            is_enabled: self.state.status != TimerStatus::Stopped,
            is_paused: self.state.status == TimerStatus::Paused,
            issue: self.item.clone(),
            action_date: self
                .state
                .last_action
                .as_ref()
                .map(crate::clock::format_action_date),
        };
        self.events.send(Outbound::TimerInfo(info));
    }

    pub(crate) fn notify(&self, notification: Notification) {
        self.events.send(Outbound::Notify(notification));
    }

    /// Arm the roles of a running session. Hidden window: a visibility snapshot instead of ticks.
    fn start_running_roles(&mut self, now: u64) {
        if self.visibility.is_hidden() {
            self.visibility.arm(&self.state.accumulator, now);
        } else {
            self.scheduler
                .start_interval(Role::Tick, TICK_MS, now, Missed::CatchUp);
        }
        if let Some(idle) = self.session.idle {
            self.scheduler
                .start_interval(Role::Idle, idle.check_interval_ms, now, Missed::Skip);
        }
        if let Some(period) = self.session.checkpoint_ms {
            self.scheduler
                .start_interval(Role::Checkpoint, period, now, Missed::Skip);
        }
    }

    /// Fold any hidden time in and stop every role.
    fn stop_running_roles(&mut self, now: u64) {
        self.visibility.take(&mut self.state.accumulator, now);
        self.scheduler.cancel_all();
    }

    /// Stopped → Running for `item`.
    pub fn start(&mut self, item: TrackedItem) -> Result<(), EngineError> {
        if self.state.status != TimerStatus::Stopped {
            return Err(self.invalid("start"));
        }
        let now = self.now_ms();

        info!("[TIMER] Start tracking #{} {}", item.id, item.title);
        self.item = Some(item);
        self.state = TimerState {
            status: TimerStatus::Running,
            last_action: Some(self.clock.now_local()),
            ..TimerState::initial()
        };
        self.session = SessionConfig {
            idle: self.settings.idle_config(),
            checkpoint_ms: self.settings.checkpoint_ms(),
        };
        self.last_idle_ms = None;
        self.start_running_roles(now);
        self.emit_status();
        Ok(())
    }

    /// Running → Paused. Persists a checkpoint immediately.
    pub fn pause(&mut self) -> Result<(), EngineError> {
        if self.state.status != TimerStatus::Running {
            return Err(self.invalid("pause"));
        }
        let now = self.now_ms();
        self.pause_running(now);
        Ok(())
    }

    /// Shared by `pause` and the idle auto-pause. Caller checked `Running`.
    pub(crate) fn pause_running(&mut self, now: u64) {
        self.stop_running_roles(now);
        self.state.status = TimerStatus::Paused;
        self.state.last_action = Some(self.clock.now_local());

        if let Err(e) = self.write_checkpoint() {
            error!("[TIMER] Failed to save checkpoint after pause: {}", e);
        }
        info!(
            "[TIMER] Paused at {}ms",
            self.state.accumulated_ms()
        );
        self.emit_status();
    }

    /// Paused → Running.
    pub fn resume(&mut self) -> Result<(), EngineError> {
        if self.state.status != TimerStatus::Paused {
            return Err(self.invalid("resume"));
        }
        let now = self.now_ms();

        // Paused owns no role except a possible idle-resume watcher
        self.scheduler.cancel_all();
        self.state.status = TimerStatus::Running;
        self.state.last_action = Some(self.clock.now_local());
        self.start_running_roles(now);
        info!("[TIMER] Resumed at {}ms", self.state.accumulated_ms());
        self.emit_status();
        Ok(())
    }

    /// Running|Paused → Stopped. Writes no final checkpoint; the caller submits
    /// the returned entry. The recovery checkpoint is removed.
    pub fn stop(&mut self) -> Result<FinishedEntry, EngineError> {
        if self.state.status == TimerStatus::Stopped {
            return Err(self.invalid("stop"));
        }
        let now = self.now_ms();
        self.stop_running_roles(now);
        self.visibility.clear();

        let item = self.item.take();
        let state = std::mem::replace(&mut self.state, TimerState::initial());
        self.session = SessionConfig::default();
        self.last_idle_ms = None;
        self.clear_checkpoint();

        self.events.send(Outbound::TimerInfo(TimerInfo {
            is_enabled: false,
            is_paused: false,
            issue: item.clone(),
            action_date: None,
        }));

        info!(
            "[TIMER] Stopped {} with {}ms",
            item.as_ref().map(|i| format!("#{}", i.id)).unwrap_or_default(),
            state.accumulated_ms()
        );
        Ok(FinishedEntry {
            item,
            accumulated_ms: state.accumulated_ms(),
            comment: state.comment,
        })
    }

    /// End the current session (if any) and start tracking `item`.
    pub fn switch_item(&mut self, item: TrackedItem) -> Result<Option<FinishedEntry>, EngineError> {
        let finished = match self.state.status {
            TimerStatus::Stopped => None,
            _ => Some(self.stop()?),
        };
        self.start(item)?;
        Ok(finished)
    }

    /// Manual rewind / fast-forward. Clamped to `[0, 24h]`. While running it is
    /// persisted by the next checkpoint; otherwise written through at once.
    pub fn adjust(&mut self, delta_ms: i64) -> Result<u64, EngineError> {
        if !self.settings.advanced_controls {
            warn!("[TIMER] Adjust of {}ms ignored: advanced controls disabled", delta_ms);
            return Err(EngineError::ControlsDisabled);
        }
        if self.state.status == TimerStatus::Stopped {
            return Err(self.invalid("adjust"));
        }
        let now = self.now_ms();
        // Hidden: rebase the snapshot so the edit survives the next show
        self.visibility
            .resolve_without_restoring(&mut self.state.accumulator, now);
        let value = self.state.accumulator.adjust(delta_ms, 0, MAX_ADJUSTED_MS);
        if self.visibility.has_snapshot() {
            self.visibility.arm(&self.state.accumulator, now);
        }
        self.state.modified = true;
        debug!("[TIMER] Adjusted by {}ms to {}ms", delta_ms, value);
        self.persist_edit();
        Ok(value)
    }

    pub fn set_comment(&mut self, text: &str) -> Result<(), EngineError> {
        if self.state.status == TimerStatus::Stopped {
            return Err(self.invalid("comment"));
        }
        self.state.comment = text.chars().take(MAX_COMMENT_CHARS).collect();
        self.state.modified = true;
        self.persist_edit();
        Ok(())
    }

    pub fn on_hide(&mut self) {
        let now = self.now_ms();
        let running = self.state.status == TimerStatus::Running;
        if self
            .visibility
            .on_hide(running, &self.state.accumulator, now)
        {
            self.scheduler.cancel(Role::Tick);
            debug!("[VISIBILITY] Window hidden, ticking replaced by snapshot");
        }
    }

    pub fn on_show(&mut self) {
        let now = self.now_ms();
        if self.visibility.on_show(&mut self.state.accumulator, now)
            && self.state.status == TimerStatus::Running
        {
            self.scheduler
                .start_interval(Role::Tick, TICK_MS, now, Missed::CatchUp);
            debug!("[VISIBILITY] Window shown, ticking restored");
        }
    }

    /// Running + hidden ⇒ snapshot and no tick; Running + visible ⇒ tick.
    fn normalize_visibility(&mut self, now: u64) {
        if self.state.status != TimerStatus::Running {
            return;
        }
        if self.visibility.is_hidden() {
            self.scheduler.cancel(Role::Tick);
            if !self.visibility.has_snapshot() {
                self.visibility.arm(&self.state.accumulator, now);
            }
        } else if !self.scheduler.is_active(Role::Tick) {
            self.scheduler
                .start_interval(Role::Tick, TICK_MS, now, Missed::CatchUp);
        }
    }

    /// Pause/resume from the tray. With the main window hidden the snapshot is
    /// resolved before acting and re-armed after, without restarting ticks.
    pub fn handle_timer_command(&mut self, cmd: TimerCommand) {
        let now = self.now_ms();
        if cmd.main_window_hidden {
            self.visibility.set_hidden(true);
        }
        self.visibility.take(&mut self.state.accumulator, now);

        let result = match cmd.action {
            TimerAction::Pause => self.pause(),
            TimerAction::Resume => self.resume(),
        };
        self.normalize_visibility(now);
        if let Err(e) = result {
            debug!("[IPC] timer {:?} ignored: {}", cmd.action, e);
        }
    }

    pub fn handle_window_action(&mut self, action: WindowAction) {
        match action {
            WindowAction::Show => self.on_show(),
            WindowAction::Hide => self.on_hide(),
            WindowAction::Quit => self.flush(),
            WindowAction::Blur | WindowAction::Focus => {
                trace!("[VISIBILITY] {:?} ignored", action);
            }
        }
    }

    /// Shutdown: a running session is paused (and persisted), a paused one saved.
    pub fn flush(&mut self) {
        let now = self.now_ms();
        self.visibility
            .resolve_without_restoring(&mut self.state.accumulator, now);
        match self.state.status {
            TimerStatus::Running => {
                self.pause_running(now);
            }
            TimerStatus::Paused => {
                if let Err(e) = self.save_state() {
                    error!("[TIMER] Failed to save state on shutdown: {}", e);
                }
            }
            TimerStatus::Stopped => {}
        }
    }

    /// Idle and checkpoint options take effect from the next `start()`.
    pub fn apply_setting(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.settings.apply(key, value)?;
        self.settings.save(self.store.as_ref());
        info!("[CONFIG] {} = {}", key, value);
        Ok(())
    }

    pub fn handle_inbound(&mut self, msg: Inbound) {
        match msg {
            Inbound::Timer(cmd) => self.handle_timer_command(cmd),
            Inbound::Window(ev) => self.handle_window_action(ev.action),
            Inbound::Settings(change) => {
                if let Err(e) = self.apply_setting(&change.key, &change.value_text()) {
                    warn!("[CONFIG] Rejected setting {}: {}", change.key, e);
                }
            }
            Inbound::Activity => self.user_active(),
            Inbound::Control(cmd) => self.handle_control(cmd),
        }
    }

    fn handle_control(&mut self, cmd: ControlCommand) {
        let result = match cmd {
            ControlCommand::Start { issue } => self.switch_item(issue).map(|finished| {
                if let Some(entry) = finished {
                    log_finished(&entry);
                }
            }),
            ControlCommand::Stop => self.stop().map(|entry| log_finished(&entry)),
            ControlCommand::Adjust { delta_ms } => self.adjust(delta_ms).map(|_| ()),
            ControlCommand::Comment { text } => self.set_comment(&text),
        };
        if let Err(e) = result {
            debug!("[IPC] control command ignored: {}", e);
        }
    }

    /// Run every role whose deadline has passed, in deadline order.
    pub fn fire_due(&mut self) -> usize {
        let now = self.now_ms();
        let mut fired = 0;
        while let Some((role, _due)) = self.scheduler.pop_due(now) {
            self.on_timer(role, now);
            fired += 1;
        }
        fired
    }

    fn on_timer(&mut self, role: Role, now: u64) {
        match role {
            Role::Tick => self.state.accumulator.tick(),
            Role::Idle => self.on_idle_check(now),
            Role::Grace => self.on_grace_elapsed(),
            Role::IdleResume => self.on_idle_resume_check(),
            Role::Checkpoint => self.on_checkpoint_tick(now),
        }
    }
}

fn log_finished(entry: &FinishedEntry) {
    match serde_json::to_string(entry) {
        Ok(json) => info!("[TIMER] Finished entry ready for submit: {}", json),
        Err(e) => warn!("[TIMER] Finished entry could not be serialized: {}", e),
    }
}

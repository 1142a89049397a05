use crate::clock::Clock;
use crate::config::{IdleConfig, TrackerSettings};
use crate::database::Store;
use crate::ipc::EventSink;
use crate::models::TrackedItem;
use crate::monitor::IdleOracle;
use crate::scheduler::{Role, Scheduler};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
mod accumulator;
mod core;
mod db;
mod idle;
mod visibility;

pub use accumulator::TimeAccumulator;
pub use db::CHECKPOINT_KEY;
pub use visibility::{VisibilityOptimizer, VisibilitySnapshot};

/// Timer status - strict FSM.
/// `Stopped` is both the initial and the terminal state of a tracked item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerStatus {
    Stopped,
    Running,
    Paused,
}

impl fmt::Display for TimerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerStatus::Stopped => f.write_str("Stopped"),
            TimerStatus::Running => f.write_str("Running"),
            TimerStatus::Paused => f.write_str("Paused"),
        }
    }
}

/// The session's mutable state. Single owner: the engine.
#[derive(Debug, Clone)]
pub struct TimerState {
    pub status: TimerStatus,
    pub accumulator: TimeAccumulator,
    pub comment: String,
    pub last_action: Option<DateTime<Local>>,
    /// Set by manual edits; cleared by the next successful write.
    pub modified: bool,
}

impl TimerState {
    pub fn initial() -> Self {
        Self {
            status: TimerStatus::Stopped,
            accumulator: TimeAccumulator::default(),
            comment: String::new(),
            last_action: None,
            modified: false,
        }
    }

    pub fn accumulated_ms(&self) -> u64 {
        self.accumulator.get()
    }
}

/// Per-session configuration, captured at `start()`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SessionConfig {
    pub(crate) idle: Option<IdleConfig>,
    pub(crate) checkpoint_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    InvalidTransition { op: &'static str, from: TimerStatus },
    ControlsDisabled,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidTransition { op, from } => {
                write!(f, "Cannot {} while {}", op, from)
            }
            EngineError::ControlsDisabled => f.write_str("Advanced timer controls are disabled"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Read-only view for callers (UI, tests).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub status: TimerStatus,
    /// Includes time elapsed while hidden, without folding it into the state.
    pub accumulated_ms: u64,
    pub comment: String,
    pub item: Option<TrackedItem>,
    pub last_action_date: Option<String>,
    pub window_hidden: bool,
    pub live_roles: Vec<Role>,
}

/// Session controller: owns the timer state and every periodic role.
/// Not shared: the driver task is the only caller, so no locks guard the state.
pub struct TimerEngine {
    pub(crate) state: TimerState,
    pub(crate) item: Option<TrackedItem>,
    pub(crate) settings: TrackerSettings,
    pub(crate) session: SessionConfig,
    pub(crate) scheduler: Scheduler,
    pub(crate) visibility: VisibilityOptimizer,
    /// Most recent idle observation, in ms.
    pub(crate) last_idle_ms: Option<u64>,
    pub(crate) oracle: Box<dyn IdleOracle>,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) events: Box<dyn EventSink>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl TimerEngine {
    pub fn new(
        settings: TrackerSettings,
        oracle: Box<dyn IdleOracle>,
        store: Arc<dyn Store>,
        events: Box<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state: TimerState::initial(),
            item: None,
            settings,
            session: SessionConfig::default(),
            scheduler: Scheduler::new(),
            visibility: VisibilityOptimizer::default(),
            last_idle_ms: None,
            oracle,
            store,
            events,
            clock,
        }
    }

    pub fn status(&self) -> TimerStatus {
        self.state.status
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.scheduler.next_deadline()
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        let now = self.clock.now_ms();
        TimerSnapshot {
            status: self.state.status,
            accumulated_ms: self
                .visibility
                .projected_ms(now)
                .unwrap_or_else(|| self.state.accumulated_ms()),
            comment: self.state.comment.clone(),
            item: self.item.clone(),
            last_action_date: self
                .state
                .last_action
                .as_ref()
                .map(crate::clock::format_action_date),
            window_hidden: self.visibility.is_hidden(),
            live_roles: self.scheduler.live_roles(),
        }
    }
}

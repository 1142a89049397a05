//! Cross-process channel: topic names and payloads.
//! Wire format is one JSON envelope per line: `{"topic": "...", "payload": {...}}`.
use crate::models::TrackedItem;
use serde::{Deserialize, Serialize};

/// Topic names (engine ↔ tray/menu process).
pub mod topics {
    pub const TIMER_INFO: &str = "timer-info";
    pub const NOTIFY: &str = "notify";
    pub const TIMER: &str = "timer";
    pub const WINDOW: &str = "window";
    pub const SETTINGS: &str = "settings";
    pub const ACTIVITY: &str = "activity";
    pub const CONTROL: &str = "control";
}

/// Status pushed on every transition. The receiver replaces its previous copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerInfo {
    pub is_enabled: bool,
    pub is_paused: bool,
    pub issue: Option<TrackedItem>,
    pub action_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    pub critical: bool,
    pub keep: bool,
}

impl Notification {
    pub fn critical(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            critical: true,
            keep: false,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            critical: false,
            keep: false,
        }
    }

    pub fn kept(mut self) -> Self {
        self.keep = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload")]
pub enum Outbound {
    #[serde(rename = "timer-info")]
    TimerInfo(TimerInfo),
    #[serde(rename = "notify")]
    Notify(Notification),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerAction {
    Pause,
    Resume,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerCommand {
    pub action: TimerAction,
    #[serde(default)]
    pub main_window_hidden: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowAction {
    Show,
    Hide,
    Blur,
    Focus,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowEvent {
    pub action: WindowAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingChange {
    pub key: String,
    pub value: serde_json::Value,
}

impl SettingChange {
    /// Settings values arrive as JSON bools or strings; normalize to text.
    pub fn value_text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Operations the main UI invokes on the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ControlCommand {
    Start { issue: TrackedItem },
    Stop,
    #[serde(rename_all = "camelCase")]
    Adjust { delta_ms: i64 },
    Comment { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload")]
pub enum Inbound {
    #[serde(rename = "timer")]
    Timer(TimerCommand),
    #[serde(rename = "window")]
    Window(WindowEvent),
    #[serde(rename = "settings")]
    Settings(SettingChange),
    #[serde(rename = "activity")]
    Activity,
    #[serde(rename = "control")]
    Control(ControlCommand),
}

impl Inbound {
    pub fn parse_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

impl Outbound {
    pub fn topic(&self) -> &'static str {
        match self {
            Outbound::TimerInfo(_) => topics::TIMER_INFO,
            Outbound::Notify(_) => topics::NOTIFY,
        }
    }

    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Outbound half of the channel. Delivery is fire-and-forget.
pub trait EventSink: Send {
    fn send(&self, msg: Outbound);
}

/// Forwards outbound messages to the task that writes them to the tray process.
pub struct ChannelSink {
    tx: tokio::sync::mpsc::UnboundedSender<Outbound>,
}

impl ChannelSink {
    pub fn new(tx: tokio::sync::mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn send(&self, msg: Outbound) {
        let topic = msg.topic();
        if self.tx.send(msg).is_err() {
            tracing::debug!("[IPC] Dropped {} message: channel closed", topic);
        }
    }
}

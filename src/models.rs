use serde::{Deserialize, Serialize};

/// Named reference to a project or activity on the tracking server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: u64,
    pub name: String,
}

/// The work item being timed. Opaque to the engine; passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedItem {
    pub id: u64,
    #[serde(rename = "subject")]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<NamedRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<NamedRef>,
}

/// Persisted recovery snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub item: TrackedItem,
    pub accumulated_ms: u64,
    pub comment: String,
    /// Local wall time of the write, `YYYY-MM-DD HH:MM:SS`.
    pub saved_at: String,
    pub paused: bool,
}

/// Elapsed time handed back by `stop()` for the caller to submit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedEntry {
    pub item: Option<TrackedItem>,
    pub accumulated_ms: u64,
    pub comment: String,
}

impl FinishedEntry {
    /// Hours as the tracking server expects them.
    pub fn hours(&self) -> f64 {
        self.accumulated_ms as f64 / 3_600_000.0
    }
}

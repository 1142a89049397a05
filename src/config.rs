use crate::database::Store;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Idle polling period while tracking.
pub const IDLE_CHECK_INTERVAL_MS: u64 = 120_000;
/// Delay between the idle warning and the auto-pause decision.
pub const IDLE_GRACE_MS: u64 = 15_000;
/// Polling period of the "you are back" watcher after an idle pause.
pub const IDLE_RESUME_CHECK_MS: u64 = 60_000;
pub const TICK_MS: u64 = 1_000;
/// Ceiling for manual adjustments (24h).
pub const MAX_ADJUSTED_MS: u64 = 24 * 3600 * 1000;

/// Settings keys as they travel on the `settings` topic.
pub mod keys {
    pub const IDLE_BEHAVIOR: &str = "IDLE_BEHAVIOR";
    pub const DISCARD_IDLE_TIME: &str = "DISCARD_IDLE_TIME";
    pub const ADVANCED_TIMER_CONTROLS: &str = "ADVANCED_TIMER_CONTROLS";
    pub const TIMER_CHECKPOINT: &str = "TIMER_CHECKPOINT";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidPeriod(String),
    InvalidBool { key: String, value: String },
    UnknownKey(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPeriod(s) => write!(f, "Invalid period: '{}'", s),
            ConfigError::InvalidBool { key, value } => {
                write!(f, "Invalid boolean for {}: '{}'", key, value)
            }
            ConfigError::UnknownKey(k) => write!(f, "Unknown setting: {}", k),
        }
    }
}

impl std::error::Error for ConfigError {}

/// A user-facing period option: `off`, `15m`, `1h`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period(Option<u32>);

impl Period {
    pub const OFF: Period = Period(None);

    pub fn minutes(m: u32) -> Self {
        if m == 0 {
            Self::OFF
        } else {
            Period(Some(m))
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let s = raw.trim().to_ascii_lowercase();
        if s.is_empty() || s == "off" || s == "none" {
            return Ok(Self::OFF);
        }
        let (digits, factor) = if let Some(h) = s.strip_suffix('h') {
            (h, 60)
        } else if let Some(m) = s.strip_suffix('m') {
            (m, 1)
        } else {
            (s.as_str(), 1)
        };
        let n: u32 = digits
            .parse()
            .map_err(|_| ConfigError::InvalidPeriod(raw.to_string()))?;
        n.checked_mul(factor)
            .map(Self::minutes)
            .ok_or_else(|| ConfigError::InvalidPeriod(raw.to_string()))
    }

    pub fn as_ms(&self) -> Option<u64> {
        self.0.map(|m| m as u64 * 60_000)
    }

    pub fn is_off(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            None => f.write_str("off"),
            Some(m) if m % 60 == 0 => write!(f, "{}h", m / 60),
            Some(m) => write!(f, "{}m", m),
        }
    }
}

/// Idle detection parameters, fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleConfig {
    pub threshold_ms: u64,
    pub check_interval_ms: u64,
    pub grace_ms: u64,
    pub discard_idle_time: bool,
}

impl IdleConfig {
    pub fn with_threshold(threshold_ms: u64, discard_idle_time: bool) -> Self {
        Self {
            threshold_ms,
            check_interval_ms: IDLE_CHECK_INTERVAL_MS,
            grace_ms: IDLE_GRACE_MS,
            discard_idle_time,
        }
    }
}

/// Recognized user settings for the timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSettings {
    pub idle_behavior: Period,
    pub idle_time_discard: bool,
    pub checkpoint_interval: Period,
    pub advanced_controls: bool,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            idle_behavior: Period::minutes(15),
            idle_time_discard: false,
            checkpoint_interval: Period::minutes(5),
            advanced_controls: false,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn store_key(key: &str) -> String {
    format!("settings.{}", key.to_ascii_lowercase())
}

impl TrackerSettings {
    /// `None` when idle detection is off.
    pub fn idle_config(&self) -> Option<IdleConfig> {
        self.idle_behavior
            .as_ms()
            .map(|threshold| IdleConfig::with_threshold(threshold, self.idle_time_discard))
    }

    pub fn checkpoint_ms(&self) -> Option<u64> {
        self.checkpoint_interval.as_ms()
    }

    /// Apply one `settings` message. Leaves `self` untouched on error.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            keys::IDLE_BEHAVIOR => self.idle_behavior = Period::parse(value)?,
            keys::DISCARD_IDLE_TIME => self.idle_time_discard = parse_bool(key, value)?,
            keys::ADVANCED_TIMER_CONTROLS => self.advanced_controls = parse_bool(key, value)?,
            keys::TIMER_CHECKPOINT => self.checkpoint_interval = Period::parse(value)?,
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    fn pairs(&self) -> [(&'static str, String); 4] {
        [
            (keys::IDLE_BEHAVIOR, self.idle_behavior.to_string()),
            (keys::DISCARD_IDLE_TIME, self.idle_time_discard.to_string()),
            (keys::ADVANCED_TIMER_CONTROLS, self.advanced_controls.to_string()),
            (keys::TIMER_CHECKPOINT, self.checkpoint_interval.to_string()),
        ]
    }

    /// Defaults, then stored values, then `REDTIME_*` environment overrides.
    /// Bad values are logged and skipped.
    pub fn load(store: &dyn Store) -> Self {
        let mut settings = Self::default();
        for (key, _) in Self::default().pairs() {
            match store.get(&store_key(key)) {
                Ok(Some(value)) => {
                    if let Err(e) = settings.apply(key, &value) {
                        warn!("[CONFIG] Ignoring stored {}: {}", key, e);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("[CONFIG] Failed to read stored {}: {}", key, e),
            }
        }
        settings.apply_env(|name| std::env::var(name).ok());
        info!(
            "[CONFIG] idle={} discard={} checkpoint={} advanced={}",
            settings.idle_behavior,
            settings.idle_time_discard,
            settings.checkpoint_interval,
            settings.advanced_controls
        );
        settings
    }

    pub fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        let overrides = [
            ("REDTIME_IDLE_BEHAVIOR", keys::IDLE_BEHAVIOR),
            ("REDTIME_IDLE_DISCARD", keys::DISCARD_IDLE_TIME),
            ("REDTIME_CHECKPOINT", keys::TIMER_CHECKPOINT),
            ("REDTIME_ADVANCED_CONTROLS", keys::ADVANCED_TIMER_CONTROLS),
        ];
        for (var, key) in overrides {
            if let Some(value) = lookup(var) {
                if let Err(e) = self.apply(key, &value) {
                    warn!("[CONFIG] Ignoring {}: {}", var, e);
                }
            }
        }
    }

    /// Best-effort write of all settings.
    pub fn save(&self, store: &dyn Store) {
        for (key, value) in self.pairs() {
            if let Err(e) = store.set(&store_key(key), &value) {
                warn!("[CONFIG] Failed to persist {}: {}", key, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_parse() {
        assert_eq!(Period::parse("off").unwrap(), Period::OFF);
        assert_eq!(Period::parse("none").unwrap(), Period::OFF);
        assert_eq!(Period::parse("").unwrap(), Period::OFF);
        assert_eq!(Period::parse("15m").unwrap().as_ms(), Some(900_000));
        assert_eq!(Period::parse("1h").unwrap().as_ms(), Some(3_600_000));
        assert_eq!(Period::parse("45").unwrap().as_ms(), Some(2_700_000));
        assert!(Period::parse("soon").is_err());
        assert!(Period::parse("-5m").is_err());
    }

    #[test]
    fn test_period_display_round_trips_options() {
        for raw in ["off", "15m", "30m", "45m", "1h", "2h"] {
            assert_eq!(Period::parse(raw).unwrap().to_string(), raw);
        }
    }

    #[test]
    fn test_idle_config_from_settings() {
        let mut s = TrackerSettings::default();
        s.apply(keys::IDLE_BEHAVIOR, "30m").unwrap();
        s.apply(keys::DISCARD_IDLE_TIME, "true").unwrap();
        let idle = s.idle_config().unwrap();
        assert_eq!(idle.threshold_ms, 1_800_000);
        assert_eq!(idle.check_interval_ms, 120_000);
        assert_eq!(idle.grace_ms, 15_000);
        assert!(idle.discard_idle_time);

        s.apply(keys::IDLE_BEHAVIOR, "off").unwrap();
        assert!(s.idle_config().is_none());
    }

    #[test]
    fn test_apply_rejects_bad_input_without_change() {
        let mut s = TrackerSettings::default();
        assert!(s.apply(keys::TIMER_CHECKPOINT, "later").is_err());
        assert!(s.apply(keys::DISCARD_IDLE_TIME, "maybe").is_err());
        assert!(s.apply("THEME", "dark").is_err());
        assert_eq!(s, TrackerSettings::default());
    }

    #[test]
    fn test_env_overrides() {
        let mut s = TrackerSettings::default();
        s.apply_env(|name| match name {
            "REDTIME_CHECKPOINT" => Some("off".to_string()),
            "REDTIME_ADVANCED_CONTROLS" => Some("1".to_string()),
            "REDTIME_IDLE_BEHAVIOR" => Some("garbage".to_string()),
            _ => None,
        });
        assert!(s.checkpoint_interval.is_off());
        assert!(s.advanced_controls);
        assert_eq!(s.idle_behavior, Period::minutes(15));
    }
}

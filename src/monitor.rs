//! Idle-duration oracle: how long since the operator last touched the machine.

/// Polled on demand; implementations must not block for long.
pub trait IdleOracle: Send {
    fn idle_ms(&self) -> Result<u64, String>;
}

/// OS-backed oracle (X11/Wayland screensaver info, GetLastInputInfo, IOKit).
#[cfg(all(
    feature = "native-idle",
    any(target_os = "macos", target_os = "windows", target_os = "linux")
))]
pub struct SystemIdleOracle;

#[cfg(all(
    feature = "native-idle",
    any(target_os = "macos", target_os = "windows", target_os = "linux")
))]
impl IdleOracle for SystemIdleOracle {
    fn idle_ms(&self) -> Result<u64, String> {
        system_idle_time::get_idle_time()
            .map(|d| d.as_millis() as u64)
            .map_err(|e| format!("Failed to query idle time: {}", e))
    }
}

/// Used when the build has no native idle support. Every query fails, so the
/// engine fails open and never auto-pauses.
pub struct UnavailableIdleOracle;

impl IdleOracle for UnavailableIdleOracle {
    fn idle_ms(&self) -> Result<u64, String> {
        Err("Idle time is not available on this build".to_string())
    }
}

/// The best oracle this build supports.
pub fn default_oracle() -> Box<dyn IdleOracle> {
    #[cfg(all(
        feature = "native-idle",
        any(target_os = "macos", target_os = "windows", target_os = "linux")
    ))]
    {
        Box::new(SystemIdleOracle)
    }
    #[cfg(not(all(
        feature = "native-idle",
        any(target_os = "macos", target_os = "windows", target_os = "linux")
    )))]
    {
        tracing::warn!("[IDLE] Built without native idle support; idle auto-pause is disabled");
        Box::new(UnavailableIdleOracle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_oracle_always_errors() {
        assert!(UnavailableIdleOracle.idle_ms().is_err());
    }
}

//! Session configuration and JSON loading.

use std::fs;
use std::path::Path;
use std::time::Duration;

use nitro_proto::{Mode, Tuning};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Settings for one session manager.
///
/// Defaults: streaming mode, stock tuning, 1 s settle delay after the
/// listener starts, 2 s limit per teardown step.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use nitro::{Mode, SessionConfig};
///
/// let config = SessionConfig::default()
///     .with_mode(Mode::Program)
///     .with_settle(Duration::from_millis(500));
/// assert_eq!(config.settle_delay(), Duration::from_millis(500));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[must_use]
pub struct SessionConfig {
    /// Protocol codec strategy.
    pub mode: Mode,
    /// Speeds, ports and dwell table.
    pub tuning: Tuning,
    /// Wait after the listener program starts, in milliseconds.
    pub settle_ms: u64,
    /// Upper bound for each best-effort teardown step, in milliseconds.
    pub teardown_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Streaming,
            tuning: Tuning::default(),
            settle_ms: 1000,
            teardown_timeout_ms: 2000,
        }
    }
}

impl SessionConfig {
    /// Loads a configuration from a JSON file. Missing fields keep their
    /// defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Sets the codec strategy.
    pub const fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the tuning table.
    pub fn with_tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Sets the settle delay after the listener starts.
    pub fn with_settle(mut self, delay: Duration) -> Self {
        self.settle_ms = millis(delay);
        self
    }

    /// Sets the per-step teardown limit.
    pub fn with_teardown_timeout(mut self, limit: Duration) -> Self {
        self.teardown_timeout_ms = millis(limit);
        self
    }

    /// Settle delay as a [`Duration`].
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Teardown step limit as a [`Duration`].
    pub const fn teardown_limit(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }
}

/// Whole milliseconds in `d`, saturating.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "mode": "program", "tuning": {{ "steer_angle": 30, "dwell": {{ "turn_ms": 250 }} }} }}"#
        )
        .unwrap();

        let config = SessionConfig::load(file.path()).unwrap();
        assert_eq!(config.mode, Mode::Program);
        assert_eq!(config.tuning.steer_angle, 30);
        assert_eq!(config.tuning.dwell.turn_ms, 250);
        assert_eq!(config.tuning.dwell.forward_ms, 1000);
        assert_eq!(config.tuning.forward_speed, 900);
        assert_eq!(config.settle_delay(), Duration::from_secs(1));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ \"mode\": 7 }}").unwrap();
        assert!(matches!(
            SessionConfig::load(file.path()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn negative_speed_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "tuning": {{ "forward_speed": -2147483648 }} }}"#).unwrap();
        assert!(matches!(
            SessionConfig::load(file.path()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SessionConfig::load(dir.path().join("absent.json")),
            Err(Error::Io(_))
        ));
    }
}

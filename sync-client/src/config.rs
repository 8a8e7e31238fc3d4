//! Device configuration.
//!
//! Configuration is loaded from a TOML file (default: `liftsync.toml`).
//! Every field has a default, so an empty file is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use liftsync_core::{RecoveryTuning, Tuning};
use serde::Deserialize;

/// Root configuration for one device.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DeviceConfig {
    /// Timer cadence.
    #[serde(default)]
    pub timing: TimingConfig,
    /// Heart-rate recovery detection.
    #[serde(default)]
    pub recovery: RecoveryConfig,
    /// Heart-rate source.
    #[serde(default)]
    pub signal: SignalConfig,
    /// Sync policy.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Timer cadence.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimingConfig {
    /// Seconds between heartbeat snapshots while running (default: 3).
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u32,
    /// Delay before the snapshot that follows an action (default: 100ms).
    #[serde(default = "default_post_action_snapshot_ms")]
    pub post_action_snapshot_ms: u64,
    /// Start-time difference that restarts the local ticker (default: 500ms).
    #[serde(default = "default_start_time_tolerance_ms")]
    pub start_time_tolerance_ms: u64,
}

/// Heart-rate recovery detection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecoveryConfig {
    /// Readings kept (default: 10).
    #[serde(default = "default_window")]
    pub window: usize,
    /// Readings required before evaluating (default: 5).
    #[serde(default = "default_min_readings")]
    pub min_readings: usize,
    /// Readings averaged at each end of the window (default: 3).
    #[serde(default = "default_sample")]
    pub sample: usize,
    /// Rise in bpm that marks a set (default: 5).
    #[serde(default = "default_rise_delta")]
    pub rise_delta: f64,
    /// Fraction of peak that counts as recovered (default: 0.85).
    #[serde(default = "default_recovery_fraction")]
    pub recovery_fraction: f64,
}

/// Heart-rate source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SignalConfig {
    /// Use the heart-rate source when one is attached (default: true).
    #[serde(default = "default_signal_enabled")]
    pub enabled: bool,
    /// Seconds to wait for the permission prompt (default: 10).
    #[serde(default = "default_authorization_timeout_secs")]
    pub authorization_timeout_secs: u64,
}

/// Sync policy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SyncConfig {
    /// The originator also sends its finished record to the peer (default: false).
    #[serde(default)]
    pub transmit_completed_session: bool,
    /// Queued UI commands before callers wait (default: 32).
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,
}

// Default value functions
fn default_heartbeat_secs() -> u32 {
    3
}

fn default_post_action_snapshot_ms() -> u64 {
    100
}

fn default_start_time_tolerance_ms() -> u64 {
    500
}

fn default_window() -> usize {
    10
}

fn default_min_readings() -> usize {
    5
}

fn default_sample() -> usize {
    3
}

fn default_rise_delta() -> f64 {
    5.0
}

fn default_recovery_fraction() -> f64 {
    0.85
}

fn default_signal_enabled() -> bool {
    true
}

fn default_authorization_timeout_secs() -> u64 {
    10
}

fn default_command_buffer() -> usize {
    32
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat_secs(),
            post_action_snapshot_ms: default_post_action_snapshot_ms(),
            start_time_tolerance_ms: default_start_time_tolerance_ms(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            min_readings: default_min_readings(),
            sample: default_sample(),
            rise_delta: default_rise_delta(),
            recovery_fraction: default_recovery_fraction(),
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            enabled: default_signal_enabled(),
            authorization_timeout_secs: default_authorization_timeout_secs(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            transmit_completed_session: false,
            command_buffer: default_command_buffer(),
        }
    }
}

impl SignalConfig {
    /// Permission prompt timeout.
    pub fn authorization_timeout(&self) -> Duration {
        Duration::from_secs(self.authorization_timeout_secs)
    }
}

impl DeviceConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Session knobs for the core state machine.
    pub fn tuning(&self) -> Tuning {
        Tuning {
            heartbeat_secs: self.timing.heartbeat_secs,
            post_action_snapshot: Duration::from_millis(self.timing.post_action_snapshot_ms),
            start_time_tolerance_ms: self.timing.start_time_tolerance_ms,
            recovery: RecoveryTuning {
                window: self.recovery.window,
                min_readings: self.recovery.min_readings,
                sample: self.recovery.sample,
                rise_delta: self.recovery.rise_delta,
                recovery_fraction: self.recovery.recovery_fraction,
            },
            transmit_completed_session: self.sync.transmit_completed_session,
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

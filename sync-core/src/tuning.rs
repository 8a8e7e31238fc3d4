//! Timing and policy knobs for a session.

use std::time::Duration;

use crate::recovery::RecoveryTuning;

/// Knobs a session runs with. Defaults are the protocol's reference values.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuning {
    /// Seconds between heartbeat Snapshots while running.
    pub heartbeat_secs: u32,
    /// Delay between an Action and its confirming Snapshot.
    pub post_action_snapshot: Duration,
    /// Start-time discrepancy that forces the local ticker to restart.
    pub start_time_tolerance_ms: u64,
    /// Heart-rate auto-advance parameters.
    pub recovery: RecoveryTuning,
    /// Whether the originator also transmits its CompletedSession payload.
    pub transmit_completed_session: bool,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            heartbeat_secs: 3,
            post_action_snapshot: Duration::from_millis(100),
            start_time_tolerance_ms: 500,
            recovery: RecoveryTuning::default(),
            transmit_completed_session: false,
        }
    }
}

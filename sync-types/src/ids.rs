//! Identity types for liftsync.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one live workout session.
///
/// Generated by the originating device and adopted verbatim by the
/// companion. UUID v4 format (16 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    /// Create a new random SessionId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", &self.to_string()[..8])
    }
}

/// Stable identity of an exercise inside a workout plan.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExerciseId(uuid::Uuid);

impl ExerciseId {
    /// Create a new random ExerciseId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ExerciseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExerciseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ExerciseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExerciseId({})", &self.to_string()[..8])
    }
}

/// Identity of a stored workout plan.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanId(uuid::Uuid);

impl PlanId {
    /// Create a new random PlanId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlanId({})", &self.to_string()[..8])
    }
}

/// Which physical device a frame came from.
///
/// Either side may originate a session; the role only identifies the
/// sender so a device can drop frames that looped back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceRole {
    /// The phone app.
    Phone,
    /// The companion wrist device.
    Watch,
}

impl DeviceRole {
    /// The other end of the link.
    pub fn peer(self) -> Self {
        match self {
            Self::Phone => Self::Watch,
            Self::Watch => Self::Phone,
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Phone => write!(f, "phone"),
            Self::Watch => write!(f, "watch"),
        }
    }
}

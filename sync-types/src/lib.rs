//! # sync-types
//!
//! Wire format types for the liftsync live workout session protocol.
//!
//! This crate provides the foundational types shared by both devices:
//! - [`SessionId`], [`ExerciseId`], [`PlanId`], [`DeviceRole`] - Identity types
//! - [`WorkoutPlan`], [`ExercisePlan`] - The read-only plan a session executes
//! - [`Message`] - Protocol messages (StartSession, Action, Snapshot, CompletedSession)
//! - [`Envelope`] - Message wrapper with routing metadata
//! - [`WireError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod envelope;
mod error;
mod ids;
mod messages;
mod plan;

pub use envelope::{Envelope, PROTOCOL_VERSION};
pub use error::WireError;
pub use ids::{DeviceRole, ExerciseId, PlanId, SessionId};
pub use messages::{
    ActionKind, ActionMessage, CompletedExercise, CompletedSession, ExerciseSnapshot, Message,
    MessageType, Snapshot, StartSession,
};
pub use plan::{ExercisePlan, WorkoutPlan, DEFAULT_REST_SECS};

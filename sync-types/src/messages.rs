//! Protocol messages for liftsync.
//!
//! These are the inner payloads carried inside an [`Envelope`](crate::Envelope).
//! Every message names the session it belongs to.

use serde::{Deserialize, Serialize};

use crate::{ExerciseId, SessionId, WireError, WorkoutPlan};

// Re-export MessageType from envelope for convenience
pub use crate::envelope::MessageType;

/// All possible protocol messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Establish the companion's session
    StartSession(StartSession),
    /// Discrete user-triggered transition
    Action(ActionMessage),
    /// Full-state reconciliation
    Snapshot(Snapshot),
    /// Finished session data handed to the persisting device
    CompletedSession(CompletedSession),
}

impl Message {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        rmp_serde::to_vec(self).map_err(WireError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        rmp_serde::from_slice(bytes).map_err(WireError::Deserialization)
    }

    /// The session this message belongs to.
    pub fn session_id(&self) -> SessionId {
        match self {
            Message::StartSession(m) => m.session_id,
            Message::Action(m) => m.session_id,
            Message::Snapshot(m) => m.session_id,
            Message::CompletedSession(m) => m.session_id,
        }
    }

    /// Envelope discriminator for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::StartSession(_) => MessageType::StartSession,
            Message::Action(_) => MessageType::Action,
            Message::Snapshot(_) => MessageType::Snapshot,
            Message::CompletedSession(_) => MessageType::CompletedSession,
        }
    }

    /// Slot used for durable delivery. A newer message with the same key
    /// replaces an undelivered older one.
    pub fn durable_key(&self) -> String {
        match self {
            Message::StartSession(_) => "start".to_string(),
            Message::Snapshot(_) => "snapshot".to_string(),
            Message::Action(m) => format!("action:{}", m.action.name()),
            Message::CompletedSession(m) => format!("completed:{}", m.session_id),
        }
    }
}

/// Sent once by the originator to establish the companion's state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartSession {
    /// Identity the companion must adopt
    pub session_id: SessionId,
    /// The plan being executed
    pub plan: WorkoutPlan,
}

/// A discrete state transition performed by the sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionMessage {
    /// What happened
    pub action: ActionKind,
    /// Session it happened in
    pub session_id: SessionId,
}

/// Kinds of discrete transitions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Advanced to the next set of the same exercise
    NextSet,
    /// Went back one set
    PreviousSet,
    /// Moved to the next exercise
    NextExercise,
    /// Moved to the previous exercise
    PreviousExercise,
    /// Pending reps input changed
    UpdateReps {
        /// New value
        reps: u32,
    },
    /// Pending weight input changed
    UpdateWeight {
        /// New value
        weight: f64,
    },
    /// Workout clock started
    TimerStarted,
    /// Session finished normally
    EndSession,
    /// Session discarded without saving
    CancelSession,
}

impl ActionKind {
    /// Short stable name, used in logs and durable keys.
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::NextSet => "next_set",
            ActionKind::PreviousSet => "previous_set",
            ActionKind::NextExercise => "next_exercise",
            ActionKind::PreviousExercise => "previous_exercise",
            ActionKind::UpdateReps { .. } => "update_reps",
            ActionKind::UpdateWeight { .. } => "update_weight",
            ActionKind::TimerStarted => "timer_started",
            ActionKind::EndSession => "end_session",
            ActionKind::CancelSession => "cancel_session",
        }
    }

    /// Whether this action ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionKind::EndSession | ActionKind::CancelSession)
    }
}

/// Full state of the current exercise, as seen by the sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSnapshot {
    /// Sender's identity for the exercise
    pub exercise_id: ExerciseId,
    /// Name, used by the receiver to locate the exercise in its own plan
    pub name: String,
    /// 1-based set number
    pub current_set: u32,
    /// Target sets for the exercise
    pub total_sets: u32,
    /// Pending reps input
    pub current_reps: u32,
    /// Pending weight input
    pub current_weight: f64,
    /// Rest duration for the current set, seconds
    pub rest_time: u32,
    /// Seconds since the current set/rest period began
    pub elapsed_time: u32,
    /// Logged reps for this exercise, index-aligned with sets
    pub completed_reps: Vec<u32>,
    /// Logged weights for this exercise, index-aligned with sets
    pub completed_weights: Vec<f64>,
}

/// Periodic full-state reconciliation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Session the state belongs to
    pub session_id: SessionId,
    /// Current exercise state
    pub current_exercise: ExerciseSnapshot,
    /// Workout start, unix milliseconds (None until the clock first starts)
    pub workout_start_time: Option<u64>,
    /// When the snapshot was taken, unix milliseconds
    pub timestamp: u64,
}

/// What was performed for one exercise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedExercise {
    /// Exercise identity
    pub exercise_id: ExerciseId,
    /// Exercise name
    pub name: String,
    /// Reps per set (0 = not logged)
    pub reps: Vec<u32>,
    /// Weight per set (0 = not logged)
    pub weights: Vec<f64>,
}

/// Finished session record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedSession {
    /// Session the record belongs to
    pub session_id: SessionId,
    /// Per-exercise results, in plan order
    pub entries: Vec<CompletedExercise>,
    /// Computed start, unix milliseconds
    pub start_time: u64,
    /// End, unix milliseconds
    pub end_time: u64,
}

impl CompletedSession {
    /// Total reps logged across every exercise.
    pub fn total_reps(&self) -> u32 {
        self.entries.iter().flat_map(|e| e.reps.iter()).sum()
    }

    /// Workout duration in whole seconds.
    pub fn duration_secs(&self) -> u64 {
        self.end_time.saturating_sub(self.start_time) / 1000
    }
}

//! Errors from the session state machine.

use liftsync_types::{SessionId, WireError};
use thiserror::Error;

/// Reasons an operation on a session was refused.
///
/// A refused remote message never mutates the session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The plan failed validation.
    #[error(transparent)]
    InvalidPlan(#[from] WireError),

    /// A snapshot named an exercise the local plan does not contain.
    #[error("snapshot names unknown exercise '{name}'")]
    UnknownExercise {
        /// Name carried by the snapshot.
        name: String,
    },

    /// An action was addressed to a different session.
    #[error("action for session {received} but active session is {expected}")]
    StaleSession {
        /// The local session.
        expected: SessionId,
        /// The session named by the message.
        received: SessionId,
    },

    /// A StartSession for a different session reached a live session.
    /// The driver replaces the session instead of applying it.
    #[error("start for foreign session {0}")]
    ForeignSession(SessionId),
}

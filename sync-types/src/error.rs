//! Error types for the liftsync wire format.

use thiserror::Error;

use crate::MessageType;

/// Errors that can occur encoding or decoding protocol data.
#[derive(Debug, Error)]
pub enum WireError {
    /// MessagePack serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),

    /// Invalid message type discriminator
    #[error("invalid message type: {0}")]
    InvalidMessageType(u8),

    /// Invalid protocol version
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Envelope discriminator disagrees with the payload
    #[error("envelope declares {declared:?} but carries {actual:?}")]
    TypeMismatch {
        /// Discriminator on the envelope
        declared: MessageType,
        /// Type of the decoded payload
        actual: MessageType,
    },

    /// Workout plan violates a structural invariant
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = WireError::InvalidMessageType(99);
        assert_eq!(err.to_string(), "invalid message type: 99");
    }

    #[test]
    fn mismatch_display_names_both_types() {
        let err = WireError::TypeMismatch {
            declared: MessageType::Snapshot,
            actual: MessageType::Action,
        };
        assert_eq!(
            err.to_string(),
            "envelope declares Snapshot but carries Action"
        );
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WireError>();
    }
}

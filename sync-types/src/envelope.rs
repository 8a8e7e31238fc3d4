//! Envelope - the wire format wrapper for all session messages.

use serde::{Deserialize, Serialize};

use crate::{DeviceRole, Message, WireError};

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Message type discriminator for envelope routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Originator establishing the companion's session
    StartSession = 1,
    /// Discrete transition
    Action = 2,
    /// Full-state reconciliation
    Snapshot = 3,
    /// Finished session data
    CompletedSession = 4,
}

impl TryFrom<u8> for MessageType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageType::StartSession),
            2 => Ok(MessageType::Action),
            3 => Ok(MessageType::Snapshot),
            4 => Ok(MessageType::CompletedSession),
            _ => Err(WireError::InvalidMessageType(value)),
        }
    }
}

/// The envelope wraps every protocol message with routing metadata.
///
/// The discriminator lets a receiver reject a frame before decoding the
/// payload, and `origin` lets it drop frames that looped back to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version
    pub version: u8,
    /// Message type discriminator
    pub msg_type: u8,
    /// Device that sent the frame
    pub origin: DeviceRole,
    /// Unix timestamp (milliseconds) - informational only, not trusted
    pub timestamp_ms: u64,
    /// MessagePack-encoded inner message
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Wrap a message for sending.
    pub fn seal(origin: DeviceRole, message: &Message) -> Result<Self, WireError> {
        Ok(Self {
            version: PROTOCOL_VERSION,
            msg_type: message.message_type() as u8,
            origin,
            timestamp_ms: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            payload: message.to_bytes()?,
        })
    }

    /// Decode the inner message.
    ///
    /// Fails if the version is unknown or the discriminator disagrees with
    /// the payload.
    pub fn open(&self) -> Result<Message, WireError> {
        if self.version != PROTOCOL_VERSION {
            return Err(WireError::UnsupportedVersion(self.version));
        }
        let declared = self.message_type()?;
        let message = Message::from_bytes(&self.payload)?;
        if message.message_type() != declared {
            return Err(WireError::TypeMismatch {
                declared,
                actual: message.message_type(),
            });
        }
        Ok(message)
    }

    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        rmp_serde::to_vec(self).map_err(WireError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        rmp_serde::from_slice(bytes).map_err(WireError::Deserialization)
    }

    /// Get the message type as an enum.
    pub fn message_type(&self) -> Result<MessageType, WireError> {
        MessageType::try_from(self.msg_type)
    }
}

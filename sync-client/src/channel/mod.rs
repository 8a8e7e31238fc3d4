//! Peer channel abstraction for liftsync.
//!
//! The phone and the watch talk over a single paired link with two delivery
//! modes:
//! - `send_best_effort()` delivers only while the peer is reachable
//! - `send_durable()` queues until the peer is reachable, keeping only the
//!   newest frame per key
//! - `recv()` yields the next inbound frame
//!
//! Frames are opaque bytes (an encoded `Envelope`). The channel never
//! inspects them.
//!
//! # Example
//!
//! ```ignore
//! let (phone, watch) = MemoryChannel::pair();
//! phone.send_best_effort(&frame).await?;
//! let received = watch.recv().await?;
//! ```

mod memory;

pub use memory::MemoryChannel;

use async_trait::async_trait;
use thiserror::Error;

/// Channel errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The peer is not reachable; a best-effort frame was not sent.
    #[error("peer unreachable")]
    Unreachable,

    /// The link was closed.
    #[error("channel closed")]
    Closed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// A paired link to the other device.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Send a frame now. Fails with `Unreachable` when the peer is away.
    ///
    /// A successful return does not guarantee delivery.
    async fn send_best_effort(&self, frame: &[u8]) -> Result<(), ChannelError>;

    /// Send a frame now, or queue it until the peer is reachable.
    ///
    /// An undelivered frame with the same key is replaced.
    async fn send_durable(&self, key: &str, frame: &[u8]) -> Result<(), ChannelError>;

    /// Receive the next frame from the peer.
    ///
    /// Blocks until a frame arrives or the link closes.
    async fn recv(&self) -> Result<Vec<u8>, ChannelError>;

    /// Whether best-effort sends can currently reach the peer.
    fn is_reachable(&self) -> bool;
}

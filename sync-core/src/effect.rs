//! Effects produced by the session state machine.
//!
//! These are instructions, not side effects. The driver in sync-client
//! interprets them in order and performs the actual I/O.

use std::time::Duration;

use liftsync_types::{CompletedSession, Message, SessionId};

use crate::state::{AdvanceOutcome, Terminal};

/// How a message should travel over the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Delivered only if the peer is reachable right now; dropped otherwise.
    BestEffort,
    /// Queued until the peer is reachable; last value wins per durable key.
    Durable,
    /// Best-effort when reachable, durable otherwise. Used for Snapshots so
    /// a reconnecting peer still gets the newest state.
    Latest,
}

/// Feedback cue for the local user, typically a haptic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    /// The peer advanced a set or exercise.
    Advance,
    /// The peer went back a set or exercise.
    Back,
    /// The workout clock started.
    Start,
    /// The session ended.
    Stop,
    /// The rest period is over.
    RestComplete,
}

/// Signals for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Set elapsed time reached the rest duration.
    RestComplete,
    /// Heart-rate recovery advanced the session.
    AutoAdvanced {
        /// What the advance did.
        outcome: AdvanceOutcome,
    },
    /// A snapshot for a different session replaced the local one.
    SessionReset {
        /// The adopted session.
        session_id: SessionId,
    },
    /// The session ended on the other device; the UI should dismiss.
    Dismissed {
        /// How it ended.
        terminal: Terminal,
        /// Whether a completed record was persisted on this device.
        saved: bool,
    },
}

/// One instruction for the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send a message to the peer.
    Send {
        /// The message.
        message: Message,
        /// How to send it.
        delivery: Delivery,
    },
    /// Send a fresh Snapshot after a short delay. A later request replaces
    /// an earlier pending one.
    ScheduleSnapshot {
        /// Delay before the snapshot is taken.
        delay: Duration,
    },
    /// Start the 1-second ticker, or re-phase it if already running.
    StartTicker,
    /// Stop the 1-second ticker.
    StopTicker,
    /// Give the user a feedback cue.
    Haptic(Cue),
    /// Surface a signal to the UI.
    Emit(SessionEvent),
    /// Hand a finished record to the store.
    Persist(CompletedSession),
}

impl Effect {
    /// The message carried by a Send effect.
    pub fn message(&self) -> Option<&Message> {
        match self {
            Effect::Send { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Whether this effect puts anything on the wire.
    pub fn is_outbound(&self) -> bool {
        matches!(self, Effect::Send { .. } | Effect::ScheduleSnapshot { .. })
    }
}

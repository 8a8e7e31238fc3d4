//! # sync-core
//!
//! Pure session logic for liftsync (no I/O, instant tests).
//!
//! This crate holds the live workout session state machine shared by the
//! phone and the watch, plus the timer and heart-rate rules that drive it.
//!
//! ## Design Philosophy
//!
//! Every operation takes the current time as an argument and returns a list
//! of [`Effect`]s instead of performing them:
//! - Unit tests need no mocks, no async and no sleeping
//! - The same inputs always produce the same state
//! - Echo suppression is a property of the returned effects, easy to assert
//!
//! The actual I/O (channel, ticker, storage) is performed by `sync-client`,
//! which interprets the effects produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod apply;
pub mod effect;
pub mod error;
pub mod recovery;
pub mod state;
pub mod timer;
pub mod tuning;

pub use effect::{Cue, Delivery, Effect, SessionEvent};
pub use error::SessionError;
pub use recovery::{RecoveryDetector, RecoveryTuning};
pub use state::{AdvanceOutcome, SessionState, SessionView, Terminal};
pub use timer::{Alignment, WorkoutClock};
pub use tuning::Tuning;

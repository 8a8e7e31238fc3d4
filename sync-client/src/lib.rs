//! # sync-client
//!
//! Device driver for liftsync live workout sessions.
//!
//! This is the library the phone and watch apps embed. It runs the pure
//! session state machine from sync-core inside one tokio task per device and
//! performs the I/O the state machine asks for.
//!
//! ## Features
//!
//! - **Channel Abstraction**: best-effort and durable delivery to the peer (memory pair for tests)
//! - **Session Store**: plans, finished sessions and an offline snapshot cache (memory, JSON files)
//! - **Heart-Rate Auto-Advance**: pluggable sensor source with a bounded permission prompt
//! - **Pure State Machine**: Uses sync-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use liftsync_client::{spawn_device, DeviceSetup, MemoryChannel, MemoryStore};
//!
//! let (watch_link, phone_link) = MemoryChannel::pair();
//! let store = Arc::new(MemoryStore::with_plan(plan.clone()));
//! let (watch, events) = spawn_device(DeviceSetup::new(DeviceRole::Watch, Arc::new(watch_link), store));
//!
//! watch.start_workout(plan.id).await?;
//! watch.start().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod clock;
pub mod config;
pub mod device;
pub mod signal;
pub mod store;

pub use channel::{Channel, ChannelError, MemoryChannel};
pub use clock::Clock;
pub use config::{ConfigError, DeviceConfig};
pub use device::{spawn_device, DeviceError, DeviceEvent, DeviceEvents, DeviceHandle, DeviceSetup};
pub use signal::{authorize, Authorization, HeartRateSource, ScriptedHeartRate, SignalError};
pub use store::{FileStore, MemoryStore, SessionStore, StoreError};

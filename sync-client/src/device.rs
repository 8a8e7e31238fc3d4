//! Device - one live-session actor per phone or watch.
//!
//! # Architecture
//!
//! Each device runs a single tokio task that owns the optional
//! [`SessionState`] (none while idle). UI commands, inbound frames, the
//! one-second ticker, the pending post-action snapshot and heart-rate
//! readings all arrive through one `select!` loop, so applying a message is
//! never interleaved with anything else.
//!
//! ```text
//! UI → DeviceHandle → device task → Channel → peer
//!                         ↓
//!               sync-core (pure state machine)
//! ```
//!
//! The core returns [`Effect`]s; this module is the only place they turn
//! into I/O.
//!
//! # Example
//!
//! ```ignore
//! let (phone_link, watch_link) = MemoryChannel::pair();
//! let (watch, mut events) = spawn_device(
//!     DeviceSetup::new(DeviceRole::Watch, Arc::new(watch_link), store),
//! );
//!
//! watch.start_workout(plan_id).await?;
//! watch.start().await?;
//! watch.log_set(8, 135.0).await?;
//! watch.next_set().await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use liftsync_core::{
    AdvanceOutcome, Cue, Delivery, Effect, SessionError, SessionEvent, SessionState, SessionView,
    Tuning,
};
use liftsync_types::{
    CompletedSession, DeviceRole, Envelope, Message, PlanId, SessionId, StartSession,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::channel::{Channel, ChannelError};
use crate::clock::Clock;
use crate::config::DeviceConfig;
use crate::signal::{authorize, HeartRateSource};
use crate::store::{SessionStore, StoreError};

const TICK: Duration = Duration::from_secs(1);

/// Device errors.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The command needs a session and none exists.
    #[error("no active session")]
    NoSession,

    /// Nothing cached to restore from.
    #[error("no cached snapshot to restore")]
    NothingToRestore,

    /// Session logic refused the operation.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The device task is no longer running.
    #[error("device stopped")]
    Stopped,
}

/// Notifications for the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// A session became active on this device.
    SessionStarted {
        /// Session identity.
        session_id: SessionId,
        /// Whether this device created it.
        originator: bool,
    },
    /// Signal from the session state machine.
    Session(SessionEvent),
    /// Feedback cue to play.
    Haptic(Cue),
    /// A finished session was written to the store.
    Saved(CompletedSession),
    /// Auto-advance is off for this session; manual navigation still works.
    HeartRateUnavailable {
        /// Why.
        reason: String,
    },
}

/// Receiver for [`DeviceEvent`]s.
pub type DeviceEvents = mpsc::UnboundedReceiver<DeviceEvent>;

/// Everything a device needs to run.
pub struct DeviceSetup {
    role: DeviceRole,
    channel: Arc<dyn Channel>,
    store: Arc<dyn SessionStore>,
    heart_rate: Option<Arc<dyn HeartRateSource>>,
    config: DeviceConfig,
    clock: Clock,
}

impl DeviceSetup {
    /// A device with default configuration and the system clock.
    pub fn new(role: DeviceRole, channel: Arc<dyn Channel>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            role,
            channel,
            store,
            heart_rate: None,
            config: DeviceConfig::default(),
            clock: Clock::system(),
        }
    }

    /// Attach a heart-rate source for auto-advance.
    pub fn with_heart_rate(mut self, source: Arc<dyn HeartRateSource>) -> Self {
        self.heart_rate = Some(source);
        self
    }

    /// Use the given configuration.
    pub fn with_config(mut self, config: DeviceConfig) -> Self {
        self.config = config;
        self
    }

    /// Use the given clock.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

/// Spawn the device task.
pub fn spawn_device(setup: DeviceSetup) -> (DeviceHandle, DeviceEvents) {
    let (command_tx, command_rx) = mpsc::channel(setup.config.sync.command_buffer.max(1));
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (reading_tx, reading_rx) = mpsc::channel(64);

    let task = DeviceTask {
        role: setup.role,
        channel: setup.channel,
        store: setup.store,
        heart_rate: setup.heart_rate,
        tuning: setup.config.tuning(),
        config: setup.config,
        clock: setup.clock,
        session: None,
        live: false,
        ticker: None,
        pending_snapshot: None,
        events: event_tx,
        readings: reading_tx,
        heart_rate_task: None,
    };
    tracing::info!("Spawning {} device", task.role);
    tokio::spawn(task.run(command_rx, reading_rx));

    (
        DeviceHandle {
            role: setup.role,
            commands: command_tx,
        },
        event_rx,
    )
}

// ===========================================
// Handle
// ===========================================

type Reply<T> = oneshot::Sender<Result<T, DeviceError>>;

#[derive(Debug)]
enum Op {
    Start,
    Pause,
    LogSet { reps: u32, weight: f64 },
    PrevSet,
    NextExercise,
    PrevExercise,
    UpdateReps(u32),
    UpdateWeight(f64),
    Cancel,
}

#[derive(Debug)]
enum Command {
    StartWorkout {
        plan_id: PlanId,
        reply: Reply<SessionId>,
    },
    Restore {
        plan_id: PlanId,
        reply: Reply<SessionId>,
    },
    Op {
        op: Op,
        reply: Reply<()>,
    },
    NextSet {
        reply: Reply<AdvanceOutcome>,
    },
    CompleteWorkout {
        reply: Reply<CompletedSession>,
    },
    EndSession {
        reply: Reply<Option<CompletedSession>>,
    },
    View {
        reply: oneshot::Sender<Option<SessionView>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running device. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    role: DeviceRole,
    commands: mpsc::Sender<Command>,
}

impl DeviceHandle {
    /// Which device this is.
    pub fn role(&self) -> DeviceRole {
        self.role
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, DeviceError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| DeviceError::Stopped)?;
        response.await.map_err(|_| DeviceError::Stopped)?
    }

    async fn op(&self, op: Op) -> Result<(), DeviceError> {
        self.request(|reply| Command::Op { op, reply }).await
    }

    /// Originate a session from a stored plan. Replaces any current session.
    pub async fn start_workout(&self, plan_id: PlanId) -> Result<SessionId, DeviceError> {
        self.request(|reply| Command::StartWorkout { plan_id, reply })
            .await
    }

    /// Rebuild the session from the cached snapshot, e.g. after a restart.
    pub async fn restore(&self, plan_id: PlanId) -> Result<SessionId, DeviceError> {
        self.request(|reply| Command::Restore { plan_id, reply }).await
    }

    /// Start or resume the workout clock.
    pub async fn start(&self) -> Result<(), DeviceError> {
        self.op(Op::Start).await
    }

    /// Pause the workout clock on this device only.
    pub async fn pause(&self) -> Result<(), DeviceError> {
        self.op(Op::Pause).await
    }

    /// Record the current set.
    pub async fn log_set(&self, reps: u32, weight: f64) -> Result<(), DeviceError> {
        self.op(Op::LogSet { reps, weight }).await
    }

    /// Advance one set. `ReachedEnd` means nothing moved.
    pub async fn next_set(&self) -> Result<AdvanceOutcome, DeviceError> {
        self.request(|reply| Command::NextSet { reply }).await
    }

    /// Go back one set.
    pub async fn prev_set(&self) -> Result<(), DeviceError> {
        self.op(Op::PrevSet).await
    }

    /// Move to the next exercise.
    pub async fn next_exercise(&self) -> Result<(), DeviceError> {
        self.op(Op::NextExercise).await
    }

    /// Move to the previous exercise.
    pub async fn prev_exercise(&self) -> Result<(), DeviceError> {
        self.op(Op::PrevExercise).await
    }

    /// Change the pending reps input.
    pub async fn update_reps(&self, reps: u32) -> Result<(), DeviceError> {
        self.op(Op::UpdateReps(reps)).await
    }

    /// Change the pending weight input.
    pub async fn update_weight(&self, weight: f64) -> Result<(), DeviceError> {
        self.op(Op::UpdateWeight(weight)).await
    }

    /// Build the finished record without ending the session.
    pub async fn complete_workout(&self) -> Result<CompletedSession, DeviceError> {
        self.request(|reply| Command::CompleteWorkout { reply })
            .await
    }

    /// End the session. Returns the record when this device originated it.
    pub async fn end_session(&self) -> Result<Option<CompletedSession>, DeviceError> {
        self.request(|reply| Command::EndSession { reply }).await
    }

    /// Discard the session without saving.
    pub async fn cancel_session(&self) -> Result<(), DeviceError> {
        self.op(Op::Cancel).await
    }

    /// Current session summary, if any.
    pub async fn view(&self) -> Result<Option<SessionView>, DeviceError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::View { reply })
            .await
            .map_err(|_| DeviceError::Stopped)?;
        response.await.map_err(|_| DeviceError::Stopped)
    }

    /// Stop the device task. Later calls fail with `Stopped`.
    pub async fn shutdown(&self) -> Result<(), DeviceError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Shutdown { reply })
            .await
            .map_err(|_| DeviceError::Stopped)?;
        response.await.map_err(|_| DeviceError::Stopped)
    }
}

// ===========================================
// Task
// ===========================================

#[derive(Debug)]
struct Reading {
    session_id: SessionId,
    bpm: f64,
}

struct DeviceTask {
    role: DeviceRole,
    channel: Arc<dyn Channel>,
    store: Arc<dyn SessionStore>,
    heart_rate: Option<Arc<dyn HeartRateSource>>,
    config: DeviceConfig,
    tuning: Tuning,
    clock: Clock,
    session: Option<SessionState>,
    /// Whether `session` was live after the last batch of effects ran.
    live: bool,
    ticker: Option<Interval>,
    pending_snapshot: Option<Instant>,
    events: mpsc::UnboundedSender<DeviceEvent>,
    readings: mpsc::Sender<Reading>,
    heart_rate_task: Option<JoinHandle<()>>,
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl DeviceTask {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut readings: mpsc::Receiver<Reading>,
    ) {
        let channel = Arc::clone(&self.channel);
        let mut inbound_open = true;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.stop_heart_rate().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                frame = channel.recv(), if inbound_open => match frame {
                    Ok(bytes) => self.handle_frame(&bytes).await,
                    Err(e) => {
                        tracing::info!("{} channel closed: {}", self.role, e);
                        inbound_open = false;
                    }
                },
                _ = next_tick(&mut self.ticker) => self.handle_tick().await,
                _ = deadline(self.pending_snapshot) => {
                    self.pending_snapshot = None;
                    self.send_snapshot().await;
                }
                Some(reading) = readings.recv() => self.handle_reading(reading).await,
            }
        }

        self.stop_heart_rate().await;
        tracing::info!("{} device stopped", self.role);
    }

    // -------------------------------------------
    // Commands
    // -------------------------------------------

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartWorkout { plan_id, reply } => {
                let _ = reply.send(self.start_workout(plan_id).await);
            }
            Command::Restore { plan_id, reply } => {
                let _ = reply.send(self.restore(plan_id).await);
            }
            Command::Op { op, reply } => {
                let _ = reply.send(self.local_op(op).await);
            }
            Command::NextSet { reply } => {
                let result = match self.session.as_mut() {
                    Some(session) => {
                        let (outcome, effects) = session.next_set();
                        self.run_effects(effects).await;
                        Ok(outcome)
                    }
                    None => Err(DeviceError::NoSession),
                };
                let _ = reply.send(result);
            }
            Command::CompleteWorkout { reply } => {
                let now = self.clock.now_ms();
                let result = self
                    .session
                    .as_ref()
                    .map(|s| s.complete_workout(now))
                    .ok_or(DeviceError::NoSession);
                let _ = reply.send(result);
            }
            Command::EndSession { reply } => {
                let now = self.clock.now_ms();
                let result = match self.session.as_mut() {
                    Some(session) => {
                        let (record, effects) = session.end_session(now);
                        self.run_effects(effects).await;
                        Ok(record)
                    }
                    None => Err(DeviceError::NoSession),
                };
                let _ = reply.send(result);
            }
            Command::View { reply } => {
                let _ = reply.send(self.session.as_ref().map(SessionState::view));
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    async fn start_workout(&mut self, plan_id: PlanId) -> Result<SessionId, DeviceError> {
        let plan = self.store.load_plan(plan_id).await?;
        let (session, effects) = SessionState::originate(plan, self.tuning.clone())?;
        let session_id = session.session_id();
        if let Some(previous) = self.session.as_ref().filter(|s| s.terminal().is_none()) {
            tracing::warn!(
                "Replacing live session {} with {}",
                previous.session_id(),
                session_id
            );
        }
        tracing::info!("{} originated session {}", self.role, session_id);

        self.install(session, true).await;
        self.run_effects(effects).await;
        Ok(session_id)
    }

    async fn restore(&mut self, plan_id: PlanId) -> Result<SessionId, DeviceError> {
        let snapshot = self
            .store
            .load_cached_snapshot()
            .await?
            .ok_or(DeviceError::NothingToRestore)?;
        let plan = self.store.load_plan(plan_id).await?;
        let now = self.clock.now_ms();
        let session = SessionState::restore(plan, &snapshot, true, self.tuning.clone(), now)?;
        let session_id = session.session_id();
        tracing::info!("{} restored session {} from cache", self.role, session_id);

        self.install(session, true).await;
        self.send_snapshot().await;
        Ok(session_id)
    }

    async fn local_op(&mut self, op: Op) -> Result<(), DeviceError> {
        let now = self.clock.now_ms();
        let session = self.session.as_mut().ok_or(DeviceError::NoSession)?;
        let effects = match op {
            Op::Start => session.start(now),
            Op::Pause => session.pause(now),
            Op::LogSet { reps, weight } => session.log_set(reps, weight, now),
            Op::PrevSet => session.prev_set(),
            Op::NextExercise => session.next_exercise(),
            Op::PrevExercise => session.prev_exercise(),
            Op::UpdateReps(reps) => session.update_reps(reps),
            Op::UpdateWeight(weight) => session.update_weight(weight),
            Op::Cancel => session.cancel_session(),
        };
        self.run_effects(effects).await;
        Ok(())
    }

    // -------------------------------------------
    // Inbound
    // -------------------------------------------

    async fn handle_frame(&mut self, bytes: &[u8]) {
        let envelope = match Envelope::from_bytes(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("{} discarding undecodable frame: {}", self.role, e);
                return;
            }
        };
        if envelope.origin == self.role {
            tracing::debug!("{} discarding frame that looped back", self.role);
            return;
        }
        let message = match envelope.open() {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("{} discarding malformed envelope: {}", self.role, e);
                return;
            }
        };
        tracing::debug!(
            "{} received {:?} for session {}",
            self.role,
            message.message_type(),
            message.session_id()
        );
        self.receive(message).await;
    }

    async fn receive(&mut self, message: Message) {
        if let Message::StartSession(start) = &message {
            if self.should_adopt(start) {
                self.adopt(start.clone()).await;
                return;
            }
        }

        let now = self.clock.now_ms();
        let Some(session) = self.session.as_mut() else {
            tracing::debug!(
                "{} idle, ignoring {:?}",
                self.role,
                message.message_type()
            );
            return;
        };
        match session.apply(&message, now) {
            Ok(effects) => self.run_effects(effects).await,
            Err(e) => tracing::warn!(
                "{} rejected {:?} from peer: {}",
                self.role,
                message.message_type(),
                e
            ),
        }
    }

    fn should_adopt(&self, start: &StartSession) -> bool {
        // a redelivered start for an ended session must not revive it
        match &self.session {
            None => true,
            Some(session) => session.session_id() != start.session_id,
        }
    }

    async fn adopt(&mut self, start: StartSession) {
        let session_id = start.session_id;
        match SessionState::from_start(start, self.tuning.clone()) {
            Ok(session) => {
                tracing::info!("{} joined session {}", self.role, session_id);
                self.install(session, false).await;
            }
            Err(e) => tracing::warn!("{} rejected start for {}: {}", self.role, session_id, e),
        }
    }

    /// Make `session` the active one and restart per-session plumbing.
    async fn install(&mut self, session: SessionState, originator: bool) {
        self.ticker = None;
        self.pending_snapshot = None;
        let session_id = session.session_id();
        self.live = session.terminal().is_none();
        self.session = Some(session);
        self.emit(DeviceEvent::SessionStarted {
            session_id,
            originator,
        });
        self.start_heart_rate().await;
    }

    // -------------------------------------------
    // Timers and readings
    // -------------------------------------------

    async fn handle_tick(&mut self) {
        let now = self.clock.now_ms();
        if let Some(session) = self.session.as_mut() {
            let effects = session.tick(now);
            self.run_effects(effects).await;
        }
    }

    async fn handle_reading(&mut self, reading: Reading) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.session_id() != reading.session_id {
            return;
        }
        if let Some((outcome, effects)) = session.observe_heart_rate(reading.bpm) {
            tracing::info!(
                "{} auto-advanced at {} bpm: {:?}",
                self.role,
                reading.bpm,
                outcome
            );
            self.run_effects(effects).await;
        }
    }

    async fn start_heart_rate(&mut self) {
        self.stop_heart_rate().await;
        let (Some(source), Some(session)) = (self.heart_rate.clone(), self.session.as_ref()) else {
            return;
        };
        if !self.config.signal.enabled {
            return;
        }

        let session_id = session.session_id();
        let timeout = self.config.signal.authorization_timeout();
        let readings = self.readings.clone();
        let events = self.events.clone();
        let role = self.role;

        self.heart_rate_task = Some(tokio::spawn(async move {
            let stream = match authorize(source.as_ref(), timeout).await {
                Ok(()) => source.start_session().await,
                Err(e) => Err(e),
            };
            let mut stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!("{} heart rate unavailable: {}", role, e);
                    let _ = events.send(DeviceEvent::HeartRateUnavailable {
                        reason: e.to_string(),
                    });
                    return;
                }
            };
            while let Some(bpm) = stream.recv().await {
                if readings.send(Reading { session_id, bpm }).await.is_err() {
                    break;
                }
            }
        }));
    }

    async fn stop_heart_rate(&mut self) {
        let Some(task) = self.heart_rate_task.take() else {
            return;
        };
        task.abort();
        if let Some(source) = &self.heart_rate {
            if let Err(e) = source.end_session().await {
                tracing::debug!("{} heart rate end failed: {}", self.role, e);
            }
        }
    }

    // -------------------------------------------
    // Effects
    // -------------------------------------------

    /// Carry out effects from the core. The core has already applied its
    /// state change, so a terminal transition is detected against `live`.
    async fn run_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send { message, delivery } => self.send(message, delivery).await,
                Effect::ScheduleSnapshot { delay } => {
                    self.pending_snapshot = Some(Instant::now() + delay);
                }
                Effect::StartTicker => {
                    let mut ticker = interval_at(Instant::now() + TICK, TICK);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.ticker = Some(ticker);
                }
                Effect::StopTicker => self.ticker = None,
                Effect::Haptic(cue) => self.emit(DeviceEvent::Haptic(cue)),
                Effect::Emit(event) => self.emit(DeviceEvent::Session(event)),
                Effect::Persist(record) => self.persist(record).await,
            }
        }
        if self.live && !self.is_live() {
            self.live = false;
            self.wind_down().await;
        }
    }

    fn is_live(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.terminal().is_none())
    }

    async fn wind_down(&mut self) {
        let terminal = self.session.as_ref().and_then(SessionState::terminal);
        tracing::info!("{} session ended: {:?}", self.role, terminal);
        self.ticker = None;
        self.pending_snapshot = None;
        self.stop_heart_rate().await;
        if let Err(e) = self.store.clear_cached_snapshot().await {
            tracing::warn!("{} failed to clear snapshot cache: {}", self.role, e);
        }
    }

    async fn persist(&mut self, record: CompletedSession) {
        match self.store.save_completed_session(&record).await {
            Ok(()) => {
                tracing::info!(
                    "{} saved session {} ({} reps)",
                    self.role,
                    record.session_id,
                    record.total_reps()
                );
                self.emit(DeviceEvent::Saved(record));
            }
            Err(e) => tracing::error!("{} failed to save session: {}", self.role, e),
        }
    }

    async fn send_snapshot(&mut self) {
        let now = self.clock.now_ms();
        let snapshot = match self.session.as_ref() {
            Some(session) if session.terminal().is_none() => session.snapshot(now),
            _ => return,
        };
        self.send(Message::Snapshot(snapshot), Delivery::Latest)
            .await;
    }

    async fn send(&mut self, message: Message, delivery: Delivery) {
        let frame = match Envelope::seal(self.role, &message).and_then(|e| e.to_bytes()) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("{} failed to encode {:?}: {}", self.role, message.message_type(), e);
                return;
            }
        };

        let result = match delivery {
            Delivery::BestEffort => self.channel.send_best_effort(&frame).await,
            Delivery::Durable => {
                self.channel
                    .send_durable(&message.durable_key(), &frame)
                    .await
            }
            Delivery::Latest if self.channel.is_reachable() => {
                self.channel.send_best_effort(&frame).await
            }
            Delivery::Latest => {
                self.channel
                    .send_durable(&message.durable_key(), &frame)
                    .await
            }
        };
        match result {
            Ok(()) => tracing::debug!(
                "{} sent {:?} ({:?})",
                self.role,
                message.message_type(),
                delivery
            ),
            Err(ChannelError::Unreachable) => tracing::debug!(
                "{} peer unreachable, dropped {:?}",
                self.role,
                message.message_type()
            ),
            Err(e) => tracing::warn!("{} send failed: {}", self.role, e),
        }

        if let Message::Snapshot(snapshot) = &message {
            if let Err(e) = self.store.save_cached_snapshot(snapshot).await {
                tracing::warn!("{} failed to cache snapshot: {}", self.role, e);
            }
        }
    }

    fn emit(&self, event: DeviceEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("{} event receiver dropped", self.role);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::signal::{Authorization, ScriptedHeartRate};
    use crate::store::MemoryStore;
    use liftsync_core::Terminal;
    use liftsync_types::{ActionKind, ActionMessage, ExercisePlan, WorkoutPlan};

    const T0: u64 = 1_705_000_000_000;

    fn plan() -> WorkoutPlan {
        WorkoutPlan::new(
            "Pull & Squat",
            vec![
                ExercisePlan::new("Squat", 3, 8)
                    .with_weight(135.0)
                    .with_rest_times(vec![60, 60, 90]),
                ExercisePlan::new("Row", 2, 10)
                    .with_weight(95.0)
                    .with_rest_times(vec![45, 45]),
            ],
        )
    }

    struct Side {
        handle: DeviceHandle,
        events: DeviceEvents,
        store: Arc<MemoryStore>,
        link: MemoryChannel,
    }

    struct Pair {
        plan: WorkoutPlan,
        watch: Side,
        phone: Side,
    }

    fn side(
        role: DeviceRole,
        link: MemoryChannel,
        plan: &WorkoutPlan,
        heart_rate: Option<Arc<dyn HeartRateSource>>,
        config: DeviceConfig,
    ) -> Side {
        let store = Arc::new(MemoryStore::with_plan(plan.clone()));
        let mut setup = DeviceSetup::new(role, Arc::new(link.clone()), store.clone())
            .with_clock(Clock::starting_at(T0))
            .with_config(config);
        if let Some(source) = heart_rate {
            setup = setup.with_heart_rate(source);
        }
        let (handle, events) = spawn_device(setup);
        Side {
            handle,
            events,
            store,
            link,
        }
    }

    fn pair_with(
        watch_heart_rate: Option<Arc<dyn HeartRateSource>>,
        config: DeviceConfig,
    ) -> Pair {
        let plan = plan();
        let (watch_link, phone_link) = MemoryChannel::pair();
        Pair {
            watch: side(
                DeviceRole::Watch,
                watch_link,
                &plan,
                watch_heart_rate,
                config.clone(),
            ),
            phone: side(DeviceRole::Phone, phone_link, &plan, None, config),
            plan,
        }
    }

    fn pair() -> Pair {
        pair_with(None, DeviceConfig::default())
    }

    /// Let both tasks drain their queues without crossing a tick boundary.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    async fn view(side: &Side) -> SessionView {
        side.handle.view().await.unwrap().unwrap()
    }

    fn drain(events: &mut DeviceEvents) -> Vec<DeviceEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    // ===========================================
    // Session lifecycle
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn companion_joins_originated_session() {
        let mut p = pair();
        let session_id = p.watch.handle.start_workout(p.plan.id).await.unwrap();
        settle().await;

        let phone = view(&p.phone).await;
        assert_eq!(phone.session_id, session_id);
        assert!(!phone.is_originator);
        assert_eq!(phone.current_set, 1);
        assert_eq!(phone.rest_secs, 60);

        assert!(drain(&mut p.watch.events).contains(&DeviceEvent::SessionStarted {
            session_id,
            originator: true
        }));
        assert!(drain(&mut p.phone.events).contains(&DeviceEvent::SessionStarted {
            session_id,
            originator: false
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn commands_without_session_fail() {
        let p = pair();
        assert!(matches!(
            p.phone.handle.next_set().await,
            Err(DeviceError::NoSession)
        ));
        assert!(matches!(
            p.phone.handle.start().await,
            Err(DeviceError::NoSession)
        ));
        assert!(p.phone.handle.view().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_plan_is_a_store_error() {
        let p = pair();
        assert!(matches!(
            p.watch.handle.start_workout(PlanId::new()).await,
            Err(DeviceError::Store(StoreError::PlanNotFound(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn start_runs_both_clocks() {
        let p = pair();
        p.watch.handle.start_workout(p.plan.id).await.unwrap();
        p.watch.handle.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(3_500)).await;

        let watch = view(&p.watch).await;
        let phone = view(&p.phone).await;
        assert!(watch.running && phone.running);
        assert_eq!(watch.workout_elapsed_secs, 3);
        assert_eq!(phone.workout_elapsed_secs, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_propagates() {
        let mut p = pair();
        p.watch.handle.start_workout(p.plan.id).await.unwrap();
        settle().await;

        p.watch.handle.log_set(8, 135.0).await.unwrap();
        assert_eq!(
            p.watch.handle.next_set().await.unwrap(),
            AdvanceOutcome::AdvancedSet
        );
        settle().await;

        let phone = view(&p.phone).await;
        assert_eq!(phone.current_set, 2);
        assert!(drain(&mut p.phone.events).contains(&DeviceEvent::Haptic(Cue::Advance)));

        p.phone.handle.update_weight(140.0).await.unwrap();
        settle().await;
        assert_eq!(view(&p.watch).await.weight_input, 140.0);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_action_is_repaired_by_trailing_snapshot() {
        let p = pair();
        p.watch.handle.start_workout(p.plan.id).await.unwrap();
        settle().await;

        p.watch.link.drop_next(1);
        p.watch.handle.next_set().await.unwrap();
        settle().await;
        assert_eq!(view(&p.phone).await.current_set, 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(view(&p.phone).await.current_set, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshots_are_cached() {
        let p = pair();
        p.watch.handle.start_workout(p.plan.id).await.unwrap();
        p.watch.handle.log_set(8, 135.0).await.unwrap();

        let cached = p.watch.store.cached_snapshot().unwrap();
        assert_eq!(cached.current_exercise.completed_reps, vec![8]);
    }

    // ===========================================
    // Ending
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn end_while_unreachable_is_delivered_later() {
        let mut p = pair();
        p.watch.handle.start_workout(p.plan.id).await.unwrap();
        p.watch.handle.start().await.unwrap();
        settle().await;

        p.watch.link.set_reachable(false);
        p.watch.handle.log_set(8, 135.0).await.unwrap();
        let record = p.watch.handle.end_session().await.unwrap().unwrap();
        assert_eq!(record.entries[0].reps, vec![8]);
        assert_eq!(p.watch.store.completed_sessions(), vec![record]);
        assert!(p.watch.store.cached_snapshot().is_none());

        settle().await;
        assert!(view(&p.phone).await.terminal.is_none());

        p.watch.link.set_reachable(true);
        settle().await;
        let phone = view(&p.phone).await;
        assert_eq!(phone.terminal, Some(Terminal::EndedRemotely));
        assert!(!phone.running);
        assert!(drain(&mut p.phone.events).contains(&DeviceEvent::Session(
            SessionEvent::Dismissed {
                terminal: Terminal::EndedRemotely,
                saved: false,
            }
        )));
        assert!(p.phone.store.completed_sessions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn originator_saves_when_companion_ends() {
        let mut p = pair();
        p.watch.handle.start_workout(p.plan.id).await.unwrap();
        p.watch.handle.log_set(8, 135.0).await.unwrap();
        settle().await;

        assert_eq!(p.phone.handle.end_session().await.unwrap(), None);
        settle().await;

        let saved = p.watch.store.completed_sessions();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].entries[0].reps, vec![8]);
        assert!(drain(&mut p.watch.events)
            .iter()
            .any(|e| matches!(e, DeviceEvent::Saved(_))));
        assert!(p.phone.store.completed_sessions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transmitted_record_is_saved_by_peer() {
        let mut config = DeviceConfig::default();
        config.sync.transmit_completed_session = true;
        let p = pair_with(None, config);
        p.watch.handle.start_workout(p.plan.id).await.unwrap();
        settle().await;

        p.watch.handle.end_session().await.unwrap();
        settle().await;

        assert_eq!(p.phone.store.completed_sessions().len(), 1);
        assert_eq!(
            view(&p.phone).await.terminal,
            Some(Terminal::EndedRemotely)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_on_both_sides() {
        let p = pair();
        p.watch.handle.start_workout(p.plan.id).await.unwrap();
        settle().await;

        p.phone.handle.cancel_session().await.unwrap();
        settle().await;

        assert_eq!(
            view(&p.phone).await.terminal,
            Some(Terminal::CanceledLocally)
        );
        assert_eq!(
            view(&p.watch).await.terminal,
            Some(Terminal::CanceledRemotely)
        );
        assert!(p.watch.store.completed_sessions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn new_start_replaces_terminal_session() {
        let p = pair();
        let first = p.watch.handle.start_workout(p.plan.id).await.unwrap();
        p.watch.handle.end_session().await.unwrap();
        let second = p.phone.handle.start_workout(p.plan.id).await.unwrap();
        settle().await;

        assert_ne!(first, second);
        let watch = view(&p.watch).await;
        assert_eq!(watch.session_id, second);
        assert!(!watch.is_originator);
        assert!(watch.terminal.is_none());
    }

    // ===========================================
    // Frame hygiene
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn garbage_and_looped_frames_are_discarded() {
        let p = pair();
        p.watch.handle.start_workout(p.plan.id).await.unwrap();
        settle().await;
        let session_id = view(&p.watch).await.session_id;

        // frames from the phone's end land in the watch's inbox
        p.phone.link.send_best_effort(b"not an envelope").await.unwrap();
        let looped = Envelope::seal(
            DeviceRole::Watch,
            &Message::Action(ActionMessage {
                action: ActionKind::NextSet,
                session_id,
            }),
        )
        .unwrap()
        .to_bytes()
        .unwrap();
        p.phone.link.send_best_effort(&looped).await.unwrap();
        settle().await;

        assert_eq!(view(&p.watch).await.current_set, 1);
    }

    // ===========================================
    // Restore
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn restore_rebuilds_from_cached_snapshot() {
        let p = pair();
        let session_id = p.watch.handle.start_workout(p.plan.id).await.unwrap();
        p.watch.handle.log_set(8, 135.0).await.unwrap();
        p.watch.handle.next_set().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let cached = p.watch.store.cached_snapshot().unwrap();
        let (link, _peer) = MemoryChannel::pair();
        let store = Arc::new(MemoryStore::with_plan(p.plan.clone()));
        store.save_cached_snapshot(&cached).await.unwrap();
        let (restarted, _events) = spawn_device(
            DeviceSetup::new(DeviceRole::Watch, Arc::new(link), store)
                .with_clock(Clock::starting_at(T0)),
        );

        assert_eq!(restarted.restore(p.plan.id).await.unwrap(), session_id);
        let view = restarted.view().await.unwrap().unwrap();
        assert_eq!(view.current_set, 2);
        assert!(view.is_originator);
    }

    #[tokio::test(start_paused = true)]
    async fn restore_without_cache_fails() {
        let p = pair();
        assert!(matches!(
            p.phone.handle.restore(p.plan.id).await,
            Err(DeviceError::NothingToRestore)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn ended_session_cannot_be_restored() {
        let p = pair();
        p.watch.handle.start_workout(p.plan.id).await.unwrap();
        p.watch.handle.log_set(8, 135.0).await.unwrap();
        assert!(p.watch.store.cached_snapshot().is_some());

        p.watch.handle.end_session().await.unwrap();
        assert!(p.watch.store.cached_snapshot().is_none());
        assert!(matches!(
            p.watch.handle.restore(p.plan.id).await,
            Err(DeviceError::NothingToRestore)
        ));
        assert_eq!(
            view(&p.watch).await.terminal,
            Some(Terminal::CompletedLocally)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn redelivered_start_keeps_session_ended() {
        let mut p = pair();
        let session_id = p.watch.handle.start_workout(p.plan.id).await.unwrap();
        settle().await;
        p.watch.handle.end_session().await.unwrap();
        settle().await;
        assert_eq!(
            view(&p.phone).await.terminal,
            Some(Terminal::EndedRemotely)
        );
        drain(&mut p.phone.events);

        // frames from the watch's end land in the phone's inbox
        let duplicate = Envelope::seal(
            DeviceRole::Watch,
            &Message::StartSession(StartSession {
                session_id,
                plan: p.plan.clone(),
            }),
        )
        .unwrap()
        .to_bytes()
        .unwrap();
        p.watch.link.send_best_effort(&duplicate).await.unwrap();
        settle().await;

        let phone = view(&p.phone).await;
        assert_eq!(phone.session_id, session_id);
        assert_eq!(phone.terminal, Some(Terminal::EndedRemotely));
        assert!(!drain(&mut p.phone.events)
            .iter()
            .any(|e| matches!(e, DeviceEvent::SessionStarted { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_stops_when_session_ends() {
        let p = pair();
        p.watch.handle.start_workout(p.plan.id).await.unwrap();
        p.watch.handle.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2_500)).await;

        p.watch.handle.cancel_session().await.unwrap();
        let frozen = view(&p.watch).await;
        tokio::time::sleep(Duration::from_millis(10_000)).await;

        let later = view(&p.watch).await;
        assert_eq!(later.set_elapsed, frozen.set_elapsed);
        assert_eq!(later.workout_elapsed_secs, frozen.workout_elapsed_secs);
    }

    // ===========================================
    // Heart rate
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn heart_rate_recovery_auto_advances() {
        let source = Arc::new(ScriptedHeartRate::new(vec![
            90.0, 90.0, 92.0, 110.0, 140.0, 150.0, 120.0,
        ]));
        let mut p = pair_with(Some(source.clone()), DeviceConfig::default());
        p.watch.handle.start_workout(p.plan.id).await.unwrap();
        p.watch.handle.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(7_500)).await;

        assert_eq!(source.sessions_started(), 1);
        assert_eq!(view(&p.watch).await.current_set, 2);
        assert_eq!(view(&p.phone).await.current_set, 2);
        assert!(drain(&mut p.watch.events).contains(&DeviceEvent::Session(
            SessionEvent::AutoAdvanced {
                outcome: AdvanceOutcome::AdvancedSet
            }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_authorization_reports_unavailable() {
        let source = Arc::new(
            ScriptedHeartRate::new(vec![120.0; 20]).with_authorization(Authorization::Hang),
        );
        let mut p = pair_with(Some(source.clone()), DeviceConfig::default());
        p.watch.handle.start_workout(p.plan.id).await.unwrap();

        tokio::time::sleep(Duration::from_millis(9_900)).await;
        assert!(!drain(&mut p.watch.events)
            .iter()
            .any(|e| matches!(e, DeviceEvent::HeartRateUnavailable { .. })));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(drain(&mut p.watch.events)
            .iter()
            .any(|e| matches!(e, DeviceEvent::HeartRateUnavailable { .. })));
        assert_eq!(source.sessions_started(), 0);

        // manual navigation still works
        p.watch.handle.next_set().await.unwrap();
        assert_eq!(view(&p.watch).await.current_set, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn heart_rate_stops_when_session_ends() {
        let source = Arc::new(ScriptedHeartRate::new(vec![100.0; 60]));
        let p = pair_with(Some(source.clone()), DeviceConfig::default());
        p.watch.handle.start_workout(p.plan.id).await.unwrap();
        settle().await;
        assert!(source.is_streaming());

        p.watch.handle.cancel_session().await.unwrap();
        assert!(!source.is_streaming());
    }

    // ===========================================
    // Shutdown
    // ===========================================

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_accepting_commands() {
        let p = pair();
        p.watch.handle.shutdown().await.unwrap();
        assert!(matches!(
            p.watch.handle.view().await,
            Err(DeviceError::Stopped)
        ));
    }
}

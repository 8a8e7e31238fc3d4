//! Session state machine for liftsync.
//!
//! One [`SessionState`] exists per device per live session. It is pure:
//! every operation mutates the state and returns the [`Effect`]s the driver
//! must carry out (messages, ticker control, UI signals). Time is passed in
//! as unix milliseconds.
//!
//! Local operations announce themselves to the peer. The same operations
//! run silently when invoked while a remote message is being applied; see
//! [`SessionState::apply`](crate::SessionState::apply).

use liftsync_types::{
    ActionKind, ActionMessage, CompletedExercise, CompletedSession, ExercisePlan, ExerciseSnapshot,
    Message, SessionId, Snapshot, StartSession, WorkoutPlan,
};

use crate::effect::{Cue, Delivery, Effect, SessionEvent};
use crate::error::SessionError;
use crate::recovery::RecoveryDetector;
use crate::timer::{crossed_rest_threshold, heartbeat_due, WorkoutClock};
use crate::tuning::Tuning;

/// Result of [`SessionState::next_set`].
///
/// Callers must distinguish advancing from finishing: `ReachedEnd` means
/// nothing moved and the UI should offer to end the workout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Moved to the next set of the same exercise.
    AdvancedSet,
    /// Moved to set 1 of the next exercise.
    AdvancedExercise,
    /// Already on the last set of the last exercise.
    ReachedEnd,
}

/// How a session ended. Absorbing: a terminal session never becomes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// Ended on this device.
    CompletedLocally,
    /// Canceled on this device.
    CanceledLocally,
    /// The peer sent `EndSession`.
    EndedRemotely,
    /// The peer sent `CancelSession`.
    CanceledRemotely,
}

impl Terminal {
    /// Whether the session was discarded rather than finished.
    pub fn is_cancel(self) -> bool {
        matches!(self, Self::CanceledLocally | Self::CanceledRemotely)
    }

    /// Whether the peer ended the session.
    pub fn is_remote(self) -> bool {
        matches!(self, Self::EndedRemotely | Self::CanceledRemotely)
    }
}

/// Read-only summary of a session for display.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    /// Session identity.
    pub session_id: SessionId,
    /// Whether this device generated the session id.
    pub is_originator: bool,
    /// Position of the current exercise in the plan.
    pub exercise_index: usize,
    /// Name of the current exercise.
    pub exercise_name: String,
    /// 1-based set number.
    pub current_set: u32,
    /// Target sets of the current exercise.
    pub total_sets: u32,
    /// Pending reps input.
    pub reps_input: u32,
    /// Pending weight input.
    pub weight_input: f64,
    /// Rest duration for the current set, seconds.
    pub rest_secs: u32,
    /// Seconds since the current set/rest period began.
    pub set_elapsed: u32,
    /// Workout elapsed seconds.
    pub workout_elapsed_secs: u64,
    /// Whether the workout clock is advancing.
    pub running: bool,
    /// How the session ended, if it has.
    pub terminal: Option<Terminal>,
    /// Latest heart-rate reading.
    pub heart_rate: Option<f64>,
}

/// The live state of one workout session on one device.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub(crate) session_id: SessionId,
    pub(crate) plan: WorkoutPlan,
    pub(crate) is_originator: bool,
    pub(crate) tuning: Tuning,
    pub(crate) exercise_index: usize,
    pub(crate) current_set: u32,
    pub(crate) reps_input: u32,
    pub(crate) weight_input: f64,
    pub(crate) logged_reps: Vec<Vec<u32>>,
    pub(crate) logged_weights: Vec<Vec<f64>>,
    pub(crate) rest_secs: u32,
    pub(crate) clock: WorkoutClock,
    pub(crate) set_elapsed: u32,
    pub(crate) terminal: Option<Terminal>,
    /// Held for the whole of one `apply` call. Suppresses outbound messages
    /// and makes `log_set` and `tick` no-ops.
    pub(crate) applying_remote: bool,
    pub(crate) recovery: RecoveryDetector,
    pub(crate) heart_rate: Option<f64>,
}

impl SessionState {
    fn with_identity(
        session_id: SessionId,
        plan: WorkoutPlan,
        is_originator: bool,
        tuning: Tuning,
    ) -> Result<Self, SessionError> {
        plan.validate()?;
        let count = plan.exercise_count();
        let recovery = RecoveryDetector::new(tuning.recovery.clone());
        let mut state = Self {
            session_id,
            plan,
            is_originator,
            tuning,
            exercise_index: 0,
            current_set: 1,
            reps_input: 0,
            weight_input: 0.0,
            logged_reps: vec![Vec::new(); count],
            logged_weights: vec![Vec::new(); count],
            rest_secs: 0,
            clock: WorkoutClock::new(),
            set_elapsed: 0,
            terminal: None,
            applying_remote: false,
            recovery,
            heart_rate: None,
        };
        state.move_to_exercise(0);
        Ok(state)
    }

    /// Start a new session on this device (the originator).
    ///
    /// Returns the state plus the StartSession message for the companion.
    pub fn originate(plan: WorkoutPlan, tuning: Tuning) -> Result<(Self, Vec<Effect>), SessionError> {
        let state = Self::with_identity(SessionId::new(), plan, true, tuning)?;
        let start = Message::StartSession(StartSession {
            session_id: state.session_id,
            plan: state.plan.clone(),
        });
        let effects = vec![Effect::Send {
            message: start,
            delivery: Delivery::Durable,
        }];
        Ok((state, effects))
    }

    /// Build the companion's state from a StartSession message.
    pub fn from_start(start: StartSession, tuning: Tuning) -> Result<Self, SessionError> {
        Self::with_identity(start.session_id, start.plan, false, tuning)
    }

    /// Rebuild a session from a cached snapshot, e.g. after a restart.
    pub fn restore(
        plan: WorkoutPlan,
        snapshot: &Snapshot,
        is_originator: bool,
        tuning: Tuning,
        now_ms: u64,
    ) -> Result<Self, SessionError> {
        let mut state = Self::with_identity(snapshot.session_id, plan, is_originator, tuning)?;
        state.applying_remote = true;
        let result = state.apply_snapshot(snapshot, now_ms);
        state.applying_remote = false;
        result?;
        Ok(state)
    }

    // ------------------------------------------------------------------
    // Local operations
    // ------------------------------------------------------------------

    /// Start (or resume) the workout clock.
    pub fn start(&mut self, now_ms: u64) -> Vec<Effect> {
        if self.terminal.is_some() || !self.clock.start(now_ms) {
            return Vec::new();
        }
        let mut effects = vec![Effect::StartTicker];
        effects.extend(self.announce(ActionKind::TimerStarted));
        effects.extend(self.snapshot_effect(now_ms));
        effects
    }

    /// Pause the workout clock. Local only; the peer is not told.
    pub fn pause(&mut self, now_ms: u64) -> Vec<Effect> {
        if self.terminal.is_some() || !self.clock.pause(now_ms) {
            return Vec::new();
        }
        vec![Effect::StopTicker]
    }

    /// Record what was performed for the current set.
    pub fn log_set(&mut self, reps: u32, weight: f64, now_ms: u64) -> Vec<Effect> {
        if self.applying_remote || self.terminal.is_some() {
            return Vec::new();
        }
        let slot = self.current_set.saturating_sub(1) as usize;
        let reps_log = &mut self.logged_reps[self.exercise_index];
        if reps_log.len() <= slot {
            reps_log.resize(slot + 1, 0);
        }
        reps_log[slot] = reps;
        let weight_log = &mut self.logged_weights[self.exercise_index];
        if weight_log.len() <= slot {
            weight_log.resize(slot + 1, 0.0);
        }
        weight_log[slot] = weight;
        self.snapshot_effect(now_ms)
    }

    /// Advance one set, rolling over to the next exercise after the last set.
    pub fn next_set(&mut self) -> (AdvanceOutcome, Vec<Effect>) {
        if self.terminal.is_some() {
            return (AdvanceOutcome::ReachedEnd, Vec::new());
        }
        let target_sets = self.current_exercise().target_sets;
        if self.current_set < target_sets {
            self.current_set += 1;
            self.enter_set();
            (
                AdvanceOutcome::AdvancedSet,
                self.announce_with_snapshot(ActionKind::NextSet),
            )
        } else if self.exercise_index + 1 < self.plan.exercise_count() {
            self.move_to_exercise(self.exercise_index + 1);
            (
                AdvanceOutcome::AdvancedExercise,
                self.announce_with_snapshot(ActionKind::NextExercise),
            )
        } else {
            (AdvanceOutcome::ReachedEnd, Vec::new())
        }
    }

    /// Go back one set. No-op on set 1.
    pub fn prev_set(&mut self) -> Vec<Effect> {
        if self.terminal.is_some() || self.current_set <= 1 {
            return Vec::new();
        }
        self.current_set -= 1;
        self.enter_set();
        self.announce_with_snapshot(ActionKind::PreviousSet)
    }

    /// Move to the next exercise. No-op on the last one.
    pub fn next_exercise(&mut self) -> Vec<Effect> {
        if self.terminal.is_some() || self.exercise_index + 1 >= self.plan.exercise_count() {
            return Vec::new();
        }
        self.move_to_exercise(self.exercise_index + 1);
        self.announce_with_snapshot(ActionKind::NextExercise)
    }

    /// Move to the previous exercise. No-op on the first one.
    pub fn prev_exercise(&mut self) -> Vec<Effect> {
        if self.terminal.is_some() || self.exercise_index == 0 {
            return Vec::new();
        }
        self.move_to_exercise(self.exercise_index - 1);
        self.announce_with_snapshot(ActionKind::PreviousExercise)
    }

    /// Overwrite the pending reps input.
    pub fn update_reps(&mut self, reps: u32) -> Vec<Effect> {
        if self.terminal.is_some() || self.reps_input == reps {
            return Vec::new();
        }
        self.reps_input = reps;
        self.announce_with_snapshot(ActionKind::UpdateReps { reps })
    }

    /// Overwrite the pending weight input.
    pub fn update_weight(&mut self, weight: f64) -> Vec<Effect> {
        if self.terminal.is_some() || self.weight_input == weight {
            return Vec::new();
        }
        self.weight_input = weight;
        self.announce_with_snapshot(ActionKind::UpdateWeight { weight })
    }

    /// Build the finished record. Does not end the session or send anything.
    pub fn complete_workout(&self, now_ms: u64) -> CompletedSession {
        let elapsed = self.clock.elapsed_at(now_ms);
        let entries = self
            .plan
            .exercises
            .iter()
            .enumerate()
            .map(|(i, exercise)| CompletedExercise {
                exercise_id: exercise.id,
                name: exercise.name.clone(),
                reps: self.logged_reps[i].clone(),
                weights: self.logged_weights[i].clone(),
            })
            .collect();
        CompletedSession {
            session_id: self.session_id,
            entries,
            start_time: now_ms.saturating_sub(elapsed),
            end_time: now_ms,
        }
    }

    /// End the session from this device.
    ///
    /// The originator owns the data: it builds the record, hands it to the
    /// store, then tells the peer. A companion only sends `EndSession`; the
    /// originator persists when that arrives.
    pub fn end_session(&mut self, now_ms: u64) -> (Option<CompletedSession>, Vec<Effect>) {
        if self.terminal.is_some() {
            return (None, Vec::new());
        }
        let mut effects = vec![Effect::StopTicker];
        self.clock.tick(now_ms);
        let record = self.is_originator.then(|| self.complete_workout(now_ms));
        self.clock.halt();
        self.terminal = Some(Terminal::CompletedLocally);

        if let Some(record) = &record {
            effects.push(Effect::Persist(record.clone()));
            if self.tuning.transmit_completed_session {
                effects.push(Effect::Send {
                    message: Message::CompletedSession(record.clone()),
                    delivery: Delivery::Durable,
                });
            }
        }
        effects.push(self.action_message(ActionKind::EndSession, Delivery::Durable));
        (record, effects)
    }

    /// Discard the session from this device without saving.
    pub fn cancel_session(&mut self) -> Vec<Effect> {
        if self.terminal.is_some() {
            return Vec::new();
        }
        self.clock.halt();
        self.terminal = Some(Terminal::CanceledLocally);
        vec![
            Effect::StopTicker,
            self.action_message(ActionKind::CancelSession, Delivery::Durable),
        ]
    }

    /// One-second ticker callback.
    pub fn tick(&mut self, now_ms: u64) -> Vec<Effect> {
        if self.terminal.is_some() || self.applying_remote || !self.clock.is_running() {
            return Vec::new();
        }
        self.clock.tick(now_ms);
        let previous = self.set_elapsed;
        self.set_elapsed = previous.saturating_add(1);

        let mut effects = Vec::new();
        if crossed_rest_threshold(previous, self.set_elapsed, self.rest_secs) {
            effects.push(Effect::Haptic(Cue::RestComplete));
            effects.push(Effect::Emit(SessionEvent::RestComplete));
        }
        if heartbeat_due(self.set_elapsed, self.tuning.heartbeat_secs) {
            effects.extend(self.snapshot_effect(now_ms));
        }
        effects
    }

    /// Feed a heart-rate reading. When recovery after a set is detected the
    /// session advances through the same path as [`next_set`](Self::next_set).
    pub fn observe_heart_rate(&mut self, bpm: f64) -> Option<(AdvanceOutcome, Vec<Effect>)> {
        self.heart_rate = Some(bpm);
        if self.terminal.is_some() || !self.clock.is_running() {
            return None;
        }
        if !self.recovery.observe(bpm) {
            return None;
        }
        let (outcome, mut effects) = self.next_set();
        effects.push(Effect::Emit(SessionEvent::AutoAdvanced { outcome }));
        Some((outcome, effects))
    }

    /// Full-state snapshot of the current exercise.
    pub fn snapshot(&self, now_ms: u64) -> Snapshot {
        let exercise = self.current_exercise();
        Snapshot {
            session_id: self.session_id,
            current_exercise: ExerciseSnapshot {
                exercise_id: exercise.id,
                name: exercise.name.clone(),
                current_set: self.current_set,
                total_sets: exercise.target_sets,
                current_reps: self.reps_input,
                current_weight: self.weight_input,
                rest_time: self.rest_secs,
                elapsed_time: self.set_elapsed,
                completed_reps: self.logged_reps[self.exercise_index].clone(),
                completed_weights: self.logged_weights[self.exercise_index].clone(),
            },
            workout_start_time: self.clock.start_ms(),
            timestamp: now_ms,
        }
    }

    /// Display summary.
    pub fn view(&self) -> SessionView {
        let exercise = self.current_exercise();
        SessionView {
            session_id: self.session_id,
            is_originator: self.is_originator,
            exercise_index: self.exercise_index,
            exercise_name: exercise.name.clone(),
            current_set: self.current_set,
            total_sets: exercise.target_sets,
            reps_input: self.reps_input,
            weight_input: self.weight_input,
            rest_secs: self.rest_secs,
            set_elapsed: self.set_elapsed,
            workout_elapsed_secs: self.clock.elapsed_ms() / 1000,
            running: self.clock.is_running(),
            terminal: self.terminal,
            heart_rate: self.heart_rate,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Session identity.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// The plan being executed.
    pub fn plan(&self) -> &WorkoutPlan {
        &self.plan
    }

    /// Whether this device generated the session id.
    pub fn is_originator(&self) -> bool {
        self.is_originator
    }

    /// Position of the current exercise.
    pub fn exercise_index(&self) -> usize {
        self.exercise_index
    }

    /// 1-based set number.
    pub fn current_set(&self) -> u32 {
        self.current_set
    }

    /// Pending reps input.
    pub fn reps_input(&self) -> u32 {
        self.reps_input
    }

    /// Pending weight input.
    pub fn weight_input(&self) -> f64 {
        self.weight_input
    }

    /// Rest duration for the current set.
    pub fn rest_secs(&self) -> u32 {
        self.rest_secs
    }

    /// Seconds since the current set/rest period began.
    pub fn set_elapsed(&self) -> u32 {
        self.set_elapsed
    }

    /// Whether the workout clock is advancing.
    pub fn is_running(&self) -> bool {
        self.clock.is_running()
    }

    /// Workout start, unix milliseconds.
    pub fn workout_start_ms(&self) -> Option<u64> {
        self.clock.start_ms()
    }

    /// Workout elapsed milliseconds as of the last tick.
    pub fn workout_elapsed_ms(&self) -> u64 {
        self.clock.elapsed_ms()
    }

    /// How the session ended, if it has.
    pub fn terminal(&self) -> Option<Terminal> {
        self.terminal
    }

    /// Logged reps for an exercise.
    pub fn logged_reps(&self, exercise_index: usize) -> &[u32] {
        self.logged_reps
            .get(exercise_index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Logged weights for an exercise.
    pub fn logged_weights(&self, exercise_index: usize) -> &[f64] {
        self.logged_weights
            .get(exercise_index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    pub(crate) fn current_exercise(&self) -> &ExercisePlan {
        &self.plan.exercises[self.exercise_index]
    }

    /// Rest is looked up fresh on every transition.
    pub(crate) fn enter_set(&mut self) {
        self.rest_secs = self.current_exercise().rest_for_set(self.current_set);
        self.set_elapsed = 0;
    }

    fn move_to_exercise(&mut self, index: usize) {
        self.exercise_index = index;
        self.current_set = 1;
        let (reps, weight) = {
            let exercise = self.current_exercise();
            (exercise.target_reps, exercise.default_weight())
        };
        self.reps_input = reps;
        self.weight_input = weight;
        self.enter_set();
    }

    fn action_message(&self, action: ActionKind, delivery: Delivery) -> Effect {
        Effect::Send {
            message: Message::Action(ActionMessage {
                action,
                session_id: self.session_id,
            }),
            delivery,
        }
    }

    fn announce(&self, action: ActionKind) -> Vec<Effect> {
        if self.applying_remote {
            return Vec::new();
        }
        vec![self.action_message(action, Delivery::BestEffort)]
    }

    fn announce_with_snapshot(&self, action: ActionKind) -> Vec<Effect> {
        let mut effects = self.announce(action);
        if !effects.is_empty() {
            effects.push(Effect::ScheduleSnapshot {
                delay: self.tuning.post_action_snapshot,
            });
        }
        effects
    }

    fn snapshot_effect(&self, now_ms: u64) -> Vec<Effect> {
        if self.applying_remote {
            return Vec::new();
        }
        vec![Effect::Send {
            message: Message::Snapshot(self.snapshot(now_ms)),
            delivery: Delivery::Latest,
        }]
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use liftsync_types::ExercisePlan;

    pub(crate) const T0: u64 = 1_705_000_000_000;

    /// Squat(3 sets, rest 60/60/90) then Row(2 sets, rest 45/45).
    pub(crate) fn squat_row_plan() -> WorkoutPlan {
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

    pub(crate) fn originator() -> SessionState {
        SessionState::originate(squat_row_plan(), Tuning::default())
            .unwrap()
            .0
    }

    pub(crate) fn sent(effects: &[Effect]) -> Vec<&Message> {
        effects.iter().filter_map(Effect::message).collect()
    }

    fn sent_actions(effects: &[Effect]) -> Vec<ActionKind> {
        sent(effects)
            .into_iter()
            .filter_map(|m| match m {
                Message::Action(a) => Some(a.action),
                _ => None,
            })
            .collect()
    }

    // ===========================================
    // Construction
    // ===========================================

    #[test]
    fn originate_sends_durable_start() {
        let (state, effects) = SessionState::originate(squat_row_plan(), Tuning::default()).unwrap();

        assert!(state.is_originator());
        assert_eq!(effects.len(), 1);
        match &effects[0] {
            Effect::Send {
                message: Message::StartSession(start),
                delivery: Delivery::Durable,
            } => assert_eq!(start.session_id, state.session_id()),
            other => panic!("Expected durable StartSession, got {:?}", other),
        }
    }

    #[test]
    fn from_start_adopts_session_id() {
        let (origin, _) = SessionState::originate(squat_row_plan(), Tuning::default()).unwrap();
        let companion = SessionState::from_start(
            StartSession {
                session_id: origin.session_id(),
                plan: origin.plan().clone(),
            },
            Tuning::default(),
        )
        .unwrap();

        assert_eq!(companion.session_id(), origin.session_id());
        assert!(!companion.is_originator());
        assert_eq!(companion.current_set(), 1);
        assert_eq!(companion.rest_secs(), 60);
        assert_eq!(companion.reps_input(), 8);
        assert_eq!(companion.weight_input(), 135.0);
    }

    #[test]
    fn invalid_plan_is_rejected() {
        let plan = WorkoutPlan::new("Nothing", vec![]);
        assert!(matches!(
            SessionState::originate(plan, Tuning::default()),
            Err(SessionError::InvalidPlan(_))
        ));
    }

    // ===========================================
    // Clock
    // ===========================================

    #[test]
    fn start_announces_and_snapshots() {
        let mut state = originator();
        let effects = state.start(T0);

        assert!(state.is_running());
        assert_eq!(state.workout_start_ms(), Some(T0));
        assert_eq!(effects[0], Effect::StartTicker);
        assert_eq!(sent_actions(&effects), vec![ActionKind::TimerStarted]);
        assert!(sent(&effects)
            .iter()
            .any(|m| matches!(m, Message::Snapshot(_))));

        assert!(state.start(T0 + 1_000).is_empty());
    }

    #[test]
    fn pause_is_local_only() {
        let mut state = originator();
        state.start(T0);
        let effects = state.pause(T0 + 5_000);

        assert_eq!(effects, vec![Effect::StopTicker]);
        assert!(!state.is_running());
        assert!(state.tick(T0 + 6_000).is_empty());
    }

    #[test]
    fn rest_complete_fires_once_on_crossing() {
        let mut state = originator();
        state.start(T0);
        assert_eq!(state.rest_secs(), 60);

        let mut fired_at = Vec::new();
        for second in 1..=70u64 {
            let effects = state.tick(T0 + second * 1_000);
            if effects.contains(&Effect::Emit(SessionEvent::RestComplete)) {
                fired_at.push(state.set_elapsed());
            }
        }
        assert_eq!(fired_at, vec![60]);
    }

    #[test]
    fn heartbeat_snapshot_every_three_ticks() {
        let mut state = originator();
        state.start(T0);

        let mut snapshot_ticks = Vec::new();
        for second in 1..=9u64 {
            let effects = state.tick(T0 + second * 1_000);
            if !sent(&effects).is_empty() {
                snapshot_ticks.push(second);
            }
        }
        assert_eq!(snapshot_ticks, vec![3, 6, 9]);
        assert_eq!(state.workout_elapsed_ms(), 9_000);
    }

    // ===========================================
    // Logging
    // ===========================================

    #[test]
    fn log_set_grows_sparse_log_with_zeros() {
        let mut state = originator();
        state.next_set();
        state.next_set();
        let effects = state.log_set(6, 140.0, T0);

        assert_eq!(state.logged_reps(0), &[0, 0, 6]);
        assert_eq!(state.logged_weights(0), &[0.0, 0.0, 140.0]);
        assert!(matches!(sent(&effects)[..], [Message::Snapshot(_)]));
    }

    #[test]
    fn log_set_overwrites_existing_entry() {
        let mut state = originator();
        state.log_set(8, 135.0, T0);
        state.log_set(7, 135.0, T0);
        assert_eq!(state.logged_reps(0), &[7]);
    }

    #[test]
    fn log_set_is_noop_while_applying_remote() {
        let mut state = originator();
        state.applying_remote = true;
        let effects = state.log_set(8, 135.0, T0);
        state.applying_remote = false;

        assert!(effects.is_empty());
        assert!(state.logged_reps(0).is_empty());
    }

    // ===========================================
    // Navigation
    // ===========================================

    #[test]
    fn next_set_within_exercise() {
        let mut state = originator();
        state.start(T0);
        state.tick(T0 + 1_000);

        let (outcome, effects) = state.next_set();

        assert_eq!(outcome, AdvanceOutcome::AdvancedSet);
        assert_eq!(state.current_set(), 2);
        assert_eq!(state.rest_secs(), 60);
        assert_eq!(state.set_elapsed(), 0);
        assert_eq!(sent_actions(&effects), vec![ActionKind::NextSet]);
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::ScheduleSnapshot { .. })));
    }

    #[test]
    fn next_set_on_last_set_moves_to_next_exercise() {
        let mut state = originator();
        state.next_set();
        state.next_set();
        assert_eq!(state.rest_secs(), 90);
        state.update_reps(3);

        let (outcome, effects) = state.next_set();

        assert_eq!(outcome, AdvanceOutcome::AdvancedExercise);
        assert_eq!(state.exercise_index(), 1);
        assert_eq!(state.current_set(), 1);
        assert_eq!(state.rest_secs(), 45);
        assert_eq!(state.reps_input(), 10);
        assert_eq!(state.weight_input(), 95.0);
        assert_eq!(sent_actions(&effects), vec![ActionKind::NextExercise]);
    }

    #[test]
    fn next_set_at_end_is_idempotent() {
        let mut state = originator();
        for _ in 0..4 {
            state.next_set();
        }
        assert_eq!((state.exercise_index(), state.current_set()), (1, 2));
        let before = state.clone();

        for _ in 0..3 {
            let (outcome, effects) = state.next_set();
            assert_eq!(outcome, AdvanceOutcome::ReachedEnd);
            assert!(effects.is_empty());
            assert_eq!(state, before);
        }
    }

    #[test]
    fn prev_set_floors_at_one() {
        let mut state = originator();
        assert!(state.prev_set().is_empty());

        state.next_set();
        let effects = state.prev_set();
        assert_eq!(state.current_set(), 1);
        assert_eq!(sent_actions(&effects), vec![ActionKind::PreviousSet]);
    }

    #[test]
    fn exercise_navigation_is_bounded() {
        let mut state = originator();
        assert!(state.prev_exercise().is_empty());

        assert_eq!(
            sent_actions(&state.next_exercise()),
            vec![ActionKind::NextExercise]
        );
        assert!(state.next_exercise().is_empty());
        assert_eq!(state.exercise_index(), 1);

        state.prev_exercise();
        assert_eq!(state.exercise_index(), 0);
        assert_eq!(state.current_set(), 1);
        assert_eq!(state.reps_input(), 8);
    }

    #[test]
    fn moving_exercise_prefills_inputs_from_plan() {
        let plan = WorkoutPlan::new(
            "Mixed",
            vec![
                ExercisePlan::new("Deadlift", 1, 5).with_weight(315.0),
                ExercisePlan::new("Pull-up", 3, 12),
            ],
        );
        let (mut state, _) = SessionState::originate(plan, Tuning::default()).unwrap();
        state.update_reps(3);
        state.update_weight(300.0);

        state.next_exercise();
        assert_eq!((state.reps_input(), state.weight_input()), (12, 0.0));

        state.prev_exercise();
        assert_eq!((state.reps_input(), state.weight_input()), (5, 315.0));
    }

    #[test]
    fn unchanged_input_sends_nothing() {
        let mut state = originator();
        assert!(state.update_reps(8).is_empty());
        assert!(state.update_weight(135.0).is_empty());

        let effects = state.update_weight(140.0);
        assert_eq!(
            sent_actions(&effects),
            vec![ActionKind::UpdateWeight { weight: 140.0 }]
        );
    }

    // ===========================================
    // Termination
    // ===========================================

    #[test]
    fn complete_workout_computes_start_from_elapsed() {
        let mut state = originator();
        state.start(T0);
        state.log_set(8, 135.0, T0 + 30_000);
        state.tick(T0 + 60_000);

        let record = state.complete_workout(T0 + 90_000);
        assert_eq!(record.end_time, T0 + 90_000);
        assert_eq!(record.start_time, T0);
        assert_eq!(record.entries.len(), 2);
        assert_eq!(record.entries[0].reps, vec![8]);
        assert!(record.entries[1].reps.is_empty());
        assert!(state.terminal().is_none());
    }

    #[test]
    fn originator_end_persists_then_tells_peer() {
        let mut state = originator();
        state.start(T0);
        let (record, effects) = state.end_session(T0 + 10_000);

        assert!(record.is_some());
        assert_eq!(effects[0], Effect::StopTicker);
        assert!(matches!(effects[1], Effect::Persist(_)));
        assert_eq!(sent_actions(&effects), vec![ActionKind::EndSession]);
        assert!(!sent(&effects)
            .iter()
            .any(|m| matches!(m, Message::CompletedSession(_))));
        assert_eq!(state.terminal(), Some(Terminal::CompletedLocally));
        assert!(!state.is_running());
    }

    #[test]
    fn companion_end_sends_only_end_action() {
        let origin = originator();
        let mut companion = SessionState::from_start(
            StartSession {
                session_id: origin.session_id(),
                plan: origin.plan().clone(),
            },
            Tuning::default(),
        )
        .unwrap();
        companion.start(T0);

        let (record, effects) = companion.end_session(T0 + 10_000);

        assert!(record.is_none());
        assert!(!effects.iter().any(|e| matches!(e, Effect::Persist(_))));
        let messages = sent(&effects);
        assert_eq!(messages.len(), 1);
        assert!(matches!(
            messages[0],
            Message::Action(ActionMessage {
                action: ActionKind::EndSession,
                ..
            })
        ));
    }

    #[test]
    fn transmit_policy_sends_completed_session() {
        let tuning = Tuning {
            transmit_completed_session: true,
            ..Tuning::default()
        };
        let (mut state, _) = SessionState::originate(squat_row_plan(), tuning).unwrap();
        let (_, effects) = state.end_session(T0);

        let messages = sent(&effects);
        assert!(matches!(messages[0], Message::CompletedSession(_)));
        assert!(matches!(messages[1], Message::Action(_)));
    }

    #[test]
    fn cancel_is_durable_and_absorbing() {
        let mut state = originator();
        state.start(T0);
        let effects = state.cancel_session();

        assert_eq!(effects[0], Effect::StopTicker);
        assert!(matches!(
            effects[1],
            Effect::Send {
                delivery: Delivery::Durable,
                ..
            }
        ));
        assert_eq!(state.terminal(), Some(Terminal::CanceledLocally));

        assert!(state.cancel_session().is_empty());
        assert_eq!(state.end_session(T0).0, None);
        assert_eq!(state.next_set().0, AdvanceOutcome::ReachedEnd);
        assert!(state.start(T0).is_empty());
        assert!(state.tick(T0 + 1_000).is_empty());
    }

    // ===========================================
    // Heart-rate auto-advance
    // ===========================================

    #[test]
    fn recovery_advances_like_manual_next_set() {
        let mut auto = originator();
        auto.start(T0);
        let mut manual = auto.clone();

        let mut result = None;
        for bpm in [90.0, 90.0, 92.0, 110.0, 140.0, 150.0, 120.0] {
            result = auto.observe_heart_rate(bpm);
        }
        let (outcome, effects) = result.unwrap();
        let (manual_outcome, manual_effects) = manual.next_set();

        assert_eq!(outcome, manual_outcome);
        assert_eq!(auto.current_set(), manual.current_set());
        assert_eq!(auto.rest_secs(), manual.rest_secs());
        assert_eq!(sent(&effects), sent(&manual_effects));
        assert!(effects.contains(&Effect::Emit(SessionEvent::AutoAdvanced {
            outcome: AdvanceOutcome::AdvancedSet
        })));
    }

    #[test]
    fn heart_rate_ignored_while_paused() {
        let mut state = originator();
        for bpm in [90.0, 90.0, 92.0, 110.0, 140.0, 150.0, 100.0] {
            assert!(state.observe_heart_rate(bpm).is_none());
        }
        assert_eq!(state.view().heart_rate, Some(100.0));
        assert_eq!(state.current_set(), 1);
    }

    // ===========================================
    // Snapshot
    // ===========================================

    #[test]
    fn snapshot_reflects_current_exercise() {
        let mut state = originator();
        state.start(T0);
        state.log_set(8, 135.0, T0 + 1_000);
        state.next_set();
        state.update_reps(6);

        let snapshot = state.snapshot(T0 + 2_000);
        let ex = &snapshot.current_exercise;
        assert_eq!(snapshot.session_id, state.session_id());
        assert_eq!(snapshot.workout_start_time, Some(T0));
        assert_eq!(snapshot.timestamp, T0 + 2_000);
        assert_eq!(ex.name, "Squat");
        assert_eq!(ex.current_set, 2);
        assert_eq!(ex.total_sets, 3);
        assert_eq!(ex.current_reps, 6);
        assert_eq!(ex.rest_time, 60);
        assert_eq!(ex.completed_reps, vec![8]);
    }
}

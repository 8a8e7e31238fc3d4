//! Applying messages received from the peer.
//!
//! Actions replay the same local operation the peer performed. Snapshots
//! overwrite the local view of the current exercise (last writer wins) and
//! are how the two devices converge after a lost Action. Nothing applied
//! here is ever sent back: `applying_remote` is held for the whole call, and
//! every outbound effect is filtered while it is set.

use liftsync_types::{ActionKind, ActionMessage, CompletedSession, Message, Snapshot, StartSession};

use crate::effect::{Cue, Effect, SessionEvent};
use crate::error::SessionError;
use crate::state::{SessionState, Terminal};
use crate::timer::Alignment;

impl SessionState {
    /// Apply one message from the peer.
    ///
    /// On error the session is unchanged. Terminal sessions ignore
    /// everything except a CompletedSession record for this session.
    pub fn apply(&mut self, message: &Message, now_ms: u64) -> Result<Vec<Effect>, SessionError> {
        if self.terminal.is_some() {
            return Ok(match message {
                Message::CompletedSession(record) => self.accept_record(record),
                _ => Vec::new(),
            });
        }

        self.applying_remote = true;
        let result = match message {
            Message::StartSession(start) => self.apply_start(start),
            Message::Action(action) => self.apply_action(action, now_ms),
            Message::Snapshot(snapshot) => self.apply_snapshot(snapshot, now_ms),
            Message::CompletedSession(record) => Ok(self.accept_record(record)),
        };
        self.applying_remote = false;
        result
    }

    fn apply_start(&self, start: &StartSession) -> Result<Vec<Effect>, SessionError> {
        // durable delivery may repeat the start we already hold
        if start.session_id == self.session_id {
            Ok(Vec::new())
        } else {
            Err(SessionError::ForeignSession(start.session_id))
        }
    }

    fn apply_action(
        &mut self,
        message: &ActionMessage,
        now_ms: u64,
    ) -> Result<Vec<Effect>, SessionError> {
        if message.session_id != self.session_id {
            return Err(SessionError::StaleSession {
                expected: self.session_id,
                received: message.session_id,
            });
        }

        let before = (self.exercise_index, self.current_set);
        let mut effects = match message.action {
            ActionKind::NextSet => self.next_set().1,
            ActionKind::PreviousSet => self.prev_set(),
            ActionKind::NextExercise => self.next_exercise(),
            ActionKind::PreviousExercise => self.prev_exercise(),
            // input edits happen mid-rest; the set timer keeps running
            ActionKind::UpdateReps { reps } => return Ok(self.update_reps(reps)),
            ActionKind::UpdateWeight { weight } => return Ok(self.update_weight(weight)),
            ActionKind::TimerStarted => {
                let mut effects = self.start(now_ms);
                self.set_elapsed = 0;
                if !effects.is_empty() {
                    effects.push(Effect::Haptic(Cue::Start));
                }
                return Ok(effects);
            }
            ActionKind::EndSession => {
                return Ok(self.finish_remotely(Terminal::EndedRemotely, now_ms))
            }
            ActionKind::CancelSession => {
                return Ok(self.finish_remotely(Terminal::CanceledRemotely, now_ms))
            }
        };

        let after = (self.exercise_index, self.current_set);
        if after > before {
            effects.push(Effect::Haptic(Cue::Advance));
        } else if after < before {
            effects.push(Effect::Haptic(Cue::Back));
        }
        Ok(effects)
    }

    fn finish_remotely(&mut self, terminal: Terminal, now_ms: u64) -> Vec<Effect> {
        let mut effects = vec![Effect::StopTicker];
        self.clock.tick(now_ms);
        let record = (terminal == Terminal::EndedRemotely && self.is_originator)
            .then(|| self.complete_workout(now_ms));

        self.clock.halt();
        self.clock.reset();
        self.set_elapsed = 0;
        self.terminal = Some(terminal);

        let saved = record.is_some();
        if let Some(record) = record {
            effects.push(Effect::Persist(record));
        }
        effects.push(Effect::Haptic(Cue::Stop));
        effects.push(Effect::Emit(SessionEvent::Dismissed { terminal, saved }));
        effects
    }

    /// Overwrite the current exercise from a peer snapshot.
    ///
    /// The exercise is resolved by name before anything changes, so an
    /// unknown name leaves the session untouched.
    pub(crate) fn apply_snapshot(
        &mut self,
        snapshot: &Snapshot,
        now_ms: u64,
    ) -> Result<Vec<Effect>, SessionError> {
        let remote = &snapshot.current_exercise;
        let index = self
            .plan
            .position_of(&remote.name)
            .ok_or_else(|| SessionError::UnknownExercise {
                name: remote.name.clone(),
            })?;

        let mut effects = Vec::new();
        if snapshot.session_id != self.session_id {
            self.session_id = snapshot.session_id;
            self.is_originator = false;
            self.clock.reset();
            self.set_elapsed = 0;
            self.recovery.reset();
            let count = self.plan.exercise_count();
            self.logged_reps = vec![Vec::new(); count];
            self.logged_weights = vec![Vec::new(); count];
            if self.clock.is_running() {
                effects.push(Effect::StartTicker);
            }
            effects.push(Effect::Emit(SessionEvent::SessionReset {
                session_id: snapshot.session_id,
            }));
        }

        if let Some(remote_start) = snapshot.workout_start_time {
            let alignment =
                self.clock
                    .adopt_start(remote_start, self.tuning.start_time_tolerance_ms, now_ms);
            if alignment == Alignment::Realigned && !effects.contains(&Effect::StartTicker) {
                effects.push(Effect::StartTicker);
            }
        }

        self.exercise_index = index;
        self.current_set = remote.current_set.max(1);
        self.reps_input = remote.current_reps;
        self.weight_input = remote.current_weight;
        self.rest_secs = self.current_exercise().rest_for_set(self.current_set);
        self.set_elapsed = remote.elapsed_time;
        self.logged_reps[index] = remote.completed_reps.clone();
        self.logged_weights[index] = remote.completed_weights.clone();
        Ok(effects)
    }

    fn accept_record(&self, record: &CompletedSession) -> Vec<Effect> {
        if record.session_id == self.session_id {
            vec![Effect::Persist(record.clone())]
        } else {
            Vec::new()
        }
    }
}

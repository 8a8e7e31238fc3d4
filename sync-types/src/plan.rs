//! Workout plan - the read-only input a session executes.
//!
//! Plans are owned by the persistence layer. A session receives one
//! at creation (locally, or inside a StartSession message) and never
//! mutates it.

use serde::{Deserialize, Serialize};

use crate::{ExerciseId, PlanId, WireError};

/// Rest duration used when a plan has no per-set rest list, or the list
/// does not cover the requested set.
pub const DEFAULT_REST_SECS: u32 = 90;

/// An ordered list of exercises.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutPlan {
    /// Stable identity in the plan store
    pub id: PlanId,
    /// Display name
    pub name: String,
    /// Exercises in execution order
    pub exercises: Vec<ExercisePlan>,
}

/// One exercise entry in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExercisePlan {
    /// Stable identity
    pub id: ExerciseId,
    /// Display name, also the key used to match exercises across devices
    pub name: String,
    /// Number of sets (>= 1)
    pub target_sets: u32,
    /// Reps per set
    pub target_reps: u32,
    /// Working weight, if the exercise is weighted
    pub target_weight: Option<f64>,
    /// Rest after each set, index-aligned with sets
    pub rest_times: Option<Vec<u32>>,
}

impl ExercisePlan {
    /// Create an exercise with no target weight and no rest list.
    pub fn new(name: &str, target_sets: u32, target_reps: u32) -> Self {
        Self {
            id: ExerciseId::new(),
            name: name.to_string(),
            target_sets,
            target_reps,
            target_weight: None,
            rest_times: None,
        }
    }

    /// Set the target weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.target_weight = Some(weight);
        self
    }

    /// Set the per-set rest list.
    pub fn with_rest_times(mut self, rest_times: Vec<u32>) -> Self {
        self.rest_times = Some(rest_times);
        self
    }

    /// Rest duration for a 1-based set number.
    ///
    /// Falls back to [`DEFAULT_REST_SECS`] when the rest list is absent or
    /// too short, or when `set` is 0.
    pub fn rest_for_set(&self, set: u32) -> u32 {
        let Some(index) = (set as usize).checked_sub(1) else {
            return DEFAULT_REST_SECS;
        };
        self.rest_times
            .as_ref()
            .and_then(|times| times.get(index).copied())
            .unwrap_or(DEFAULT_REST_SECS)
    }

    /// Weight to pre-fill the input with (0 for bodyweight exercises).
    pub fn default_weight(&self) -> f64 {
        self.target_weight.unwrap_or(0.0)
    }
}

impl WorkoutPlan {
    /// Create a plan with a fresh id.
    pub fn new(name: &str, exercises: Vec<ExercisePlan>) -> Self {
        Self {
            id: PlanId::new(),
            name: name.to_string(),
            exercises,
        }
    }

    /// Check the structural invariants a session relies on.
    pub fn validate(&self) -> Result<(), WireError> {
        if self.exercises.is_empty() {
            return Err(WireError::InvalidPlan(format!(
                "plan '{}' has no exercises",
                self.name
            )));
        }
        if let Some(bad) = self.exercises.iter().find(|e| e.target_sets == 0) {
            return Err(WireError::InvalidPlan(format!(
                "exercise '{}' has zero target sets",
                bad.name
            )));
        }
        Ok(())
    }

    /// Number of exercises.
    pub fn exercise_count(&self) -> usize {
        self.exercises.len()
    }

    /// Exercise at a position, if any.
    pub fn exercise(&self, index: usize) -> Option<&ExercisePlan> {
        self.exercises.get(index)
    }

    /// Position of the first exercise with the given name.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.exercises.iter().position(|e| e.name == name)
    }
}

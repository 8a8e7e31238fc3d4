//! Check a plan file.

use anyhow::Result;
use liftsync_types::WorkoutPlan;
use std::fmt::Write;
use std::path::Path;

/// Run the validate-plan command.
pub async fn run(file: &Path) -> Result<()> {
    let plan = super::load_plan(file).await?;
    print!("{}", describe(&plan));
    println!();
    println!("Plan OK.");
    Ok(())
}

/// Human-readable outline of a plan.
pub fn describe(plan: &WorkoutPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {} ===", plan.name);
    let _ = writeln!(out, "  ID: {}", plan.id);
    let _ = writeln!(out, "  Exercises: {}", plan.exercise_count());

    for (i, exercise) in plan.exercises.iter().enumerate() {
        let weight = match exercise.target_weight {
            Some(w) => format!(" @ {w}"),
            None => String::new(),
        };
        let rests: Vec<String> = (1..=exercise.target_sets)
            .map(|set| format!("{}s", exercise.rest_for_set(set)))
            .collect();
        let _ = writeln!(
            out,
            "  [{}] {}: {} x {}{} (rest {})",
            i + 1,
            exercise.name,
            exercise.target_sets,
            exercise.target_reps,
            weight,
            rests.join(", ")
        );
    }
    out
}

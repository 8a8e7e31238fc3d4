//! Simulate a workout between two in-process devices.
//!
//! The originator runs through every set of the plan while the companion
//! follows over an in-memory link. Both devices keep a file store under the
//! data directory, so the finished record can be inspected afterwards with
//! `liftsync history`.

use anyhow::{Context, Result};
use liftsync_client::{
    spawn_device, DeviceConfig, DeviceEvent, DeviceEvents, DeviceHandle, DeviceSetup,
    MemoryChannel, SessionStore,
};
use liftsync_core::{AdvanceOutcome, SessionEvent, SessionView};
use liftsync_types::{CompletedSession, DeviceRole, SessionId, WorkoutPlan};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// How long to wait for the companion to catch up before reporting it out of sync.
const MIRROR_DEADLINE: Duration = Duration::from_secs(3);

/// Options for the simulate command.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// Plan file.
    pub plan: PathBuf,
    /// Optional device configuration file.
    pub config: Option<PathBuf>,
    /// Device that starts and ends the session.
    pub originator: DeviceRole,
    /// Take the link down after this many logged sets.
    pub offline_after: Option<u32>,
    /// Pause between scripted actions.
    pub step: Duration,
}

/// Outcome of one simulated workout.
#[derive(Debug)]
pub struct Report {
    pub session_id: SessionId,
    pub originator: DeviceRole,
    pub sets_logged: u32,
    pub went_offline: bool,
    /// Companion position when the originator finished, if it matched.
    pub mirrored: Option<SessionView>,
    pub companion_dismissed: bool,
    pub companion_cues: usize,
    pub record: Option<CompletedSession>,
    pub saved_to: PathBuf,
}

/// Run the simulate command.
pub async fn run(data_dir: &Path, options: &SimulateOptions) -> Result<()> {
    let plan = super::load_plan(&options.plan).await?;
    let config = match &options.config {
        Some(path) => DeviceConfig::from_file(path)?,
        None => DeviceConfig::default(),
    };

    let report = simulate(data_dir, plan, config, options).await?;
    print_report(&report);
    Ok(())
}

/// Drive a full session and collect what each side saw.
pub async fn simulate(
    data_dir: &Path,
    plan: WorkoutPlan,
    config: DeviceConfig,
    options: &SimulateOptions,
) -> Result<Report> {
    let leader_role = options.originator;
    let follower_role = leader_role.peer();
    let settle = options.step.max(config.tuning().post_action_snapshot * 2);

    let leader_store = Arc::new(super::device_store(data_dir, leader_role).await?);
    let follower_store = Arc::new(super::device_store(data_dir, follower_role).await?);
    leader_store.save_plan(&plan).await?;
    follower_store.save_plan(&plan).await?;

    let (leader_link, follower_link) = MemoryChannel::pair();
    let (leader, mut leader_events) = spawn_device(
        DeviceSetup::new(leader_role, Arc::new(leader_link.clone()), leader_store.clone())
            .with_config(config.clone()),
    );
    let (follower, mut follower_events) = spawn_device(
        DeviceSetup::new(follower_role, Arc::new(follower_link), follower_store)
            .with_config(config),
    );

    let session_id = leader.start_workout(plan.id).await?;
    info!("{} started session {}", leader_role, session_id);
    leader.start().await?;
    tokio::time::sleep(options.step).await;

    let mut sets_logged = 0;
    let mut went_offline = false;
    loop {
        let view = leader.view().await?.context("Session vanished mid-workout")?;
        let exercise = plan
            .exercise(view.exercise_index)
            .context("Session points past the end of the plan")?;

        leader
            .log_set(exercise.target_reps, exercise.default_weight())
            .await?;
        sets_logged += 1;
        info!(
            "Logged {} set {} ({} reps)",
            exercise.name, view.current_set, exercise.target_reps
        );

        if options.offline_after == Some(sets_logged) {
            info!("Link down after {} sets", sets_logged);
            leader_link.set_reachable(false);
            went_offline = true;
        }

        let outcome = leader.next_set().await?;
        tokio::time::sleep(options.step).await;
        if outcome == AdvanceOutcome::ReachedEnd {
            break;
        }
    }

    if went_offline {
        tokio::time::sleep(settle).await;
        info!("Link restored");
        leader_link.set_reachable(true);
    }

    let mirrored = wait_for_mirror(&leader, &follower, settle).await?;

    let record = leader.end_session().await?;
    tokio::time::sleep(settle).await;

    let (companion_dismissed, companion_cues) = drain_companion(&mut follower_events);
    while let Ok(event) = leader_events.try_recv() {
        if let DeviceEvent::Saved(saved) = event {
            info!("{} saved session {}", leader_role, saved.session_id);
        }
    }

    leader.shutdown().await?;
    follower.shutdown().await?;

    Ok(Report {
        session_id,
        originator: leader_role,
        sets_logged,
        went_offline,
        mirrored,
        companion_dismissed,
        companion_cues,
        record,
        saved_to: leader_store.data_dir().join("sessions"),
    })
}

/// Poll both devices until the companion shows the originator's position.
async fn wait_for_mirror(
    leader: &DeviceHandle,
    follower: &DeviceHandle,
    poll: Duration,
) -> Result<Option<SessionView>> {
    let deadline = tokio::time::Instant::now() + MIRROR_DEADLINE;
    loop {
        let expected = leader.view().await?.context("Session vanished before the end")?;
        if let Some(seen) = follower.view().await? {
            if seen.session_id == expected.session_id
                && seen.exercise_index == expected.exercise_index
                && seen.current_set == expected.current_set
            {
                return Ok(Some(seen));
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(poll).await;
    }
}

fn drain_companion(events: &mut DeviceEvents) -> (bool, usize) {
    let mut dismissed = false;
    let mut cues = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            DeviceEvent::Haptic(_) => cues += 1,
            DeviceEvent::Session(SessionEvent::Dismissed { .. }) => dismissed = true,
            _ => {}
        }
    }
    (dismissed, cues)
}

fn print_report(report: &Report) {
    println!("=== liftsync simulate ===");
    println!();
    println!("Session:");
    println!("  ID:         {}", report.session_id);
    println!("  Originator: {}", report.originator);
    println!("  Sets:       {} logged", report.sets_logged);
    if report.went_offline {
        println!("  Link:       dropped mid-workout, restored before ending");
    }
    println!();

    println!("Companion ({}):", report.originator.peer());
    match &report.mirrored {
        Some(view) => println!(
            "  Position:   in sync ({} set {}/{})",
            view.exercise_name, view.current_set, view.total_sets
        ),
        None => println!("  Position:   OUT OF SYNC"),
    }
    println!(
        "  Dismissed:  {}",
        if report.companion_dismissed { "yes" } else { "no" }
    );
    println!("  Cues:       {}", report.companion_cues);
    println!();

    match &report.record {
        Some(record) => {
            println!("Record:");
            for entry in &record.entries {
                let reps: Vec<String> = entry.reps.iter().map(u32::to_string).collect();
                println!("  {}: {} reps", entry.name, reps.join(", "));
            }
            println!("  Total reps: {}", record.total_reps());
            println!("  Duration:   {}s", record.duration_secs());
            println!();
            println!("Saved to: {}", report.saved_to.display());
        }
        None => println!("Record: NOT SAVED"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liftsync_client::FileStore;
    use liftsync_types::ExercisePlan;
    use tempfile::tempdir;

    fn plan() -> WorkoutPlan {
        WorkoutPlan::new(
            "Pull & Squat",
            vec![
                ExercisePlan::new("Squat", 3, 8)
                    .with_weight(135.0)
                    .with_rest_times(vec![60, 60, 90]),
                ExercisePlan::new("Row", 2, 10).with_weight(95.0),
            ],
        )
    }

    fn options(originator: DeviceRole, offline_after: Option<u32>) -> SimulateOptions {
        SimulateOptions {
            plan: PathBuf::from("unused.json"),
            config: None,
            originator,
            offline_after,
            step: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn watch_led_workout_is_saved_on_the_watch() {
        let dir = tempdir().unwrap();
        let report = simulate(
            dir.path(),
            plan(),
            DeviceConfig::default(),
            &options(DeviceRole::Watch, None),
        )
        .await
        .unwrap();

        assert_eq!(report.sets_logged, 5);
        assert!(report.mirrored.is_some());
        assert!(report.companion_dismissed);

        let record = report.record.unwrap();
        assert_eq!(record.session_id, report.session_id);
        assert_eq!(record.entries[0].reps, vec![8, 8, 8]);
        assert_eq!(record.entries[1].reps, vec![10, 10]);
        assert_eq!(record.total_reps(), 44);

        let watch = FileStore::open(dir.path().join("watch")).await.unwrap();
        assert_eq!(watch.completed_sessions().await.unwrap(), vec![record]);
        let phone = FileStore::open(dir.path().join("phone")).await.unwrap();
        assert!(phone.completed_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn companion_catches_up_after_link_drop() {
        let dir = tempdir().unwrap();
        let report = simulate(
            dir.path(),
            plan(),
            DeviceConfig::default(),
            &options(DeviceRole::Phone, Some(2)),
        )
        .await
        .unwrap();

        assert!(report.went_offline);
        let seen = report.mirrored.expect("companion should catch up");
        assert_eq!(seen.exercise_name, "Row");
        assert_eq!(seen.current_set, 2);
        assert!(report.companion_dismissed);
        assert!(report.saved_to.starts_with(dir.path().join("phone")));
    }

    #[tokio::test]
    async fn run_reads_plan_and_config_files() {
        let dir = tempdir().unwrap();
        let plan_path = dir.path().join("plan.json");
        std::fs::write(&plan_path, serde_json::to_string(&plan()).unwrap()).unwrap();
        let config_path = dir.path().join("liftsync.toml");
        std::fs::write(&config_path, "[timing]\npost_action_snapshot_ms = 20\n").unwrap();

        let options = SimulateOptions {
            plan: plan_path,
            config: Some(config_path),
            ..options(DeviceRole::Watch, None)
        };
        run(&dir.path().join("data"), &options).await.unwrap();

        let watch = FileStore::open(dir.path().join("data").join("watch"))
            .await
            .unwrap();
        assert_eq!(watch.completed_sessions().await.unwrap().len(), 1);
    }
}

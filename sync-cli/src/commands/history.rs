//! List finished sessions.

use anyhow::Result;
use liftsync_types::{CompletedSession, DeviceRole};
use std::path::Path;

/// Run the history command.
pub async fn run(data_dir: &Path, device: DeviceRole) -> Result<()> {
    let store = super::device_store(data_dir, device).await?;
    let sessions = sorted(store.completed_sessions().await?);

    println!("=== {} history ===", device);
    println!();

    if sessions.is_empty() {
        println!("No finished sessions.");
        println!();
        println!("Run 'liftsync simulate --plan <file>' to record one.");
        return Ok(());
    }

    for record in &sessions {
        println!(
            "{}  {} exercises, {} reps, {}s",
            record.session_id,
            record.entries.len(),
            record.total_reps(),
            record.duration_secs()
        );
    }
    Ok(())
}

/// Oldest first.
fn sorted(mut sessions: Vec<CompletedSession>) -> Vec<CompletedSession> {
    sessions.sort_by_key(|record| record.start_time);
    sessions
}

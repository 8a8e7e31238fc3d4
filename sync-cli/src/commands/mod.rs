//! CLI command implementations.

pub mod history;
pub mod simulate;
pub mod validate;

use anyhow::{Context, Result};
use liftsync_client::FileStore;
use liftsync_types::{DeviceRole, WorkoutPlan};
use std::path::Path;

/// Read a plan file and check it can drive a session.
pub async fn load_plan(path: &Path) -> Result<WorkoutPlan> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read plan file {}", path.display()))?;
    let plan: WorkoutPlan = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse plan file {}", path.display()))?;
    plan.validate()
        .with_context(|| format!("Plan file {} is not usable", path.display()))?;
    Ok(plan)
}

/// Open the store a simulated device keeps under the data directory.
pub async fn device_store(data_dir: &Path, role: DeviceRole) -> Result<FileStore> {
    let dir = data_dir.join(role.to_string());
    FileStore::open(dir)
        .await
        .with_context(|| format!("Failed to open {} store", role))
}

//! Persistence for plans, finished sessions and the offline snapshot cache.
//!
//! The session core never touches storage. It emits `Effect::Persist` and
//! the device driver calls into a [`SessionStore`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use liftsync_types::{CompletedSession, PlanId, Snapshot, WorkoutPlan};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No plan with this id.
    #[error("plan not found: {0}")]
    PlanNotFound(PlanId),

    /// Filesystem error.
    #[error("store I/O failed for {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Stored data could not be encoded or decoded.
    #[error("store encoding failed for {path}: {source}")]
    Encoding {
        /// File involved.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

/// Storage used by a device.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up a plan by id.
    async fn load_plan(&self, id: PlanId) -> Result<WorkoutPlan, StoreError>;

    /// Store a plan so it can be started or restored later.
    async fn save_plan(&self, plan: &WorkoutPlan) -> Result<(), StoreError>;

    /// Persist a finished session. Saving the same session twice replaces it.
    async fn save_completed_session(&self, record: &CompletedSession) -> Result<(), StoreError>;

    /// The most recent snapshot sent by this device, if any.
    async fn load_cached_snapshot(&self) -> Result<Option<Snapshot>, StoreError>;

    /// Replace the cached snapshot.
    async fn save_cached_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Forget the cached snapshot once its session has ended.
    async fn clear_cached_snapshot(&self) -> Result<(), StoreError>;
}

// ===========================================
// MemoryStore
// ===========================================

/// Store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    plans: HashMap<PlanId, WorkoutPlan>,
    completed: Vec<CompletedSession>,
    snapshot: Option<Snapshot>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding one plan.
    pub fn with_plan(plan: WorkoutPlan) -> Self {
        let store = Self::default();
        store.lock().plans.insert(plan.id, plan);
        store
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every finished session saved so far.
    pub fn completed_sessions(&self) -> Vec<CompletedSession> {
        self.lock().completed.clone()
    }

    /// The cached snapshot, without going through the async trait.
    pub fn cached_snapshot(&self) -> Option<Snapshot> {
        self.lock().snapshot.clone()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn load_plan(&self, id: PlanId) -> Result<WorkoutPlan, StoreError> {
        self.lock()
            .plans
            .get(&id)
            .cloned()
            .ok_or(StoreError::PlanNotFound(id))
    }

    async fn save_plan(&self, plan: &WorkoutPlan) -> Result<(), StoreError> {
        self.lock().plans.insert(plan.id, plan.clone());
        Ok(())
    }

    async fn save_completed_session(&self, record: &CompletedSession) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.completed.retain(|r| r.session_id != record.session_id);
        inner.completed.push(record.clone());
        Ok(())
    }

    async fn load_cached_snapshot(&self) -> Result<Option<Snapshot>, StoreError> {
        Ok(self.lock().snapshot.clone())
    }

    async fn save_cached_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.lock().snapshot = Some(snapshot.clone());
        Ok(())
    }

    async fn clear_cached_snapshot(&self) -> Result<(), StoreError> {
        self.lock().snapshot = None;
        Ok(())
    }
}

// ===========================================
// FileStore
// ===========================================

/// Store writing JSON files under a data directory.
///
/// Layout:
/// ```text
/// <data_dir>/plans/<plan-id>.json
/// <data_dir>/sessions/<session-id>.json
/// <data_dir>/snapshot.json
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    /// Use `data_dir`, creating the directory layout if needed.
    pub async fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        for dir in [data_dir.join("plans"), data_dir.join("sessions")] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|source| StoreError::Io {
                    path: dir.clone(),
                    source,
                })?;
        }
        Ok(Self { data_dir })
    }

    /// Root of the store.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn plan_path(&self, id: PlanId) -> PathBuf {
        self.data_dir.join("plans").join(format!("{id}.json"))
    }

    fn session_path(&self, record: &CompletedSession) -> PathBuf {
        self.data_dir
            .join("sessions")
            .join(format!("{}.json", record.session_id))
    }

    fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("snapshot.json")
    }

    /// Load every finished session on disk.
    pub async fn completed_sessions(&self) -> Result<Vec<CompletedSession>, StoreError> {
        let dir = self.data_dir.join("sessions");
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?
        {
            records.push(read_json(&entry.path()).await?);
        }
        Ok(records)
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&contents).map_err(|source| StoreError::Encoding {
        path: path.to_path_buf(),
        source,
    })
}

async fn write_json<T: Serialize + Sync>(path: &Path, value: &T) -> Result<(), StoreError> {
    let contents = serde_json::to_string_pretty(value).map_err(|source| StoreError::Encoding {
        path: path.to_path_buf(),
        source,
    })?;
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[async_trait]
impl SessionStore for FileStore {
    async fn load_plan(&self, id: PlanId) -> Result<WorkoutPlan, StoreError> {
        let path = self.plan_path(id);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StoreError::PlanNotFound(id));
        }
        read_json(&path).await
    }

    async fn save_plan(&self, plan: &WorkoutPlan) -> Result<(), StoreError> {
        write_json(&self.plan_path(plan.id), plan).await
    }

    async fn save_completed_session(&self, record: &CompletedSession) -> Result<(), StoreError> {
        write_json(&self.session_path(record), record).await
    }

    async fn load_cached_snapshot(&self) -> Result<Option<Snapshot>, StoreError> {
        let path = self.snapshot_path();
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }
        read_json(&path).await.map(Some)
    }

    async fn save_cached_snapshot(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        write_json(&self.snapshot_path(), snapshot).await
    }

    async fn clear_cached_snapshot(&self) -> Result<(), StoreError> {
        let path = self.snapshot_path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

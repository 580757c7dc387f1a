//! Deployment state persistence
//!
//! One [`DeploymentRecord`] per project+environment, stored under
//! `.gpufleet/state/<project>-<environment>.json`. Every transition
//! overwrites the whole record (temp file + rename); there is no patching.

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = "state";
const LOCK_FILE: &str = "lock.json";

/// Lifecycle of one project+environment deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    NotDeployed,
    Deployed,
    Failed,
    PartialDeploy,
    RolledBack,
    RollbackFailed,
    Destroyed,
}

impl DeploymentState {
    /// States from which a fresh apply may start
    pub fn is_idle(&self) -> bool {
        matches!(
            self,
            DeploymentState::NotDeployed | DeploymentState::RolledBack | DeploymentState::Destroyed
        )
    }

    /// States a rollback may be invoked from
    pub fn can_roll_back(&self) -> bool {
        matches!(
            self,
            DeploymentState::Deployed | DeploymentState::PartialDeploy | DeploymentState::Failed
        )
    }

    /// Forward transitions allowed for the persisted value
    pub fn can_transition_to(&self, next: DeploymentState) -> bool {
        use DeploymentState::*;
        match self {
            NotDeployed | RolledBack | Destroyed => {
                matches!(next, Deployed | Failed | PartialDeploy | Destroyed)
            }
            Deployed | Failed | PartialDeploy => matches!(
                next,
                Deployed | Failed | PartialDeploy | RolledBack | RollbackFailed | Destroyed
            ),
            RollbackFailed => matches!(next, RolledBack | RollbackFailed | Destroyed),
        }
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentState::NotDeployed => write!(f, "not-deployed"),
            DeploymentState::Deployed => write!(f, "deployed"),
            DeploymentState::Failed => write!(f, "failed"),
            DeploymentState::PartialDeploy => write!(f, "partial-deploy"),
            DeploymentState::RolledBack => write!(f, "rolled-back"),
            DeploymentState::RollbackFailed => write!(f, "rollback-failed"),
            DeploymentState::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// The single persisted value for a project+environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// State file version
    pub version: u32,

    pub project: String,

    pub environment: String,

    pub state: DeploymentState,

    /// Free-form note about the last transition (failure category, zone...)
    pub detail: Option<String>,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,
}

impl DeploymentRecord {
    pub fn new(
        project: impl Into<String>,
        environment: impl Into<String>,
        state: DeploymentState,
    ) -> Self {
        Self {
            version: STATE_VERSION,
            project: project.into(),
            environment: environment.into(),
            state,
            detail: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Injected persistence for deployment state (get/set, nothing else)
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, project: &str, environment: &str) -> Result<Option<DeploymentRecord>>;

    async fn set(&self, record: &DeploymentRecord) -> Result<()>;
}

/// File-backed state store
pub struct FileStateStore {
    /// `.gpufleet` directory of the project
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    fn state_path(&self, project: &str, environment: &str) -> PathBuf {
        self.state_dir()
            .join(format!("{}-{}.json", project, environment))
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Acquire a lock for exclusive access to this project's state
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        fs::create_dir_all(&self.root).await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            // Locks older than an hour belong to a crashed run
            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(CloudError::LockError(format!(
                    "State is locked by {} (pid {}) since {}",
                    lock_info.holder, lock_info.pid, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, project: &str, environment: &str) -> Result<Option<DeploymentRecord>> {
        let path = self.state_path(project, environment);
        if !path.exists() {
            tracing::debug!("State file not found for {}-{}", project, environment);
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let record: DeploymentRecord = serde_json::from_str(&content)?;

        if record.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                record.version, STATE_VERSION
            )));
        }

        Ok(Some(record))
    }

    async fn set(&self, record: &DeploymentRecord) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path(&record.project, &record.environment);
        let tmp = path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(record)?;
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;

        tracing::debug!(
            project = %record.project,
            environment = %record.environment,
            state = %record.state,
            "Saved deployment state"
        );
        Ok(())
    }
}

/// In-memory state store
#[derive(Default)]
pub struct MemoryStateStore {
    records: Mutex<HashMap<(String, String), DeploymentRecord>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, project: &str, environment: &str) -> Result<Option<DeploymentRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|e| CloudError::StateError(e.to_string()))?;
        Ok(records
            .get(&(project.to_string(), environment.to_string()))
            .cloned())
    }

    async fn set(&self, record: &DeploymentRecord) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| CloudError::StateError(e.to_string()))?;
        records.insert(
            (record.project.clone(), record.environment.clone()),
            record.clone(),
        );
        Ok(())
    }
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

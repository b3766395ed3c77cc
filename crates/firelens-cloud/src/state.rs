//! State management for synthesized stacks
//!
//! Manages the `.firelens/state.json` file which records the resources of
//! every stack as of its last synthesis, so `plan` can show what changed.

use crate::error::{CloudError, Result};
use crate::resource::{RemovalPolicy, Resource};
use crate::stack::Stack;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".firelens";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const STATE_TEMP: &str = "state.json.tmp";
const LOCK_FILE: &str = "lock.json";

/// Locks older than this are treated as abandoned
pub const LOCK_TTL_HOURS: i64 = 1;

/// Global state containing all recorded stacks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Stacks indexed by stack name
    pub stacks: HashMap<String, StackState>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            stacks: HashMap::new(),
        }
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current resources of a stack
    ///
    /// Creation timestamps of resources that were already recorded are kept.
    pub fn record(&mut self, stack: &Stack) {
        let mut next = StackState::from_stack(stack);
        if let Some(previous) = self.stacks.get(stack.name()) {
            for (id, resource) in next.resources.iter_mut() {
                if let Some(old) = previous.resources.get(id) {
                    resource.created_at = old.created_at;
                    if !old.changed_fields_state(resource).is_empty() {
                        continue;
                    }
                    resource.updated_at = old.updated_at;
                }
            }
        }
        self.stacks.insert(stack.name().to_string(), next);
        self.updated_at = Utc::now();
    }

    pub fn get_stack(&self, name: &str) -> Option<&StackState> {
        self.stacks.get(name)
    }

    /// Remove a stack
    pub fn remove_stack(&mut self, name: &str) -> Option<StackState> {
        let result = self.stacks.remove(name);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }
}

/// Recorded resources of one stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackState {
    /// When the stack was last synthesized
    pub synthesized_at: DateTime<Utc>,

    /// Resources indexed by logical id
    pub resources: BTreeMap<String, ResourceState>,
}

impl StackState {
    pub fn from_stack(stack: &Stack) -> Self {
        Self {
            synthesized_at: Utc::now(),
            resources: stack
                .resources()
                .iter()
                .map(|r| (r.logical_id.clone(), ResourceState::from_resource(r)))
                .collect(),
        }
    }
}

/// State of a single resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type
    pub resource_type: String,

    /// Path of the construct that declared it
    pub construct_path: String,

    /// Declared properties
    pub properties: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removal_policy: Option<RemovalPolicy>,

    /// When the resource was first recorded
    pub created_at: DateTime<Utc>,

    /// Last time its declaration changed
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn from_resource(resource: &Resource) -> Self {
        let now = Utc::now();
        Self {
            resource_type: resource.resource_type.clone(),
            construct_path: resource.construct_path.clone(),
            properties: resource.properties.clone(),
            depends_on: resource.depends_on.clone(),
            removal_policy: resource.removal_policy,
            created_at: now,
            updated_at: now,
        }
    }

    /// Names of the fields that differ from `resource`
    ///
    /// Properties are compared key by key; the other entries use their
    /// template names (`Type`, `DependsOn`, `DeletionPolicy`).
    pub fn changed_fields(&self, resource: &Resource) -> Vec<String> {
        self.changed_fields_state(&ResourceState::from_resource(resource))
    }

    fn changed_fields_state(&self, other: &ResourceState) -> Vec<String> {
        let mut changed = Vec::new();

        if self.resource_type != other.resource_type {
            changed.push("Type".to_string());
        }

        let mut keys: Vec<&String> = self.properties.keys().collect();
        keys.extend(other.properties.keys());
        keys.sort();
        keys.dedup();
        for key in keys {
            if self.properties.get(key) != other.properties.get(key) {
                changed.push(key.clone());
            }
        }

        if self.depends_on != other.depends_on {
            changed.push("DependsOn".to_string());
        }
        if self.removal_policy != other.removal_policy {
            changed.push("DeletionPolicy".to_string());
        }

        changed
    }

    /// Whether removing this resource destroys stored data
    pub fn holds_data(&self) -> bool {
        matches!(
            self.resource_type.as_str(),
            "AWS::S3::Bucket" | "AWS::Logs::LogGroup" | "AWS::Logs::LogStream"
        )
    }

    /// CloudFormation deletes resources without a policy too
    pub fn is_destroyed_on_removal(&self) -> bool {
        !matches!(self.removal_policy, Some(RemovalPolicy::Retain))
    }
}

/// State manager for reading/writing state files
pub struct StateManager {
    /// Project root directory
    project_root: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    /// Get the state directory path
    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    /// Get the state file path
    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    fn temp_path(&self) -> PathBuf {
        self.state_dir().join(STATE_TEMP)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        fs::create_dir_all(self.state_dir()).await?;
        Ok(())
    }

    /// Load the recorded state; a missing file is an empty state
    pub async fn load(&self) -> Result<GlobalState> {
        let path = self.state_path();
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No recorded state");
                return Ok(GlobalState::new());
            }
            Err(e) => return Err(e.into()),
        };

        let state: GlobalState = serde_json::from_str(&content).map_err(|e| {
            CloudError::StateError(format!("{} is not a valid state file: {}", path.display(), e))
        })?;
        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!(stacks = state.stacks.len(), "Loaded state");
        Ok(state)
    }

    /// Write the state through a temporary file; the previous state is
    /// copied to the backup first
    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let temp = self.temp_path();
        fs::write(&temp, serde_json::to_string_pretty(state)?).await?;

        if fs::try_exists(&path).await? {
            fs::copy(&path, self.backup_path()).await?;
        }
        fs::rename(&temp, &path).await?;

        tracing::debug!(stacks = state.stacks.len(), "Saved state");
        Ok(())
    }

    /// Take the lock file for exclusive access to the state
    ///
    /// The lock file is created with `create_new`, so two processes can never
    /// both hold it. A lock older than [`LOCK_TTL_HOURS`] is replaced.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();
        let content = serde_json::to_string_pretty(&LockInfo::current())?;

        match create_lock_file(&lock_path, &content).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let held = LockInfo::read(&lock_path).await?;
                if !held.is_stale(Utc::now()) {
                    return Err(CloudError::LockError(format!(
                        "State is locked by {} since {}",
                        held.holder, held.acquired_at
                    )));
                }

                tracing::warn!(holder = %held.holder, "Replacing stale state lock");
                fs::remove_file(&lock_path).await?;
                create_lock_file(&lock_path, &content)
                    .await
                    .map_err(|e| match e.kind() {
                        ErrorKind::AlreadyExists => CloudError::LockError(
                            "State lock was taken while replacing a stale lock".to_string(),
                        ),
                        _ => e.into(),
                    })?;
            }
            Err(e) => return Err(e.into()),
        }

        tracing::debug!(path = %lock_path.display(), "Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

async fn create_lock_file(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await
}

/// Contents of the lock file
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

impl LockInfo {
    fn current() -> Self {
        Self {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        }
    }

    async fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        serde_json::from_str(&content).map_err(|e| {
            CloudError::LockError(format!(
                "{} is not a valid lock file ({}); remove it if no synth is running",
                path.display(),
                e
            ))
        })
    }

    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.acquired_at) >= Duration::hours(LOCK_TTL_HOURS)
    }
}

/// Held state lock; the file is removed on release or drop
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.lock_path).await {
            Ok(()) => {
                tracing::debug!("Released state lock");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample_stack(bucket_name: &str) -> Stack {
        let mut stack = Stack::new("acme-FirelensStack");
        stack
            .add_resource(
                Resource::new("LogBucket", "AWS::S3::Bucket")
                    .property("BucketName", json!(bucket_name))
                    .removal_policy(RemovalPolicy::Destroy),
            )
            .unwrap();
        stack
    }

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = GlobalState::new();
        state.record(&sample_stack("acme-log-bucket"));
        manager.save(&state).await.unwrap();

        let loaded = manager.load().await.unwrap();
        let stack = loaded.get_stack("acme-FirelensStack").unwrap();
        let bucket = &stack.resources["LogBucket"];
        assert_eq!(bucket.resource_type, "AWS::S3::Bucket");
        assert_eq!(bucket.removal_policy, Some(RemovalPolicy::Destroy));
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let state = manager.load().await.unwrap();
        assert!(state.stacks.is_empty());
    }

    #[tokio::test]
    async fn test_save_keeps_backup() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let state = GlobalState::new();
        manager.save(&state).await.unwrap();
        manager.save(&state).await.unwrap();

        assert!(temp_dir.path().join(".firelens/state.json").exists());
        assert!(temp_dir.path().join(".firelens/state.json.backup").exists());
        assert!(!temp_dir.path().join(".firelens/state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_newer_version_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = GlobalState::new();
        state.version = STATE_VERSION + 1;
        manager.save(&state).await.unwrap();

        assert!(matches!(
            manager.load().await,
            Err(CloudError::StateError(_))
        ));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let lock = manager.acquire_lock().await.unwrap();
        assert!(matches!(
            manager.acquire_lock().await,
            Err(CloudError::LockError(_))
        ));

        lock.release().await.unwrap();
        let again = manager.acquire_lock().await.unwrap();
        again.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_acquire_has_one_winner() {
        let temp_dir = tempdir().unwrap();
        let first = StateManager::new(temp_dir.path());
        let second = StateManager::new(temp_dir.path());

        let (a, b) = tokio::join!(first.acquire_lock(), second.acquire_lock());
        assert!(a.is_ok() != b.is_ok());
    }

    #[tokio::test]
    async fn test_stale_lock_is_replaced() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        let lock_path = temp_dir.path().join(".firelens/lock.json");

        std::fs::create_dir_all(lock_path.parent().unwrap()).unwrap();
        let stale = LockInfo {
            holder: "old-host".to_string(),
            acquired_at: Utc::now() - Duration::hours(LOCK_TTL_HOURS + 1),
        };
        std::fs::write(&lock_path, serde_json::to_string(&stale).unwrap()).unwrap();

        let lock = manager.acquire_lock().await.unwrap();
        let held: LockInfo =
            serde_json::from_str(&std::fs::read_to_string(&lock_path).unwrap()).unwrap();
        assert_ne!(held.holder, "old-host");

        lock.release().await.unwrap();
        assert!(!lock_path.exists());
    }

    #[tokio::test]
    async fn test_lock_released_on_drop() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        drop(manager.acquire_lock().await.unwrap());
        assert!(!temp_dir.path().join(".firelens/lock.json").exists());
    }

    #[tokio::test]
    async fn test_corrupt_state_is_reported() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        std::fs::create_dir_all(temp_dir.path().join(".firelens")).unwrap();
        std::fs::write(manager.state_path(), "{ not json").unwrap();

        assert!(matches!(
            manager.load().await,
            Err(CloudError::StateError(_))
        ));
    }

    #[test]
    fn test_record_keeps_created_at() {
        let mut state = GlobalState::new();
        state.record(&sample_stack("acme-log-bucket"));
        let first = state.get_stack("acme-FirelensStack").unwrap().resources["LogBucket"]
            .created_at;

        state.record(&sample_stack("acme-logs"));
        let bucket = &state.get_stack("acme-FirelensStack").unwrap().resources["LogBucket"];
        assert_eq!(bucket.created_at, first);
        assert_eq!(bucket.properties["BucketName"], json!("acme-logs"));
    }

    #[test]
    fn test_changed_fields() {
        let recorded = ResourceState::from_resource(
            &Resource::new("LogBucket", "AWS::S3::Bucket").property("BucketName", json!("a")),
        );
        let desired = Resource::new("LogBucket", "AWS::S3::Bucket")
            .property("BucketName", json!("b"))
            .property("Tags", json!([]))
            .removal_policy(RemovalPolicy::Retain);

        assert_eq!(
            recorded.changed_fields(&desired),
            vec!["BucketName", "Tags", "DeletionPolicy"]
        );
    }
}

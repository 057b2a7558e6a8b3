//! JSON file storage implementation.
//!
//! Stores one graph document per job in a `.culprit` style directory and keeps
//! small per-job meta markers (version + updated_at).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use async_trait::async_trait;
use culprit_core::{Action, GraphExtension, JobId, TaskGraph};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;
use super::{GraphStore, Result, StoreError};

/// File-based JSON graph store.
pub struct JsonStore {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl JsonStore {
    /// Create storage. This will create the `jobs/` and `meta/` subdirectories.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("jobs")).await?;
        fs::create_dir_all(root.join("meta")).await?;

        Ok(Self {
            root,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn job_path(&self, job: JobId) -> PathBuf {
        self.root.join("jobs").join(format!("{}.json", job))
    }

    fn meta_path(&self, job: JobId) -> PathBuf {
        self.root.join("meta").join(format!("{}.meta.json", job))
    }

    /// Read and increment the per-job version, return the new version.
    async fn bump_version(&self, job: JobId) -> Result<u64> {
        let path = self.meta_path(job);
        let mut version = 0u64;
        if let Ok(s) = fs::read_to_string(&path).await {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&s) {
                if let Some(v) = json.get("version").and_then(|v| v.as_u64()) {
                    version = v;
                }
            }
        }
        version += 1;
        let meta = serde_json::json!({"version": version, "updated_at": chrono::Utc::now()});
        write_atomic(&path, serde_json::to_string_pretty(&meta)?.as_bytes()).await?;
        Ok(version)
    }

    async fn save(&self, job: JobId, graph: &TaskGraph) -> Result<()> {
        let json = serde_json::to_string_pretty(graph)?;
        write_atomic(&self.job_path(job), json.as_bytes()).await?;
        let version = self.bump_version(job).await?;
        debug!("Saved job {} (version {})", job, version);
        Ok(())
    }
}

#[async_trait]
impl GraphStore for JsonStore {
    async fn populate(&self, job: JobId, extension: GraphExtension) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if fs::try_exists(self.job_path(job)).await? {
            return Err(StoreError::AlreadyExists(job));
        }
        let graph = TaskGraph::from_extension(extension)?;
        self.save(job, &graph).await
    }

    async fn load(&self, job: JobId) -> Result<TaskGraph> {
        read_json(&self.job_path(job))
            .await?
            .ok_or(StoreError::NotFound(job))
    }

    async fn apply(&self, job: JobId, action: Action) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut graph: TaskGraph = read_json(&self.job_path(job))
            .await?
            .ok_or(StoreError::NotFound(job))?;
        graph.apply(action)?;
        self.save(job, &graph).await
    }

    async fn list_jobs(&self) -> Result<Vec<JobId>> {
        let mut jobs = Vec::new();
        let mut rd = fs::read_dir(self.root.join("jobs")).await?;
        while let Some(entry) = rd.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Some(job) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<JobId>().ok())
            {
                jobs.push(job);
            }
        }
        jobs.sort();
        Ok(jobs)
    }
}

/// Write through a temporary sibling file and rename over the target.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

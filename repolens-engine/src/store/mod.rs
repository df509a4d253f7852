//! Record store backends
//!
//! Persists analysis records, file-tree artifacts and per-file parsed
//! structures. The SQLite backend is the production store; the in-memory
//! backend mirrors the contract for tests.

use repolens_core::{
    async_trait, not_found_error, AnalysisRecord, AnalysisStatus, ErrorContext, FileTreeArtifact,
    ParsedFile, RepolensError, RepolensResult,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

pub mod sqlite;

pub use sqlite::SqliteRecordStore;

/// One page of an analysis listing
#[derive(Debug, Clone)]
pub struct AnalysisPage {
    pub records: Vec<AnalysisRecord>,
    pub total: u64,
}

/// Persistence contract for analysis records and their artifacts
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a queued record; fails on duplicate id.
    async fn create(&self, record: &AnalysisRecord) -> RepolensResult<()>;

    /// Load a record by id.
    async fn find_by_id(&self, id: &str) -> RepolensResult<Option<AnalysisRecord>>;

    /// Atomic status transition along the lifecycle DAG.
    ///
    /// Stamps `started_at` on first entry to processing and `completed_at`
    /// on entry to completed or failed; `error` is stored iff the new
    /// status is failed.
    async fn update_status(
        &self,
        id: &str,
        status: AnalysisStatus,
        error: Option<&str>,
    ) -> RepolensResult<()>;

    async fn update_commit_sha(&self, id: &str, sha: &str) -> RepolensResult<()>;

    /// Paginated listing, newest first, ties broken by id descending.
    async fn list(
        &self,
        limit: u32,
        offset: u32,
        status: Option<AnalysisStatus>,
    ) -> RepolensResult<AnalysisPage>;

    /// Delete a record and all dependent rows.
    async fn delete(&self, id: &str) -> RepolensResult<()>;

    async fn save_file_tree(&self, id: &str, artifact: &FileTreeArtifact) -> RepolensResult<()>;

    async fn load_file_tree(&self, id: &str) -> RepolensResult<Option<FileTreeArtifact>>;

    /// Batched insert, idempotent on `(analysis_id, file_path)`.
    async fn save_parsed_files(&self, id: &str, files: &[ParsedFile]) -> RepolensResult<()>;

    async fn load_parsed_files(&self, id: &str) -> RepolensResult<Vec<ParsedFile>>;

    /// All records currently in the given status (startup recovery).
    async fn find_by_status(&self, status: AnalysisStatus) -> RepolensResult<Vec<AnalysisRecord>>;

    /// Health check for the storage backend.
    async fn health_check(&self) -> RepolensResult<()>;
}

/// Validate and apply a status transition to a loaded record.
///
/// Shared by both backends so the DAG is enforced identically.
pub(crate) fn apply_status_transition(
    record: &mut AnalysisRecord,
    status: AnalysisStatus,
    error: Option<&str>,
) -> RepolensResult<()> {
    if !record.status.can_transition_to(status) {
        return Err(RepolensError::Conflict {
            message: format!(
                "Invalid status transition {} -> {} for analysis {}",
                record.status.as_str(),
                status.as_str(),
                record.id
            ),
            context: ErrorContext::new("record_store").with_operation("update_status"),
        });
    }

    let now = chrono::Utc::now();
    if status == AnalysisStatus::Processing && record.started_at.is_none() {
        record.started_at = Some(now);
    }
    if matches!(status, AnalysisStatus::Completed | AnalysisStatus::Failed) {
        record.completed_at = Some(now);
    }
    record.error = if status == AnalysisStatus::Failed {
        error.map(|e| e.to_string())
    } else {
        None
    };
    record.status = status;
    Ok(())
}

/// In-memory record store (tests and ephemeral deployments)
pub struct MemoryRecordStore {
    records: Arc<RwLock<HashMap<String, AnalysisRecord>>>,
    trees: Arc<RwLock<HashMap<String, FileTreeArtifact>>>,
    parsed: Arc<RwLock<HashMap<String, Vec<ParsedFile>>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            trees: Arc::new(RwLock::new(HashMap::new())),
            parsed: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, record: &AnalysisRecord) -> RepolensResult<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(RepolensError::Conflict {
                message: format!("Analysis {} already exists", record.id),
                context: ErrorContext::new("memory_store").with_operation("create"),
            });
        }
        records.insert(record.id.clone(), record.clone());
        debug!("Saved analysis {} to memory store", record.id);
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> RepolensResult<Option<AnalysisRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn update_status(
        &self,
        id: &str,
        status: AnalysisStatus,
        error: Option<&str>,
    ) -> RepolensResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| not_found_error!(format!("analysis {}", id), "memory_store"))?;
        apply_status_transition(record, status, error)
    }

    async fn update_commit_sha(&self, id: &str, sha: &str) -> RepolensResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| not_found_error!(format!("analysis {}", id), "memory_store"))?;
        record.commit_sha = Some(sha.to_string());
        Ok(())
    }

    async fn list(
        &self,
        limit: u32,
        offset: u32,
        status: Option<AnalysisStatus>,
    ) -> RepolensResult<AnalysisPage> {
        let records = self.records.read().await;
        let mut matching: Vec<AnalysisRecord> = records
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok(AnalysisPage {
            records: page,
            total,
        })
    }

    async fn delete(&self, id: &str) -> RepolensResult<()> {
        let mut records = self.records.write().await;
        if records.remove(id).is_none() {
            return Err(not_found_error!(format!("analysis {}", id), "memory_store"));
        }
        self.trees.write().await.remove(id);
        self.parsed.write().await.remove(id);
        debug!("Deleted analysis {} from memory store", id);
        Ok(())
    }

    async fn save_file_tree(&self, id: &str, artifact: &FileTreeArtifact) -> RepolensResult<()> {
        self.trees
            .write()
            .await
            .insert(id.to_string(), artifact.clone());
        Ok(())
    }

    async fn load_file_tree(&self, id: &str) -> RepolensResult<Option<FileTreeArtifact>> {
        Ok(self.trees.read().await.get(id).cloned())
    }

    async fn save_parsed_files(&self, id: &str, files: &[ParsedFile]) -> RepolensResult<()> {
        let mut parsed = self.parsed.write().await;
        let existing = parsed.entry(id.to_string()).or_default();
        for file in files {
            if !existing.iter().any(|f| f.path == file.path) {
                existing.push(file.clone());
            }
        }
        Ok(())
    }

    async fn load_parsed_files(&self, id: &str) -> RepolensResult<Vec<ParsedFile>> {
        Ok(self.parsed.read().await.get(id).cloned().unwrap_or_default())
    }

    async fn find_by_status(&self, status: AnalysisStatus) -> RepolensResult<Vec<AnalysisRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> RepolensResult<()> {
        Ok(())
    }
}

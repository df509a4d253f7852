//! Analysis service facade
//!
//! Single entry point for the HTTP surface: intake, status, artifacts,
//! listing, deletion, startup recovery and shutdown. Construction order
//! mirrors the component dependency order; teardown is the reverse.

use crate::queue::{AnalysisJob, JobProgressEvent, JobQueue, QueueConfig};
use crate::store::{AnalysisPage, RecordStore};
use crate::worker::AnalysisProcessor;
use repolens_core::{
    not_found_error, AnalysisOptions, AnalysisRecord, AnalysisStatus, FileTreeArtifact, ParsedFile,
    ProgressRecord, RepolensConfig, RepolensResult,
};
use repolens_fetcher::{validate_url, RepositoryFetcher};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Duration;
use tracing::{info, warn};

/// Health snapshot of the service dependencies
#[derive(Debug, Clone, Copy)]
pub struct ServiceHealth {
    pub database: bool,
    pub queue: bool,
}

impl ServiceHealth {
    pub fn all_up(&self) -> bool {
        self.database && self.queue
    }
}

/// The analysis application service
pub struct AnalysisService {
    store: Arc<dyn RecordStore>,
    fetcher: Arc<dyn RepositoryFetcher>,
    queue: Arc<JobQueue>,
    config: RepolensConfig,
}

impl AnalysisService {
    /// Wire the worker pipeline onto the queue and start it.
    pub fn new(
        config: RepolensConfig,
        store: Arc<dyn RecordStore>,
        fetcher: Arc<dyn RepositoryFetcher>,
    ) -> Arc<Self> {
        let processor = Arc::new(AnalysisProcessor::new(
            store.clone(),
            fetcher.clone(),
            &config,
        ));
        let queue_config = QueueConfig {
            concurrency: config.queue_concurrency,
            ..Default::default()
        };
        let queue = JobQueue::start(processor, queue_config);

        Arc::new(Self {
            store,
            fetcher,
            queue,
            config,
        })
    }

    /// Intake: validate, resolve the branch, persist a queued record and
    /// enqueue the job.
    pub async fn submit(
        &self,
        repository_url: &str,
        branch: Option<String>,
        options: Option<AnalysisOptions>,
    ) -> RepolensResult<AnalysisRecord> {
        let repo = validate_url(repository_url)?;

        let options = options.unwrap_or_else(|| AnalysisOptions {
            include_tests: self.config.include_tests,
            max_file_size_kb: self.config.max_file_size_kb,
            ..Default::default()
        });
        options.validate()?;

        // The record never carries an empty branch: missing branches are
        // resolved against the remote default at intake
        let branch = match branch.filter(|b| !b.trim().is_empty()) {
            Some(branch) => branch,
            None => {
                self.fetcher
                    .fetch_metadata(&repo.owner, &repo.name)
                    .await?
                    .default_branch
            }
        };

        let record = AnalysisRecord::new(
            repo.normalized_url,
            repo.owner,
            repo.name,
            branch,
            options,
        );

        self.store.create(&record).await?;
        self.queue
            .enqueue(AnalysisJob {
                analysis_id: record.id.clone(),
            })
            .await?;

        info!(
            analysis_id = %record.id,
            repository = %record.repository_url,
            branch = %record.branch,
            "Analysis queued"
        );
        Ok(record)
    }

    /// Record plus live queue progress, if the job is still known.
    pub async fn status(
        &self,
        id: &str,
    ) -> RepolensResult<(AnalysisRecord, Option<ProgressRecord>)> {
        let record = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found_error!(format!("analysis {}", id), "analysis_service"))?;
        let progress = self.queue.status(id).await.map(|s| s.progress);
        Ok((record, progress))
    }

    /// The completed file-tree artifact.
    pub async fn file_tree(&self, id: &str) -> RepolensResult<FileTreeArtifact> {
        let record = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found_error!(format!("analysis {}", id), "analysis_service"))?;

        self.store
            .load_file_tree(&record.id)
            .await?
            .ok_or_else(|| not_found_error!(format!("file tree for analysis {}", id), "analysis_service"))
    }

    pub async fn parsed_files(&self, id: &str) -> RepolensResult<Vec<ParsedFile>> {
        self.store.load_parsed_files(id).await
    }

    pub async fn list(
        &self,
        limit: u32,
        offset: u32,
        status: Option<AnalysisStatus>,
    ) -> RepolensResult<AnalysisPage> {
        self.store.list(limit, offset, status).await
    }

    /// Delete a record and its artifacts; a queued job is cancelled first.
    pub async fn delete(&self, id: &str) -> RepolensResult<()> {
        if let Err(e) = self.queue.cancel(id).await {
            // In-flight or unknown jobs are fine; the record goes away and
            // the worker's next store access fails the job
            warn!(analysis_id = %id, error = %e, "Job not cancellable during delete");
        }
        self.store.delete(id).await
    }

    /// Re-enqueue work that was interrupted by a restart.
    pub async fn recover(&self) -> RepolensResult<usize> {
        let mut recovered = 0;
        for status in [AnalysisStatus::Queued, AnalysisStatus::Processing] {
            for record in self.store.find_by_status(status).await? {
                match self
                    .queue
                    .enqueue(AnalysisJob {
                        analysis_id: record.id.clone(),
                    })
                    .await
                {
                    Ok(()) => recovered += 1,
                    Err(e) => {
                        warn!(analysis_id = %record.id, error = %e, "Failed to re-enqueue record")
                    }
                }
            }
        }
        if recovered > 0 {
            info!(count = recovered, "Recovered interrupted analyses");
        }
        Ok(recovered)
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.queue.subscribe()
    }

    pub async fn health(&self) -> ServiceHealth {
        ServiceHealth {
            database: self.store.health_check().await.is_ok(),
            queue: self.queue.is_running(),
        }
    }

    pub fn config(&self) -> &RepolensConfig {
        &self.config
    }

    /// Drain the queue; called during graceful shutdown.
    pub async fn shutdown(&self, timeout: Duration) {
        self.queue.drain(timeout).await;
    }
}

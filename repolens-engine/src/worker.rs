//! Pipeline worker
//!
//! Drives one analysis through the fixed pipeline: fetch metadata, clone,
//! build the tree, compute statistics, parse sources, persist. The working
//! copy is reclaimed on every exit path before the record reaches a
//! terminal status.

use crate::queue::{AnalysisJob, JobProcessor, ProgressHandle};
use crate::store::RecordStore;
use repolens_analyze::{build_tree, compute_statistics, parse_source, select_files_to_parse, WalkerOptions};
use repolens_core::{
    async_trait, not_found_error, process_concurrently, with_timeout, AnalysisRecord, AnalysisStatus,
    ErrorContext, FileTreeArtifact, ParsedFile, RepolensConfig, RepolensError, RepolensResult,
};
use repolens_fetcher::{RepositoryFetcher, WorkingCopy};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// The fixed pipeline steps with their entry percentages
pub const PIPELINE_STEPS: &[(&str, u8)] = &[
    ("Fetching repository metadata", 10),
    ("Cloning repository", 20),
    ("Building file tree", 40),
    ("Calculating metrics", 50),
    ("Parsing files", 65),
    ("Saving parsed data", 85),
];

const STEP_COMPLETE: (&str, u8) = ("Analysis complete", 100);

/// Bounded fan-out for the parse stage
const PARSE_CONCURRENCY: usize = 8;

/// Executes analysis jobs against the store and the fetcher
pub struct AnalysisProcessor {
    store: Arc<dyn RecordStore>,
    fetcher: Arc<dyn RepositoryFetcher>,
    max_repo_size_mb: u64,
    job_timeout_ms: u64,
}

impl AnalysisProcessor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        fetcher: Arc<dyn RepositoryFetcher>,
        config: &RepolensConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            max_repo_size_mb: config.max_repo_size_mb,
            job_timeout_ms: config.job_timeout_ms,
        }
    }

    async fn run_pipeline(
        &self,
        record: &AnalysisRecord,
        progress: &ProgressHandle,
        copy_slot: Arc<Mutex<Option<WorkingCopy>>>,
    ) -> RepolensResult<serde_json::Value> {
        progress.set_steps_total(PIPELINE_STEPS.len() as u32).await;

        // Step 1: remote metadata
        let (step, pct) = PIPELINE_STEPS[0];
        progress.report(step, pct).await;
        let metadata = self
            .fetcher
            .fetch_metadata(&record.owner, &record.name)
            .await?;
        if let Some(size_kb) = metadata.size_kb {
            if size_kb > self.max_repo_size_mb * 1024 {
                return Err(RepolensError::Repository {
                    message: format!(
                        "Repository is too large: {} KB exceeds the {} MB limit",
                        size_kb, self.max_repo_size_mb
                    ),
                    source: None,
                    context: ErrorContext::new("worker").with_operation("fetch_metadata"),
                });
            }
        }

        // Step 2: shallow clone
        let (step, pct) = PIPELINE_STEPS[1];
        progress.report(step, pct).await;
        let copy = self
            .fetcher
            .materialize(&record.repository_url, &record.branch)
            .await?;
        let commit_sha = copy.commit_sha.clone();
        let root_path = copy.local_path.clone();
        *copy_slot.lock().await = Some(copy);
        self.store
            .update_commit_sha(&record.id, &commit_sha)
            .await?;

        // Step 3: walk into a tree
        let (step, pct) = PIPELINE_STEPS[2];
        progress.report(step, pct).await;
        let walker_options = WalkerOptions {
            include_tests: record.options.include_tests,
            max_file_size_kb: record.options.max_file_size_kb,
            exclude_patterns: record.options.exclude_patterns.clone().unwrap_or_default(),
        };
        let walk_root = root_path.clone();
        let tree = tokio::task::spawn_blocking(move || build_tree(&walk_root, &walker_options))
            .await
            .map_err(|e| RepolensError::Internal {
                message: format!("Tree walk task failed: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("worker").with_operation("build_tree"),
            })??;

        // Step 4: aggregates
        let (step, pct) = PIPELINE_STEPS[3];
        progress.report(step, pct).await;
        let statistics = compute_statistics(&tree);

        // Step 5: structural extraction with bounded fan-out
        let (step, pct) = PIPELINE_STEPS[4];
        progress.report(step, pct).await;
        let candidates = select_files_to_parse(&tree, record.options.languages.as_deref());
        let candidate_count = candidates.len();

        let base = root_path.clone();
        let results = process_concurrently(candidates, PARSE_CONCURRENCY, move |candidate| {
            let base = base.clone();
            async move {
                tokio::task::spawn_blocking(move || {
                    let absolute = base.join(&candidate.path);
                    match std::fs::read_to_string(&absolute) {
                        Ok(source) => {
                            Ok(parse_source(&candidate.path, &candidate.language, &source))
                        }
                        Err(e) => {
                            warn!(path = %candidate.path, error = %e, "Failed to read file for parsing");
                            Ok(None)
                        }
                    }
                })
                .await
                .map_err(|e| RepolensError::Internal {
                    message: format!("Parse task failed: {}", e),
                    source: Some(Box::new(e)),
                    context: ErrorContext::new("worker").with_operation("parse_files"),
                })?
            }
        })
        .await;

        let mut parsed: Vec<ParsedFile> = Vec::new();
        for result in results {
            match result {
                Ok(Some(file)) => parsed.push(file),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Parse subtask error, file omitted"),
            }
        }

        // Step 6: persist; the tree lands before the terminal transition so
        // a reader observing completed always finds the artifact
        let (step, pct) = PIPELINE_STEPS[5];
        progress.report(step, pct).await;
        let artifact = FileTreeArtifact {
            root: tree,
            statistics: statistics.clone(),
        };
        self.store.save_file_tree(&record.id, &artifact).await?;
        self.store.save_parsed_files(&record.id, &parsed).await?;

        let (step, pct) = STEP_COMPLETE;
        progress.report(step, pct).await;

        info!(
            analysis_id = %record.id,
            total_files = statistics.total_files,
            parsed_files = parsed.len(),
            candidates = candidate_count,
            "Analysis pipeline finished"
        );

        Ok(serde_json::json!({
            "analysisId": record.id,
            "commitSha": commit_sha,
            "totalFiles": statistics.total_files,
            "totalDirectories": statistics.total_directories,
            "parsedFiles": parsed.len(),
        }))
    }
}

#[async_trait]
impl JobProcessor for AnalysisProcessor {
    async fn process(
        &self,
        job: &AnalysisJob,
        progress: ProgressHandle,
    ) -> RepolensResult<serde_json::Value> {
        let record = self
            .store
            .find_by_id(&job.analysis_id)
            .await?
            .ok_or_else(|| not_found_error!(format!("analysis {}", job.analysis_id), "worker"))?;

        self.store
            .update_status(&record.id, AnalysisStatus::Processing, None)
            .await?;

        let attempt = progress.attempt().await;
        info!(
            analysis_id = %record.id,
            repository = %record.repository_url,
            attempt = attempt,
            "Starting analysis pipeline"
        );

        let copy_slot: Arc<Mutex<Option<WorkingCopy>>> = Arc::new(Mutex::new(None));
        let outcome = with_timeout(
            self.run_pipeline(&record, &progress, copy_slot.clone()),
            self.job_timeout_ms,
            "analysis_pipeline",
        )
        .await
        .and_then(|inner| inner);

        // Reclaim the working copy before any terminal transition is
        // observable by clients
        if let Some(copy) = copy_slot.lock().await.take() {
            if let Err(e) = self.fetcher.dispose(&copy).await {
                warn!(
                    analysis_id = %record.id,
                    path = %copy.local_path.display(),
                    error = %e,
                    "Failed to dispose working copy"
                );
            }
        }

        match outcome {
            Ok(value) => {
                self.store
                    .update_status(&record.id, AnalysisStatus::Completed, None)
                    .await?;
                Ok(value)
            }
            Err(e) => {
                // Intermediate attempts keep the record processing; only
                // exhaustion marks it failed with the last message
                if progress.is_final_attempt().await {
                    if let Err(status_err) = self
                        .store
                        .update_status(&record.id, AnalysisStatus::Failed, Some(&e.to_string()))
                        .await
                    {
                        error!(
                            analysis_id = %record.id,
                            error = %status_err,
                            "Failed to record failure status"
                        );
                    }
                }
                // Rethrown so the queue advances the attempt counter
                Err(e)
            }
        }
    }
}

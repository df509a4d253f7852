//! In-process job queue
//!
//! Keyed FIFO of analysis jobs dispatched onto a bounded worker pool, with
//! per-job retry/backoff, retention of finished entries and a progress
//! channel for live subscribers. Durability comes from the record store:
//! records still queued at startup are re-enqueued by the service.

use repolens_core::{
    async_trait, ErrorContext, ProgressRecord, RepolensError, RepolensResult, RetryConfig,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock, Semaphore};
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Payload of one queued analysis
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub analysis_id: String,
}

/// Queue-side lifecycle of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Active,
    /// Waiting out the backoff before the next attempt
    Delayed,
    Completed,
    Failed,
    Cancelled,
}

/// Snapshot returned by [`JobQueue::status`]
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub state: JobState,
    pub attempts: u32,
    pub progress: ProgressRecord,
    pub return_value: Option<serde_json::Value>,
    pub failure_reason: Option<String>,
}

/// Progress event broadcast to subscribers
#[derive(Debug, Clone)]
pub struct JobProgressEvent {
    pub analysis_id: String,
    pub progress: ProgressRecord,
}

/// Work executed for each job attempt
#[async_trait]
pub trait JobProcessor: Send + Sync + 'static {
    async fn process(
        &self,
        job: &AnalysisJob,
        progress: ProgressHandle,
    ) -> RepolensResult<serde_json::Value>;
}

/// Queue tuning
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Jobs processed concurrently
    pub concurrency: usize,
    pub retry: RetryConfig,
    /// Completed entries are kept this long
    pub completed_retention: Duration,
    /// Hard cap on retained completed entries
    pub completed_max: usize,
    /// Failed entries are kept this long
    pub failed_retention: Duration,
    pub sweep_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            retry: RetryConfig::default(),
            completed_retention: Duration::from_secs(60 * 60),
            completed_max: 100,
            failed_retention: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

struct JobEntry {
    job: AnalysisJob,
    state: JobState,
    attempts: u32,
    progress: ProgressRecord,
    return_value: Option<serde_json::Value>,
    failure_reason: Option<String>,
    finished_at: Option<Instant>,
}

impl JobEntry {
    fn new(job: AnalysisJob) -> Self {
        Self {
            job,
            state: JobState::Queued,
            attempts: 0,
            progress: ProgressRecord::default(),
            return_value: None,
            failure_reason: None,
            finished_at: None,
        }
    }
}

type JobMap = Arc<RwLock<HashMap<String, JobEntry>>>;

/// Handle through which a processor reports progress.
///
/// `percentage` is kept monotonic within one attempt; publishing failures
/// are non-fatal.
#[derive(Clone)]
pub struct ProgressHandle {
    job_id: String,
    jobs: JobMap,
    progress_tx: broadcast::Sender<JobProgressEvent>,
    max_attempts: u32,
}

impl ProgressHandle {
    /// The attempt number of the current run (1-based).
    pub async fn attempt(&self) -> u32 {
        self.jobs
            .read()
            .await
            .get(&self.job_id)
            .map(|e| e.attempts)
            .unwrap_or(0)
    }

    /// Whether no further retries will follow the current attempt.
    pub async fn is_final_attempt(&self) -> bool {
        self.attempt().await >= self.max_attempts
    }

    /// Record the total number of pipeline steps for this job.
    pub async fn set_steps_total(&self, steps_total: u32) {
        let mut jobs = self.jobs.write().await;
        if let Some(entry) = jobs.get_mut(&self.job_id) {
            entry.progress.steps_total = steps_total;
        }
    }

    /// Enter a named step at the given percentage.
    pub async fn report(&self, step: &str, percentage: u8) {
        let event = {
            let mut jobs = self.jobs.write().await;
            let Some(entry) = jobs.get_mut(&self.job_id) else {
                return;
            };
            let progress = &mut entry.progress;
            if percentage > progress.percentage {
                progress.percentage = percentage.min(100);
            }
            if progress.current_step != step {
                if !progress.current_step.is_empty() {
                    progress.steps_completed.push(progress.current_step.clone());
                }
                progress.current_step = step.to_string();
            }
            JobProgressEvent {
                analysis_id: self.job_id.clone(),
                progress: progress.clone(),
            }
        };

        if self.progress_tx.send(event).is_err() {
            debug!(job_id = %self.job_id, "No progress subscribers, update kept locally");
        }
    }
}

/// The job queue
pub struct JobQueue {
    jobs: JobMap,
    tx: mpsc::UnboundedSender<String>,
    progress_tx: broadcast::Sender<JobProgressEvent>,
    semaphore: Arc<Semaphore>,
    config: QueueConfig,
    draining: Arc<AtomicBool>,
}

impl JobQueue {
    /// Start the queue: spawns the dispatcher and the retention sweeper.
    pub fn start(processor: Arc<dyn JobProcessor>, config: QueueConfig) -> Arc<Self> {
        let jobs: JobMap = Arc::new(RwLock::new(HashMap::new()));
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let (progress_tx, _) = broadcast::channel(256);
        let semaphore = Arc::new(Semaphore::new(config.concurrency));
        let draining = Arc::new(AtomicBool::new(false));

        let queue = Arc::new(Self {
            jobs: jobs.clone(),
            tx: tx.clone(),
            progress_tx: progress_tx.clone(),
            semaphore: semaphore.clone(),
            config: config.clone(),
            draining: draining.clone(),
        });

        tokio::spawn(dispatcher(
            rx,
            tx,
            jobs.clone(),
            semaphore,
            processor,
            progress_tx,
            config.clone(),
            draining,
        ));
        tokio::spawn(sweeper(jobs, config));

        info!("Job queue started");
        queue
    }

    /// Enqueue a job keyed by its analysis id; duplicates are rejected.
    pub async fn enqueue(&self, job: AnalysisJob) -> RepolensResult<()> {
        if self.draining.load(Ordering::SeqCst) {
            return Err(RepolensError::Queue {
                message: "Queue is draining, not accepting jobs".to_string(),
                context: ErrorContext::new("job_queue").with_operation("enqueue"),
            });
        }

        let job_id = job.analysis_id.clone();
        {
            let mut jobs = self.jobs.write().await;
            if jobs.contains_key(&job_id) {
                return Err(RepolensError::Conflict {
                    message: format!("Job {} is already enqueued", job_id),
                    context: ErrorContext::new("job_queue").with_operation("enqueue"),
                });
            }
            jobs.insert(job_id.clone(), JobEntry::new(job));
        }

        self.tx.send(job_id.clone()).map_err(|_| RepolensError::Queue {
            message: "Queue dispatcher is not running".to_string(),
            context: ErrorContext::new("job_queue").with_operation("enqueue"),
        })?;

        debug!(job_id = %job_id, "Job enqueued");
        Ok(())
    }

    /// Snapshot the state of a job, if known.
    pub async fn status(&self, job_id: &str) -> Option<JobStatus> {
        let jobs = self.jobs.read().await;
        jobs.get(job_id).map(|entry| JobStatus {
            state: entry.state,
            attempts: entry.attempts,
            progress: entry.progress.clone(),
            return_value: entry.return_value.clone(),
            failure_reason: entry.failure_reason.clone(),
        })
    }

    /// Cancel a job that has not started yet.
    pub async fn cancel(&self, job_id: &str) -> RepolensResult<()> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(job_id).ok_or_else(|| RepolensError::NotFound {
            resource: format!("job {}", job_id),
            context: ErrorContext::new("job_queue").with_operation("cancel"),
        })?;

        if entry.state != JobState::Queued {
            return Err(RepolensError::Conflict {
                message: format!("Job {} is already in flight and cannot be cancelled", job_id),
                context: ErrorContext::new("job_queue").with_operation("cancel"),
            });
        }

        entry.state = JobState::Cancelled;
        entry.finished_at = Some(Instant::now());
        info!(job_id = %job_id, "Job cancelled");
        Ok(())
    }

    /// Subscribe to live progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.progress_tx.subscribe()
    }

    /// Whether the queue is accepting and processing jobs.
    pub fn is_running(&self) -> bool {
        !self.draining.load(Ordering::SeqCst)
    }

    /// Close the queue and wait up to `timeout` for in-flight jobs.
    pub async fn drain(&self, timeout: Duration) {
        self.draining.store(true, Ordering::SeqCst);
        info!("Draining job queue");

        let wanted = self.config.concurrency as u32;
        match tokio::time::timeout(timeout, self.semaphore.clone().acquire_many_owned(wanted)).await
        {
            Ok(Ok(_permits)) => info!("Job queue drained"),
            Ok(Err(_)) => warn!("Job queue semaphore closed during drain"),
            Err(_) => warn!("Job queue drain timed out with jobs still in flight"),
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn dispatcher(
    mut rx: mpsc::UnboundedReceiver<String>,
    tx: mpsc::UnboundedSender<String>,
    jobs: JobMap,
    semaphore: Arc<Semaphore>,
    processor: Arc<dyn JobProcessor>,
    progress_tx: broadcast::Sender<JobProgressEvent>,
    config: QueueConfig,
    draining: Arc<AtomicBool>,
) {
    info!("Queue dispatcher started");

    while let Some(job_id) = rx.recv().await {
        if draining.load(Ordering::SeqCst) {
            debug!(job_id = %job_id, "Dispatcher draining, job left queued");
            continue;
        }

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        // Take the job only if it is still waiting; a cancel may have won
        let job = {
            let mut map = jobs.write().await;
            match map.get_mut(&job_id) {
                Some(entry) if entry.state == JobState::Queued => {
                    entry.state = JobState::Active;
                    entry.attempts += 1;
                    // Progress may reset between attempts
                    let steps_total = entry.progress.steps_total;
                    entry.progress = ProgressRecord {
                        steps_total,
                        ..Default::default()
                    };
                    Some(entry.job.clone())
                }
                _ => None,
            }
        };

        let Some(job) = job else {
            drop(permit);
            continue;
        };

        let jobs = jobs.clone();
        let tx = tx.clone();
        let processor = processor.clone();
        let progress_tx = progress_tx.clone();
        let retry = config.retry.clone();
        tokio::spawn(async move {
            let handle = ProgressHandle {
                job_id: job.analysis_id.clone(),
                jobs: jobs.clone(),
                progress_tx,
                max_attempts: retry.max_attempts,
            };

            let result = processor.process(&job, handle).await;

            let mut map = jobs.write().await;
            let Some(entry) = map.get_mut(&job.analysis_id) else {
                drop(permit);
                return;
            };

            match result {
                Ok(value) => {
                    entry.state = JobState::Completed;
                    entry.return_value = Some(value);
                    entry.failure_reason = None;
                    entry.finished_at = Some(Instant::now());
                    info!(job_id = %job.analysis_id, attempts = entry.attempts, "Job completed");
                }
                Err(e) => {
                    entry.failure_reason = Some(e.to_string());
                    if entry.attempts < retry.max_attempts {
                        entry.state = JobState::Delayed;
                        let delay = retry.delay_for(entry.attempts + 1);
                        warn!(
                            job_id = %job.analysis_id,
                            attempt = entry.attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Job attempt failed, scheduling retry"
                        );
                        let jobs = jobs.clone();
                        let job_id = job.analysis_id.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            let mut map = jobs.write().await;
                            if let Some(entry) = map.get_mut(&job_id) {
                                if entry.state == JobState::Delayed {
                                    entry.state = JobState::Queued;
                                    let _ = tx.send(job_id.clone());
                                }
                            }
                        });
                    } else {
                        entry.state = JobState::Failed;
                        entry.finished_at = Some(Instant::now());
                        error!(
                            job_id = %job.analysis_id,
                            attempts = entry.attempts,
                            error = %e,
                            "Job failed after exhausting retries"
                        );
                    }
                }
            }

            drop(permit);
        });
    }

    info!("Queue dispatcher stopped");
}

/// Prunes finished jobs past their retention windows.
async fn sweeper(jobs: JobMap, config: QueueConfig) {
    let mut interval = tokio::time::interval(config.sweep_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let now = Instant::now();
        let mut map = jobs.write().await;

        map.retain(|_, entry| match (entry.state, entry.finished_at) {
            (JobState::Completed | JobState::Cancelled, Some(at)) => {
                now.duration_since(at) < config.completed_retention
            }
            (JobState::Failed, Some(at)) => now.duration_since(at) < config.failed_retention,
            _ => true,
        });

        // Cap retained completed entries, oldest first
        let mut completed: Vec<(String, Instant)> = map
            .iter()
            .filter(|(_, e)| e.state == JobState::Completed)
            .filter_map(|(id, e)| e.finished_at.map(|at| (id.clone(), at)))
            .collect();
        if completed.len() > config.completed_max {
            completed.sort_by_key(|(_, at)| *at);
            let excess = completed.len() - config.completed_max;
            for (id, _) in completed.into_iter().take(excess) {
                map.remove(&id);
            }
        }
    }
}

//! RepoLens Engine - Durable analysis pipeline
//!
//! The record store persists analysis records and their artifacts; the job
//! queue schedules pipeline runs with retries and progress; the worker glues
//! fetcher and analyzer together; the service is the facade the HTTP surface
//! talks to.

pub mod queue;
pub mod service;
pub mod store;
pub mod worker;

pub use queue::{AnalysisJob, JobProcessor, JobProgressEvent, JobQueue, JobState, JobStatus, ProgressHandle, QueueConfig};
pub use service::AnalysisService;
pub use store::{AnalysisPage, MemoryRecordStore, RecordStore, SqliteRecordStore};
pub use worker::AnalysisProcessor;

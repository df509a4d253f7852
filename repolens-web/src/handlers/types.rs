//! Wire types for the API boundary
//!
//! Boundary-specific fields are snake_case; nested objects derived from the
//! internal models keep their camelCase form.

use chrono::{DateTime, Utc};
use repolens_core::{AnalysisOptions, AnalysisRecord, Node, ProgressRecord};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Analysis intake request
#[derive(Debug, Deserialize, ToSchema)]
pub struct AnalyzeRequest {
    #[schema(example = "https://github.com/acme/widgets")]
    pub repository_url: String,
    /// Branch to analyze; the repository default when omitted
    pub branch: Option<String>,
    #[schema(value_type = Object)]
    pub options: Option<AnalysisOptions>,
}

/// Analysis intake response
#[derive(Debug, Serialize, ToSchema)]
pub struct AnalyzeResponse {
    pub analysis_id: String,
    #[schema(example = "queued")]
    pub status: String,
    pub created_at: DateTime<Utc>,
    /// Rough expected duration in seconds
    #[schema(example = 120)]
    pub estimated_time: u64,
}

/// Status response
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub analysis_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub progress: Option<ProgressRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Size aggregates of a file tree
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SizeBreakdown {
    pub total_size: i64,
    pub average_file_size: i64,
}

/// Statistics section of the tree response
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TreeStatistics {
    pub total_files: u64,
    pub total_directories: u64,
    pub total_lines: u64,
    #[schema(value_type = Object)]
    pub language_breakdown: std::collections::HashMap<String, u64>,
    pub size_breakdown: SizeBreakdown,
}

/// File-tree response
#[derive(Debug, Serialize, ToSchema)]
pub struct TreeResponse {
    #[schema(value_type = Object)]
    pub root: Node,
    pub statistics: TreeStatistics,
}

/// One row of the analyses listing
#[derive(Debug, Serialize, ToSchema)]
pub struct AnalysisSummary {
    pub analysis_id: String,
    pub repository_url: String,
    pub owner: String,
    pub name: String,
    pub branch: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<AnalysisRecord> for AnalysisSummary {
    fn from(record: AnalysisRecord) -> Self {
        Self {
            analysis_id: record.id,
            repository_url: record.repository_url,
            owner: record.owner,
            name: record.name,
            branch: record.branch,
            status: record.status.as_str().to_string(),
            error: record.error,
            created_at: record.created_at,
            started_at: record.started_at,
            completed_at: record.completed_at,
        }
    }
}

/// Listing response
#[derive(Debug, Serialize, ToSchema)]
pub struct ListResponse {
    pub analyses: Vec<AnalysisSummary>,
    pub total: u64,
    pub page: u32,
}

/// Deletion response
#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// Health response
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub services: ServiceStatuses,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceStatuses {
    pub database: bool,
    pub queue: bool,
}

/// Ping response
#[derive(Debug, Serialize, ToSchema)]
pub struct PingResponse {
    #[schema(example = "pong")]
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

//! Analysis endpoints: intake, status, tree, listing and deletion

use super::types::{
    AnalysisSummary, AnalyzeRequest, AnalyzeResponse, DeleteResponse, ListResponse, SizeBreakdown,
    StatusResponse, TreeResponse, TreeStatistics,
};
use crate::{error::ApiError, AppState};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use repolens_core::AnalysisStatus;
use std::collections::HashMap;
use tracing::info;

/// Rough duration quote returned at intake
const ESTIMATED_ANALYSIS_SECONDS: u64 = 120;

const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Submit a repository for analysis
#[utoipa::path(
    post,
    path = "/api/v1/analyze",
    tag = "Analysis",
    summary = "Submit an analysis",
    request_body = AnalyzeRequest,
    responses(
        (status = 201, description = "Analysis queued", body = AnalyzeResponse),
        (status = 400, description = "Invalid repository URL or options"),
        (status = 404, description = "Repository not found"),
        (status = 429, description = "Submission limit reached"),
        (status = 503, description = "Upstream host unavailable")
    )
)]
pub async fn submit_analysis(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<(StatusCode, Json<AnalyzeResponse>), ApiError> {
    info!(repository_url = %request.repository_url, "Analysis requested");

    let record = state
        .service
        .submit(&request.repository_url, request.branch, request.options)
        .await
        .map_err(|e| state.api_error(e))?;

    Ok((
        StatusCode::CREATED,
        Json(AnalyzeResponse {
            analysis_id: record.id,
            status: record.status.as_str().to_string(),
            created_at: record.created_at,
            estimated_time: ESTIMATED_ANALYSIS_SECONDS,
        }),
    ))
}

/// Poll the status and progress of an analysis
#[utoipa::path(
    get,
    path = "/api/v1/analysis/{id}/status",
    tag = "Analysis",
    summary = "Analysis status",
    params(("id" = String, Path, description = "Analysis id")),
    responses(
        (status = 200, description = "Current status", body = StatusResponse),
        (status = 404, description = "Unknown analysis id")
    )
)]
pub async fn get_analysis_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let (record, progress) = state
        .service
        .status(&id)
        .await
        .map_err(|e| state.api_error(e))?;

    Ok(Json(StatusResponse {
        analysis_id: record.id,
        status: record.status.as_str().to_string(),
        progress,
        error: record.error,
        completed_at: record.completed_at,
    }))
}

/// Retrieve the completed file-tree artifact
#[utoipa::path(
    get,
    path = "/api/v1/analysis/{id}/tree",
    tag = "Analysis",
    summary = "File tree artifact",
    params(("id" = String, Path, description = "Analysis id")),
    responses(
        (status = 200, description = "The artifact", body = TreeResponse),
        (status = 404, description = "Unknown id or analysis not completed")
    )
)]
pub async fn get_file_tree(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TreeResponse>, ApiError> {
    let artifact = state
        .service
        .file_tree(&id)
        .await
        .map_err(|e| state.api_error(e))?;

    let statistics = artifact.statistics;
    let average_file_size = if statistics.total_files == 0 {
        0
    } else {
        statistics.total_size / statistics.total_files as i64
    };

    Ok(Json(TreeResponse {
        root: artifact.root,
        statistics: TreeStatistics {
            total_files: statistics.total_files,
            total_directories: statistics.total_directories,
            total_lines: statistics.total_lines,
            language_breakdown: statistics.language_breakdown,
            size_breakdown: SizeBreakdown {
                total_size: statistics.total_size,
                average_file_size,
            },
        },
    }))
}

/// List analyses, newest first
#[utoipa::path(
    get,
    path = "/api/v1/analyses",
    tag = "Analysis",
    summary = "List analyses",
    params(
        ("limit" = Option<u32>, Query, description = "Page size, 1..=100"),
        ("offset" = Option<u32>, Query, description = "Rows to skip"),
        ("status" = Option<String>, Query, description = "Status filter")
    ),
    responses(
        (status = 200, description = "One page of analyses", body = ListResponse),
        (status = 400, description = "Malformed pagination or status value")
    )
)]
pub async fn list_analyses(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<ListResponse>, ApiError> {
    // Malformed values are a client error, not a silent default
    let limit = match params.get("limit") {
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|l| (1..=100).contains(l))
            .ok_or_else(|| ApiError::validation("limit must be an integer in 1..=100", "limit"))?,
        None => DEFAULT_PAGE_LIMIT,
    };
    let offset = match params.get("offset") {
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|_| ApiError::validation("offset must be a non-negative integer", "offset"))?,
        None => 0,
    };
    let status = match params.get("status") {
        Some(raw) => Some(
            AnalysisStatus::parse(raw)
                .ok_or_else(|| ApiError::validation("unknown status value", "status"))?,
        ),
        None => None,
    };

    let page = state
        .service
        .list(limit, offset, status)
        .await
        .map_err(|e| state.api_error(e))?;

    Ok(Json(ListResponse {
        analyses: page.records.into_iter().map(AnalysisSummary::from).collect(),
        total: page.total,
        page: offset / limit + 1,
    }))
}

/// Delete an analysis and its artifacts
#[utoipa::path(
    delete,
    path = "/api/v1/analysis/{id}",
    tag = "Analysis",
    summary = "Delete an analysis",
    params(("id" = String, Path, description = "Analysis id")),
    responses(
        (status = 200, description = "Deleted", body = DeleteResponse),
        (status = 404, description = "Unknown analysis id")
    )
)]
pub async fn delete_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state
        .service
        .delete(&id)
        .await
        .map_err(|e| state.api_error(e))?;

    info!(analysis_id = %id, "Analysis deleted");
    Ok(Json(DeleteResponse {
        success: true,
        message: format!("Analysis {} deleted", id),
    }))
}

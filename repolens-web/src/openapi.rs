//! OpenAPI documentation

use crate::handlers::{analysis, health, types};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "RepoLens API",
        description = "Structural analysis of remote source-code repositories",
        version = "0.1.0",
    ),
    paths(
        health::health_check,
        health::ping,
        analysis::submit_analysis,
        analysis::get_analysis_status,
        analysis::get_file_tree,
        analysis::list_analyses,
        analysis::delete_analysis,
    ),
    components(schemas(
        types::AnalyzeRequest,
        types::AnalyzeResponse,
        types::StatusResponse,
        types::TreeResponse,
        types::TreeStatistics,
        types::SizeBreakdown,
        types::AnalysisSummary,
        types::ListResponse,
        types::DeleteResponse,
        types::HealthResponse,
        types::ServiceStatuses,
        types::PingResponse,
    )),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Analysis", description = "Repository analysis lifecycle"),
    )
)]
pub struct ApiDoc;

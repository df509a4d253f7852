//! Route definitions

use crate::{handlers, middleware, openapi, AppState};
use axum::{
    response::Json,
    routing::{delete, get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// API routes mounted under `/api/{version}`
pub fn api_routes(state: AppState) -> Router<AppState> {
    // Intake carries the strict limiter on top of the global one
    let intake = Router::new()
        .route("/analyze", post(handlers::submit_analysis))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::strict_rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ping", get(handlers::ping))
        .route("/analysis/{id}/status", get(handlers::get_analysis_status))
        .route("/analysis/{id}/tree", get(handlers::get_file_tree))
        .route("/analysis/{id}", delete(handlers::delete_analysis))
        .route("/analyses", get(handlers::list_analyses))
        .merge(intake)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::global_rate_limit_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::api_key_middleware,
        ))
}

/// OpenAPI documentation routes
pub fn openapi_routes() -> Router<AppState> {
    Router::new()
        .route("/openapi.json", get(get_openapi_json))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

async fn get_openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi::ApiDoc::openapi())
}

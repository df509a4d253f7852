//! RepoLens Web Server
//!
//! Thin HTTP adapter over the analysis engine: intake, status, artifact and
//! admin endpoints under `/api/{version}`, with rate limiting, an optional
//! shared-secret API key check, CORS and OpenAPI documentation.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod state;

pub use server::RepolensServer;
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the main application router
pub fn create_app(state: AppState) -> Router {
    let cors = build_cors(&state);
    let api_version = state.config.api_version.clone();

    Router::new()
        .nest(
            &format!("/api/{}", api_version),
            routes::api_routes(state.clone()),
        )
        .nest("/api-docs", routes::openapi_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(state)
}

fn build_cors(state: &AppState) -> CorsLayer {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            AUTHORIZATION,
            ACCEPT,
            CONTENT_TYPE,
            HeaderName::from_static("x-api-key"),
        ]);

    match &state.config.cors_origin {
        Some(origin) => {
            if let Ok(value) = origin.parse::<HeaderValue>() {
                cors = cors.allow_origin(value);
                if state.config.cors_credentials {
                    cors = cors.allow_credentials(true);
                }
            }
        }
        None => {
            cors = cors.allow_origin(tower_http::cors::Any);
        }
    }

    cors
}

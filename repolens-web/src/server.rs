//! Server lifecycle
//!
//! Builds the services record in dependency order, recovers interrupted
//! work, serves until a termination signal and then tears down in reverse:
//! listener first, queue drain, store close.

use crate::{create_app, AppState};
use repolens_core::{RepolensConfig, RepolensResult};
use repolens_engine::{AnalysisService, SqliteRecordStore};
use repolens_fetcher::GitHubFetcher;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Duration;
use tracing::{error, info};

/// Grace period for in-flight work during shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// The RepoLens web server
pub struct RepolensServer {
    config: RepolensConfig,
    state: AppState,
    store: Arc<SqliteRecordStore>,
}

impl RepolensServer {
    /// Construct the full services record: store, fetcher, engine, state.
    pub async fn new(config: RepolensConfig) -> RepolensResult<Self> {
        let store = Arc::new(SqliteRecordStore::new(&config.database_url).await?);
        let fetcher = Arc::new(GitHubFetcher::new(
            &config.clone_base_path,
            config.github_token.clone(),
        )?);
        let service = AnalysisService::new(config.clone(), store.clone(), fetcher);

        // Jobs interrupted by the previous shutdown go back on the queue
        service.recover().await?;

        let state = AppState::new(config.clone(), service);
        Ok(Self {
            config,
            state,
            store,
        })
    }

    /// Serve until SIGINT/SIGTERM, then drain and close.
    pub async fn start(self) -> RepolensResult<()> {
        let address = SocketAddr::from(([0, 0, 0, 0], self.config.port));

        info!("Starting RepoLens server");
        info!("API base: http://{}/api/{}", address, self.config.api_version);

        let app = create_app(self.state.clone());
        let listener = TcpListener::bind(address).await?;

        info!("Server listening on http://{}", address);

        let serve_result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        if let Err(e) = serve_result {
            error!(error = %e, "Server error");
            return Err(repolens_core::RepolensError::Io(e));
        }

        info!("Listener stopped, draining background work");
        self.state.service.shutdown(SHUTDOWN_GRACE).await;
        self.store.close().await;
        info!("Shutdown complete");

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl-c"),
        _ = terminate => info!("Received terminate signal"),
    }
}

//! RepoLens server binary

use repolens_core::{init_logging, LoggingConfig, RepolensConfig};
use repolens_web::RepolensServer;
use tracing::error;

#[tokio::main]
async fn main() {
    if let Err(e) = init_logging(&LoggingConfig::default()) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let config = match RepolensConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    let server = match RepolensServer::new(config).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Failed to start server");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.start().await {
        error!(error = %e, "Server terminated with error");
        std::process::exit(1);
    }
}

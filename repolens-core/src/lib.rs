//! RepoLens Core - Shared data structures, errors and configuration
//!
//! This crate defines the abstractions shared by every other RepoLens crate:
//! the analysis data model, the error taxonomy, environment configuration,
//! logging setup and common async utilities.

pub mod async_utils;
pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use async_utils::*;
pub use config::*;
pub use error::*;
pub use logging::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tokio;
pub use tracing;

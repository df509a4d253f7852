//! Request handlers

pub mod analysis;
pub mod health;
pub mod types;

pub use analysis::{delete_analysis, get_analysis_status, get_file_tree, list_analyses, submit_analysis};
pub use health::{health_check, ping};

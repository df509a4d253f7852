//! RepoLens Analyze - Tree walking and structural extraction
//!
//! Walks a materialized working copy under ignore rules into a typed file
//! tree with per-file metadata and aggregate statistics, detects languages,
//! and extracts imports, exports, functions and classes from the fully
//! supported languages (TypeScript, JavaScript, Python).

pub mod detect;
pub mod parser;
pub mod walker;

pub use detect::{detect_language, Confidence, Detection, DetectionBasis};
pub use parser::{parse_source, select_files_to_parse, MAX_PARSED_FILES, MAX_PARSE_SIZE_BYTES};
pub use walker::{build_tree, compute_statistics, WalkerOptions};

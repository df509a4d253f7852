//! Core data type definitions
//!
//! The analysis data model: records, options, file-tree nodes, statistics
//! and the per-file structural extraction types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Generate a fresh analysis identifier.
///
/// Identifiers are URL-safe and carry a hex millisecond prefix so that
/// lexicographic ordering approximates creation order.
pub fn new_analysis_id() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let entropy = Uuid::new_v4().simple().to_string();
    format!("{:012x}-{}", millis, &entropy[..12])
}

/// Analysis lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    /// Analysis is queued for processing
    Queued,
    /// Analysis is currently being processed
    Processing,
    /// Analysis completed successfully
    Completed,
    /// Analysis failed after exhausting retries
    Failed,
    /// Analysis was cancelled before it started
    Cancelled,
}

impl Default for AnalysisStatus {
    fn default() -> Self {
        Self::Queued
    }
}

impl AnalysisStatus {
    /// Whether the status may advance to `next`.
    ///
    /// Transitions follow queued -> processing -> (completed | failed);
    /// cancellation is only reachable from queued. A processing ->
    /// processing transition is permitted so retry attempts can re-enter
    /// the state without violating the DAG.
    pub fn can_transition_to(&self, next: AnalysisStatus) -> bool {
        use AnalysisStatus::*;
        matches!(
            (self, next),
            (Queued, Processing)
                | (Queued, Cancelled)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AnalysisStatus::Completed | AnalysisStatus::Failed | AnalysisStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Queued => "queued",
            AnalysisStatus::Processing => "processing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
            AnalysisStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(AnalysisStatus::Queued),
            "processing" => Some(AnalysisStatus::Processing),
            "completed" => Some(AnalysisStatus::Completed),
            "failed" => Some(AnalysisStatus::Failed),
            "cancelled" => Some(AnalysisStatus::Cancelled),
            _ => None,
        }
    }
}

/// Options controlling a single analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisOptions {
    /// Whether test files are included in the tree
    pub include_tests: bool,
    /// Files above this size are dropped from the tree
    #[serde(rename = "maxFileSizeKB")]
    pub max_file_size_kb: u32,
    /// Optional allowlist of language tags
    #[serde(skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<String>>,
    /// Additional ignore globs supplied by the caller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_patterns: Option<Vec<String>>,
    /// Reserved; accepted but not consumed by the pipeline
    pub deep_analysis: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            include_tests: true,
            max_file_size_kb: 1000,
            languages: None,
            exclude_patterns: None,
            deep_analysis: false,
        }
    }
}

impl AnalysisOptions {
    /// Validate option ranges.
    pub fn validate(&self) -> crate::RepolensResult<()> {
        if !(1..=10_000).contains(&self.max_file_size_kb) {
            return Err(crate::validation_error!(
                format!(
                    "maxFileSizeKB must be between 1 and 10000, got {}",
                    self.max_file_size_kb
                ),
                "maxFileSizeKB",
                "analysis_options"
            ));
        }
        Ok(())
    }
}

/// The top-level unit of work: one client-submitted repository analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    /// Opaque, URL-safe identifier with a monotonic prefix
    pub id: String,
    /// Normalized repository URL
    pub repository_url: String,
    /// Owner parsed from the URL
    pub owner: String,
    /// Repository name parsed from the URL
    pub name: String,
    /// Resolved branch; never empty after intake
    pub branch: String,
    /// Resolved commit identifier; set by the worker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    pub status: AnalysisStatus,
    pub options: AnalysisOptions,
    /// Set iff status is failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisRecord {
    pub fn new(
        repository_url: String,
        owner: String,
        name: String,
        branch: String,
        options: AnalysisOptions,
    ) -> Self {
        Self {
            id: new_analysis_id(),
            repository_url,
            owner,
            name,
            branch,
            commit_sha: None,
            status: AnalysisStatus::Queued,
            options,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Per-file metadata carried by file nodes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    /// Lowercase language tag, "unknown" when unrecognized
    pub language: String,
    /// Lowercased extension including the leading dot
    pub extension: String,
    /// Size in bytes
    pub size: u64,
    /// Line-separator count plus one; zero for empty or unreadable files
    pub lines_of_code: u64,
    pub is_test: bool,
    pub is_config: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// One node of the file tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Directory(DirectoryNode),
    File(FileNode),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryNode {
    /// Fresh per build; unique within one artifact
    pub id: String,
    pub name: String,
    /// Path relative to the working-copy root; empty for the root itself
    pub path: String,
    /// Directories first, then files; case-insensitive name order per group
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    pub id: String,
    pub name: String,
    pub path: String,
    pub metadata: FileMetadata,
}

impl Node {
    pub fn id(&self) -> &str {
        match self {
            Node::Directory(d) => &d.id,
            Node::File(f) => &f.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Directory(d) => &d.name,
            Node::File(f) => &f.name,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Node::Directory(d) => &d.path,
            Node::File(f) => &f.path,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Node::Directory(_))
    }
}

/// Aggregate statistics over a file tree
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileTreeStatistics {
    pub total_files: u64,
    pub total_directories: u64,
    pub total_lines: u64,
    /// 64-bit; large repositories overflow 32-bit byte counts
    pub total_size: i64,
    pub language_breakdown: HashMap<String, u64>,
}

/// The persisted artifact of a completed analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTreeArtifact {
    pub root: Node,
    pub statistics: FileTreeStatistics,
}

/// Structural extraction of one source file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedFile {
    /// Path relative to the working-copy root
    pub path: String,
    pub language: String,
    pub imports: Vec<Import>,
    pub exports: Vec<Export>,
    pub functions: Vec<FunctionInfo>,
    pub classes: Vec<ClassInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Import {
    /// Module path with quotes stripped
    pub source: String,
    pub specifiers: Vec<ImportSpecifier>,
    pub is_type_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportSpecifier {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Named,
    Default,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Export {
    pub name: String,
    pub kind: ExportKind,
    /// Re-export source, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub start_offset: usize,
    pub end_offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_annotation: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionInfo {
    /// Declared name, or "anonymous"
    pub name: String,
    pub parameters: Vec<Parameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    pub is_async: bool,
    pub is_generator: bool,
    pub location: SourceLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    /// static / private / protected / readonly / abstract / async
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub modifiers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_annotation: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    pub name: String,
    /// Methods in declaration order
    pub methods: Vec<FunctionInfo>,
    pub properties: Vec<Property>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub super_class: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub decorators: Vec<String>,
    pub location: SourceLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
}

/// Job progress as observed through the status endpoint.
///
/// Monotonic in `percentage` within a single attempt; may reset on retry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub current_step: String,
    pub percentage: u8,
    pub steps_completed: Vec<String>,
    pub steps_total: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_ids_are_url_safe_and_roughly_monotonic() {
        let a = new_analysis_id();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = new_analysis_id();
        assert!(a < b, "{} should sort before {}", a, b);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn status_transitions_follow_the_dag() {
        use AnalysisStatus::*;
        assert!(Queued.can_transition_to(Processing));
        assert!(Queued.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Processing));

        assert!(!Completed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Queued));
        assert!(!Processing.can_transition_to(Queued));
        assert!(!Queued.can_transition_to(Completed));
    }

    #[test]
    fn options_validation_bounds() {
        let mut options = AnalysisOptions::default();
        assert!(options.validate().is_ok());

        options.max_file_size_kb = 0;
        assert!(options.validate().is_err());

        options.max_file_size_kb = 10_001;
        assert!(options.validate().is_err());

        options.max_file_size_kb = 1;
        assert!(options.validate().is_ok());
    }

    #[test]
    fn node_serialization_is_tagged() {
        let node = Node::File(FileNode {
            id: "n1".into(),
            name: "main.ts".into(),
            path: "src/main.ts".into(),
            metadata: FileMetadata {
                language: "typescript".into(),
                extension: ".ts".into(),
                size: 10,
                lines_of_code: 1,
                is_test: false,
                is_config: false,
                last_modified: None,
            },
        });

        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], "file");
        assert_eq!(value["metadata"]["linesOfCode"], 1);
    }

    #[test]
    fn options_accept_wire_shape() {
        let options: AnalysisOptions =
            serde_json::from_str(r#"{"includeTests":false,"maxFileSizeKB":250}"#).unwrap();
        assert!(!options.include_tests);
        assert_eq!(options.max_file_size_kb, 250);
        assert!(!options.deep_analysis);
    }
}

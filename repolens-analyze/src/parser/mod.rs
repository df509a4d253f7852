//! Language-dispatched structural extraction
//!
//! Only TypeScript, JavaScript and Python are fully parsed; every other
//! language yields metadata only. Parsing is best-effort: failures are
//! logged and the file is omitted, never failing the job.

use repolens_core::{Node, ParsedFile};
use tracing::{debug, warn};

pub mod python;
pub mod typescript;

/// Upper bound on files parsed per job; the largest candidates are dropped
/// first when a repository exceeds it.
pub const MAX_PARSED_FILES: usize = 100;

/// Files above this size are skipped by the parse stage.
pub const MAX_PARSE_SIZE_BYTES: u64 = 500 * 1024;

/// Languages with full structural extraction support.
pub const PARSEABLE_LANGUAGES: &[&str] = &["typescript", "javascript", "python"];

/// A file selected for parsing
#[derive(Debug, Clone)]
pub struct ParseCandidate {
    /// Path relative to the working-copy root
    pub path: String,
    pub language: String,
    pub size: u64,
}

/// Collect the parse candidates from a built tree.
///
/// Filters to the parseable set (optionally narrowed by a caller allowlist)
/// and the per-file size cap, then bounds the batch to [`MAX_PARSED_FILES`]
/// keeping the smallest files.
pub fn select_files_to_parse(tree: &Node, languages: Option<&[String]>) -> Vec<ParseCandidate> {
    let mut candidates = Vec::new();
    collect_candidates(tree, languages, &mut candidates);

    candidates.sort_by(|a, b| a.size.cmp(&b.size).then_with(|| a.path.cmp(&b.path)));
    if candidates.len() > MAX_PARSED_FILES {
        debug!(
            dropped = candidates.len() - MAX_PARSED_FILES,
            "Parse batch over limit, dropping largest files"
        );
        candidates.truncate(MAX_PARSED_FILES);
    }
    candidates
}

fn collect_candidates(
    node: &Node,
    languages: Option<&[String]>,
    candidates: &mut Vec<ParseCandidate>,
) {
    match node {
        Node::Directory(dir) => {
            for child in &dir.children {
                collect_candidates(child, languages, candidates);
            }
        }
        Node::File(file) => {
            let language = file.metadata.language.as_str();
            if !PARSEABLE_LANGUAGES.contains(&language) {
                return;
            }
            if let Some(allowed) = languages {
                if !allowed.iter().any(|l| l == language) {
                    return;
                }
            }
            if file.metadata.size > MAX_PARSE_SIZE_BYTES {
                debug!(path = %file.path, size = file.metadata.size, "File exceeds parse size cap");
                return;
            }
            candidates.push(ParseCandidate {
                path: file.path.clone(),
                language: language.to_string(),
                size: file.metadata.size,
            });
        }
    }
}

/// Parse one source file into its structural extraction.
///
/// Returns None for unrecognized languages and for any parse failure.
pub fn parse_source(path: &str, language: &str, source: &str) -> Option<ParsedFile> {
    let result = match language {
        "typescript" | "javascript" => typescript::extract(source, language),
        "python" => Ok(python::extract(source)),
        _ => return None,
    };

    match result {
        Ok(mut parsed) => {
            parsed.path = path.to_string();
            parsed.language = language.to_string();
            Some(parsed)
        }
        Err(e) => {
            warn!(path = %path, language = %language, error = %e, "Failed to parse file, omitting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repolens_core::{DirectoryNode, FileMetadata, FileNode};

    fn file_node(path: &str, language: &str, size: u64) -> Node {
        Node::File(FileNode {
            id: uuid::Uuid::new_v4().to_string(),
            name: path.rsplit('/').next().unwrap().to_string(),
            path: path.to_string(),
            metadata: FileMetadata {
                language: language.to_string(),
                extension: String::new(),
                size,
                lines_of_code: 0,
                is_test: false,
                is_config: false,
                last_modified: None,
            },
        })
    }

    fn tree_of(children: Vec<Node>) -> Node {
        Node::Directory(DirectoryNode {
            id: uuid::Uuid::new_v4().to_string(),
            name: "root".into(),
            path: String::new(),
            children,
        })
    }

    #[test]
    fn only_parseable_languages_are_selected() {
        let tree = tree_of(vec![
            file_node("a.ts", "typescript", 10),
            file_node("b.rs", "rust", 10),
            file_node("c.py", "python", 10),
            file_node("d.bin", "unknown", 10),
        ]);

        let candidates = select_files_to_parse(&tree, None);
        let paths: Vec<_> = candidates.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["a.ts", "c.py"]);
    }

    #[test]
    fn language_allowlist_narrows_selection() {
        let tree = tree_of(vec![
            file_node("a.ts", "typescript", 10),
            file_node("c.py", "python", 10),
        ]);

        let allowed = vec!["python".to_string()];
        let candidates = select_files_to_parse(&tree, Some(&allowed));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].path, "c.py");
    }

    #[test]
    fn oversized_files_are_skipped() {
        let tree = tree_of(vec![
            file_node("small.ts", "typescript", 10),
            file_node("huge.ts", "typescript", MAX_PARSE_SIZE_BYTES + 1),
        ]);

        let candidates = select_files_to_parse(&tree, None);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].path, "small.ts");
    }

    #[test]
    fn batch_is_bounded_dropping_largest_first() {
        let children: Vec<Node> = (0..(MAX_PARSED_FILES + 5))
            .map(|i| file_node(&format!("f{:03}.py", i), "python", i as u64))
            .collect();
        let tree = tree_of(children);

        let candidates = select_files_to_parse(&tree, None);
        assert_eq!(candidates.len(), MAX_PARSED_FILES);
        // The five largest files are the ones dropped
        assert!(candidates.iter().all(|c| c.size < MAX_PARSED_FILES as u64));
    }

    #[test]
    fn unknown_language_yields_none() {
        assert!(parse_source("a.rs", "rust", "fn main() {}").is_none());
    }
}

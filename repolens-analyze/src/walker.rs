//! File-tree construction
//!
//! Recursive walk of a working copy under ignore rules, producing the typed
//! node tree and (in a separate pure pass) its aggregate statistics.

use crate::detect::{detect_language, CONTENT_SAMPLE_BYTES};
use chrono::{DateTime, Utc};
use glob::Pattern;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use repolens_core::{
    DirectoryNode, ErrorContext, FileMetadata, FileNode, FileTreeStatistics, Node, RepolensError,
    RepolensResult,
};
use std::path::Path;
use tracing::{debug, warn};

/// Directories that are never descended into
const SKIPPED_DIRECTORIES: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    "coverage",
    ".next",
    ".nuxt",
    "out",
    "vendor",
    "__pycache__",
    ".venv",
    "venv",
    "target",
    "bin",
    "obj",
    ".idea",
    ".vscode",
];

/// Built-in default ignore globs, lowest precedence
const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &["*.lock", "*.log", "*.tmp", "*.cache"];

/// Path fragments classifying a file as a test
const TEST_PATH_MARKERS: &[&str] = &[".test.", ".spec.", "__tests__", "/test/", "/tests/"];

/// Basename fragments classifying a file as configuration
const CONFIG_NAME_MARKERS: &[&str] = &[
    "config",
    ".rc",
    "package.json",
    "tsconfig",
    "webpack",
    "babel",
    "eslint",
    "prettier",
    ".env",
];

/// Options controlling one walk
#[derive(Debug, Clone)]
pub struct WalkerOptions {
    pub include_tests: bool,
    pub max_file_size_kb: u32,
    /// Caller ignore globs; highest precedence
    pub exclude_patterns: Vec<String>,
}

impl Default for WalkerOptions {
    fn default() -> Self {
        Self {
            include_tests: true,
            max_file_size_kb: 1000,
            exclude_patterns: Vec::new(),
        }
    }
}

/// Combined ignore rules with the documented precedence:
/// built-in defaults, then gitignore, then caller patterns.
struct TreeFilter {
    builtin: Vec<Pattern>,
    gitignore: Option<Gitignore>,
    caller: Vec<Pattern>,
}

impl TreeFilter {
    fn build(root: &Path, exclude_patterns: &[String]) -> RepolensResult<Self> {
        let builtin = DEFAULT_EXCLUDE_PATTERNS
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .collect();

        let gitignore_path = root.join(".gitignore");
        let gitignore = if gitignore_path.is_file() {
            let mut builder = GitignoreBuilder::new(root);
            builder.add(&gitignore_path);
            match builder.build() {
                Ok(rules) => Some(rules),
                Err(e) => {
                    warn!(error = %e, "Failed to parse .gitignore, ignoring it");
                    None
                }
            }
        } else {
            None
        };

        let mut caller = Vec::new();
        for pattern in exclude_patterns {
            let compiled = Pattern::new(pattern).map_err(|e| RepolensError::Validation {
                message: format!("Invalid exclude pattern '{}': {}", pattern, e),
                field: Some("excludePatterns".to_string()),
                context: ErrorContext::new("walker").with_operation("compile_patterns"),
            })?;
            caller.push(compiled);
        }

        Ok(Self {
            builtin,
            gitignore,
            caller,
        })
    }

    /// Later rule sets override earlier ones.
    fn is_excluded(&self, rel_path: &str, file_name: &str, is_dir: bool) -> bool {
        if matches_any(&self.caller, rel_path, file_name) {
            return true;
        }

        if let Some(gitignore) = &self.gitignore {
            let matched = gitignore.matched(rel_path, is_dir);
            if matched.is_ignore() {
                return true;
            }
            if matched.is_whitelist() {
                return false;
            }
        }

        matches_any(&self.builtin, rel_path, file_name)
    }
}

fn matches_any(patterns: &[Pattern], rel_path: &str, file_name: &str) -> bool {
    patterns
        .iter()
        .any(|p| p.matches(rel_path) || p.matches(file_name))
}

/// Build the file tree rooted at `root_path`.
pub fn build_tree(root_path: &Path, options: &WalkerOptions) -> RepolensResult<Node> {
    if !root_path.is_dir() {
        return Err(RepolensError::Analyze {
            message: format!("Not a directory: {}", root_path.display()),
            source: None,
            context: ErrorContext::new("walker").with_operation("build_tree"),
        });
    }

    let filter = TreeFilter::build(root_path, &options.exclude_patterns)?;

    let name = root_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("root")
        .to_string();

    let children = walk_directory(root_path, "", &filter, options);

    Ok(Node::Directory(DirectoryNode {
        id: uuid::Uuid::new_v4().to_string(),
        name,
        path: String::new(),
        children,
    }))
}

fn walk_directory(
    abs_dir: &Path,
    rel_dir: &str,
    filter: &TreeFilter,
    options: &WalkerOptions,
) -> Vec<Node> {
    let entries = match std::fs::read_dir(abs_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %abs_dir.display(), error = %e, "Failed to read directory, skipping");
            return Vec::new();
        }
    };

    let mut children = Vec::new();

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %abs_dir.display(), error = %e, "Failed to read entry, skipping");
                continue;
            }
        };

        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => {
                warn!(dir = %abs_dir.display(), "Non-UTF-8 entry name, skipping");
                continue;
            }
        };

        // Traversal guard: an entry name can never move above the root
        if name == ".." || name.contains('/') || name.contains('\\') {
            warn!(name = %name, "Suspicious entry name, skipping");
            continue;
        }

        let rel_path = if rel_dir.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", rel_dir, name)
        };
        let abs_path = abs_dir.join(&name);

        // Symlinks are not followed; stat the link itself
        let metadata = match std::fs::symlink_metadata(&abs_path) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %abs_path.display(), error = %e, "Failed to stat entry, skipping");
                continue;
            }
        };

        if metadata.is_dir() {
            if SKIPPED_DIRECTORIES.contains(&name.as_str()) {
                debug!(dir = %rel_path, "Skipping excluded directory");
                continue;
            }
            if filter.is_excluded(&rel_path, &name, true) {
                continue;
            }

            let grandchildren = walk_directory(&abs_path, &rel_path, filter, options);
            children.push(Node::Directory(DirectoryNode {
                id: uuid::Uuid::new_v4().to_string(),
                name,
                path: rel_path,
                children: grandchildren,
            }));
            continue;
        }

        if filter.is_excluded(&rel_path, &name, false) {
            continue;
        }

        let size = metadata.len();
        if size > options.max_file_size_kb as u64 * 1024 {
            debug!(file = %rel_path, size, "File exceeds size limit, dropping");
            continue;
        }

        let is_test = classify_test(&rel_path);
        if !options.include_tests && is_test {
            continue;
        }

        let is_symlink = metadata.file_type().is_symlink();
        let (lines_of_code, content_head) = if is_symlink {
            (0, None)
        } else {
            read_file_summary(&abs_path)
        };

        let language = detect_language(&abs_path, content_head.as_deref()).language;

        let extension = abs_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();

        let last_modified = metadata
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t));

        children.push(Node::File(FileNode {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.clone(),
            path: rel_path,
            metadata: FileMetadata {
                language,
                extension,
                size,
                lines_of_code,
                is_test,
                is_config: classify_config(&name),
                last_modified,
            },
        }));
    }

    sort_children(&mut children);
    children
}

/// Line count plus a capped content sample for detection.
///
/// Unreadable content yields zero lines; the entry itself stays in the tree
/// because its stat succeeded.
fn read_file_summary(path: &Path) -> (u64, Option<String>) {
    match std::fs::read(path) {
        Ok(bytes) => {
            let lines = if bytes.is_empty() {
                0
            } else {
                bytes.iter().filter(|b| **b == b'\n').count() as u64 + 1
            };
            let head_len = bytes.len().min(CONTENT_SAMPLE_BYTES);
            let head = String::from_utf8_lossy(&bytes[..head_len]).into_owned();
            (lines, Some(head))
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read file content");
            (0, None)
        }
    }
}

fn classify_test(rel_path: &str) -> bool {
    let slashed = format!("/{}", rel_path);
    TEST_PATH_MARKERS.iter().any(|marker| slashed.contains(marker))
}

fn classify_config(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    CONFIG_NAME_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Directories first, then files; case-insensitive name order per group.
fn sort_children(children: &mut [Node]) {
    children.sort_by(|a, b| {
        b.is_directory()
            .cmp(&a.is_directory())
            .then_with(|| a.name().to_lowercase().cmp(&b.name().to_lowercase()))
            .then_with(|| a.name().cmp(b.name()))
    });
}

/// Pure second pass over a built tree.
///
/// The root directory itself is not counted; an empty repository yields
/// all-zero statistics.
pub fn compute_statistics(root: &Node) -> FileTreeStatistics {
    let mut statistics = FileTreeStatistics::default();
    if let Node::Directory(dir) = root {
        for child in &dir.children {
            accumulate(child, &mut statistics);
        }
    }
    statistics
}

fn accumulate(node: &Node, statistics: &mut FileTreeStatistics) {
    match node {
        Node::Directory(dir) => {
            statistics.total_directories += 1;
            for child in &dir.children {
                accumulate(child, statistics);
            }
        }
        Node::File(file) => {
            statistics.total_files += 1;
            statistics.total_lines += file.metadata.lines_of_code;
            statistics.total_size += file.metadata.size as i64;
            *statistics
                .language_breakdown
                .entry(file.metadata.language.clone())
                .or_insert(0) += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn child_names(node: &Node) -> Vec<String> {
        match node {
            Node::Directory(dir) => dir.children.iter().map(|c| c.name().to_string()).collect(),
            Node::File(_) => Vec::new(),
        }
    }

    #[test]
    fn skip_list_directories_are_never_descended() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.ts", "export const x = 1;\n");
        write(dir.path(), "b.py", "x = 1\n");
        write(dir.path(), "node_modules/ignored.js", "module.exports = {};\n");
        write(dir.path(), ".git/HEAD", "ref: refs/heads/main\n");

        let tree = build_tree(dir.path(), &WalkerOptions::default()).unwrap();
        let names = child_names(&tree);
        assert_eq!(names, vec!["a.ts", "b.py"]);

        let statistics = compute_statistics(&tree);
        assert_eq!(statistics.total_files, 2);
        assert_eq!(statistics.total_directories, 0);
        assert_eq!(statistics.language_breakdown.get("typescript"), Some(&1));
        assert_eq!(statistics.language_breakdown.get("python"), Some(&1));
    }

    #[test]
    fn siblings_sort_directories_first_then_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Zeta.ts", "");
        write(dir.path(), "alpha.ts", "");
        write(dir.path(), "src/lib.ts", "");
        write(dir.path(), "Docs/readme.md", "");

        let tree = build_tree(dir.path(), &WalkerOptions::default()).unwrap();
        let names = child_names(&tree);
        assert_eq!(names, vec!["Docs", "src", "alpha.ts", "Zeta.ts"]);
    }

    #[test]
    fn size_filter_drops_large_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "small.txt", "ok\n");
        write(dir.path(), "big.txt", &"x".repeat(2048));

        let options = WalkerOptions {
            max_file_size_kb: 1,
            ..Default::default()
        };
        let tree = build_tree(dir.path(), &options).unwrap();
        assert_eq!(child_names(&tree), vec!["small.txt"]);
    }

    #[test]
    fn test_files_dropped_when_excluded() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "app.ts", "");
        write(dir.path(), "app.test.ts", "");
        write(dir.path(), "tests/helper.py", "");

        let options = WalkerOptions {
            include_tests: false,
            ..Default::default()
        };
        let tree = build_tree(dir.path(), &options).unwrap();
        let names = child_names(&tree);
        // The tests directory survives as a directory node; its files do not.
        assert_eq!(names, vec!["tests", "app.ts"]);

        let statistics = compute_statistics(&tree);
        assert_eq!(statistics.total_files, 1);
        assert_eq!(statistics.total_directories, 1);
    }

    #[test]
    fn test_classification_markers() {
        assert!(classify_test("src/app.test.ts"));
        assert!(classify_test("src/app.spec.js"));
        assert!(classify_test("src/__tests__/app.ts"));
        assert!(classify_test("test/app.py"));
        assert!(classify_test("tests/app.py"));
        assert!(!classify_test("src/contest.py"));
    }

    #[test]
    fn config_classification_markers() {
        assert!(classify_config("webpack.config.js"));
        assert!(classify_config("package.json"));
        assert!(classify_config(".eslintrc"));
        assert!(classify_config(".env.local"));
        assert!(!classify_config("main.ts"));
    }

    #[test]
    fn gitignore_rules_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".gitignore", "generated/\n*.snap\n");
        write(dir.path(), "kept.ts", "");
        write(dir.path(), "ui.snap", "");
        write(dir.path(), "generated/out.ts", "");

        let tree = build_tree(dir.path(), &WalkerOptions::default()).unwrap();
        let names = child_names(&tree);
        assert!(names.contains(&"kept.ts".to_string()));
        assert!(names.contains(&".gitignore".to_string()));
        assert!(!names.contains(&"ui.snap".to_string()));
        assert!(!names.contains(&"generated".to_string()));
    }

    #[test]
    fn caller_patterns_take_highest_precedence() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "kept.ts", "");
        write(dir.path(), "dropped.md", "");

        let options = WalkerOptions {
            exclude_patterns: vec!["*.md".to_string()],
            ..Default::default()
        };
        let tree = build_tree(dir.path(), &options).unwrap();
        assert_eq!(child_names(&tree), vec!["kept.ts"]);
    }

    #[test]
    fn invalid_caller_pattern_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let options = WalkerOptions {
            exclude_patterns: vec!["[".to_string()],
            ..Default::default()
        };
        assert!(build_tree(dir.path(), &options).is_err());
    }

    #[test]
    fn empty_repository_yields_zero_statistics() {
        let dir = tempfile::tempdir().unwrap();
        let tree = build_tree(dir.path(), &WalkerOptions::default()).unwrap();
        assert!(child_names(&tree).is_empty());

        let statistics = compute_statistics(&tree);
        assert_eq!(statistics, FileTreeStatistics::default());
    }

    #[test]
    fn line_counting() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "empty.txt", "");
        write(dir.path(), "two_lines.txt", "a\nb");
        write(dir.path(), "trailing.txt", "a\nb\n");

        let tree = build_tree(dir.path(), &WalkerOptions::default()).unwrap();
        let lines: std::collections::HashMap<String, u64> = match &tree {
            Node::Directory(dir) => dir
                .children
                .iter()
                .filter_map(|c| match c {
                    Node::File(f) => Some((f.name.clone(), f.metadata.lines_of_code)),
                    _ => None,
                })
                .collect(),
            _ => panic!("expected directory root"),
        };

        assert_eq!(lines["empty.txt"], 0);
        assert_eq!(lines["two_lines.txt"], 2);
        assert_eq!(lines["trailing.txt"], 3);
    }

    #[test]
    fn node_ids_are_unique_within_a_build() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.ts", "");
        write(dir.path(), "sub/b.ts", "");

        let tree = build_tree(dir.path(), &WalkerOptions::default()).unwrap();
        let mut ids = Vec::new();
        fn collect_ids(node: &Node, ids: &mut Vec<String>) {
            ids.push(node.id().to_string());
            if let Node::Directory(dir) = node {
                for child in &dir.children {
                    collect_ids(child, ids);
                }
            }
        }
        collect_ids(&tree, &mut ids);

        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }
}

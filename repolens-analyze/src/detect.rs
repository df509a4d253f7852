//! Language detection
//!
//! Resolution order: extension map, shebang, content heuristic over a capped
//! prefix, otherwise unknown.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// How many bytes of the file head the content heuristic inspects.
pub const CONTENT_SAMPLE_BYTES: usize = 5000;

/// Detection confidence tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// What the detection was based on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionBasis {
    Extension,
    Shebang,
    Content,
    Unknown,
}

/// Result of language detection
#[derive(Debug, Clone)]
pub struct Detection {
    /// Lowercase language tag, "unknown" when unrecognized
    pub language: String,
    pub confidence: Confidence,
    pub basis: DetectionBasis,
}

impl Detection {
    fn new(language: &str, confidence: Confidence, basis: DetectionBasis) -> Self {
        Self {
            language: language.to_string(),
            confidence,
            basis,
        }
    }

    fn unknown() -> Self {
        Self::new("unknown", Confidence::Low, DetectionBasis::Unknown)
    }
}

/// Detect the language of a file from its path and an optional content head.
pub fn detect_language(path: &Path, content_head: Option<&str>) -> Detection {
    if let Some(language) = from_extension(path) {
        return Detection::new(language, Confidence::High, DetectionBasis::Extension);
    }

    if let Some(head) = content_head {
        if let Some(language) = from_shebang(head) {
            return Detection::new(language, Confidence::High, DetectionBasis::Shebang);
        }

        if let Some(language) = from_content(head) {
            return Detection::new(&language, Confidence::Medium, DetectionBasis::Content);
        }
    }

    Detection::unknown()
}

fn from_extension(path: &Path) -> Option<&'static str> {
    // The `r`/`R` pair is the one case-sensitive entry, so match before
    // lowercasing.
    let raw_ext = path.extension()?.to_str()?;
    if raw_ext == "R" {
        return Some("r");
    }

    let ext = raw_ext.to_ascii_lowercase();
    let language = match ext.as_str() {
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "py" | "pyw" | "pyx" => "python",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => "cpp",
        "cs" => "csharp",
        "go" => "go",
        "rs" => "rust",
        "rb" | "rake" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "dart" => "dart",
        "scala" => "scala",
        "sh" | "bash" | "zsh" => "shell",
        "sql" => "sql",
        "r" => "r",
        "m" | "mm" => "objective-c",
        _ => return None,
    };
    Some(language)
}

fn from_shebang(content: &str) -> Option<&'static str> {
    let first_line = content.lines().next()?;
    if !first_line.starts_with("#!") {
        return None;
    }

    static SHEBANG_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
        vec![
            (Regex::new(r"python[23]?").unwrap(), "python"),
            (Regex::new(r"\bnode\b").unwrap(), "javascript"),
            (Regex::new(r"\bruby\b").unwrap(), "ruby"),
            (Regex::new(r"\bperl\b").unwrap(), "perl"),
            (Regex::new(r"\bphp\b").unwrap(), "php"),
            (Regex::new(r"\b(bash|sh|zsh)\b").unwrap(), "shell"),
        ]
    });

    SHEBANG_RULES
        .iter()
        .find(|(pattern, _)| pattern.is_match(first_line))
        .map(|(_, language)| *language)
}

struct ContentSignature {
    language: &'static str,
    patterns: Vec<Regex>,
    min_ratio: f64,
}

static CONTENT_SIGNATURES: LazyLock<Vec<ContentSignature>> = LazyLock::new(|| {
    vec![
        ContentSignature {
            language: "python",
            patterns: vec![
                Regex::new(r"(?m)^\s*def \w+\s*\(").unwrap(),
                Regex::new(r"(?m)^\s*class \w+.*:").unwrap(),
                Regex::new(r"(?m)^import \w+").unwrap(),
                Regex::new(r"(?m)^from \w[\w.]* import ").unwrap(),
                Regex::new(r"\bself\.").unwrap(),
                Regex::new(r#"if __name__ == ['"]__main__['"]"#).unwrap(),
            ],
            min_ratio: 0.3,
        },
        ContentSignature {
            language: "typescript",
            patterns: vec![
                Regex::new(r"(?m)^\s*interface \w+").unwrap(),
                Regex::new(r"(?m)^\s*type \w+ =").unwrap(),
                Regex::new(r":\s*(string|number|boolean)\b").unwrap(),
                Regex::new(r"(?m)^\s*enum \w+").unwrap(),
                Regex::new(r"(?m)^import .* from ").unwrap(),
            ],
            min_ratio: 0.4,
        },
        ContentSignature {
            language: "javascript",
            patterns: vec![
                Regex::new(r"\bfunction\s+\w+\s*\(").unwrap(),
                Regex::new(r"\b(const|let|var)\s+\w+").unwrap(),
                Regex::new(r"=>").unwrap(),
                Regex::new(r"\brequire\s*\(").unwrap(),
                Regex::new(r"\bmodule\.exports\b").unwrap(),
                Regex::new(r"\bconsole\.\w+\(").unwrap(),
            ],
            min_ratio: 0.3,
        },
        ContentSignature {
            language: "shell",
            patterns: vec![
                Regex::new(r"(?m)^\s*(fi|done|esac)\s*$").unwrap(),
                Regex::new(r"(?m)^\s*if \[").unwrap(),
                Regex::new(r"\becho ").unwrap(),
                Regex::new(r"\$\{?\w+\}?").unwrap(),
            ],
            min_ratio: 0.5,
        },
    ]
});

fn from_content(content: &str) -> Option<String> {
    let sample = if content.len() > CONTENT_SAMPLE_BYTES {
        let mut end = CONTENT_SAMPLE_BYTES;
        while !content.is_char_boundary(end) {
            end -= 1;
        }
        &content[..end]
    } else {
        content
    };

    let mut best: Option<(&'static str, f64)> = None;
    for signature in CONTENT_SIGNATURES.iter() {
        let matched = signature
            .patterns
            .iter()
            .filter(|p| p.is_match(sample))
            .count();
        let ratio = matched as f64 / signature.patterns.len() as f64;
        if ratio >= signature.min_ratio {
            // Strictly-greater keeps declaration order as the tie-break
            if best.map_or(true, |(_, best_ratio)| ratio > best_ratio) {
                best = Some((signature.language, ratio));
            }
        }
    }

    best.map(|(language, _)| language.to_string())
}

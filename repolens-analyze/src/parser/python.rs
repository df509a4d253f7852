//! Python structural extraction
//!
//! Regex-driven line scan. Recognizes top-level imports, functions and
//! classes with their indented methods; docstrings immediately following a
//! signature; implicit exports for non-underscore top-level names. Nested
//! definitions and decorators are outside this tier.

use regex::Regex;
use repolens_core::{
    ClassInfo, Export, ExportKind, FunctionInfo, Import, ImportSpecifier, Parameter, ParsedFile,
    Property, SourceLocation,
};
use std::sync::LazyLock;

static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^import\s+(.+)$").unwrap());
static FROM_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^from\s+([\w.]+)\s+import\s+(.*)$").unwrap());
static DEF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)(async\s+)?def\s+(\w+)\s*\(").unwrap());
static CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^class\s+(\w+)\s*(?:\(([^)]*)\))?\s*:").unwrap());

/// Extract the structural summary of one Python source file.
pub fn extract(source: &str) -> ParsedFile {
    let lines: Vec<&str> = source.lines().collect();
    let line_offsets = compute_line_offsets(source);

    let mut output = ParsedFile::default();
    // Index into output.classes receiving subsequent indented methods
    let mut current_class: Option<usize> = None;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let stripped = strip_comment(line);

        if let Some(captures) = FROM_IMPORT_RE.captures(stripped) {
            let module = captures[1].to_string();
            let (names, end_line) = gather_import_names(&captures[2], &lines, i);
            output.imports.push(Import {
                source: module,
                specifiers: parse_import_names(&names),
                is_type_only: false,
            });
            i = end_line + 1;
            continue;
        }

        if let Some(captures) = IMPORT_RE.captures(stripped) {
            // `import a, b as c` carries one entry per module
            for module_spec in captures[1].split(',') {
                let module_spec = module_spec.trim();
                if module_spec.is_empty() {
                    continue;
                }
                let (module, alias) = split_alias(module_spec);
                let specifiers = match alias {
                    Some(alias) => vec![ImportSpecifier {
                        name: module.clone(),
                        alias: Some(alias),
                    }],
                    None => Vec::new(),
                };
                output.imports.push(Import {
                    source: module,
                    specifiers,
                    is_type_only: false,
                });
            }
            i += 1;
            continue;
        }

        if let Some(captures) = DEF_RE.captures(line) {
            let indent = captures[1].len();
            let is_async = captures.get(2).is_some();
            let name = captures[3].to_string();

            let (signature, end_line) = gather_signature(&lines, i);
            let (parameters, return_type) = parse_signature(&signature);
            let docstring = extract_docstring(&lines, end_line + 1);

            let function = FunctionInfo {
                name: name.clone(),
                parameters,
                return_type,
                is_async,
                // Generator detection is not part of this tier
                is_generator: false,
                location: SourceLocation {
                    start_offset: line_offsets[i],
                    end_offset: line_offsets[end_line] + lines[end_line].len(),
                    line: Some(i as u32 + 1),
                    column: Some(indent as u32 + 1),
                },
                docstring,
                modifiers: Vec::new(),
            };

            if indent == 0 {
                if !name.starts_with('_') {
                    output.exports.push(Export {
                        name: name.clone(),
                        kind: ExportKind::Named,
                        source: None,
                    });
                }
                output.functions.push(function);
            } else if let Some(class_index) = current_class {
                let mut method = function;
                method.modifiers = method_modifiers(&name);
                output.classes[class_index].methods.push(method);
            }

            i = end_line + 1;
            continue;
        }

        if let Some(captures) = CLASS_RE.captures(line) {
            let name = captures[1].to_string();
            let bases: Vec<String> = captures
                .get(2)
                .map(|m| {
                    m.as_str()
                        .split(',')
                        .map(|b| b.trim().to_string())
                        .filter(|b| !b.is_empty())
                        .collect()
                })
                .unwrap_or_default();

            let docstring = extract_docstring(&lines, i + 1);

            if !name.starts_with('_') {
                output.exports.push(Export {
                    name: name.clone(),
                    kind: ExportKind::Named,
                    source: None,
                });
            }

            output.classes.push(ClassInfo {
                name,
                methods: Vec::new(),
                properties: Vec::<Property>::new(),
                super_class: bases.first().cloned(),
                decorators: Vec::new(),
                location: SourceLocation {
                    start_offset: line_offsets[i],
                    end_offset: line_offsets[i] + line.len(),
                    line: Some(i as u32 + 1),
                    column: Some(1),
                },
                docstring,
            });
            current_class = Some(output.classes.len() - 1);
            i += 1;
            continue;
        }

        i += 1;
    }

    output
}

fn compute_line_offsets(source: &str) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut offset = 0;
    for line in source.lines() {
        offsets.push(offset);
        offset += line.len() + 1;
    }
    if offsets.is_empty() {
        offsets.push(0);
    }
    offsets
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(index) => line[..index].trim_end(),
        None => line,
    }
}

fn split_alias(spec: &str) -> (String, Option<String>) {
    match spec.split_once(" as ") {
        Some((name, alias)) => (name.trim().to_string(), Some(alias.trim().to_string())),
        None => (spec.trim().to_string(), None),
    }
}

/// Collect the names of a from-import, tolerating a parenthesized list that
/// spans multiple lines.
fn gather_import_names(first: &str, lines: &[&str], start_line: usize) -> (String, usize) {
    let first = strip_comment(first);
    if !first.contains('(') || first.contains(')') {
        return (first.replace(['(', ')'], ""), start_line);
    }

    let mut names = first.replace('(', "");
    let mut line_index = start_line;
    while line_index + 1 < lines.len() {
        line_index += 1;
        let continuation = strip_comment(lines[line_index]);
        if let Some(end) = continuation.find(')') {
            names.push(' ');
            names.push_str(&continuation[..end]);
            return (names, line_index);
        }
        names.push(' ');
        names.push_str(continuation);
    }
    (names, line_index)
}

fn parse_import_names(names: &str) -> Vec<ImportSpecifier> {
    names
        .split(',')
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .map(|n| {
            let (name, alias) = split_alias(n);
            ImportSpecifier { name, alias }
        })
        .collect()
}

/// Accumulate a def signature until its parameter list closes.
fn gather_signature(lines: &[&str], start_line: usize) -> (String, usize) {
    let mut signature = String::new();
    let mut depth = 0i32;
    let mut seen_paren = false;
    let mut line_index = start_line;

    loop {
        let line = strip_comment(lines[line_index]);
        if !signature.is_empty() {
            signature.push(' ');
        }
        signature.push_str(line.trim());

        for ch in line.chars() {
            match ch {
                '(' => {
                    depth += 1;
                    seen_paren = true;
                }
                ')' => depth -= 1,
                _ => {}
            }
        }

        if (seen_paren && depth <= 0) || line_index + 1 >= lines.len() {
            return (signature, line_index);
        }
        line_index += 1;
    }
}

/// Parse `def name(args) -> ret:` into parameters and a return type.
fn parse_signature(signature: &str) -> (Vec<Parameter>, Option<String>) {
    let open = match signature.find('(') {
        Some(index) => index,
        None => return (Vec::new(), None),
    };
    let close = match find_matching_paren(signature, open) {
        Some(index) => index,
        None => signature.len(),
    };

    let args = &signature[open + 1..close.min(signature.len())];
    let parameters = split_top_level(args, ',')
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .map(|a| parse_parameter(&a))
        .collect();

    let rest = signature.get(close + 1..).unwrap_or("");
    let return_type = rest.split_once("->").map(|(_, r)| {
        r.trim().trim_end_matches(':').trim().to_string()
    });

    (parameters, return_type.filter(|r| !r.is_empty()))
}

fn find_matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (index, ch) in text.char_indices().skip(open) {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (index, ch) in text.char_indices() {
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            c if c == separator && depth == 0 => {
                parts.push(&text[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Parse `name: Type = default`, `*args`, `**kwargs`.
fn parse_parameter(arg: &str) -> Parameter {
    let without_default = split_top_level(arg, '=')[0].trim();
    let (name, type_annotation) = match without_default.split_once(':') {
        Some((name, annotation)) => (
            name.trim().to_string(),
            Some(annotation.trim().to_string()).filter(|t| !t.is_empty()),
        ),
        None => (without_default.to_string(), None),
    };
    Parameter {
        name,
        type_annotation,
    }
}

/// Docstring starting on the line immediately following a signature.
fn extract_docstring(lines: &[&str], start_line: usize) -> Option<String> {
    let line = lines.get(start_line)?.trim();
    let delimiter = if line.starts_with("\"\"\"") {
        "\"\"\""
    } else if line.starts_with("'''") {
        "'''"
    } else {
        return None;
    };

    let after = &line[delimiter.len()..];
    if let Some(end) = after.find(delimiter) {
        let doc = after[..end].trim().to_string();
        return if doc.is_empty() { None } else { Some(doc) };
    }

    let mut collected = vec![after.trim_end().to_string()];
    let mut line_index = start_line;
    while line_index + 1 < lines.len() {
        line_index += 1;
        let continuation = lines[line_index];
        if let Some(end) = continuation.find(delimiter) {
            collected.push(continuation[..end].trim_end().to_string());
            break;
        }
        collected.push(continuation.trim_end().to_string());
    }

    let doc = collected.join("\n").trim().to_string();
    if doc.is_empty() {
        None
    } else {
        Some(doc)
    }
}

/// Leading underscores reflect the Python visibility convention.
fn method_modifiers(name: &str) -> Vec<String> {
    if name.starts_with("__") {
        vec!["private".to_string()]
    } else if name.starts_with('_') {
        vec!["protected".to_string()]
    } else {
        Vec::new()
    }
}

//! TypeScript / JavaScript structural extraction
//!
//! AST-based extraction on tree-sitter. The walk dispatches on node kinds;
//! unknown kinds are skipped so grammar drift degrades gracefully instead
//! of failing a parse.

use repolens_core::{
    ClassInfo, ErrorContext, Export, ExportKind, FunctionInfo, Import, ImportSpecifier, Parameter,
    ParsedFile, Property, RepolensError, RepolensResult, SourceLocation,
};
use tree_sitter::{Node, Parser};

/// Extract the structural summary of one TS/JS source file.
pub fn extract(source: &str, language: &str) -> RepolensResult<ParsedFile> {
    let mut parser = Parser::new();
    let grammar = if language == "typescript" {
        tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
    } else {
        tree_sitter_javascript::LANGUAGE.into()
    };
    parser
        .set_language(&grammar)
        .map_err(|e| RepolensError::Analyze {
            message: format!("Failed to load {} grammar: {}", language, e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("typescript_parser").with_operation("set_language"),
        })?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| RepolensError::Analyze {
            message: "Parser produced no tree".to_string(),
            source: None,
            context: ErrorContext::new("typescript_parser").with_operation("parse"),
        })?;

    let mut output = ParsedFile::default();
    let root = tree.root_node();
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        handle_top_level(child, source, &mut output);
    }

    Ok(output)
}

fn handle_top_level(node: Node<'_>, source: &str, output: &mut ParsedFile) {
    match node.kind() {
        "import_statement" => {
            if let Some(import) = handle_import(node, source) {
                output.imports.push(import);
            }
        }
        "export_statement" => handle_export(node, source, output),
        "function_declaration" | "generator_function_declaration" => {
            output
                .functions
                .push(function_from_declaration(node, node, source));
        }
        "lexical_declaration" | "variable_declaration" => {
            collect_declarator_functions(node, source, &mut output.functions);
        }
        "class_declaration" | "abstract_class_declaration" => {
            output.classes.push(class_from_declaration(node, source));
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Imports
// ---------------------------------------------------------------------------

fn handle_import(node: Node<'_>, source: &str) -> Option<Import> {
    let source_module = node
        .child_by_field_name("source")
        .map(|n| unquote(&node_text(n, source)))?;

    let is_type_only = has_keyword(node, "type");

    let mut specifiers = Vec::new();
    if let Some(clause) = named_child_of_kind(node, "import_clause") {
        let mut cursor = clause.walk();
        for child in clause.named_children(&mut cursor) {
            match child.kind() {
                "identifier" => {
                    // Default import binds the module default to a local name
                    specifiers.push(ImportSpecifier {
                        name: "default".to_string(),
                        alias: Some(node_text(child, source)),
                    });
                }
                "namespace_import" => {
                    if let Some(local) = named_child_of_kind(child, "identifier") {
                        specifiers.push(ImportSpecifier {
                            name: "*".to_string(),
                            alias: Some(node_text(local, source)),
                        });
                    }
                }
                "named_imports" => {
                    let mut inner = child.walk();
                    for spec in child.named_children(&mut inner) {
                        if spec.kind() != "import_specifier" {
                            continue;
                        }
                        let Some(name_node) = spec.child_by_field_name("name") else {
                            continue;
                        };
                        let name = node_text(name_node, source);
                        let alias = spec
                            .child_by_field_name("alias")
                            .map(|n| node_text(n, source))
                            .filter(|alias| *alias != name);
                        specifiers.push(ImportSpecifier { name, alias });
                    }
                }
                _ => {}
            }
        }
    }

    Some(Import {
        source: source_module,
        specifiers,
        is_type_only,
    })
}

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

fn handle_export(node: Node<'_>, source: &str, output: &mut ParsedFile) {
    let export_source = node
        .child_by_field_name("source")
        .map(|n| unquote(&node_text(n, source)));

    // export * from "module"
    if has_keyword(node, "*") || named_child_of_kind(node, "namespace_export").is_some() {
        output.exports.push(Export {
            name: "*".to_string(),
            kind: ExportKind::All,
            source: export_source,
        });
        return;
    }

    // export default <declaration | expression>
    if has_keyword(node, "default") {
        let name = node
            .child_by_field_name("declaration")
            .and_then(|decl| decl.child_by_field_name("name"))
            .map(|n| node_text(n, source))
            .unwrap_or_else(|| "default".to_string());

        if let Some(decl) = node.child_by_field_name("declaration") {
            match decl.kind() {
                "function_declaration" | "generator_function_declaration" => {
                    output
                        .functions
                        .push(function_from_declaration(decl, node, source));
                }
                "class_declaration" | "abstract_class_declaration" => {
                    output.classes.push(class_from_declaration(decl, source));
                }
                _ => {}
            }
        }

        output.exports.push(Export {
            name,
            kind: ExportKind::Default,
            source: export_source,
        });
        return;
    }

    // export { a, b as c } [from "module"]
    if let Some(clause) = named_child_of_kind(node, "export_clause") {
        let mut cursor = clause.walk();
        for spec in clause.named_children(&mut cursor) {
            if spec.kind() != "export_specifier" {
                continue;
            }
            let Some(name_node) = spec.child_by_field_name("name") else {
                continue;
            };
            let exported = spec
                .child_by_field_name("alias")
                .map(|n| node_text(n, source))
                .unwrap_or_else(|| node_text(name_node, source));
            output.exports.push(Export {
                name: exported,
                kind: ExportKind::Named,
                source: export_source.clone(),
            });
        }
        return;
    }

    // export <declaration>
    if let Some(decl) = node.child_by_field_name("declaration") {
        match decl.kind() {
            "function_declaration" | "generator_function_declaration" => {
                let function = function_from_declaration(decl, node, source);
                output.exports.push(Export {
                    name: function.name.clone(),
                    kind: ExportKind::Named,
                    source: None,
                });
                output.functions.push(function);
            }
            "class_declaration" | "abstract_class_declaration" => {
                let class = class_from_declaration(decl, source);
                output.exports.push(Export {
                    name: class.name.clone(),
                    kind: ExportKind::Named,
                    source: None,
                });
                output.classes.push(class);
            }
            "lexical_declaration" | "variable_declaration" => {
                let mut cursor = decl.walk();
                for declarator in decl.named_children(&mut cursor) {
                    if declarator.kind() != "variable_declarator" {
                        continue;
                    }
                    if let Some(name_node) = declarator.child_by_field_name("name") {
                        output.exports.push(Export {
                            name: node_text(name_node, source),
                            kind: ExportKind::Named,
                            source: None,
                        });
                    }
                }
                collect_declarator_functions(decl, source, &mut output.functions);
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

fn function_from_declaration(node: Node<'_>, doc_anchor: Node<'_>, source: &str) -> FunctionInfo {
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(n, source))
        .unwrap_or_else(|| "anonymous".to_string());

    FunctionInfo {
        name,
        parameters: node
            .child_by_field_name("parameters")
            .map(|p| parse_parameters(p, source))
            .unwrap_or_default(),
        return_type: node
            .child_by_field_name("return_type")
            .and_then(|a| render_type_annotation(a, source)),
        is_async: has_keyword(node, "async"),
        is_generator: node.kind() == "generator_function_declaration" || has_keyword(node, "*"),
        location: location_of(node),
        docstring: docstring_for(doc_anchor, source),
        modifiers: Vec::new(),
    }
}

/// Variable declarators initialized to arrow or function expressions.
fn collect_declarator_functions(node: Node<'_>, source: &str, functions: &mut Vec<FunctionInfo>) {
    let mut cursor = node.walk();
    for declarator in node.named_children(&mut cursor) {
        if declarator.kind() != "variable_declarator" {
            continue;
        }
        let Some(value) = declarator.child_by_field_name("value") else {
            continue;
        };
        if !matches!(
            value.kind(),
            "arrow_function" | "function_expression" | "generator_function"
        ) {
            continue;
        }

        let name = declarator
            .child_by_field_name("name")
            .map(|n| node_text(n, source))
            .unwrap_or_else(|| "anonymous".to_string());

        let parameters = value
            .child_by_field_name("parameters")
            .map(|p| parse_parameters(p, source))
            .or_else(|| {
                // Single-identifier arrow functions carry a bare parameter
                value.child_by_field_name("parameter").map(|p| {
                    vec![Parameter {
                        name: node_text(p, source),
                        type_annotation: None,
                    }]
                })
            })
            .unwrap_or_default();

        functions.push(FunctionInfo {
            name,
            parameters,
            return_type: value
                .child_by_field_name("return_type")
                .and_then(|a| render_type_annotation(a, source)),
            is_async: has_keyword(value, "async"),
            is_generator: value.kind() == "generator_function" || has_keyword(value, "*"),
            location: location_of(value),
            docstring: docstring_for(node, source),
            modifiers: Vec::new(),
        });
    }
}

fn parse_parameters(params: Node<'_>, source: &str) -> Vec<Parameter> {
    let mut out = Vec::new();
    let mut cursor = params.walk();
    for child in params.named_children(&mut cursor) {
        match child.kind() {
            "required_parameter" | "optional_parameter" => {
                let name = child
                    .child_by_field_name("pattern")
                    .map(|n| node_text(n, source))
                    .unwrap_or_default();
                if name.is_empty() || name == "this" {
                    continue;
                }
                out.push(Parameter {
                    name,
                    type_annotation: child
                        .child_by_field_name("type")
                        .and_then(|a| render_type_annotation(a, source)),
                });
            }
            "identifier" => out.push(Parameter {
                name: node_text(child, source),
                type_annotation: None,
            }),
            "assignment_pattern" => {
                if let Some(left) = child.child_by_field_name("left") {
                    out.push(Parameter {
                        name: node_text(left, source),
                        type_annotation: None,
                    });
                }
            }
            "rest_pattern" | "object_pattern" | "array_pattern" => out.push(Parameter {
                name: node_text(child, source),
                type_annotation: None,
            }),
            _ => {}
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Classes
// ---------------------------------------------------------------------------

fn class_from_declaration(node: Node<'_>, source: &str) -> ClassInfo {
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(n, source))
        .unwrap_or_else(|| "anonymous".to_string());

    let mut decorators = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "decorator" {
            decorators.push(decorator_name(child, source));
        }
    }

    let mut methods = Vec::new();
    let mut properties = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            match member.kind() {
                "method_definition" => methods.push(method_from_definition(member, source, false)),
                "abstract_method_signature" => {
                    methods.push(method_from_definition(member, source, true))
                }
                "public_field_definition" | "field_definition" => {
                    if let Some(name_node) = member.child_by_field_name("name") {
                        properties.push(Property {
                            name: node_text(name_node, source),
                            type_annotation: member
                                .child_by_field_name("type")
                                .and_then(|a| render_type_annotation(a, source)),
                        });
                    }
                }
                _ => {}
            }
        }
    }

    ClassInfo {
        name,
        methods,
        properties,
        super_class: find_superclass(node, source),
        decorators,
        location: location_of(node),
        docstring: docstring_for(node, source),
    }
}

fn find_superclass(node: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() != "class_heritage" {
            continue;
        }
        // TypeScript wraps the base in an extends_clause; JavaScript puts
        // the expression directly inside the heritage node.
        let mut inner = child.walk();
        for clause in child.named_children(&mut inner) {
            if clause.kind() == "extends_clause" {
                let mut values = clause.walk();
                return clause
                    .named_children(&mut values)
                    .next()
                    .map(|n| node_text(n, source));
            }
        }
        // JavaScript puts the base expression directly in the heritage;
        // skip TypeScript clause nodes so implements-only classes have none
        let mut values = child.walk();
        return child
            .named_children(&mut values)
            .find(|n| !n.kind().ends_with("_clause"))
            .map(|n| node_text(n, source));
    }
    None
}

fn method_from_definition(node: Node<'_>, source: &str, is_abstract: bool) -> FunctionInfo {
    let mut modifiers = Vec::new();
    let mut is_async = false;
    let mut is_generator = false;

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            "accessibility_modifier" => modifiers.push(node_text(child, source)),
            "static" => modifiers.push("static".to_string()),
            "readonly" => modifiers.push("readonly".to_string()),
            "abstract" => modifiers.push("abstract".to_string()),
            "async" => {
                modifiers.push("async".to_string());
                is_async = true;
            }
            "*" => is_generator = true,
            _ => {}
        }
    }
    if is_abstract && !modifiers.iter().any(|m| m == "abstract") {
        modifiers.push("abstract".to_string());
    }

    FunctionInfo {
        name: node
            .child_by_field_name("name")
            .map(|n| node_text(n, source))
            .unwrap_or_else(|| "anonymous".to_string()),
        parameters: node
            .child_by_field_name("parameters")
            .map(|p| parse_parameters(p, source))
            .unwrap_or_default(),
        return_type: node
            .child_by_field_name("return_type")
            .and_then(|a| render_type_annotation(a, source)),
        is_async,
        is_generator,
        location: location_of(node),
        docstring: docstring_for(node, source),
        modifiers,
    }
}

fn decorator_name(node: Node<'_>, source: &str) -> String {
    let mut cursor = node.walk();
    if let Some(expr) = node.named_children(&mut cursor).next() {
        if expr.kind() == "call_expression" {
            if let Some(function) = expr.child_by_field_name("function") {
                return node_text(function, source);
            }
        }
        return node_text(expr, source);
    }
    node_text(node, source).trim_start_matches('@').to_string()
}

// ---------------------------------------------------------------------------
// Type rendering
// ---------------------------------------------------------------------------

fn render_type_annotation(annotation: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = annotation.walk();
    let result = annotation
        .named_children(&mut cursor)
        .next()
        .map(|t| render_type(t, source));
    result
}

/// String-render a type node.
///
/// Primitives keep their spelling, arrays become `T[]`, unions and
/// intersections join their members, references keep their qualified name,
/// and anything unrecognized collapses to `any`.
fn render_type(node: Node<'_>, source: &str) -> String {
    match node.kind() {
        "predefined_type" | "type_identifier" | "nested_type_identifier" | "literal_type"
        | "generic_type" => node_text(node, source),
        "array_type" => {
            let mut cursor = node.walk();
            let result = match node.named_children(&mut cursor).next() {
                Some(element) => format!("{}[]", render_type(element, source)),
                None => "any[]".to_string(),
            };
            result
        }
        "union_type" => join_type_members(node, source, " | "),
        "intersection_type" => join_type_members(node, source, " & "),
        "parenthesized_type" => {
            let mut cursor = node.walk();
            let result = match node.named_children(&mut cursor).next() {
                Some(inner) => render_type(inner, source),
                None => "any".to_string(),
            };
            result
        }
        _ => "any".to_string(),
    }
}

fn join_type_members(node: Node<'_>, source: &str, separator: &str) -> String {
    let mut cursor = node.walk();
    let members: Vec<String> = node
        .named_children(&mut cursor)
        .map(|m| render_type(m, source))
        .collect();
    members.join(separator)
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn node_text(node: Node<'_>, source: &str) -> String {
    source[node.byte_range()].to_string()
}

fn unquote(raw: &str) -> String {
    raw.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}

fn has_keyword(node: Node<'_>, keyword: &str) -> bool {
    let mut cursor = node.walk();
    let result = node.children(&mut cursor).any(|c| c.kind() == keyword);
    result
}

fn named_child_of_kind<'a>(node: Node<'a>, kind: &str) -> Option<Node<'a>> {
    let mut cursor = node.walk();
    let result = node.named_children(&mut cursor).find(|c| c.kind() == kind);
    result
}

fn location_of(node: Node<'_>) -> SourceLocation {
    let start = node.start_position();
    SourceLocation {
        start_offset: node.start_byte(),
        end_offset: node.end_byte(),
        line: Some(start.row as u32 + 1),
        column: Some(start.column as u32 + 1),
    }
}

/// Leading `/** ... */` comment of a statement, cleaned of its markers.
fn docstring_for(node: Node<'_>, source: &str) -> Option<String> {
    let prev = node.prev_named_sibling()?;
    if prev.kind() != "comment" {
        return None;
    }
    let raw = node_text(prev, source);
    if !raw.starts_with("/**") {
        return None;
    }

    let body = raw
        .trim_start_matches("/**")
        .trim_end_matches("*/")
        .lines()
        .map(|line| line.trim().trim_start_matches('*').trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if body.is_empty() {
        None
    } else {
        Some(body)
    }
}

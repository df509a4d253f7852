use repolens_analyze::parse_source;
use repolens_core::ExportKind;

#[test]
fn imports_with_default_namespace_and_named_specifiers() {
    let source = r#"
import React from "react";
import * as path from "path";
import { readFile, writeFile as write } from "fs/promises";
import type { Config } from "./config";
import "./side-effect";
"#;
    let parsed = parse_source("src/app.ts", "typescript", source).unwrap();
    assert_eq!(parsed.imports.len(), 5);

    let default_import = &parsed.imports[0];
    assert_eq!(default_import.source, "react");
    assert_eq!(default_import.specifiers[0].name, "default");
    assert_eq!(default_import.specifiers[0].alias.as_deref(), Some("React"));

    let namespace = &parsed.imports[1];
    assert_eq!(namespace.specifiers[0].name, "*");
    assert_eq!(namespace.specifiers[0].alias.as_deref(), Some("path"));

    let named = &parsed.imports[2];
    assert_eq!(named.specifiers.len(), 2);
    assert_eq!(named.specifiers[0].name, "readFile");
    assert_eq!(named.specifiers[0].alias, None);
    assert_eq!(named.specifiers[1].name, "writeFile");
    assert_eq!(named.specifiers[1].alias.as_deref(), Some("write"));

    let type_only = &parsed.imports[3];
    assert!(type_only.is_type_only);
    assert_eq!(type_only.source, "./config");

    let side_effect = &parsed.imports[4];
    assert_eq!(side_effect.source, "./side-effect");
    assert!(side_effect.specifiers.is_empty());
}

#[test]
fn export_forms() {
    let source = r#"
export default function main() {}
export * from "./utils";
export { helper, internal as external } from "./helpers";
export const answer = 42;
export function compute(x: number): number { return x; }
export class Engine {}
"#;
    let parsed = parse_source("src/index.ts", "typescript", source).unwrap();

    let names: Vec<(&str, ExportKind)> = parsed
        .exports
        .iter()
        .map(|e| (e.name.as_str(), e.kind))
        .collect();

    assert!(names.contains(&("main", ExportKind::Default)));
    assert!(names.contains(&("*", ExportKind::All)));
    assert!(names.contains(&("helper", ExportKind::Named)));
    assert!(names.contains(&("external", ExportKind::Named)));
    assert!(names.contains(&("answer", ExportKind::Named)));
    assert!(names.contains(&("compute", ExportKind::Named)));
    assert!(names.contains(&("Engine", ExportKind::Named)));

    let star = parsed.exports.iter().find(|e| e.name == "*").unwrap();
    assert_eq!(star.source.as_deref(), Some("./utils"));

    let re_export = parsed.exports.iter().find(|e| e.name == "helper").unwrap();
    assert_eq!(re_export.source.as_deref(), Some("./helpers"));
}

#[test]
fn functions_and_arrow_declarators() {
    let source = r#"
/** Adds two numbers. */
function add(a: number, b: number): number {
    return a + b;
}

async function load(url: string): Promise<string> {
    return fetch(url);
}

function* walk(items: string[]): void {}

const double = (x: number): number => x * 2;
const shout = async (message) => message.toUpperCase();
"#;
    let parsed = parse_source("src/math.ts", "typescript", source).unwrap();
    assert_eq!(parsed.functions.len(), 5);

    let add = parsed.functions.iter().find(|f| f.name == "add").unwrap();
    assert_eq!(add.parameters.len(), 2);
    assert_eq!(add.parameters[0].name, "a");
    assert_eq!(add.parameters[0].type_annotation.as_deref(), Some("number"));
    assert_eq!(add.return_type.as_deref(), Some("number"));
    assert_eq!(add.docstring.as_deref(), Some("Adds two numbers."));
    assert!(!add.is_async);
    assert!(!add.is_generator);

    let load = parsed.functions.iter().find(|f| f.name == "load").unwrap();
    assert!(load.is_async);
    assert_eq!(load.return_type.as_deref(), Some("Promise<string>"));

    let walk = parsed.functions.iter().find(|f| f.name == "walk").unwrap();
    assert!(walk.is_generator);
    assert_eq!(walk.parameters[0].type_annotation.as_deref(), Some("string[]"));

    let double = parsed.functions.iter().find(|f| f.name == "double").unwrap();
    assert_eq!(double.return_type.as_deref(), Some("number"));

    let shout = parsed.functions.iter().find(|f| f.name == "shout").unwrap();
    assert!(shout.is_async);
    assert_eq!(shout.parameters.len(), 1);
}

#[test]
fn type_rendering_for_unions_and_fallback() {
    let source = r#"
function pick(id: string | number, flags: A & B, blob: { a: number }): void {}
"#;
    let parsed = parse_source("src/pick.ts", "typescript", source).unwrap();
    let pick = &parsed.functions[0];
    assert_eq!(
        pick.parameters[0].type_annotation.as_deref(),
        Some("string | number")
    );
    assert_eq!(pick.parameters[1].type_annotation.as_deref(), Some("A & B"));
    // Object literal types collapse to any
    assert_eq!(pick.parameters[2].type_annotation.as_deref(), Some("any"));
}

#[test]
fn classes_with_methods_properties_and_decorators() {
    let source = r#"
@injectable()
class UserService extends BaseService {
    private cache: Map<string, string>;
    readonly limit: number;

    constructor(private repo: UserRepo) {
        super();
    }

    async findUser(id: string): Promise<string> {
        return this.repo.get(id);
    }

    static create(): UserService {
        return new UserService();
    }

    protected *scan(): void {}
}
"#;
    let parsed = parse_source("src/service.ts", "typescript", source).unwrap();
    assert_eq!(parsed.classes.len(), 1);

    let class = &parsed.classes[0];
    assert_eq!(class.name, "UserService");
    assert_eq!(class.super_class.as_deref(), Some("BaseService"));
    assert_eq!(class.decorators, vec!["injectable"]);

    let properties: Vec<&str> = class.properties.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(properties, vec!["cache", "limit"]);

    let method_names: Vec<&str> = class.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(method_names, vec!["constructor", "findUser", "create", "scan"]);

    let find_user = class.methods.iter().find(|m| m.name == "findUser").unwrap();
    assert!(find_user.is_async);
    assert!(find_user.modifiers.contains(&"async".to_string()));

    let create = class.methods.iter().find(|m| m.name == "create").unwrap();
    assert!(create.modifiers.contains(&"static".to_string()));

    let scan = class.methods.iter().find(|m| m.name == "scan").unwrap();
    assert!(scan.is_generator);
    assert!(scan.modifiers.contains(&"protected".to_string()));
}

#[test]
fn javascript_grammar_handles_commonjs_flavour() {
    let source = r#"
const fs = require("fs");

function readAll(dir) {
    return fs.readdirSync(dir);
}

class Watcher {
    constructor(root) {
        this.root = root;
    }

    watch() {}
}
"#;
    let parsed = parse_source("lib/watch.js", "javascript", source).unwrap();
    assert_eq!(parsed.functions.iter().filter(|f| f.name == "readAll").count(), 1);
    assert_eq!(parsed.classes.len(), 1);
    assert_eq!(parsed.classes[0].methods.len(), 2);
    // require() is not an ES import
    assert!(parsed.imports.is_empty());
}

#[test]
fn malformed_source_degrades_without_failing() {
    // tree-sitter produces a tree with error nodes; extraction skips them
    let parsed = parse_source("bad.ts", "typescript", "function ] {{{").unwrap();
    assert!(parsed.classes.is_empty());
}

#[test]
fn locations_are_byte_offsets() {
    let source = "function tiny() {}\n";
    let parsed = parse_source("t.ts", "typescript", source).unwrap();
    let tiny = &parsed.functions[0];
    assert_eq!(tiny.location.start_offset, 0);
    assert_eq!(tiny.location.end_offset, source.trim_end().len());
    assert_eq!(tiny.location.line, Some(1));
}

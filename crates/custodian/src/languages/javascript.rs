//! JavaScript entity and reference extraction.
//!
//! Shares its tree walk with [`crate::languages::typescript`] via
//! [`extract_js_like`], since the two grammars agree on the node kinds this pipeline
//! cares about (function/class/method declarations, imports, exports, calls). Grounded
//! on `extractor.py`'s JS/TS branch and `reference_tracker.py::_extract_js_references`.

use std::path::Path;

use tree_sitter::Node;

use super::common::{node_text, ExtractedReference, ExtractedReferenceKind, ExtractionResult};
use super::LanguageSupport;
use crate::types::{Entity, EntityKind, Import};

pub struct JavaScriptSupport;

impl LanguageSupport for JavaScriptSupport {
    fn tree_sitter_language(&self, _jsx: bool) -> tree_sitter::Language {
        // tree-sitter-javascript parses JSX unconditionally; there is no separate grammar.
        tree_sitter_javascript::LANGUAGE.into()
    }

    fn extract(&self, tree: &tree_sitter::Tree, source: &[u8], file_path: &Path) -> ExtractionResult {
        extract_js_like(tree, source, file_path)
    }
}

/// Shared JS/TS walk. `parent_class` threading and the nested-function-loses-context
/// rule mirror `python.rs`'s walker exactly; only the grammar's node kinds differ.
pub(super) fn extract_js_like(tree: &tree_sitter::Tree, source: &[u8], file_path: &Path) -> ExtractionResult {
    let mut ctx = JsWalker {
        source,
        file_path: file_path.to_path_buf(),
        result: ExtractionResult::default(),
    };
    let stem_is_init = file_path
        .file_stem()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n == "index");
    ctx.result.is_package_init = stem_is_init;
    ctx.walk(tree.root_node(), None);
    ctx.result
}

struct JsWalker<'a> {
    source: &'a [u8],
    file_path: std::path::PathBuf,
    result: ExtractionResult,
}

impl<'a> JsWalker<'a> {
    fn text(&self, node: Node<'_>) -> &'a str {
        node_text(node, self.source)
    }

    fn line(&self, node: Node<'_>) -> u32 {
        node.start_position().row as u32 + 1
    }

    fn walk(&mut self, node: Node<'_>, parent_class: Option<&str>) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk_stmt(child, parent_class);
        }
    }

    fn walk_stmt(&mut self, node: Node<'_>, parent_class: Option<&str>) {
        match node.kind() {
            "class_declaration" | "class" => self.handle_class(node, parent_class),
            "method_definition" => self.handle_method(node, parent_class),
            "function_declaration" | "generator_function_declaration" => self.handle_function(node, parent_class),
            "import_statement" => self.handle_import(node),
            "export_statement" => self.handle_export(node, parent_class),
            "call_expression" => self.handle_call(node, parent_class),
            "variable_declarator" => self.handle_variable_declarator(node, parent_class),
            "identifier" => self.handle_identifier_usage(node, parent_class),
            _ => {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    self.walk_stmt(child, parent_class);
                }
            }
        }
    }

    fn handle_class(&mut self, node: Node<'_>, parent_class: Option<&str>) {
        let Some(name_node) = node.child_by_field_name("name") else { return };
        let class_name = self.text(name_node).to_string();

        let mut base_classes = Vec::new();
        if let Some(heritage) = node.child_by_field_name("superclass") {
            if let Some(name) = base_identifier_name(heritage, self.source) {
                base_classes.push(name);
            }
        }

        self.result.entities.push(Entity {
            name: class_name.clone(),
            kind: EntityKind::Class,
            full_text: self.text(node).to_string(),
            file_path: self.file_path.clone(),
            start_line: self.line(node),
            end_line: node.end_position().row as u32 + 1,
            qualified_name: class_name.clone(),
            parent_class: parent_class.map(String::from),
            base_classes,
            decorators: Vec::new(),
            protected_by: String::new(),
        });

        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body, Some(&class_name));
        }
    }

    fn handle_method(&mut self, node: Node<'_>, parent_class: Option<&str>) {
        let Some(name_node) = node.child_by_field_name("name") else { return };
        let method_name = self.text(name_node).to_string();
        let qualified_name = match parent_class {
            Some(cls) => format!("{cls}.{method_name}"),
            None => method_name.clone(),
        };

        self.result.entities.push(Entity {
            name: method_name,
            kind: EntityKind::Method,
            full_text: self.text(node).to_string(),
            file_path: self.file_path.clone(),
            start_line: self.line(node),
            end_line: node.end_position().row as u32 + 1,
            qualified_name,
            parent_class: parent_class.map(String::from),
            base_classes: Vec::new(),
            decorators: Vec::new(),
            protected_by: String::new(),
        });

        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body, None);
        }
    }

    fn handle_function(&mut self, node: Node<'_>, parent_class: Option<&str>) {
        let Some(name_node) = node.child_by_field_name("name") else { return };
        let fn_name = self.text(name_node).to_string();

        self.result.entities.push(Entity {
            name: fn_name.clone(),
            kind: EntityKind::Function,
            full_text: self.text(node).to_string(),
            file_path: self.file_path.clone(),
            start_line: self.line(node),
            end_line: node.end_position().row as u32 + 1,
            qualified_name: fn_name,
            parent_class: None,
            base_classes: Vec::new(),
            decorators: Vec::new(),
            protected_by: String::new(),
        });

        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body, None);
        }
        let _ = parent_class;
    }

    /// `const f = () => {...}` / `const f = function () {...}`: a function bound by a
    /// variable declarator is recorded as a `Function` entity named after the binding.
    fn handle_variable_declarator(&mut self, node: Node<'_>, parent_class: Option<&str>) {
        let Some(name_node) = node.child_by_field_name("name") else { return };
        let Some(value_node) = node.child_by_field_name("value") else { return };
        if !matches!(value_node.kind(), "arrow_function" | "function_expression" | "function") {
            if name_node.kind() == "identifier" {
                self.walk_stmt(value_node, parent_class);
            }
            return;
        }
        if name_node.kind() != "identifier" {
            return;
        }
        let fn_name = self.text(name_node).to_string();
        self.result.entities.push(Entity {
            name: fn_name.clone(),
            kind: EntityKind::Function,
            full_text: self.text(node).to_string(),
            file_path: self.file_path.clone(),
            start_line: self.line(node),
            end_line: node.end_position().row as u32 + 1,
            qualified_name: fn_name,
            parent_class: None,
            base_classes: Vec::new(),
            decorators: Vec::new(),
            protected_by: String::new(),
        });
        if let Some(body) = value_node.child_by_field_name("body") {
            self.walk(body, None);
        }
    }

    fn handle_import(&mut self, node: Node<'_>) {
        let Some(source_node) = node.child_by_field_name("source") else { return };
        let module = strip_quotes(self.text(source_node));
        let is_relative = module.starts_with('.');
        let line = self.line(node);

        let mut names = Vec::new();
        if let Some(clause) = node.child_by_field_name("import_clause") {
            collect_import_names(clause, self.source, &mut names);
        }

        self.result.imports.push(Import {
            module: module.clone(),
            names: names.clone(),
            is_relative,
            line_number: line,
            file_path: self.file_path.clone(),
        });

        for name in names {
            self.result.references.push(ExtractedReference {
                symbol_name: name,
                line_number: line,
                kind: ExtractedReferenceKind::Import,
                class_context: None,
            });
        }
    }

    fn handle_export(&mut self, node: Node<'_>, parent_class: Option<&str>) {
        // Export shape protection happens in heuristics.rs (it needs library_mode);
        // here we still need to walk into the exported declaration so its entities
        // and inner references get extracted.
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk_stmt(child, parent_class);
        }
    }

    fn handle_call(&mut self, node: Node<'_>, parent_class: Option<&str>) {
        let Some(func) = node.child_by_field_name("function") else { return };
        let line = self.line(node);

        match func.kind() {
            "identifier" => {
                let name = self.text(func).to_string();
                let kind = if name.chars().next().is_some_and(char::is_uppercase) {
                    ExtractedReferenceKind::Instantiation
                } else {
                    ExtractedReferenceKind::Call
                };
                self.result.references.push(ExtractedReference {
                    symbol_name: name,
                    line_number: line,
                    kind,
                    class_context: parent_class.map(String::from),
                });
            }
            "member_expression" => {
                if let Some(prop) = func.child_by_field_name("property") {
                    self.result.references.push(ExtractedReference {
                        symbol_name: self.text(prop).to_string(),
                        line_number: line,
                        kind: ExtractedReferenceKind::Call,
                        class_context: None,
                    });
                }
            }
            _ => {}
        }

        if let Some(args) = node.child_by_field_name("arguments") {
            self.walk_stmt(args, parent_class);
        }
    }

    fn handle_identifier_usage(&mut self, node: Node<'_>, parent_class: Option<&str>) {
        let name = self.text(node).to_string();
        if name == "this" {
            return;
        }
        self.result.references.push(ExtractedReference {
            symbol_name: name,
            line_number: self.line(node),
            kind: ExtractedReferenceKind::Usage,
            class_context: parent_class.map(String::from),
        });
    }
}

fn strip_quotes(s: &str) -> String {
    s.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}

fn base_identifier_name(node: Node<'_>, source: &[u8]) -> Option<String> {
    match node.kind() {
        "identifier" => Some(node_text(node, source).to_string()),
        "member_expression" => node
            .child_by_field_name("object")
            .and_then(|o| base_identifier_name(o, source)),
        _ => None,
    }
}

fn collect_import_names(clause: Node<'_>, source: &[u8], out: &mut Vec<String>) {
    match clause.kind() {
        "identifier" => out.push(node_text(clause, source).to_string()),
        "named_imports" => {
            let mut cursor = clause.walk();
            for spec in clause.children(&mut cursor) {
                if spec.kind() == "import_specifier" {
                    let name_node = spec.child_by_field_name("alias").or_else(|| spec.child_by_field_name("name"));
                    if let Some(n) = name_node {
                        out.push(node_text(n, source).to_string());
                    }
                }
            }
        }
        "namespace_import" => {
            if let Some(n) = clause.child(clause.child_count().saturating_sub(1)) {
                out.push(node_text(n, source).to_string());
            }
        }
        _ => {
            let mut cursor = clause.walk();
            for child in clause.children(&mut cursor) {
                collect_import_names(child, source, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn parse(src: &str) -> (tree_sitter::Tree, Vec<u8>) {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_javascript::LANGUAGE.into()).unwrap();
        let tree = parser.parse(src, None).unwrap();
        (tree, src.as_bytes().to_vec())
    }

    #[test]
    fn extracts_class_and_method() {
        let src = "class Foo {\n  bar() {\n    return 1;\n  }\n}\n";
        let (tree, bytes) = parse(src);
        let result = extract_js_like(&tree, &bytes, Path::new("a.js"));
        assert!(result.entities.iter().any(|e| e.qualified_name == "Foo"));
        assert!(result.entities.iter().any(|e| e.qualified_name == "Foo.bar"));
    }

    #[test]
    fn named_import_captures_specifiers() {
        let src = "import { useEffect } from 'react';\n";
        let (tree, bytes) = parse(src);
        let result = extract_js_like(&tree, &bytes, Path::new("a.js"));
        assert_eq!(result.imports[0].module, "react");
        assert_eq!(result.imports[0].names, vec!["useEffect".to_string()]);
        assert!(!result.imports[0].is_relative);
    }

    #[test]
    fn relative_import_is_flagged() {
        let src = "import { x } from './util';\n";
        let (tree, bytes) = parse(src);
        let result = extract_js_like(&tree, &bytes, Path::new("a.js"));
        assert!(result.imports[0].is_relative);
    }

    #[test]
    fn arrow_function_bound_to_const_is_recorded() {
        let src = "const handler = () => {\n  doWork();\n};\n";
        let (tree, bytes) = parse(src);
        let result = extract_js_like(&tree, &bytes, Path::new("a.js"));
        assert!(result.entities.iter().any(|e| e.name == "handler"));
    }
}

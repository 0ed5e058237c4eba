//! Heuristics (spec §4.10).
//!
//! Small, pure AST passes that run alongside the main extraction walk and feed extra
//! references or immortality markers into the tracker. Each pass only reads its input
//! tree; none mutate shared state. Grounded on
//! `original_source/src/analyzer/heuristics.py` (Python passes),
//! `original_source/src/analyzer/js_heuristics.py` (JS/TS passes), and
//! `original_source/src/analyzer/js_import_tracker.py` (the import-origin map the JS
//! passes use to avoid false-positiving on a user function that happens to share a name
//! with a framework hook).

use std::collections::HashMap;

use tree_sitter::Node;

use crate::languages::common::{node_text, ImportMap};

/// A reference a heuristic pass wants the tracker to record, by plain symbol name (the
/// tracker links it via its usual name-fallback strategy, same as the Python
/// collaborator's `reference_tracker.add_reference(name)`).
#[derive(Debug, Clone)]
pub struct HeuristicReference {
    pub symbol_name: String,
    pub line_number: u32,
}

/// A symbol name a heuristic pass wants marked immortal outright, with the reason
/// surfaced in `protected_by`.
#[derive(Debug, Clone)]
pub struct ImmortalMark {
    pub symbol_name: String,
    pub reason: String,
}

/// Everything one heuristic pass (or a batch of them) produced for a single file.
#[derive(Debug, Clone, Default)]
pub struct HeuristicOutcome {
    pub references: Vec<HeuristicReference>,
    pub immortal: Vec<ImmortalMark>,
}

impl HeuristicOutcome {
    fn merge(&mut self, other: Self) {
        self.references.extend(other.references);
        self.immortal.extend(other.immortal);
    }
}

fn walk_children<'a>(node: Node<'a>, mut visit: impl FnMut(Node<'a>)) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        visit(child);
    }
}

fn for_each_descendant<'a>(node: Node<'a>, f: &mut impl FnMut(Node<'a>)) {
    f(node);
    walk_children(node, |child| for_each_descendant(child, f));
}

// --- Python heuristics -----------------------------------------------------------

/// Run every Python-side heuristic pass over one file's tree.
#[must_use]
pub fn apply_python_heuristics(tree: &tree_sitter::Tree, source: &[u8]) -> HeuristicOutcome {
    let mut outcome = HeuristicOutcome::default();
    outcome.merge(apply_pydantic_forward_ref_heuristic(tree, source));
    outcome.merge(apply_lifespan_teardown_heuristic(tree, source));
    outcome.merge(apply_polymorphic_orm_heuristic(tree, source));
    outcome
}

fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}

fn strip_string_quotes(raw: &str) -> &str {
    raw.trim_matches(|c| c == '"' || c == '\'')
}

/// Forward references inside type annotations: `x: "Foo"`, `def f() -> "Bar": ...`.
/// Grounded on `heuristics.py::_find_forward_refs`.
fn apply_pydantic_forward_ref_heuristic(tree: &tree_sitter::Tree, source: &[u8]) -> HeuristicOutcome {
    let mut outcome = HeuristicOutcome::default();
    let mut visit = |node: Node<'_>| {
        let type_node = match node.kind() {
            "typed_parameter" | "assignment" => node.child_by_field_name("type"),
            "function_definition" => node.child_by_field_name("return_type"),
            _ => None,
        };
        let Some(type_node) = type_node else { return };

        let mut collect_strings = |n: Node<'_>| {
            if n.kind() == "string" {
                let text = node_text(n, source);
                let stripped = strip_string_quotes(text);
                if is_valid_identifier(stripped) {
                    outcome.references.push(HeuristicReference {
                        symbol_name: stripped.to_string(),
                        line_number: n.start_position().row as u32 + 1,
                    });
                }
            }
        };
        for_each_descendant(type_node, &mut collect_strings);
    };
    for_each_descendant(tree.root_node(), &mut visit);
    outcome
}

fn decorator_base_name(decorator: Node<'_>, source: &[u8]) -> Option<String> {
    let mut result = None;
    walk_children(decorator, |child| {
        if result.is_some() {
            return;
        }
        result = match child.kind() {
            "identifier" => Some(node_text(child, source).to_string()),
            "attribute" => child
                .child_by_field_name("attribute")
                .map(|a| node_text(a, source).to_string()),
            "call" => child
                .child_by_field_name("function")
                .and_then(|f| match f.kind() {
                    "identifier" => Some(node_text(f, source).to_string()),
                    "attribute" => f.child_by_field_name("attribute").map(|a| node_text(a, source).to_string()),
                    _ => None,
                }),
            _ => None,
        };
    });
    result
}

fn find_yield_node<'a>(body: Node<'a>) -> Option<Node<'a>> {
    let mut found = None;
    let mut visit = |n: Node<'a>| {
        if found.is_none() && n.kind() == "yield" {
            found = Some(n);
        }
    };
    for_each_descendant(body, &mut visit);
    found
}

/// Identifiers that occur lexically after an `@asynccontextmanager` function's `yield`
/// are the teardown half of the generator and are protected outright. Grounded on
/// `heuristics.py::apply_lifespan_teardown_heuristic`.
fn apply_lifespan_teardown_heuristic(tree: &tree_sitter::Tree, source: &[u8]) -> HeuristicOutcome {
    let mut outcome = HeuristicOutcome::default();

    let mut visit = |node: Node<'_>| {
        if node.kind() != "decorated_definition" {
            return;
        }
        let mut is_asynccontextmanager = false;
        let mut function_body = None;
        walk_children(node, |child| match child.kind() {
            "decorator" => {
                if decorator_base_name(child, source).as_deref() == Some("asynccontextmanager") {
                    is_asynccontextmanager = true;
                }
            }
            "function_definition" => {
                function_body = child.child_by_field_name("body");
            }
            _ => {}
        });
        if !is_asynccontextmanager {
            return;
        }
        let Some(body) = function_body else { return };
        let Some(yield_node) = find_yield_node(body) else { return };

        let yield_row = yield_node.start_position().row;
        let mut past_yield = false;
        let mut mark = |n: Node<'_>| {
            if n.kind() == "identifier" {
                outcome.immortal.push(ImmortalMark {
                    symbol_name: node_text(n, source).to_string(),
                    reason: "async-context-manager teardown (after yield)".to_string(),
                });
            }
        };
        walk_children(body, |stmt| {
            if past_yield {
                for_each_descendant(stmt, &mut mark);
            } else if stmt.start_position().row >= yield_row && stmt.end_position().row >= yield_row {
                if stmt.start_position().row == yield_row {
                    past_yield = true;
                } else if stmt.start_position().row > yield_row {
                    past_yield = true;
                    for_each_descendant(stmt, &mut mark);
                }
            }
        });
    };
    for_each_descendant(tree.root_node(), &mut visit);
    outcome
}

fn class_has_mapper_args(class_body: Node<'_>, source: &[u8]) -> bool {
    let mut found = false;
    let mut visit = |n: Node<'_>| {
        if found || n.kind() != "assignment" {
            return;
        }
        if let Some(left) = n.child_by_field_name("left") {
            if left.kind() == "identifier" && node_text(left, source) == "__mapper_args__" {
                found = true;
            }
        }
    };
    for_each_descendant(class_body, &mut visit);
    found
}

/// Classes declaring `__mapper_args__` participate in SQLAlchemy polymorphic
/// inheritance: subclasses are instantiated by the ORM through the base class's query
/// machinery, never directly by name. Grounded on
/// `heuristics.py::apply_polymorphic_orm_heuristic`.
fn apply_polymorphic_orm_heuristic(tree: &tree_sitter::Tree, source: &[u8]) -> HeuristicOutcome {
    let mut outcome = HeuristicOutcome::default();
    let mut visit = |node: Node<'_>| {
        if node.kind() != "class_definition" {
            return;
        }
        let Some(name_node) = node.child_by_field_name("name") else { return };
        let Some(body) = node.child_by_field_name("body") else { return };
        if class_has_mapper_args(body, source) {
            outcome.immortal.push(ImmortalMark {
                symbol_name: node_text(name_node, source).to_string(),
                reason: "Polymorphic ORM (`__mapper_args__`)".to_string(),
            });
        }
    };
    for_each_descendant(tree.root_node(), &mut visit);
    outcome
}

// --- JS/TS import tracking --------------------------------------------------------

/// Build a `local_name -> ImportOrigin` map for one file's ESM and CommonJS imports.
/// Grounded on `js_import_tracker.py::JSImportTracker.analyze_imports`.
#[must_use]
pub fn build_import_map(tree: &tree_sitter::Tree, source: &[u8]) -> ImportMap {
    let mut map = ImportMap::new();
    let mut visit = |node: Node<'_>| match node.kind() {
        "import_statement" => record_esm_import(node, source, &mut map),
        "variable_declarator" => record_commonjs_require(node, source, &mut map),
        _ => {}
    };
    for_each_descendant(tree.root_node(), &mut visit);
    map
}

fn record_esm_import(node: Node<'_>, source: &[u8], map: &mut ImportMap) {
    let Some(source_node) = node.child_by_field_name("source") else { return };
    let module = node_text(source_node, source).trim_matches(|c| c == '"' || c == '\'').to_string();

    let Some(clause) = node.child_by_field_name("import_clause") else { return };
    record_import_clause(clause, source, &module, map);
}

fn record_import_clause(clause: Node<'_>, source: &[u8], module: &str, map: &mut ImportMap) {
    match clause.kind() {
        "identifier" => {
            map.insert(node_text(clause, source), module, "default");
        }
        "namespace_import" => {
            if let Some(binding) = clause.child(clause.child_count().saturating_sub(1)) {
                map.insert(node_text(binding, source), module, "*");
            }
        }
        "named_imports" => {
            walk_children(clause, |spec| {
                if spec.kind() != "import_specifier" {
                    return;
                }
                let original = spec.child_by_field_name("name").map(|n| node_text(n, source).to_string());
                let local = spec
                    .child_by_field_name("alias")
                    .map(|n| node_text(n, source).to_string())
                    .or_else(|| original.clone());
                if let (Some(local), Some(original)) = (local, original) {
                    map.insert(local, module, original);
                }
            });
        }
        _ => {
            walk_children(clause, |child| record_import_clause(child, source, module, map));
        }
    }
}

fn record_commonjs_require(node: Node<'_>, source: &[u8], map: &mut ImportMap) {
    let Some(name_node) = node.child_by_field_name("name") else { return };
    let Some(value_node) = node.child_by_field_name("value") else { return };
    if value_node.kind() != "call_expression" {
        return;
    }
    let Some(func) = value_node.child_by_field_name("function") else { return };
    if func.kind() != "identifier" || node_text(func, source) != "require" {
        return;
    }
    let Some(args) = value_node.child_by_field_name("arguments") else { return };
    let Some(first_arg) = args.named_child(0) else { return };
    if first_arg.kind() != "string" {
        return;
    }
    if name_node.kind() != "identifier" {
        return;
    }
    let module = node_text(first_arg, source).trim_matches(|c| c == '"' || c == '\'').to_string();
    map.insert(node_text(name_node, source), module, "");
}

// --- JS/TS heuristics --------------------------------------------------------------

const REACT_DEPENDENCY_HOOKS: &[&str] = &["useEffect", "useCallback", "useMemo"];
const EXPRESS_ROUTE_METHODS: &[&str] = &["get", "post", "put", "delete", "patch", "use", "all"];

/// Run every JS/TS heuristic pass over one file's tree.
#[must_use]
pub fn apply_js_heuristics(
    tree: &tree_sitter::Tree,
    source: &[u8],
    import_map: &ImportMap,
    library_mode: bool,
) -> HeuristicOutcome {
    let mut outcome = HeuristicOutcome::default();
    outcome.merge(apply_react_hook_heuristic(tree, source, import_map));
    outcome.merge(apply_express_route_heuristic(tree, source, import_map));
    outcome.merge(apply_export_heuristic(tree, source, library_mode));
    outcome
}

fn call_callee_name(func: Node<'_>, source: &[u8]) -> Option<String> {
    match func.kind() {
        "identifier" => Some(node_text(func, source).to_string()),
        _ => None,
    }
}

/// `useEffect(fn, [dep1, dep2])` etc: every identifier in the dependency array is a
/// real usage, not dead. Grounded on `js_heuristics.py::apply_react_hook_heuristic`.
fn apply_react_hook_heuristic(tree: &tree_sitter::Tree, source: &[u8], import_map: &ImportMap) -> HeuristicOutcome {
    let mut outcome = HeuristicOutcome::default();
    let mut visit = |node: Node<'_>| {
        if node.kind() != "call_expression" {
            return;
        }
        let Some(func) = node.child_by_field_name("function") else { return };
        let Some(name) = call_callee_name(func, source) else { return };

        let is_react_hook = match import_map.get(&name) {
            Some(origin) => origin.source_module == "react" && REACT_DEPENDENCY_HOOKS.contains(&origin.original_name.as_str()),
            None => REACT_DEPENDENCY_HOOKS.contains(&name.as_str()),
        };
        if !is_react_hook {
            return;
        }

        let Some(args) = node.child_by_field_name("arguments") else { return };
        let Some(second_arg) = args.named_child(1) else { return };
        if second_arg.kind() != "array" {
            return;
        }
        let mut collect = |n: Node<'_>| {
            if n.kind() == "identifier" {
                outcome.references.push(HeuristicReference {
                    symbol_name: node_text(n, source).to_string(),
                    line_number: n.start_position().row as u32 + 1,
                });
            }
        };
        for_each_descendant(second_arg, &mut collect);
    };
    for_each_descendant(tree.root_node(), &mut visit);
    outcome
}

/// `app.get('/path', handler)` / `router.post(...)`: every argument identifier is a
/// route callback invoked by the framework dispatcher, not by name in user code.
/// Grounded on `js_heuristics.py::apply_express_route_heuristic`.
fn apply_express_route_heuristic(tree: &tree_sitter::Tree, source: &[u8], import_map: &ImportMap) -> HeuristicOutcome {
    let mut outcome = HeuristicOutcome::default();
    let mut visit = |node: Node<'_>| {
        if node.kind() != "call_expression" {
            return;
        }
        let Some(func) = node.child_by_field_name("function") else { return };
        if func.kind() != "member_expression" {
            return;
        }
        let Some(object) = func.child_by_field_name("object") else { return };
        let Some(property) = func.child_by_field_name("property") else { return };
        if object.kind() != "identifier" {
            return;
        }
        let object_name = node_text(object, source);
        let method_name = node_text(property, source);
        if !EXPRESS_ROUTE_METHODS.contains(&method_name) {
            return;
        }

        let is_express_object = match import_map.get(object_name) {
            Some(origin) => origin.source_module == "express",
            None => object_name == "app" || object_name == "router",
        };
        if !is_express_object {
            return;
        }

        let Some(args) = node.child_by_field_name("arguments") else { return };
        let mut cursor = args.walk();
        for arg in args.named_children(&mut cursor) {
            if arg.kind() == "identifier" {
                outcome.immortal.push(ImmortalMark {
                    symbol_name: node_text(arg, source).to_string(),
                    reason: "Express Route Handler".to_string(),
                });
            }
        }
    };
    for_each_descendant(tree.root_node(), &mut visit);
    outcome
}

fn export_clause_is_default(node: Node<'_>, source: &[u8]) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|c| node_text(c, source) == "default")
}

fn mark_destructured_immortal(pattern: Node<'_>, source: &[u8], reason: &str, out: &mut Vec<ImmortalMark>) {
    match pattern.kind() {
        "identifier" | "shorthand_property_identifier" => {
            out.push(ImmortalMark {
                symbol_name: node_text(pattern, source).to_string(),
                reason: reason.to_string(),
            });
        }
        "array_pattern" | "object_pattern" => {
            walk_children(pattern, |child| mark_destructured_immortal(child, source, reason, out));
        }
        "pair_pattern" => {
            if let Some(value) = pattern.child_by_field_name("value") {
                mark_destructured_immortal(value, source, reason, out);
            }
        }
        _ => {}
    }
}

fn process_export_clause(clause: Node<'_>, source: &[u8], out: &mut Vec<ImmortalMark>) {
    walk_children(clause, |spec| {
        if spec.kind() != "export_specifier" {
            return;
        }
        let exported = spec
            .child_by_field_name("alias")
            .or_else(|| spec.child_by_field_name("name"));
        if let Some(name_node) = exported {
            out.push(ImmortalMark {
                symbol_name: node_text(name_node, source).to_string(),
                reason: "named export (library mode)".to_string(),
            });
        }
    });
}

fn process_lexical_declaration(decl: Node<'_>, source: &[u8], out: &mut Vec<ImmortalMark>) {
    walk_children(decl, |declarator| {
        if declarator.kind() != "variable_declarator" {
            return;
        }
        let Some(name_node) = declarator.child_by_field_name("name") else { return };
        mark_destructured_immortal(name_node, source, "named export (library mode)", out);
    });
}

/// Default exports are always protected; named exports (`export { a, b }`, `export
/// const x = ...`, `export function f() {}`, `export class C {}`) are protected only in
/// library mode, matching a library's public surface being reachable from outside the
/// analyzed project. Grounded on `js_heuristics.py::apply_export_heuristic`.
fn apply_export_heuristic(tree: &tree_sitter::Tree, source: &[u8], library_mode: bool) -> HeuristicOutcome {
    let mut outcome = HeuristicOutcome::default();
    let mut visit = |node: Node<'_>| {
        if node.kind() != "export_statement" {
            return;
        }

        if export_clause_is_default(node, source) {
            walk_children(node, |child| {
                let name_node = match child.kind() {
                    "identifier" => Some(child),
                    "function_declaration" | "class_declaration" => child.child_by_field_name("name"),
                    _ => None,
                };
                if let Some(name_node) = name_node {
                    outcome.immortal.push(ImmortalMark {
                        symbol_name: node_text(name_node, source).to_string(),
                        reason: "default export".to_string(),
                    });
                }
            });
            return;
        }

        if !library_mode {
            return;
        }

        walk_children(node, |child| match child.kind() {
            "export_clause" => process_export_clause(child, source, &mut outcome.immortal),
            "lexical_declaration" | "variable_declaration" => process_lexical_declaration(child, source, &mut outcome.immortal),
            "function_declaration" | "class_declaration" => {
                if let Some(name_node) = child.child_by_field_name("name") {
                    outcome.immortal.push(ImmortalMark {
                        symbol_name: node_text(name_node, source).to_string(),
                        reason: "named export (library mode)".to_string(),
                    });
                }
            }
            _ => {}
        });
    };
    for_each_descendant(tree.root_node(), &mut visit);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn parse_python(src: &str) -> (tree_sitter::Tree, Vec<u8>) {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_python::LANGUAGE.into()).unwrap();
        (parser.parse(src, None).unwrap(), src.as_bytes().to_vec())
    }

    fn parse_js(src: &str) -> (tree_sitter::Tree, Vec<u8>) {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_javascript::LANGUAGE.into()).unwrap();
        (parser.parse(src, None).unwrap(), src.as_bytes().to_vec())
    }

    #[test]
    fn forward_ref_in_annotation_emits_reference() {
        let (tree, bytes) = parse_python("def f(x: \"Foo\"):\n    pass\n");
        let outcome = apply_pydantic_forward_ref_heuristic(&tree, &bytes);
        assert!(outcome.references.iter().any(|r| r.symbol_name == "Foo"));
    }

    #[test]
    fn polymorphic_orm_class_is_marked_immortal() {
        let (tree, bytes) = parse_python("class Employee(Base):\n    __mapper_args__ = {'polymorphic_identity': 'employee'}\n");
        let outcome = apply_polymorphic_orm_heuristic(&tree, &bytes);
        assert!(outcome.immortal.iter().any(|m| m.symbol_name == "Employee"));
    }

    #[test]
    fn plain_class_without_mapper_args_is_untouched() {
        let (tree, bytes) = parse_python("class Plain:\n    pass\n");
        let outcome = apply_polymorphic_orm_heuristic(&tree, &bytes);
        assert!(outcome.immortal.is_empty());
    }

    #[test]
    fn commonjs_require_is_tracked_in_import_map() {
        let (tree, bytes) = parse_js("const express = require('express');\n");
        let map = build_import_map(&tree, &bytes);
        assert_eq!(map.get("express").unwrap().source_module, "express");
    }

    #[test]
    fn esm_named_import_is_tracked_with_original_name() {
        let (tree, bytes) = parse_js("import { useEffect as fx } from 'react';\n");
        let map = build_import_map(&tree, &bytes);
        let origin = map.get("fx").unwrap();
        assert_eq!(origin.source_module, "react");
        assert_eq!(origin.original_name, "useEffect");
    }

    #[test]
    fn use_effect_dependency_array_identifiers_become_references() {
        let (tree, bytes) = parse_js("import { useEffect } from 'react';\nuseEffect(() => { run(); }, [count, name]);\n");
        let map = build_import_map(&tree, &bytes);
        let outcome = apply_react_hook_heuristic(&tree, &bytes, &map);
        let names: Vec<_> = outcome.references.iter().map(|r| r.symbol_name.as_str()).collect();
        assert!(names.contains(&"count"));
        assert!(names.contains(&"name"));
    }

    #[test]
    fn express_route_handler_argument_is_marked_immortal() {
        let (tree, bytes) = parse_js("app.get('/users', listUsers);\n");
        let map = ImportMap::new();
        let outcome = apply_express_route_heuristic(&tree, &bytes, &map);
        assert!(outcome.immortal.iter().any(|m| m.symbol_name == "listUsers"));
    }

    #[test]
    fn default_export_is_always_protected() {
        let (tree, bytes) = parse_js("export default function handler() {}\n");
        let outcome = apply_export_heuristic(&tree, &bytes, false);
        assert!(outcome.immortal.iter().any(|m| m.symbol_name == "handler"));
    }

    #[test]
    fn named_export_only_protected_in_library_mode() {
        let (tree, bytes) = parse_js("export function helper() {}\n");
        let outside_library = apply_export_heuristic(&tree, &bytes, false);
        assert!(outside_library.immortal.is_empty());

        let in_library = apply_export_heuristic(&tree, &bytes, true);
        assert!(in_library.immortal.iter().any(|m| m.symbol_name == "helper"));
    }
}

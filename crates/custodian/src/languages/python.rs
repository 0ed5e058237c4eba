//! Python entity and reference extraction.
//!
//! Grounded on `extractor.py`'s node-kind dispatch and `reference_tracker.py`'s
//! per-language walk (§4.2, §4.7). The walk threads `parent_class` explicitly through
//! recursion per Design Notes §9: entering a class body sets it to the class name;
//! entering a non-class function body (including nested `def`s) resets it to `None`,
//! since a function nested inside another function loses class context even if the
//! outer function is itself a method.

use std::path::Path;

use tree_sitter::Node;

use super::common::{node_text, normalize_path, ExtractedReference, ExtractedReferenceKind, ExtractionResult};
use super::LanguageSupport;
use crate::types::{Entity, EntityKind, Import};

pub struct PythonSupport;

impl LanguageSupport for PythonSupport {
    fn tree_sitter_language(&self, _jsx: bool) -> tree_sitter::Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn extract(&self, tree: &tree_sitter::Tree, source: &[u8], file_path: &Path) -> ExtractionResult {
        let mut ctx = Walker {
            source,
            file_path: file_path.to_path_buf(),
            result: ExtractionResult::default(),
        };
        ctx.result.is_package_init = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n == "__init__.py");
        ctx.walk(tree.root_node(), None);
        ctx.result
    }
}

struct Walker<'a> {
    source: &'a [u8],
    file_path: std::path::PathBuf,
    result: ExtractionResult,
}

impl<'a> Walker<'a> {
    fn text(&self, node: Node<'_>) -> &'a str {
        node_text(node, self.source)
    }

    fn line(&self, node: Node<'_>) -> u32 {
        node.start_position().row as u32 + 1
    }

    /// Walk a block of statements, threading `parent_class` for direct class/function
    /// children while still visiting every descendant for reference extraction.
    fn walk(&mut self, node: Node<'_>, parent_class: Option<&str>) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.walk_stmt(child, parent_class);
        }
    }

    fn walk_stmt(&mut self, node: Node<'_>, parent_class: Option<&str>) {
        match node.kind() {
            "decorated_definition" => self.handle_decorated(node, parent_class),
            "class_definition" => self.handle_class(node, None, parent_class),
            "function_definition" => self.handle_function(node, None, parent_class),
            "import_statement" => self.handle_import_statement(node),
            "import_from_statement" => self.handle_import_from(node),
            "assignment" => self.handle_assignment(node, parent_class),
            "call" => self.handle_call(node, parent_class),
            "identifier" => self.handle_identifier_usage(node, parent_class),
            _ => {
                // Recurse without changing context; most statement wrappers
                // (if/for/try/with/block/expression_statement/...) fall here.
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    self.walk_stmt(child, parent_class);
                }
            }
        }
    }

    fn handle_decorated(&mut self, node: Node<'_>, parent_class: Option<&str>) {
        let mut decorators = Vec::new();
        let mut definition = None;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "decorator" => {
                    decorators.push(self.text(child).to_string());
                    self.emit_decorator_reference(child, parent_class);
                }
                "function_definition" | "class_definition" => definition = Some(child),
                _ => {}
            }
        }
        let Some(def_node) = definition else { return };
        let full_text = self.text(node).to_string();
        match def_node.kind() {
            "class_definition" => self.handle_class(def_node, Some((decorators, full_text)), parent_class),
            "function_definition" => self.handle_function(def_node, Some((decorators, full_text)), parent_class),
            _ => {}
        }
    }

    fn emit_decorator_reference(&mut self, decorator_node: Node<'_>, parent_class: Option<&str>) {
        // decorator: "@" expression ; expression may be identifier, attribute, or call.
        let mut cursor = decorator_node.walk();
        for child in decorator_node.children(&mut cursor) {
            if let Some(name) = base_identifier_name(child, self.source) {
                self.result.references.push(ExtractedReference {
                    symbol_name: name,
                    line_number: self.line(decorator_node),
                    kind: ExtractedReferenceKind::Decorator,
                    class_context: parent_class.map(String::from),
                });
            }
        }
    }

    fn handle_class(&mut self, node: Node<'_>, decorated: Option<(Vec<String>, String)>, parent_class: Option<&str>) {
        let Some(name_node) = node.child_by_field_name("name") else { return };
        let class_name = self.text(name_node).to_string();

        let mut base_classes = Vec::new();
        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            let mut cursor = superclasses.walk();
            for child in superclasses.children(&mut cursor) {
                if let Some(name) = base_identifier_name(child, self.source) {
                    base_classes.push(name);
                }
            }
        }

        let (decorators, full_text) = decorated.unwrap_or_else(|| (Vec::new(), self.text(node).to_string()));
        let qualified_name = qualify(parent_class, &class_name);

        self.result.entities.push(Entity {
            name: class_name.clone(),
            kind: EntityKind::Class,
            full_text,
            file_path: self.file_path.clone(),
            start_line: self.line(node),
            end_line: node.end_position().row as u32 + 1,
            qualified_name,
            parent_class: parent_class.map(String::from),
            base_classes,
            decorators,
            protected_by: String::new(),
        });

        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body, Some(&class_name));
        }
    }

    fn handle_function(&mut self, node: Node<'_>, decorated: Option<(Vec<String>, String)>, parent_class: Option<&str>) {
        let Some(name_node) = node.child_by_field_name("name") else { return };
        let fn_name = self.text(name_node).to_string();
        let kind = if parent_class.is_some() { EntityKind::Method } else { EntityKind::Function };

        let (decorators, full_text) = decorated.unwrap_or_else(|| (Vec::new(), self.text(node).to_string()));
        let qualified_name = qualify(parent_class, &fn_name);

        self.result.entities.push(Entity {
            name: fn_name,
            kind,
            full_text,
            file_path: self.file_path.clone(),
            start_line: self.line(node),
            end_line: node.end_position().row as u32 + 1,
            qualified_name,
            parent_class: parent_class.map(String::from),
            base_classes: Vec::new(),
            decorators,
            protected_by: String::new(),
        });

        // Parameters (excluding self/cls) are binding occurrences, not usages.
        if let Some(params) = node.child_by_field_name("parameters") {
            self.scan_default_values(params);
        }

        // Nested definitions lose class context (spec §4.2).
        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body, None);
        }
    }

    /// Parameter default values (`def f(x: T = some_symbol)`) can reference other
    /// symbols even though the parameter name itself is a binding occurrence.
    fn scan_default_values(&mut self, params: Node<'_>) {
        let mut cursor = params.walk();
        for param in params.children(&mut cursor) {
            if param.kind() == "default_parameter" || param.kind() == "typed_default_parameter" {
                if let Some(value) = param.child_by_field_name("value") {
                    self.walk_stmt(value, None);
                }
            }
        }
    }

    fn handle_import_statement(&mut self, node: Node<'_>) {
        // import a.b.c [as x], import a, b
        let line = self.line(node);
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "dotted_name" => {
                    let module = self.text(child).to_string();
                    let bound_name = module.split('.').next().unwrap_or(&module).to_string();
                    self.push_import(module, Vec::new(), false, line);
                    self.result.references.push(ExtractedReference {
                        symbol_name: bound_name,
                        line_number: line,
                        kind: ExtractedReferenceKind::Import,
                        class_context: None,
                    });
                }
                "aliased_import" => {
                    if let Some(name_node) = child.child_by_field_name("name") {
                        let module = self.text(name_node).to_string();
                        self.push_import(module, Vec::new(), false, line);
                    }
                    if let Some(alias_node) = child.child_by_field_name("alias") {
                        self.result.references.push(ExtractedReference {
                            symbol_name: self.text(alias_node).to_string(),
                            line_number: line,
                            kind: ExtractedReferenceKind::Import,
                            class_context: None,
                        });
                    }
                }
                _ => {}
            }
        }
    }

    fn handle_import_from(&mut self, node: Node<'_>) {
        let Some(module_node) = node.child_by_field_name("module_name") else { return };
        let (module, is_relative) = match module_node.kind() {
            "relative_import" => (self.text(module_node).to_string(), true),
            _ => (self.text(module_node).to_string(), false),
        };

        let mut names = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "dotted_name" if child != module_node => names.push(self.text(child).to_string()),
                "aliased_import" => {
                    if let Some(name_node) = child.child_by_field_name("name") {
                        names.push(self.text(name_node).to_string());
                    }
                }
                "wildcard_import" => names.push("*".to_string()),
                _ => {}
            }
        }

        let line = self.line(node);
        self.push_import(module, names.clone(), is_relative, line);

        for name in names {
            self.result.references.push(ExtractedReference {
                symbol_name: name,
                line_number: line,
                kind: ExtractedReferenceKind::Import,
                class_context: None,
            });
        }
    }

    fn push_import(&mut self, module: String, names: Vec<String>, is_relative: bool, line: u32) {
        self.result.imports.push(Import {
            module,
            names,
            is_relative,
            line_number: line,
            file_path: self.file_path.clone(),
        });
    }

    fn handle_assignment(&mut self, node: Node<'_>, parent_class: Option<&str>) {
        // Left side is a binding occurrence; right side may reference other symbols.
        if let Some(right) = node.child_by_field_name("right") {
            self.walk_stmt(right, parent_class);
        }
        // An assignment's left side can itself contain non-binding reads, e.g.
        // `obj.attr = value` reads `obj`.
        if let Some(left) = node.child_by_field_name("left") {
            if left.kind() == "attribute" {
                if let Some(obj) = left.child_by_field_name("object") {
                    self.walk_stmt(obj, parent_class);
                }
            }
        }
    }

    fn handle_call(&mut self, node: Node<'_>, parent_class: Option<&str>) {
        let Some(func) = node.child_by_field_name("function") else { return };
        let line = self.line(node);

        match func.kind() {
            "identifier" => {
                let name = self.text(func).to_string();
                let kind = if is_capitalized(&name) {
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
            "attribute" => {
                if let Some(attr) = func.child_by_field_name("attribute") {
                    let method_name = self.text(attr).to_string();
                    let object_context = func
                        .child_by_field_name("object")
                        .and_then(|o| self_or_cls_context(o, self.source, parent_class));
                    self.result.references.push(ExtractedReference {
                        symbol_name: method_name,
                        line_number: line,
                        kind: ExtractedReferenceKind::Call,
                        class_context: object_context,
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
        if name == "self" || name == "cls" {
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

fn qualify(parent_class: Option<&str>, name: &str) -> String {
    match parent_class {
        Some(cls) => format!("{cls}.{name}"),
        None => name.to_string(),
    }
}

fn is_capitalized(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// `self.foo()`/`cls.foo()` use the enclosing class; any other identifier's type (if
/// known) would come from the `VariableTypeMap`; that lookup happens one layer up in
/// the tracker, since the extractor itself is not variable-type aware.
fn self_or_cls_context(object: Node<'_>, source: &[u8], parent_class: Option<&str>) -> Option<String> {
    if object.kind() == "identifier" {
        let text = node_text(object, source);
        if (text == "self" || text == "cls") && parent_class.is_some() {
            return parent_class.map(String::from);
        }
    }
    None
}

/// Extract the leading identifier of a (possibly dotted/called) expression, used for
/// decorator base names and superclass names: `app.route` -> `app`, `Base` -> `Base`,
/// `pytest.fixture()` -> `pytest`.
fn base_identifier_name(node: Node<'_>, source: &[u8]) -> Option<String> {
    match node.kind() {
        "identifier" => Some(node_text(node, source).to_string()),
        "attribute" => node
            .child_by_field_name("object")
            .and_then(|o| base_identifier_name(o, source))
            .or_else(|| node.child_by_field_name("attribute").map(|a| node_text(a, source).to_string())),
        "call" => node.child_by_field_name("function").and_then(|f| base_identifier_name(f, source)),
        "keyword_argument" => node.child_by_field_name("value").and_then(|v| base_identifier_name(v, source)),
        _ => None,
    }
}

#[must_use]
pub fn entry_point_path(file_path: &Path) -> String {
    normalize_path(file_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn parse(src: &str) -> (tree_sitter::Tree, Vec<u8>) {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_python::LANGUAGE.into()).unwrap();
        let tree = parser.parse(src, None).unwrap();
        (tree, src.as_bytes().to_vec())
    }

    #[test]
    fn extracts_class_with_methods_and_qualified_names() {
        let src = "class Foo:\n    def __init__(self, v):\n        self.v = v\n    def used(self):\n        return self.v\n";
        let (tree, bytes) = parse(src);
        let result = PythonSupport.extract(&tree, &bytes, Path::new("a.py"));
        let names: Vec<_> = result.entities.iter().map(|e| e.qualified_name.clone()).collect();
        assert!(names.contains(&"Foo".to_string()));
        assert!(names.contains(&"Foo.__init__".to_string()));
        assert!(names.contains(&"Foo.used".to_string()));
    }

    #[test]
    fn nested_function_loses_class_context() {
        let src = "class Foo:\n    def outer(self):\n        def inner():\n            pass\n        return inner\n";
        let (tree, bytes) = parse(src);
        let result = PythonSupport.extract(&tree, &bytes, Path::new("a.py"));
        let inner = result.entities.iter().find(|e| e.name == "inner").unwrap();
        assert_eq!(inner.parent_class, None);
        assert_eq!(inner.qualified_name, "inner");
    }

    #[test]
    fn decorator_spans_full_text_and_emits_reference() {
        let src = "class Foo:\n    @property\n    def bar(self):\n        return 1\n";
        let (tree, bytes) = parse(src);
        let result = PythonSupport.extract(&tree, &bytes, Path::new("a.py"));
        let bar = result.entities.iter().find(|e| e.name == "bar").unwrap();
        assert!(bar.full_text.contains("@property"));
        assert_eq!(bar.decorators, vec!["@property".to_string()]);
        assert!(result
            .references
            .iter()
            .any(|r| r.symbol_name == "property" && r.kind == ExtractedReferenceKind::Decorator));
    }

    #[test]
    fn relative_import_is_flagged_and_names_captured() {
        let src = "from .a import Foo\n";
        let (tree, bytes) = parse(src);
        let result = PythonSupport.extract(&tree, &bytes, Path::new("main.py"));
        let import = &result.imports[0];
        assert!(import.is_relative);
        assert_eq!(import.names, vec!["Foo".to_string()]);
    }

    #[test]
    fn call_on_self_infers_class_context() {
        let src = "class Foo:\n    def a(self):\n        self.b()\n    def b(self):\n        pass\n";
        let (tree, bytes) = parse(src);
        let result = PythonSupport.extract(&tree, &bytes, Path::new("a.py"));
        let call = result.references.iter().find(|r| r.symbol_name == "b").unwrap();
        assert_eq!(call.class_context.as_deref(), Some("Foo"));
    }

    #[test]
    fn package_init_is_flagged() {
        let (tree, bytes) = parse("");
        let result = PythonSupport.extract(&tree, &bytes, Path::new("pkg/__init__.py"));
        assert!(result.is_package_init);
    }
}

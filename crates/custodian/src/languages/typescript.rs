//! TypeScript entity and reference extraction.
//!
//! `tree-sitter-typescript` ships two grammars, `LANGUAGE_TYPESCRIPT` and
//! `LANGUAGE_TSX`; `.tsx` files select the latter via `is_jsx_variant` (spec §4.1: TSX
//! is a JSX-grammar flag on L3, not a fourth language). Both grammars agree on the node
//! kinds the walk in [`javascript::extract_js_like`] inspects (classes, methods,
//! functions, imports, calls), so extraction is shared rather than duplicated; type
//! annotations and interfaces are not entities this pipeline tracks (spec §3 scopes
//! definitions to function/class/method).

use std::path::Path;

use super::common::ExtractionResult;
use super::javascript::extract_js_like;
use super::LanguageSupport;
use crate::types::is_jsx_variant;

pub struct TypeScriptSupport;

impl LanguageSupport for TypeScriptSupport {
    fn tree_sitter_language(&self, jsx: bool) -> tree_sitter::Language {
        if jsx {
            tree_sitter_typescript::LANGUAGE_TSX.into()
        } else {
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
        }
    }

    fn extract(&self, tree: &tree_sitter::Tree, source: &[u8], file_path: &Path) -> ExtractionResult {
        let _ = is_jsx_variant(file_path);
        extract_js_like(tree, source, file_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn parse_ts(src: &str) -> (tree_sitter::Tree, Vec<u8>) {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
            .unwrap();
        let tree = parser.parse(src, None).unwrap();
        (tree, src.as_bytes().to_vec())
    }

    fn parse_tsx(src: &str) -> (tree_sitter::Tree, Vec<u8>) {
        let mut parser = Parser::new();
        parser.set_language(&tree_sitter_typescript::LANGUAGE_TSX.into()).unwrap();
        let tree = parser.parse(src, None).unwrap();
        (tree, src.as_bytes().to_vec())
    }

    #[test]
    fn extracts_class_with_typed_method() {
        let src = "class Service {\n  run(x: number): number {\n    return x + 1;\n  }\n}\n";
        let (tree, bytes) = parse_ts(src);
        let result = extract_js_like(&tree, &bytes, Path::new("a.ts"));
        assert!(result.entities.iter().any(|e| e.qualified_name == "Service"));
        assert!(result.entities.iter().any(|e| e.qualified_name == "Service.run"));
    }

    #[test]
    fn tsx_grammar_parses_jsx_syntax() {
        let src = "export function Widget() {\n  return <div>hi</div>;\n}\n";
        let (tree, bytes) = parse_tsx(src);
        let result = extract_js_like(&tree, &bytes, Path::new("a.tsx"));
        assert!(result.entities.iter().any(|e| e.name == "Widget"));
    }

    #[test]
    fn language_support_picks_tsx_grammar_for_tsx_extension() {
        let support = TypeScriptSupport;
        assert!(is_jsx_variant(Path::new("a.tsx")));
        let _ = support.tree_sitter_language(true);
        let _ = support.tree_sitter_language(false);
    }
}

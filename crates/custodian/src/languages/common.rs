//! Shared extraction types used by every `LanguageSupport` implementation.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::types::{Entity, Import};

/// A raw, language-agnostic reference captured during the extraction walk, before the
/// tracker has a `DefinitionTable` to link it against.
#[derive(Debug, Clone)]
pub struct ExtractedReference {
    pub symbol_name: String,
    pub line_number: u32,
    pub kind: ExtractedReferenceKind,
    /// The enclosing class, when the reference occurs inside a method body (used to
    /// resolve `self.foo()`/`cls.foo()` calls to a class-context).
    pub class_context: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractedReferenceKind {
    Import,
    Call,
    Instantiation,
    Decorator,
    Usage,
}

/// Output of one file's extraction pass: its definitions, its imports, and the raw
/// references gathered in the same walk (so the walk's parent-class/parent-node
/// threading only has to happen once).
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub entities: Vec<Entity>,
    pub imports: Vec<Import>,
    pub references: Vec<ExtractedReference>,
    /// Set when this file is a package initializer (`__init__.<ext>` or, for JS/TS,
    /// an `index.<ext>` barrel file), consulted by package-export tracking.
    pub is_package_init: bool,
}

pub type ExtractedEntity = Entity;

/// Where a locally-bound name came from: which module it was imported from, and its
/// original (pre-alias) name in that module. Used by the JS/TS heuristics to verify a
/// call like `useEffect(...)` really originates from `react` rather than a
/// user-defined function of the same name (spec §4.10 / `js_heuristics.py` v3.6.0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOrigin {
    pub source_module: String,
    pub original_name: String,
}

/// `local_name -> ImportOrigin` for one file, built alongside import extraction and
/// threaded into the JS/TS heuristic passes.
#[derive(Debug, Clone, Default)]
pub struct ImportMap(HashMap<String, ImportOrigin>);

impl ImportMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, local_name: impl Into<String>, source_module: impl Into<String>, original_name: impl Into<String>) {
        self.0.insert(
            local_name.into(),
            ImportOrigin {
                source_module: source_module.into(),
                original_name: original_name.into(),
            },
        );
    }

    #[must_use]
    pub fn get(&self, local_name: &str) -> Option<&ImportOrigin> {
        self.0.get(local_name)
    }

    /// `true` iff `local_name` resolves (through the import map) to `original_name`
    /// from `source_module`.
    #[must_use]
    pub fn originates_from(&self, local_name: &str, source_module: &str, original_name: &str) -> bool {
        self.get(local_name)
            .is_some_and(|o| o.source_module == source_module && o.original_name == original_name)
    }
}

/// A file path within the project, normalized to forward slashes for stable cache keys
/// and cross-platform comparisons, regardless of the host OS path separator.
#[must_use]
pub fn normalize_path(path: &std::path::Path) -> String {
    let s = path.to_string_lossy();
    if cfg!(windows) {
        s.replace('\\', "/")
    } else {
        s.into_owned()
    }
}

/// Builds a node's exact source-text slice, used for `Entity::full_text` and for
/// decorator source fragments.
#[must_use]
pub fn node_text<'a>(node: tree_sitter::Node<'_>, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

#[must_use]
pub fn file_path_buf(path: &std::path::Path) -> PathBuf {
    path.to_path_buf()
}

//! Per-language tree-sitter grammar wiring and entity/import extraction.
//!
//! Each supported language implements [`LanguageSupport`]. The facade in this module
//! (`get_language_support`) is the Parser Facade (spec §4.1): it maps an extension to a
//! language and hands back a `'static` trait object, mirroring the teacher's
//! `get_language_support(Language) -> Option<&'static dyn LanguageSupport>` dispatch.

pub mod common;
pub mod javascript;
pub mod python;
pub mod typescript;

use crate::types::Language;
pub use common::{ExtractedEntity, ExtractedReference, ImportMap, ImportOrigin};

/// Per-language extraction behavior (Entity Extractor, spec §4.2).
pub trait LanguageSupport: Send + Sync {
    /// The tree-sitter grammar to parse this language's files with.
    fn tree_sitter_language(&self, jsx: bool) -> tree_sitter::Language;

    /// Extract `Entity`/`Import` records from a parsed tree.
    ///
    /// `jsx` selects the JSX grammar variant for `.jsx`/`.tsx` files; ignored by
    /// Python.
    fn extract(
        &self,
        tree: &tree_sitter::Tree,
        source: &[u8],
        file_path: &std::path::Path,
    ) -> common::ExtractionResult;
}

/// Resolve the `LanguageSupport` implementation for a language.
#[must_use]
pub fn get_language_support(language: Language) -> &'static dyn LanguageSupport {
    match language {
        Language::Python => &python::PythonSupport,
        Language::JavaScript => &javascript::JavaScriptSupport,
        Language::TypeScript => &typescript::TypeScriptSupport,
    }
}

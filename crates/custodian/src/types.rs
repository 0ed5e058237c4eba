//! Domain types for the reference-resolution pipeline.
//!
//! These types represent the core model described by the pipeline: source-level
//! `Entity` definitions, `Import` statements, and the `Reference`s that link one to
//! another. Everything here is plain data; the mutation sites (extraction, linking,
//! shielding) live in their own modules.
//!
//! ## Design decisions
//!
//! | Decision | Choice | Rationale |
//! |----------|--------|-----------|
//! | Language | Enum not String | Adding a language requires a `LanguageSupport` impl |
//! | `protected_by` | Field on `Entity`, written once | Shield pass is the only mutator |
//! | `symbol_id` | `SymbolKey(String)` newtype | Matches cache row keys; avoids stringly-typed mixups |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The languages this pipeline understands.
///
/// TSX is not a fourth variant: it is tracked separately as a JSX-grammar flag on
/// `TypeScript`, since the pipeline treats `.tsx` as a variant of L3, not a distinct
/// language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Python source files (`.py`)
    Python,
    /// JavaScript source files (`.js`, `.jsx`)
    JavaScript,
    /// TypeScript source files (`.ts`, `.tsx`)
    TypeScript,
}

impl Language {
    /// File extensions handled by this language.
    #[must_use]
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Python => &["py"],
            Self::JavaScript => &["js", "jsx"],
            Self::TypeScript => &["ts", "tsx"],
        }
    }

    /// Detect language from a file extension (without the leading dot).
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "py" => Some(Self::Python),
            "js" | "jsx" => Some(Self::JavaScript),
            "ts" | "tsx" => Some(Self::TypeScript),
            _ => None,
        }
    }

    /// Detect language (and file) from a path, by its extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Convert to the stable string used in cache rows and CLI flags.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
        }
    }
}

/// Whether a path's extension selects the JSX tree-sitter grammar variant.
#[must_use]
pub fn is_jsx_variant(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("jsx" | "tsx")
    )
}

/// The three kinds of definition the pipeline records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A free function or top-level arrow/function expression bound to a name.
    Function,
    /// A class definition.
    Class,
    /// A function defined inside a class body.
    Method,
}

impl EntityKind {
    /// Stable string used in cache rows.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Method => "method",
        }
    }
}

/// The kinds of reference the tracker can emit, per spec §3 and §4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// A name brought into scope by an import statement.
    Import,
    /// A direct call, `name()` or `obj.name()`.
    Call,
    /// Construction of a class, `Cls(...)`.
    Instantiation,
    /// The base identifier of a decorator, attribute or call form.
    Decorator,
    /// General identifier usage not covered by a more specific kind.
    Usage,
    /// Implicit reference to a dunder method granted by the Constructor Shield.
    ImplicitClassUsage,
    /// Implicit reference granted by the Inheritance Family Shield.
    InheritanceFamily,
    /// Implicit reference granted by framework lifecycle protection (e.g. `setUp`).
    FrameworkLifecycle,
    /// Reference via a typed dependency-injection pattern (`Depends(f)`, etc).
    DependencyInjection,
    /// Reference via a dotted string literal (`"a.b.c"` passed to a task/signature call).
    StringReference,
    /// Reference emitted by one of the framework-specific heuristic passes.
    Heuristic,
}

/// A source span, 1-indexed to match tree-sitter's row/column convention used
/// throughout the pipeline's diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Span {
    /// Construct a span, returning `None` if it is inverted (end before start).
    #[must_use]
    pub fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Option<Self> {
        if end_line < start_line || (end_line == start_line && end_column < start_column) {
            return None;
        }
        Some(Self {
            start_line,
            start_column,
            end_line,
            end_column,
        })
    }
}

/// A recorded top-level or class-scoped definition: function, class, or method.
///
/// Invariant: `qualified_name` uniquely identifies an `Entity` within a file;
/// `(file_path, qualified_name, start_line)` uniquely identifies it globally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
    /// Exact source bytes spanning the definition, including any attached decorators.
    pub full_text: String,
    pub file_path: PathBuf,
    pub start_line: u32,
    pub end_line: u32,
    /// `ParentClass.method`, or `name` when there is no enclosing class.
    pub qualified_name: String,
    pub parent_class: Option<String>,
    /// Declared base classes, in source order. Only meaningful for `EntityKind::Class`.
    pub base_classes: Vec<String>,
    /// Ordered decorator source fragments, outermost first.
    pub decorators: Vec<String>,
    /// Attribution string set by the shield pass; empty until then.
    pub protected_by: String,
}

impl Entity {
    /// The `symbol_id` used to key `DefinitionTable`/`ReferenceTable`: `file_path ::
    /// qualified_name`.
    #[must_use]
    pub fn symbol_key(&self) -> SymbolKey {
        SymbolKey::new(&self.file_path, &self.qualified_name)
    }

    /// A dunder method: name begins and ends with `__` and is longer than four
    /// characters (so `____` alone does not count).
    #[must_use]
    pub fn is_dunder(&self) -> bool {
        is_dunder_name(&self.name)
    }

    #[must_use]
    pub fn is_public(&self) -> bool {
        !self.name.starts_with('_')
    }
}

/// A method name qualifying as dunder per spec §4.7 / Glossary: starts and ends with
/// `__`, length greater than four.
#[must_use]
pub fn is_dunder_name(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

/// `symbol_id = file_path :: qualified_name`, modeled as an owned newtype so it can be
/// used as a `HashMap` key without repeatedly re-deriving the string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolKey(String);

impl SymbolKey {
    #[must_use]
    pub fn new(file_path: &Path, qualified_name: &str) -> Self {
        Self(format!("{}::{}", file_path.display(), qualified_name))
    }

    /// The synthetic bucket for references that could not be linked to any known
    /// definition. Never marks anything dead or alive.
    #[must_use]
    pub fn unknown(name: &str) -> Self {
        Self(format!("unknown::{name}"))
    }

    /// Rebuild a `SymbolKey` from its already-formatted string form, used when
    /// replaying a cached reference list (the cache stores the formatted key, not its
    /// file/name parts separately).
    #[must_use]
    pub fn from_raw(raw: String) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.0.starts_with("unknown::")
    }
}

impl std::fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An import statement as extracted from a syntax tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    /// Raw textual module/specifier, e.g. `".utils"`, `"react"`, `"a.b.c"`.
    pub module: String,
    /// Specific symbols pulled in; empty for a bare module import.
    pub names: Vec<String>,
    /// Begins with `.` (Python) or `./`/`../` (JS/TS).
    pub is_relative: bool,
    pub line_number: u32,
    pub file_path: PathBuf,
}

/// A reference from one point in the source to a named symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub symbol_name: String,
    pub file_path: PathBuf,
    pub line_number: u32,
    pub kind: ReferenceKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_round_trips_through_extension() {
        assert_eq!(Language::from_extension("py"), Some(Language::Python));
        assert_eq!(Language::from_extension("JSX"), Some(Language::JavaScript));
        assert_eq!(Language::from_extension("tsx"), Some(Language::TypeScript));
        assert_eq!(Language::from_extension("rb"), None);
    }

    #[test]
    fn jsx_variant_detected_only_for_jsx_and_tsx() {
        assert!(is_jsx_variant(Path::new("a.tsx")));
        assert!(is_jsx_variant(Path::new("a.jsx")));
        assert!(!is_jsx_variant(Path::new("a.ts")));
        assert!(!is_jsx_variant(Path::new("a.js")));
    }

    #[test]
    fn dunder_requires_length_over_four() {
        assert!(is_dunder_name("__init__"));
        assert!(!is_dunder_name("____")); // len 4, not > 4
        assert!(!is_dunder_name("_private"));
        assert!(!is_dunder_name("trailing__"));
    }

    #[test]
    fn span_rejects_inverted_ranges() {
        assert!(Span::new(1, 0, 2, 0).is_some());
        assert!(Span::new(2, 0, 1, 0).is_none());
        assert!(Span::new(1, 5, 1, 2).is_none());
        assert!(Span::new(1, 2, 1, 5).is_some());
    }

    #[test]
    fn symbol_key_unknown_bucket_is_marked() {
        let key = SymbolKey::unknown("mystery");
        assert!(key.is_unknown());
        assert_eq!(key.as_str(), "unknown::mystery");
    }

    #[test]
    fn symbol_key_combines_path_and_qualified_name() {
        let key = SymbolKey::new(Path::new("a/b.py"), "Foo.bar");
        assert_eq!(key.as_str(), format!("{}::Foo.bar", Path::new("a/b.py").display()));
    }
}

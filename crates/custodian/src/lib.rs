//! # Custodian: Reference Resolution & Shielding Pipeline
//!
//! Custodian finds dead code and orphan files across Python, JavaScript, and
//! TypeScript projects by building a cross-file reference graph with tree-sitter and
//! applying a layered set of shields (constructor/inheritance propagation, framework
//! lifecycle methods, config-file references, and a community/premium wisdom registry
//! of per-framework rules) before calling anything truly dead.
//!
//! ## Design Philosophy
//!
//! - **Conservative by construction**: a shield firing on a false positive is cheap;
//!   reporting a symbol dead that a framework calls by name is not.
//! - **Cached, not recomputed**: per-file definitions and references are cached by
//!   `(mtime, size)`; a whole-project fingerprint short-circuits an unchanged tree.
//! - **Layered accuracy**: tree-sitter AST extraction first, regex-based
//!   config/descriptor scanning second, an optional project-wide grep shield last.
//! - **Embeddable**: library first, CLI second.
//!
//! ## Quick Start
//!
//! ```no_run
//! use custodian::{AnalysisOptions, Language, analyze};
//! use std::path::Path;
//!
//! let options = AnalysisOptions::new(Path::new("/path/to/project"), Language::Python);
//! let outcome = analyze(&options)?;
//! println!("{} dead symbols, {} orphan files", outcome.dead_symbols.len(), outcome.orphan_files.len());
//! # Ok::<(), custodian::Error>(())
//! ```

mod analyzer;
mod config_refs;
mod db;
mod error;
mod graph;
mod heuristics;
mod languages;
mod orphans;
mod parallel;
mod resolver;
mod tracker;
mod types;
mod wisdom;

pub use analyzer::{analyze, default_rules_dir, AnalysisOptions, AnalysisOutcome, AnalysisStats, ALL_LANGUAGES};
pub use db::{AnalysisCache, CacheStats};
pub use error::{AnalysisError, AnalysisErrorKind, Error, Result};
pub use graph::DependencyGraph;
pub use types::{Entity, EntityKind, Import, Language, Reference, ReferenceKind, Span, SymbolKey};
pub use wisdom::{LicensingStatus, Tier};

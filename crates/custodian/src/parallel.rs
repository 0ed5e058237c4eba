//! Parallel per-file parse stage (spec §5).
//!
//! Phase 2 (parsing and extraction) is embarrassingly parallel: each file's tree-sitter
//! parse and entity/reference/heuristic extraction depends on nothing but its own
//! bytes. This module runs that stage with `rayon::par_iter`, in the same
//! phase-boundary-as-barrier shape as `tethys/src/parallel.rs`: a parallel stage feeds
//! a `Vec<ParsedFile>` in file order, and every caller treats that vector as a hard
//! barrier before doing anything sequential with it (registering definitions, then
//! linking references, spec §2).
//!
//! Python's advanced pass (`tracker::ingest_python_advanced`) needs a live
//! `tree_sitter::Tree` borrowed alongside its source bytes, and a `Tree` is not
//! `Send`. Rather than smuggle one across the `rayon` thread boundary, [`ParsedFile::Fresh`]
//! carries the raw source bytes for Python files only; the sequential Phase 3 caller
//! re-parses them in place, on the same thread that does the linking.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::db::AnalysisCache;
use crate::error::{AnalysisError, AnalysisErrorKind};
use crate::heuristics::{apply_js_heuristics, apply_python_heuristics, build_import_map, HeuristicOutcome};
use crate::languages::common::ExtractionResult;
use crate::languages::get_language_support;
use crate::tracker::{is_metaprogramming_dangerous, CachedReference};
use crate::types::{is_jsx_variant, Entity, Language};

/// One file's Phase 2 result: either replayed straight from the cache, or freshly
/// parsed and extracted.
pub enum ParsedFile {
    /// `path`'s `(mtime, size)` matched its cached entry and both its entities and its
    /// already-linked references were present, so nothing was parsed at all.
    Cached {
        path: PathBuf,
        language: Language,
        entities: Vec<Entity>,
        references: Vec<CachedReference>,
    },
    /// `path` was parsed and extracted fresh this run.
    Fresh {
        path: PathBuf,
        language: Language,
        extraction: ExtractionResult,
        heuristics: HeuristicOutcome,
        is_dangerous: bool,
        /// Present only for Python files, re-parsed synchronously during Phase 3
        /// linking so `ingest_python_advanced` can walk a live tree.
        python_source: Option<Vec<u8>>,
    },
    /// `path` could not be read, decoded, or parsed. Recorded, never fatal.
    Failed { path: PathBuf, error: AnalysisError },
}

impl ParsedFile {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Cached { path, .. } | Self::Fresh { path, .. } | Self::Failed { path, .. } => path,
        }
    }
}

/// Run Phase 2 over every file in `files`, in parallel, consulting `cache` for each
/// file's cache-hit eligibility.
///
/// A file only takes the full cache-hit path when both its symbol definitions *and*
/// its already-linked reference list are cached; a cached dependency list alone
/// (handled separately by `graph::build_graph`) is not enough to skip re-extraction,
/// since raw (unlinked) references are never persisted on their own.
#[must_use]
pub fn parse_files(files: &[PathBuf], cache: &AnalysisCache, library_mode: bool) -> Vec<ParsedFile> {
    files.par_iter().map(|path| parse_one(path, cache, library_mode)).collect()
}

fn parse_one(path: &Path, cache: &AnalysisCache, library_mode: bool) -> ParsedFile {
    let Some(language) = Language::from_path(path) else {
        return ParsedFile::Failed {
            path: path.to_path_buf(),
            error: AnalysisError::unsupported_language(path.to_path_buf()),
        };
    };

    if let Some(parsed) = try_cached(path, language, cache) {
        return parsed;
    }

    let source = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            return ParsedFile::Failed {
                path: path.to_path_buf(),
                error: AnalysisError::io_error(path.to_path_buf(), &e),
            };
        }
    };

    if std::str::from_utf8(&source).is_err() {
        return ParsedFile::Failed {
            path: path.to_path_buf(),
            error: AnalysisError::encoding_error(path.to_path_buf()),
        };
    }

    let support = get_language_support(language);
    let mut parser = tree_sitter::Parser::new();
    if parser.set_language(&support.tree_sitter_language(is_jsx_variant(path))).is_err() {
        return ParsedFile::Failed {
            path: path.to_path_buf(),
            error: AnalysisError::new(path.to_path_buf(), AnalysisErrorKind::ParseFailed, "grammar setup failed"),
        };
    }
    let Some(tree) = parser.parse(&source, None) else {
        return ParsedFile::Failed {
            path: path.to_path_buf(),
            error: AnalysisError::parse_failed(path.to_path_buf(), "tree-sitter produced no tree"),
        };
    };

    let extraction = support.extract(&tree, &source, path);
    let is_dangerous = is_metaprogramming_dangerous(&String::from_utf8_lossy(&source));

    let (heuristics, python_source) = match language {
        Language::Python => (apply_python_heuristics(&tree, &source), Some(source)),
        Language::JavaScript | Language::TypeScript => {
            let import_map = build_import_map(&tree, &source);
            (apply_js_heuristics(&tree, &source, &import_map, library_mode), None)
        }
    };

    ParsedFile::Fresh {
        path: path.to_path_buf(),
        language,
        extraction,
        heuristics,
        is_dangerous,
        python_source,
    }
}

fn try_cached(path: &Path, language: Language, cache: &AnalysisCache) -> Option<ParsedFile> {
    let entities = cache.get_symbol_definitions(path).ok().flatten()?;
    let raw_references = cache.get_file_references_raw(path).ok().flatten()?;
    let references = serde_json::from_str::<Vec<CachedReference>>(&raw_references).ok()?;
    Some(ParsedFile::Cached {
        path: path.to_path_buf(),
        language,
        entities,
        references,
    })
}

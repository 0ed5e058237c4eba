//! Orchestration (spec §2): ties the graph builder, extractor, tracker, shield pass,
//! and cache together behind one entry point, [`analyze`].
//!
//! Grounded on `tethys/src/lib.rs`'s `Tethys` struct (workspace root + db path fields,
//! a single constructor) restructured around one batch `analyze()` call rather than
//! `Tethys`'s incremental `index()`/`index_with_options()` pair, since this pipeline
//! has no equivalent of an LSP follow-up phase (spec §5: "single-threaded, batch; no
//! background tasks").

use std::path::{Path, PathBuf};

use tree_sitter::Parser;

use crate::config_refs::parse_all_configs;
use crate::db::AnalysisCache;
use crate::error::{AnalysisError, Error, Result};
use crate::graph::{self, DependencyGraph};
use crate::languages::get_language_support;
use crate::orphans::{detect_orphans, MetadataEntryPoints};
use crate::parallel::{parse_files, ParsedFile};
use crate::resolver::{load_ts_aliases, SymbolResolver, TsAliases};
use crate::tracker::ReferenceTracker;
use crate::types::{is_jsx_variant, Entity, Language};
use crate::wisdom::WisdomRegistry;

/// Languages this crate's Parser Facade understands, in a stable order used wherever
/// "every supported language" needs enumerating (discovery, rule-dir construction).
pub const ALL_LANGUAGES: &[Language] = &[Language::Python, Language::JavaScript, Language::TypeScript];

/// Configuration for one [`analyze`] call (spec §6 inputs).
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    project_root: PathBuf,
    language: Language,
    library_mode: bool,
    grep_shield: bool,
    include_vendored: bool,
    extensions: Option<Vec<String>>,
    rules_dir: Option<PathBuf>,
}

impl AnalysisOptions {
    /// Start from the required inputs (which project, and which language's symbols
    /// to report dead/protected for), with every other input at its spec-mandated
    /// default (`library_mode`, `grep_shield`, `include_vendored` all `false`; no
    /// extension-glob override; `rules_dir` resolved from the running executable).
    #[must_use]
    pub fn new(project_root: impl Into<PathBuf>, language: Language) -> Self {
        Self {
            project_root: project_root.into(),
            language,
            library_mode: false,
            grep_shield: false,
            include_vendored: false,
            extensions: None,
            rules_dir: None,
        }
    }

    #[must_use]
    pub fn with_library_mode(mut self, enabled: bool) -> Self {
        self.library_mode = enabled;
        self
    }

    #[must_use]
    pub fn with_grep_shield(mut self, enabled: bool) -> Self {
        self.grep_shield = enabled;
        self
    }

    #[must_use]
    pub fn with_include_vendored(mut self, enabled: bool) -> Self {
        self.include_vendored = enabled;
        self
    }

    /// Restrict discovery to these extensions (without the leading dot, e.g. `"py"`),
    /// instead of every extension every supported language owns. An empty or
    /// all-unsupported list discovers nothing; `None` (the default) keeps every
    /// extension of every supported language in scope, matching the original's
    /// `file_patterns=None` default (spec §4.5 / `graph_builder.py::build_graph`).
    #[must_use]
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    #[must_use]
    pub fn with_rules_dir(mut self, rules_dir: impl Into<PathBuf>) -> Self {
        self.rules_dir = Some(rules_dir.into());
        self
    }

    #[must_use]
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    #[must_use]
    pub fn language(&self) -> Language {
        self.language
    }

    fn resolved_rules_dir(&self) -> PathBuf {
        self.rules_dir.clone().unwrap_or_else(default_rules_dir)
    }
}

/// `<dir of the running executable>/rules`, falling back to a bare relative `rules`
/// directory when the executable's own path cannot be determined (e.g. under some
/// test harnesses). Mirrors `wisdom_registry.py`'s `Path(__file__).parent.parent.parent
/// / "rules"`: a location next to the running artifact, not embedded in it, so rule
/// packs can be dropped in or updated without a rebuild.
#[must_use]
pub fn default_rules_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .map(|dir| dir.join("rules"))
        .unwrap_or_else(|| PathBuf::from("rules"))
}

/// Per-shield-clause and per-phase counters surfaced to callers (the CLI's `analyze
/// --json`/text summary, spec §6's "protection counts per shield clause").
#[derive(Debug, Clone, Default)]
pub struct AnalysisStats {
    pub files_discovered: usize,
    pub files_parsed_fresh: usize,
    pub files_from_cache: usize,
    pub files_failed: usize,
    pub entities_total: usize,
    pub dead_symbols: usize,
    pub protected_symbols: usize,
    pub orphan_files: usize,
    /// `true` when the whole-project fingerprint matched and the entire pipeline
    /// (Phases 1-3 and the shield pass) was skipped in favor of a cached result.
    pub cache_hit: bool,
}

/// Everything one [`analyze`] call produces (spec §6 outputs).
#[derive(Debug, Clone, Default)]
pub struct AnalysisOutcome {
    pub dead_symbols: Vec<Entity>,
    pub orphan_files: Vec<PathBuf>,
    /// Every entity the shield pass protected, with `protected_by` populated. Empty on
    /// a whole-project cache hit: the cache only persists `dead_symbols`/
    /// `orphan_files`, so protection attribution cannot be reconstructed without
    /// rerunning the pipeline (see DESIGN.md Open Question: cache-hit protected-symbol
    /// reconstruction).
    pub protected_symbols: Vec<Entity>,
    pub graph: DependencyGraph,
    pub file_errors: Vec<AnalysisError>,
    pub stats: AnalysisStats,
}

/// Run the full Reference Resolution & Shielding Pipeline over `options.project_root`
/// (spec §2's control flow): cache fingerprint check, Phase 1 (dependency graph +
/// orphan detection), Phase 2 (per-file definition extraction, cached), Phase 3
/// (per-file reference linking, cached), then the Wisdom/Shield pass.
///
/// # Errors
///
/// Returns [`Error`] only for infrastructure failures (missing project root, cache
/// database failure); every per-file problem is collected into
/// [`AnalysisOutcome::file_errors`] instead.
pub fn analyze(options: &AnalysisOptions) -> Result<AnalysisOutcome> {
    let project_root = options
        .project_root
        .canonicalize()
        .map_err(|_| Error::ProjectRootNotFound(options.project_root.clone()))?;
    if !project_root.is_dir() {
        return Err(Error::ProjectRootNotFound(project_root));
    }

    let cache = AnalysisCache::open(&project_root)?;

    let mut files = graph::discover_files(&project_root, ALL_LANGUAGES, options.include_vendored);
    if let Some(extensions) = &options.extensions {
        files.retain(|f| f.extension().and_then(|e| e.to_str()).is_some_and(|ext| extensions.iter().any(|e| e == ext)));
    }

    // Phase 1: dependency graph. Built before the whole-project cache check (not just
    // after) because `build_graph` is itself cache-aware per file and cheap on a warm
    // cache, and the graph is part of this call's output regardless of whether the
    // rest of the pipeline short-circuits.
    let ts_aliases = load_ts_aliases(&project_root);
    let resolver = SymbolResolver::new(project_root.clone(), ts_aliases);
    let dep_graph = graph::build_graph(&project_root, &files, &cache, &resolver)?;

    let fingerprint = AnalysisCache::project_fingerprint(&files);
    if let Some(cached) = cache.get_cached_analysis_result(&fingerprint)? {
        let stats = AnalysisStats {
            files_discovered: files.len(),
            entities_total: cached.dead_symbols.len(),
            dead_symbols: cached.dead_symbols.len(),
            orphan_files: cached.orphan_files.len(),
            cache_hit: true,
            ..AnalysisStats::default()
        };
        return Ok(AnalysisOutcome {
            dead_symbols: cached.dead_symbols,
            orphan_files: cached.orphan_files,
            protected_symbols: Vec::new(),
            graph: dep_graph,
            file_errors: Vec::new(),
            stats,
        });
    }

    let metadata = MetadataEntryPoints::discover(&project_root);
    let orphan_files = detect_orphans(&dep_graph, &project_root, &metadata);

    // Phase 2: parallel per-file parse/extraction, cache-aware.
    let parsed = parse_files(&files, &cache, options.library_mode);

    let wisdom = WisdomRegistry::load(&options.resolved_rules_dir());
    let mut tracker = ReferenceTracker::new(project_root.clone(), options.library_mode, wisdom);
    tracker.set_config_references(parse_all_configs(&project_root));

    let mut file_errors = Vec::new();
    let mut files_parsed_fresh = 0usize;
    let mut files_from_cache = 0usize;

    // Phase 2 barrier: register every file's entities before any reference is linked
    // (spec §2/§5: no reference linking may observe a partial DefinitionTable).
    for file in &parsed {
        match file {
            ParsedFile::Cached { entities, .. } => {
                for entity in entities.clone() {
                    tracker.add_definition(entity);
                }
            }
            ParsedFile::Fresh { extraction, .. } => {
                tracker.register_entities(extraction);
            }
            ParsedFile::Failed { .. } => {}
        }
    }

    // Phase 3: link references, one file at a time, against the now-complete
    // DefinitionTable. Python files' advanced pass needs a live Tree, reparsed here
    // since it never crossed the rayon boundary (see `parallel.rs`).
    for file in parsed {
        match file {
            ParsedFile::Cached { references, .. } => {
                tracker.ingest_cached_references(&references);
                files_from_cache += 1;
            }
            ParsedFile::Fresh {
                path,
                language,
                extraction,
                heuristics,
                is_dangerous,
                python_source,
            } => {
                if is_dangerous {
                    tracker.mark_file_dangerous(path.clone());
                }

                let python_tree = python_source.as_deref().and_then(|source| reparse_python(&path, source));
                let python_ref = python_tree.as_ref().zip(python_source.as_deref());
                tracker.link_file(&path, &extraction, &heuristics, &resolver, python_ref);

                if let Err(e) = cache.set_symbol_definitions(&path, &extraction.entities) {
                    file_errors.push(AnalysisError::new(
                        path.clone(),
                        crate::error::AnalysisErrorKind::CacheError,
                        e.to_string(),
                    ));
                }
                if let Err(e) = cache.set_metaprogramming_danger(&path, is_dangerous) {
                    file_errors.push(AnalysisError::new(path.clone(), crate::error::AnalysisErrorKind::CacheError, e.to_string()));
                }
                let cached_refs = tracker.cached_references_for(&path);
                let payload = serde_json::to_string(&cached_refs).unwrap_or_else(|_| "[]".to_string());
                if let Err(e) = cache.set_file_references_raw(&path, &payload) {
                    file_errors.push(AnalysisError::new(path.clone(), crate::error::AnalysisErrorKind::CacheError, e.to_string()));
                }

                let _ = language;
                files_parsed_fresh += 1;
            }
            ParsedFile::Failed { error, .. } => file_errors.push(error),
        }
    }

    tracker.apply_framework_lifecycle_protection();

    let project_files: Vec<(PathBuf, String)> = if options.grep_shield {
        files
            .iter()
            .filter_map(|path| std::fs::read_to_string(path).ok().map(|text| (path.clone(), text)))
            .collect()
    } else {
        Vec::new()
    };

    let dead_symbols = tracker.find_dead_symbols(options.language, options.grep_shield, &project_files);
    let protected_symbols: Vec<Entity> = tracker.definitions().filter(|e| !e.protected_by.is_empty()).cloned().collect();
    let entities_total = tracker.definitions().count();

    cache.set_cached_analysis_result(
        &fingerprint,
        &crate::db::CachedAnalysisResult {
            dead_symbols: dead_symbols.clone(),
            orphan_files: orphan_files.clone(),
        },
    )?;

    let stats = AnalysisStats {
        files_discovered: files.len(),
        files_parsed_fresh,
        files_from_cache,
        files_failed: file_errors.len(),
        entities_total,
        dead_symbols: dead_symbols.len(),
        protected_symbols: protected_symbols.len(),
        orphan_files: orphan_files.len(),
        cache_hit: false,
    };

    Ok(AnalysisOutcome {
        dead_symbols,
        orphan_files,
        protected_symbols,
        graph: dep_graph,
        file_errors,
        stats,
    })
}

fn reparse_python(path: &Path, source: &[u8]) -> Option<tree_sitter::Tree> {
    let support = get_language_support(Language::Python);
    let mut parser = Parser::new();
    parser.set_language(&support.tree_sitter_language(is_jsx_variant(path))).ok()?;
    parser.parse(source, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn rules_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("rules")
    }

    #[test]
    fn analyze_reports_orphan_and_dead_symbol() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.py"), "if __name__ == '__main__':\n    pass\n").unwrap();
        fs::write(dir.path().join("orphan.py"), "def unused():\n    pass\n").unwrap();

        let options = AnalysisOptions::new(dir.path(), Language::Python).with_rules_dir(rules_dir());
        let outcome = analyze(&options).unwrap();

        assert!(outcome.orphan_files.iter().any(|p| p.ends_with("orphan.py")));
        assert!(outcome.dead_symbols.iter().any(|e| e.name == "unused"));
        assert!(!outcome.stats.cache_hit);
    }

    #[test]
    fn analyze_is_idempotent_against_its_own_cache() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "def helper():\n    pass\n\nhelper()\n").unwrap();

        let options = AnalysisOptions::new(dir.path(), Language::Python).with_rules_dir(rules_dir());
        let first = analyze(&options).unwrap();
        let second = analyze(&options).unwrap();

        assert!(second.stats.cache_hit);
        assert_eq!(first.dead_symbols.len(), second.dead_symbols.len());
        assert_eq!(first.orphan_files, second.orphan_files);
    }

    #[test]
    fn library_mode_only_shrinks_dead_symbols() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("lib.py"), "def public_api():\n    pass\n").unwrap();

        let without = analyze(&AnalysisOptions::new(dir.path(), Language::Python).with_rules_dir(rules_dir())).unwrap();
        let with_lib = AnalysisCache::open(dir.path()).unwrap();
        with_lib.clear().unwrap();
        let with = analyze(
            &AnalysisOptions::new(dir.path(), Language::Python)
                .with_rules_dir(rules_dir())
                .with_library_mode(true),
        )
        .unwrap();

        assert!(with.dead_symbols.len() <= without.dead_symbols.len());
    }
}

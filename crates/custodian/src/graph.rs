//! Dependency Graph Builder (spec §4.5).
//!
//! Discovers in-scope source files by extension, excluding a fixed directory set, and
//! builds a directed graph of "file A imports file B" edges using the [`crate::resolver`]
//! to turn each file's imports into resolved targets. Grounded on
//! `original_source/src/analyzer/graph_builder.py::DependencyGraphBuilder`; represented
//! in memory with `petgraph` rather than `graph_builder.py`'s `networkx` (DESIGN.md: the
//! one point this crate departs from the teacher's SQL-CTE storage choice while keeping
//! its dependency and "graph ops behind a small trait" shape).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::db::AnalysisCache;
use crate::error::Result;
use crate::languages::get_language_support;
use crate::resolver::SymbolResolver;
use crate::types::Language;

/// Directory names traversal never descends into, regardless of `--include-vendored`:
/// version control internals, this crate's own cache, and build/generated output
/// (spec §6).
pub const EXCLUDED_DIRS: &[&str] = &[".git", ".janitor_trash", ".janitor_cache", "__pycache__", "dist", "build"];

/// Third-party/vendored directory names, skipped during discovery unless
/// `--include-vendored` is set. Kept in sync with [`crate::orphans::is_vendored`]'s
/// list, which exists to protect vendored *files that did make it into the graph*
/// (a file can still reach `orphans.rs`/`tracker.rs` if discovery ran with
/// `include_vendored: true`).
pub const VENDORED_DIRS: &[&str] = &[
    "venv",
    ".venv",
    "env",
    ".virtualenv",
    "vendor",
    "extern",
    "third_party",
    "blib2to3",
    "_internal",
    ".tox",
    "site-packages",
    "node_modules",
];

fn is_excluded_dir(name: &std::ffi::OsStr, include_vendored: bool) -> bool {
    let Some(s) = name.to_str() else { return false };
    EXCLUDED_DIRS.contains(&s) || (!include_vendored && VENDORED_DIRS.contains(&s))
}

/// A directed graph over file-path nodes; an edge `a -> b` means `a` imports `b`.
/// May contain isolated nodes (spec §3).
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<PathBuf, ()>,
    index: HashMap<PathBuf, NodeIndex>,
}

impl DependencyGraph {
    fn new() -> Self {
        Self::default()
    }

    fn add_node(&mut self, path: &Path) -> NodeIndex {
        if let Some(&idx) = self.index.get(path) {
            return idx;
        }
        let idx = self.graph.add_node(path.to_path_buf());
        self.index.insert(path.to_path_buf(), idx);
        idx
    }

    fn add_edge(&mut self, from: &Path, to: &Path) {
        let from_idx = self.add_node(from);
        let to_idx = self.add_node(to);
        if !self.graph.contains_edge(from_idx, to_idx) {
            self.graph.add_edge(from_idx, to_idx, ());
        }
    }

    /// All file-path nodes in the graph.
    pub fn nodes(&self) -> impl Iterator<Item = &Path> {
        self.graph.node_weights().map(PathBuf::as_path)
    }

    /// Number of incoming edges to `path`'s node. Zero for paths not in the graph.
    #[must_use]
    pub fn in_degree(&self, path: &Path) -> usize {
        self.index
            .get(path)
            .map_or(0, |&idx| self.graph.edges_directed(idx, petgraph::Incoming).count())
    }

    /// Targets `path` imports (directly), or an empty vector if `path` is not a node.
    #[must_use]
    pub fn dependencies_of(&self, path: &Path) -> Vec<PathBuf> {
        self.index.get(path).map_or_else(Vec::new, |&idx| {
            self.graph
                .edges_directed(idx, petgraph::Outgoing)
                .map(|edge| self.graph[edge.target()].clone())
                .collect()
        })
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }
}

/// Discovers source files under `project_root` with one of `languages`' extensions,
/// never descending into [`EXCLUDED_DIRS`], and skipping [`VENDORED_DIRS`] unless
/// `include_vendored` is set. Results are sorted so project fingerprints and analysis
/// output are stable across runs (spec §5).
#[must_use]
pub fn discover_files(project_root: &Path, languages: &[Language], include_vendored: bool) -> Vec<PathBuf> {
    let mut extensions: Vec<&str> = languages.iter().flat_map(Language::extensions).copied().collect();
    extensions.sort_unstable();
    extensions.dedup();

    let mut files = Vec::new();
    walk(project_root, &extensions, include_vendored, &mut files);
    files.sort_unstable();
    files
}

fn walk(dir: &Path, extensions: &[&str], include_vendored: bool, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(std::result::Result::ok) {
        let path = entry.path();
        let file_name = entry.file_name();
        if path.is_dir() {
            if is_excluded_dir(&file_name, include_vendored) {
                continue;
            }
            walk(&path, extensions, include_vendored, out);
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.contains(&ext))
        {
            out.push(path);
        }
    }
}

/// Builds the dependency graph over `files`, using `cache` to skip re-parsing and
/// re-resolving files whose `(mtime, size)` has not changed (spec §4.5).
pub fn build_graph(
    project_root: &Path,
    files: &[PathBuf],
    cache: &AnalysisCache,
    resolver: &SymbolResolver,
) -> Result<DependencyGraph> {
    let mut graph = DependencyGraph::new();

    for file in files {
        graph.add_node(file);

        if let Some(cached_deps) = cache.get_file_dependencies(file)? {
            for target in &cached_deps {
                graph.add_edge(file, target);
            }
            continue;
        }

        let resolved = resolve_file_dependencies(project_root, file, resolver);
        cache.set_file_dependencies(file, &resolved)?;
        for target in &resolved {
            graph.add_edge(file, target);
        }
    }

    Ok(graph)
}

/// Parse `file`, extract its imports, resolve each one, and keep only targets that
/// exist on disk, matching `graph_builder.py::_process_file`'s "add edges for
/// resolved targets that `.exists()`" rule.
fn resolve_file_dependencies(_project_root: &Path, file: &Path, resolver: &SymbolResolver) -> Vec<PathBuf> {
    let Some(language) = Language::from_path(file) else {
        return Vec::new();
    };
    let Ok(source) = std::fs::read(file) else {
        return Vec::new();
    };

    let mut parser = tree_sitter::Parser::new();
    let support = get_language_support(language);
    if parser
        .set_language(&support.tree_sitter_language(crate::types::is_jsx_variant(file)))
        .is_err()
    {
        return Vec::new();
    }
    let Some(tree) = parser.parse(&source, None) else {
        return Vec::new();
    };

    let extraction = support.extract(&tree, &source, file);
    let mut targets = Vec::new();
    for import in &extraction.imports {
        if let Some(target) = resolver.resolve_source_file(file, &import.module) {
            if target.is_file() && !targets.contains(&target) {
                targets.push(target);
            }
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn discover_files_skips_excluded_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/vendor.js"), "").unwrap();
        fs::write(dir.path().join("app.js"), "").unwrap();

        let files = discover_files(dir.path(), &[Language::JavaScript], false);
        assert_eq!(files, vec![dir.path().join("app.js")]);
    }

    #[test]
    fn discover_files_includes_vendored_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/vendor.js"), "").unwrap();
        fs::write(dir.path().join("app.js"), "").unwrap();

        let files = discover_files(dir.path(), &[Language::JavaScript], true);
        assert_eq!(files, vec![dir.path().join("app.js"), dir.path().join("node_modules/vendor.js")]);
    }

    #[test]
    fn discover_files_sorted_for_stability() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("z.py"), "").unwrap();
        fs::write(dir.path().join("a.py"), "").unwrap();

        let files = discover_files(dir.path(), &[Language::Python], false);
        assert_eq!(files, vec![dir.path().join("a.py"), dir.path().join("z.py")]);
    }

    #[test]
    fn build_graph_adds_isolated_nodes_for_files_with_no_imports() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lonely.py");
        fs::write(&file, "x = 1\n").unwrap();
        let cache = AnalysisCache::open(dir.path()).unwrap();
        let resolver = SymbolResolver::new(dir.path(), crate::resolver::TsAliases::new());

        let graph = build_graph(dir.path(), &[file.clone()], &cache, &resolver).unwrap();
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.in_degree(&file), 0);
    }

    #[test]
    fn build_graph_links_resolved_import() {
        let dir = tempfile::tempdir().unwrap();
        let util = dir.path().join("util.py");
        let main = dir.path().join("main.py");
        fs::write(&util, "def helper():\n    pass\n").unwrap();
        fs::write(&main, "from util import helper\nhelper()\n").unwrap();
        let cache = AnalysisCache::open(dir.path()).unwrap();
        let resolver = SymbolResolver::new(dir.path(), crate::resolver::TsAliases::new());

        let files = vec![util.clone(), main.clone()];
        let graph = build_graph(dir.path(), &files, &cache, &resolver).unwrap();
        assert_eq!(graph.in_degree(&util), 1);
        assert_eq!(graph.in_degree(&main), 0);
        assert_eq!(graph.dependencies_of(&main), vec![util]);
    }

    #[test]
    fn build_graph_reuses_cached_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let util = dir.path().join("util.py");
        let main = dir.path().join("main.py");
        fs::write(&util, "def helper():\n    pass\n").unwrap();
        fs::write(&main, "from util import helper\n").unwrap();
        let cache = AnalysisCache::open(dir.path()).unwrap();
        let resolver = SymbolResolver::new(dir.path(), crate::resolver::TsAliases::new());
        let files = vec![util.clone(), main.clone()];

        let _ = build_graph(dir.path(), &files, &cache, &resolver).unwrap();
        assert!(cache.is_file_cached(&main));

        // Second build must not need to reparse; cached deps are reused verbatim.
        let graph = build_graph(dir.path(), &files, &cache, &resolver).unwrap();
        assert_eq!(graph.in_degree(&util), 1);
    }
}

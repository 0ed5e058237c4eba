//! Orphan Detector (spec §4.6).
//!
//! A file is an orphan iff it has zero incoming edges in the [`crate::graph`] and is not
//! an entry point, not vendored, and not immortal. Grounded on
//! `original_source/src/analyzer/orphan_detector.py::OrphanDetector`, with the directory
//! lists and case-insensitive matching pinned to spec §4.6/§6 rather than the Python
//! original's narrower, case-sensitive lists.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::graph::DependencyGraph;

/// Directories whose contents are never flagged as orphans or dead: tests, docs,
/// examples, tutorials, and similar "run me, don't import me" material.
const IMMORTAL_DIRECTORIES: &[&str] = &[
    "tests",
    "test",
    "examples",
    "example",
    "docs",
    "docs_src",
    "documentation",
    "scripts",
    "tutorial",
    "tutorials",
    "benchmarks",
    "sandbox",
    "bin",
    "requirements",
    "tools",
    "profiling",
    "action",
    "actions",
    "blib2to3",
    "doc",
];

/// Directories holding third-party or generated code, never subject to orphan/dead
/// analysis at all.
const VENDORED_DIRECTORIES: &[&str] = &[
    "venv",
    ".venv",
    "env",
    ".virtualenv",
    "vendor",
    "extern",
    "third_party",
    "blib2to3",
    "_internal",
    "dist",
    "build",
    "__pycache__",
    "node_modules",
    ".tox",
    "site-packages",
    ".git",
    ".janitor_trash",
    ".janitor_cache",
];

/// Python entry-point filenames, checked by exact basename.
const PYTHON_ENTRY_FILENAMES: &[&str] = &["__init__.py", "__main__.py"];

fn matches_any(path: &Path, project_root: &Path, directories: &[&str]) -> bool {
    let Ok(rel) = path.strip_prefix(project_root) else {
        return false;
    };
    rel.components().any(|c| {
        let Some(s) = c.as_os_str().to_str() else {
            return false;
        };
        directories.iter().any(|d| d.eq_ignore_ascii_case(s))
    })
}

/// True if any path component of `path` (relative to `project_root`) names a vendored
/// directory (case-insensitive).
#[must_use]
pub fn is_vendored(path: &Path, project_root: &Path) -> bool {
    matches_any(path, project_root, VENDORED_DIRECTORIES)
}

/// True if any path component of `path` (relative to `project_root`) names an immortal
/// directory (case-insensitive). The **Directory Shield** (spec §4.7.1 clause 1) reuses
/// this for dead-symbol protection, not just orphan detection.
#[must_use]
pub fn is_immortal_directory(path: &Path, project_root: &Path) -> bool {
    matches_any(path, project_root, IMMORTAL_DIRECTORIES)
}

/// The specific immortal directory component that protects `path`, if any: the
/// **Directory Shield**'s attribution text (`"Directory: {name}/"`) needs the matched
/// name itself, not just whether one matched.
#[must_use]
pub fn immortal_directory_match(path: &Path, project_root: &Path) -> Option<String> {
    let rel = path.strip_prefix(project_root).ok()?;
    rel.components().find_map(|c| {
        let s = c.as_os_str().to_str()?;
        IMMORTAL_DIRECTORIES
            .iter()
            .find(|d| d.eq_ignore_ascii_case(s))
            .map(|d| (*d).to_string())
    })
}

/// Entry points declared by project descriptor files (`pyproject.toml`, `setup.cfg`,
/// `package.json`), resolved to absolute file paths. Parsed once per project and reused
/// across every orphan check.
#[derive(Default)]
pub struct MetadataEntryPoints {
    paths: HashSet<PathBuf>,
}

impl MetadataEntryPoints {
    /// Parse every descriptor file present at `project_root`. Malformed or missing
    /// descriptors are skipped silently, matching the original's best-effort parsing
    /// (spec §9 Open Question 1: descriptor edge cases accepted as-is).
    #[must_use]
    pub fn discover(project_root: &Path) -> Self {
        let mut paths = HashSet::new();
        parse_pyproject_toml(project_root, &mut paths);
        parse_setup_cfg(project_root, &mut paths);
        parse_package_json(project_root, &mut paths);
        Self { paths }
    }

    fn contains(&self, path: &Path) -> bool {
        std::fs::canonicalize(path)
            .map(|p| self.paths.contains(&p))
            .unwrap_or(false)
    }
}

fn resolve_module_path(project_root: &Path, module_part: &str) -> Option<PathBuf> {
    let rel = module_part.replace('.', "/");
    let candidates = [
        project_root.join(format!("{rel}.py")),
        project_root.join("src").join(format!("{rel}.py")),
        project_root.join(&rel).join("__init__.py"),
        project_root.join("src").join(&rel).join("__init__.py"),
    ];
    candidates.into_iter().find(|p| p.is_file())
}

/// Resolve a metadata script value of shape `pkg.mod:func` (optionally `key = pkg.mod:func`
/// lines for multi-line `setup.cfg` values) to file paths.
fn resolve_metadata_value(project_root: &Path, value: &str, out: &mut HashSet<PathBuf>) {
    for raw_line in value.trim().lines() {
        let line = raw_line.split('=').next_back().unwrap_or(raw_line).trim();
        let module_part = line.split(':').next().unwrap_or("").trim();
        if module_part.is_empty() {
            continue;
        }
        if let Some(path) = resolve_module_path(project_root, module_part) {
            if let Ok(canon) = std::fs::canonicalize(&path) {
                out.insert(canon);
            }
        }
    }
}

fn parse_pyproject_toml(project_root: &Path, out: &mut HashSet<PathBuf>) {
    let Ok(text) = std::fs::read_to_string(project_root.join("pyproject.toml")) else {
        return;
    };
    let Ok(value) = text.parse::<toml::Value>() else {
        return;
    };

    let mut collect_table = |table: Option<&toml::Value>| {
        if let Some(toml::Value::Table(map)) = table {
            for v in map.values() {
                if let Some(s) = v.as_str() {
                    resolve_metadata_value(project_root, s, out);
                }
            }
        }
    };

    collect_table(value.get("project").and_then(|p| p.get("scripts")));

    if let Some(toml::Value::Table(groups)) = value.get("project").and_then(|p| p.get("entry-points")) {
        for group in groups.values() {
            collect_table(Some(group));
        }
    }

    collect_table(
        value
            .get("tool")
            .and_then(|t| t.get("flit"))
            .and_then(|f| f.get("metadata"))
            .and_then(|m| m.get("scripts")),
    );
}

fn parse_setup_cfg(project_root: &Path, out: &mut HashSet<PathBuf>) {
    let Ok(text) = std::fs::read_to_string(project_root.join("setup.cfg")) else {
        return;
    };
    let mut in_entry_points_section = false;
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(section) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            in_entry_points_section = section.to_ascii_lowercase().contains("entry_points");
            continue;
        }
        if in_entry_points_section {
            if let Some((_, value)) = trimmed.split_once('=') {
                resolve_metadata_value(project_root, value, out);
            }
        }
    }
}

fn collect_json_export_paths(project_root: &Path, value: &serde_json::Value, out: &mut HashSet<PathBuf>) {
    match value {
        serde_json::Value::String(s) if s.starts_with("./") || s.contains('/') => {
            if let Ok(canon) = std::fs::canonicalize(project_root.join(s)) {
                out.insert(canon);
            }
        }
        serde_json::Value::Object(map) => {
            for v in map.values() {
                collect_json_export_paths(project_root, v, out);
            }
        }
        serde_json::Value::Array(items) => {
            for v in items {
                collect_json_export_paths(project_root, v, out);
            }
        }
        serde_json::Value::String(_) => {}
        _ => {}
    }
}

fn parse_package_json(project_root: &Path, out: &mut HashSet<PathBuf>) {
    let Ok(text) = std::fs::read_to_string(project_root.join("package.json")) else {
        return;
    };
    let Ok(data) = serde_json::from_str::<serde_json::Value>(&text) else {
        return;
    };

    let mut add = |rel: &str| {
        if let Ok(canon) = std::fs::canonicalize(project_root.join(rel)) {
            out.insert(canon);
        }
    };

    match data.get("bin") {
        Some(serde_json::Value::String(s)) => add(s),
        Some(serde_json::Value::Object(map)) => {
            for v in map.values() {
                if let Some(s) = v.as_str() {
                    add(s);
                }
            }
        }
        _ => {}
    }

    match data.get("browser") {
        Some(serde_json::Value::String(s)) => add(s),
        Some(serde_json::Value::Object(map)) => {
            for (key, val) in map {
                if key.starts_with("./") || key.contains('/') {
                    add(key);
                }
                if let Some(s) = val.as_str() {
                    add(s);
                }
            }
        }
        _ => {}
    }

    if let Some(s) = data.get("module").and_then(|v| v.as_str()) {
        add(s);
    }

    if let Some(exports) = data.get("exports") {
        collect_json_export_paths(project_root, exports, out);
    }
}

fn has_python_main_guard_or_cli_app(path: &Path) -> bool {
    let Ok(content) = std::fs::read_to_string(path) else {
        return false;
    };
    content.contains("typer.Typer(")
        || content.contains("typer.Typer =")
        || content.contains("if __name__ == \"__main__\"")
        || content.contains("if __name__ == '__main__'")
}

/// True if `path` should never be reported as an orphan or dead regardless of its
/// reference count: package initializers, project-root files, declared descriptor
/// entry points, and L1 files with a main-guard or CLI-framework app object.
#[must_use]
pub fn is_entry_point(path: &Path, project_root: &Path, metadata: &MetadataEntryPoints) -> bool {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        if PYTHON_ENTRY_FILENAMES.contains(&name) {
            return true;
        }
    }

    if let Ok(rel) = path.strip_prefix(project_root) {
        if rel.parent().is_some_and(|p| p.as_os_str().is_empty()) {
            return true;
        }
    }

    if metadata.contains(path) {
        return true;
    }

    if path.extension().and_then(|e| e.to_str()) == Some("py") && has_python_main_guard_or_cli_app(path) {
        return true;
    }

    false
}

/// Every file with zero incoming edges that is not vendored, immortal, or an entry
/// point.
#[must_use]
pub fn detect_orphans(graph: &DependencyGraph, project_root: &Path, metadata: &MetadataEntryPoints) -> Vec<PathBuf> {
    let mut orphans: Vec<PathBuf> = graph
        .nodes()
        .filter(|path| graph.in_degree(path) == 0)
        .filter(|path| !is_vendored(path, project_root))
        .filter(|path| !is_immortal_directory(path, project_root))
        .filter(|path| !is_entry_point(path, project_root, metadata))
        .map(Path::to_path_buf)
        .collect();
    orphans.sort_unstable();
    orphans
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn init_py_is_never_an_orphan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg/__init__.py");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "").unwrap();
        let metadata = MetadataEntryPoints::default();
        assert!(is_entry_point(&path, dir.path(), &metadata));
    }

    #[test]
    fn root_level_file_is_an_entry_point() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.py");
        fs::write(&path, "").unwrap();
        let metadata = MetadataEntryPoints::default();
        assert!(is_entry_point(&path, dir.path(), &metadata));
    }

    #[test]
    fn nested_file_without_main_guard_is_not_an_entry_point() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg/util.py");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "def helper():\n    pass\n").unwrap();
        let metadata = MetadataEntryPoints::default();
        assert!(!is_entry_point(&path, dir.path(), &metadata));
    }

    #[test]
    fn main_guard_makes_nested_file_an_entry_point() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg/run.py");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "if __name__ == \"__main__\":\n    pass\n").unwrap();
        let metadata = MetadataEntryPoints::default();
        assert!(is_entry_point(&path, dir.path(), &metadata));
    }

    #[test]
    fn immortal_directory_matches_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Tests/test_thing.py");
        assert!(is_immortal_directory(&path, dir.path()));
    }

    #[test]
    fn vendored_directory_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node_modules/pkg/index.js");
        assert!(is_vendored(&path, dir.path()));
    }

    #[test]
    fn pyproject_scripts_become_metadata_entry_points() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("pyproject.toml"),
            "[project.scripts]\nmycli = \"pkg.cli:main\"\n",
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/cli.py"), "def main():\n    pass\n").unwrap();

        let metadata = MetadataEntryPoints::discover(dir.path());
        assert!(is_entry_point(&dir.path().join("pkg/cli.py"), dir.path(), &metadata));
    }

    #[test]
    fn nested_unreferenced_file_with_zero_in_degree_is_an_orphan() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        let orphan_path = dir.path().join("pkg/forgotten.py");
        fs::write(&orphan_path, "def unused():\n    pass\n").unwrap();

        let mut graph = crate::graph::discover_files(dir.path(), &[crate::types::Language::Python], false);
        graph.sort_unstable();
        assert_eq!(graph, vec![orphan_path.clone()]);

        let cache = crate::db::AnalysisCache::open(dir.path()).unwrap();
        let resolver = crate::resolver::SymbolResolver::new(dir.path(), crate::resolver::TsAliases::new());
        let dep_graph = crate::graph::build_graph(dir.path(), &graph, &cache, &resolver).unwrap();
        let metadata = MetadataEntryPoints::default();

        let orphans = detect_orphans(&dep_graph, dir.path(), &metadata);
        assert_eq!(orphans, vec![orphan_path]);
    }
}

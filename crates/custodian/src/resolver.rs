//! Symbol Resolver (spec §4.3): turns an import string into the absolute path of the
//! file it refers to, on disk, using per-language resolution semantics.
//!
//! Grounded on `original_source/src/analyzer/resolver.py`'s `SymbolResolver`: the dotted
//! relative-import algorithm, the JS/TS extension-probe order, and the tsconfig
//! first-target alias replacement are all carried over unchanged in semantics. Absolute
//! Python imports probe both `project_root/<path>` and `project_root/src/<path>` per
//! spec §4.3, covering `src/`-layout projects the original implementation does not.

use std::path::{Path, PathBuf};

use crate::types::Language;

/// `tsconfig.json` `compilerOptions.paths` entries, normalized so `"@app/*": ["src/*"]`
/// becomes `alias = "@app"`, `target = "src"` (only the first target is kept, matching
/// the original implementation's simplification).
#[derive(Debug, Clone, Default)]
pub struct TsAliases(Vec<(String, String)>);

impl TsAliases {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw `tsconfig.json` path entries (`alias -> [targets]`), in
    /// declaration order (first declared alias wins ties, matching a `dict`'s
    /// insertion-ordered iteration in the original).
    #[must_use]
    pub fn from_raw(paths: &[(String, Vec<String>)]) -> Self {
        let mut out = Vec::new();
        for (alias, targets) in paths {
            let Some(first_target) = targets.first() else { continue };
            let clean_alias = alias.replace("/*", "");
            let clean_target = first_target.replace("/*", "");
            out.push((clean_alias, clean_target));
        }
        Self(out)
    }

    fn find(&self, import_string: &str) -> Option<(&str, &str)> {
        self.0
            .iter()
            .find(|(alias, _)| import_string.starts_with(alias.as_str()))
            .map(|(a, t)| (a.as_str(), t.as_str()))
    }
}

/// Read `compilerOptions.paths` out of `<project_root>/tsconfig.json`, if present, and
/// build a [`TsAliases`] table from it. Comments are stripped the same way
/// `config_refs::parse_tsconfig_json` does, since `tsconfig.json` is JSON-with-comments
/// in practice. Missing or malformed files yield an empty table (per-descriptor
/// tolerated failure, spec §7) rather than an error.
#[must_use]
pub fn load_ts_aliases(project_root: &Path) -> TsAliases {
    let path = project_root.join("tsconfig.json");
    let Ok(raw) = std::fs::read_to_string(&path) else {
        return TsAliases::new();
    };
    let stripped = strip_jsonc_comments(&raw);
    let Ok(data) = serde_json::from_str::<serde_json::Value>(&stripped) else {
        return TsAliases::new();
    };
    let Some(paths) = data.get("compilerOptions").and_then(|c| c.get("paths")).and_then(|p| p.as_object()) else {
        return TsAliases::new();
    };

    let mut raw_paths = Vec::new();
    for (alias, targets) in paths {
        let Some(targets) = targets.as_array() else { continue };
        let targets: Vec<String> = targets.iter().filter_map(|t| t.as_str().map(String::from)).collect();
        raw_paths.push((alias.clone(), targets));
    }
    TsAliases::from_raw(&raw_paths)
}

fn strip_jsonc_comments(text: &str) -> String {
    let no_block = {
        let mut out = String::with_capacity(text.len());
        let mut chars = text.chars().peekable();
        let mut in_block = false;
        while let Some(c) = chars.next() {
            if in_block {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    in_block = false;
                }
                continue;
            }
            if c == '/' && chars.peek() == Some(&'*') {
                chars.next();
                in_block = true;
                continue;
            }
            out.push(c);
        }
        out
    };
    no_block
        .lines()
        .map(|line| match line.find("//") {
            Some(idx) => &line[..idx],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Probes `path` + each JS/TS extension for an existing file, then falls back to
/// directory `index.<ext>` probing. Order matches `resolver.py::_probe_js_path`.
const JS_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".d.ts", ".js", ".jsx", ".json"];

/// Resolves import strings to absolute file paths given a project root and a
/// filesystem to probe against.
pub struct SymbolResolver {
    root: PathBuf,
    ts_aliases: TsAliases,
}

impl SymbolResolver {
    #[must_use]
    pub fn new(project_root: impl Into<PathBuf>, ts_aliases: TsAliases) -> Self {
        Self {
            root: project_root.into(),
            ts_aliases,
        }
    }

    /// Resolve `import_string`, written inside `current_file`, to the absolute path of
    /// the file it names. Returns `None` if unresolvable (external package, dynamic
    /// import, or a path that does not exist on disk); the caller treats this as an
    /// external dependency, never an error.
    #[must_use]
    pub fn resolve_source_file(&self, current_file: &Path, import_string: &str) -> Option<PathBuf> {
        if import_string.is_empty() {
            return None;
        }
        match Language::from_path(current_file)? {
            Language::Python => self.resolve_python_import(current_file, import_string),
            Language::JavaScript | Language::TypeScript => self.resolve_js_import(current_file, import_string),
        }
    }

    // -- Python --------------------------------------------------------

    fn resolve_python_import(&self, current_file: &Path, import_string: &str) -> Option<PathBuf> {
        if let Some(rest) = import_string.strip_prefix('.') {
            let _ = rest;
            self.resolve_python_relative(current_file, import_string)
        } else {
            self.resolve_python_absolute(import_string)
        }
    }

    fn resolve_python_relative(&self, current_file: &Path, import_string: &str) -> Option<PathBuf> {
        let dots = import_string.chars().take_while(|&c| c == '.').count();
        let module_part = &import_string[dots..];

        let mut base_dir = current_file.parent()?.to_path_buf();
        for _ in 0..dots.saturating_sub(1) {
            base_dir = base_dir.parent()?.to_path_buf();
        }

        if module_part.is_empty() {
            return self.check_python_path(&base_dir);
        }

        let rel_path = module_part.replace('.', "/");
        self.check_python_path(&base_dir.join(rel_path))
    }

    fn resolve_python_absolute(&self, import_string: &str) -> Option<PathBuf> {
        let rel_path = import_string.replace('.', "/");
        self.check_python_path(&self.root.join(&rel_path))
            .or_else(|| self.check_python_path(&self.root.join("src").join(&rel_path)))
    }

    /// `path_no_ext.py`, then `path_no_ext/__init__.py`.
    fn check_python_path(&self, path_no_ext: &Path) -> Option<PathBuf> {
        let as_file = path_no_ext.with_extension("py");
        if as_file.is_file() {
            return Some(as_file);
        }
        let as_package = path_no_ext.join("__init__.py");
        if as_package.is_file() {
            return Some(as_package);
        }
        None
    }

    // -- JS / TS ---------------------------------------------------------

    fn resolve_js_import(&self, current_file: &Path, import_string: &str) -> Option<PathBuf> {
        if import_string.starts_with('.') {
            let candidate = current_file.parent()?.join(import_string);
            return self.probe_js_path(&candidate);
        }

        if let Some((alias, target)) = self.ts_aliases.find(import_string) {
            let mut remainder = &import_string[alias.len()..];
            remainder = remainder.strip_prefix('/').unwrap_or(remainder);
            let candidate = self.root.join(target).join(remainder);
            return self.probe_js_path(&candidate);
        }

        let candidate = self.root.join(import_string);
        self.probe_js_path(&candidate)
    }

    fn probe_js_path(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        for ext in JS_EXTENSIONS {
            let candidate = append_extension(path, ext);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        if path.is_dir() {
            for ext in JS_EXTENSIONS {
                let index = path.join(format!("index{ext}"));
                if index.is_file() {
                    return Some(index);
                }
            }
        }
        None
    }
}

/// Appends `ext` (e.g. `".ts"`) to `path`'s final component rather than replacing an
/// existing extension: `./util` + `.ts` must become `./util.ts`, not drop `util`.
fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.file_name().map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    name.push_str(ext);
    match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn resolves_python_absolute_import() {
        let dir = setup();
        let root = dir.path();
        fs::create_dir_all(root.join("pkg")).unwrap();
        fs::write(root.join("pkg/mod.py"), "").unwrap();
        let resolver = SymbolResolver::new(root, TsAliases::new());
        let current = root.join("main.py");
        fs::write(&current, "").unwrap();
        let resolved = resolver.resolve_source_file(&current, "pkg.mod");
        assert_eq!(resolved, Some(root.join("pkg/mod.py")));
    }

    #[test]
    fn resolves_python_absolute_import_under_src_layout() {
        let dir = setup();
        let root = dir.path();
        fs::create_dir_all(root.join("src/pkg")).unwrap();
        fs::write(root.join("src/pkg/mod.py"), "").unwrap();
        let resolver = SymbolResolver::new(root, TsAliases::new());
        let current = root.join("src/main.py");
        fs::write(&current, "").unwrap();
        let resolved = resolver.resolve_source_file(&current, "pkg.mod");
        assert_eq!(resolved, Some(root.join("src/pkg/mod.py")));
    }

    #[test]
    fn resolves_python_relative_single_dot_to_init() {
        let dir = setup();
        let root = dir.path();
        fs::create_dir_all(root.join("pkg")).unwrap();
        fs::write(root.join("pkg/__init__.py"), "").unwrap();
        let resolver = SymbolResolver::new(root, TsAliases::new());
        let current = root.join("pkg/mod.py");
        fs::write(&current, "").unwrap();
        let resolved = resolver.resolve_source_file(&current, ".");
        assert_eq!(resolved, Some(root.join("pkg/__init__.py")));
    }

    #[test]
    fn resolves_python_relative_two_dots_to_parent() {
        let dir = setup();
        let root = dir.path();
        fs::create_dir_all(root.join("pkg/sub")).unwrap();
        fs::write(root.join("pkg/sibling.py"), "").unwrap();
        let resolver = SymbolResolver::new(root, TsAliases::new());
        let current = root.join("pkg/sub/mod.py");
        fs::write(&current, "").unwrap();
        let resolved = resolver.resolve_source_file(&current, "..sibling");
        assert_eq!(resolved, Some(root.join("pkg/sibling.py")));
    }

    #[test]
    fn resolves_js_relative_import_probing_extensions() {
        let dir = setup();
        let root = dir.path();
        fs::write(root.join("util.ts"), "").unwrap();
        let resolver = SymbolResolver::new(root, TsAliases::new());
        let current = root.join("index.ts");
        fs::write(&current, "").unwrap();
        let resolved = resolver.resolve_source_file(&current, "./util");
        assert_eq!(resolved, Some(root.join("util.ts")));
    }

    #[test]
    fn resolves_js_directory_import_to_index() {
        let dir = setup();
        let root = dir.path();
        fs::create_dir_all(root.join("components")).unwrap();
        fs::write(root.join("components/index.tsx"), "").unwrap();
        let resolver = SymbolResolver::new(root, TsAliases::new());
        let current = root.join("app.tsx");
        fs::write(&current, "").unwrap();
        let resolved = resolver.resolve_source_file(&current, "./components");
        assert_eq!(resolved, Some(root.join("components/index.tsx")));
    }

    #[test]
    fn resolves_ts_alias_using_first_target_only() {
        let dir = setup();
        let root = dir.path();
        fs::create_dir_all(root.join("src/app")).unwrap();
        fs::write(root.join("src/app/widget.ts"), "").unwrap();
        let aliases = TsAliases::from_raw(&[("@app/*".to_string(), vec!["src/app/*".to_string()])]);
        let resolver = SymbolResolver::new(root, aliases);
        let current = root.join("main.ts");
        fs::write(&current, "").unwrap();
        let resolved = resolver.resolve_source_file(&current, "@app/widget");
        assert_eq!(resolved, Some(root.join("src/app/widget.ts")));
    }

    #[test]
    fn unresolvable_import_returns_none() {
        let dir = setup();
        let root = dir.path();
        let resolver = SymbolResolver::new(root, TsAliases::new());
        let current = root.join("main.py");
        fs::write(&current, "").unwrap();
        assert_eq!(resolver.resolve_source_file(&current, "completely.missing.module"), None);
    }
}

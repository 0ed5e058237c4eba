//! Config Reference Extractor (spec §4.9).
//!
//! Scans a fixed set of descriptor and infrastructure-config files for symbol strings
//! that function as wiring outside the source graph: serverless handlers, Django
//! settings, docker commands, Airflow callables, and package/tsconfig entry points.
//! Grounded on `original_source/src/analyzer/config_parser.py::ConfigParser`; the
//! `pyproject.toml`/`setup.cfg` entry-point handling is an addition not present in the
//! original (spec §6 lists them as Config Extractor inputs alongside `package.json`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use std::sync::LazyLock;

/// Every `(config_file, reason)` pair a symbol name was found referenced by.
pub type ConfigReferences = HashMap<String, Vec<(PathBuf, String)>>;

fn add_reference(out: &mut ConfigReferences, name: &str, config_file: &Path, reason: &str) {
    if name.is_empty() {
        return;
    }
    out.entry(name.to_string())
        .or_default()
        .push((config_file.to_path_buf(), reason.to_string()));
}

static HANDLER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"handler:\s*([a-zA-Z0-9_.]+)").expect("static regex"));
static SAM_HANDLER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Handler:\s*([a-zA-Z0-9_.]+)").expect("static regex"));
static INSTALLED_APPS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)INSTALLED_APPS\s*=\s*\[(.*?)\]").expect("static regex"));
static MIDDLEWARE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)MIDDLEWARE\s*=\s*\[(.*?)\]").expect("static regex"));
static QUOTED_STRING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"]([^'"]+)['"]"#).expect("static regex"));
static PYTHON_MODULE_COMMAND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"python\s+-m\s+([a-zA-Z0-9_.]+)").expect("static regex"));
static PYTHON_SCRIPT_COMMAND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"python\s+([a-zA-Z0-9_./]+\.py)"#).expect("static regex"));
static PYTHON_ARRAY_COMMAND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[\s*["']python["']\s*,\s*["']([a-zA-Z0-9_./]+\.py)["']"#).expect("static regex"));
static PYTHON_CALLABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"python_callable\s*=\s*(\w+)").expect("static regex"));
static TASK_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"task_id\s*=\s*["'](\w+)["']"#).expect("static regex"));
static SCRIPT_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-zA-Z0-9_\-./]+\.(?:js|ts|jsx|tsx|mjs|cjs))").expect("static regex"));

/// Run every sub-parser against `project_root` and return the union of their findings.
/// Missing or malformed files are silently skipped (spec §7 "per-descriptor tolerated").
#[must_use]
pub fn parse_all_configs(project_root: &Path) -> ConfigReferences {
    let mut out = ConfigReferences::new();
    parse_serverless_yml(project_root, &mut out);
    parse_sam_template(project_root, &mut out);
    parse_django_settings(project_root, &mut out);
    parse_docker_compose(project_root, &mut out);
    parse_airflow_dags(project_root, &mut out);
    parse_package_json(project_root, &mut out);
    parse_tsconfig_json(project_root, &mut out);
    parse_pyproject_entry_points(project_root, &mut out);
    parse_setup_cfg_entry_points(project_root, &mut out);
    out
}

fn parse_serverless_yml(project_root: &Path, out: &mut ConfigReferences) {
    let path = project_root.join("serverless.yml");
    let Ok(text) = std::fs::read_to_string(&path) else {
        return;
    };
    for cap in HANDLER_RE.captures_iter(&text) {
        let dotted = &cap[1];
        let name = dotted.rsplit('.').next().unwrap_or(dotted);
        add_reference(out, name, &path, "serverless.yml handler");
    }
}

fn parse_sam_template(project_root: &Path, out: &mut ConfigReferences) {
    for filename in ["template.yaml", "template.yml"] {
        let path = project_root.join(filename);
        let Ok(text) = std::fs::read_to_string(&path) else {
            continue;
        };
        for cap in SAM_HANDLER_RE.captures_iter(&text) {
            let dotted = &cap[1];
            let name = dotted.rsplit('.').next().unwrap_or(dotted);
            add_reference(out, name, &path, "SAM template handler");
        }
    }
}

/// `settings.py` at the project root, under `config/`/`project/`, or inside any
/// directory named `settings`.
fn find_django_settings_files(project_root: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    for rel in ["settings.py", "config/settings.py", "project/settings.py"] {
        let path = project_root.join(rel);
        if path.is_file() {
            candidates.push(path);
        }
    }
    find_settings_dirs(project_root, &mut candidates);
    candidates
}

fn find_settings_dirs(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(std::result::Result::ok) {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if path.file_name().and_then(|n| n.to_str()) == Some("settings") {
            for candidate in ["__init__.py", "base.py"] {
                let file = path.join(candidate);
                if file.is_file() {
                    out.push(file);
                }
            }
        }
        if crate::graph::EXCLUDED_DIRS
            .iter()
            .any(|d| path.file_name().and_then(|n| n.to_str()) == Some(d))
        {
            continue;
        }
        find_settings_dirs(&path, out);
    }
}

fn parse_django_settings(project_root: &Path, out: &mut ConfigReferences) {
    for path in find_django_settings_files(project_root) {
        let Ok(text) = std::fs::read_to_string(&path) else {
            continue;
        };
        if let Some(cap) = INSTALLED_APPS_RE.captures(&text) {
            for entry in QUOTED_STRING_RE.captures_iter(&cap[1]) {
                add_reference(out, &entry[1], &path, "Django INSTALLED_APPS entry");
            }
        }
        if let Some(cap) = MIDDLEWARE_RE.captures(&text) {
            for entry in QUOTED_STRING_RE.captures_iter(&cap[1]) {
                let dotted = &entry[1];
                let name = dotted.rsplit('.').next().unwrap_or(dotted);
                add_reference(out, name, &path, "Django MIDDLEWARE entry");
            }
        }
    }
}

fn parse_docker_compose(project_root: &Path, out: &mut ConfigReferences) {
    for filename in ["docker-compose.yml", "docker-compose.yaml"] {
        let path = project_root.join(filename);
        let Ok(text) = std::fs::read_to_string(&path) else {
            continue;
        };
        for cap in PYTHON_MODULE_COMMAND_RE.captures_iter(&text) {
            let dotted = &cap[1];
            let name = dotted.rsplit('.').next().unwrap_or(dotted);
            add_reference(out, name, &path, "docker-compose python -m command");
        }
        for cap in PYTHON_SCRIPT_COMMAND_RE.captures_iter(&text) {
            if let Some(stem) = Path::new(&cap[1]).file_stem().and_then(|s| s.to_str()) {
                add_reference(out, stem, &path, "docker-compose python script command");
            }
        }
        for cap in PYTHON_ARRAY_COMMAND_RE.captures_iter(&text) {
            if let Some(stem) = Path::new(&cap[1]).file_stem().and_then(|s| s.to_str()) {
                add_reference(out, stem, &path, "docker-compose array-form python command");
            }
        }
    }
}

fn parse_airflow_dags(project_root: &Path, out: &mut ConfigReferences) {
    let mut dag_dirs = Vec::new();
    find_dag_dirs(project_root, &mut dag_dirs);
    for dir in dag_dirs {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.filter_map(std::result::Result::ok) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("py") {
                continue;
            }
            let Ok(text) = std::fs::read_to_string(&path) else {
                continue;
            };
            for cap in PYTHON_CALLABLE_RE.captures_iter(&text) {
                add_reference(out, &cap[1], &path, "Airflow python_callable");
            }
            for cap in TASK_ID_RE.captures_iter(&text) {
                add_reference(out, &cap[1], &path, "Airflow task_id");
            }
        }
    }
}

fn find_dag_dirs(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(std::result::Result::ok) {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if path.file_name().and_then(|n| n.to_str()) == Some("dags") {
            out.push(path.clone());
        }
        if crate::graph::EXCLUDED_DIRS
            .iter()
            .any(|d| path.file_name().and_then(|n| n.to_str()) == Some(d))
        {
            continue;
        }
        find_dag_dirs(&path, out);
    }
}

fn add_script_file_references(text: &str, config_file: &Path, reason: &str, out: &mut ConfigReferences) {
    for cap in SCRIPT_FILE_RE.captures_iter(text) {
        if let Some(stem) = Path::new(&cap[1]).file_stem().and_then(|s| s.to_str()) {
            add_reference(out, stem, config_file, reason);
        }
    }
}

fn parse_package_json(project_root: &Path, out: &mut ConfigReferences) {
    let path = project_root.join("package.json");
    let Ok(text) = std::fs::read_to_string(&path) else {
        return;
    };
    let Ok(data) = serde_json::from_str::<serde_json::Value>(&text) else {
        return;
    };

    if let Some(scripts) = data.get("scripts").and_then(|v| v.as_object()) {
        for value in scripts.values() {
            if let Some(s) = value.as_str() {
                add_script_file_references(s, &path, "package.json script command", out);
            }
        }
    }

    match data.get("bin") {
        Some(serde_json::Value::String(s)) => {
            if let Some(stem) = Path::new(s).file_stem().and_then(|s| s.to_str()) {
                add_reference(out, stem, &path, "package.json bin entry");
            }
        }
        Some(serde_json::Value::Object(map)) => {
            for v in map.values() {
                if let Some(s) = v.as_str() {
                    if let Some(stem) = Path::new(s).file_stem().and_then(|s| s.to_str()) {
                        add_reference(out, stem, &path, "package.json bin entry");
                    }
                }
            }
        }
        _ => {}
    }

    for field in ["main", "module"] {
        if let Some(s) = data.get(field).and_then(|v| v.as_str()) {
            if let Some(stem) = Path::new(s).file_stem().and_then(|s| s.to_str()) {
                add_reference(out, stem, &path, "package.json entry point");
            }
        }
    }
}

/// Strip `//` and `/* */` comments (`tsconfig.json` is JSON-with-comments), mirroring
/// `config_parser.py::_parse_tsconfig_json`'s preprocessing.
fn strip_jsonc_comments(text: &str) -> String {
    static LINE_COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"//[^\n]*").expect("static regex"));
    static BLOCK_COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("static regex"));
    let no_block = BLOCK_COMMENT_RE.replace_all(text, "");
    LINE_COMMENT_RE.replace_all(&no_block, "").into_owned()
}

fn parse_tsconfig_json(project_root: &Path, out: &mut ConfigReferences) {
    let path = project_root.join("tsconfig.json");
    let Ok(raw) = std::fs::read_to_string(&path) else {
        return;
    };
    let stripped = strip_jsonc_comments(&raw);
    let Ok(data) = serde_json::from_str::<serde_json::Value>(&stripped) else {
        return;
    };

    if let Some(paths) = data
        .get("compilerOptions")
        .and_then(|c| c.get("paths"))
        .and_then(|p| p.as_object())
    {
        for key in paths.keys() {
            let trimmed = key.trim_end_matches("/*").trim_end_matches('*');
            if let Some(segment) = trimmed.trim_end_matches('/').rsplit('/').next() {
                add_reference(out, segment, &path, "tsconfig.json path alias");
            }
        }
    }

    if let Some(files) = data.get("files").and_then(|v| v.as_array()) {
        for value in files {
            if let Some(s) = value.as_str() {
                if let Some(stem) = Path::new(s).file_stem().and_then(|s| s.to_str()) {
                    add_reference(out, stem, &path, "tsconfig.json files entry");
                }
            }
        }
    }

    if let Some(include) = data.get("include").and_then(|v| v.as_array()) {
        for value in include {
            if let Some(s) = value.as_str() {
                if !s.contains('*') {
                    if let Some(stem) = Path::new(s).file_stem().and_then(|s| s.to_str()) {
                        add_reference(out, stem, &path, "tsconfig.json include entry");
                    }
                }
            }
        }
    }
}

fn resolve_python_module(project_root: &Path, module_part: &str) -> Option<PathBuf> {
    let rel = module_part.replace('.', "/");
    [
        project_root.join(format!("{rel}.py")),
        project_root.join("src").join(format!("{rel}.py")),
        project_root.join(&rel).join("__init__.py"),
        project_root.join("src").join(&rel).join("__init__.py"),
    ]
    .into_iter()
    .find(|p| p.is_file())
}

fn parse_pyproject_entry_points(project_root: &Path, out: &mut ConfigReferences) {
    let path = project_root.join("pyproject.toml");
    let Ok(text) = std::fs::read_to_string(&path) else {
        return;
    };
    let Ok(value) = text.parse::<toml::Value>() else {
        return;
    };

    let mut collect = |table: Option<&toml::Value>, reason: &str| {
        if let Some(toml::Value::Table(map)) = table {
            for v in map.values() {
                if let Some(s) = v.as_str() {
                    if let Some(module_part) = s.split(':').next() {
                        if let Some(file) = resolve_python_module(project_root, module_part.trim()) {
                            if let Some(stem) = file.file_stem().and_then(|s| s.to_str()) {
                                add_reference(out, stem, &path, reason);
                            }
                        }
                    }
                }
            }
        }
    };

    collect(value.get("project").and_then(|p| p.get("scripts")), "pyproject.toml project.scripts entry");

    if let Some(toml::Value::Table(groups)) = value.get("project").and_then(|p| p.get("entry-points")) {
        for group in groups.values() {
            collect(Some(group), "pyproject.toml project.entry-points entry");
        }
    }

    collect(
        value
            .get("tool")
            .and_then(|t| t.get("flit"))
            .and_then(|f| f.get("metadata"))
            .and_then(|m| m.get("scripts")),
        "pyproject.toml tool.flit.metadata.scripts entry",
    );
}

fn parse_setup_cfg_entry_points(project_root: &Path, out: &mut ConfigReferences) {
    let path = project_root.join("setup.cfg");
    let Ok(text) = std::fs::read_to_string(&path) else {
        return;
    };
    let mut in_entry_points_section = false;
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(section) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            in_entry_points_section = section.to_ascii_lowercase().contains("entry_points");
            continue;
        }
        if !in_entry_points_section {
            continue;
        }
        let Some((_, value)) = trimmed.split_once('=') else {
            continue;
        };
        let module_part = value.trim().split(':').next().unwrap_or("").trim();
        if let Some(file) = resolve_python_module(project_root, module_part) {
            if let Some(stem) = file.file_stem().and_then(|s| s.to_str()) {
                add_reference(out, stem, &path, "setup.cfg entry_points entry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn serverless_handler_protects_last_dotted_segment() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("serverless.yml"), "functions:\n  hello:\n    handler: handlers.api.hello\n").unwrap();

        let refs = parse_all_configs(dir.path());
        assert!(refs.contains_key("hello"));
    }

    #[test]
    fn django_installed_apps_and_middleware_are_extracted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("settings.py"),
            "INSTALLED_APPS = [\n    'django.contrib.admin',\n    'myapp',\n]\nMIDDLEWARE = [\n    'myapp.middleware.MyMiddleware',\n]\n",
        )
        .unwrap();

        let refs = parse_all_configs(dir.path());
        assert!(refs.contains_key("myapp"));
        assert!(refs.contains_key("MyMiddleware"));
    }

    #[test]
    fn docker_compose_python_module_command_is_extracted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("docker-compose.yml"),
            "services:\n  worker:\n    command: python -m myapp.worker\n",
        )
        .unwrap();

        let refs = parse_all_configs(dir.path());
        assert!(refs.contains_key("worker"));
    }

    #[test]
    fn airflow_dag_python_callable_and_task_id_are_extracted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("dags")).unwrap();
        fs::write(
            dir.path().join("dags/etl.py"),
            "PythonOperator(task_id='load_data', python_callable=load_data)\n",
        )
        .unwrap();

        let refs = parse_all_configs(dir.path());
        assert!(refs.contains_key("load_data"));
    }

    #[test]
    fn tsconfig_jsonc_comments_are_stripped_before_parsing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("tsconfig.json"),
            "{\n  // path aliases\n  \"compilerOptions\": {\n    \"paths\": {\n      \"@utils/*\": [\"src/utils/*\"]\n    }\n  }\n}\n",
        )
        .unwrap();

        let refs = parse_all_configs(dir.path());
        assert!(refs.contains_key("utils"));
    }

    #[test]
    fn missing_descriptor_files_are_silently_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let refs = parse_all_configs(dir.path());
        assert!(refs.is_empty());
    }
}

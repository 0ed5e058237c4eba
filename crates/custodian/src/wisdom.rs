//! Wisdom Registry (spec §4.8).
//!
//! Loads JSON rule files describing names, decorators, and syntax markers that a
//! framework treats as implicitly alive (e.g. pytest fixtures, Django signal handlers),
//! and answers `is_immortal` queries against them. Grounded on
//! `original_source/src/analyzer/wisdom_registry.py::WisdomRegistry`.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::types::Language;

/// Which licensing tier contributed a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Community,
    Premium,
}

/// One immortality rule: a pattern to match against a symbol (or its decorator/syntax
/// context), the match strategy, and the reason surfaced to the user when it fires.
#[derive(Debug, Clone)]
pub struct WisdomRule {
    pub pattern: String,
    pub match_type: MatchType,
    pub framework: String,
    pub tier: Tier,
    pub reason: String,
}

/// How a rule's pattern is compared against a candidate symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Exact,
    Prefix,
    Suffix,
    Decorator,
    Syntax,
}

/// Outcome of an `is_immortal` check: whether the symbol is protected, and if so by
/// which rule.
#[derive(Debug, Clone)]
pub struct ImmortalityVerdict {
    pub is_immortal: bool,
    pub reason: Option<String>,
    pub framework: Option<String>,
    pub tier: Option<Tier>,
}

impl ImmortalityVerdict {
    fn none() -> Self {
        Self {
            is_immortal: false,
            reason: None,
            framework: None,
            tier: None,
        }
    }

    fn hit(rule: &WisdomRule) -> Self {
        Self {
            is_immortal: true,
            reason: Some(rule.reason.clone()),
            framework: Some(rule.framework.clone()),
            tier: Some(rule.tier),
        }
    }
}

/// Licensing summary, mirroring `WisdomRegistry.get_licensing_status()`.
#[derive(Debug, Clone)]
pub struct LicensingStatus {
    pub tier: &'static str,
    pub community_rules: usize,
    pub premium_rules: usize,
    pub total_rules: usize,
    pub has_premium: bool,
}

/// Raw on-disk shapes a rule file may take, dispatched by which top-level key is
/// present, not by untagged-enum trial-and-error, since `MetaRulesFile`'s
/// all-optional fields would otherwise happily (and wrongly) absorb a framework-keyed
/// file too.
enum RuleFile {
    Immortality(Vec<ImmortalityRuleEntry>),
    Meta(MetaRulesFile),
    FrameworkKeyed(HashMap<String, FrameworkEntry>),
}

const META_KEYS: &[&str] = &["exact_matches", "prefix_matches", "suffix_matches", "syntax_markers"];

fn classify_rule_file(value: &serde_json::Value) -> Option<RuleFile> {
    let object = value.as_object()?;

    if object.contains_key("immortality_rules") {
        let entries = serde_json::from_value(object.get("immortality_rules")?.clone()).ok()?;
        return Some(RuleFile::Immortality(entries));
    }

    if META_KEYS.iter().any(|k| object.contains_key(*k)) {
        let meta = serde_json::from_value(value.clone()).ok()?;
        return Some(RuleFile::Meta(meta));
    }

    let frameworks = serde_json::from_value(value.clone()).ok()?;
    Some(RuleFile::FrameworkKeyed(frameworks))
}

#[derive(Deserialize)]
struct ImmortalityRuleEntry {
    pattern: String,
    #[serde(default)]
    framework: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct MetaRulesFile {
    #[serde(default)]
    framework: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    exact_matches: Vec<String>,
    #[serde(default)]
    prefix_matches: Vec<String>,
    #[serde(default)]
    suffix_matches: Vec<String>,
    #[serde(default)]
    syntax_markers: Vec<String>,
}

#[derive(Deserialize)]
struct FrameworkEntry {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    syntax_markers: Vec<String>,
}

/// Default property/staticmethod/classmethod decorator names, always immortal for
/// Python regardless of rule files (spec §4.8 "dunder default → property/static/
/// class-method default").
const PYTHON_BUILTIN_DECORATOR_DEFAULTS: &[&str] = &["property", "staticmethod", "classmethod"];

const JS_EXPORT_STATEMENT_MARKERS: &[&str] = &["export default", "export {", "module.exports"];

/// Loaded, indexed wisdom rules for fast `is_immortal` evaluation.
pub struct WisdomRegistry {
    exact: HashMap<String, WisdomRule>,
    prefix: Vec<WisdomRule>,
    suffix: Vec<WisdomRule>,
    decorator: Vec<WisdomRule>,
    syntax: Vec<WisdomRule>,
    community_count: usize,
    premium_count: usize,
}

impl WisdomRegistry {
    /// Load rules from `rules_dir/community/` (required to exist; an empty or missing
    /// directory just yields no community rules) and `rules_dir/premium/` (optional).
    #[must_use]
    pub fn load(rules_dir: &Path) -> Self {
        let mut rules = Vec::new();
        let community_start = rules.len();
        load_rules_from_directory(&rules_dir.join("community"), Tier::Community, &mut rules);
        let community_count = rules.len() - community_start;
        let premium_start = rules.len();
        load_rules_from_directory(&rules_dir.join("premium"), Tier::Premium, &mut rules);
        let premium_count = rules.len() - premium_start;

        let mut registry = Self {
            exact: HashMap::new(),
            prefix: Vec::new(),
            suffix: Vec::new(),
            decorator: Vec::new(),
            syntax: Vec::new(),
            community_count,
            premium_count,
        };
        for rule in rules {
            registry.index(rule);
        }
        registry
    }

    fn index(&mut self, rule: WisdomRule) {
        match rule.match_type {
            MatchType::Exact => {
                self.exact.insert(rule.pattern.clone(), rule);
            }
            MatchType::Prefix => self.prefix.push(rule),
            MatchType::Suffix => self.suffix.push(rule),
            MatchType::Decorator => self.decorator.push(rule),
            MatchType::Syntax => self.syntax.push(rule),
        }
    }

    /// Evaluate a symbol against the loaded rules in the exact order spec §4.8
    /// specifies: exact → prefix (full name and last dotted segment) → decorator
    /// (substring of `full_text`) → suffix → syntax-marker (substring) → language
    /// default.
    #[must_use]
    pub fn is_immortal(&self, name: &str, full_text: &str, language: Language) -> ImmortalityVerdict {
        match language {
            Language::Python => self.check_python(name, full_text),
            Language::JavaScript | Language::TypeScript => self.check_js(name, full_text),
        }
    }

    fn check_python(&self, name: &str, full_text: &str) -> ImmortalityVerdict {
        if let Some(rule) = self.exact.get(name) {
            return ImmortalityVerdict::hit(rule);
        }

        let last_segment = name.rsplit('.').next().unwrap_or(name);
        if let Some(rule) = self
            .prefix
            .iter()
            .find(|r| name.starts_with(&r.pattern) || last_segment.starts_with(&r.pattern))
        {
            return ImmortalityVerdict::hit(rule);
        }

        if let Some(rule) = self.decorator.iter().find(|r| full_text.contains(&r.pattern)) {
            return ImmortalityVerdict::hit(rule);
        }

        if let Some(rule) = self
            .suffix
            .iter()
            .find(|r| name.ends_with(&r.pattern) || decorator_line_ends_with(full_text, &r.pattern))
        {
            return ImmortalityVerdict::hit(rule);
        }

        if let Some(rule) = self.syntax.iter().find(|r| full_text.contains(&r.pattern)) {
            return ImmortalityVerdict::hit(rule);
        }

        if crate::types::is_dunder_name(name) {
            return ImmortalityVerdict {
                is_immortal: true,
                reason: Some("Python dunder method".to_string()),
                framework: Some("python".to_string()),
                tier: None,
            };
        }

        if PYTHON_BUILTIN_DECORATOR_DEFAULTS
            .iter()
            .any(|marker| full_text.contains(&format!("@{marker}")))
        {
            return ImmortalityVerdict {
                is_immortal: true,
                reason: Some("property/staticmethod/classmethod".to_string()),
                framework: Some("python".to_string()),
                tier: None,
            };
        }

        ImmortalityVerdict::none()
    }

    fn check_js(&self, name: &str, full_text: &str) -> ImmortalityVerdict {
        if let Some(rule) = self.exact.get(name) {
            return ImmortalityVerdict::hit(rule);
        }

        if let Some(rule) = self.suffix.iter().find(|r| name.ends_with(&r.pattern)) {
            return ImmortalityVerdict::hit(rule);
        }

        if let Some(rule) = self.syntax.iter().find(|r| full_text.contains(&r.pattern)) {
            return ImmortalityVerdict::hit(rule);
        }

        if JS_EXPORT_STATEMENT_MARKERS.iter().any(|marker| full_text.contains(marker)) {
            return ImmortalityVerdict {
                is_immortal: true,
                reason: Some("export statement".to_string()),
                framework: Some("javascript".to_string()),
                tier: None,
            };
        }

        ImmortalityVerdict::none()
    }

    /// Licensing summary for diagnostics / `custodian stats`.
    #[must_use]
    pub fn licensing_status(&self) -> LicensingStatus {
        LicensingStatus {
            tier: if self.premium_count > 0 { "premium" } else { "community" },
            community_rules: self.community_count,
            premium_rules: self.premium_count,
            total_rules: self.community_count + self.premium_count,
            has_premium: self.premium_count > 0,
        }
    }
}

/// Python "ends with the suffix, on the decorator line it appears on" check: the
/// original scans `full_text` line by line for a `@...suffix` decorator rather than a
/// bare substring test.
fn decorator_line_ends_with(full_text: &str, suffix: &str) -> bool {
    full_text
        .lines()
        .any(|line| line.trim_start().starts_with('@') && line.trim_end().ends_with(suffix))
}

fn load_rules_from_directory(dir: &Path, tier: Tier, out: &mut Vec<WisdomRule>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(std::result::Result::ok) {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Ok(text) = std::fs::read_to_string(&path) else {
            warn!(file = %path.display(), "could not read wisdom rule file");
            continue;
        };
        let parsed = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|value| classify_rule_file(&value));
        match parsed {
            Some(file) => parse_rule_file(file, tier, out),
            None => warn!(file = %path.display(), "malformed wisdom rule file, skipping"),
        }
    }
}

fn parse_rule_file(file: RuleFile, tier: Tier, out: &mut Vec<WisdomRule>) {
    match file {
        RuleFile::Immortality(entries) => {
            for entry in entries {
                let match_type = if entry.pattern.starts_with('@') {
                    MatchType::Decorator
                } else {
                    MatchType::Syntax
                };
                let pattern = entry.pattern.trim_start_matches('@').to_string();
                out.push(WisdomRule {
                    pattern,
                    match_type,
                    framework: entry.framework.unwrap_or_default(),
                    tier,
                    reason: entry.reason.unwrap_or_else(|| "wisdom rule".to_string()),
                });
            }
        }
        RuleFile::Meta(meta) => {
            let framework = meta.framework.unwrap_or_default();
            let reason = meta.reason.unwrap_or_else(|| "wisdom rule".to_string());
            for pattern in meta.exact_matches {
                out.push(WisdomRule {
                    pattern,
                    match_type: MatchType::Exact,
                    framework: framework.clone(),
                    tier,
                    reason: reason.clone(),
                });
            }
            for pattern in meta.prefix_matches {
                out.push(WisdomRule {
                    pattern,
                    match_type: MatchType::Prefix,
                    framework: framework.clone(),
                    tier,
                    reason: reason.clone(),
                });
            }
            for pattern in meta.suffix_matches {
                out.push(WisdomRule {
                    pattern,
                    match_type: MatchType::Suffix,
                    framework: framework.clone(),
                    tier,
                    reason: reason.clone(),
                });
            }
            for pattern in meta.syntax_markers {
                out.push(WisdomRule {
                    pattern,
                    match_type: MatchType::Syntax,
                    framework: framework.clone(),
                    tier,
                    reason: reason.clone(),
                });
            }
        }
        RuleFile::FrameworkKeyed(frameworks) => {
            for (framework, entry) in frameworks {
                let reason = entry.reason.unwrap_or_else(|| "wisdom rule".to_string());
                for pattern in entry.syntax_markers {
                    out.push(WisdomRule {
                        pattern,
                        match_type: MatchType::Syntax,
                        framework: framework.clone(),
                        tier,
                        reason: reason.clone(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_rule_file(dir: &Path, name: &str, content: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn exact_match_wins_over_everything_else() {
        let dir = tempfile::tempdir().unwrap();
        write_rule_file(
            dir.path().join("community").as_path(),
            "pytest.json",
            r#"{"exact_matches": ["conftest"], "suffix_matches": [], "prefix_matches": [], "syntax_markers": [], "framework": "pytest", "reason": "pytest discovery file"}"#,
        );

        let registry = WisdomRegistry::load(dir.path());
        let verdict = registry.is_immortal("conftest", "", Language::Python);
        assert!(verdict.is_immortal);
        assert_eq!(verdict.framework.as_deref(), Some("pytest"));
    }

    #[test]
    fn decorator_immortality_rule_matches_full_text_substring() {
        let dir = tempfile::tempdir().unwrap();
        write_rule_file(
            dir.path().join("community").as_path(),
            "celery.json",
            r#"{"immortality_rules": [{"pattern": "@app.task", "framework": "celery", "reason": "celery task"}]}"#,
        );

        let registry = WisdomRegistry::load(dir.path());
        let verdict = registry.is_immortal("do_work", "@app.task\ndef do_work():\n    pass\n", Language::Python);
        assert!(verdict.is_immortal);
    }

    #[test]
    fn python_dunder_is_immortal_by_default() {
        let registry = WisdomRegistry::load(Path::new("/nonexistent"));
        let verdict = registry.is_immortal("__init__", "", Language::Python);
        assert!(verdict.is_immortal);
    }

    #[test]
    fn js_export_default_is_immortal_by_default() {
        let registry = WisdomRegistry::load(Path::new("/nonexistent"));
        let verdict = registry.is_immortal("helper", "export default helper", Language::JavaScript);
        assert!(verdict.is_immortal);
    }

    #[test]
    fn unmatched_plain_function_is_not_immortal() {
        let registry = WisdomRegistry::load(Path::new("/nonexistent"));
        let verdict = registry.is_immortal("compute_total", "def compute_total():\n    pass\n", Language::Python);
        assert!(!verdict.is_immortal);
    }

    #[test]
    fn malformed_rule_file_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_rule_file(dir.path().join("community").as_path(), "broken.json", "not json at all");

        let registry = WisdomRegistry::load(dir.path());
        assert_eq!(registry.licensing_status().community_rules, 0);
    }

    #[test]
    fn premium_rules_are_counted_separately_and_optional() {
        let dir = tempfile::tempdir().unwrap();
        write_rule_file(
            dir.path().join("community").as_path(),
            "base.json",
            r#"{"exact_matches": ["main"], "suffix_matches": [], "prefix_matches": [], "syntax_markers": []}"#,
        );

        let registry = WisdomRegistry::load(dir.path());
        let status = registry.licensing_status();
        assert_eq!(status.community_rules, 1);
        assert_eq!(status.premium_rules, 0);
        assert!(!status.has_premium);
    }
}

//! `custodian analyze` command implementation.

use std::path::Path;

use colored::Colorize;
use custodian::{analyze, AnalysisOptions, Entity, Language};

/// Run the analyze command.
#[allow(clippy::too_many_arguments)]
pub fn run(
    project_root: &Path,
    language: Language,
    library_mode: bool,
    grep_shield: bool,
    include_vendored: bool,
    rules_dir: Option<&Path>,
    json: bool,
) -> Result<(), custodian::Error> {
    let mut options = AnalysisOptions::new(project_root, language)
        .with_library_mode(library_mode)
        .with_grep_shield(grep_shield)
        .with_include_vendored(include_vendored);
    if let Some(rules_dir) = rules_dir {
        options = options.with_rules_dir(rules_dir);
    }

    let outcome = analyze(&options)?;

    if json {
        print_json(&outcome);
        return Ok(());
    }

    println!(
        "{} {} ({})",
        "Analyzed".cyan().bold(),
        project_root.display(),
        language.as_str()
    );
    println!();

    println!(
        "  {}: {} discovered, {} parsed fresh, {} from cache, {} failed",
        "Files".white().bold(),
        outcome.stats.files_discovered,
        outcome.stats.files_parsed_fresh,
        outcome.stats.files_from_cache,
        outcome.stats.files_failed
    );
    if outcome.stats.cache_hit {
        println!("  {}", "Whole-project cache hit, pipeline skipped".dimmed());
    }
    println!();

    println!(
        "  {}: {}",
        "Dead symbols".white().bold(),
        outcome.dead_symbols.len().to_string().red()
    );
    for entity in &outcome.dead_symbols {
        print_entity_line(entity);
    }
    println!();

    println!(
        "  {}: {}",
        "Orphan files".white().bold(),
        outcome.orphan_files.len().to_string().yellow()
    );
    for path in &outcome.orphan_files {
        println!("    {} {}", "•".yellow(), path.display());
    }
    println!();

    println!(
        "  {}: {}",
        "Protected symbols".white().bold(),
        outcome.stats.protected_symbols.to_string().green()
    );

    if !outcome.file_errors.is_empty() {
        println!();
        println!("{} ({}):", "Errors".red().bold(), outcome.file_errors.len());
        for err in outcome.file_errors.iter().take(5) {
            println!("  {} {}: {}", "•".red(), err.path.display(), err.message);
        }
        if outcome.file_errors.len() > 5 {
            println!("  ... and {} more", outcome.file_errors.len() - 5);
        }
    }

    Ok(())
}

fn print_entity_line(entity: &Entity) {
    println!(
        "    {} {} ({}:{})",
        "•".red(),
        entity.name.bold(),
        entity.file_path.display(),
        entity.start_line
    );
}

fn print_json(outcome: &custodian::AnalysisOutcome) {
    #[derive(serde::Serialize)]
    struct JsonOutcome<'a> {
        dead_symbols: &'a [Entity],
        orphan_files: &'a [std::path::PathBuf],
        protected_symbols: &'a [Entity],
        files_discovered: usize,
        files_parsed_fresh: usize,
        files_from_cache: usize,
        files_failed: usize,
        cache_hit: bool,
    }

    let payload = JsonOutcome {
        dead_symbols: &outcome.dead_symbols,
        orphan_files: &outcome.orphan_files,
        protected_symbols: &outcome.protected_symbols,
        files_discovered: outcome.stats.files_discovered,
        files_parsed_fresh: outcome.stats.files_parsed_fresh,
        files_from_cache: outcome.stats.files_from_cache,
        files_failed: outcome.stats.files_failed,
        cache_hit: outcome.stats.cache_hit,
    };

    match serde_json::to_string_pretty(&payload) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("{}: failed to serialize JSON output: {e}", "error".red().bold()),
    }
}

//! `custodian stats` command implementation.

use std::path::Path;

use colored::Colorize;
use custodian::AnalysisCache;

/// Run the stats command.
pub fn run(project_root: &Path) -> Result<(), custodian::Error> {
    let project_root = project_root
        .canonicalize()
        .map_err(|_| custodian::Error::ProjectRootNotFound(project_root.to_path_buf()))?;
    let cache = AnalysisCache::open(&project_root)?;

    let cache_path = project_root.join(".janitor_cache").join("cache.db3");
    let db_size_str = match std::fs::metadata(&cache_path) {
        Ok(meta) => format_size(meta.len()),
        Err(e) => match e.kind() {
            std::io::ErrorKind::NotFound => "not created".to_string(),
            std::io::ErrorKind::PermissionDenied => {
                tracing::warn!(path = %cache_path.display(), "Permission denied reading cache database");
                "permission denied".to_string()
            }
            _ => {
                tracing::debug!(error = %e, "Failed to get cache database file size");
                "size unknown".to_string()
            }
        },
    };

    let stats = cache.get_cache_stats()?;

    println!("{}", "Custodian Cache Statistics".cyan().bold());
    println!();

    println!(
        "  {}: {} ({})",
        "Database".white().bold(),
        cache_path.display(),
        db_size_str
    );
    println!();

    println!(
        "  {}: {}",
        "Files cached".white().bold(),
        stats.files_cached.to_string().green()
    );
    println!(
        "  {}: {}",
        "Symbol definitions cached".white().bold(),
        stats.symbol_definitions_cached.to_string().green()
    );
    println!(
        "  {}: {}",
        "File reference lists cached".white().bold(),
        stats.file_references_cached.to_string().green()
    );
    println!(
        "  {}: {}",
        "Whole-project results cached".white().bold(),
        stats.cached_results.to_string().green()
    );

    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

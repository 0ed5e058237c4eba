//! Database schema for the analysis cache.

/// Six logical tables, keyed off `file_metadata`'s `(mtime, size)` cache key: directly
/// grounded on `original_source/src/analyzer/cache.py::AnalysisCache._init_database`.
pub(crate) const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS file_metadata (
    file_path TEXT PRIMARY KEY,
    mtime REAL NOT NULL,
    size INTEGER NOT NULL,
    cache_key TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_file_metadata_cache_key ON file_metadata(cache_key);

CREATE TABLE IF NOT EXISTS metaprogramming_danger (
    file_path TEXT PRIMARY KEY,
    is_dangerous INTEGER NOT NULL,
    cache_key TEXT NOT NULL,
    FOREIGN KEY (file_path) REFERENCES file_metadata(file_path)
);

CREATE TABLE IF NOT EXISTS symbol_definitions (
    file_path TEXT PRIMARY KEY,
    symbol_data TEXT NOT NULL,
    cache_key TEXT NOT NULL,
    FOREIGN KEY (file_path) REFERENCES file_metadata(file_path)
);

CREATE TABLE IF NOT EXISTS file_references (
    file_path TEXT PRIMARY KEY,
    reference_data TEXT NOT NULL,
    cache_key TEXT NOT NULL,
    FOREIGN KEY (file_path) REFERENCES file_metadata(file_path)
);

CREATE TABLE IF NOT EXISTS file_dependencies (
    file_path TEXT PRIMARY KEY,
    dependencies TEXT NOT NULL,
    cache_key TEXT NOT NULL,
    FOREIGN KEY (file_path) REFERENCES file_metadata(file_path)
);

CREATE TABLE IF NOT EXISTS analysis_result (
    project_hash TEXT PRIMARY KEY,
    dead_symbols TEXT NOT NULL,
    orphan_files TEXT NOT NULL,
    timestamp REAL NOT NULL
);
";

/// Columns an idempotent migration may need to add to a database created by an older
/// version of this schema, mirroring the original's `PRAGMA table_info` + conditional
/// `ALTER TABLE ADD COLUMN` dance.
pub(crate) const MIGRATIONS: &[(&str, &str, &str)] = &[(
    "analysis_result",
    "orphan_files",
    "ALTER TABLE analysis_result ADD COLUMN orphan_files TEXT NOT NULL DEFAULT '[]'",
)];

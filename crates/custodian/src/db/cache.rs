//! Typed read/write API over the six-table schema (spec §4.4).
//!
//! Grounded on `original_source/src/analyzer/cache.py::AnalysisCache`: the cache-key
//! formula (`"{mtime}:{size}"`), the project-fingerprint formula (SHA-256 over sorted
//! `"path:mtime:size"` tuples joined with `|`), and the per-table get/set pairs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::Index;
use crate::error::Result;
use crate::types::Entity;

/// Stat-derived identity for a file: `(mtime, size)`. Two calls with the same tuple
/// are treated as "the file has not changed" regardless of content.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FileStat {
    mtime: f64,
    size: u64,
}

impl FileStat {
    fn cache_key(self) -> String {
        format!("{}:{}", self.mtime, self.size)
    }

    fn of(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map_or(0.0, |d| d.as_secs_f64());
        Ok(Self {
            mtime,
            size: meta.len(),
        })
    }
}

/// A cached whole-project analysis result, keyed by project fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAnalysisResult {
    pub dead_symbols: Vec<Entity>,
    pub orphan_files: Vec<PathBuf>,
}

/// The persistent, file-keyed analysis cache (spec §4.4).
///
/// Lives at `<project_root>/.janitor_cache/cache.db3`, matching `cache.py`'s
/// `self.cache_dir = project_root / ".janitor_cache"`.
pub struct AnalysisCache {
    db: Index,
}

impl AnalysisCache {
    /// Open (creating if absent) the cache database under `project_root`.
    pub fn open(project_root: &Path) -> Result<Self> {
        let db_path = project_root.join(".janitor_cache").join("cache.db3");
        Ok(Self {
            db: Index::open(&db_path)?,
        })
    }

    /// `true` iff the stored `(mtime, size)` for `path` matches its current stat.
    /// A file with no filesystem entry or no cache row is never considered cached.
    #[must_use]
    pub fn is_file_cached(&self, path: &Path) -> bool {
        self.current_cache_key(path).is_some_and(|key| self.stored_cache_key(path) == Some(key))
    }

    fn current_cache_key(&self, path: &Path) -> Option<String> {
        FileStat::of(path).ok().map(FileStat::cache_key)
    }

    fn stored_cache_key(&self, path: &Path) -> Option<String> {
        let conn = self.db.connection().ok()?;
        conn.query_row(
            "SELECT cache_key FROM file_metadata WHERE file_path = ?1",
            [path_key(path)],
            |row| row.get(0),
        )
        .ok()
    }

    /// Record (or refresh) a file's `(mtime, size)` identity. Every `set_*` call first
    /// upserts this row so later `is_file_cached` checks see the new key.
    fn touch_file_metadata(&self, path: &Path) -> Result<String> {
        let stat = FileStat::of(path).unwrap_or(FileStat { mtime: 0.0, size: 0 });
        let key = stat.cache_key();
        let conn = self.db.connection()?;
        conn.execute(
            "INSERT INTO file_metadata (file_path, mtime, size, cache_key) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(file_path) DO UPDATE SET mtime = excluded.mtime, size = excluded.size, cache_key = excluded.cache_key",
            rusqlite::params![path_key(path), stat.mtime, stat.size as i64, key],
        )?;
        Ok(key)
    }

    /// Fetch the cached target-file list for `path`'s dependencies, if cached and valid.
    pub fn get_file_dependencies(&self, path: &Path) -> Result<Option<Vec<PathBuf>>> {
        if !self.is_file_cached(path) {
            return Ok(None);
        }
        let conn = self.db.connection()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT dependencies FROM file_dependencies WHERE file_path = ?1",
                [path_key(path)],
                |row| row.get(0),
            )
            .ok();
        Ok(raw.and_then(|s| serde_json::from_str::<Vec<PathBuf>>(&s).ok()))
    }

    /// Store the resolved dependency list for `path` (possibly empty: an empty list
    /// is itself meaningful: "this file has no resolvable imports").
    pub fn set_file_dependencies(&self, path: &Path, dependencies: &[PathBuf]) -> Result<()> {
        let key = self.touch_file_metadata(path)?;
        let conn = self.db.connection()?;
        let payload = serde_json::to_string(dependencies).unwrap_or_else(|_| "[]".to_string());
        conn.execute(
            "INSERT INTO file_dependencies (file_path, dependencies, cache_key) VALUES (?1, ?2, ?3)
             ON CONFLICT(file_path) DO UPDATE SET dependencies = excluded.dependencies, cache_key = excluded.cache_key",
            rusqlite::params![path_key(path), payload, key],
        )?;
        Ok(())
    }

    /// Fetch the cached metaprogramming-danger flag for `path`, if cached and valid.
    pub fn get_metaprogramming_danger(&self, path: &Path) -> Result<Option<bool>> {
        if !self.is_file_cached(path) {
            return Ok(None);
        }
        let conn = self.db.connection()?;
        Ok(conn
            .query_row(
                "SELECT is_dangerous FROM metaprogramming_danger WHERE file_path = ?1",
                [path_key(path)],
                |row| row.get::<_, i64>(0),
            )
            .ok()
            .map(|v| v != 0))
    }

    pub fn set_metaprogramming_danger(&self, path: &Path, dangerous: bool) -> Result<()> {
        let key = self.touch_file_metadata(path)?;
        let conn = self.db.connection()?;
        conn.execute(
            "INSERT INTO metaprogramming_danger (file_path, is_dangerous, cache_key) VALUES (?1, ?2, ?3)
             ON CONFLICT(file_path) DO UPDATE SET is_dangerous = excluded.is_dangerous, cache_key = excluded.cache_key",
            rusqlite::params![path_key(path), i64::from(dangerous), key],
        )?;
        Ok(())
    }

    /// Fetch the cached `Entity` list extracted from `path`, if cached and valid.
    pub fn get_symbol_definitions(&self, path: &Path) -> Result<Option<Vec<Entity>>> {
        if !self.is_file_cached(path) {
            return Ok(None);
        }
        let conn = self.db.connection()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT symbol_data FROM symbol_definitions WHERE file_path = ?1",
                [path_key(path)],
                |row| row.get(0),
            )
            .ok();
        Ok(raw.and_then(|s| serde_json::from_str::<Vec<Entity>>(&s).ok()))
    }

    pub fn set_symbol_definitions(&self, path: &Path, entities: &[Entity]) -> Result<()> {
        let key = self.touch_file_metadata(path)?;
        let conn = self.db.connection()?;
        let payload = serde_json::to_string(entities).unwrap_or_else(|_| "[]".to_string());
        conn.execute(
            "INSERT INTO symbol_definitions (file_path, symbol_data, cache_key) VALUES (?1, ?2, ?3)
             ON CONFLICT(file_path) DO UPDATE SET symbol_data = excluded.symbol_data, cache_key = excluded.cache_key",
            rusqlite::params![path_key(path), payload, key],
        )?;
        Ok(())
    }

    /// Fetch the cached reference list extracted from `path`, if cached and valid.
    /// Stored as raw JSON so callers can deserialize into whichever linked/unlinked
    /// shape their phase needs (`crate::tracker::CachedReference`).
    pub fn get_file_references_raw(&self, path: &Path) -> Result<Option<String>> {
        if !self.is_file_cached(path) {
            return Ok(None);
        }
        let conn = self.db.connection()?;
        Ok(conn
            .query_row(
                "SELECT reference_data FROM file_references WHERE file_path = ?1",
                [path_key(path)],
                |row| row.get(0),
            )
            .ok())
    }

    pub fn set_file_references_raw(&self, path: &Path, payload: &str) -> Result<()> {
        let key = self.touch_file_metadata(path)?;
        let conn = self.db.connection()?;
        conn.execute(
            "INSERT INTO file_references (file_path, reference_data, cache_key) VALUES (?1, ?2, ?3)
             ON CONFLICT(file_path) DO UPDATE SET reference_data = excluded.reference_data, cache_key = excluded.cache_key",
            rusqlite::params![path_key(path), payload, key],
        )?;
        Ok(())
    }

    /// Drop every cached payload for `path` (used when a file is deleted or its
    /// content is known stale outside the normal mtime/size check).
    pub fn invalidate_file(&self, path: &Path) -> Result<()> {
        let conn = self.db.connection()?;
        let key = path_key(path);
        conn.execute("DELETE FROM file_metadata WHERE file_path = ?1", [&key])?;
        conn.execute("DELETE FROM metaprogramming_danger WHERE file_path = ?1", [&key])?;
        conn.execute("DELETE FROM symbol_definitions WHERE file_path = ?1", [&key])?;
        conn.execute("DELETE FROM file_references WHERE file_path = ?1", [&key])?;
        conn.execute("DELETE FROM file_dependencies WHERE file_path = ?1", [&key])?;
        Ok(())
    }

    /// Clear every table. Used by `--rebuild`-style callers.
    pub fn clear(&self) -> Result<()> {
        let conn = self.db.connection()?;
        conn.execute_batch(
            "DELETE FROM file_metadata; DELETE FROM metaprogramming_danger;
             DELETE FROM symbol_definitions; DELETE FROM file_references;
             DELETE FROM file_dependencies; DELETE FROM analysis_result;",
        )?;
        Ok(())
    }

    /// SHA-256 of the sorted, `|`-joined `"path:mtime:size"` tuples for every in-scope
    /// file: spec §4.4's project fingerprint, used to short-circuit repeat analyses.
    #[must_use]
    pub fn project_fingerprint(file_paths: &[PathBuf]) -> String {
        let mut entries: Vec<String> = file_paths
            .iter()
            .map(|path| {
                let stat = FileStat::of(path).unwrap_or(FileStat { mtime: 0.0, size: 0 });
                format!("{}:{}", path.display(), stat.cache_key())
            })
            .collect();
        entries.sort_unstable();
        let joined = entries.join("|");
        let mut hasher = Sha256::new();
        hasher.update(joined.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Fetch a previously stored whole-project result for `fingerprint`, if present.
    pub fn get_cached_analysis_result(&self, fingerprint: &str) -> Result<Option<CachedAnalysisResult>> {
        let conn = self.db.connection()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT dead_symbols, orphan_files FROM analysis_result WHERE project_hash = ?1",
                [fingerprint],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();
        let Some((dead_raw, orphans_raw)) = row else {
            return Ok(None);
        };
        let Ok(dead_symbols) = serde_json::from_str::<Vec<Entity>>(&dead_raw) else {
            return Ok(None);
        };
        let Ok(orphan_files) = serde_json::from_str::<Vec<PathBuf>>(&orphans_raw) else {
            return Ok(None);
        };
        Ok(Some(CachedAnalysisResult {
            dead_symbols,
            orphan_files,
        }))
    }

    pub fn set_cached_analysis_result(&self, fingerprint: &str, result: &CachedAnalysisResult) -> Result<()> {
        let conn = self.db.connection()?;
        let dead_raw = serde_json::to_string(&result.dead_symbols).unwrap_or_else(|_| "[]".to_string());
        let orphans_raw = serde_json::to_string(&result.orphan_files).unwrap_or_else(|_| "[]".to_string());
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0.0, |d| d.as_secs_f64());
        conn.execute(
            "INSERT INTO analysis_result (project_hash, dead_symbols, orphan_files, timestamp) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(project_hash) DO UPDATE SET dead_symbols = excluded.dead_symbols, orphan_files = excluded.orphan_files, timestamp = excluded.timestamp",
            rusqlite::params![fingerprint, dead_raw, orphans_raw, timestamp],
        )?;
        Ok(())
    }

    /// Vacuum the underlying database file.
    pub fn vacuum(&self) -> Result<()> {
        let conn = self.db.connection()?;
        conn.execute_batch("VACUUM")?;
        Ok(())
    }

    /// Row counts across the cache's tables, for `custodian stats`.
    pub fn get_cache_stats(&self) -> Result<CacheStats> {
        let conn = self.db.connection()?;
        let count = |table: &str| -> Result<usize> {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
        };
        Ok(CacheStats {
            files_cached: count("file_metadata")?,
            symbol_definitions_cached: count("symbol_definitions")?,
            file_references_cached: count("file_references")?,
            cached_results: count("analysis_result")?,
        })
    }
}

/// Row counts surfaced by `custodian stats`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub files_cached: usize,
    pub symbol_definitions_cached: usize,
    pub file_references_cached: usize,
    pub cached_results: usize,
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn setup() -> (tempfile::TempDir, AnalysisCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = AnalysisCache::open(dir.path()).unwrap();
        (dir, cache)
    }

    #[test]
    fn uncached_file_reports_not_cached() {
        let (dir, cache) = setup();
        let file = dir.path().join("a.py");
        fs::write(&file, "x = 1").unwrap();
        assert!(!cache.is_file_cached(&file));
    }

    #[test]
    fn file_becomes_cached_after_set() {
        let (dir, cache) = setup();
        let file = dir.path().join("a.py");
        fs::write(&file, "x = 1").unwrap();
        cache.set_file_dependencies(&file, &[]).unwrap();
        assert!(cache.is_file_cached(&file));
    }

    #[test]
    fn stale_file_invalidates_cache_entry() {
        let (dir, cache) = setup();
        let file = dir.path().join("a.py");
        fs::write(&file, "x = 1").unwrap();
        cache.set_symbol_definitions(&file, &[]).unwrap();
        assert!(cache.is_file_cached(&file));

        // Changing content changes size, which changes the cache key.
        fs::write(&file, "x = 12345").unwrap();
        assert!(!cache.is_file_cached(&file));
    }

    #[test]
    fn get_symbol_definitions_returns_none_when_uncached() {
        let (dir, cache) = setup();
        let file = dir.path().join("a.py");
        fs::write(&file, "x = 1").unwrap();
        assert_eq!(cache.get_symbol_definitions(&file).unwrap(), None);
    }

    #[test]
    fn project_fingerprint_is_stable_for_same_inputs() {
        let (dir, _cache) = setup();
        let a = dir.path().join("a.py");
        let b = dir.path().join("b.py");
        fs::write(&a, "x = 1").unwrap();
        fs::write(&b, "y = 2").unwrap();

        let fp1 = AnalysisCache::project_fingerprint(&[a.clone(), b.clone()]);
        let fp2 = AnalysisCache::project_fingerprint(&[b, a]);
        assert_eq!(fp1, fp2, "fingerprint must not depend on input order");
    }

    #[test]
    fn analysis_result_round_trips() {
        let (_dir, cache) = setup();
        let result = CachedAnalysisResult {
            dead_symbols: vec![],
            orphan_files: vec![PathBuf::from("util.py")],
        };
        cache.set_cached_analysis_result("abc123", &result).unwrap();
        let fetched = cache.get_cached_analysis_result("abc123").unwrap().unwrap();
        assert_eq!(fetched.orphan_files, result.orphan_files);
        assert!(cache.get_cached_analysis_result("missing").unwrap().is_none());
    }
}

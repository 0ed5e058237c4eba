//! Persistent analysis cache (spec §4.4).
//!
//! `SQLite` is the source of truth for everything this crate would otherwise have to
//! recompute on every run: per-file metadata, metaprogramming-danger flags, symbol
//! definitions, file references, file dependencies, and whole-project results keyed by
//! a project fingerprint. See `schema` for the DDL and `cache` for the typed
//! read/write API built on top of it.

mod cache;
mod schema;

pub use cache::{AnalysisCache, CacheStats, CachedAnalysisResult};

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use crate::error::{Error, Result};

/// `SQLite` connection wrapper shared by every cache table.
///
/// Mirrors the teacher's `db::Index`: a single connection behind a `Mutex`, WAL mode
/// and foreign keys enabled at open, schema applied idempotently.
pub(crate) struct Index {
    conn: Mutex<Connection>,
}

impl Index {
    /// Open or create the database at `path`, creating parent directories as needed
    /// and applying the schema (including any pending migrations).
    pub(crate) fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(schema::SCHEMA)?;
        apply_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            Error::Config(format!(
                "cache connection mutex poisoned (a thread panicked while holding the lock): {e}"
            ))
        })
    }
}

/// Add any column a schema created by an older build of this crate is missing, via
/// `PRAGMA table_info` + conditional `ALTER TABLE`, matching `cache.py`'s own
/// idempotent evolution story (spec §4.4 "tolerate schema evolution ... idempotently").
fn apply_migrations(conn: &Connection) -> Result<()> {
    for (table, column, ddl) in schema::MIGRATIONS {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let has_column = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .filter_map(std::result::Result::ok)
            .any(|existing| &existing == column);
        drop(stmt);
        if !has_column {
            conn.execute(ddl, [])?;
        }
    }
    Ok(())
}

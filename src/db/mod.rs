//! SQLite-backed persistent memory store with FTS5 full-text search.

mod dedup;
mod links;
mod maintenance;
pub mod migrate;
mod memory;
mod search;
mod tags;

pub use dedup::Duplicate;
pub use links::{LinkDirection, MemoryLink, Relationship};
pub use maintenance::MaintenanceReport;
pub use search::{RankedMemory, SearchOptions};

use std::collections::HashMap;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

pub const MAX_CONTENT_LEN: usize = 10_000;

/// Apply per-connection pragmas on every connection the pool hands out.
/// `foreign_keys` and `synchronous` are connection-scoped in SQLite, so the
/// open-time batch alone is not enough.
#[derive(Debug)]
struct PragmaCustomizer;

impl r2d2::CustomizeConnection<rusqlite::Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys=ON; PRAGMA synchronous=NORMAL;")?;
        Ok(())
    }
}

type PooledConn = r2d2::PooledConnection<SqliteConnectionManager>;

/// One stored fact with metadata. Tags are hydrated from `memory_tags`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub content: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// `None` = global memory, visible from every project.
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub time_created: i64,
    pub time_updated: i64,
    pub access_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_last_accessed: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryInput {
    pub content: String,
    pub category: Option<String>,
    pub session_id: Option<String>,
    pub project_id: Option<String>,
    pub source: Option<String>,
    pub tags: Option<Vec<String>>,
    /// Store with `project_id = NULL`, visible everywhere.
    pub global: Option<bool>,
    /// Skip duplicate detection.
    pub force: Option<bool>,
}

impl MemoryInput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn category(mut self, c: impl Into<String>) -> Self {
        self.category = Some(c.into());
        self
    }

    pub fn session(mut self, s: impl Into<String>) -> Self {
        self.session_id = Some(s.into());
        self
    }

    pub fn project(mut self, p: impl Into<String>) -> Self {
        self.project_id = Some(p.into());
        self
    }

    pub fn source(mut self, s: impl Into<String>) -> Self {
        self.source = Some(s.into());
        self
    }

    pub fn tags(mut self, t: Vec<String>) -> Self {
        self.tags = Some(t);
        self
    }

    pub fn global(mut self) -> Self {
        self.global = Some(true);
        self
    }

    pub fn force(mut self) -> Self {
        self.force = Some(true);
        self
    }
}

/// Update patch: `None` means leave the field unchanged.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryPatch {
    pub content: Option<String>,
    pub category: Option<String>,
    pub source: Option<String>,
}

/// Which visibility partition a list/search observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Project,
    Global,
    #[default]
    All,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListFilter {
    pub category: Option<String>,
    pub project_id: Option<String>,
    pub session_id: Option<String>,
    pub scope: Scope,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total: usize,
    pub by_category: HashMap<String, usize>,
}

pub(crate) fn validate_content(content: &str) -> Result<(), MemoryError> {
    if content.trim().is_empty() {
        return Err(MemoryError::EmptyContent);
    }
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(MemoryError::ContentTooLong(MAX_CONTENT_LEN));
    }
    Ok(())
}

pub fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_secs() as i64
}

/// SQLite-backed memory store. One file per project.
#[derive(Debug)]
pub struct MemoryStore {
    pool: Pool<SqliteConnectionManager>,
}

impl MemoryStore {
    /// Open (or create) a store at the given path and bring the schema to the
    /// current version. A migration error aborts the open; callers latch it.
    ///
    /// `":memory:"` opens a uuid-named shared-cache database so all pooled
    /// connections see the same data (test affordance).
    pub fn open(path: &str) -> Result<Self, MemoryError> {
        let pool_size = if path == ":memory:" { 2 } else { 8 };
        let manager = if path == ":memory:" {
            let name = uuid::Uuid::new_v4().to_string();
            SqliteConnectionManager::file(format!("file:{name}?mode=memory&cache=shared"))
        } else {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| MemoryError::Internal(format!("create {}: {e}", parent.display())))?;
                }
            }
            SqliteConnectionManager::file(path)
        };
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_customizer(Box::new(PragmaCustomizer))
            .build(manager)
            .map_err(|e| MemoryError::Internal(format!("pool: {e}")))?;

        let mut conn = pool
            .get()
            .map_err(|e| MemoryError::Internal(format!("pool: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        migrate::apply_pending(&mut conn)?;
        drop(conn);

        Ok(Self { pool })
    }

    pub(crate) fn conn(&self) -> Result<PooledConn, MemoryError> {
        self.pool
            .get()
            .map_err(|e| MemoryError::Internal(format!("pool: {e}")))
    }

    /// Run the built-in optimizer pragma. Errors are swallowed; close must
    /// never fail.
    pub fn close(&self) {
        if let Ok(conn) = self.conn() {
            if let Err(e) = conn.execute_batch("PRAGMA optimize;") {
                tracing::debug!(error = %e, "optimize on close failed");
            }
        }
    }

    // -- metadata housekeeping --

    pub fn get_meta(&self, key: &str) -> Option<String> {
        self.conn().ok().and_then(|c| {
            c.query_row("SELECT value FROM metadata WHERE key = ?1", [key], |r| r.get(0))
                .ok()
        })
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), MemoryError> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    /// Database file size in bytes (via pragma; 0 on error).
    pub fn db_size_bytes(&self) -> i64 {
        self.conn()
            .and_then(|c| {
                c.query_row(
                    "SELECT page_count * page_size FROM pragma_page_count, pragma_page_size",
                    [],
                    |r| r.get(0),
                )
                .map_err(MemoryError::from)
            })
            .unwrap_or(0)
    }
}

pub(crate) fn row_to_memory(row: &rusqlite::Row) -> rusqlite::Result<Memory> {
    Ok(Memory {
        id: row.get("id")?,
        content: row.get("content")?,
        category: row.get("category")?,
        session_id: row.get("session_id")?,
        project_id: row.get("project_id")?,
        source: row.get("source")?,
        time_created: row.get("time_created")?,
        time_updated: row.get("time_updated")?,
        access_count: row.get("access_count")?,
        time_last_accessed: row.get("time_last_accessed")?,
        tags: Vec::new(),
    })
}

//! Index optimization, cap enforcement, age-based purge, size accounting.

use rusqlite::params;
use serde::Serialize;

use super::*;

/// Metadata key stamping the last maintenance run (seconds since epoch).
const LAST_MAINTENANCE_KEY: &str = "last_maintenance";
const MAINTENANCE_INTERVAL_SECS: i64 = 7 * 86_400;

/// Outcome of a maintenance run. Each step is independently fallible; a
/// failure lands in its `*_error` field instead of aborting the run.
#[derive(Debug, Default, Serialize)]
pub struct MaintenanceReport {
    pub optimized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimize_error: Option<String>,
    pub evicted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evict_error: Option<String>,
    pub db_size_bytes: i64,
    pub skipped: bool,
}

impl MemoryStore {
    /// Issue the FTS engine's optimize command.
    pub fn optimize(&self) -> Result<(), MemoryError> {
        self.conn()?
            .execute("INSERT INTO memory_fts(memory_fts) VALUES ('optimize')", [])?;
        Ok(())
    }

    /// Reclaim free pages. Blocks writers while it runs.
    pub fn vacuum(&self) -> Result<(), MemoryError> {
        self.conn()?.execute_batch("VACUUM")?;
        Ok(())
    }

    /// Delete memories older than `days` that were never accessed — neither
    /// searched up nor explicitly refreshed. Returns how many went away.
    pub fn purge(&self, older_than_days: u32) -> Result<usize, MemoryError> {
        let cutoff = now_secs() - i64::from(older_than_days) * 86_400;
        let n = self.conn()?.execute(
            "DELETE FROM memory \
             WHERE time_created < ?1 AND access_count = 0 AND time_last_accessed IS NULL",
            params![cutoff],
        )?;
        if n > 0 {
            tracing::info!(purged = n, older_than_days, "purged untouched memories");
        }
        Ok(n)
    }

    /// Evict least-accessed, oldest-first rows down to `max_memories`
    /// (0 = unlimited). Returns how many were evicted.
    pub fn enforce_cap(&self, max_memories: u64) -> Result<usize, MemoryError> {
        if max_memories == 0 {
            return Ok(0);
        }
        let total = self.count()?;
        if total as u64 <= max_memories {
            return Ok(0);
        }
        let excess = total - max_memories as usize;
        let n = self.conn()?.execute(
            "DELETE FROM memory WHERE id IN ( \
                 SELECT id FROM memory ORDER BY access_count ASC, time_created ASC LIMIT ?1 \
             )",
            params![excess as i64],
        )?;
        tracing::info!(evicted = n, cap = max_memories, "cap enforced");
        Ok(n)
    }

    /// optimize → enforce cap → size accounting. Never raises; step failures
    /// are reported as fields.
    pub fn run_maintenance(&self, max_memories: u64) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match self.optimize() {
            Ok(()) => report.optimized = true,
            Err(e) => report.optimize_error = Some(e.to_string()),
        }
        match self.enforce_cap(max_memories) {
            Ok(n) => report.evicted = n,
            Err(e) => report.evict_error = Some(e.to_string()),
        }
        report.db_size_bytes = self.db_size_bytes();
        report
    }

    /// Run maintenance unless it already ran within the last 7 days.
    pub fn maybe_run_maintenance(&self, max_memories: u64) -> MaintenanceReport {
        let now = now_secs();
        let last: Option<i64> = self.get_meta(LAST_MAINTENANCE_KEY).and_then(|v| v.parse().ok());
        if let Some(last) = last {
            if now - last < MAINTENANCE_INTERVAL_SECS {
                return MaintenanceReport {
                    skipped: true,
                    ..Default::default()
                };
            }
        }
        let report = self.run_maintenance(max_memories);
        if let Err(e) = self.set_meta(LAST_MAINTENANCE_KEY, &now.to_string()) {
            tracing::warn!(error = %e, "failed to stamp last_maintenance");
        }
        report
    }
}

//! Ranked full-text search: normalize → FTS5 → decay/access re-rank → touch.

use rusqlite::params;
use serde::Serialize;

use super::*;
use crate::{query, rank};

/// A memory with its re-ranked score (negative, more negative = better).
#[derive(Debug, Clone, Serialize)]
pub struct RankedMemory {
    #[serde(flatten)]
    pub memory: Memory,
    pub rank: f64,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub project_id: Option<String>,
    pub category: Option<String>,
    pub limit: usize,
    pub decay_rate: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            project_id: None,
            category: None,
            limit: crate::config::DEFAULT_SEARCH_LIMIT,
            decay_rate: rank::DEFAULT_DECAY_RATE,
        }
    }
}

impl MemoryStore {
    /// Full-text search with time-decay and access-boost re-ranking.
    ///
    /// Never raises: an FTS error is logged with the sanitized query and
    /// yields an empty list. Returned rows are touched (access bump +
    /// `time_last_accessed`) in a single transaction.
    pub fn search(&self, raw_query: &str, opts: &SearchOptions) -> Vec<RankedMemory> {
        let fts_query = query::normalize(raw_query);
        if fts_query.is_empty() {
            return Vec::new();
        }

        let fetched = match self.fts_candidates(
            &fts_query,
            opts.project_id.as_deref(),
            opts.category.as_deref(),
            rank::overfetch(opts.limit),
        ) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(query = %fts_query, error = %e, "full-text query failed");
                return Vec::new();
            }
        };

        let now = now_secs();
        let mut ranked: Vec<RankedMemory> = fetched
            .into_iter()
            .map(|(memory, base_rank)| {
                let rank = rank::final_rank(
                    base_rank,
                    memory.time_created,
                    memory.access_count,
                    opts.decay_rate,
                    now,
                );
                RankedMemory { memory, rank }
            })
            .collect();
        // Stable sort: ties keep the FTS engine's original order.
        ranked.sort_by(|a, b| a.rank.partial_cmp(&b.rank).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(opts.limit);

        if let Err(e) = self.touch_all(ranked.iter().map(|r| r.memory.id.as_str()), now) {
            tracing::warn!(error = %e, "access write-back failed");
        } else {
            for r in &mut ranked {
                r.memory.access_count += 1;
                r.memory.time_last_accessed = Some(now);
            }
        }

        for r in &mut ranked {
            r.memory.tags = self.tags_get(&r.memory.id).unwrap_or_default();
        }
        ranked
    }

    /// Raw candidate fetch: memories joined with their BM25 rank, best first.
    /// Scope is project+global union when a project is given.
    fn fts_candidates(
        &self,
        fts_query: &str,
        project_id: Option<&str>,
        category: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(Memory, f64)>, MemoryError> {
        let mut sql = String::from(
            "SELECT m.*, memory_fts.rank AS base_rank FROM memory_fts \
             JOIN memory m ON m.rowid = memory_fts.rowid \
             WHERE memory_fts MATCH ?1",
        );
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(fts_query.to_string())];
        if let Some(p) = project_id {
            values.push(Box::new(p.to_string()));
            sql.push_str(&format!(" AND (m.project_id = ?{} OR m.project_id IS NULL)", values.len()));
        }
        if let Some(c) = category {
            values.push(Box::new(c.to_string()));
            sql.push_str(&format!(" AND m.category = ?{}", values.len()));
        }
        values.push(Box::new(limit as i64));
        sql.push_str(&format!(" ORDER BY memory_fts.rank LIMIT ?{}", values.len()));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(std::convert::AsRef::as_ref).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                Ok((row_to_memory(row)?, row.get::<_, f64>("base_rank")?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Scoped id+rank search used by the deduplicator. Unlike [`search`],
    /// errors propagate so the caller can decide how to degrade.
    pub(crate) fn fts_ids_scoped(
        &self,
        fts_query: &str,
        project_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>, MemoryError> {
        let (scope_sql, scope_params): (&str, Vec<Box<dyn rusqlite::types::ToSql>>) =
            match project_id {
                Some(p) => (
                    " AND (m.project_id = ?2 OR m.project_id IS NULL) ORDER BY memory_fts.rank LIMIT ?3",
                    vec![Box::new(p.to_string())],
                ),
                None => (" AND m.project_id IS NULL ORDER BY memory_fts.rank LIMIT ?2", vec![]),
            };
        let sql = format!(
            "SELECT m.id FROM memory_fts JOIN memory m ON m.rowid = memory_fts.rowid \
             WHERE memory_fts MATCH ?1{scope_sql}"
        );
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(fts_query.to_string())];
        values.extend(scope_params);
        values.push(Box::new(limit as i64));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(std::convert::AsRef::as_ref).collect();
        let ids = stmt
            .query_map(param_refs.as_slice(), |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn touch_all<'a>(
        &self,
        ids: impl Iterator<Item = &'a str>,
        now: i64,
    ) -> Result<(), MemoryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE memory SET access_count = access_count + 1, time_last_accessed = ?1 \
                 WHERE id = ?2",
            )?;
            for id in ids {
                stmt.execute(params![now, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

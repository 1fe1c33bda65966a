//! Memory CRUD operations.

use rusqlite::params;
use uuid::Uuid;

use super::*;
use crate::util::short_id;

impl MemoryStore {
    /// Store a new memory, or return/merge an existing one when the
    /// deduplicator finds a match (`force` bypasses it). All sub-effects of a
    /// fresh insert — row, tags, FTS sync via triggers — commit in one
    /// transaction.
    pub fn insert(&self, input: MemoryInput) -> Result<Memory, MemoryError> {
        validate_content(&input.content)?;

        let project_id = if input.global.unwrap_or(false) {
            None
        } else {
            input.project_id.clone()
        };

        if !input.force.unwrap_or(false) {
            match self.find_duplicate(&input.content, project_id.as_deref())? {
                Some(Duplicate::Exact(existing)) => {
                    tracing::debug!(id = short_id(&existing.id), "exact duplicate, returning existing");
                    return Ok(existing);
                }
                Some(Duplicate::Near(existing)) => {
                    tracing::debug!(id = short_id(&existing.id), "near duplicate, merging content");
                    let patch = MemoryPatch {
                        content: Some(input.content),
                        category: input.category,
                        source: input.source,
                    };
                    return self
                        .update(&existing.id, patch)?
                        .ok_or_else(|| MemoryError::Internal("dedup target vanished".into()));
                }
                None => {}
            }
        }

        let now = now_secs();
        let id = Uuid::new_v4().to_string();
        let category = input.category.unwrap_or_else(|| "general".into());
        let tags = normalize_tags(input.tags.unwrap_or_default());

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO memory \
             (id, content, category, session_id, project_id, source, \
              time_created, time_updated, access_count, time_last_accessed) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, 0, NULL)",
            params![id, input.content, category, input.session_id, project_id, input.source, now],
        )?;
        for tag in &tags {
            tx.execute(
                "INSERT OR IGNORE INTO memory_tags (memory_id, tag) VALUES (?1, ?2)",
                params![id, tag],
            )?;
        }
        tx.commit()?;

        Ok(Memory {
            id,
            content: input.content,
            category,
            session_id: input.session_id,
            project_id,
            source: input.source,
            time_created: now,
            time_updated: now,
            access_count: 0,
            time_last_accessed: None,
            tags,
        })
    }

    /// Apply only the supplied fields; always bumps `time_updated`.
    /// Returns `None` for an unknown id.
    pub fn update(&self, id: &str, patch: MemoryPatch) -> Result<Option<Memory>, MemoryError> {
        if let Some(ref c) = patch.content {
            validate_content(c)?;
        }

        let mut set_clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(c) = patch.content {
            set_clauses.push("content = ?");
            values.push(Box::new(c));
        }
        if let Some(c) = patch.category {
            set_clauses.push("category = ?");
            values.push(Box::new(c));
        }
        if let Some(s) = patch.source {
            set_clauses.push("source = ?");
            values.push(Box::new(s));
        }
        set_clauses.push("time_updated = ?");
        values.push(Box::new(now_secs()));
        values.push(Box::new(id.to_string()));

        let sql = format!("UPDATE memory SET {} WHERE id = ?", set_clauses.join(", "));
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(std::convert::AsRef::as_ref).collect();
        let n = self.conn()?.execute(&sql, param_refs.as_slice())?;
        if n == 0 {
            return Ok(None);
        }
        self.get(id)
    }

    /// Returns whether a row was removed. Tags, links and the FTS row vanish
    /// in the same statement via cascades and triggers.
    pub fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let n = self.conn()?.execute("DELETE FROM memory WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    pub fn get(&self, id: &str) -> Result<Option<Memory>, MemoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM memory WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => {
                let mut mem = row_to_memory(row)?;
                mem.tags = self.tags_get(&mem.id)?;
                Ok(Some(mem))
            }
            None => Ok(None),
        }
    }

    /// List memories under scope semantics, newest first.
    ///
    /// `project`: exact `project_id` match. `global`: `project_id IS NULL`
    /// only. `all`: union of both for the given project, or everything when
    /// no project is supplied.
    pub fn list(&self, filter: &ListFilter) -> Result<Vec<Memory>, MemoryError> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        match (filter.scope, filter.project_id.as_deref()) {
            (Scope::Project, Some(p)) => {
                values.push(Box::new(p.to_string()));
                clauses.push(format!("project_id = ?{}", values.len()));
            }
            (Scope::Global, _) => clauses.push("project_id IS NULL".into()),
            (Scope::All, Some(p)) => {
                values.push(Box::new(p.to_string()));
                clauses.push(format!("(project_id = ?{} OR project_id IS NULL)", values.len()));
            }
            (Scope::Project, None) | (Scope::All, None) => {}
        }
        if let Some(ref c) = filter.category {
            values.push(Box::new(c.clone()));
            clauses.push(format!("category = ?{}", values.len()));
        }
        if let Some(ref s) = filter.session_id {
            values.push(Box::new(s.clone()));
            clauses.push(format!("session_id = ?{}", values.len()));
        }
        values.push(Box::new(filter.limit.unwrap_or(20) as i64));
        let limit_idx = values.len();

        let mut sql = String::from("SELECT * FROM memory");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY time_created DESC LIMIT ?{limit_idx}"));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(std::convert::AsRef::as_ref).collect();
        let mut rows: Vec<Memory> = stmt
            .query_map(param_refs.as_slice(), row_to_memory)?
            .filter_map(|r| r.map_err(|e| tracing::warn!("row parse: {e}")).ok())
            .collect();
        drop(stmt);
        drop(conn);
        for mem in &mut rows {
            mem.tags = self.tags_get(&mem.id)?;
        }
        Ok(rows)
    }

    pub fn stats(&self) -> Result<Stats, MemoryError> {
        let conn = self.conn()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM memory", [], |r| r.get(0))?;
        let mut by_category = HashMap::new();
        let mut stmt = conn.prepare("SELECT category, COUNT(*) FROM memory GROUP BY category")?;
        let pairs = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as usize)))?;
        for pair in pairs.flatten() {
            by_category.insert(pair.0, pair.1);
        }
        Ok(Stats {
            total: total as usize,
            by_category,
        })
    }

    /// Explicit access refresh: adds 5 to `access_count` and stamps
    /// `time_last_accessed`, atomically. Returns `None` for an unknown id.
    pub fn refresh(&self, id: &str) -> Result<Option<Memory>, MemoryError> {
        let n = self.conn()?.execute(
            "UPDATE memory SET access_count = access_count + 5, time_last_accessed = ?1 WHERE id = ?2",
            params![now_secs(), id],
        )?;
        if n == 0 {
            return Ok(None);
        }
        self.get(id)
    }

    /// Verbatim row insert used by import: preserves id, timestamps and
    /// access counters. Caller guarantees the id is fresh.
    pub(crate) fn insert_verbatim(&self, mem: &Memory) -> Result<(), MemoryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO memory \
             (id, content, category, session_id, project_id, source, \
              time_created, time_updated, access_count, time_last_accessed) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                mem.id,
                mem.content,
                mem.category,
                mem.session_id,
                mem.project_id,
                mem.source,
                mem.time_created,
                mem.time_updated,
                mem.access_count,
                mem.time_last_accessed,
            ],
        )?;
        for tag in &normalize_tags(mem.tags.clone()) {
            tx.execute(
                "INSERT OR IGNORE INTO memory_tags (memory_id, tag) VALUES (?1, ?2)",
                params![mem.id, tag],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn exists(&self, id: &str) -> Result<bool, MemoryError> {
        let n: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM memory WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }
}

/// Lowercase, trim, drop empties, dedupe preserving order.
pub(crate) fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let t = tag.trim().to_lowercase();
        if !t.is_empty() && !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

//! Tag attach/detach and tag-driven lookup.
//!
//! Tags are lowercased and trimmed on entry and unique per memory (composite
//! primary key). Reserved `filepath:`/`git:`/`mtime:` tags from the file
//! knowledge cache ride the same rails.

use rusqlite::params;

use super::memory::normalize_tags;
use super::*;

impl MemoryStore {
    pub fn tags_get(&self, memory_id: &str) -> Result<Vec<String>, MemoryError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT tag FROM memory_tags WHERE memory_id = ?1 ORDER BY tag")?;
        let tags = stmt
            .query_map(params![memory_id], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(tags)
    }

    /// Idempotent attach. Returns how many tags are newly present.
    pub fn tags_add(&self, memory_id: &str, tags: &[String]) -> Result<usize, MemoryError> {
        if !self.exists(memory_id)? {
            return Err(MemoryError::NotFound(memory_id.into()));
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut added = 0;
        for tag in &normalize_tags(tags.to_vec()) {
            added += tx.execute(
                "INSERT OR IGNORE INTO memory_tags (memory_id, tag) VALUES (?1, ?2)",
                params![memory_id, tag],
            )?;
        }
        tx.commit()?;
        Ok(added)
    }

    pub fn tags_remove(&self, memory_id: &str, tags: &[String]) -> Result<usize, MemoryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        for tag in &normalize_tags(tags.to_vec()) {
            removed += tx.execute(
                "DELETE FROM memory_tags WHERE memory_id = ?1 AND tag = ?2",
                params![memory_id, tag],
            )?;
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Replace the whole tag set: clear then add, one transaction.
    pub fn tags_set(&self, memory_id: &str, tags: &[String]) -> Result<(), MemoryError> {
        if !self.exists(memory_id)? {
            return Err(MemoryError::NotFound(memory_id.into()));
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM memory_tags WHERE memory_id = ?1", params![memory_id])?;
        for tag in &normalize_tags(tags.to_vec()) {
            tx.execute(
                "INSERT OR IGNORE INTO memory_tags (memory_id, tag) VALUES (?1, ?2)",
                params![memory_id, tag],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Every distinct tag with its usage count, most used first.
    pub fn tags_list_all(&self) -> Result<Vec<(String, usize)>, MemoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT tag, COUNT(*) AS n FROM memory_tags GROUP BY tag ORDER BY n DESC, tag",
        )?;
        let rows = stmt
            .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as usize)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Memories carrying `tag`, newest first, project+global scope.
    pub fn search_by_tag(
        &self,
        tag: &str,
        project_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Memory>, MemoryError> {
        let tag = tag.trim().to_lowercase();
        let mut sql = String::from(
            "SELECT m.* FROM memory m \
             JOIN memory_tags t ON t.memory_id = m.id \
             WHERE t.tag = ?1",
        );
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(tag)];
        if let Some(p) = project_id {
            values.push(Box::new(p.to_string()));
            sql.push_str(&format!(" AND (m.project_id = ?{} OR m.project_id IS NULL)", values.len()));
        }
        values.push(Box::new(limit as i64));
        sql.push_str(&format!(" ORDER BY m.time_created DESC LIMIT ?{}", values.len()));

        let mut found: Vec<Memory> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&sql)?;
            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                values.iter().map(std::convert::AsRef::as_ref).collect();
            let rows = stmt.query_map(param_refs.as_slice(), row_to_memory)?
                .filter_map(|r| r.map_err(|e| tracing::warn!("row parse: {e}")).ok())
                .collect();
            rows
        };
        for mem in &mut found {
            mem.tags = self.tags_get(&mem.id)?;
        }
        Ok(found)
    }
}

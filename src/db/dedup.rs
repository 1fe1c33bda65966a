//! Exact and near-duplicate detection for inserts.
//!
//! Autonomous agents restate the same fact with different whitespace, casing
//! or an extra clause. Exact matches are caught by a normalized-content scan
//! over recent rows; near matches by a distinctive-token OR query plus
//! Jaccard similarity over word sets.

use std::collections::HashSet;

use super::*;
use crate::query;

/// Jaccard similarity above this is a near duplicate.
const NEAR_THRESHOLD: f64 = 0.6;
/// How many of the most recent in-scope rows the exact scan covers.
const EXACT_SCAN_ROWS: usize = 100;
/// Candidate cap for the near-duplicate FTS probe.
const NEAR_CANDIDATES: usize = 5;

#[derive(Debug)]
pub enum Duplicate {
    /// Same normalized content already stored.
    Exact(Memory),
    /// Similar content; the existing memory should absorb the new text.
    Near(Memory),
}

/// Lowercase, trim, collapse internal whitespace runs.
fn normalize_content(content: &str) -> String {
    content
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Word set for Jaccard: whitespace tokens of length > 1.
fn word_set(normalized: &str) -> HashSet<&str> {
    normalized
        .split_whitespace()
        .filter(|w| w.chars().count() > 1)
        .collect()
}

fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// The distinctive-token probe: longest tokens first, top 60% (at least 3),
/// composed with OR.
fn probe_query(content: &str) -> Option<String> {
    let mut tokens = query::normalize_tokens(content);
    tokens.sort();
    tokens.dedup();
    if tokens.is_empty() {
        return None;
    }
    tokens.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
    let keep = ((tokens.len() as f64 * 0.6).ceil() as usize).max(3).min(tokens.len());
    Some(tokens[..keep].join(" OR "))
}

impl MemoryStore {
    /// Check `content` against the project+global scope. `None` = store it.
    pub fn find_duplicate(
        &self,
        content: &str,
        project_id: Option<&str>,
    ) -> Result<Option<Duplicate>, MemoryError> {
        let normalized = normalize_content(content);

        if let Some(existing) = self.find_exact(&normalized, project_id)? {
            return Ok(Some(Duplicate::Exact(existing)));
        }

        // Near-duplicate probe. A failed FTS query here is non-fatal: log and
        // treat as no duplicate.
        let Some(probe) = probe_query(content) else {
            return Ok(None);
        };
        let candidates = match self.fts_ids_scoped(&probe, project_id, NEAR_CANDIDATES) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(query = %probe, error = %e, "dedup probe failed, storing anyway");
                return Ok(None);
            }
        };

        let new_words = word_set(&normalized);
        for id in candidates {
            let Some(existing) = self.get(&id)? else { continue };
            let existing_norm = normalize_content(&existing.content);
            let similarity = jaccard(&new_words, &word_set(&existing_norm));
            if similarity > NEAR_THRESHOLD {
                tracing::debug!(id = %id, similarity, "near duplicate");
                return Ok(Some(Duplicate::Near(existing)));
            }
        }
        Ok(None)
    }

    /// Scan the most recent in-scope rows for an identical normalized body.
    fn find_exact(
        &self,
        normalized: &str,
        project_id: Option<&str>,
    ) -> Result<Option<Memory>, MemoryError> {
        let (sql, binds): (String, Vec<Box<dyn rusqlite::types::ToSql>>) = match project_id {
            Some(p) => (
                "SELECT id, content FROM memory \
                 WHERE project_id = ?1 OR project_id IS NULL \
                 ORDER BY time_created DESC LIMIT ?2"
                    .into(),
                vec![Box::new(p.to_string()), Box::new(EXACT_SCAN_ROWS as i64)],
            ),
            None => (
                "SELECT id, content FROM memory \
                 WHERE project_id IS NULL \
                 ORDER BY time_created DESC LIMIT ?1"
                    .into(),
                vec![Box::new(EXACT_SCAN_ROWS as i64)],
            ),
        };

        let hit: Option<String> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&sql)?;
            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                binds.iter().map(std::convert::AsRef::as_ref).collect();
            let mut found = None;
            let rows = stmt.query_map(param_refs.as_slice(), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows.flatten() {
                if normalize_content(&row.1) == normalized {
                    found = Some(row.0);
                    break;
                }
            }
            found
        };

        match hit {
            Some(id) => self.get(&id),
            None => Ok(None),
        }
    }

    /// Count rows — used by maintenance and tests.
    pub fn count(&self) -> Result<usize, MemoryError> {
        let n: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM memory", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(
            normalize_content("  JWT   uses\tRS256\nsigning "),
            "jwt uses rs256 signing"
        );
    }

    #[test]
    fn jaccard_identical_is_one() {
        let a = word_set("alpha beta gamma");
        assert!((jaccard(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn probe_keeps_longest_tokens() {
        let q = probe_query("the authentication module uses jwt").unwrap();
        assert!(q.contains("authentication"));
        assert!(q.contains(" OR "));
    }

    #[test]
    fn probe_empty_for_stopword_soup() {
        assert!(probe_query("the a of").is_none());
    }
}

//! Directed typed edges between memories.

use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relationship {
    Related,
    Supersedes,
    Contradicts,
    Extends,
}

impl Relationship {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Related => "related",
            Self::Supersedes => "supersedes",
            Self::Contradicts => "contradicts",
            Self::Extends => "extends",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "related" => Some(Self::Related),
            "supersedes" => Some(Self::Supersedes),
            "contradicts" => Some(Self::Contradicts),
            "extends" => Some(Self::Extends),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkDirection {
    Outgoing,
    Incoming,
}

/// One edge touching a memory, with the *other* endpoint materialized.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryLink {
    pub source_id: String,
    pub target_id: String,
    pub relationship: Relationship,
    pub direction: LinkDirection,
    pub other: Memory,
}

impl MemoryStore {
    /// Upsert an edge. Returns `false` — without storing anything — when
    /// either id is unknown, the edge is a self-link, or the relationship is
    /// outside the allowed set. An existing edge for the ordered pair gets
    /// its relationship overwritten.
    pub fn link_add(&self, source_id: &str, target_id: &str, rel: &str) -> Result<bool, MemoryError> {
        let Some(rel) = Relationship::parse(rel) else {
            return Ok(false);
        };
        if source_id == target_id {
            return Ok(false);
        }
        if !self.exists(source_id)? || !self.exists(target_id)? {
            return Ok(false);
        }
        self.conn()?.execute(
            "INSERT INTO memory_links (source_id, target_id, relationship, time_created) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(source_id, target_id) DO UPDATE SET relationship = excluded.relationship",
            params![source_id, target_id, rel.as_str(), now_secs()],
        )?;
        Ok(true)
    }

    pub fn link_remove(&self, source_id: &str, target_id: &str) -> Result<bool, MemoryError> {
        let n = self.conn()?.execute(
            "DELETE FROM memory_links WHERE source_id = ?1 AND target_id = ?2",
            params![source_id, target_id],
        )?;
        Ok(n > 0)
    }

    /// Every edge touching `memory_id`, in either direction.
    pub fn links_list(&self, memory_id: &str) -> Result<Vec<MemoryLink>, MemoryError> {
        let edges: Vec<(String, String, String)> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT source_id, target_id, relationship FROM memory_links \
                 WHERE source_id = ?1 OR target_id = ?1 ORDER BY time_created",
            )?;
            let rows = stmt.query_map(params![memory_id], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut links = Vec::with_capacity(edges.len());
        for (source_id, target_id, rel) in edges {
            let Some(rel) = Relationship::parse(&rel) else {
                continue; // CHECK constraint makes this unreachable
            };
            let (direction, other_id) = if source_id == memory_id {
                (LinkDirection::Outgoing, target_id.clone())
            } else {
                (LinkDirection::Incoming, source_id.clone())
            };
            let Some(other) = self.get(&other_id)? else { continue };
            links.push(MemoryLink {
                source_id,
                target_id,
                relationship: rel,
                direction,
                other,
            });
        }
        Ok(links)
    }

    /// Outgoing edges only, as `(target_id, relationship)` pairs — the export
    /// representation.
    pub fn links_outgoing(&self, memory_id: &str) -> Result<Vec<(String, Relationship)>, MemoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT target_id, relationship FROM memory_links WHERE source_id = ?1 ORDER BY time_created",
        )?;
        let rows = stmt
            .query_map(params![memory_id], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|(t, r)| Relationship::parse(&r).map(|rel| (t, rel)))
            .collect())
    }
}

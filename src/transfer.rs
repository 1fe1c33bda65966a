//! Export/import of the memory set as a versioned JSON document.
//!
//! Import never trusts incoming ids: rows whose id already exists are
//! skipped, everything else is inserted under a fresh id, and links are
//! restored through the old→new id map afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::db::{Memory, MemoryStore, Relationship};
use crate::error::MemoryError;

pub const EXPORT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportDocument {
    pub version: u32,
    pub exported_at: String,
    pub memories: Vec<ExportMemory>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportMemory {
    pub id: String,
    pub content: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub project_id: Option<String>,
    pub time_created: i64,
    pub time_updated: i64,
    pub access_count: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub links: Vec<ExportLink>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportLink {
    pub target_id: String,
    pub relationship: Relationship,
}

#[derive(Debug, Default, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub links_restored: usize,
}

/// Build the v1 document. `project_id` restricts the export to that
/// project's memories plus globals; `None` exports everything.
pub fn export(store: &MemoryStore, project_id: Option<&str>) -> Result<ExportDocument, MemoryError> {
    let filter = crate::db::ListFilter {
        project_id: project_id.map(str::to_string),
        scope: crate::db::Scope::All,
        limit: Some(i64::MAX as usize),
        ..Default::default()
    };
    let memories = store.list(&filter)?;

    let mut out = Vec::with_capacity(memories.len());
    for mem in memories {
        let links = store
            .links_outgoing(&mem.id)?
            .into_iter()
            .map(|(target_id, relationship)| ExportLink {
                target_id,
                relationship,
            })
            .collect();
        out.push(ExportMemory {
            id: mem.id,
            content: mem.content,
            category: mem.category,
            source: mem.source,
            project_id: mem.project_id,
            time_created: mem.time_created,
            time_updated: mem.time_updated,
            access_count: mem.access_count,
            tags: mem.tags,
            links,
        });
    }
    Ok(ExportDocument {
        version: EXPORT_VERSION,
        exported_at: chrono::Utc::now().to_rfc3339(),
        memories: out,
    })
}

/// Apply a document to this store. Returns counts; bad link references are
/// dropped silently (they may point at memories the exporter filtered out).
pub fn import(store: &MemoryStore, doc: &ExportDocument) -> Result<ImportSummary, MemoryError> {
    if doc.version != EXPORT_VERSION {
        return Err(MemoryError::Validation(format!(
            "unsupported export version {}",
            doc.version
        )));
    }

    let mut summary = ImportSummary::default();
    let mut id_map: HashMap<&str, String> = HashMap::with_capacity(doc.memories.len());

    for entry in &doc.memories {
        if store.exists(&entry.id)? {
            // Existing row wins; keep it addressable for link restore.
            id_map.insert(&entry.id, entry.id.clone());
            summary.skipped += 1;
            continue;
        }
        let new_id = uuid::Uuid::new_v4().to_string();
        let mem = Memory {
            id: new_id.clone(),
            content: entry.content.clone(),
            category: entry.category.clone(),
            session_id: None,
            project_id: entry.project_id.clone(),
            source: entry.source.clone(),
            time_created: entry.time_created,
            time_updated: entry.time_updated,
            access_count: entry.access_count,
            time_last_accessed: None,
            tags: entry.tags.clone(),
        };
        store.insert_verbatim(&mem)?;
        id_map.insert(&entry.id, new_id);
        summary.imported += 1;
    }

    for entry in &doc.memories {
        let Some(source_id) = id_map.get(entry.id.as_str()) else { continue };
        for link in &entry.links {
            let Some(target_id) = id_map.get(link.target_id.as_str()) else { continue };
            if store.link_add(source_id, target_id, link.relationship.as_str())? {
                summary.links_restored += 1;
            }
        }
    }
    Ok(summary)
}

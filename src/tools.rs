//! JSON-in/string-out tool surface for the host agent runtime.
//!
//! Every operation is a single call: parse the JSON arguments, run the core
//! operation, render a string. The catch-all in [`dispatch`] converts every
//! error into a formatted `Error: …` string — nothing here panics on bad
//! input, and a latched init failure surfaces as "database unavailable".

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

use crate::db::{ListFilter, MemoryInput, MemoryPatch, SearchOptions};
use crate::error::MemoryError;
use crate::filecache::FileCache;
use crate::util::short_id;
use crate::{transfer, StoreContext};

/// Tool names exposed to the host, in registration order.
pub const TOOL_NAMES: &[&str] = &[
    "memory_store",
    "memory_search",
    "memory_update",
    "memory_delete",
    "memory_list",
    "memory_stats",
    "memory_refresh",
    "memory_tag",
    "memory_link",
    "memory_cleanup",
    "memory_export",
    "memory_import",
    "memory_file_check",
];

/// Entry point for the host: never returns an Err, never panics.
pub fn dispatch(ctx: &StoreContext, tool: &str, args: &Value) -> String {
    match dispatch_inner(ctx, tool, args) {
        Ok(out) => out,
        Err(e) => {
            if !e.is_validation() {
                tracing::warn!(tool, error = %e, "tool call failed");
            }
            format!("Error: {e}")
        }
    }
}

fn dispatch_inner(ctx: &StoreContext, tool: &str, args: &Value) -> Result<String, MemoryError> {
    match tool {
        "memory_store" => store_memory(ctx, args),
        "memory_search" => search(ctx, args),
        "memory_update" => update(ctx, args),
        "memory_delete" => delete(ctx, args),
        "memory_list" => list(ctx, args),
        "memory_stats" => stats(ctx),
        "memory_refresh" => refresh(ctx, args),
        "memory_tag" => tag(ctx, args),
        "memory_link" => link(ctx, args),
        "memory_cleanup" => cleanup(ctx, args),
        "memory_export" => export(ctx, args),
        "memory_import" => import(ctx, args),
        "memory_file_check" => file_check(ctx, args),
        other => Err(MemoryError::Validation(format!("unknown tool: {other}"))),
    }
}

fn parse<T: for<'de> Deserialize<'de>>(args: &Value) -> Result<T, MemoryError> {
    serde_json::from_value(args.clone())
        .map_err(|e| MemoryError::Validation(format!("bad arguments: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, MemoryError> {
    serde_json::to_string_pretty(value).map_err(|e| MemoryError::Internal(e.to_string()))
}

fn store_memory(ctx: &StoreContext, args: &Value) -> Result<String, MemoryError> {
    let mut input: MemoryInput = parse(args)?;
    if let Some(ref cat) = input.category {
        if !ctx.config().knows_category(cat) {
            tracing::debug!(category = %cat, "storing with unconfigured category");
        }
    }
    if input.global.unwrap_or(false) && !ctx.config().global_memories {
        tracing::debug!("globalMemories disabled, storing project-scoped");
        input.global = Some(false);
    }
    let memory = ctx.store()?.insert(input)?;
    to_json(&memory)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    query: String,
    project_id: Option<String>,
    category: Option<String>,
    limit: Option<usize>,
}

fn search(ctx: &StoreContext, args: &Value) -> Result<String, MemoryError> {
    let req: SearchRequest = parse(args)?;
    let opts = SearchOptions {
        project_id: req.project_id,
        category: req.category,
        limit: req.limit.filter(|&l| l > 0).unwrap_or(ctx.config().search_limit),
        ..Default::default()
    };
    let hits = ctx.store()?.search(&req.query, &opts);
    to_json(&hits)
}

#[derive(Deserialize)]
struct UpdateRequest {
    id: String,
    #[serde(flatten)]
    patch: MemoryPatch,
}

fn update(ctx: &StoreContext, args: &Value) -> Result<String, MemoryError> {
    let req: UpdateRequest = parse(args)?;
    match ctx.store()?.update(&req.id, req.patch)? {
        Some(memory) => to_json(&memory),
        None => Ok(format!("No memory found with id {}", req.id)),
    }
}

#[derive(Deserialize)]
struct IdRequest {
    id: String,
}

fn delete(ctx: &StoreContext, args: &Value) -> Result<String, MemoryError> {
    let req: IdRequest = parse(args)?;
    if ctx.store()?.delete(&req.id)? {
        Ok(format!("Deleted memory {}", short_id(&req.id)))
    } else {
        Ok(format!("No memory found with id {}", req.id))
    }
}

fn list(ctx: &StoreContext, args: &Value) -> Result<String, MemoryError> {
    let filter: ListFilter = parse(args)?;
    let memories = ctx.store()?.list(&filter)?;
    to_json(&memories)
}

fn stats(ctx: &StoreContext) -> Result<String, MemoryError> {
    to_json(&ctx.store()?.stats()?)
}

fn refresh(ctx: &StoreContext, args: &Value) -> Result<String, MemoryError> {
    let req: IdRequest = parse(args)?;
    match ctx.store()?.refresh(&req.id)? {
        Some(memory) => to_json(&memory),
        None => Ok(format!("No memory found with id {}", req.id)),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TagRequest {
    action: String,
    id: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    tag: Option<String>,
    project_id: Option<String>,
    limit: Option<usize>,
}

fn tag(ctx: &StoreContext, args: &Value) -> Result<String, MemoryError> {
    let req: TagRequest = parse(args)?;
    let store = ctx.store()?;
    let need_id = || {
        req.id
            .clone()
            .ok_or_else(|| MemoryError::Validation("missing id".into()))
    };
    match req.action.as_str() {
        "add" => {
            let id = need_id()?;
            let added = store.tags_add(&id, &req.tags)?;
            Ok(format!("Added {added} tag(s) to {}", short_id(&id)))
        }
        "remove" => {
            let id = need_id()?;
            let removed = store.tags_remove(&id, &req.tags)?;
            Ok(format!("Removed {removed} tag(s) from {}", short_id(&id)))
        }
        "set" => {
            let id = need_id()?;
            store.tags_set(&id, &req.tags)?;
            Ok(format!("Replaced tags on {}", short_id(&id)))
        }
        "list" => {
            let id = need_id()?;
            to_json(&store.tags_get(&id)?)
        }
        "list_all" => to_json(&store.tags_list_all()?),
        "search" => {
            let tag = req
                .tag
                .ok_or_else(|| MemoryError::Validation("missing tag".into()))?;
            let memories =
                store.search_by_tag(&tag, req.project_id.as_deref(), req.limit.unwrap_or(20))?;
            to_json(&memories)
        }
        other => Err(MemoryError::Validation(format!("unknown tag action: {other}"))),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkRequest {
    action: String,
    source_id: Option<String>,
    target_id: Option<String>,
    relationship: Option<String>,
    id: Option<String>,
}

fn link(ctx: &StoreContext, args: &Value) -> Result<String, MemoryError> {
    let req: LinkRequest = parse(args)?;
    let store = ctx.store()?;
    let pair = || -> Result<(String, String), MemoryError> {
        match (req.source_id.clone(), req.target_id.clone()) {
            (Some(s), Some(t)) => Ok((s, t)),
            _ => Err(MemoryError::Validation("missing sourceId/targetId".into())),
        }
    };
    match req.action.as_str() {
        "link" => {
            let (source, target) = pair()?;
            let rel = req.relationship.as_deref().unwrap_or("related");
            if store.link_add(&source, &target, rel)? {
                Ok(format!("Linked {} -[{rel}]-> {}", short_id(&source), short_id(&target)))
            } else {
                Ok("Link refused: unknown id, self-link, or bad relationship".into())
            }
        }
        "unlink" => {
            let (source, target) = pair()?;
            if store.link_remove(&source, &target)? {
                Ok(format!("Unlinked {} -> {}", short_id(&source), short_id(&target)))
            } else {
                Ok("No such link".into())
            }
        }
        "list" => {
            let id = req
                .id
                .ok_or_else(|| MemoryError::Validation("missing id".into()))?;
            to_json(&store.links_list(&id)?)
        }
        other => Err(MemoryError::Validation(format!("unknown link action: {other}"))),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CleanupRequest {
    purge_days: Option<u32>,
    #[serde(default)]
    vacuum: bool,
}

fn cleanup(ctx: &StoreContext, args: &Value) -> Result<String, MemoryError> {
    let req: CleanupRequest = parse(args)?;
    let store = ctx.store()?;
    let mut report = serde_json::to_value(store.run_maintenance(ctx.config().max_memories))
        .map_err(|e| MemoryError::Internal(e.to_string()))?;
    if let Some(days) = req.purge_days {
        let purged = store.purge(days)?;
        report["purged"] = purged.into();
    }
    if req.vacuum {
        match store.vacuum() {
            Ok(()) => report["vacuumed"] = true.into(),
            Err(e) => report["vacuum_error"] = e.to_string().into(),
        }
    }
    to_json(&report)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportRequest {
    project_id: Option<String>,
}

fn export(ctx: &StoreContext, args: &Value) -> Result<String, MemoryError> {
    let req: ExportRequest = parse(args)?;
    let doc = transfer::export(&*ctx.store()?, req.project_id.as_deref())?;
    to_json(&doc)
}

#[derive(Deserialize)]
struct ImportRequest {
    data: Value,
}

fn import(ctx: &StoreContext, args: &Value) -> Result<String, MemoryError> {
    let req: ImportRequest = parse(args)?;
    // Accept both the document object and a string of JSON.
    let doc: transfer::ExportDocument = match req.data {
        Value::String(text) => serde_json::from_str(&text)
            .map_err(|e| MemoryError::Validation(format!("bad export document: {e}")))?,
        other => serde_json::from_value(other)
            .map_err(|e| MemoryError::Validation(format!("bad export document: {e}")))?,
    };
    let summary = transfer::import(&*ctx.store()?, &doc)?;
    Ok(format!(
        "Imported {} memories ({} skipped, {} links restored)",
        summary.imported, summary.skipped, summary.links_restored
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileCheckRequest {
    path: PathBuf,
    project_id: Option<String>,
}

fn file_check(ctx: &StoreContext, args: &Value) -> Result<String, MemoryError> {
    let req: FileCheckRequest = parse(args)?;
    let cache = FileCache::new();
    match cache.check_freshness(&*ctx.store()?, &req.path, req.project_id.as_deref())? {
        Some(freshness) => to_json(&freshness),
        None => Ok(format!("No knowledge stored for {}", req.path.display())),
    }
}

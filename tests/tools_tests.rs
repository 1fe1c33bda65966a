use recollect::config::Config;
use recollect::tools::{dispatch, TOOL_NAMES};
use recollect::StoreContext;
use serde_json::{json, Value};

fn ctx() -> StoreContext {
    StoreContext::in_memory()
}

fn parse(out: &str) -> Value {
    serde_json::from_str(out).unwrap_or_else(|e| panic!("expected JSON, got {out:?}: {e}"))
}

#[test]
fn store_and_get_roundtrip() {
    let ctx = ctx();
    let out = dispatch(
        &ctx,
        "memory_store",
        &json!({
            "content": "the config loader ignores unknown keys",
            "category": "discovery",
            "tags": ["config"],
            "projectId": "p1"
        }),
    );
    let mem = parse(&out);
    assert_eq!(mem["category"], "discovery");
    assert_eq!(mem["project_id"], "p1");

    let id = mem["id"].as_str().unwrap();
    let listed = parse(&dispatch(&ctx, "memory_list", &json!({"projectId": "p1"})));
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["id"], id);
}

#[test]
fn search_returns_ranked_json() {
    let ctx = ctx();
    dispatch(&ctx, "memory_store", &json!({"content": "grpc deadline is forty five seconds"}));
    let hits = parse(&dispatch(&ctx, "memory_search", &json!({"query": "grpc deadline"})));
    let hits = hits.as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0]["rank"].as_f64().unwrap() < 0.0);
}

#[test]
fn update_delete_refresh_not_found_messages() {
    let ctx = ctx();
    let out = dispatch(&ctx, "memory_update", &json!({"id": "ghost", "content": "x"}));
    assert!(out.contains("No memory found"));
    let out = dispatch(&ctx, "memory_delete", &json!({"id": "ghost"}));
    assert!(out.contains("No memory found"));
    let out = dispatch(&ctx, "memory_refresh", &json!({"id": "ghost"}));
    assert!(out.contains("No memory found"));
}

#[test]
fn validation_errors_are_formatted_strings() {
    let ctx = ctx();
    let out = dispatch(&ctx, "memory_store", &json!({"content": ""}));
    assert!(out.starts_with("Error: "), "got {out}");

    let out = dispatch(&ctx, "memory_store", &json!({"content": "x".repeat(10_001)}));
    assert!(out.starts_with("Error: "));

    let out = dispatch(&ctx, "memory_nope", &json!({}));
    assert!(out.starts_with("Error: unknown tool"));

    let out = dispatch(&ctx, "memory_store", &json!({"content": 42}));
    assert!(out.starts_with("Error: "));
}

#[test]
fn unavailable_database_message_is_stable() {
    let mut config = Config::default();
    config.db_path = "/dev/null/nope/memory.db".into();
    let ctx = StoreContext::new(config);

    let first = dispatch(&ctx, "memory_stats", &json!({}));
    assert!(first.contains("database unavailable"), "got {first}");
    let second = dispatch(&ctx, "memory_list", &json!({}));
    assert!(second.contains("database unavailable"));
}

#[test]
fn stats_uses_camel_case_keys() {
    let ctx = ctx();
    dispatch(&ctx, "memory_store", &json!({"content": "one categorized fact", "category": "decision"}));
    let stats = parse(&dispatch(&ctx, "memory_stats", &json!({})));
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["byCategory"]["decision"], 1);
}

#[test]
fn tag_tool_actions() {
    let ctx = ctx();
    let mem = parse(&dispatch(&ctx, "memory_store", &json!({"content": "taggable tool fact"})));
    let id = mem["id"].as_str().unwrap();

    let out = dispatch(&ctx, "memory_tag", &json!({"action": "add", "id": id, "tags": ["Alpha", "beta"]}));
    assert!(out.contains("Added 2"));

    let tags = parse(&dispatch(&ctx, "memory_tag", &json!({"action": "list", "id": id})));
    assert_eq!(tags, json!(["alpha", "beta"]));

    let all = parse(&dispatch(&ctx, "memory_tag", &json!({"action": "list_all"})));
    assert_eq!(all.as_array().unwrap().len(), 2);

    let found = parse(&dispatch(&ctx, "memory_tag", &json!({"action": "search", "tag": "alpha"})));
    assert_eq!(found.as_array().unwrap().len(), 1);

    let out = dispatch(&ctx, "memory_tag", &json!({"action": "remove", "id": id, "tags": ["beta"]}));
    assert!(out.contains("Removed 1"));

    let out = dispatch(&ctx, "memory_tag", &json!({"action": "explode", "id": id}));
    assert!(out.starts_with("Error: "));
}

#[test]
fn link_tool_actions() {
    let ctx = ctx();
    let a = parse(&dispatch(&ctx, "memory_store", &json!({"content": "tool link source"})));
    let b = parse(&dispatch(&ctx, "memory_store", &json!({"content": "tool link target"})));
    let (a, b) = (a["id"].as_str().unwrap(), b["id"].as_str().unwrap());

    let out = dispatch(
        &ctx,
        "memory_link",
        &json!({"action": "link", "sourceId": a, "targetId": b, "relationship": "supersedes"}),
    );
    assert!(out.contains("Linked"));

    // self-link refused, not an error
    let out = dispatch(
        &ctx,
        "memory_link",
        &json!({"action": "link", "sourceId": a, "targetId": a, "relationship": "related"}),
    );
    assert!(out.contains("refused"));

    let links = parse(&dispatch(&ctx, "memory_link", &json!({"action": "list", "id": a})));
    assert_eq!(links.as_array().unwrap().len(), 1);
    assert_eq!(links[0]["relationship"], "supersedes");

    let out = dispatch(&ctx, "memory_link", &json!({"action": "unlink", "sourceId": a, "targetId": b}));
    assert!(out.contains("Unlinked"));
}

#[test]
fn cleanup_reports_and_purges() {
    let ctx = ctx();
    dispatch(&ctx, "memory_store", &json!({"content": "fact for cleanup run"}));
    let report = parse(&dispatch(&ctx, "memory_cleanup", &json!({"purgeDays": 30, "vacuum": true})));
    assert_eq!(report["optimized"], true);
    assert_eq!(report["purged"], 0);
    assert_eq!(report["vacuumed"], true);
}

#[test]
fn export_import_through_tools() {
    let ctx = ctx();
    dispatch(&ctx, "memory_store", &json!({"content": "portable knowledge survives transfer"}));
    let doc = dispatch(&ctx, "memory_export", &json!({}));
    assert!(parse(&doc)["version"] == 1);

    let fresh = StoreContext::in_memory();
    let out = dispatch(&fresh, "memory_import", &json!({"data": parse(&doc)}));
    assert!(out.contains("Imported 1"), "got {out}");

    // the string form is accepted too
    let fresh2 = StoreContext::in_memory();
    let out = dispatch(&fresh2, "memory_import", &json!({"data": doc}));
    assert!(out.contains("Imported 1"));
}

#[test]
fn file_check_without_knowledge() {
    let ctx = ctx();
    let out = dispatch(&ctx, "memory_file_check", &json!({"path": "/tmp/never-stored.xyz"}));
    assert!(out.contains("No knowledge stored"));
}

#[test]
fn search_limit_config_is_honored() {
    let mut config = Config::from_json(r#"{"searchLimit": 2, "dbPath": ":memory:"}"#);
    config.db_path = ":memory:".into();
    let ctx = StoreContext::new(config);
    for i in 0..5 {
        dispatch(
            &ctx,
            "memory_store",
            &json!({"content": format!("searchable filler item {i}"), "force": true}),
        );
    }
    let hits = parse(&dispatch(&ctx, "memory_search", &json!({"query": "searchable filler"})));
    assert_eq!(hits.as_array().unwrap().len(), 2);
}

#[test]
fn global_memories_toggle_demotes_global_stores() {
    let mut config = Config::from_json(r#"{"globalMemories": false}"#);
    config.db_path = ":memory:".into();
    let ctx = StoreContext::new(config);

    let mem = parse(&dispatch(
        &ctx,
        "memory_store",
        &json!({"content": "wants to be global", "global": true, "projectId": "p1"}),
    ));
    // the global flag is ignored: the memory stays project-scoped
    assert_eq!(mem["project_id"], "p1");

    // with the default config the same request goes global
    let ctx = StoreContext::in_memory();
    let mem = parse(&dispatch(
        &ctx,
        "memory_store",
        &json!({"content": "wants to be global", "global": true, "projectId": "p1"}),
    ));
    assert_eq!(mem["project_id"], Value::Null);
}

#[test]
fn tool_names_cover_the_surface() {
    assert_eq!(TOOL_NAMES.len(), 13);
    assert!(TOOL_NAMES.contains(&"memory_store"));
    assert!(TOOL_NAMES.contains(&"memory_file_check"));
}

use recollect::db::*;

fn test_db() -> MemoryStore {
    MemoryStore::open(":memory:").expect("in-memory db")
}

#[test]
fn exact_dedup_is_whitespace_and_case_insensitive() {
    let db = test_db();
    let first = db.insert(MemoryInput::new("JWT uses RS256 signing")).unwrap();
    let second = db
        .insert(MemoryInput::new("  jwt  uses  rs256  signing  "))
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(db.count().unwrap(), 1);
    // exact duplicate returns the existing memory unchanged
    assert_eq!(second.content, "JWT uses RS256 signing");
}

#[test]
fn near_duplicate_merges_content() {
    let db = test_db();
    let first = db
        .insert(MemoryInput::new(
            "the authentication module uses JWT tokens for signing requests securely",
        ))
        .unwrap();
    let second = db
        .insert(MemoryInput::new(
            "the authentication module uses JWT tokens for signing requests reliably",
        ))
        .unwrap();

    assert_eq!(first.id, second.id);
    assert!(second.content.contains("reliably"));
    assert_eq!(db.count().unwrap(), 1);
}

#[test]
fn insert_twice_yields_one_row_force_yields_two() {
    let db = test_db();
    db.insert(MemoryInput::new("deduplication idempotence check")).unwrap();
    db.insert(MemoryInput::new("deduplication idempotence check")).unwrap();
    assert_eq!(db.count().unwrap(), 1);

    db.insert(MemoryInput::new("deduplication idempotence check").force())
        .unwrap();
    assert_eq!(db.count().unwrap(), 2);
}

#[test]
fn distinct_content_is_not_merged() {
    let db = test_db();
    db.insert(MemoryInput::new("the deployment pipeline runs on github actions"))
        .unwrap();
    db.insert(MemoryInput::new("database migrations run inside one transaction each"))
        .unwrap();
    assert_eq!(db.count().unwrap(), 2);
}

#[test]
fn global_exact_match_deduplicates_project_insert() {
    let db = test_db();
    let global = db
        .insert(MemoryInput::new("shared convention nobody should restate").global())
        .unwrap();
    let project = db
        .insert(MemoryInput::new("shared convention nobody should restate").project("p1"))
        .unwrap();
    assert_eq!(global.id, project.id);
}

#[test]
fn other_project_content_is_out_of_scope() {
    let db = test_db();
    db.insert(MemoryInput::new("isolated fact living in project one").project("p1"))
        .unwrap();
    db.insert(MemoryInput::new("isolated fact living in project one").project("p2"))
        .unwrap();
    // different project scopes: no dedup across them
    assert_eq!(db.count().unwrap(), 2);
}

#[test]
fn near_duplicate_leaves_tags_untouched() {
    let db = test_db();
    let first = db
        .insert(
            MemoryInput::new("retry budget for the ingest worker pool is three attempts")
                .tags(vec!["retries".into()]),
        )
        .unwrap();
    let second = db
        .insert(
            MemoryInput::new("retry budget for the ingest worker pool is five attempts")
                .tags(vec!["unrelated".into()]),
        )
        .unwrap();

    assert_eq!(first.id, second.id);
    let tags = db.tags_get(&first.id).unwrap();
    assert_eq!(tags, vec!["retries"]);
}

#[test]
fn category_and_source_update_on_near_merge() {
    let db = test_db();
    let first = db
        .insert(MemoryInput::new("the scheduler promotes jobs strictly in priority order"))
        .unwrap();
    assert_eq!(first.category, "general");

    let second = db
        .insert(
            MemoryInput::new("the scheduler promotes jobs strictly in arrival order")
                .category("discovery")
                .source("session-42"),
        )
        .unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.category, "discovery");
    assert_eq!(second.source.as_deref(), Some("session-42"));
}

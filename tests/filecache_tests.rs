use std::process::Command;

use recollect::db::{MemoryInput, MemoryStore};
use recollect::filecache::{filepath_tag, FileCache, TAG_GIT, TAG_MTIME};
use tempfile::TempDir;

fn test_db() -> MemoryStore {
    MemoryStore::open(":memory:").expect("in-memory db")
}

#[test]
fn upsert_then_fresh_then_stale_then_reset() {
    let db = test_db();
    let cache = FileCache::new();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("x.md");
    std::fs::write(&path, "# Notes\noriginal body\n").unwrap();

    let mem = cache
        .upsert(&db, &path, "notes about x".into(), vec![], Some("test".into()), None, None)
        .unwrap();
    assert!(mem.tags.iter().any(|t| t.starts_with("filepath:")));
    assert!(mem.tags.iter().any(|t| t.starts_with(TAG_MTIME)));

    let fresh = cache.check_freshness(&db, &path, None).unwrap().unwrap();
    assert!(fresh.fresh);
    assert_eq!(fresh.stored_content, "notes about x");

    // modify past the mtime tolerance
    std::thread::sleep(std::time::Duration::from_millis(1500));
    std::fs::write(&path, "# Notes\nchanged body\n").unwrap();

    let stale = cache.check_freshness(&db, &path, None).unwrap().unwrap();
    assert!(!stale.fresh);

    // re-upsert replaces content, keeps the memory id, resets the fingerprint
    let updated = cache
        .upsert(&db, &path, "updated notes".into(), vec![], Some("test".into()), None, None)
        .unwrap();
    assert_eq!(updated.id, mem.id);
    assert_eq!(updated.content, "updated notes");

    let fresh_again = cache.check_freshness(&db, &path, None).unwrap().unwrap();
    assert!(fresh_again.fresh);
}

#[test]
fn unknown_path_has_no_knowledge() {
    let db = test_db();
    let cache = FileCache::new();
    let dir = TempDir::new().unwrap();
    assert!(cache
        .check_freshness(&db, &dir.path().join("never-stored.md"), None)
        .unwrap()
        .is_none());
}

#[test]
fn one_memory_per_path() {
    let db = test_db();
    let cache = FileCache::new();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("single.md");
    std::fs::write(&path, "body\n").unwrap();

    for round in 0..3 {
        cache
            .upsert(&db, &path, format!("revision {round}"), vec![], None, None, None)
            .unwrap();
    }
    let found = db.search_by_tag(&filepath_tag(&path), None, 10).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].content, "revision 2");
}

#[test]
fn upsert_preserves_non_fingerprint_tags() {
    let db = test_db();
    let cache = FileCache::new();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tagged.md");
    std::fs::write(&path, "body\n").unwrap();

    cache
        .upsert(&db, &path, "v1".into(), vec!["docs".into()], None, None, None)
        .unwrap();
    let updated = cache
        .upsert(&db, &path, "v2".into(), vec![], None, None, None)
        .unwrap();

    assert!(updated.tags.iter().any(|t| t == "docs"));
    // exactly one mtime fingerprint remains after the replace
    assert_eq!(updated.tags.iter().filter(|t| t.starts_with(TAG_MTIME)).count(), 1);
}

#[test]
fn scan_caches_metadata_files_once_per_run() {
    let db = test_db();
    let cache = FileCache::new();
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("README.md"),
        "# Demo\n\nA sample project.\n\n## Usage\n\nRun it.\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("package.json"),
        r#"{"name":"demo","version":"2.0.0","dependencies":{"left-pad":"^1"}}"#,
    )
    .unwrap();

    let stored = cache.scan_on_startup(&db, dir.path(), Some("p1"));
    assert_eq!(stored, 2);

    // in-process memo: the same run never rescans
    assert_eq!(cache.scan_on_startup(&db, dir.path(), Some("p1")), 0);

    // a fresh run sees fresh fingerprints and skips the store round-trip
    assert_eq!(FileCache::new().scan_on_startup(&db, dir.path(), Some("p1")), 0);

    let readme = db
        .search_by_tag(&filepath_tag(&dir.path().join("README.md")), Some("p1"), 1)
        .unwrap();
    assert_eq!(readme.len(), 1);
    assert!(readme[0].content.contains("sample project"));

    let manifest = db
        .search_by_tag(&filepath_tag(&dir.path().join("package.json")), Some("p1"), 1)
        .unwrap();
    assert!(manifest[0].content.contains("name: demo"));
    assert!(manifest[0].content.contains("left-pad"));
}

#[test]
fn scan_skips_oversized_files() {
    let db = test_db();
    let cache = FileCache::new();
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("README.md"), "x".repeat(60 * 1024)).unwrap();
    assert_eq!(cache.scan_on_startup(&db, dir.path(), None), 0);
}

#[test]
fn git_fingerprint_tracks_index_state() {
    let dir = TempDir::new().unwrap();
    let ok = Command::new("git")
        .arg("init")
        .current_dir(dir.path())
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !ok {
        return; // no git on this machine
    }
    let path = dir.path().join("tracked.md");
    std::fs::write(&path, "tracked content\n").unwrap();
    Command::new("git")
        .args(["add", "tracked.md"])
        .current_dir(dir.path())
        .output()
        .unwrap();

    let db = test_db();
    let cache = FileCache::new();
    let mem = cache
        .upsert(&db, &path, "knowledge".into(), vec![], None, None, None)
        .unwrap();
    assert!(mem.tags.iter().any(|t| t.starts_with(TAG_GIT)));

    // same index state: fresh, even if mtime wiggles
    let fresh = cache.check_freshness(&db, &path, None).unwrap().unwrap();
    assert!(fresh.fresh);

    // restage different content: index hash moves, knowledge is stale
    std::fs::write(&path, "different content\n").unwrap();
    Command::new("git")
        .args(["add", "tracked.md"])
        .current_dir(dir.path())
        .output()
        .unwrap();
    let stale = cache.check_freshness(&db, &path, None).unwrap().unwrap();
    assert!(!stale.fresh);
}

#[test]
fn filepath_tags_ride_normal_tag_rails() {
    // reserved tags survive the store's lowercasing because they are already
    // lowercase by construction
    let db = test_db();
    let mem = db
        .insert(MemoryInput::new("manual file knowledge").tags(vec!["filepath:/tmp/a.md".into()]).force())
        .unwrap();
    assert!(mem.tags.contains(&"filepath:/tmp/a.md".to_string()));
}

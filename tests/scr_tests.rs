use recollect::scr::{
    inject_capability_prompt, Message, Pipeline, PruneReason, Role, ScrState, CAPABILITY_PROMPT,
};
use tempfile::TempDir;

fn transcript() -> Vec<Message> {
    vec![
        Message::system("you are a coding agent"),
        Message::user("please fix the bug"),
        Message::tool("write failed: permission denied")
            .with_write_key("/src/lib.rs")
            .with_error(),
        Message::tool("wrote /src/lib.rs v1").with_write_key("/src/lib.rs"),
        Message::assistant("done, take a look"),
        Message::user("please fix the bug"),
        Message::tool("wrote /src/lib.rs v2").with_write_key("/src/lib.rs"),
        Message::assistant("updated again"),
    ]
}

#[test]
fn standard_pipeline_annotates_without_deleting() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::standard(dir.path());
    let mut messages = transcript();
    let len_before = messages.len();
    let mut state = ScrState::new("sess-1");

    let pruned = pipeline.run(&mut messages, &mut state);
    assert!(pruned > 0);
    assert_eq!(messages.len(), len_before, "pruning never deletes");

    // duplicate user message: older copy pruned, newest kept
    assert!(messages[1].pruned);
    assert!(!messages[5].pruned);
    // superseded write: only the newest write to /src/lib.rs survives
    assert!(messages[3].pruned);
    assert!(!messages[6].pruned);
    // system message untouched
    assert!(!messages[0].pruned);

    assert_eq!(state.passes, 1);
    assert_eq!(state.pruned_total as usize, pruned);
    assert_eq!(state.prune_map.len(), pruned);
}

#[test]
fn prune_map_persists_and_reloads() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::standard(dir.path());
    let mut messages = transcript();
    let mut state = ScrState::new("sess-persist");
    pipeline.run(&mut messages, &mut state);

    assert!(pipeline.state_path("sess-persist").exists());

    let reloaded = pipeline.load_state("sess-persist");
    assert_eq!(reloaded.session_id, "sess-persist");
    assert_eq!(reloaded.passes, 1);
    assert_eq!(reloaded.prune_map, state.prune_map);
}

#[test]
fn missing_state_is_fresh() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::standard(dir.path());
    let state = pipeline.load_state("never-seen");
    assert_eq!(state.passes, 0);
    assert!(state.prune_map.is_empty());
}

#[test]
fn session_ids_are_sanitized_for_paths() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::standard(dir.path());
    let path = pipeline.state_path("../../etc/passwd");
    assert!(path.starts_with(dir.path()));
    assert!(!path.to_string_lossy().contains(".."));
}

#[test]
fn reducer_stats_accumulate_across_passes() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::standard(dir.path());
    let mut state = ScrState::new("sess-stats");

    let mut messages = transcript();
    pipeline.run(&mut messages, &mut state);
    let after_first = state.pruned_total;

    // a second pass over the already-annotated transcript finds nothing new
    pipeline.run(&mut messages, &mut state);
    assert_eq!(state.passes, 2);
    assert_eq!(state.pruned_total, after_first);
    assert!(state.by_reducer.contains_key("dedupe"));
    assert!(state.by_reducer.contains_key("supersede-writes"));
    assert!(state.by_reducer.contains_key("purge-errors"));
    assert!(state.by_reducer.contains_key("prune"));
}

#[test]
fn error_purge_marks_old_errors() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::standard(dir.path());
    let mut messages: Vec<Message> = (0..8)
        .map(|i| Message::tool(format!("attempt {i} failed")).with_error())
        .collect();
    let mut state = ScrState::new("sess-errors");
    pipeline.run(&mut messages, &mut state);

    assert!(messages[0].pruned);
    assert_eq!(state.prune_map.get(&0), Some(&PruneReason::Errored));
    // the trailing window is spared
    assert!(!messages[7].pruned);
}

#[test]
fn capability_prompt_injection() {
    // appended to an existing system message
    let mut messages = transcript();
    inject_capability_prompt(&mut messages);
    assert_eq!(messages[0].role, Role::System);
    assert!(messages[0].content.contains(CAPABILITY_PROMPT));
    let len = messages.len();
    // idempotent
    inject_capability_prompt(&mut messages);
    assert_eq!(messages.len(), len);
    assert_eq!(messages[0].content.matches(CAPABILITY_PROMPT).count(), 1);

    // inserted when no system message leads the transcript
    let mut bare = vec![Message::user("hello")];
    inject_capability_prompt(&mut bare);
    assert_eq!(bare[0].role, Role::System);
    assert_eq!(bare[0].content, CAPABILITY_PROMPT);
}

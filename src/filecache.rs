//! File knowledge cache: at most one live memory per absolute file path,
//! fingerprinted so stale knowledge is detected instead of trusted.
//!
//! The fingerprint is `(git blob hash, mtime in ms)`, encoded into reserved
//! tags so it rides the ordinary tag rails: `filepath:<abs>`, `git:<hash>`,
//! `mtime:<ms>`. Git is consulted with a short time budget and fails silent;
//! mtime comparison tolerates sub-second filesystem jitter.

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use crate::db::{Memory, MemoryInput, MemoryPatch, MemoryStore};
use crate::error::MemoryError;
use crate::util::truncate_chars;

pub const TAG_FILEPATH: &str = "filepath:";
pub const TAG_GIT: &str = "git:";
pub const TAG_MTIME: &str = "mtime:";

/// Subprocess budget for git metadata.
const GIT_TIMEOUT: Duration = Duration::from_secs(3);
/// Files larger than this are skipped by the startup scan.
const SCAN_MAX_BYTES: u64 = 50 * 1024;
const SCAN_MAX_CHUNKS: usize = 5;
const SCAN_CHUNK_CHARS: usize = 400;
/// mtime drift below this still counts as unchanged.
const MTIME_TOLERANCE_MS: i64 = 1000;

/// Canonical project metadata files worth caching at startup.
const SCAN_FILES: &[&str] = &[
    "README.md",
    "package.json",
    "Cargo.toml",
    "pyproject.toml",
    ".editorconfig",
];

#[derive(Debug, Clone, Default)]
pub struct Fingerprint {
    pub git_hash: Option<String>,
    pub mtime_ms: Option<i64>,
}

impl Fingerprint {
    /// Read the current fingerprint. Both halves degrade silently.
    pub fn of(path: &Path) -> Self {
        Self {
            git_hash: git_hash_object(path),
            mtime_ms: mtime_ms(path),
        }
    }

    fn tags(&self) -> Vec<String> {
        let mut tags = Vec::with_capacity(2);
        if let Some(ref h) = self.git_hash {
            tags.push(format!("{TAG_GIT}{h}"));
        }
        if let Some(ms) = self.mtime_ms {
            tags.push(format!("{TAG_MTIME}{ms}"));
        }
        tags
    }
}

#[derive(Debug, Serialize)]
pub struct Freshness {
    pub fresh: bool,
    pub stored_content: String,
    pub memory_id: String,
}

/// In-process scan memo plus the path-keyed upsert/freshness operations.
#[derive(Default)]
pub struct FileCache {
    scanned: Mutex<HashSet<PathBuf>>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the memory for `path` and compare fingerprints.
    /// `None` when no memory exists for the path.
    pub fn check_freshness(
        &self,
        store: &MemoryStore,
        path: &Path,
        project_id: Option<&str>,
    ) -> Result<Option<Freshness>, MemoryError> {
        let Some(existing) = self.lookup(store, path, project_id)? else {
            return Ok(None);
        };
        let stored_git = tag_value(&existing.tags, TAG_GIT);
        let stored_mtime: Option<i64> =
            tag_value(&existing.tags, TAG_MTIME).and_then(|v| v.parse().ok());
        let current = Fingerprint::of(path);

        let fresh = match (&current.git_hash, stored_git) {
            (Some(cur), Some(stored)) => cur == stored,
            _ => match (current.mtime_ms, stored_mtime) {
                (Some(cur), Some(stored)) => (cur - stored).abs() < MTIME_TOLERANCE_MS,
                _ => false,
            },
        };
        Ok(Some(Freshness {
            fresh,
            stored_content: existing.content.clone(),
            memory_id: existing.id,
        }))
    }

    /// Store or refresh the knowledge memory for `path`. An existing memory
    /// keeps its id and its non-fingerprint tags; fingerprint tags are
    /// replaced wholesale. Inserts bypass dedup — path identity, not content
    /// similarity, is the key here.
    #[allow(clippy::too_many_arguments)]
    pub fn upsert(
        &self,
        store: &MemoryStore,
        path: &Path,
        content: String,
        extra_tags: Vec<String>,
        source: Option<String>,
        session_id: Option<String>,
        project_id: Option<String>,
    ) -> Result<Memory, MemoryError> {
        let path_tag = filepath_tag(path);
        let mut fingerprint_tags = vec![path_tag.clone()];
        fingerprint_tags.extend(Fingerprint::of(path).tags());

        if let Some(existing) = self.lookup(store, path, project_id.as_deref())? {
            let patch = MemoryPatch {
                content: Some(content),
                category: None,
                source: source.clone(),
            };
            let updated = store
                .update(&existing.id, patch)?
                .ok_or_else(|| MemoryError::Internal("file memory vanished during upsert".into()))?;

            let mut tags: Vec<String> = existing
                .tags
                .iter()
                .filter(|t| !is_fingerprint_tag(t))
                .cloned()
                .collect();
            tags.extend(fingerprint_tags);
            tags.extend(extra_tags);
            store.tags_set(&updated.id, &tags)?;
            return store
                .get(&updated.id)?
                .ok_or_else(|| MemoryError::Internal("file memory vanished during upsert".into()));
        }

        let mut tags = fingerprint_tags;
        tags.extend(extra_tags);
        let mut input = MemoryInput::new(content)
            .category("discovery")
            .tags(tags)
            .force();
        input.source = source;
        input.session_id = session_id;
        input.project_id = project_id;
        store.insert(input)
    }

    /// Cache canonical project metadata files. Skips anything already scanned
    /// this run or already fresh in the store. Returns how many files were
    /// (re)stored.
    pub fn scan_on_startup(
        &self,
        store: &MemoryStore,
        directory: &Path,
        project_id: Option<&str>,
    ) -> usize {
        let mut stored = 0;
        for name in SCAN_FILES {
            let path = directory.join(name);
            {
                let mut scanned = self.scanned.lock();
                if !scanned.insert(path.clone()) {
                    continue;
                }
            }
            let Ok(meta) = std::fs::metadata(&path) else { continue };
            if !meta.is_file() || meta.len() > SCAN_MAX_BYTES {
                continue;
            }
            match self.check_freshness(store, &path, project_id) {
                Ok(Some(f)) if f.fresh => continue,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "freshness check failed");
                    continue;
                }
            }
            let Ok(raw) = std::fs::read_to_string(&path) else { continue };

            let content = if is_manifest(name) {
                summarize_manifest(name, &raw)
            } else {
                chunk_sections(&raw)
            };
            if content.is_empty() {
                continue;
            }

            match self.upsert(
                store,
                &path,
                content,
                vec!["project-meta".into()],
                Some("startup-scan".into()),
                None,
                project_id.map(str::to_string),
            ) {
                Ok(_) => stored += 1,
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "scan upsert failed"),
            }
        }
        stored
    }

    fn lookup(
        &self,
        store: &MemoryStore,
        path: &Path,
        project_id: Option<&str>,
    ) -> Result<Option<Memory>, MemoryError> {
        let tag = filepath_tag(path);
        Ok(store.search_by_tag(&tag, project_id, 1)?.into_iter().next())
    }
}

/// Reserved lookup tag: absolute path, lowercased.
pub fn filepath_tag(path: &Path) -> String {
    let abs = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf());
    format!("{TAG_FILEPATH}{}", abs.display().to_string().to_lowercase())
}

fn is_fingerprint_tag(tag: &str) -> bool {
    tag.starts_with(TAG_FILEPATH) || tag.starts_with(TAG_GIT) || tag.starts_with(TAG_MTIME)
}

fn tag_value<'a>(tags: &'a [String], prefix: &str) -> Option<&'a str> {
    tags.iter()
        .find(|t| t.starts_with(prefix))
        .map(|t| &t[prefix.len()..])
}

fn mtime_ms(path: &Path) -> Option<i64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let ms = modified
        .duration_since(std::time::UNIX_EPOCH)
        .ok()?
        .as_millis();
    Some(ms as i64)
}

/// Blob hash from the git index (`git ls-files -s`), bounded by
/// [`GIT_TIMEOUT`]. Any failure — no git, not a repository, untracked file,
/// timeout — yields `None`.
fn git_hash_object(path: &Path) -> Option<String> {
    let dir = path.parent()?;
    let name = path.file_name()?;
    let mut child = Command::new("git")
        .args(["ls-files", "-s", "--"])
        .arg(name)
        .current_dir(dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .stdin(Stdio::null())
        .spawn()
        .ok()?;

    let deadline = Instant::now() + GIT_TIMEOUT;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                if !status.success() {
                    return None;
                }
                let mut out = String::new();
                child.stdout.take()?.read_to_string(&mut out).ok()?;
                // "100644 <hash> 0\t<name>"
                return out.split_whitespace().nth(1).map(str::to_string);
            }
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return None;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(_) => return None,
        }
    }
}

fn is_manifest(name: &str) -> bool {
    matches!(name, "package.json" | "Cargo.toml" | "pyproject.toml")
}

/// Structured one-screen summary of a package manifest.
fn summarize_manifest(name: &str, raw: &str) -> String {
    if name == "package.json" {
        if let Ok(v) = serde_json::from_str::<serde_json::Value>(raw) {
            let mut parts = Vec::new();
            if let Some(n) = v.get("name").and_then(|n| n.as_str()) {
                parts.push(format!("name: {n}"));
            }
            if let Some(ver) = v.get("version").and_then(|n| n.as_str()) {
                parts.push(format!("version: {ver}"));
            }
            for key in ["scripts", "dependencies", "devDependencies"] {
                if let Some(map) = v.get(key).and_then(|m| m.as_object()) {
                    let names: Vec<&str> = map.keys().map(String::as_str).collect();
                    parts.push(format!("{key}: {}", names.join(", ")));
                }
            }
            if !parts.is_empty() {
                return truncate_chars(&parts.join("\n"), SCAN_MAX_CHUNKS * SCAN_CHUNK_CHARS);
            }
        }
        return chunk_sections(raw);
    }

    // TOML manifests: light line scan for the package header and dependency
    // names. A summary, not a parser.
    let mut parts = Vec::new();
    let mut section = String::new();
    let mut dep_names: Vec<String> = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            section = line.trim_matches(['[', ']']).to_string();
            continue;
        }
        let Some((key, value)) = line.split_once('=') else { continue };
        let key = key.trim();
        match (section.as_str(), key) {
            ("package" | "project", "name") | ("package" | "project", "version") => {
                parts.push(format!("{key}: {}", value.trim().trim_matches('"')));
            }
            (s, k) if s.ends_with("dependencies") && !k.is_empty() => {
                dep_names.push(k.to_string());
            }
            _ => {}
        }
    }
    if !dep_names.is_empty() {
        parts.push(format!("dependencies: {}", dep_names.join(", ")));
    }
    if parts.is_empty() {
        chunk_sections(raw)
    } else {
        truncate_chars(&parts.join("\n"), SCAN_MAX_CHUNKS * SCAN_CHUNK_CHARS)
    }
}

/// Split on headings or blank lines, keep the first five non-empty sections,
/// each capped at 400 chars.
fn chunk_sections(raw: &str) -> String {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    for line in raw.lines() {
        let boundary = line.trim().is_empty() || line.starts_with('#');
        if boundary && !current.trim().is_empty() {
            chunks.push(truncate_chars(current.trim(), SCAN_CHUNK_CHARS));
            current.clear();
            if chunks.len() >= SCAN_MAX_CHUNKS {
                return chunks.join("\n\n");
            }
        }
        if !line.trim().is_empty() {
            current.push_str(line);
            current.push('\n');
        }
    }
    if !current.trim().is_empty() && chunks.len() < SCAN_MAX_CHUNKS {
        chunks.push(truncate_chars(current.trim(), SCAN_CHUNK_CHARS));
    }
    chunks.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_caps_count_and_size() {
        let raw = (0..20)
            .map(|i| format!("# h{i}\n{}\n", "x".repeat(600)))
            .collect::<String>();
        let out = chunk_sections(&raw);
        let chunks: Vec<&str> = out.split("\n\n").collect();
        assert!(chunks.len() <= SCAN_MAX_CHUNKS);
        for c in chunks {
            assert!(c.chars().count() <= SCAN_CHUNK_CHARS + 1); // +1 for ellipsis
        }
    }

    #[test]
    fn package_json_summary_is_structured() {
        let raw = r#"{"name":"demo","version":"1.0.0","dependencies":{"left-pad":"^1.0.0"}}"#;
        let s = summarize_manifest("package.json", raw);
        assert!(s.contains("name: demo"));
        assert!(s.contains("left-pad"));
    }

    #[test]
    fn cargo_toml_summary_picks_deps() {
        let raw = "[package]\nname = \"demo\"\nversion = \"0.1.0\"\n\n[dependencies]\nserde = \"1\"\n";
        let s = summarize_manifest("Cargo.toml", raw);
        assert!(s.contains("name: demo"));
        assert!(s.contains("serde"));
    }

    #[test]
    fn filepath_tag_is_lowercased() {
        let tag = filepath_tag(Path::new("/TMP/Some/File.MD"));
        assert!(tag.starts_with(TAG_FILEPATH));
        assert_eq!(tag, tag.to_lowercase());
    }
}

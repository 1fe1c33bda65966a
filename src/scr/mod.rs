//! Selective context reduction: an ordered list of stateless reducers over a
//! message transcript.
//!
//! Reducers annotate messages as *pruned* — nothing is ever deleted from the
//! transcript, so the host can still render or un-prune. The per-session
//! prune map persists to disk keyed by session id. The whole pass is
//! synchronous and cooperative: no concurrency, no blocking on anything but
//! the final state write.

mod reducers;

pub use reducers::{Dedupe, PurgeErrors, SupersedeWrites, UnifiedPrune};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Grouping key for write-like effects (e.g. the file path a tool result
    /// wrote). The supersede pass keeps only the newest message per key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_key: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    /// Set by reducers; pruned messages stay in the transcript.
    #[serde(default)]
    pub pruned: bool,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            write_key: None,
            is_error: false,
            pruned: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn with_write_key(mut self, key: impl Into<String>) -> Self {
        self.write_key = Some(key.into());
        self
    }

    pub fn with_error(mut self) -> Self {
        self.is_error = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PruneReason {
    Duplicate,
    Superseded,
    Errored,
    Budget,
}

/// Per-session pipeline state: counters, the prune map, per-reducer stats.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ScrState {
    pub session_id: String,
    pub passes: u64,
    pub pruned_total: u64,
    /// Message index → why it was pruned.
    pub prune_map: BTreeMap<usize, PruneReason>,
    pub by_reducer: BTreeMap<String, u64>,
}

impl ScrState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    pub(crate) fn mark(&mut self, transcript: &mut [Message], idx: usize, reason: PruneReason) {
        if let Some(msg) = transcript.get_mut(idx) {
            if !msg.pruned {
                msg.pruned = true;
                self.prune_map.insert(idx, reason);
            }
        }
    }
}

/// One stateless reduction pass. Pure except for the state counters.
pub trait Reducer {
    fn name(&self) -> &'static str;
    /// Annotate prunable messages; return how many were newly pruned.
    fn reduce(&self, transcript: &mut [Message], state: &mut ScrState) -> usize;
}

pub struct Pipeline {
    reducers: Vec<Box<dyn Reducer>>,
    state_dir: PathBuf,
}

impl Pipeline {
    /// The standard order: deduplicate, supersede writes, purge errors, then
    /// the unified budget prune.
    pub fn standard(state_dir: impl Into<PathBuf>) -> Self {
        Self::with_reducers(
            state_dir,
            vec![
                Box::new(Dedupe),
                Box::new(SupersedeWrites),
                Box::new(PurgeErrors::default()),
                Box::new(UnifiedPrune::default()),
            ],
        )
    }

    pub fn with_reducers(state_dir: impl Into<PathBuf>, reducers: Vec<Box<dyn Reducer>>) -> Self {
        Self {
            reducers,
            state_dir: state_dir.into(),
        }
    }

    /// Run every reducer in order, update counters, persist the prune map.
    /// Returns the number of messages pruned by this pass.
    pub fn run(&self, transcript: &mut [Message], state: &mut ScrState) -> usize {
        let mut pruned = 0;
        for reducer in &self.reducers {
            let n = reducer.reduce(transcript, state);
            if n > 0 {
                tracing::debug!(reducer = reducer.name(), pruned = n, "reduction pass");
            }
            *state.by_reducer.entry(reducer.name().to_string()).or_insert(0) += n as u64;
            pruned += n;
        }
        state.passes += 1;
        state.pruned_total += pruned as u64;
        if let Err(e) = self.persist(state) {
            tracing::warn!(session = %state.session_id, error = %e, "failed to persist prune map");
        }
        pruned
    }

    pub fn state_path(&self, session_id: &str) -> PathBuf {
        let safe: String = session_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.state_dir.join(format!("scr-{safe}.json"))
    }

    fn persist(&self, state: &ScrState) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.state_dir)?;
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        std::fs::write(self.state_path(&state.session_id), json)
    }

    /// Reload a session's state, or a fresh one if nothing was persisted.
    pub fn load_state(&self, session_id: &str) -> ScrState {
        let path = self.state_path(session_id);
        load_state_file(&path).unwrap_or_else(|| ScrState::new(session_id))
    }
}

fn load_state_file(path: &Path) -> Option<ScrState> {
    let text = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&text)
        .map_err(|e| tracing::warn!(path = %path.display(), error = %e, "corrupt state file"))
        .ok()
}

/// Capability description the host injects into its system prompt so the
/// model knows pruned context can be recalled from memory.
pub const CAPABILITY_PROMPT: &str = "\
Persistent memory is available: older transcript content may be pruned for \
context space, but durable facts (decisions, preferences, file knowledge, \
past mistakes) are stored in a searchable project memory. Search it before \
re-deriving prior work.";

/// Prepend the capability description: appended to an existing leading system
/// message, otherwise inserted as a new one.
pub fn inject_capability_prompt(transcript: &mut Vec<Message>) {
    match transcript.first_mut() {
        Some(first) if first.role == Role::System => {
            if !first.content.contains(CAPABILITY_PROMPT) {
                first.content.push_str("\n\n");
                first.content.push_str(CAPABILITY_PROMPT);
            }
        }
        _ => transcript.insert(0, Message::system(CAPABILITY_PROMPT)),
    }
}

//! The standard reducers. Each is stateless: all bookkeeping lives in
//! [`ScrState`], all annotations on the messages themselves.

use super::{Message, PruneReason, Reducer, Role, ScrState};

/// Identical content from the same role: keep the newest, prune the rest.
pub struct Dedupe;

impl Reducer for Dedupe {
    fn name(&self) -> &'static str {
        "dedupe"
    }

    fn reduce(&self, transcript: &mut [Message], state: &mut ScrState) -> usize {
        let mut pruned = 0;
        // Walk backwards so the newest copy survives.
        let mut seen: Vec<(Role, String)> = Vec::new();
        for idx in (0..transcript.len()).rev() {
            let msg = &transcript[idx];
            if msg.pruned || msg.role == Role::System {
                continue;
            }
            let key = (msg.role, msg.content.trim().to_string());
            if seen.contains(&key) {
                state.mark(transcript, idx, PruneReason::Duplicate);
                pruned += 1;
            } else {
                seen.push(key);
            }
        }
        pruned
    }
}

/// Multiple write-effects to the same key (same file, same resource): only
/// the newest still matters.
pub struct SupersedeWrites;

impl Reducer for SupersedeWrites {
    fn name(&self) -> &'static str {
        "supersede-writes"
    }

    fn reduce(&self, transcript: &mut [Message], state: &mut ScrState) -> usize {
        let mut pruned = 0;
        let mut seen_keys: Vec<String> = Vec::new();
        for idx in (0..transcript.len()).rev() {
            let msg = &transcript[idx];
            if msg.pruned {
                continue;
            }
            let Some(key) = msg.write_key.clone() else { continue };
            if seen_keys.contains(&key) {
                state.mark(transcript, idx, PruneReason::Superseded);
                pruned += 1;
            } else {
                seen_keys.push(key);
            }
        }
        pruned
    }
}

/// Error tool results older than the trailing window are resolved history.
pub struct PurgeErrors {
    pub keep_recent: usize,
}

impl Default for PurgeErrors {
    fn default() -> Self {
        Self { keep_recent: 4 }
    }
}

impl Reducer for PurgeErrors {
    fn name(&self) -> &'static str {
        "purge-errors"
    }

    fn reduce(&self, transcript: &mut [Message], state: &mut ScrState) -> usize {
        let cutoff = transcript.len().saturating_sub(self.keep_recent);
        let mut pruned = 0;
        for idx in 0..cutoff {
            let msg = &transcript[idx];
            if !msg.pruned && msg.role == Role::Tool && msg.is_error {
                state.mark(transcript, idx, PruneReason::Errored);
                pruned += 1;
            }
        }
        pruned
    }
}

/// Final budget pass: prune oldest non-system messages until the live
/// transcript fits `max_chars`.
pub struct UnifiedPrune {
    pub max_chars: usize,
}

impl Default for UnifiedPrune {
    fn default() -> Self {
        Self { max_chars: 60_000 }
    }
}

impl Reducer for UnifiedPrune {
    fn name(&self) -> &'static str {
        "prune"
    }

    fn reduce(&self, transcript: &mut [Message], state: &mut ScrState) -> usize {
        let mut live: usize = transcript
            .iter()
            .filter(|m| !m.pruned)
            .map(|m| m.content.chars().count())
            .sum();
        if live <= self.max_chars {
            return 0;
        }

        let mut pruned = 0;
        for idx in 0..transcript.len() {
            if live <= self.max_chars {
                break;
            }
            let msg = &transcript[idx];
            if msg.pruned || msg.role == Role::System {
                continue;
            }
            live -= msg.content.chars().count();
            state.mark(transcript, idx, PruneReason::Budget);
            pruned += 1;
        }
        pruned
    }
}

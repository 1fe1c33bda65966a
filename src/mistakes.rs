//! Bounded-rate extraction of failure signatures from tool output.
//!
//! When the host runs a tool and it fails, the first error-shaped line (±1
//! line of context) becomes an `anti-pattern` memory — at most ten per
//! session, one per distinct signature, and never for output that is only
//! warnings.

use std::collections::HashSet;

use regex::Regex;

use crate::db::{Memory, MemoryInput, MemoryStore};
use crate::error::MemoryError;
use crate::util::truncate_chars;

pub const MAX_MISTAKES_PER_SESSION: usize = 10;
const CONTEXT_MAX_CHARS: usize = 300;

/// Error-shaped lines worth remembering: test failures, compile/type errors,
/// missing commands and permissions, git conflicts, dependency resolution.
const ERROR_PATTERNS: &[&str] = &[
    r"(?i)\btests? (failed|failing)\b",
    r"(?i)\bassert(ion)?\s*(failed|error)",
    r"(?i)^(FAIL|FAILED)\b",
    r"error\[E\d+\]",
    r"(?i)\b(syntax|type|compile|compilation) error\b",
    r"(?i)cannot find (symbol|name|module|crate|type)",
    r"(?i)undefined (reference|symbol|variable|function)",
    r"(?i)command not found",
    r"(?i)permission denied",
    r"\b(EACCES|EPERM)\b",
    r"(?i)merge conflict",
    r"^CONFLICT \(",
    r"(?i)unresolved (import|dependency)",
    r"(?i)no matching version",
    r"(?i)module not found",
    r"(?i)panicked at",
];

/// Lines that look alarming but aren't failures.
const FALSE_POSITIVE_PATTERNS: &[&str] = &[
    r"(?i)\bwarning\b",
    r"(?i)deprecat(ed|ion|ing)",
    r"(?i)^\s*note:",
];

/// Compiled pattern tables. Tests inject their own catalog instead of
/// reaching into tracker internals.
pub struct PatternCatalog {
    errors: Vec<Regex>,
    false_positives: Vec<Regex>,
}

impl PatternCatalog {
    pub fn standard() -> Self {
        Self::new(ERROR_PATTERNS, FALSE_POSITIVE_PATTERNS)
    }

    pub fn new(errors: &[&str], false_positives: &[&str]) -> Self {
        let compile = |patterns: &[&str]| {
            patterns
                .iter()
                .filter_map(|p| {
                    Regex::new(p)
                        .map_err(|e| tracing::error!(pattern = p, error = %e, "bad pattern"))
                        .ok()
                })
                .collect()
        };
        Self {
            errors: compile(errors),
            false_positives: compile(false_positives),
        }
    }

    fn is_error_line(&self, line: &str) -> bool {
        self.errors.iter().any(|r| r.is_match(line))
    }

    fn is_warning_line(&self, line: &str) -> bool {
        self.false_positives.iter().any(|r| r.is_match(line))
    }
}

impl Default for PatternCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

/// Per-session extractor with a hard storage cap and signature dedup.
pub struct MistakeTracker {
    catalog: PatternCatalog,
    session_id: Option<String>,
    stored: usize,
    seen: HashSet<String>,
}

impl MistakeTracker {
    pub fn new(session_id: Option<String>) -> Self {
        Self::with_catalog(PatternCatalog::standard(), session_id)
    }

    pub fn with_catalog(catalog: PatternCatalog, session_id: Option<String>) -> Self {
        Self {
            catalog,
            session_id,
            stored: 0,
            seen: HashSet::new(),
        }
    }

    pub fn stored(&self) -> usize {
        self.stored
    }

    /// Inspect one tool's output. Stores and returns an anti-pattern memory
    /// for the first genuine error signature, or `None` when the output is
    /// clean, warning-only, already seen this session, or over the cap.
    pub fn extract(
        &mut self,
        store: &MemoryStore,
        tool: &str,
        output: &str,
        project_id: Option<&str>,
    ) -> Result<Option<Memory>, MemoryError> {
        if self.stored >= MAX_MISTAKES_PER_SESSION {
            return Ok(None);
        }

        let lines: Vec<&str> = output.lines().collect();
        // The signature line: first error match that is not itself inside
        // warning text. Warning-only output stores nothing.
        let hit = lines
            .iter()
            .enumerate()
            .find(|(_, l)| self.catalog.is_error_line(l) && !self.catalog.is_warning_line(l));
        let Some((idx, line)) = hit else {
            return Ok(None);
        };

        let signature = line.trim().to_string();
        if !self.seen.insert(signature) {
            return Ok(None);
        }

        let start = idx.saturating_sub(1);
        let end = (idx + 1).min(lines.len() - 1);
        let context = truncate_chars(lines[start..=end].join("\n").trim(), CONTEXT_MAX_CHARS);

        let tool_tag = tool.trim().to_lowercase();
        let mut input = MemoryInput::new(format!("Mistake while running {tool}: {context}"))
            .category("anti-pattern")
            .tags(vec!["anti-pattern".into(), "mistake".into(), tool_tag])
            .source(format!("mistake-tracking: {tool}"));
        input.session_id = self.session_id.clone();
        input.project_id = project_id.map(str::to_string);

        let memory = store.insert(input)?;
        self.stored += 1;
        tracing::debug!(tool, stored = self.stored, "mistake captured");
        Ok(Some(memory))
    }
}

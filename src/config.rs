//! Engine configuration.
//!
//! Keys arrive as camelCase JSON from the host. Invalid values never fail the
//! load: they are ignored in favor of the defaults (a host with a typo in its
//! settings file still gets a working memory store).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Environment variable overriding the user data directory for the default
/// database path.
pub const DATA_DIR_ENV: &str = "RECOLLECT_DATA_DIR";

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

pub const DEFAULT_CATEGORIES: &[&str] = &[
    "decision",
    "pattern",
    "debugging",
    "preference",
    "convention",
    "discovery",
    "anti-pattern",
    "general",
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub db_path: PathBuf,
    pub categories: Vec<String>,
    /// 0 = unlimited.
    pub max_memories: u64,
    pub auto_recall: bool,
    pub auto_extract: bool,
    pub search_limit: usize,
    pub global_memories: bool,
    pub agent_model: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            categories: DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect(),
            max_memories: 0,
            auto_recall: true,
            auto_extract: true,
            search_limit: DEFAULT_SEARCH_LIMIT,
            global_memories: true,
            agent_model: None,
        }
    }
}

/// Raw deserialization target: every field optional, numbers left wide so a
/// negative `searchLimit` deserializes instead of erroring.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawConfig {
    db_path: Option<PathBuf>,
    categories: Option<Vec<String>>,
    max_memories: Option<i64>,
    auto_recall: Option<bool>,
    auto_extract: Option<bool>,
    search_limit: Option<i64>,
    global_memories: Option<bool>,
    agent_model: Option<String>,
}

impl Config {
    /// Parse a JSON config document, sanitizing field by field.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let raw: RawConfig = serde_json::from_value(value.clone()).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "config not an object, using defaults");
            RawConfig::default()
        });
        Self::from_raw(raw)
    }

    pub fn from_json(text: &str) -> Self {
        let raw: RawConfig = serde_json::from_str(text).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "config unparseable, using defaults");
            RawConfig::default()
        });
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Self {
        let mut cfg = Self::default();
        if let Some(p) = raw.db_path {
            cfg.db_path = p;
        }
        if let Some(cats) = raw.categories {
            let cats: Vec<String> = cats
                .into_iter()
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .collect();
            if cats.is_empty() {
                tracing::warn!("categories list empty, keeping defaults");
            } else {
                cfg.categories = cats;
            }
        }
        if let Some(max) = raw.max_memories {
            if max >= 0 {
                cfg.max_memories = max as u64;
            } else {
                tracing::warn!(max, "negative maxMemories ignored");
            }
        }
        if let Some(v) = raw.auto_recall {
            cfg.auto_recall = v;
        }
        if let Some(v) = raw.auto_extract {
            cfg.auto_extract = v;
        }
        if let Some(limit) = raw.search_limit {
            if limit > 0 {
                cfg.search_limit = limit as usize;
            } else {
                tracing::warn!(limit, "non-positive searchLimit ignored, keeping default");
            }
        }
        if let Some(v) = raw.global_memories {
            cfg.global_memories = v;
        }
        cfg.agent_model = raw.agent_model;
        cfg
    }

    pub fn knows_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }
}

/// Default database location: `<user data dir>/recollect/memory.db`, with the
/// data dir overridable through `RECOLLECT_DATA_DIR`.
pub fn default_db_path() -> PathBuf {
    let base = std::env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .or_else(dirs::data_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("recollect").join("memory.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_search_limit_keeps_default() {
        let cfg = Config::from_json(r#"{"searchLimit": -5}"#);
        assert_eq!(cfg.search_limit, DEFAULT_SEARCH_LIMIT);
        let cfg = Config::from_json(r#"{"searchLimit": 0}"#);
        assert_eq!(cfg.search_limit, DEFAULT_SEARCH_LIMIT);
        let cfg = Config::from_json(r#"{"searchLimit": 25}"#);
        assert_eq!(cfg.search_limit, 25);
    }

    #[test]
    fn empty_categories_keep_defaults() {
        let cfg = Config::from_json(r#"{"categories": []}"#);
        assert_eq!(cfg.categories.len(), DEFAULT_CATEGORIES.len());
        let cfg = Config::from_json(r#"{"categories": ["Infra", "  "]}"#);
        assert_eq!(cfg.categories, vec!["infra"]);
    }

    #[test]
    fn negative_cap_ignored() {
        let cfg = Config::from_json(r#"{"maxMemories": -3}"#);
        assert_eq!(cfg.max_memories, 0);
        let cfg = Config::from_json(r#"{"maxMemories": 500}"#);
        assert_eq!(cfg.max_memories, 500);
    }

    #[test]
    fn garbage_config_is_all_defaults() {
        let cfg = Config::from_json("not json at all");
        assert_eq!(cfg.search_limit, DEFAULT_SEARCH_LIMIT);
        assert!(cfg.auto_recall);
    }
}

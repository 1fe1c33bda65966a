//! recollect — persistent memory engine for AI coding agents.
//!
//! Thin host shim: reads `{"tool": "...", "args": {...}}` requests line by
//! line on stdin and answers each with one JSON-encoded result line. All
//! engine behavior lives in the library.

use std::io::{BufRead, Write};

use clap::Parser;
use recollect::{config::Config, filecache::FileCache, tools, StoreContext};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recollect", version, about = "Per-project persistent memory for AI coding agents")]
struct Args {
    /// SQLite database path (default: user data dir)
    #[arg(short, long, env = "RECOLLECT_DB")]
    db: Option<std::path::PathBuf>,

    /// JSON configuration file
    #[arg(short, long, env = "RECOLLECT_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Project id attached to the startup scan
    #[arg(short, long, env = "RECOLLECT_PROJECT")]
    project: Option<String>,

    /// Directory scanned for project metadata files at startup
    #[arg(long)]
    scan_dir: Option<std::path::PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => Config::from_json(&text),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
                Config::default()
            }
        },
        None => Config::default(),
    };
    if let Some(db) = args.db {
        config.db_path = db;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        db = %config.db_path.display(),
        "recollect starting"
    );

    let ctx = StoreContext::new(config);

    if ctx.config().auto_recall {
        if let Some(ref dir) = args.scan_dir {
            match ctx.store() {
                Ok(store) => {
                    let cached = FileCache::new().scan_on_startup(&store, dir, args.project.as_deref());
                    info!(cached, dir = %dir.display(), "startup scan complete");
                }
                Err(e) => tracing::warn!(error = %e, "startup scan skipped"),
            }
        }
    }

    // Opportunistic weekly maintenance; blocks this startup only when due.
    if let Ok(store) = ctx.store() {
        let report = store.maybe_run_maintenance(ctx.config().max_memories);
        if !report.skipped {
            info!(evicted = report.evicted, size = report.db_size_bytes, "maintenance ran");
        }
    }

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<serde_json::Value>(&line) {
            Ok(req) => {
                let tool = req.get("tool").and_then(|t| t.as_str()).unwrap_or_default();
                let args = req.get("args").cloned().unwrap_or(serde_json::json!({}));
                tools::dispatch(&ctx, tool, &args)
            }
            Err(e) => format!("Error: bad request: {e}"),
        };
        let mut out = stdout.lock();
        let _ = serde_json::to_writer(&mut out, &serde_json::json!({ "result": response }));
        let _ = out.write_all(b"\n");
        let _ = out.flush();
    }

    ctx.close();
    info!("shutting down");
}

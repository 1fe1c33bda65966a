//! Versioned forward migrations for the memory schema.
//!
//! Each migration runs inside its own transaction: commit on success,
//! rollback and abort the open on any error. The `_migrations` table records
//! what has been applied. Downgrades are an operator action ([`revert_last`]),
//! never automatic.

use rusqlite::{params, Connection};

use crate::error::MemoryError;

pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub up: &'static str,
    pub down: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "memory table, FTS index with sync triggers, provenance indexes",
        up: "
        CREATE TABLE memory (
            id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            category TEXT NOT NULL DEFAULT 'general',
            session_id TEXT,
            project_id TEXT,
            source TEXT,
            time_created INTEGER NOT NULL,
            time_updated INTEGER NOT NULL
        );

        CREATE VIRTUAL TABLE memory_fts USING fts5(
            content, category, source,
            content='memory', content_rowid='rowid',
            tokenize='porter unicode61'
        );

        CREATE TRIGGER memory_fts_ai AFTER INSERT ON memory BEGIN
            INSERT INTO memory_fts(rowid, content, category, source)
            VALUES (new.rowid, new.content, new.category, new.source);
        END;
        CREATE TRIGGER memory_fts_ad AFTER DELETE ON memory BEGIN
            INSERT INTO memory_fts(memory_fts, rowid, content, category, source)
            VALUES ('delete', old.rowid, old.content, old.category, old.source);
        END;
        CREATE TRIGGER memory_fts_au AFTER UPDATE ON memory BEGIN
            INSERT INTO memory_fts(memory_fts, rowid, content, category, source)
            VALUES ('delete', old.rowid, old.content, old.category, old.source);
            INSERT INTO memory_fts(rowid, content, category, source)
            VALUES (new.rowid, new.content, new.category, new.source);
        END;

        CREATE INDEX idx_memory_session ON memory(session_id);
        CREATE INDEX idx_memory_category ON memory(category);
        CREATE INDEX idx_memory_project ON memory(project_id);
        ",
        down: "
        DROP TRIGGER memory_fts_au;
        DROP TRIGGER memory_fts_ad;
        DROP TRIGGER memory_fts_ai;
        DROP TABLE memory_fts;
        DROP TABLE memory;
        ",
    },
    Migration {
        version: 2,
        description: "memory_tags with cascade delete",
        up: "
        CREATE TABLE memory_tags (
            memory_id TEXT NOT NULL REFERENCES memory(id) ON DELETE CASCADE,
            tag TEXT NOT NULL,
            PRIMARY KEY (memory_id, tag)
        );
        CREATE INDEX idx_memory_tags_tag ON memory_tags(tag);
        ",
        down: "DROP TABLE memory_tags;",
    },
    Migration {
        version: 3,
        description: "access tracking columns",
        up: "
        ALTER TABLE memory ADD COLUMN access_count INTEGER NOT NULL DEFAULT 0;
        ALTER TABLE memory ADD COLUMN time_last_accessed INTEGER;
        ",
        down: "
        ALTER TABLE memory DROP COLUMN time_last_accessed;
        ALTER TABLE memory DROP COLUMN access_count;
        ",
    },
    Migration {
        version: 4,
        description: "typed links between memories",
        up: "
        CREATE TABLE memory_links (
            source_id TEXT NOT NULL REFERENCES memory(id) ON DELETE CASCADE,
            target_id TEXT NOT NULL REFERENCES memory(id) ON DELETE CASCADE,
            relationship TEXT NOT NULL
                CHECK (relationship IN ('related', 'supersedes', 'contradicts', 'extends')),
            time_created INTEGER NOT NULL,
            PRIMARY KEY (source_id, target_id)
        );
        CREATE INDEX idx_memory_links_target ON memory_links(target_id);
        CREATE INDEX idx_memory_links_rel ON memory_links(relationship);
        ",
        down: "DROP TABLE memory_links;",
    },
    Migration {
        version: 5,
        description: "metadata key-value table",
        up: "
        CREATE TABLE metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
        down: "DROP TABLE metadata;",
    },
    Migration {
        version: 6,
        description: "query-path indexes: (project_id, category), time_created, access_count",
        up: "
        CREATE INDEX idx_memory_project_category ON memory(project_id, category);
        CREATE INDEX idx_memory_time_created ON memory(time_created);
        CREATE INDEX idx_memory_access_count ON memory(access_count);
        ",
        down: "
        DROP INDEX idx_memory_access_count;
        DROP INDEX idx_memory_time_created;
        DROP INDEX idx_memory_project_category;
        ",
    },
];

const MIGRATIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    applied_at INTEGER NOT NULL
);
";

pub fn applied_version(conn: &Connection) -> Result<i64, MemoryError> {
    conn.execute_batch(MIGRATIONS_TABLE)?;
    let v: i64 = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |r| {
        r.get(0)
    })?;
    Ok(v)
}

/// Apply every pending migration, each in its own transaction.
pub fn apply_pending(conn: &mut Connection) -> Result<(), MemoryError> {
    let current = applied_version(conn)?;
    for m in MIGRATIONS.iter().filter(|m| m.version > current) {
        let tx = conn.transaction()?;
        let applied = tx
            .execute_batch(m.up)
            .and_then(|()| {
                tx.execute(
                    "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
                    params![m.version, m.description, crate::db::now_secs()],
                )
            });
        match applied {
            Ok(_) => {
                tx.commit()?;
                tracing::info!(version = m.version, desc = m.description, "migration applied");
            }
            Err(e) => {
                drop(tx); // rollback
                return Err(MemoryError::Migration {
                    version: m.version,
                    message: e.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Operator-only downgrade of the most recent migration. Never called by the
/// engine itself; schema downgrades are a deliberate manual step.
pub fn revert_last(conn: &mut Connection) -> Result<Option<i64>, MemoryError> {
    let current = applied_version(conn)?;
    let Some(m) = MIGRATIONS.iter().find(|m| m.version == current) else {
        return Ok(None);
    };
    let tx = conn.transaction()?;
    let reverted = tx
        .execute_batch(m.down)
        .and_then(|()| tx.execute("DELETE FROM _migrations WHERE version = ?1", params![m.version]));
    match reverted {
        Ok(_) => {
            tx.commit()?;
            tracing::warn!(version = m.version, "migration reverted");
            Ok(Some(m.version))
        }
        Err(e) => {
            drop(tx);
            Err(MemoryError::Migration {
                version: m.version,
                message: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_are_dense_and_ordered() {
        for (i, m) in MIGRATIONS.iter().enumerate() {
            assert_eq!(m.version, i as i64 + 1);
            assert!(!m.description.is_empty());
        }
    }

    #[test]
    fn apply_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_pending(&mut conn).unwrap();
        apply_pending(&mut conn).unwrap();
        assert_eq!(applied_version(&conn).unwrap(), MIGRATIONS.len() as i64);
    }

    #[test]
    fn revert_then_reapply() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_pending(&mut conn).unwrap();
        let v = revert_last(&mut conn).unwrap();
        assert_eq!(v, Some(MIGRATIONS.len() as i64));
        assert_eq!(applied_version(&conn).unwrap(), MIGRATIONS.len() as i64 - 1);
        apply_pending(&mut conn).unwrap();
        assert_eq!(applied_version(&conn).unwrap(), MIGRATIONS.len() as i64);
    }
}

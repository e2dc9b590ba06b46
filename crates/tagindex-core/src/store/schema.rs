//! SQLite schema DDL and migration framework.
//!
//! Three tables hold the index: `artifacts` (one header row per
//! path/fingerprint), `snippets` (the extracted units, cascading from their
//! header) and `artifact_scope_links` (which scopes can see an artifact).

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::errors::IndexResult;

/// Current schema version. Migrations run from whatever the DB currently
/// reports up to this value.
pub const SCHEMA_VERSION: i32 = 1;

/// Core DDL statements: 5 CREATE TABLE + 3 CREATE INDEX.
///
/// Executed with `CREATE … IF NOT EXISTS` so they are safe to replay on an
/// already-initialised database.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    // ── tables (5) ──────────────────────────────────────────────────────
    "CREATE TABLE IF NOT EXISTS index_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );",
    "CREATE TABLE IF NOT EXISTS migration_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_version INTEGER NOT NULL,
        to_version INTEGER NOT NULL,
        status TEXT NOT NULL,
        error_message TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS artifacts (
        path TEXT NOT NULL,
        fingerprint TEXT NOT NULL,
        snippet_count INTEGER NOT NULL DEFAULT 0,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY(path, fingerprint)
    );",
    "CREATE TABLE IF NOT EXISTS snippets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        path TEXT NOT NULL,
        fingerprint TEXT NOT NULL,
        title TEXT NOT NULL,
        body TEXT NOT NULL,
        signature TEXT NOT NULL,
        start_line INTEGER NOT NULL,
        end_line INTEGER NOT NULL,
        FOREIGN KEY(path, fingerprint)
            REFERENCES artifacts(path, fingerprint) ON DELETE CASCADE
    );",
    "CREATE TABLE IF NOT EXISTS artifact_scope_links (
        path TEXT NOT NULL,
        fingerprint TEXT NOT NULL,
        scope_directory TEXT NOT NULL,
        scope_branch TEXT NOT NULL,
        scope_artifact_id TEXT NOT NULL,
        PRIMARY KEY(path, fingerprint, scope_directory, scope_branch, scope_artifact_id),
        FOREIGN KEY(path, fingerprint) REFERENCES artifacts(path, fingerprint)
    );",
    // ── indexes (3) ─────────────────────────────────────────────────────
    "CREATE INDEX IF NOT EXISTS idx_snippets_artifact ON snippets(path, fingerprint);",
    "CREATE INDEX IF NOT EXISTS idx_artifacts_fingerprint ON artifacts(fingerprint);",
    "CREATE INDEX IF NOT EXISTS idx_links_scope \
     ON artifact_scope_links(scope_directory, scope_branch, scope_artifact_id);",
];

/// Create every table and index, then run pending migrations.
pub fn create_schema(conn: &Connection) -> IndexResult<()> {
    for stmt in SCHEMA_STATEMENTS {
        conn.execute_batch(stmt)?;
    }
    migrate_schema(conn)
}

// ─── Migration framework ────────────────────────────────────────────────────

/// Run all pending migrations from the current stored version up to
/// [`SCHEMA_VERSION`].  Each step is wrapped in a SAVEPOINT so a failure
/// rolls back only that single step.
pub fn migrate_schema(conn: &Connection) -> IndexResult<()> {
    let mut current_version = get_schema_version(conn);

    while current_version < SCHEMA_VERSION {
        let next_version = current_version + 1;
        conn.execute_batch("SAVEPOINT tagindex_migrate_step;")?;

        let step_result = (|| -> IndexResult<()> {
            match next_version {
                1 => migrate_to_v1(conn)?,
                _ => {}
            }
            set_schema_version(conn, next_version)?;
            record_migration_step(conn, current_version, next_version, "success", None)?;
            conn.execute_batch("RELEASE SAVEPOINT tagindex_migrate_step;")?;
            Ok(())
        })();

        match step_result {
            Ok(()) => {
                debug!(from = current_version, to = next_version, "schema migrated");
                current_version = next_version;
            }
            Err(e) => {
                warn!(
                    from = current_version,
                    to = next_version,
                    error = %e,
                    "schema migration failed"
                );
                let _ = conn.execute_batch("ROLLBACK TO SAVEPOINT tagindex_migrate_step;");
                let _ = conn.execute_batch("RELEASE SAVEPOINT tagindex_migrate_step;");
                let _ = record_migration_step(
                    conn,
                    current_version,
                    next_version,
                    "failed",
                    Some(&e.to_string()),
                );
                return Err(e);
            }
        }
    }

    Ok(())
}

/// Read the current schema version from `index_meta`.
/// Returns 0 when the key is absent or unparseable.
pub fn get_schema_version(conn: &Connection) -> i32 {
    let result: Result<String, _> = conn.query_row(
        "SELECT value FROM index_meta WHERE key = 'schema_version';",
        [],
        |row| row.get(0),
    );
    match result {
        Ok(v) => v.parse::<i32>().unwrap_or(0),
        Err(_) => 0,
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> IndexResult<()> {
    conn.execute(
        "INSERT INTO index_meta(key, value) \
         VALUES('schema_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        rusqlite::params![version.to_string()],
    )?;
    Ok(())
}

fn record_migration_step(
    conn: &Connection,
    from_v: i32,
    to_v: i32,
    status: &str,
    error_msg: Option<&str>,
) -> IndexResult<()> {
    conn.execute(
        "INSERT INTO migration_history(from_version, to_version, status, error_message) \
         VALUES (?1, ?2, ?3, ?4);",
        rusqlite::params![from_v, to_v, status, error_msg],
    )?;
    Ok(())
}

// ─── Individual migration steps ─────────────────────────────────────────────

/// v0 -> v1: baseline. The tables come from [`SCHEMA_STATEMENTS`].
fn migrate_to_v1(_conn: &Connection) -> IndexResult<()> {
    Ok(())
}

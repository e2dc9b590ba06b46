//! SQLite content store for the snippet index.
//!
//! One connection per store, guarded by a mutex so that transactions on
//! the same store never interleave. Separate stores over the same file are
//! serialized by SQLite itself (`BEGIN IMMEDIATE` plus a busy timeout).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, warn};

use crate::config::IndexConfig;
use crate::errors::{IndexError, IndexResult};
use crate::models::{PathAndFingerprint, Scope, Snippet, SnippetRecord, StoreStats};
use crate::store::schema;

const SNIPPET_COLUMNS: &str =
    "s.id, s.path, s.fingerprint, s.title, s.body, s.signature, s.start_line, s.end_line";

fn snippet_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SnippetRecord> {
    Ok(SnippetRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        fingerprint: row.get(2)?,
        title: row.get(3)?,
        body: row.get(4)?,
        signature: row.get(5)?,
        start_line: row.get(6)?,
        end_line: row.get(7)?,
    })
}

/// `(l.scope_directory = ? AND ...) OR (...)` for `scopes.len()` scopes,
/// with the matching flat parameter list.
fn scope_filter(scopes: &[Scope]) -> (String, Vec<String>) {
    let clause = vec![
        "(l.scope_directory = ? AND l.scope_branch = ? AND l.scope_artifact_id = ?)";
        scopes.len()
    ]
    .join(" OR ");
    let values = scopes
        .iter()
        .flat_map(|s| [s.directory.clone(), s.branch.clone(), s.artifact_id.clone()])
        .collect();
    (clause, values)
}

// ---------------------------------------------------------------------------
// Transaction handle
// ---------------------------------------------------------------------------

/// What a guarded artifact delete did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Header and snippets removed.
    Deleted { snippets: usize },
    /// Other scopes still link the artifact; rows kept.
    Retained { live_links: i64 },
}

/// Mutating operations, only reachable inside [`SnippetStore::transaction`].
pub struct StoreTx<'a> {
    conn: &'a Connection,
}

impl StoreTx<'_> {
    pub fn has_artifact(&self, key: &PathAndFingerprint) -> IndexResult<bool> {
        has_artifact(self.conn, key)
    }

    /// Insert the header and snippets for `key`. A no-op when the header
    /// already exists; returns whether anything was written.
    pub fn put_artifact(
        &self,
        key: &PathAndFingerprint,
        snippets: &[Snippet],
    ) -> IndexResult<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO artifacts(path, fingerprint, snippet_count) \
             VALUES (?1, ?2, ?3);",
            params![key.path, key.fingerprint, snippets.len() as i64],
        )?;
        if inserted == 0 {
            return Ok(false);
        }
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO snippets(path, fingerprint, title, body, signature, start_line, end_line) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        )?;
        for snippet in snippets {
            stmt.execute(params![
                key.path,
                key.fingerprint,
                snippet.title,
                snippet.body,
                snippet.signature,
                snippet.start_line,
                snippet.end_line
            ])?;
        }
        Ok(true)
    }

    /// Link an existing artifact to `scope`. Fails with
    /// [`IndexError::Integrity`] when the artifact is missing.
    pub fn add_association(&self, key: &PathAndFingerprint, scope: &Scope) -> IndexResult<()> {
        if !self.has_artifact(key)? {
            return Err(IndexError::integrity(
                key,
                format!("no artifact to tag with {scope}"),
            ));
        }
        self.conn.execute(
            "INSERT OR IGNORE INTO artifact_scope_links \
             (path, fingerprint, scope_directory, scope_branch, scope_artifact_id) \
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                key.path,
                key.fingerprint,
                scope.directory,
                scope.branch,
                scope.artifact_id
            ],
        )?;
        Ok(())
    }

    /// Unlink `scope`; returns whether a link existed.
    pub fn remove_association(&self, key: &PathAndFingerprint, scope: &Scope) -> IndexResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM artifact_scope_links \
             WHERE path = ?1 AND fingerprint = ?2 \
               AND scope_directory = ?3 AND scope_branch = ?4 AND scope_artifact_id = ?5;",
            params![
                key.path,
                key.fingerprint,
                scope.directory,
                scope.branch,
                scope.artifact_id
            ],
        )?;
        Ok(removed > 0)
    }

    pub fn live_links(&self, key: &PathAndFingerprint) -> IndexResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM artifact_scope_links WHERE path = ?1 AND fingerprint = ?2;",
            params![key.path, key.fingerprint],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Remove the header and all snippets for `key` unless another scope
    /// still links it. A missing artifact is an integrity violation.
    pub fn delete_artifact(&self, key: &PathAndFingerprint) -> IndexResult<DeleteOutcome> {
        let live_links = self.live_links(key)?;
        if live_links > 0 {
            return Ok(DeleteOutcome::Retained { live_links });
        }
        let snippets = self.conn.execute(
            "DELETE FROM snippets WHERE path = ?1 AND fingerprint = ?2;",
            params![key.path, key.fingerprint],
        )?;
        let headers = self.conn.execute(
            "DELETE FROM artifacts WHERE path = ?1 AND fingerprint = ?2;",
            params![key.path, key.fingerprint],
        )?;
        if headers == 0 {
            return Err(IndexError::integrity(key, "no artifact to delete"));
        }
        Ok(DeleteOutcome::Deleted { snippets })
    }
}

fn has_artifact(conn: &Connection, key: &PathAndFingerprint) -> IndexResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM artifacts WHERE path = ?1 AND fingerprint = ?2 LIMIT 1;",
            params![key.path, key.fingerprint],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

// ---------------------------------------------------------------------------
// SnippetStore
// ---------------------------------------------------------------------------

/// Durable store of artifacts, snippets and scope links.
pub struct SnippetStore {
    db_path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl SnippetStore {
    /// Open the store configured by `config`, creating parent directories
    /// and the schema as needed.
    pub fn open(config: &IndexConfig) -> IndexResult<Self> {
        Self::open_path(
            &config.db_path,
            Duration::from_millis(config.busy_timeout_ms),
        )
    }

    pub fn open_path(db_path: &Path, busy_timeout: Duration) -> IndexResult<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        let store = Self {
            db_path: Some(db_path.to_path_buf()),
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    /// A private in-memory store, mostly for tests and benchmarks.
    pub fn open_in_memory() -> IndexResult<Self> {
        let store = Self {
            db_path: None,
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init()?;
        Ok(store)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Enable foreign keys and create tables if absent. Safe to call on
    /// every process start.
    pub fn init(&self) -> IndexResult<()> {
        let conn = self.conn.lock();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::create_schema(&conn)
    }

    /// Remove every artifact, snippet and link.
    pub fn clear(&self) -> IndexResult<()> {
        self.transaction(|tx| {
            tx.conn.execute_batch(
                "DELETE FROM artifact_scope_links;
                 DELETE FROM snippets;
                 DELETE FROM artifacts;",
            )?;
            Ok(())
        })
    }

    /// Run `f` against the raw connection, outside any transaction.
    pub fn with_connection<R>(
        &self,
        f: impl FnOnce(&Connection) -> IndexResult<R>,
    ) -> IndexResult<R> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run `f` inside one immediate transaction. Commits when `f` returns
    /// `Ok`; any error (or a panic unwinding through here) rolls back, and
    /// the connection lock is released on every path.
    pub fn transaction<R>(
        &self,
        f: impl FnOnce(&StoreTx<'_>) -> IndexResult<R>,
    ) -> IndexResult<R> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&StoreTx { conn: &tx })?;
        tx.commit()?;
        Ok(value)
    }

    // -- single-operation wrappers ------------------------------------------

    pub fn put_artifact(&self, key: &PathAndFingerprint, snippets: &[Snippet]) -> IndexResult<()> {
        self.transaction(|tx| tx.put_artifact(key, snippets).map(|_| ()))
    }

    pub fn add_association(&self, key: &PathAndFingerprint, scope: &Scope) -> IndexResult<()> {
        self.transaction(|tx| tx.add_association(key, scope))
    }

    pub fn remove_association(&self, key: &PathAndFingerprint, scope: &Scope) -> IndexResult<()> {
        self.transaction(|tx| tx.remove_association(key, scope).map(|_| ()))
    }

    pub fn delete_artifact(&self, key: &PathAndFingerprint) -> IndexResult<DeleteOutcome> {
        let outcome = self.transaction(|tx| tx.delete_artifact(key))?;
        if let DeleteOutcome::Retained { live_links } = outcome {
            warn!(entry = %key, live_links, "artifact still linked, not deleted");
        }
        Ok(outcome)
    }

    // -- reads --------------------------------------------------------------

    pub fn has_artifact(&self, key: &PathAndFingerprint) -> IndexResult<bool> {
        let conn = self.conn.lock();
        has_artifact(&conn, key)
    }

    /// The subset of `keys` that already have an artifact header.
    pub fn existing_artifacts(
        &self,
        keys: &[PathAndFingerprint],
    ) -> IndexResult<HashSet<PathAndFingerprint>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT 1 FROM artifacts WHERE path = ?1 AND fingerprint = ?2 LIMIT 1;",
        )?;
        let mut found = HashSet::new();
        for key in keys {
            if stmt.exists(params![key.path, key.fingerprint])? {
                found.insert(key.clone());
            }
        }
        debug!(requested = keys.len(), found = found.len(), "artifact lookup");
        Ok(found)
    }

    /// Snippets visible in `scope`.
    pub fn list_artifacts(&self, scope: &Scope) -> IndexResult<Vec<SnippetRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SNIPPET_COLUMNS} FROM snippets s \
             JOIN artifact_scope_links l \
               ON l.path = s.path AND l.fingerprint = s.fingerprint \
             WHERE l.scope_directory = ?1 AND l.scope_branch = ?2 AND l.scope_artifact_id = ?3 \
             ORDER BY s.id;"
        ))?;
        let rows = stmt
            .query_map(
                params![scope.directory, scope.branch, scope.artifact_id],
                snippet_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Keys linked to `scope`.
    pub fn list_associations(&self, scope: &Scope) -> IndexResult<Vec<PathAndFingerprint>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT path, fingerprint FROM artifact_scope_links \
             WHERE scope_directory = ?1 AND scope_branch = ?2 AND scope_artifact_id = ?3 \
             ORDER BY path, fingerprint;",
        )?;
        let rows = stmt
            .query_map(
                params![scope.directory, scope.branch, scope.artifact_id],
                |row| {
                    Ok(PathAndFingerprint::new(
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                    ))
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// All snippet rows for one artifact, regardless of scope.
    pub fn snippets_for(&self, key: &PathAndFingerprint) -> IndexResult<Vec<SnippetRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SNIPPET_COLUMNS} FROM snippets s \
             WHERE s.path = ?1 AND s.fingerprint = ?2 ORDER BY s.id;"
        ))?;
        let rows = stmt
            .query_map(params![key.path, key.fingerprint], snippet_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_snippet(&self, id: i64) -> IndexResult<Option<SnippetRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                &format!("SELECT {SNIPPET_COLUMNS} FROM snippets s WHERE s.id = ?1;"),
                params![id],
                snippet_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// One page of snippets visible in any of `scopes`, ordered by id.
    pub fn list_snippets_page(
        &self,
        scopes: &[Scope],
        offset: usize,
        limit: usize,
    ) -> IndexResult<Vec<SnippetRecord>> {
        if scopes.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let (filter, mut values) = scope_filter(scopes);
        values.push(limit.to_string());
        values.push(offset.to_string());
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SNIPPET_COLUMNS} FROM snippets s \
             WHERE EXISTS ( \
                 SELECT 1 FROM artifact_scope_links l \
                 WHERE l.path = s.path AND l.fingerprint = s.fingerprint AND ({filter}) \
             ) \
             ORDER BY s.id LIMIT CAST(? AS INTEGER) OFFSET CAST(? AS INTEGER);"
        ))?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), snippet_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Path -> snippet labels for everything visible in `scopes`, paths in
    /// first-seen order, labels de-duplicated.
    pub fn paths_and_signatures(
        &self,
        scopes: &[Scope],
    ) -> IndexResult<IndexMap<String, Vec<String>>> {
        let mut grouped: IndexMap<String, Vec<String>> = IndexMap::new();
        if scopes.is_empty() {
            return Ok(grouped);
        }
        let (filter, values) = scope_filter(scopes);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SNIPPET_COLUMNS} FROM snippets s \
             WHERE EXISTS ( \
                 SELECT 1 FROM artifact_scope_links l \
                 WHERE l.path = s.path AND l.fingerprint = s.fingerprint AND ({filter}) \
             ) \
             ORDER BY s.path, s.start_line, s.id;"
        ))?;
        let rows = stmt.query_map(params_from_iter(values.iter()), snippet_from_row)?;
        for row in rows {
            let record = row?;
            let label = record.label();
            let labels = grouped.entry(record.path).or_default();
            if !label.is_empty() && !labels.contains(&label) {
                labels.push(label);
            }
        }
        Ok(grouped)
    }

    pub fn stats(&self) -> IndexResult<StoreStats> {
        let conn = self.conn.lock();
        let count =
            |sql: &str| -> IndexResult<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };
        Ok(StoreStats {
            artifacts: count("SELECT COUNT(*) FROM artifacts;")?,
            snippets: count("SELECT COUNT(*) FROM snippets;")?,
            links: count("SELECT COUNT(*) FROM artifact_scope_links;")?,
        })
    }
}

//! SQLite connection management and the shared graph store handle.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};

use tripleviz_core::{QueryConfig, StoreConfig};

/// Errors from graph store operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("Reserved identifier cannot be used as a subject: {0}")]
    ReservedId(String),

    #[error("Malformed triple ({subject}, {predicate}): {reason}")]
    MalformedTriple {
        subject: String,
        predicate: String,
        reason: String,
    },

    #[error("Partial write during {operation}, rolled back: {source}")]
    PartialWrite {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Visibility activation race in graph {graph_id}: {active} sets active")]
    ConcurrentActivationRace { graph_id: String, active: usize },

    #[error("Unsupported query shape: {0}")]
    UnsupportedQueryShape(String),

    #[error("SQLite error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("SQLite connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GraphError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// True for the 404-equivalent variant.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS graphs (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    graph_id    TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS triples (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    graph_id    TEXT NOT NULL REFERENCES graphs(graph_id) ON DELETE CASCADE,
    subject     TEXT NOT NULL,
    predicate   TEXT NOT NULL,
    object      TEXT NOT NULL,
    object_type TEXT NOT NULL DEFAULT 'literal',
    value_kind  TEXT
);

CREATE INDEX IF NOT EXISTS idx_triples_graph_subject
    ON triples(graph_id, subject, id);
CREATE INDEX IF NOT EXISTS idx_triples_graph_predicate
    ON triples(graph_id, predicate, object);
CREATE INDEX IF NOT EXISTS idx_triples_subject_predicate
    ON triples(subject, predicate);
CREATE INDEX IF NOT EXISTS idx_triples_object
    ON triples(object);

CREATE TABLE IF NOT EXISTS visibility_sets (
    set_id      TEXT PRIMARY KEY,
    graph_id    TEXT NOT NULL REFERENCES graphs(graph_id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    query       TEXT NOT NULL,
    description TEXT,
    is_active   INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_visibility_sets_graph
    ON visibility_sets(graph_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_visibility_sets_one_active
    ON visibility_sets(graph_id) WHERE is_active = 1;
";

/// Lock the connection, recovering from a poisoned mutex.
fn acquire_lock(mutex: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Triple store mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Thread-safe handle to the SQLite-backed triple store.
///
/// This is the single point of access for all graph content. One connection
/// is shared behind a mutex; every multi-statement write runs in an
/// `IMMEDIATE` transaction so it either fully applies or not at all.
pub struct GraphStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
    query_config: QueryConfig,
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("db_path", &self.db_path)
            .field("query_config", &self.query_config)
            .finish_non_exhaustive()
    }
}

impl GraphStore {
    /// Open the store described by `config`, creating the schema if needed.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let (conn, db_path) = match &config.path {
            Some(path) => {
                let path = PathBuf::from(path);
                let conn = Connection::open(&path)
                    .map_err(|e| GraphError::Connection(format!("{}: {e}", path.display())))?;
                (conn, Some(path))
            }
            None => {
                let conn = Connection::open_in_memory()
                    .map_err(|e| GraphError::Connection(e.to_string()))?;
                (conn, None)
            }
        };

        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        if db_path.is_some() {
            // Returns the resulting mode as a row, so query rather than update.
            let mode: String =
                conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
            tracing::debug!(journal_mode = %mode, "Journal mode set");
        }
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!(
            path = ?db_path.as_ref().map(|p| p.display().to_string()),
            "Triple store opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
            query_config: QueryConfig::default(),
        })
    }

    /// Open a throwaway in-memory store.
    pub fn in_memory() -> Result<Self> {
        Self::open(&StoreConfig::in_memory())
    }

    /// Set how the visibility query engine treats unrecognized query text.
    pub fn with_query_config(mut self, config: QueryConfig) -> Self {
        self.query_config = config;
        self
    }

    pub fn query_config(&self) -> &QueryConfig {
        &self.query_config
    }

    /// Database file backing this store, `None` when in memory.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Lock the shared connection for a read or a single-statement write.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        acquire_lock(&self.conn)
    }

    /// Run `body` inside one `IMMEDIATE` transaction.
    ///
    /// Commits when `body` succeeds and rolls back otherwise. Storage errors
    /// raised inside the body, or by the commit itself, are reported as
    /// `PartialWrite` for `operation`; every other error passes through.
    pub(crate) fn write_txn<T>(
        &self,
        operation: &'static str,
        body: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        match body(&tx) {
            Ok(value) => {
                tx.commit()
                    .map_err(|source| GraphError::PartialWrite { operation, source })?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::error!(operation, error = %rollback_err, "Rollback failed");
                }
                tracing::warn!(operation, error = %err, "Write rolled back");
                match err {
                    GraphError::Database(source) => {
                        Err(GraphError::PartialWrite { operation, source })
                    }
                    other => Err(other),
                }
            }
        }
    }
}

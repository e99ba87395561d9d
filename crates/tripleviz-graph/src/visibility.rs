//! Named visibility sets, at most one active per graph.
//!
//! Activation deactivates the graph's current set and activates the target
//! inside one `IMMEDIATE` transaction. The partial unique index
//! `idx_visibility_sets_one_active` rejects a second active row at the
//! storage layer, and the active count is re-read before commit.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use tripleviz_core::{GraphData, GraphId, VisibilityDefinition, VisibilitySet, VisibilitySetId};

use crate::graphs::require_graph_tx;
use crate::query::evaluate_tx;
use crate::reconstruct::assemble;
use crate::store::{GraphError, GraphStore, Result};
use crate::triples::{parse_graph_id, scan_graph_tx};

const SET_COLUMNS: &str =
    "set_id, graph_id, name, query, description, is_active, created_at, updated_at";

impl GraphStore {
    /// Persist a new, inactive visibility set.
    ///
    /// The query text is checked under the configured unrecognized-query
    /// policy, so a `reject` store refuses sets it could never evaluate.
    pub fn create_visibility_set(
        &self,
        graph_id: &GraphId,
        definition: &VisibilityDefinition,
    ) -> Result<VisibilitySet> {
        self.resolve_query(&definition.query)?;

        let now = Utc::now();
        let set = VisibilitySet {
            set_id: VisibilitySetId::new(),
            graph_id: *graph_id,
            name: definition.name.clone(),
            query: definition.query.clone(),
            description: definition.description.clone(),
            is_active: false,
            created_at: now,
            updated_at: now,
        };

        self.write_txn("create_visibility_set", |tx| {
            require_graph_tx(tx, graph_id)?;
            tx.execute(
                "INSERT INTO visibility_sets
                   (set_id, graph_id, name, query, description, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
                params![
                    set.set_id.to_string(),
                    graph_id.to_string(),
                    set.name,
                    set.query,
                    set.description,
                    now
                ],
            )?;
            Ok(())
        })?;

        tracing::info!(
            graph_id = %graph_id,
            set_id = %set.set_id,
            name = %set.name,
            "Visibility set created"
        );
        Ok(set)
    }

    /// Visibility sets of a graph, oldest first.
    pub fn list_visibility_sets(&self, graph_id: &GraphId) -> Result<Vec<VisibilitySet>> {
        let conn = self.conn();
        require_graph_tx(&conn, graph_id)?;

        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SET_COLUMNS} FROM visibility_sets
             WHERE graph_id = ?1 ORDER BY created_at, rowid"
        ))?;
        let rows = stmt.query_map(params![graph_id.to_string()], set_from_row)?;

        let mut sets = Vec::new();
        for row in rows {
            sets.push(row?.into_set()?);
        }
        Ok(sets)
    }

    pub fn get_visibility_set(&self, set_id: &VisibilitySetId) -> Result<VisibilitySet> {
        let conn = self.conn();
        get_set_tx(&conn, set_id)?.ok_or_else(|| GraphError::not_found("visibility set", set_id))
    }

    /// The graph's active set, if any.
    pub fn active_visibility_set(&self, graph_id: &GraphId) -> Result<Option<VisibilitySet>> {
        let conn = self.conn();
        require_graph_tx(&conn, graph_id)?;
        active_set_tx(&conn, graph_id)
    }

    /// Make `set_id` the only active set of `graph_id`.
    ///
    /// Returns `true` once the set is active, including when it already was.
    /// A set belonging to another graph is `NotFound`.
    pub fn activate(&self, graph_id: &GraphId, set_id: &VisibilitySetId) -> Result<bool> {
        self.write_txn("activate_visibility_set", |tx| {
            require_graph_tx(tx, graph_id)?;
            let gid = graph_id.to_string();
            let sid = set_id.to_string();

            let owned: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM visibility_sets WHERE set_id = ?1 AND graph_id = ?2)",
                params![sid, gid],
                |row| row.get(0),
            )?;
            if !owned {
                return Err(GraphError::not_found("visibility set", set_id));
            }

            let now = Utc::now();
            let deactivated = tx.execute(
                "UPDATE visibility_sets SET is_active = 0, updated_at = ?2
                 WHERE graph_id = ?1 AND is_active = 1 AND set_id <> ?3",
                params![gid, now, sid],
            )?;
            tx.execute(
                "UPDATE visibility_sets SET is_active = 1, updated_at = ?3
                 WHERE set_id = ?1 AND graph_id = ?2 AND is_active = 0",
                params![sid, gid, now],
            )?;

            let active = count_active_tx(tx, graph_id)?;
            if active != 1 {
                return Err(GraphError::ConcurrentActivationRace {
                    graph_id: gid,
                    active,
                });
            }

            tracing::info!(
                graph_id = %graph_id,
                set_id = %set_id,
                deactivated,
                "Visibility set activated"
            );
            Ok(true)
        })
    }

    /// Deactivate whichever set is active. Returns `false` if none was.
    pub fn deactivate(&self, graph_id: &GraphId) -> Result<bool> {
        self.write_txn("deactivate_visibility_sets", |tx| {
            require_graph_tx(tx, graph_id)?;
            let changed = tx.execute(
                "UPDATE visibility_sets SET is_active = 0, updated_at = ?2
                 WHERE graph_id = ?1 AND is_active = 1",
                params![graph_id.to_string(), Utc::now()],
            )?;
            if changed > 0 {
                tracing::info!(graph_id = %graph_id, "Visibility sets deactivated");
            }
            Ok(changed > 0)
        })
    }

    /// Returns `false` if no such set existed.
    pub fn delete_visibility_set(&self, set_id: &VisibilitySetId) -> Result<bool> {
        let conn = self.conn();
        let deleted = conn.execute(
            "DELETE FROM visibility_sets WHERE set_id = ?1",
            params![set_id.to_string()],
        )?;
        if deleted > 0 {
            tracing::info!(set_id = %set_id, "Visibility set deleted");
        }
        Ok(deleted > 0)
    }

    /// Reconstruct a graph with `visible_node_ids` narrowed to the active
    /// set's query result. With no active set every node is visible.
    ///
    /// Triples and the active set are read under one lock, so the view and
    /// its visible ids describe the same state.
    pub fn get_filtered_visualization_data(&self, graph_id: &GraphId) -> Result<GraphData> {
        let (triples, active) = {
            let conn = self.conn();
            require_graph_tx(&conn, graph_id)?;
            let triples = scan_graph_tx(&conn, graph_id)?;
            let active = match active_set_tx(&conn, graph_id)? {
                Some(set) => {
                    let query = self.resolve_query(&set.query)?;
                    let ids = evaluate_tx(&conn, graph_id, &query)?;
                    Some((set, ids))
                }
                None => None,
            };
            (triples, active)
        };

        let mut data = assemble(triples);
        if let Some((set, ids)) = active {
            let selected: HashSet<String> = ids.into_iter().collect();
            data.visible_node_ids = data
                .nodes
                .iter()
                .filter(|n| selected.contains(&n.id))
                .map(|n| n.id.clone())
                .collect();
            tracing::debug!(
                graph_id = %graph_id,
                set_id = %set.set_id,
                visible = data.visible_node_ids.len(),
                node_count = data.node_count,
                "Visibility filter applied"
            );
        }
        Ok(data)
    }
}

// ── Transaction-scoped helpers ───────────────────────────────────

fn get_set_tx(conn: &Connection, set_id: &VisibilitySetId) -> Result<Option<VisibilitySet>> {
    let raw = conn
        .query_row(
            &format!("SELECT {SET_COLUMNS} FROM visibility_sets WHERE set_id = ?1"),
            params![set_id.to_string()],
            set_from_row,
        )
        .optional()?;
    raw.map(RawSet::into_set).transpose()
}

fn active_set_tx(conn: &Connection, graph_id: &GraphId) -> Result<Option<VisibilitySet>> {
    let raw = conn
        .query_row(
            &format!(
                "SELECT {SET_COLUMNS} FROM visibility_sets
                 WHERE graph_id = ?1 AND is_active = 1
                 ORDER BY rowid LIMIT 1"
            ),
            params![graph_id.to_string()],
            set_from_row,
        )
        .optional()?;
    raw.map(RawSet::into_set).transpose()
}

fn count_active_tx(conn: &Connection, graph_id: &GraphId) -> Result<usize> {
    let active: i64 = conn.query_row(
        "SELECT COUNT(*) FROM visibility_sets WHERE graph_id = ?1 AND is_active = 1",
        params![graph_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(active as usize)
}

// ── Row mapping ──────────────────────────────────────────────────

struct RawSet {
    set_id: String,
    graph_id: String,
    name: String,
    query: String,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn set_from_row(row: &Row<'_>) -> rusqlite::Result<RawSet> {
    Ok(RawSet {
        set_id: row.get(0)?,
        graph_id: row.get(1)?,
        name: row.get(2)?,
        query: row.get(3)?,
        description: row.get(4)?,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

impl RawSet {
    fn into_set(self) -> Result<VisibilitySet> {
        let set_id = self.set_id.parse::<VisibilitySetId>().map_err(|e| {
            GraphError::Serialization(format!("invalid visibility set id {:?}: {e}", self.set_id))
        })?;
        Ok(VisibilitySet {
            set_id,
            graph_id: parse_graph_id(&self.graph_id)?,
            name: self.name,
            query: self.query,
            description: self.description,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

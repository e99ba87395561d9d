//! Graph lifecycle: create, read, rename, delete.
//!
//! Deleting a graph cascades to its triples and visibility sets.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use tripleviz_core::{Graph, GraphId, GraphStats};

use crate::codec;
use crate::store::{GraphError, GraphStore, Result};
use crate::triples::parse_graph_id;

const GRAPH_COLUMNS: &str = "id, graph_id, name, description, created_at, updated_at";

impl GraphStore {
    /// Create an empty graph.
    pub fn create_graph(&self, name: &str, description: &str) -> Result<Graph> {
        let now = Utc::now();
        let graph_id = GraphId::new();

        let conn = self.conn();
        conn.execute(
            "INSERT INTO graphs (graph_id, name, description, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![graph_id.to_string(), name, description, now],
        )?;

        let graph = Graph {
            key: conn.last_insert_rowid(),
            graph_id,
            name: name.to_string(),
            description: description.to_string(),
            created_at: now,
            updated_at: now,
        };

        tracing::info!(graph_id = %graph.graph_id, name, "Graph created");
        Ok(graph)
    }

    pub fn get_graph(&self, graph_id: &GraphId) -> Result<Graph> {
        let conn = self.conn();
        get_graph_tx(&conn, graph_id)?.ok_or_else(|| GraphError::not_found("graph", graph_id))
    }

    /// All graphs, oldest first.
    pub fn list_graphs(&self) -> Result<Vec<Graph>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare_cached(&format!("SELECT {GRAPH_COLUMNS} FROM graphs ORDER BY id"))?;
        let rows = stmt.query_map([], graph_from_row)?;

        let mut graphs = Vec::new();
        for row in rows {
            graphs.push(row?.into_graph()?);
        }
        Ok(graphs)
    }

    /// Rename or re-describe a graph. `None` leaves a field unchanged.
    pub fn update_graph(
        &self,
        graph_id: &GraphId,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Graph> {
        self.write_txn("update_graph", |tx| {
            let mut graph = get_graph_tx(tx, graph_id)?
                .ok_or_else(|| GraphError::not_found("graph", graph_id))?;

            if let Some(name) = name {
                graph.name = name.to_string();
            }
            if let Some(description) = description {
                graph.description = description.to_string();
            }
            graph.updated_at = Utc::now();

            tx.execute(
                "UPDATE graphs SET name = ?2, description = ?3, updated_at = ?4
                 WHERE graph_id = ?1",
                params![
                    graph_id.to_string(),
                    graph.name,
                    graph.description,
                    graph.updated_at
                ],
            )?;
            Ok(graph)
        })
    }

    /// Delete a graph with all its triples and visibility sets.
    /// Returns `false` if no such graph existed.
    pub fn delete_graph(&self, graph_id: &GraphId) -> Result<bool> {
        let deleted = self.write_txn("delete_graph", |tx| {
            let id = graph_id.to_string();
            let triples = tx.execute("DELETE FROM triples WHERE graph_id = ?1", params![id])?;
            let sets = tx.execute(
                "DELETE FROM visibility_sets WHERE graph_id = ?1",
                params![id],
            )?;
            let graphs = tx.execute("DELETE FROM graphs WHERE graph_id = ?1", params![id])?;

            if graphs > 0 {
                tracing::info!(graph_id = %graph_id, triples, sets, "Graph deleted");
            }
            Ok(graphs > 0)
        })?;
        Ok(deleted)
    }

    /// Counts of triples, node subjects, edge subjects, and visibility sets.
    pub fn graph_stats(&self, graph_id: &GraphId) -> Result<GraphStats> {
        let conn = self.conn();
        if get_graph_tx(&conn, graph_id)?.is_none() {
            return Err(GraphError::not_found("graph", graph_id));
        }

        let id = graph_id.to_string();
        let triple_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM triples WHERE graph_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        let count_type = |entity_type: &str| -> rusqlite::Result<i64> {
            conn.query_row(
                "SELECT COUNT(DISTINCT subject) FROM triples
                 WHERE graph_id = ?1 AND predicate = ?2 AND object = ?3",
                params![id, codec::PRED_TYPE, entity_type],
                |row| row.get(0),
            )
        };
        let node_count = count_type(codec::TYPE_NODE)?;
        let edge_count = count_type(codec::TYPE_EDGE)?;
        let visibility_set_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM visibility_sets WHERE graph_id = ?1",
            params![id],
            |row| row.get(0),
        )?;

        Ok(GraphStats {
            triple_count: triple_count as usize,
            node_count: node_count as usize,
            edge_count: edge_count as usize,
            visibility_set_count: visibility_set_count as usize,
        })
    }
}

// ── Transaction-scoped helpers ───────────────────────────────────

pub(crate) fn get_graph_tx(conn: &Connection, graph_id: &GraphId) -> Result<Option<Graph>> {
    let raw = conn
        .query_row(
            &format!("SELECT {GRAPH_COLUMNS} FROM graphs WHERE graph_id = ?1"),
            params![graph_id.to_string()],
            graph_from_row,
        )
        .optional()?;
    raw.map(RawGraph::into_graph).transpose()
}

/// Fail with `NotFound` unless the graph exists.
pub(crate) fn require_graph_tx(conn: &Connection, graph_id: &GraphId) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM graphs WHERE graph_id = ?1)",
        params![graph_id.to_string()],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(GraphError::not_found("graph", graph_id))
    }
}

/// Bump `updated_at` after a content change.
pub(crate) fn touch_graph_tx(conn: &Connection, graph_id: &GraphId) -> Result<()> {
    conn.execute(
        "UPDATE graphs SET updated_at = ?2 WHERE graph_id = ?1",
        params![graph_id.to_string(), Utc::now()],
    )?;
    Ok(())
}

struct RawGraph {
    key: i64,
    graph_id: String,
    name: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RawGraph {
    fn into_graph(self) -> Result<Graph> {
        Ok(Graph {
            key: self.key,
            graph_id: parse_graph_id(&self.graph_id)?,
            name: self.name,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn graph_from_row(row: &Row<'_>) -> rusqlite::Result<RawGraph> {
    Ok(RawGraph {
        key: row.get(0)?,
        graph_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripleviz_core::Triple;

    #[test]
    fn create_get_list() {
        let store = GraphStore::in_memory().unwrap();
        let g1 = store.create_graph("plant", "process plant").unwrap();
        let g2 = store.create_graph("office", "").unwrap();

        let fetched = store.get_graph(&g1.graph_id).unwrap();
        assert_eq!(fetched.name, "plant");
        assert_eq!(fetched.description, "process plant");
        assert_eq!(fetched.key, g1.key);

        let all = store.list_graphs().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].graph_id, g1.graph_id);
        assert_eq!(all[1].graph_id, g2.graph_id);
    }

    #[test]
    fn get_missing_graph_is_not_found() {
        let store = GraphStore::in_memory().unwrap();
        let err = store.get_graph(&GraphId::new()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn update_graph_changes_only_given_fields() {
        let store = GraphStore::in_memory().unwrap();
        let g = store.create_graph("plant", "old").unwrap();

        let updated = store.update_graph(&g.graph_id, Some("plant 2"), None).unwrap();
        assert_eq!(updated.name, "plant 2");
        assert_eq!(updated.description, "old");
        assert!(updated.updated_at >= g.updated_at);
    }

    #[test]
    fn delete_graph_cascades_to_triples() {
        let store = GraphStore::in_memory().unwrap();
        let g = store.create_graph("plant", "").unwrap();
        store
            .put(&Triple::literal(g.graph_id, "n1", "label", "Pump"))
            .unwrap();

        assert!(store.delete_graph(&g.graph_id).unwrap());
        assert!(!store.delete_graph(&g.graph_id).unwrap());
        assert!(store.scan(&g.graph_id).unwrap().is_empty());
        assert!(store.get_graph(&g.graph_id).unwrap_err().is_not_found());
    }

    #[test]
    fn stats_count_entities() {
        let store = GraphStore::in_memory().unwrap();
        let g = store.create_graph("plant", "").unwrap();
        store
            .put(&Triple::uri(g.graph_id, "n1", codec::PRED_TYPE, codec::TYPE_NODE))
            .unwrap();
        store
            .put(&Triple::literal(g.graph_id, "n1", codec::PRED_LABEL, "Pump"))
            .unwrap();

        let stats = store.graph_stats(&g.graph_id).unwrap();
        assert_eq!(stats.triple_count, 2);
        assert_eq!(stats.node_count, 1);
        assert_eq!(stats.edge_count, 0);
        assert_eq!(stats.visibility_set_count, 0);
    }
}

//! Write operations for nodes and edges.
//!
//! Every multi-triple write runs in one transaction: a node or edge is
//! either fully written or not written at all. Node and edge ids are global
//! subjects; operations addressed by id locate the owning graph from the
//! subject's existence triple.

use rusqlite::{params, Connection};
use uuid::Uuid;

use tripleviz_core::{EdgeRecord, GraphId, NewEdge, NewNode, Node, NodePatch, Triple};

use crate::codec::{
    self, PRED_CONNECTS_TO, PRED_EDGE_SOURCE, PRED_EDGE_TARGET, PRED_LABEL, PRED_NODE_TYPE,
    PRED_POSITION_X, PRED_POSITION_Y, TYPE_EDGE, TYPE_NODE,
};
use crate::graphs::{require_graph_tx, touch_graph_tx};
use crate::store::{GraphError, GraphStore, Result};
use crate::triples::{
    delete_node_tx, delete_predicate_tx, delete_subject_tx, entity_graph_tx, insert_triple_tx,
    scan_subject_tx, upsert_tx,
};

impl GraphStore {
    // ── Nodes ────────────────────────────────────────────────────

    /// Create a node and return its id.
    pub fn create_node(&self, graph_id: &GraphId, node: &NewNode) -> Result<String> {
        let id = node
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        self.write_txn("create_node", |tx| {
            require_graph_tx(tx, graph_id)?;
            ensure_subject_free(tx, &id)?;

            let triples = codec::encode_node(
                *graph_id,
                &id,
                &node.label,
                &node.node_type,
                &node.data,
                node.x,
                node.y,
            );
            for triple in &triples {
                insert_triple_tx(tx, triple)?;
            }
            touch_graph_tx(tx, graph_id)?;

            tracing::debug!(
                graph_id = %graph_id,
                node_id = %id,
                triples = triples.len(),
                "Node created"
            );
            Ok(())
        })?;

        Ok(id)
    }

    /// Decode one node by id.
    pub fn get_node(&self, id: &str) -> Result<Node> {
        let triples = self.scan_subject(id)?;
        if !codec::is_node(&triples) {
            return Err(GraphError::not_found("node", id));
        }
        Ok(codec::decode_node(id, &triples))
    }

    /// Move a node. Both position triples are overwritten in place, so
    /// repeating the call leaves the triple count unchanged.
    /// Returns `false` if no such node exists.
    pub fn update_node_position(&self, id: &str, x: f64, y: f64) -> Result<bool> {
        self.write_txn("update_node_position", |tx| {
            let Some(graph_id) = entity_graph_tx(tx, id, TYPE_NODE)? else {
                return Ok(false);
            };

            for (predicate, value) in [(PRED_POSITION_X, x), (PRED_POSITION_Y, y)] {
                let triple =
                    Triple::literal(graph_id, id, predicate, codec::format_coordinate(value));
                upsert_tx(tx, &triple)?;
            }
            touch_graph_tx(tx, &graph_id)?;

            tracing::debug!(node_id = id, x, y, "Node moved");
            Ok(true)
        })
    }

    /// Overwrite label/type and merge data properties.
    ///
    /// A data key patched to `null` is removed. Returns `false` if no such
    /// node exists.
    pub fn update_node_properties(&self, id: &str, patch: &NodePatch) -> Result<bool> {
        self.write_txn("update_node_properties", |tx| {
            let Some(graph_id) = entity_graph_tx(tx, id, TYPE_NODE)? else {
                return Ok(false);
            };

            if let Some(label) = &patch.label {
                upsert_tx(tx, &Triple::literal(graph_id, id, PRED_LABEL, label.as_str()))?;
            }
            if let Some(node_type) = &patch.node_type {
                upsert_tx(
                    tx,
                    &Triple::literal(graph_id, id, PRED_NODE_TYPE, node_type.as_str()),
                )?;
            }

            let mut removed = 0;
            if let Some(data) = &patch.data {
                for (key, value) in data {
                    if value.is_null() {
                        removed += delete_predicate_tx(tx, id, &codec::data_property(key))?;
                    } else {
                        upsert_tx(tx, &codec::encode_data_property(graph_id, id, key, value))?;
                    }
                }
            }
            touch_graph_tx(tx, &graph_id)?;

            tracing::debug!(
                node_id = id,
                label = patch.label.is_some(),
                node_type = patch.node_type.is_some(),
                data_keys = patch.data.as_ref().map_or(0, |d| d.len()),
                removed,
                "Node properties updated"
            );
            Ok(true)
        })
    }

    /// Delete a node together with the links pointing at it and every edge
    /// entity attached to it, all within the node's own graph.
    ///
    /// Returns `false` if `id` is not a node; edge ids go through
    /// [`GraphStore::delete_edge`].
    pub fn delete_node(&self, id: &str) -> Result<bool> {
        self.write_txn("delete_node", |tx| {
            let Some(graph_id) = entity_graph_tx(tx, id, TYPE_NODE)? else {
                return Ok(false);
            };

            let attached = attached_edge_subjects(tx, &graph_id, id)?;
            let mut deleted = 0;
            for edge_id in &attached {
                deleted += delete_subject_tx(tx, edge_id)?;
            }
            deleted += delete_node_tx(tx, &graph_id, id)?;
            touch_graph_tx(tx, &graph_id)?;

            tracing::debug!(
                graph_id = %graph_id,
                node_id = id,
                attached_edges = attached.len(),
                deleted,
                "Node deleted"
            );
            Ok(true)
        })
    }

    // ── Edges ────────────────────────────────────────────────────

    /// Create an edge between two existing nodes of the graph and return its id.
    pub fn create_edge(&self, graph_id: &GraphId, edge: &NewEdge) -> Result<String> {
        let id = edge
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        self.write_txn("create_edge", |tx| {
            require_graph_tx(tx, graph_id)?;
            ensure_subject_free(tx, &id)?;
            for endpoint in [&edge.source, &edge.target] {
                if entity_graph_tx(tx, endpoint, TYPE_NODE)? != Some(*graph_id) {
                    return Err(GraphError::not_found("node", endpoint));
                }
            }

            let (entity, link) = codec::encode_edge(
                *graph_id,
                &id,
                &edge.source,
                &edge.target,
                edge.label.as_deref(),
                &edge.edge_type,
            );
            for triple in &entity {
                insert_triple_tx(tx, triple)?;
            }
            if !link_exists(tx, &edge.source, &edge.target)? {
                insert_triple_tx(tx, &link)?;
            }
            touch_graph_tx(tx, graph_id)?;

            tracing::debug!(
                graph_id = %graph_id,
                edge_id = %id,
                source = %edge.source,
                target = %edge.target,
                "Edge created"
            );
            Ok(())
        })?;

        Ok(id)
    }

    /// Decode the metadata an edge entity was created with.
    pub fn get_edge(&self, id: &str) -> Result<EdgeRecord> {
        let triples = self.scan_subject(id)?;
        if !codec::is_edge(&triples) {
            return Err(GraphError::not_found("edge", id));
        }
        Ok(codec::decode_edge_record(id, &triples))
    }

    /// Delete an edge entity and its `connects-to` triple, unless another
    /// edge entity still declares the same source and target.
    /// Returns `false` if no such edge exists.
    pub fn delete_edge(&self, id: &str) -> Result<bool> {
        self.write_txn("delete_edge", |tx| {
            let triples = scan_subject_tx(tx, id)?;
            if !codec::is_edge(&triples) {
                return Ok(false);
            }
            let record = codec::decode_edge_record(id, &triples);
            let graph_id = triples[0].graph_id;

            delete_subject_tx(tx, id)?;

            let mut link_removed = false;
            match (&record.source, &record.target) {
                (Some(source), Some(target)) => {
                    if count_edge_entities(tx, source, target)? == 0 {
                        link_removed = tx.execute(
                            "DELETE FROM triples
                             WHERE subject = ?1 AND predicate = ?2 AND object = ?3",
                            params![source, PRED_CONNECTS_TO, target],
                        )? > 0;
                    }
                }
                _ => tracing::debug!(
                    edge_id = id,
                    "Edge has no recorded endpoints; connects-to left in place"
                ),
            }
            touch_graph_tx(tx, &graph_id)?;

            tracing::debug!(edge_id = id, link_removed, "Edge deleted");
            Ok(true)
        })
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn ensure_subject_free(conn: &Connection, id: &str) -> Result<()> {
    if codec::is_reserved_id(id) {
        return Err(GraphError::ReservedId(id.to_string()));
    }
    let taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM triples WHERE subject = ?1 AND predicate = ?2)",
        params![id, codec::PRED_TYPE],
        |row| row.get(0),
    )?;
    if taken {
        return Err(GraphError::AlreadyExists {
            kind: "subject",
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Edge entities of `graph_id` whose recorded source or target is `node_id`.
fn attached_edge_subjects(
    conn: &Connection,
    graph_id: &GraphId,
    node_id: &str,
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT DISTINCT e.subject FROM triples e
         WHERE e.graph_id = ?6 AND e.predicate IN (?2, ?3) AND e.object = ?1
           AND EXISTS (SELECT 1 FROM triples t
                       WHERE t.graph_id = e.graph_id AND t.subject = e.subject
                         AND t.predicate = ?4 AND t.object = ?5)",
    )?;
    let rows = stmt.query_map(
        params![
            node_id,
            PRED_EDGE_SOURCE,
            PRED_EDGE_TARGET,
            codec::PRED_TYPE,
            TYPE_EDGE,
            graph_id.to_string()
        ],
        |row| row.get::<_, String>(0),
    )?;
    let subjects = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(subjects)
}

fn link_exists(conn: &Connection, source: &str, target: &str) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM triples
                       WHERE subject = ?1 AND predicate = ?2 AND object = ?3)",
        params![source, PRED_CONNECTS_TO, target],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Edge entities still declaring `source -> target`.
fn count_edge_entities(conn: &Connection, source: &str, target: &str) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT s.subject) FROM triples s
         JOIN triples t ON t.subject = s.subject
         WHERE s.predicate = ?1 AND s.object = ?2
           AND t.predicate = ?3 AND t.object = ?4",
        params![PRED_EDGE_SOURCE, source, PRED_EDGE_TARGET, target],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

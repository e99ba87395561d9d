//! Graph reconstruction: rebuild the node/edge view from a graph's triples.
//!
//! Nothing here is cached. Every call re-reads the graph, so a concurrent
//! mutation may or may not be visible in a given result.

use std::collections::HashSet;

use tripleviz_core::{Edge, GraphData, GraphId, Node, Triple};

use crate::codec::{self, PRED_CONNECTS_TO};
use crate::graphs::require_graph_tx;
use crate::store::{GraphStore, Result};
use crate::triples::scan_graph_tx;

/// Type reported on every reconstructed edge.
pub const EDGE_VIEW_TYPE: &str = "connects";

impl GraphStore {
    /// Rebuild the full node/edge view of a graph. Every node is visible.
    pub fn reconstruct(&self, graph_id: &GraphId) -> Result<GraphData> {
        let triples = {
            let conn = self.conn();
            require_graph_tx(&conn, graph_id)?;
            scan_graph_tx(&conn, graph_id)?
        };

        let triple_count = triples.len();
        let data = assemble(triples);
        tracing::debug!(
            graph_id = %graph_id,
            triple_count,
            node_count = data.node_count,
            edge_count = data.edge_count,
            "Graph reconstructed"
        );
        Ok(data)
    }

    /// The read call rendering uses: same as [`GraphStore::reconstruct`].
    pub fn get_visualization_data(&self, graph_id: &GraphId) -> Result<GraphData> {
        self.reconstruct(graph_id)
    }
}

/// Assemble nodes and edges from an already-loaded triple set.
///
/// Subjects typed `Node` become nodes; their `connects-to` triples become
/// edges with id `"source-target"`. Subjects typed `Edge` contribute nothing
/// here. An A→B edge and a later B→A edge collapse onto the first seen, and
/// edges pointing at a subject that is not a node are dropped.
pub fn assemble(triples: Vec<Triple>) -> GraphData {
    let mut nodes: Vec<Node> = Vec::new();
    let mut links: Vec<(String, String)> = Vec::new();

    for (subject, group) in codec::group_by_subject(triples) {
        if !codec::is_node(&group) {
            continue;
        }
        links.extend(
            group
                .iter()
                .filter(|t| t.predicate == PRED_CONNECTS_TO)
                .map(|t| (subject.clone(), t.object.clone())),
        );
        nodes.push(codec::decode_node(&subject, &group));
    }

    let node_ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let mut processed: HashSet<(String, String)> = HashSet::new();
    let mut edges = Vec::new();

    for (source, target) in links {
        if !node_ids.contains(target.as_str()) {
            tracing::debug!(%source, %target, "Dropping edge to missing node");
            continue;
        }
        let key = if source <= target {
            (source.clone(), target.clone())
        } else {
            (target.clone(), source.clone())
        };
        if !processed.insert(key) {
            continue;
        }
        edges.push(Edge {
            id: format!("{source}-{target}"),
            source,
            target,
            edge_type: EDGE_VIEW_TYPE.to_string(),
            data: Default::default(),
        });
    }

    let visible_node_ids = nodes.iter().map(|n| n.id.clone()).collect();
    GraphData {
        node_count: nodes.len(),
        edge_count: edges.len(),
        nodes,
        edges,
        visible_node_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_edge, encode_node};
    use std::collections::BTreeMap;

    fn gid() -> GraphId {
        GraphId(uuid::Uuid::nil())
    }

    fn node(id: &str) -> Vec<Triple> {
        encode_node(gid(), id, id, "Thing", &BTreeMap::new(), 0.0, 0.0)
    }

    fn link(source: &str, target: &str) -> Triple {
        Triple::uri(gid(), source, PRED_CONNECTS_TO, target)
    }

    #[test]
    fn test_assemble_nodes_and_edges() {
        let mut triples = node("a");
        triples.extend(node("b"));
        triples.push(link("a", "b"));

        let data = assemble(triples);
        assert_eq!(data.node_count, 2);
        assert_eq!(data.edge_count, 1);
        assert_eq!(data.edges[0].id, "a-b");
        assert_eq!(data.edges[0].edge_type, "connects");
        assert!(data.edges[0].data.is_empty());
        assert_eq!(data.visible_node_ids, vec!["a", "b"]);
    }

    #[test]
    fn test_reverse_direction_deduplicated() {
        let mut triples = node("a");
        triples.extend(node("b"));
        triples.push(link("a", "b"));
        triples.push(link("b", "a"));
        triples.push(link("a", "b"));

        let data = assemble(triples);
        assert_eq!(data.edge_count, 1);
        assert_eq!(data.edges[0].source, "a");
    }

    #[test]
    fn test_edge_entity_contributes_no_edges() {
        let mut triples = node("a");
        triples.extend(node("b"));
        let (entity, _link) = encode_edge(gid(), "e1", "a", "b", Some("x"), "flowsTo");
        triples.extend(entity);

        let data = assemble(triples);
        assert_eq!(data.node_count, 2);
        assert_eq!(data.edge_count, 0);
    }

    #[test]
    fn test_dangling_edge_dropped() {
        let mut triples = node("a");
        triples.push(link("a", "ghost"));
        assert_eq!(assemble(triples).edge_count, 0);
    }

    #[test]
    fn test_links_on_non_node_subjects_ignored() {
        let mut triples = node("b");
        triples.push(link("untyped", "b"));
        let data = assemble(triples);
        assert_eq!(data.node_count, 1);
        assert_eq!(data.edge_count, 0);
    }

    #[test]
    fn test_partial_node_decoded_leniently() {
        let triples = vec![
            Triple::uri(gid(), "p", codec::PRED_TYPE, codec::TYPE_NODE),
            Triple::literal(gid(), "p", codec::PRED_LABEL, "Partial"),
        ];
        let data = assemble(triples);
        assert_eq!(data.nodes[0].label, "Partial");
        assert_eq!(data.nodes[0].node_type, "unknown");
    }
}

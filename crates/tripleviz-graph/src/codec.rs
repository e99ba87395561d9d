//! Entity codec: the fixed vocabulary and the mapping between nodes/edges
//! and the triples that represent them.
//!
//! Reads are lenient. A subject missing its label, type, or position triples
//! still decodes, falling back to the subject id, `"unknown"`, and `0`.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use tripleviz_core::{EdgeRecord, GraphId, Node, Triple, ValueKind};

use crate::store::GraphError;

// ── Vocabulary ───────────────────────────────────────────────────

/// Entity type of a node subject.
pub const TYPE_NODE: &str = "Node";
/// Entity type of an edge subject.
pub const TYPE_EDGE: &str = "Edge";

/// Existence triple: `(subject, type, Node|Edge)`.
pub const PRED_TYPE: &str = "type";
pub const PRED_NODE_TYPE: &str = "node-type";
pub const PRED_EDGE_TYPE: &str = "edge-type";
pub const PRED_LABEL: &str = "label";
pub const PRED_POSITION_X: &str = "position-x";
pub const PRED_POSITION_Y: &str = "position-y";
/// Recorded under the source node's subject; the only triple edges are rebuilt from.
pub const PRED_CONNECTS_TO: &str = "connects-to";
/// Recorded on the edge entity so deletion can find its `connects-to` triple.
pub const PRED_EDGE_SOURCE: &str = "edge-source";
pub const PRED_EDGE_TARGET: &str = "edge-target";
/// Predicates whose URI object is another subject. Only these are followed
/// when a subject is deleted.
pub const REFERENCE_PREDICATES: [&str; 3] = [PRED_CONNECTS_TO, PRED_EDGE_SOURCE, PRED_EDGE_TARGET];

/// Namespace for free-form node attributes: `data-property:<key>`.
pub const DATA_PROPERTY_PREFIX: &str = "data-property:";

/// Type reported for a node with no `node-type` triple.
pub const UNKNOWN_TYPE: &str = "unknown";

/// Entity type names double as URI objects, so they cannot be subject ids.
pub fn is_reserved_id(id: &str) -> bool {
    id == TYPE_NODE || id == TYPE_EDGE
}

pub fn data_property(key: &str) -> String {
    format!("{DATA_PROPERTY_PREFIX}{key}")
}

/// The key of a `data-property:<key>` predicate.
pub fn data_property_key(predicate: &str) -> Option<&str> {
    predicate.strip_prefix(DATA_PROPERTY_PREFIX)
}

/// Position objects are plain decimal strings.
pub fn format_coordinate(value: f64) -> String {
    value.to_string()
}

// ── Encoding ─────────────────────────────────────────────────────

/// Encode a node into its existence, type, label, position and data triples.
pub fn encode_node(
    graph_id: GraphId,
    id: &str,
    label: &str,
    node_type: &str,
    data: &BTreeMap<String, Value>,
    x: f64,
    y: f64,
) -> Vec<Triple> {
    let mut triples = vec![
        Triple::uri(graph_id, id, PRED_TYPE, TYPE_NODE),
        Triple::literal(graph_id, id, PRED_NODE_TYPE, node_type),
        Triple::literal(graph_id, id, PRED_LABEL, label),
        Triple::literal(graph_id, id, PRED_POSITION_X, format_coordinate(x)),
        Triple::literal(graph_id, id, PRED_POSITION_Y, format_coordinate(y)),
    ];
    triples.extend(
        data.iter()
            .map(|(key, value)| encode_data_property(graph_id, id, key, value)),
    );
    triples
}

/// Encode one data attribute, tagging the literal with its value kind.
pub fn encode_data_property(graph_id: GraphId, subject: &str, key: &str, value: &Value) -> Triple {
    let object = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Triple::literal(graph_id, subject, data_property(key), object)
        .with_value_kind(ValueKind::of(value))
}

/// Encode an edge.
///
/// Produces the edge entity's own triples plus, separately, the
/// `connects-to` triple under `source`. Only the latter is read back by
/// reconstruction; the entity triples serve `get_edge` and deletion.
pub fn encode_edge(
    graph_id: GraphId,
    id: &str,
    source: &str,
    target: &str,
    label: Option<&str>,
    edge_type: &str,
) -> (Vec<Triple>, Triple) {
    let mut entity = vec![
        Triple::uri(graph_id, id, PRED_TYPE, TYPE_EDGE),
        Triple::literal(graph_id, id, PRED_EDGE_TYPE, edge_type),
        Triple::uri(graph_id, id, PRED_EDGE_SOURCE, source),
        Triple::uri(graph_id, id, PRED_EDGE_TARGET, target),
    ];
    if let Some(label) = label {
        entity.push(Triple::literal(graph_id, id, PRED_LABEL, label));
    }
    let link = Triple::uri(graph_id, source, PRED_CONNECTS_TO, target);
    (entity, link)
}

// ── Decoding ─────────────────────────────────────────────────────

/// Object of the first triple with `predicate`, if any.
pub fn first_object<'a>(triples: &'a [Triple], predicate: &str) -> Option<&'a str> {
    triples
        .iter()
        .find(|t| t.predicate == predicate)
        .map(|t| t.object.as_str())
}

/// Whether the subject's triples declare it a `Node` / `Edge`.
pub fn entity_type(triples: &[Triple]) -> Option<&str> {
    first_object(triples, PRED_TYPE)
}

pub fn is_node(triples: &[Triple]) -> bool {
    entity_type(triples) == Some(TYPE_NODE)
}

pub fn is_edge(triples: &[Triple]) -> bool {
    entity_type(triples) == Some(TYPE_EDGE)
}

/// Decode a data-property literal according to its value tag.
///
/// Untagged (legacy) literals are tried as JSON first and otherwise kept as
/// the raw string.
pub fn decode_data_value(triple: &Triple) -> Result<Value, GraphError> {
    let malformed = |reason: String| GraphError::MalformedTriple {
        subject: triple.subject.clone(),
        predicate: triple.predicate.clone(),
        reason,
    };

    match triple.value_kind {
        Some(ValueKind::String) => Ok(Value::String(triple.object.clone())),
        Some(ValueKind::Number) => match serde_json::from_str::<Value>(&triple.object) {
            Ok(v @ Value::Number(_)) => Ok(v),
            _ => Err(malformed(format!("not a number: {:?}", triple.object))),
        },
        Some(ValueKind::Bool) => match triple.object.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => Err(malformed(format!("not a bool: {other:?}"))),
        },
        Some(ValueKind::Json) => serde_json::from_str(&triple.object)
            .map_err(|e| malformed(format!("invalid JSON: {e}"))),
        None => Ok(serde_json::from_str(&triple.object)
            .unwrap_or_else(|_| Value::String(triple.object.clone()))),
    }
}

/// Decode a node from all triples sharing its subject.
pub fn decode_node(subject: &str, triples: &[Triple]) -> Node {
    let label = first_object(triples, PRED_LABEL).unwrap_or(subject);
    let node_type = first_object(triples, PRED_NODE_TYPE).unwrap_or(UNKNOWN_TYPE);

    let mut data = BTreeMap::new();
    for triple in triples {
        let Some(key) = data_property_key(&triple.predicate) else {
            continue;
        };
        let value = decode_data_value(triple).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "Data property degraded to raw string");
            Value::String(triple.object.clone())
        });
        data.insert(key.to_string(), value);
    }

    Node {
        id: subject.to_string(),
        label: label.to_string(),
        node_type: node_type.to_string(),
        data,
        x: decode_coordinate(subject, triples, PRED_POSITION_X),
        y: decode_coordinate(subject, triples, PRED_POSITION_Y),
    }
}

fn decode_coordinate(subject: &str, triples: &[Triple], predicate: &str) -> f64 {
    match first_object(triples, predicate) {
        None => 0.0,
        Some(raw) => raw.trim().parse::<f64>().unwrap_or_else(|_| {
            tracing::warn!(subject, predicate, raw, "Unparseable coordinate, using 0");
            0.0
        }),
    }
}

/// Decode the metadata recorded on an edge entity's own subject.
pub fn decode_edge_record(subject: &str, triples: &[Triple]) -> EdgeRecord {
    EdgeRecord {
        id: subject.to_string(),
        source: first_object(triples, PRED_EDGE_SOURCE).map(str::to_string),
        target: first_object(triples, PRED_EDGE_TARGET).map(str::to_string),
        label: first_object(triples, PRED_LABEL).map(str::to_string),
        edge_type: first_object(triples, PRED_EDGE_TYPE)
            .unwrap_or(UNKNOWN_TYPE)
            .to_string(),
    }
}

/// Group triples by subject, keeping subjects in first-seen order.
pub fn group_by_subject(triples: Vec<Triple>) -> Vec<(String, Vec<Triple>)> {
    let mut order: Vec<(String, Vec<Triple>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for triple in triples {
        match index.get(&triple.subject) {
            Some(&i) => order[i].1.push(triple),
            None => {
                index.insert(triple.subject.clone(), order.len());
                order.push((triple.subject.clone(), vec![triple]));
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tripleviz_core::ObjectType;

    fn gid() -> GraphId {
        GraphId(uuid::Uuid::nil())
    }

    #[test]
    fn test_encode_node_shape() {
        let mut data = BTreeMap::new();
        data.insert("manufacturer".to_string(), json!("Acme"));
        data.insert("rating".to_string(), json!(4.5));

        let triples = encode_node(gid(), "n1", "Pump A", "Equipment", &data, 10.0, 20.0);
        assert_eq!(triples.len(), 7);
        assert_eq!(triples[0].predicate, PRED_TYPE);
        assert_eq!(triples[0].object, TYPE_NODE);
        assert_eq!(first_object(&triples, PRED_POSITION_X), Some("10"));

        let rating = triples
            .iter()
            .find(|t| t.predicate == "data-property:rating")
            .unwrap();
        assert_eq!(rating.object, "4.5");
        assert_eq!(rating.value_kind, Some(ValueKind::Number));
    }

    #[test]
    fn test_node_round_trip() {
        let mut data = BTreeMap::new();
        data.insert("manufacturer".to_string(), json!("Acme"));
        data.insert("serial".to_string(), json!("123"));
        data.insert("active".to_string(), json!(true));
        data.insert("ports".to_string(), json!([1, 2]));

        let triples = encode_node(gid(), "n1", "Pump A", "Equipment", &data, 10.5, -3.0);
        let node = decode_node("n1", &triples);

        assert_eq!(node.label, "Pump A");
        assert_eq!(node.node_type, "Equipment");
        assert_eq!(node.x, 10.5);
        assert_eq!(node.y, -3.0);
        // A numeric-looking string stays a string thanks to the value tag.
        assert_eq!(node.data["serial"], json!("123"));
        assert_eq!(node.data, data);
    }

    #[test]
    fn test_decode_node_defaults() {
        let triples = vec![Triple::uri(gid(), "n9", PRED_TYPE, TYPE_NODE)];
        let node = decode_node("n9", &triples);
        assert_eq!(node.label, "n9");
        assert_eq!(node.node_type, UNKNOWN_TYPE);
        assert_eq!(node.x, 0.0);
        assert_eq!(node.y, 0.0);
        assert!(node.data.is_empty());
    }

    #[test]
    fn test_unparseable_coordinate_defaults_to_zero() {
        let triples = vec![
            Triple::uri(gid(), "n1", PRED_TYPE, TYPE_NODE),
            Triple::literal(gid(), "n1", PRED_POSITION_X, "left"),
        ];
        assert_eq!(decode_node("n1", &triples).x, 0.0);
    }

    #[test]
    fn test_legacy_untagged_values() {
        let json_value = Triple::literal(gid(), "n1", "data-property:count", "42");
        assert_eq!(decode_data_value(&json_value).unwrap(), json!(42));

        let raw = Triple::literal(gid(), "n1", "data-property:note", "not json");
        assert_eq!(decode_data_value(&raw).unwrap(), json!("not json"));
    }

    #[test]
    fn test_malformed_tagged_value_degrades() {
        let bad = Triple::literal(gid(), "n1", "data-property:count", "many")
            .with_value_kind(ValueKind::Number);
        assert!(matches!(
            decode_data_value(&bad),
            Err(GraphError::MalformedTriple { .. })
        ));

        let triples = vec![Triple::uri(gid(), "n1", PRED_TYPE, TYPE_NODE), bad];
        assert_eq!(decode_node("n1", &triples).data["count"], json!("many"));
    }

    #[test]
    fn test_encode_edge_separates_link() {
        let (entity, link) = encode_edge(gid(), "e1", "n1", "n2", Some("feeds"), "flowsTo");
        assert!(is_edge(&entity));
        assert_eq!(first_object(&entity, PRED_EDGE_TYPE), Some("flowsTo"));
        assert_eq!(link.subject, "n1");
        assert_eq!(link.predicate, PRED_CONNECTS_TO);
        assert_eq!(link.object, "n2");
        assert_eq!(link.object_type, ObjectType::Uri);

        let record = decode_edge_record("e1", &entity);
        assert_eq!(record.source.as_deref(), Some("n1"));
        assert_eq!(record.target.as_deref(), Some("n2"));
        assert_eq!(record.label.as_deref(), Some("feeds"));
        assert_eq!(record.edge_type, "flowsTo");
    }

    #[test]
    fn test_edge_without_label_has_no_label_triple() {
        let (entity, _) = encode_edge(gid(), "e1", "n1", "n2", None, "flowsTo");
        assert!(first_object(&entity, PRED_LABEL).is_none());
    }

    #[test]
    fn test_group_by_subject_keeps_first_seen_order() {
        let triples = vec![
            Triple::literal(gid(), "b", PRED_LABEL, "B"),
            Triple::literal(gid(), "a", PRED_LABEL, "A"),
            Triple::literal(gid(), "b", PRED_NODE_TYPE, "T"),
        ];
        let groups = group_by_subject(triples);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "b");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "a");
    }

    #[test]
    fn test_data_property_key() {
        assert_eq!(data_property_key("data-property:manufacturer"), Some("manufacturer"));
        assert_eq!(data_property_key("label"), None);
        assert_eq!(data_property("x"), "data-property:x");
    }
}

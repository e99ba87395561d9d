//! Core domain types for tripleviz.
//!
//! Graph content is persisted only as `Triple` statements. `Node`, `Edge`
//! and `GraphData` are read-time projections rebuilt from those triples and
//! are never stored themselves.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Graph ─────────────────────────────────────────────────────────

/// Public identifier of a graph. Every triple and visibility set is scoped by one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(pub Uuid);

impl GraphId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GraphId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A graph: the unit of isolation for triples and visibility sets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    /// Internal storage key.
    pub key: i64,
    pub graph_id: GraphId,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Size summary of a graph's persisted content.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub triple_count: usize,
    pub node_count: usize,
    pub edge_count: usize,
    pub visibility_set_count: usize,
}

// ── Triples ───────────────────────────────────────────────────────

/// Whether a triple's object is a plain value or a reference to another subject.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Literal,
    Uri,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Literal => "literal",
            Self::Uri => "uri",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "literal" => Ok(Self::Literal),
            "uri" => Ok(Self::Uri),
            other => Err(format!("unsupported object type: {other}")),
        }
    }
}

/// Value tag carried alongside a `data-property` literal, decided at write time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Number,
    Bool,
    Json,
}

impl ValueKind {
    /// Classify a JSON value for storage.
    pub fn of(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(_) => Self::String,
            serde_json::Value::Number(_) => Self::Number,
            serde_json::Value::Bool(_) => Self::Bool,
            _ => Self::Json,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Json => "json",
        }
    }
}

impl FromStr for ValueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "bool" => Ok(Self::Bool),
            "json" => Ok(Self::Json),
            other => Err(format!("unsupported value kind: {other}")),
        }
    }
}

/// A single subject/predicate/object statement. The only durable form of graph content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Triple {
    pub graph_id: GraphId,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub object_type: ObjectType,
    /// Only set for `data-property` literals; `None` on vocabulary triples and legacy rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_kind: Option<ValueKind>,
}

impl Triple {
    pub fn literal(
        graph_id: GraphId,
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            graph_id,
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            object_type: ObjectType::Literal,
            value_kind: None,
        }
    }

    pub fn uri(
        graph_id: GraphId,
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            object_type: ObjectType::Uri,
            ..Self::literal(graph_id, subject, predicate, object)
        }
    }

    pub fn with_value_kind(mut self, kind: ValueKind) -> Self {
        self.value_kind = Some(kind);
        self
    }
}

// ── Reconstructed views ───────────────────────────────────────────

/// A node as seen by rendering. Rebuilt from triples on every read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
    pub x: f64,
    pub y: f64,
}

/// An edge as seen by rendering, synthesized from a `connects-to` triple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: String,
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
}

/// The metadata recorded on an edge entity's own subject at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EdgeRecord {
    pub id: String,
    pub source: Option<String>,
    pub target: Option<String>,
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub edge_type: String,
}

/// Full node/edge view of one graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphData {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub node_count: usize,
    pub edge_count: usize,
    pub visible_node_ids: Vec<String>,
}

/// Input for creating a node. `id` is generated when not supplied.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewNode {
    #[serde(default)]
    pub id: Option<String>,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

/// Input for creating an edge. `id` is generated when not supplied.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewEdge {
    #[serde(default)]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub edge_type: String,
}

/// Partial update of a node's label, type, and data properties.
///
/// In `data`, a key mapped to JSON `null` removes that property; every other
/// key overwrites. Keys not mentioned are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodePatch {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default, rename = "type")]
    pub node_type: Option<String>,
    #[serde(default)]
    pub data: Option<BTreeMap<String, serde_json::Value>>,
}

impl NodePatch {
    pub fn is_empty(&self) -> bool {
        self.label.is_none() && self.node_type.is_none() && self.data.is_none()
    }
}

// ── Visibility sets ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VisibilitySetId(pub Uuid);

impl VisibilitySetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VisibilitySetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VisibilitySetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VisibilitySetId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// What a caller supplies to create a visibility set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisibilityDefinition {
    pub name: String,
    pub query: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A named, persisted query selecting which node ids are rendered.
/// At most one per graph is active.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisibilitySet {
    pub set_id: VisibilitySetId,
    pub graph_id: GraphId,
    pub name: String,
    pub query: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_type_round_trips_through_str() {
        assert_eq!("literal".parse::<ObjectType>(), Ok(ObjectType::Literal));
        assert_eq!("uri".parse::<ObjectType>(), Ok(ObjectType::Uri));
        assert!("blank".parse::<ObjectType>().is_err());
    }

    #[test]
    fn value_kind_classifies_json() {
        assert_eq!(ValueKind::of(&serde_json::json!("a")), ValueKind::String);
        assert_eq!(ValueKind::of(&serde_json::json!(4.5)), ValueKind::Number);
        assert_eq!(ValueKind::of(&serde_json::json!(true)), ValueKind::Bool);
        assert_eq!(ValueKind::of(&serde_json::json!([1, 2])), ValueKind::Json);
        assert_eq!(ValueKind::of(&serde_json::json!(null)), ValueKind::Json);
    }

    #[test]
    fn node_serializes_type_field() {
        let node = Node {
            id: "n1".to_string(),
            label: "Pump A".to_string(),
            node_type: "Equipment".to_string(),
            data: BTreeMap::new(),
            x: 10.0,
            y: 20.0,
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "Equipment");
        assert!(json.get("node_type").is_none());
    }

    #[test]
    fn graph_data_uses_camel_case() {
        let json = serde_json::to_value(GraphData::default()).unwrap();
        assert!(json.get("nodeCount").is_some());
        assert!(json.get("visibleNodeIds").is_some());
    }

    #[test]
    fn uri_triple_keeps_fields() {
        let gid = GraphId::new();
        let t = Triple::uri(gid, "a", "connects-to", "b");
        assert_eq!(t.object_type, ObjectType::Uri);
        assert_eq!(t.subject, "a");
        assert_eq!(t.value_kind, None);
    }

    #[test]
    fn empty_patch_detected() {
        assert!(NodePatch::default().is_empty());
        let patch = NodePatch {
            label: Some("x".to_string()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}

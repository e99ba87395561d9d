//! Visibility query engine.
//!
//! Query text is classified once into a closed set of shapes and then
//! evaluated against the predicate index:
//!
//! | Shape | Example | Selects |
//! |-------|---------|---------|
//! | select all | `SELECT ?s WHERE { ?s ?p ?o }`, `*`, empty | every node |
//! | type filter | `?s rdf:type <Pump>`, `rdf:type "Heat Exchanger"` | nodes whose `node-type` contains the term, case-insensitively |
//! | has property | `hasProperty "manufacturer"` | nodes with a `data-property:manufacturer` triple |
//!
//! Anything else is `UnsupportedQueryShape`. Whether that becomes an error
//! or a "select all" is decided by the store's `UnrecognizedQueryPolicy`.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection};

use tripleviz_core::{GraphId, UnrecognizedQueryPolicy};

use crate::codec::{self, PRED_NODE_TYPE, PRED_TYPE, TYPE_NODE};
use crate::graphs::require_graph_tx;
use crate::store::{GraphError, GraphStore, Result};

static TYPE_FILTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)rdf:type\s+(?:<(?P<iri>[^<>]+)>|"(?P<double>[^"]+)"|'(?P<single>[^']+)'|(?P<bare>[^\s<>"'{}]+))"#,
    )
    .expect("type filter pattern")
});

static HAS_PROPERTY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)hasProperty\s*\(?\s*["']([^"']+)["']"#).expect("has-property pattern")
});

static SELECT_ALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)^select\s+(\*|\?\w+(\s+\?\w+)*)\s+where\s*\{\s*\?\w+\s+\?\w+\s+\?\w+\s*\.?\s*\}$",
    )
    .expect("select-all pattern")
});

/// A recognized visibility query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityQuery {
    SelectAll,
    /// Case-insensitive substring of the `node-type` object.
    TypeFilter(String),
    /// Key of a `data-property:<key>` predicate.
    HasProperty(String),
}

impl VisibilityQuery {
    /// Classify query text.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();

        if let Some(caps) = TYPE_FILTER.captures(trimmed) {
            let type_name = if let Some(iri) = caps.name("iri") {
                iri_local_name(iri.as_str())
            } else if let Some(quoted) = caps.name("double").or_else(|| caps.name("single")) {
                quoted.as_str().trim()
            } else {
                caps.name("bare").map_or("", |m| prefixed_local_name(m.as_str()))
            };
            if !type_name.is_empty() {
                return Ok(Self::TypeFilter(type_name.to_string()));
            }
        }

        if let Some(caps) = HAS_PROPERTY.captures(trimmed) {
            let key = caps[1].trim();
            if !key.is_empty() {
                return Ok(Self::HasProperty(key.to_string()));
            }
        }

        if trimmed.is_empty()
            || trimmed == "*"
            || trimmed.eq_ignore_ascii_case("all")
            || SELECT_ALL.is_match(trimmed)
        {
            return Ok(Self::SelectAll);
        }

        Err(GraphError::UnsupportedQueryShape(trimmed.to_string()))
    }
}

impl FromStr for VisibilityQuery {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for VisibilityQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelectAll => f.write_str("SELECT ?s WHERE { ?s ?p ?o }"),
            Self::TypeFilter(t) => write!(f, "?s rdf:type \"{t}\""),
            Self::HasProperty(p) => write!(f, "hasProperty \"{p}\""),
        }
    }
}

/// Last segment of a bracketed IRI: `<http://ex.org/Pump>` and `<ex:Pump>`
/// yield `Pump`, `<Centrifugal Pump>` is kept whole.
fn iri_local_name(iri: &str) -> &str {
    let iri = iri.trim();
    iri.rsplit(|c| c == ':' || c == '#' || c == '/')
        .next()
        .unwrap_or(iri)
        .trim()
}

/// Bare terms lose a trailing `.` and a `prefix:` only: `ex:Pump` yields
/// `Pump`, `Heat/Cool` is kept whole.
fn prefixed_local_name(term: &str) -> &str {
    let term = term.trim_end_matches('.');
    term.split_once(':').map_or(term, |(_, local)| local)
}

impl GraphStore {
    /// Evaluate query text against a graph, returning matching node ids
    /// without duplicates, in insertion order.
    pub fn evaluate_query(&self, graph_id: &GraphId, text: &str) -> Result<Vec<String>> {
        let query = self.resolve_query(text)?;
        self.evaluate(graph_id, &query)
    }

    /// Evaluate an already-parsed query.
    pub fn evaluate(&self, graph_id: &GraphId, query: &VisibilityQuery) -> Result<Vec<String>> {
        let conn = self.conn();
        require_graph_tx(&conn, graph_id)?;
        let ids = evaluate_tx(&conn, graph_id, query)?;
        tracing::debug!(graph_id = %graph_id, %query, matched = ids.len(), "Query evaluated");
        Ok(ids)
    }

    /// Parse query text, applying the configured policy to unrecognized shapes.
    pub fn resolve_query(&self, text: &str) -> Result<VisibilityQuery> {
        match VisibilityQuery::parse(text) {
            Ok(query) => Ok(query),
            Err(GraphError::UnsupportedQueryShape(shape)) => match self.query_config().unrecognized
            {
                UnrecognizedQueryPolicy::SelectAll => {
                    tracing::warn!(query = %shape, "Unrecognized query shape, selecting all nodes");
                    Ok(VisibilityQuery::SelectAll)
                }
                UnrecognizedQueryPolicy::Reject => Err(GraphError::UnsupportedQueryShape(shape)),
            },
            Err(other) => Err(other),
        }
    }
}

pub(crate) fn evaluate_tx(
    conn: &Connection,
    graph_id: &GraphId,
    query: &VisibilityQuery,
) -> Result<Vec<String>> {
    let gid = graph_id.to_string();
    let candidates: Vec<String> = match query {
        VisibilityQuery::SelectAll => {
            let mut stmt = conn.prepare_cached(
                "SELECT subject FROM triples
                 WHERE graph_id = ?1 AND predicate = ?2 AND object = ?3
                 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![gid, PRED_TYPE, TYPE_NODE], |row| row.get(0))?;
            let ids = rows.collect::<rusqlite::Result<Vec<String>>>()?;
            ids
        }
        VisibilityQuery::TypeFilter(type_name) => {
            let needle = type_name.to_lowercase();
            let mut stmt = conn.prepare_cached(
                "SELECT t.subject, t.object FROM triples t
                 WHERE t.graph_id = ?1 AND t.predicate = ?2
                   AND EXISTS (SELECT 1 FROM triples n
                               WHERE n.graph_id = t.graph_id AND n.subject = t.subject
                                 AND n.predicate = ?3 AND n.object = ?4)
                 ORDER BY t.id",
            )?;
            let rows = stmt.query_map(params![gid, PRED_NODE_TYPE, PRED_TYPE, TYPE_NODE], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut matched = Vec::new();
            for row in rows {
                let (subject, node_type) = row?;
                if node_type.to_lowercase().contains(&needle) {
                    matched.push(subject);
                }
            }
            matched
        }
        VisibilityQuery::HasProperty(key) => {
            let mut stmt = conn.prepare_cached(
                "SELECT t.subject FROM triples t
                 WHERE t.graph_id = ?1 AND t.predicate = ?2
                   AND EXISTS (SELECT 1 FROM triples n
                               WHERE n.graph_id = t.graph_id AND n.subject = t.subject
                                 AND n.predicate = ?3 AND n.object = ?4)
                 ORDER BY t.id",
            )?;
            let rows = stmt.query_map(
                params![gid, codec::data_property(key), PRED_TYPE, TYPE_NODE],
                |row| row.get(0),
            )?;
            let ids = rows.collect::<rusqlite::Result<Vec<String>>>()?;
            ids
        }
    };

    let mut seen = HashSet::new();
    Ok(candidates
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripleviz_core::{NewNode, QueryConfig};

    #[test]
    fn test_parse_type_filter_variants() {
        for text in [
            "?s rdf:type <Pump>",
            "SELECT ?s WHERE { ?s rdf:type <http://example.org/Pump> }",
            "?s rdf:type ex:Pump .",
            "rdf:type Pump",
            "RDF:TYPE \"Pump\"",
        ] {
            assert_eq!(
                VisibilityQuery::parse(text).unwrap(),
                VisibilityQuery::TypeFilter("Pump".to_string()),
                "{text}"
            );
        }
    }

    #[test]
    fn test_parse_type_filter_keeps_multi_word_and_slashed_terms() {
        for (text, expected) in [
            (r#"?s rdf:type "Centrifugal Pump""#, "Centrifugal Pump"),
            ("?s rdf:type 'Heat Exchanger' .", "Heat Exchanger"),
            ("?s rdf:type <Centrifugal Pump>", "Centrifugal Pump"),
            ("rdf:type Heat/Cool", "Heat/Cool"),
            (r#"rdf:type "Heat/Cool""#, "Heat/Cool"),
            ("?s rdf:type <http://example.org/plant#Valve>", "Valve"),
        ] {
            assert_eq!(
                VisibilityQuery::parse(text).unwrap(),
                VisibilityQuery::TypeFilter(expected.to_string()),
                "{text}"
            );
        }
    }

    #[test]
    fn test_parse_has_property() {
        assert_eq!(
            VisibilityQuery::parse(r#"?s hasProperty "manufacturer""#).unwrap(),
            VisibilityQuery::HasProperty("manufacturer".to_string())
        );
        assert_eq!(
            VisibilityQuery::parse("hasProperty('serial number')").unwrap(),
            VisibilityQuery::HasProperty("serial number".to_string())
        );
    }

    #[test]
    fn test_parse_select_all() {
        for text in [
            "",
            "  ",
            "*",
            "ALL",
            "SELECT ?s WHERE { ?s ?p ?o }",
            "select * where {?s ?p ?o .}",
            "SELECT ?s ?p ?o WHERE {\n  ?s ?p ?o\n}",
        ] {
            assert_eq!(
                VisibilityQuery::parse(text).unwrap(),
                VisibilityQuery::SelectAll,
                "{text:?}"
            );
        }
    }

    #[test]
    fn test_parse_unrecognized() {
        let err = VisibilityQuery::parse("SELECT ?s WHERE { ?s ex:owns ?o }").unwrap_err();
        assert!(matches!(err, GraphError::UnsupportedQueryShape(_)));
    }

    #[test]
    fn test_display_parses_back() {
        for query in [
            VisibilityQuery::SelectAll,
            VisibilityQuery::TypeFilter("Valve".to_string()),
            VisibilityQuery::TypeFilter("Heat/Cool Unit".to_string()),
            VisibilityQuery::HasProperty("size".to_string()),
        ] {
            assert_eq!(query.to_string().parse::<VisibilityQuery>().unwrap(), query);
        }
    }

    fn store_with_nodes() -> (GraphStore, GraphId) {
        let store = GraphStore::in_memory().unwrap();
        let gid = store.create_graph("plant", "").unwrap().graph_id;
        let mut pump = NewNode {
            id: Some("p1".to_string()),
            label: "Pump A".to_string(),
            node_type: "Centrifugal Pump".to_string(),
            ..Default::default()
        };
        pump.data
            .insert("manufacturer".to_string(), serde_json::json!("Acme"));
        store.create_node(&gid, &pump).unwrap();
        store
            .create_node(
                &gid,
                &NewNode {
                    id: Some("p2".to_string()),
                    label: "Pump B".to_string(),
                    node_type: "pump".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .create_node(
                &gid,
                &NewNode {
                    id: Some("v1".to_string()),
                    label: "Valve".to_string(),
                    node_type: "Valve".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        (store, gid)
    }

    #[test]
    fn test_evaluate_shapes() {
        let (store, gid) = store_with_nodes();
        assert_eq!(
            store.evaluate_query(&gid, "*").unwrap(),
            vec!["p1", "p2", "v1"]
        );
        assert_eq!(
            store.evaluate_query(&gid, "rdf:type Pump").unwrap(),
            vec!["p1", "p2"]
        );
        assert_eq!(
            store
                .evaluate_query(&gid, r#"rdf:type "Centrifugal Pump""#)
                .unwrap(),
            vec!["p1"]
        );
        assert_eq!(
            store
                .evaluate_query(&gid, r#"hasProperty "manufacturer""#)
                .unwrap(),
            vec!["p1"]
        );
        assert!(store
            .evaluate_query(&gid, r#"hasProperty "colour""#)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_unrecognized_policy() {
        let (store, gid) = store_with_nodes();
        assert_eq!(store.evaluate_query(&gid, "owns ?o").unwrap().len(), 3);

        let strict = store.with_query_config(QueryConfig {
            unrecognized: UnrecognizedQueryPolicy::Reject,
        });
        assert!(matches!(
            strict.evaluate_query(&gid, "owns ?o"),
            Err(GraphError::UnsupportedQueryShape(_))
        ));
    }

    #[test]
    fn test_evaluate_missing_graph() {
        let store = GraphStore::in_memory().unwrap();
        assert!(store
            .evaluate_query(&GraphId::new(), "*")
            .unwrap_err()
            .is_not_found());
    }
}

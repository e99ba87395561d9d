//! Triple-level reads and writes.
//!
//! No validation of predicate or object shape happens here; that belongs to
//! the codec. The `*_tx` helpers take a bare connection so mutations can
//! compose them inside one transaction.

use rusqlite::{params, Connection, OptionalExtension, Row};

use tripleviz_core::{GraphId, ObjectType, Triple, ValueKind};

use crate::codec::REFERENCE_PREDICATES;
use crate::store::{GraphError, GraphStore, Result};

const TRIPLE_COLUMNS: &str = "graph_id, subject, predicate, object, object_type, value_kind";

impl GraphStore {
    /// Append one triple.
    pub fn put(&self, triple: &Triple) -> Result<Triple> {
        let conn = self.conn();
        insert_triple_tx(&conn, triple)?;
        Ok(triple.clone())
    }

    /// All triples of a graph in insertion order.
    pub fn scan(&self, graph_id: &GraphId) -> Result<Vec<Triple>> {
        let conn = self.conn();
        scan_graph_tx(&conn, graph_id)
    }

    /// All triples about one subject in insertion order.
    pub fn scan_subject(&self, subject: &str) -> Result<Vec<Triple>> {
        let conn = self.conn();
        scan_subject_tx(&conn, subject)
    }

    /// Overwrite the object of every `(subject, predicate)` triple in place,
    /// keeping its value tag. Returns whether any triple matched.
    pub fn update(&self, subject: &str, predicate: &str, new_object: &str) -> Result<bool> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE triples SET object = ?3 WHERE subject = ?1 AND predicate = ?2",
            params![subject, predicate, new_object],
        )?;
        Ok(changed > 0)
    }

    /// Delete every triple that has `id` as its subject, or that references
    /// it through `connects-to`, `edge-source` or `edge-target`.
    pub fn delete_by_subject_or_object(&self, id: &str) -> Result<usize> {
        let conn = self.conn();
        delete_by_subject_or_object_tx(&conn, id)
    }

    /// Delete every triple of a graph. Returns whether any were removed.
    pub fn delete_by_graph(&self, graph_id: &GraphId) -> Result<bool> {
        let conn = self.conn();
        let deleted = conn.execute(
            "DELETE FROM triples WHERE graph_id = ?1",
            params![graph_id.to_string()],
        )?;
        tracing::debug!(graph_id = %graph_id, deleted, "Graph triples deleted");
        Ok(deleted > 0)
    }

    /// Number of triples stored for a graph.
    pub fn triple_count(&self, graph_id: &GraphId) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM triples WHERE graph_id = ?1",
            params![graph_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

// ── Transaction-scoped helpers ───────────────────────────────────

pub(crate) fn insert_triple_tx(conn: &Connection, triple: &Triple) -> Result<()> {
    conn.execute(
        "INSERT INTO triples (graph_id, subject, predicate, object, object_type, value_kind)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            triple.graph_id.to_string(),
            triple.subject,
            triple.predicate,
            triple.object,
            triple.object_type.as_str(),
            triple.value_kind.map(|k| k.as_str()),
        ],
    )?;
    tracing::trace!(
        subject = %triple.subject,
        predicate = %triple.predicate,
        "Triple inserted"
    );
    Ok(())
}

pub(crate) fn scan_graph_tx(conn: &Connection, graph_id: &GraphId) -> Result<Vec<Triple>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {TRIPLE_COLUMNS} FROM triples WHERE graph_id = ?1 ORDER BY id"
    ))?;
    let rows = stmt.query_map(params![graph_id.to_string()], triple_from_row)?;
    collect_triples(rows)
}

pub(crate) fn scan_subject_tx(conn: &Connection, subject: &str) -> Result<Vec<Triple>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {TRIPLE_COLUMNS} FROM triples WHERE subject = ?1 ORDER BY id"
    ))?;
    let rows = stmt.query_map(params![subject], triple_from_row)?;
    collect_triples(rows)
}

/// Graph owning the subject that carries `type = <entity_type>`, if any.
pub(crate) fn entity_graph_tx(
    conn: &Connection,
    subject: &str,
    entity_type: &str,
) -> Result<Option<GraphId>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT graph_id FROM triples
             WHERE subject = ?1 AND predicate = ?2 AND object = ?3
             ORDER BY id LIMIT 1",
            params![subject, crate::codec::PRED_TYPE, entity_type],
            |row| row.get(0),
        )
        .optional()?;

    raw.map(|s| parse_graph_id(&s)).transpose()
}

pub(crate) fn update_object_tx(
    conn: &Connection,
    subject: &str,
    predicate: &str,
    new_object: &str,
    value_kind: Option<ValueKind>,
) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE triples SET object = ?3, value_kind = ?4
         WHERE subject = ?1 AND predicate = ?2",
        params![subject, predicate, new_object, value_kind.map(|k| k.as_str())],
    )?;
    Ok(changed)
}

/// Overwrite `(subject, predicate)` in place, inserting `triple` when absent.
pub(crate) fn upsert_tx(conn: &Connection, triple: &Triple) -> Result<()> {
    let changed = update_object_tx(
        conn,
        &triple.subject,
        &triple.predicate,
        &triple.object,
        triple.value_kind,
    )?;
    if changed == 0 {
        insert_triple_tx(conn, triple)?;
    }
    Ok(())
}

pub(crate) fn delete_predicate_tx(
    conn: &Connection,
    subject: &str,
    predicate: &str,
) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM triples WHERE subject = ?1 AND predicate = ?2",
        params![subject, predicate],
    )?;
    Ok(deleted)
}

pub(crate) fn delete_subject_tx(conn: &Connection, subject: &str) -> Result<usize> {
    let deleted = conn.execute("DELETE FROM triples WHERE subject = ?1", params![subject])?;
    Ok(deleted)
}

pub(crate) fn delete_by_subject_or_object_tx(conn: &Connection, id: &str) -> Result<usize> {
    let [connects, source, target] = REFERENCE_PREDICATES;
    let deleted = conn.execute(
        "DELETE FROM triples
         WHERE subject = ?1
            OR (object = ?1 AND object_type = 'uri' AND predicate IN (?2, ?3, ?4))",
        params![id, connects, source, target],
    )?;
    tracing::debug!(id, deleted, "Triples deleted by subject or object");
    Ok(deleted)
}

/// Delete a node's own triples and the references to it, within one graph.
pub(crate) fn delete_node_tx(conn: &Connection, graph_id: &GraphId, id: &str) -> Result<usize> {
    let [connects, source, target] = REFERENCE_PREDICATES;
    let deleted = conn.execute(
        "DELETE FROM triples
         WHERE graph_id = ?2
           AND (subject = ?1
                OR (object = ?1 AND object_type = 'uri' AND predicate IN (?3, ?4, ?5)))",
        params![id, graph_id.to_string(), connects, source, target],
    )?;
    Ok(deleted)
}

// ── Row mapping ──────────────────────────────────────────────────

fn triple_from_row(row: &Row<'_>) -> rusqlite::Result<RawTriple> {
    Ok(RawTriple {
        graph_id: row.get(0)?,
        subject: row.get(1)?,
        predicate: row.get(2)?,
        object: row.get(3)?,
        object_type: row.get(4)?,
        value_kind: row.get(5)?,
    })
}

/// A triple row before its enum columns are interpreted.
struct RawTriple {
    graph_id: String,
    subject: String,
    predicate: String,
    object: String,
    object_type: String,
    value_kind: Option<String>,
}

impl RawTriple {
    /// Unknown `object_type` or `value_kind` strings are recovered locally:
    /// the triple is kept as an untagged literal and a warning is logged.
    fn into_triple(self) -> Result<Triple> {
        let graph_id = parse_graph_id(&self.graph_id)?;

        let object_type = self.object_type.parse::<ObjectType>().unwrap_or_else(|reason| {
            warn_malformed(&self.subject, &self.predicate, reason);
            ObjectType::Literal
        });

        let value_kind = self.value_kind.as_deref().and_then(|raw| {
            raw.parse::<ValueKind>()
                .map_err(|reason| warn_malformed(&self.subject, &self.predicate, reason))
                .ok()
        });

        Ok(Triple {
            graph_id,
            subject: self.subject,
            predicate: self.predicate,
            object: self.object,
            object_type,
            value_kind,
        })
    }
}

fn warn_malformed(subject: &str, predicate: &str, reason: String) {
    let err = GraphError::MalformedTriple {
        subject: subject.to_string(),
        predicate: predicate.to_string(),
        reason,
    };
    tracing::warn!(error = %err, "Recovered malformed triple");
}

fn collect_triples(
    rows: impl Iterator<Item = rusqlite::Result<RawTriple>>,
) -> Result<Vec<Triple>> {
    let mut triples = Vec::new();
    for row in rows {
        triples.push(row?.into_triple()?);
    }
    Ok(triples)
}

pub(crate) fn parse_graph_id(raw: &str) -> Result<GraphId> {
    raw.parse::<GraphId>()
        .map_err(|e| GraphError::Serialization(format!("invalid graph id {raw:?}: {e}")))
}

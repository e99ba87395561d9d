//! tripleviz-graph: the triple store behind tripleviz.
//!
//! This crate is the single mutation point for graph content. Nodes and
//! edges are never stored as rows: they are encoded into subject/predicate/
//! object triples on write and reconstructed from those triples on every
//! read. Visibility sets and the query shapes they use live here too.

pub mod codec;
pub mod graphs;
pub mod mutations;
pub mod query;
pub mod reconstruct;
pub mod store;
pub mod triples;
pub mod visibility;

pub use query::VisibilityQuery;
pub use store::{GraphError, GraphStore, Result};

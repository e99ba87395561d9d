//! tripleviz-core: Shared types, configuration, and error handling for tripleviz.
//!
//! This crate provides the foundational types used across all tripleviz components:
//! - Graph metadata and the persisted `Triple` statement
//! - Reconstructed `Node` / `Edge` views and the `GraphData` bundle handed to rendering
//! - Visibility set definitions
//! - Configuration management
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use crate::config::{
    LogConfig, QueryConfig, StoreConfig, TriplevizConfig, UnrecognizedQueryPolicy,
};
pub use error::{Result, TriplevizError};
pub use types::{
    Edge, EdgeRecord, Graph, GraphData, GraphId, GraphStats, NewEdge, NewNode, Node, NodePatch,
    ObjectType, Triple, ValueKind, VisibilityDefinition, VisibilitySet, VisibilitySetId,
};

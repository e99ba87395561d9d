//! Subcommand definitions and their dispatch onto the graph store.
//!
//! Every command produces a JSON value; `main` prints it.

use std::collections::BTreeMap;

use clap::{Args, Subcommand};
use serde_json::{json, Value};

use tripleviz_core::{
    GraphId, NewEdge, NewNode, NodePatch, VisibilityDefinition, VisibilitySetId,
};
use tripleviz_graph::{GraphError, GraphStore};

#[derive(Subcommand)]
pub enum Command {
    /// Create, inspect, and delete graphs.
    #[command(subcommand)]
    Graph(GraphCommand),

    /// Add, read, move, patch, and delete nodes.
    #[command(subcommand)]
    Node(NodeCommand),

    /// Add, read, and delete edges.
    #[command(subcommand)]
    Edge(EdgeCommand),

    /// Print the reconstructed node/edge view of a graph.
    View {
        graph_id: GraphId,

        /// Narrow `visibleNodeIds` to the active visibility set.
        #[arg(long)]
        filtered: bool,
    },

    /// Evaluate visibility query text and print the matching node ids.
    Query { graph_id: GraphId, text: String },

    /// Manage named visibility sets.
    #[command(subcommand)]
    Visibility(VisibilityCommand),
}

#[derive(Subcommand)]
pub enum GraphCommand {
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    List,
    Show {
        graph_id: GraphId,
    },
    Update {
        graph_id: GraphId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Delete {
        graph_id: GraphId,
    },
    /// Triple, node, edge, and visibility set counts.
    Stats {
        graph_id: GraphId,
    },
}

#[derive(Subcommand)]
pub enum NodeCommand {
    Add(NodeAddArgs),
    Get {
        id: String,
    },
    /// Set a node's position.
    Move {
        id: String,
        #[arg(allow_negative_numbers = true)]
        x: f64,
        #[arg(allow_negative_numbers = true)]
        y: f64,
    },
    /// Patch label, type, or data. A data key set to null is removed.
    Update {
        id: String,
        #[arg(long)]
        label: Option<String>,
        #[arg(long = "type")]
        node_type: Option<String>,
        #[arg(long, value_parser = parse_data)]
        data: Option<DataMap>,
    },
    Delete {
        id: String,
    },
}

#[derive(Args)]
pub struct NodeAddArgs {
    pub graph_id: GraphId,

    /// Node id; a UUID is generated when omitted.
    #[arg(long)]
    pub id: Option<String>,

    #[arg(long)]
    pub label: String,

    #[arg(long = "type")]
    pub node_type: String,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub x: f64,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub y: f64,

    /// Data properties as a JSON object.
    #[arg(long, value_parser = parse_data)]
    pub data: Option<DataMap>,
}

#[derive(Subcommand)]
pub enum EdgeCommand {
    Add {
        graph_id: GraphId,
        source: String,
        target: String,
        #[arg(long = "type")]
        edge_type: String,
        #[arg(long)]
        label: Option<String>,
        /// Edge id; a UUID is generated when omitted.
        #[arg(long)]
        id: Option<String>,
    },
    Get {
        id: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand)]
pub enum VisibilityCommand {
    Create {
        graph_id: GraphId,
        name: String,
        query: String,
        #[arg(long)]
        description: Option<String>,
    },
    List {
        graph_id: GraphId,
    },
    Show {
        set_id: VisibilitySetId,
    },
    /// Print the active set of a graph, or null.
    Active {
        graph_id: GraphId,
    },
    Activate {
        graph_id: GraphId,
        set_id: VisibilitySetId,
    },
    Deactivate {
        graph_id: GraphId,
    },
    Delete {
        set_id: VisibilitySetId,
    },
}

pub type DataMap = BTreeMap<String, Value>;

fn parse_data(raw: &str) -> Result<DataMap, String> {
    serde_json::from_str(raw).map_err(|e| format!("expected a JSON object: {e}"))
}

pub fn execute(store: &GraphStore, command: Command) -> anyhow::Result<Value> {
    let output = match command {
        Command::Graph(cmd) => graph(store, cmd)?,
        Command::Node(cmd) => node(store, cmd)?,
        Command::Edge(cmd) => edge(store, cmd)?,
        Command::View { graph_id, filtered } => {
            let data = if filtered {
                store.get_filtered_visualization_data(&graph_id)?
            } else {
                store.get_visualization_data(&graph_id)?
            };
            serde_json::to_value(data)?
        }
        Command::Query { graph_id, text } => {
            serde_json::to_value(store.evaluate_query(&graph_id, &text)?)?
        }
        Command::Visibility(cmd) => visibility(store, cmd)?,
    };
    Ok(output)
}

fn graph(store: &GraphStore, cmd: GraphCommand) -> anyhow::Result<Value> {
    Ok(match cmd {
        GraphCommand::Create { name, description } => {
            serde_json::to_value(store.create_graph(&name, &description)?)?
        }
        GraphCommand::List => serde_json::to_value(store.list_graphs()?)?,
        GraphCommand::Show { graph_id } => serde_json::to_value(store.get_graph(&graph_id)?)?,
        GraphCommand::Update {
            graph_id,
            name,
            description,
        } => serde_json::to_value(store.update_graph(
            &graph_id,
            name.as_deref(),
            description.as_deref(),
        )?)?,
        GraphCommand::Delete { graph_id } => {
            json!({ "deleted": store.delete_graph(&graph_id)? })
        }
        GraphCommand::Stats { graph_id } => serde_json::to_value(store.graph_stats(&graph_id)?)?,
    })
}

fn node(store: &GraphStore, cmd: NodeCommand) -> anyhow::Result<Value> {
    Ok(match cmd {
        NodeCommand::Add(args) => {
            let new = NewNode {
                id: args.id,
                label: args.label,
                node_type: args.node_type,
                data: args.data.unwrap_or_default(),
                x: args.x,
                y: args.y,
            };
            json!({ "id": store.create_node(&args.graph_id, &new)? })
        }
        NodeCommand::Get { id } => serde_json::to_value(store.get_node(&id)?)?,
        NodeCommand::Move { id, x, y } => require(store.update_node_position(&id, x, y)?, &id)?,
        NodeCommand::Update {
            id,
            label,
            node_type,
            data,
        } => {
            let patch = NodePatch {
                label,
                node_type,
                data,
            };
            if patch.is_empty() {
                anyhow::bail!("Nothing to update: pass --label, --type, or --data");
            }
            require(store.update_node_properties(&id, &patch)?, &id)?
        }
        NodeCommand::Delete { id } => json!({ "deleted": store.delete_node(&id)? }),
    })
}

fn edge(store: &GraphStore, cmd: EdgeCommand) -> anyhow::Result<Value> {
    Ok(match cmd {
        EdgeCommand::Add {
            graph_id,
            source,
            target,
            edge_type,
            label,
            id,
        } => {
            let new = NewEdge {
                id,
                source,
                target,
                label,
                edge_type,
            };
            json!({ "id": store.create_edge(&graph_id, &new)? })
        }
        EdgeCommand::Get { id } => serde_json::to_value(store.get_edge(&id)?)?,
        EdgeCommand::Delete { id } => json!({ "deleted": store.delete_edge(&id)? }),
    })
}

fn visibility(store: &GraphStore, cmd: VisibilityCommand) -> anyhow::Result<Value> {
    Ok(match cmd {
        VisibilityCommand::Create {
            graph_id,
            name,
            query,
            description,
        } => {
            let definition = VisibilityDefinition {
                name,
                query,
                description,
            };
            serde_json::to_value(store.create_visibility_set(&graph_id, &definition)?)?
        }
        VisibilityCommand::List { graph_id } => {
            serde_json::to_value(store.list_visibility_sets(&graph_id)?)?
        }
        VisibilityCommand::Show { set_id } => {
            serde_json::to_value(store.get_visibility_set(&set_id)?)?
        }
        VisibilityCommand::Active { graph_id } => {
            serde_json::to_value(store.active_visibility_set(&graph_id)?)?
        }
        VisibilityCommand::Activate { graph_id, set_id } => {
            json!({ "activated": store.activate(&graph_id, &set_id)? })
        }
        VisibilityCommand::Deactivate { graph_id } => {
            json!({ "deactivated": store.deactivate(&graph_id)? })
        }
        VisibilityCommand::Delete { set_id } => {
            json!({ "deleted": store.delete_visibility_set(&set_id)? })
        }
    })
}

/// Turn a `false` "no such node" result into a not-found error.
fn require(updated: bool, id: &str) -> anyhow::Result<Value> {
    if updated {
        Ok(json!({ "updated": true }))
    } else {
        Err(GraphError::not_found("node", id).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_id(store: &GraphStore) -> GraphId {
        let out = execute(
            store,
            Command::Graph(GraphCommand::Create {
                name: "plant".into(),
                description: String::new(),
            }),
        )
        .unwrap();
        out["graphId"].as_str().unwrap().parse().unwrap()
    }

    #[test]
    fn test_add_nodes_edge_and_view() {
        let store = GraphStore::in_memory().unwrap();
        let gid = graph_id(&store);

        for id in ["a", "b"] {
            execute(
                &store,
                Command::Node(NodeCommand::Add(NodeAddArgs {
                    graph_id: gid,
                    id: Some(id.into()),
                    label: id.to_uppercase(),
                    node_type: "Thing".into(),
                    x: 1.0,
                    y: 2.0,
                    data: None,
                })),
            )
            .unwrap();
        }
        let out = execute(
            &store,
            Command::Edge(EdgeCommand::Add {
                graph_id: gid,
                source: "a".into(),
                target: "b".into(),
                edge_type: "flowsTo".into(),
                label: None,
                id: None,
            }),
        )
        .unwrap();
        assert!(out["id"].is_string());

        let view = execute(
            &store,
            Command::View {
                graph_id: gid,
                filtered: false,
            },
        )
        .unwrap();
        assert_eq!(view["nodeCount"], 2);
        assert_eq!(view["edges"][0]["id"], "a-b");
    }

    #[test]
    fn test_missing_node_surfaces_not_found() {
        let store = GraphStore::in_memory().unwrap();
        let err = execute(
            &store,
            Command::Node(NodeCommand::Move {
                id: "ghost".into(),
                x: 0.0,
                y: 0.0,
            }),
        )
        .unwrap_err();
        assert!(err
            .downcast_ref::<GraphError>()
            .is_some_and(GraphError::is_not_found));
    }

    #[test]
    fn test_empty_patch_rejected() {
        let store = GraphStore::in_memory().unwrap();
        let result = execute(
            &store,
            Command::Node(NodeCommand::Update {
                id: "n".into(),
                label: None,
                node_type: None,
                data: None,
            }),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_data_requires_object() {
        assert!(parse_data(r#"{"a": 1}"#).is_ok());
        assert!(parse_data("[1, 2]").is_err());
    }
}

// Flow spec wire format: the JSON DAG consumed by the execution engine

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The authoritative wire format for a workflow definition.
///
/// ```json
/// { "nodes": [ { "id": "n1", "type": "nodes.http.request",
///                "params": { "url": "{{inputs.url}}", "method": "GET" } } ],
///   "edges": [ { "from": "n1", "to": "n2" } ] }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FlowSpec {
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

/// A vertex in the DAG: unique id, dotted type name, arbitrary params tree.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NodeSpec {
    pub id: String,
    /// Dotted node type, e.g. `nodes.http.request`
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Handler version; `latest` resolves against the registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Directed dependency between two node ids.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EdgeSpec {
    pub from: String,
    pub to: String,
}

impl FlowSpec {
    /// Find every webhook trigger node in this spec.
    pub fn webhook_triggers(&self) -> impl Iterator<Item = &NodeSpec> {
        self.nodes
            .iter()
            .filter(|n| n.node_type == "nodes.webhook.trigger")
    }
}

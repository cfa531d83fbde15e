// Static node catalog: typed port contracts for UI tooling
// This is documentation-layer metadata; the dispatch bus is the runtime
// source of truth for what is actually registered.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Port type vocabulary for edge validation in UI tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PortType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Any,
    Json,
    HttpRequest,
    HttpResponse,
    OpenaiMessage,
    WebhookPayload,
}

impl PortType {
    /// Whether a value produced on a port of type `self` may feed a port of
    /// type `target`.
    ///
    /// `any` is bidirectionally compatible; `json` interchanges with
    /// object/array; structured payloads decay to `object`; an OpenAI message
    /// decays to `string`; object-shaped values may feed string/number ports
    /// to enable templating.
    pub fn compatible_with(self, target: PortType) -> bool {
        use PortType::*;
        if self == target || self == Any || target == Any {
            return true;
        }
        match (self, target) {
            (Json, Object) | (Json, Array) | (Object, Json) | (Array, Json) => true,
            (HttpResponse, Object) | (WebhookPayload, Object) => true,
            (OpenaiMessage, String) => true,
            (Object, String) | (Object, Number) => true,
            (Json, String) | (Json, Number) => true,
            (WebhookPayload, String) | (WebhookPayload, Number) => true,
            _ => false,
        }
    }
}

/// A typed input or output port on a catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Port {
    pub name: String,
    #[serde(rename = "type")]
    pub port_type: PortType,
    #[serde(default)]
    pub required: bool,
    pub description: Option<String>,
}

impl Port {
    fn required(name: &str, port_type: PortType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            port_type,
            required: true,
            description: Some(description.to_string()),
        }
    }

    fn optional(name: &str, port_type: PortType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            port_type,
            required: false,
            description: Some(description.to_string()),
        }
    }
}

/// Catalog entry: the port contract for one dotted node type.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CatalogEntry {
    pub node_type: String,
    pub category: String,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
}

/// The static catalog for the built-in node library.
pub fn builtin_catalog() -> Vec<CatalogEntry> {
    use PortType::*;
    vec![
        CatalogEntry {
            node_type: "nodes.http.request".into(),
            category: "network".into(),
            inputs: vec![
                Port::required("url", String, "Request URL"),
                Port::optional("method", String, "HTTP method, defaults to GET"),
                Port::optional("headers", Object, "Request headers"),
                Port::optional("body", Json, "Request body"),
            ],
            outputs: vec![Port::required(
                "response",
                HttpResponse,
                "Status, headers, and decoded data",
            )],
        },
        CatalogEntry {
            node_type: "nodes.transform.execute".into(),
            category: "data".into(),
            inputs: vec![Port::required(
                "code",
                String,
                "Assignment statements writing into the outputs bag",
            )],
            outputs: vec![Port::required("outputs", Json, "Whatever the code assigned")],
        },
        CatalogEntry {
            node_type: "nodes.condition.execute".into(),
            category: "logic".into(),
            inputs: vec![Port::required("condition", String, "Boolean expression")],
            outputs: vec![Port::required("result", Boolean, "Evaluation result")],
        },
        CatalogEntry {
            node_type: "nodes.database.query".into(),
            category: "data".into(),
            inputs: vec![
                Port::optional("connectionString", String, "Overrides the default database"),
                Port::required("query", String, "SQL text"),
                Port::optional("params", Array, "Positional query parameters"),
            ],
            outputs: vec![Port::required("rows", Array, "Result rows")],
        },
        CatalogEntry {
            node_type: "nodes.email.send".into(),
            category: "messaging".into(),
            inputs: vec![
                Port::required("to", String, "Recipient address"),
                Port::required("subject", String, "Subject line"),
                Port::optional("text", String, "Plain-text body"),
                Port::optional("html", String, "HTML body"),
                Port::optional("from", String, "Sender override"),
                Port::optional("cc", String, "CC addresses"),
                Port::optional("bcc", String, "BCC addresses"),
            ],
            outputs: vec![Port::required("messageId", String, "Provider message id")],
        },
        CatalogEntry {
            node_type: "nodes.openai.chat".into(),
            category: "ai".into(),
            inputs: vec![
                Port::required("model", String, "Model name"),
                Port::required("prompt", String, "User prompt"),
                Port::optional("systemPrompt", String, "System prompt"),
                Port::optional("temperature", Number, "Sampling temperature"),
                Port::optional("maxTokens", Number, "Completion token cap"),
                Port::optional("apiKey", String, "Overrides the configured key"),
            ],
            outputs: vec![Port::required("content", OpenaiMessage, "Assistant reply")],
        },
        CatalogEntry {
            node_type: "nodes.webhook.trigger".into(),
            category: "trigger".into(),
            inputs: vec![
                Port::required("path", String, "Webhook path to match"),
                Port::optional("method", String, "HTTP method to match"),
            ],
            outputs: vec![Port::required(
                "payload",
                WebhookPayload,
                "Request body, headers, and receipt timestamp",
            )],
        },
    ]
}

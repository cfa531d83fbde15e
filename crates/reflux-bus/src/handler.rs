//! Node handler trait and parameter schemas

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::address::SemVer;
use crate::error::NodeError;

/// Parameter type alphabet, mapped to form widgets by UI layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Any,
}

/// Schema for one handler parameter, rich enough to auto-generate forms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "enum")]
    pub choices: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParamSpec {
    pub fn required(name: &str, param_type: ParamType) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            required: true,
            default: None,
            min: None,
            max: None,
            choices: None,
            description: None,
        }
    }

    pub fn optional(name: &str, param_type: ParamType) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn with_choices(mut self, choices: Vec<Value>) -> Self {
        self.choices = Some(choices);
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

/// Introspectable schema for a registered handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSchema {
    /// Dotted node name, e.g. `nodes.http.request`
    pub name: String,
    pub version: SemVerString,
    pub description: String,
    pub params: Vec<ParamSpec>,
    /// Whether redelivery of the same call is safe
    pub idempotent: bool,
}

/// Serialized form of [`SemVer`]; keeps the wire format a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SemVerString(pub String);

impl From<SemVer> for SemVerString {
    fn from(v: SemVer) -> Self {
        SemVerString(v.to_string())
    }
}

impl NodeSchema {
    pub fn new(name: &str, version: SemVer, description: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.into(),
            description: description.to_string(),
            params: Vec::new(),
            idempotent: false,
        }
    }

    pub fn with_params(mut self, params: Vec<ParamSpec>) -> Self {
        self.params = params;
        self
    }

    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    pub fn semver(&self) -> SemVer {
        // Schemas are built from a SemVer, so this cannot fail for
        // registry-produced values.
        self.version.0.parse().unwrap_or(SemVer::V1)
    }
}

/// Execution-context metadata delivered to every handler unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchMeta {
    pub run_id: Uuid,
    pub step_id: String,
    /// The run's trigger inputs
    pub inputs: Value,
    /// Upstream node results keyed by node id
    pub nodes: Value,
}

impl DispatchMeta {
    pub fn new(run_id: Uuid, step_id: impl Into<String>) -> Self {
        Self {
            run_id,
            step_id: step_id.into(),
            inputs: Value::Null,
            nodes: Value::Null,
        }
    }
}

/// A leaf node implementation reachable through the bus.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Parameter schema for introspection and form generation.
    fn schema(&self) -> NodeSchema;

    /// Execute with resolved params and run metadata.
    async fn execute(&self, params: Value, meta: DispatchMeta) -> Result<Value, NodeError>;
}

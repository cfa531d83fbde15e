//! `nodes.webhook.trigger` — entry node for webhook-started runs
//!
//! The webhook router already captured the request into the run's inputs;
//! this node passes the payload through so downstream templates can address
//! it as a node output.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use reflux_bus::{DispatchMeta, NodeError, NodeHandler, NodeSchema, ParamSpec, ParamType, SemVer};

pub struct WebhookTriggerNode;

#[async_trait]
impl NodeHandler for WebhookTriggerNode {
    fn schema(&self) -> NodeSchema {
        NodeSchema::new(
            "nodes.webhook.trigger",
            SemVer::V1,
            "Expose the triggering HTTP request as the node output",
        )
        .with_params(vec![
            ParamSpec::required("path", ParamType::String)
                .with_description("Webhook path this flow listens on"),
            ParamSpec::optional("method", ParamType::String)
                .with_default(json!("POST")),
        ])
        .idempotent()
    }

    async fn execute(&self, _params: Value, meta: DispatchMeta) -> Result<Value, NodeError> {
        let inputs = &meta.inputs;
        Ok(json!({
            "method": inputs.get("method").cloned().unwrap_or(Value::Null),
            "path": inputs.get("path").cloned().unwrap_or(Value::Null),
            "headers": inputs.get("headers").cloned().unwrap_or(Value::Null),
            "query": inputs.get("query").cloned().unwrap_or(Value::Null),
            "body": inputs.get("body").cloned().unwrap_or(Value::Null),
            "receivedAt": Utc::now().to_rfc3339(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn passes_the_request_payload_through() {
        let mut meta = DispatchMeta::new(Uuid::now_v7(), "hook");
        meta.inputs = json!({
            "method": "POST",
            "path": "/ask-ai",
            "headers": { "content-type": "application/json" },
            "query": {},
            "body": { "q": "hi" },
        });

        let out = WebhookTriggerNode
            .execute(json!({ "path": "/ask-ai" }), meta)
            .await
            .unwrap();
        assert_eq!(out["body"], json!({ "q": "hi" }));
        assert_eq!(out["method"], "POST");
        assert!(out["receivedAt"].is_string());
    }
}

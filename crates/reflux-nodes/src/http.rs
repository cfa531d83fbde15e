//! `nodes.http.request` — outbound HTTP call

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use reflux_bus::{DispatchMeta, NodeError, NodeHandler, NodeSchema, ParamSpec, ParamType, SemVer};

pub struct HttpRequestNode {
    client: reqwest::Client,
}

impl HttpRequestNode {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client construction cannot fail with static config");
        Self { client }
    }
}

impl Default for HttpRequestNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeHandler for HttpRequestNode {
    fn schema(&self) -> NodeSchema {
        NodeSchema::new(
            "nodes.http.request",
            SemVer::V1,
            "Perform an HTTP request and decode the response",
        )
        .with_params(vec![
            ParamSpec::required("url", ParamType::String),
            ParamSpec::optional("method", ParamType::String)
                .with_default(json!("GET"))
                .with_choices(vec![
                    json!("GET"),
                    json!("POST"),
                    json!("PUT"),
                    json!("PATCH"),
                    json!("DELETE"),
                    json!("HEAD"),
                ]),
            ParamSpec::optional("headers", ParamType::Object),
            ParamSpec::optional("body", ParamType::Any),
        ])
    }

    async fn execute(&self, params: Value, _meta: DispatchMeta) -> Result<Value, NodeError> {
        let url = params
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::validation("url is required"))?;
        let method_name = params
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_uppercase();
        let method: reqwest::Method = method_name
            .parse()
            .map_err(|_| NodeError::validation(format!("invalid method: {method_name}")))?;

        let mut request = self.client.request(method, url);
        if let Some(headers) = params.get("headers").and_then(Value::as_object) {
            for (name, value) in headers {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                request = request.header(name.as_str(), text);
            }
        }
        if let Some(body) = params.get("body") {
            if !body.is_null() {
                request = match body {
                    Value::String(s) => request.body(s.clone()),
                    other => request.json(other),
                };
            }
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                NodeError::Timeout(format!("request to {url} timed out"))
            } else {
                NodeError::execution(format!("request to {url} failed: {err}"))
            }
        })?;

        let status = response.status().as_u16();
        let mut headers = Map::new();
        for (name, value) in response.headers() {
            headers.insert(
                name.to_string(),
                Value::String(value.to_str().unwrap_or_default().to_string()),
            );
        }

        // Decode JSON bodies as structures, anything else as text; non-2xx
        // responses are still a node success with their status visible.
        let text = response
            .text()
            .await
            .map_err(|err| NodeError::execution(format!("failed to read body: {err}")))?;
        let data = decode_body(text);

        Ok(json!({
            "status": status,
            "headers": headers,
            "data": data,
        }))
    }
}

/// JSON bodies become structures; anything else stays a plain string.
fn decode_body(text: String) -> Value {
    serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text))
}

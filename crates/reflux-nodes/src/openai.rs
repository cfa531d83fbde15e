//! `nodes.openai.chat` — chat completion against an OpenAI-compatible API

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use reflux_bus::{DispatchMeta, NodeError, NodeHandler, NodeSchema, ParamSpec, ParamType, SemVer};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI chat completion request format
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

pub struct OpenAiChatNode {
    client: reqwest::Client,
    base_url: String,
    default_api_key: Option<String>,
}

impl OpenAiChatNode {
    pub fn new(base_url: Option<String>, default_api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("reqwest client construction cannot fail with static config");
        Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            default_api_key,
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            std::env::var("OPENAI_BASE_URL").ok(),
            std::env::var("OPENAI_API_KEY").ok(),
        )
    }
}

#[async_trait]
impl NodeHandler for OpenAiChatNode {
    fn schema(&self) -> NodeSchema {
        NodeSchema::new(
            "nodes.openai.chat",
            SemVer::V1,
            "Single-turn chat completion",
        )
        .with_params(vec![
            ParamSpec::required("model", ParamType::String),
            ParamSpec::required("prompt", ParamType::String),
            ParamSpec::optional("systemPrompt", ParamType::String),
            ParamSpec::optional("temperature", ParamType::Number)
                .with_default(json!(0.7))
                .with_range(0.0, 2.0),
            ParamSpec::optional("maxTokens", ParamType::Number)
                .with_default(json!(1024))
                .with_range(1.0, 128_000.0),
            ParamSpec::optional("apiKey", ParamType::String)
                .with_description("Overrides the configured key"),
        ])
    }

    async fn execute(&self, params: Value, _meta: DispatchMeta) -> Result<Value, NodeError> {
        let model = params
            .get("model")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::validation("model is required"))?;
        let prompt = params
            .get("prompt")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::validation("prompt is required"))?;
        let api_key = params
            .get("apiKey")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .or_else(|| self.default_api_key.clone())
            .ok_or_else(|| NodeError::validation("no API key configured"))?;

        let mut messages = Vec::new();
        if let Some(system) = params.get("systemPrompt").and_then(Value::as_str) {
            messages.push(ChatMessage {
                role: "system",
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt.to_string(),
        });

        let request = ChatRequest {
            model: model.to_string(),
            messages,
            temperature: params
                .get("temperature")
                .and_then(Value::as_f64)
                .unwrap_or(0.7) as f32,
            max_tokens: params
                .get("maxTokens")
                .and_then(Value::as_u64)
                .unwrap_or(1024) as u32,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    NodeError::Timeout("chat completion timed out".to_string())
                } else {
                    NodeError::execution(format!("chat completion request failed: {err}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NodeError::execution(format!(
                "chat completion returned {status}: {body}"
            )));
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|err| NodeError::execution(format!("malformed completion: {err}")))?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| NodeError::execution("completion contained no choices"))?;

        let usage = completion.usage.map(|u| {
            json!({
                "promptTokens": u.prompt_tokens,
                "completionTokens": u.completion_tokens,
                "totalTokens": u.total_tokens,
            })
        });

        Ok(json!({
            "content": choice.message.content.unwrap_or_default(),
            "model": completion.model,
            "usage": usage,
            "finishReason": choice.finish_reason,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn missing_key_is_a_validation_error() {
        let node = OpenAiChatNode::new(None, None);
        let err = node
            .execute(
                json!({ "model": "gpt-test", "prompt": "hi" }),
                DispatchMeta::new(Uuid::now_v7(), "ai"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Validation(_)));
    }

    #[tokio::test]
    async fn model_and_prompt_are_required() {
        let node = OpenAiChatNode::new(None, Some("sk-test".to_string()));
        let err = node
            .execute(json!({ "model": "m" }), DispatchMeta::new(Uuid::now_v7(), "ai"))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Validation(_)));
    }
}

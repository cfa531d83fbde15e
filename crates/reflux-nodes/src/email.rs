//! `nodes.email.send` — SMTP delivery via lettre

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::{json, Value};
use uuid::Uuid;

use reflux_bus::{DispatchMeta, NodeError, NodeHandler, NodeSchema, ParamSpec, ParamType, SemVer};

/// SMTP relay configuration, read from `SMTP_*` env vars.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub default_from: String,
}

impl SmtpConfig {
    /// `None` when SMTP_HOST is unset; the email node then rejects sends.
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            host,
            port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(587),
            username: std::env::var("SMTP_USERNAME").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
            default_from: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| "reflux@localhost".to_string()),
        })
    }
}

pub struct EmailSendNode {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    default_from: String,
}

impl EmailSendNode {
    pub fn new(config: Option<SmtpConfig>) -> Result<Self, NodeError> {
        let Some(config) = config else {
            return Ok(Self {
                transport: None,
                default_from: String::new(),
            });
        };

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|err| {
                    NodeError::execution(format!("invalid SMTP relay {}: {err}", config.host))
                })?
                .port(config.port);
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: Some(builder.build()),
            default_from: config.default_from,
        })
    }
}

fn parse_mailboxes(value: Option<&Value>) -> Result<Vec<Mailbox>, NodeError> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let raw: Vec<String> = match value {
        Value::String(s) => s.split(',').map(|p| p.trim().to_string()).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect(),
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(NodeError::validation(format!(
                "expected an address string or array, got {other}"
            )))
        }
    };
    raw.into_iter()
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Mailbox>()
                .map_err(|err| NodeError::validation(format!("invalid address {s:?}: {err}")))
        })
        .collect()
}

#[async_trait]
impl NodeHandler for EmailSendNode {
    fn schema(&self) -> NodeSchema {
        NodeSchema::new("nodes.email.send", SemVer::V1, "Send an email over SMTP")
            .with_params(vec![
                ParamSpec::required("to", ParamType::String),
                ParamSpec::required("subject", ParamType::String),
                ParamSpec::optional("text", ParamType::String),
                ParamSpec::optional("html", ParamType::String),
                ParamSpec::optional("from", ParamType::String),
                ParamSpec::optional("cc", ParamType::String),
                ParamSpec::optional("bcc", ParamType::String),
            ])
    }

    async fn execute(&self, params: Value, _meta: DispatchMeta) -> Result<Value, NodeError> {
        let Some(transport) = &self.transport else {
            return Err(NodeError::validation(
                "SMTP is not configured (set SMTP_HOST)",
            ));
        };

        let to = parse_mailboxes(params.get("to"))?;
        if to.is_empty() {
            return Err(NodeError::validation("to is required"));
        }
        let subject = params
            .get("subject")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::validation("subject is required"))?;
        let text = params.get("text").and_then(Value::as_str);
        let html = params.get("html").and_then(Value::as_str);
        if text.is_none() && html.is_none() {
            return Err(NodeError::validation("one of text or html is required"));
        }

        let from: Mailbox = params
            .get("from")
            .and_then(Value::as_str)
            .unwrap_or(&self.default_from)
            .parse()
            .map_err(|err| NodeError::validation(format!("invalid from address: {err}")))?;

        let mut builder = Message::builder().from(from).subject(subject);
        for mailbox in &to {
            builder = builder.to(mailbox.clone());
        }
        for mailbox in parse_mailboxes(params.get("cc"))? {
            builder = builder.cc(mailbox);
        }
        for mailbox in parse_mailboxes(params.get("bcc"))? {
            builder = builder.bcc(mailbox);
        }

        let message_id = format!("<{}@reflux>", Uuid::now_v7());
        builder = builder.message_id(Some(message_id.clone()));

        let message = match (text, html) {
            (Some(text), Some(html)) => builder
                .multipart(MultiPart::alternative_plain_html(
                    text.to_string(),
                    html.to_string(),
                ))
                .map_err(|err| NodeError::execution(format!("could not build message: {err}")))?,
            (Some(text), None) => builder
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(text.to_string()),
                )
                .map_err(|err| NodeError::execution(format!("could not build message: {err}")))?,
            (None, Some(html)) => builder
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(html.to_string()),
                )
                .map_err(|err| NodeError::execution(format!("could not build message: {err}")))?,
            (None, None) => unreachable!("validated above"),
        };

        transport
            .send(message)
            .await
            .map_err(|err| NodeError::execution(format!("SMTP send failed: {err}")))?;

        let accepted: Vec<String> = to.iter().map(ToString::to_string).collect();
        Ok(json!({
            "messageId": message_id,
            "accepted": accepted,
            "rejected": [],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_smtp_rejects_sends() {
        let node = EmailSendNode::new(None).unwrap();
        let err = node
            .execute(
                json!({ "to": "a@example.test", "subject": "s", "text": "t" }),
                DispatchMeta::new(Uuid::now_v7(), "mail"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Validation(_)));
    }

    #[test]
    fn mailbox_lists_accept_strings_and_arrays() {
        let parsed =
            parse_mailboxes(Some(&json!("a@example.test, B <b@example.test>"))).unwrap();
        assert_eq!(parsed.len(), 2);
        let parsed = parse_mailboxes(Some(&json!(["a@example.test"]))).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(parse_mailboxes(Some(&json!("not-an-address"))).is_err());
        assert!(parse_mailboxes(Some(&json!(42))).is_err());
    }
}

//! Registration of the built-in node library

use std::sync::Arc;

use sqlx::PgPool;

use reflux_bus::{InProcessBus, NodeError};

use crate::condition::ConditionNode;
use crate::database::DatabaseQueryNode;
use crate::email::{EmailSendNode, SmtpConfig};
use crate::http::HttpRequestNode;
use crate::openai::OpenAiChatNode;
use crate::transform::TransformNode;
use crate::webhook::WebhookTriggerNode;

/// Configuration shared by the built-in nodes.
#[derive(Default)]
pub struct NodeLibraryConfig {
    /// Default pool for `nodes.database.query`
    pub database_pool: Option<PgPool>,
    /// SMTP relay for `nodes.email.send`
    pub smtp: Option<SmtpConfig>,
    pub openai_base_url: Option<String>,
    pub openai_api_key: Option<String>,
}

impl NodeLibraryConfig {
    pub fn from_env() -> Self {
        Self {
            database_pool: None,
            smtp: SmtpConfig::from_env(),
            openai_base_url: std::env::var("OPENAI_BASE_URL").ok(),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
        }
    }

    pub fn with_database_pool(mut self, pool: PgPool) -> Self {
        self.database_pool = Some(pool);
        self
    }
}

/// Register every built-in handler on the bus.
pub fn register_builtins(bus: &InProcessBus, config: NodeLibraryConfig) -> Result<(), NodeError> {
    bus.register(Arc::new(HttpRequestNode::new()));
    bus.register(Arc::new(TransformNode));
    bus.register(Arc::new(ConditionNode));
    bus.register(Arc::new(WebhookTriggerNode));
    bus.register(Arc::new(DatabaseQueryNode::new(config.database_pool)));
    bus.register(Arc::new(EmailSendNode::new(config.smtp)?));
    bus.register(Arc::new(OpenAiChatNode::new(
        config.openai_base_url,
        config.openai_api_key,
    )));
    Ok(())
}

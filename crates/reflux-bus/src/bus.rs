//! The bus client: name/version-addressed dispatch with a request timeout

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::address::Address;
use crate::error::DispatchError;
use crate::handler::{DispatchMeta, NodeHandler, NodeSchema};
use crate::registry::HandlerRegistry;

/// Default per-call request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bus configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Upper bound for one dispatch round trip
    pub request_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl BusConfig {
    /// Read `BUS_REQUEST_TIMEOUT_SECS` from the environment, defaulting to 30.
    pub fn from_env() -> Self {
        let request_timeout = std::env::var("BUS_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        Self { request_timeout }
    }
}

/// Client seam for node dispatch.
///
/// Guarantees: a call returns or fails within the request timeout; an
/// unregistered address fails with `NotFound`; `meta` reaches the handler
/// unchanged; redelivery on transport error is permitted, so side-effectful
/// handlers declare idempotency in their schema.
#[async_trait]
pub trait NodeBus: Send + Sync {
    /// Dispatch `name@version` with resolved params and metadata.
    async fn dispatch(
        &self,
        name: &str,
        version: &str,
        params: Value,
        meta: DispatchMeta,
    ) -> Result<Value, DispatchError>;

    /// Schemas of every registered handler.
    fn list_schemas(&self) -> Vec<NodeSchema>;
}

/// In-process bus: client and handlers share the process.
///
/// External worker processes plug in behind the same [`NodeBus`] trait; the
/// engine never sees the difference.
pub struct InProcessBus {
    registry: RwLock<HandlerRegistry>,
    config: BusConfig,
}

impl InProcessBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            registry: RwLock::new(HandlerRegistry::new()),
            config,
        }
    }

    pub fn register(&self, handler: Arc<dyn NodeHandler>) {
        self.registry
            .write()
            .expect("bus registry lock poisoned")
            .register(handler);
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

#[async_trait]
impl NodeBus for InProcessBus {
    async fn dispatch(
        &self,
        name: &str,
        version: &str,
        params: Value,
        meta: DispatchMeta,
    ) -> Result<Value, DispatchError> {
        let (resolved_version, handler) = {
            let registry = self.registry.read().expect("bus registry lock poisoned");
            registry.resolve(name, version)?
        };
        let address = Address::new(resolved_version, name);

        tracing::debug!(
            address = %address,
            run_id = %meta.run_id,
            step_id = %meta.step_id,
            "dispatching node"
        );

        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, handler.execute(params, meta)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(DispatchError::Timeout {
                address: address.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    fn list_schemas(&self) -> Vec<NodeSchema> {
        self.registry
            .read()
            .expect("bus registry lock poisoned")
            .list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::SemVer;
    use crate::error::NodeError;
    use crate::handler::NodeSchema;
    use serde_json::json;
    use uuid::Uuid;

    struct Echo;

    #[async_trait]
    impl NodeHandler for Echo {
        fn schema(&self) -> NodeSchema {
            NodeSchema::new("nodes.echo", SemVer::V1, "echoes params and meta")
        }

        async fn execute(&self, params: Value, meta: DispatchMeta) -> Result<Value, NodeError> {
            Ok(json!({
                "params": params,
                "run_id": meta.run_id,
                "step_id": meta.step_id,
                "inputs": meta.inputs,
            }))
        }
    }

    struct Sleeper;

    #[async_trait]
    impl NodeHandler for Sleeper {
        fn schema(&self) -> NodeSchema {
            NodeSchema::new("nodes.sleeper", SemVer::V1, "sleeps past the timeout")
        }

        async fn execute(&self, _params: Value, _meta: DispatchMeta) -> Result<Value, NodeError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn meta_reaches_the_handler_unchanged() {
        let bus = InProcessBus::default();
        bus.register(Arc::new(Echo));

        let run_id = Uuid::now_v7();
        let mut meta = DispatchMeta::new(run_id, "step-1");
        meta.inputs = json!({ "q": "hi" });

        let out = bus
            .dispatch("nodes.echo", "1.0.0", json!({ "a": 1 }), meta)
            .await
            .unwrap();
        assert_eq!(out["params"], json!({ "a": 1 }));
        assert_eq!(out["run_id"], json!(run_id));
        assert_eq!(out["step_id"], "step-1");
        assert_eq!(out["inputs"], json!({ "q": "hi" }));
    }

    #[tokio::test]
    async fn unregistered_address_is_not_found() {
        let bus = InProcessBus::default();
        let err = bus
            .dispatch(
                "nodes.ghost",
                "1.0.0",
                Value::Null,
                DispatchMeta::new(Uuid::now_v7(), "s"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_times_out() {
        let bus = InProcessBus::new(BusConfig {
            request_timeout: Duration::from_millis(50),
        });
        bus.register(Arc::new(Sleeper));

        let err = bus
            .dispatch(
                "nodes.sleeper",
                "1.0.0",
                Value::Null,
                DispatchMeta::new(Uuid::now_v7(), "s"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Timeout { .. }));
    }

    #[tokio::test]
    async fn latest_is_accepted_by_dispatch() {
        let bus = InProcessBus::default();
        bus.register(Arc::new(Echo));
        let out = bus
            .dispatch(
                "nodes.echo",
                "latest",
                json!({}),
                DispatchMeta::new(Uuid::now_v7(), "s"),
            )
            .await
            .unwrap();
        assert_eq!(out["step_id"], "s");
    }
}

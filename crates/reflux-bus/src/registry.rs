//! Handler registry with version-ordered resolution

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::address::{Address, SemVer};
use crate::error::DispatchError;
use crate::handler::{NodeHandler, NodeSchema};

/// Registry of node handlers, keyed by dotted name, version-ordered within a
/// name so `latest` resolves to the newest registration.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, BTreeMap<SemVer, Arc<dyn NodeHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its schema's name and version. A second
    /// registration for the same address replaces the first.
    pub fn register(&mut self, handler: Arc<dyn NodeHandler>) {
        let schema = handler.schema();
        let version = schema.semver();
        tracing::debug!(
            address = %Address::new(version, schema.name.clone()),
            "registered node handler"
        );
        self.handlers
            .entry(schema.name)
            .or_default()
            .insert(version, handler);
    }

    /// Resolve a name + version string to a handler.
    ///
    /// `latest` resolves to the newest registered version for the name;
    /// an explicit version must match exactly.
    pub fn resolve(
        &self,
        name: &str,
        version: &str,
    ) -> Result<(SemVer, Arc<dyn NodeHandler>), DispatchError> {
        let versions = self
            .handlers
            .get(name)
            .ok_or_else(|| DispatchError::NotFound {
                address: format!("{version}.{name}.execute"),
            })?;

        if version == "latest" {
            let (v, handler) = versions
                .iter()
                .next_back()
                .expect("registry never keeps an empty version map");
            return Ok((*v, handler.clone()));
        }

        let wanted: SemVer =
            version
                .parse()
                .map_err(|reason| DispatchError::InvalidVersion {
                    name: name.to_string(),
                    version: version.to_string(),
                    reason,
                })?;
        let handler = versions
            .get(&wanted)
            .ok_or_else(|| DispatchError::NotFound {
                address: Address::new(wanted, name).to_string(),
            })?;
        Ok((wanted, handler.clone()))
    }

    /// Schemas of every registered handler, for the introspection surface.
    pub fn list(&self) -> Vec<NodeSchema> {
        let mut schemas: Vec<NodeSchema> = self
            .handlers
            .values()
            .flat_map(|versions| versions.values().map(|h| h.schema()))
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name).then(a.version.0.cmp(&b.version.0)));
        schemas
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::DispatchMeta;
    use crate::NodeError;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Stub {
        name: &'static str,
        version: SemVer,
    }

    #[async_trait]
    impl NodeHandler for Stub {
        fn schema(&self) -> NodeSchema {
            NodeSchema::new(self.name, self.version, "stub")
        }

        async fn execute(&self, _params: Value, _meta: DispatchMeta) -> Result<Value, NodeError> {
            Ok(json!({ "version": self.version.to_string() }))
        }
    }

    fn registry_with_versions() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(Stub {
            name: "nodes.stub",
            version: SemVer::V1,
        }));
        registry.register(Arc::new(Stub {
            name: "nodes.stub",
            version: "1.2.0".parse().unwrap(),
        }));
        registry
    }

    #[test]
    fn exact_version_resolution() {
        let registry = registry_with_versions();
        let (v, _) = registry.resolve("nodes.stub", "1.0.0").unwrap();
        assert_eq!(v, SemVer::V1);
    }

    #[test]
    fn latest_resolves_to_newest_version() {
        let registry = registry_with_versions();
        let (v, _) = registry.resolve("nodes.stub", "latest").unwrap();
        assert_eq!(v.to_string(), "1.2.0");
    }

    #[test]
    fn unknown_name_is_not_found() {
        let registry = registry_with_versions();
        assert!(matches!(
            registry.resolve("nodes.ghost", "1.0.0"),
            Err(DispatchError::NotFound { .. })
        ));
    }

    #[test]
    fn unknown_version_is_not_found() {
        let registry = registry_with_versions();
        assert!(matches!(
            registry.resolve("nodes.stub", "9.9.9"),
            Err(DispatchError::NotFound { .. })
        ));
    }

    #[test]
    fn malformed_version_is_rejected() {
        let registry = registry_with_versions();
        assert!(matches!(
            registry.resolve("nodes.stub", "newest"),
            Err(DispatchError::InvalidVersion { .. })
        ));
    }

    #[test]
    fn list_is_sorted_and_complete() {
        let registry = registry_with_versions();
        let schemas = registry.list();
        assert_eq!(schemas.len(), 2);
        assert_eq!(schemas[0].version.0, "1.0.0");
        assert_eq!(schemas[1].version.0, "1.2.0");
    }
}

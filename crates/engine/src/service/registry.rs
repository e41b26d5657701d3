use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock},
};

use anyhow::{Result, anyhow};
use tracing::debug;

use super::{Service, ServiceLocator};

/// In-memory service locator keyed by service id.
///
/// Registration and lookup may happen from concurrent runs; the map is guarded by a
/// read-write lock and services are handed out as shared `Arc`s.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Arc<dyn Service>>>,
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry").field("services", &self.names()).finish()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service` under its id, replacing any previous registration.
    pub fn register(&self, service: Arc<dyn Service>) -> Result<()> {
        let id = service.id().to_string();
        let mut services = self.services.write().map_err(|error| anyhow!(error.to_string()))?;
        debug!(service = %id, "service registered");
        services.insert(id, service);
        Ok(())
    }

    /// Lists registered service ids in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = match self.services.read() {
            Ok(services) => services.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }
}

impl ServiceLocator for ServiceRegistry {
    fn resolve(&self, name: &str) -> Result<Arc<dyn Service>> {
        let services = self.services.read().map_err(|error| anyhow!(error.to_string()))?;
        services
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("failed to lookup service: '{}'", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{context::RunContext, service::ServiceRequest};
    use async_trait::async_trait;
    use runbook_types::ServiceResponse;

    struct NamedService(&'static str);

    #[async_trait]
    impl Service for NamedService {
        fn id(&self) -> &str {
            self.0
        }

        fn new_request(&self, _action: &str) -> Result<Box<dyn ServiceRequest>> {
            Ok(Box::new(serde_json::Value::Null))
        }

        async fn run(&self, _context: &mut RunContext, _request: Box<dyn ServiceRequest>) -> ServiceResponse {
            ServiceResponse::ok(self.0)
        }
    }

    #[test]
    fn resolves_registered_services() {
        let registry = ServiceRegistry::new();
        registry.register(Arc::new(NamedService("exec"))).expect("register exec");
        registry.register(Arc::new(NamedService("http"))).expect("register http");

        assert_eq!(registry.resolve("exec").expect("resolve exec").id(), "exec");
        assert_eq!(registry.names(), vec!["exec".to_string(), "http".to_string()]);
    }

    #[test]
    fn unknown_service_is_a_lookup_error() {
        let registry = ServiceRegistry::new();
        let error = registry.resolve("ftp").err().expect("expected lookup error");
        assert!(error.to_string().contains("failed to lookup service: 'ftp'"));
    }
}

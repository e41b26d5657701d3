//! Service contracts consumed by the workflow engine.
//!
//! - [`Service`]: builds typed requests for named actions and runs them
//! - [`ServiceRequest`]: object-safe view of a typed request
//! - [`ServiceLocator`]: resolves services by name
//! - `registry`: in-memory locator
//! - `workflow`: built-in service that registers, loads and runs workflows

mod registry;
pub mod workflow;

use std::{any::Any, fmt::Debug, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use runbook_types::ServiceResponse;
use runbook_util::{ConversionError, assign_converted};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::context::RunContext;

pub use registry::ServiceRegistry;
pub use workflow::{WORKFLOW_SERVICE_ID, WorkflowLoadRequest, WorkflowRegisterRequest, WorkflowService};

/// Typed request produced by [`Service::new_request`].
///
/// Every serde-serializable request type implements this trait automatically, so a
/// service only declares plain structs and downcasts them in [`Service::run`].
pub trait ServiceRequest: Debug + Send + Sync + 'static {
    /// Assigns an untyped payload onto the request with type coercion.
    fn assign(&mut self, payload: &Value) -> Result<(), ConversionError>;
    /// Serialized form recorded in the run's activity log.
    fn to_value(&self) -> Value;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T> ServiceRequest for T
where
    T: Serialize + DeserializeOwned + Debug + Send + Sync + 'static,
{
    fn assign(&mut self, payload: &Value) -> Result<(), ConversionError> {
        assign_converted(self, payload)
    }

    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Downcasts a boxed request into the concrete type a service expects.
pub fn downcast_request<T: ServiceRequest>(request: Box<dyn ServiceRequest>) -> Option<T> {
    request.into_any().downcast::<T>().ok().map(|request| *request)
}

/// A named collection of actions.
#[async_trait]
pub trait Service: Send + Sync {
    /// Identifier the service is registered under.
    fn id(&self) -> &str;

    /// Builds an empty typed request for `action`. Unknown actions fail.
    fn new_request(&self, action: &str) -> Result<Box<dyn ServiceRequest>>;

    /// Runs a request built by [`Service::new_request`].
    ///
    /// Business failures are reported through [`ServiceResponse::error`], not as a
    /// Rust error, so the engine can record the response before aborting.
    async fn run(&self, context: &mut RunContext, request: Box<dyn ServiceRequest>) -> ServiceResponse;
}

/// Resolves services by name.
pub trait ServiceLocator: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Arc<dyn Service>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct PingRequest {
        host: String,
        count: u32,
    }

    #[test]
    fn blanket_request_assigns_and_downcasts() {
        let mut request: Box<dyn ServiceRequest> = Box::new(PingRequest::default());
        request.assign(&json!({"host": "db", "count": "2"})).expect("assign payload");

        assert_eq!(request.to_value(), json!({"host": "db", "count": 2}));
        assert!(request.as_any().downcast_ref::<PingRequest>().is_some());

        let typed: PingRequest = downcast_request(request).expect("downcast");
        assert_eq!(typed.count, 2);
    }

    #[test]
    fn downcast_to_wrong_type_fails() {
        let request: Box<dyn ServiceRequest> = Box::new(PingRequest::default());
        assert!(downcast_request::<String>(request).is_none());
    }
}

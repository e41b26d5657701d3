//! Per-run execution context.
//!
//! The caller owns the [`RunContext`]: it carries the run's [`State`], the locator
//! used to resolve services by name, and a cancellation token that long-running
//! services may observe. One context serves exactly one run at a time; concurrent
//! runs each need their own context.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    service::{Service, ServiceLocator},
    workflow::state::State,
};

/// Mutable state and collaborators for a single run.
pub struct RunContext {
    state: State,
    services: Arc<dyn ServiceLocator>,
    cancellation: CancellationToken,
}

impl RunContext {
    /// Creates a context with empty state.
    pub fn new(services: Arc<dyn ServiceLocator>) -> Self {
        Self::with_state(services, State::new())
    }

    /// Creates a context seeded with `state`.
    pub fn with_state(services: Arc<dyn ServiceLocator>, state: State) -> Self {
        Self {
            state,
            services,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    /// Consumes the context and returns the final state.
    pub fn into_state(self) -> State {
        self.state
    }

    /// Resolves a service by name through the configured locator.
    pub fn service(&self, name: &str) -> Result<Arc<dyn Service>> {
        self.services.resolve(name)
    }

    /// Expands `$` tokens in `value` against the run state.
    pub fn expand(&self, value: &Value) -> Value {
        self.state.expand(value)
    }

    /// Token cancelled when the caller abandons the run.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Replaces the cancellation token, typically with a child of a caller-held token.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("state_entries", &self.state.len())
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

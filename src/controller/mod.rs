//! Kubernetes controllers for instance refreshes
//!
//! One controller per custom resource kind. They all run the same
//! [`reconcile`] flow, parameterised by [`RefreshTarget`].

mod client;
mod cluster;
mod control_plane;
mod machine_deployment;
mod reconcile;

use std::sync::Arc;

use kube::Client;

pub use client::{KubeCancelOracle, KubeClient, KubeClientImpl};
pub use reconcile::{error_policy, reconcile, RefreshTarget};

#[cfg(test)]
pub use client::MockKubeClient;

use crate::aws::{AutoScalingFactory, SdkAutoScalingFactory};
use crate::config::OperatorConfig;
use crate::events::{EventPublisher, KubeEventPublisher};
use crate::refresh::{Clock, SystemClock};

/// Name the controllers report Kubernetes Events as
pub const CONTROLLER_NAME: &str = "rolling-node-operator";

/// Controller context containing shared state and clients
///
/// The context is shared across all reconciliation calls and holds
/// resources that are expensive to create (like Kubernetes clients).
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```ignore
/// let ctx = Context::builder(client, OperatorConfig::new("gauss")).build();
/// ```
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Creates Auto Scaling clients per cluster
    pub autoscaling: Arc<dyn AutoScalingFactory>,
    /// Kubernetes Event sink
    pub events: Arc<dyn EventPublisher>,
    /// Time source for the refresh waiter
    pub clock: Arc<dyn Clock>,
    /// Operator settings
    pub config: OperatorConfig,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client, config: OperatorConfig) -> ContextBuilder {
        ContextBuilder::new(client, config)
    }

    /// Create a context for testing with custom mock clients
    #[cfg(test)]
    pub fn for_testing(
        kube: Arc<dyn KubeClient>,
        autoscaling: Arc<dyn AutoScalingFactory>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            kube,
            autoscaling,
            events,
            clock,
            config: OperatorConfig::new("test"),
        }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    config: OperatorConfig,
    kube: Option<Arc<dyn KubeClient>>,
    autoscaling: Option<Arc<dyn AutoScalingFactory>>,
    events: Option<Arc<dyn EventPublisher>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ContextBuilder {
    fn new(client: Client, config: OperatorConfig) -> Self {
        Self {
            client,
            config,
            kube: None,
            autoscaling: None,
            events: None,
            clock: None,
        }
    }

    /// Override the Kubernetes client
    pub fn kube_client(mut self, kube: Arc<dyn KubeClient>) -> Self {
        self.kube = Some(kube);
        self
    }

    /// Override the Auto Scaling client factory
    pub fn autoscaling(mut self, factory: Arc<dyn AutoScalingFactory>) -> Self {
        self.autoscaling = Some(factory);
        self
    }

    /// Override the event publisher
    pub fn events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Override the clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            kube: self
                .kube
                .unwrap_or_else(|| Arc::new(KubeClientImpl::new(self.client.clone()))),
            autoscaling: self
                .autoscaling
                .unwrap_or_else(|| Arc::new(SdkAutoScalingFactory)),
            events: self.events.unwrap_or_else(|| {
                Arc::new(KubeEventPublisher::new(self.client.clone(), CONTROLLER_NAME))
            }),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            config: self.config,
        }
    }
}

//! Kubernetes Event recording for the refresh controllers.
//!
//! Provides a trait-based abstraction over `kube::runtime::events::Recorder`
//! so that the orchestration can emit Events visible via
//! `kubectl describe` without holding a process-wide recorder.
//!
//! Events are **fire-and-forget**: failures are logged as warnings and never
//! propagate errors. A failed event must never break a refresh.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Trait for publishing Kubernetes Events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a Kubernetes Event on the given resource.
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a new publisher reporting as the given controller name.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason,
                action,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// No-op implementation for tests.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event sink bound to the resource a refresh runs for
#[derive(Clone)]
pub struct ResourceEvents {
    publisher: Arc<dyn EventPublisher>,
    resource_ref: ObjectReference,
}

impl ResourceEvents {
    /// Bind a publisher to a resource
    pub fn new(publisher: Arc<dyn EventPublisher>, resource_ref: ObjectReference) -> Self {
        Self {
            publisher,
            resource_ref,
        }
    }

    /// Sink that drops everything
    pub fn noop() -> Self {
        Self::new(Arc::new(NoopEventPublisher), ObjectReference::default())
    }

    /// Publish a Normal event
    pub async fn normal(&self, reason: &str, note: impl Into<String>) {
        self.publisher
            .publish(
                &self.resource_ref,
                EventType::Normal,
                reason,
                actions::REFRESH,
                Some(note.into()),
            )
            .await;
    }

    /// Publish a Warning event
    pub async fn warning(&self, reason: &str, note: impl Into<String>) {
        self.publisher
            .publish(
                &self.resource_ref,
                EventType::Warning,
                reason,
                actions::REFRESH,
                Some(note.into()),
            )
            .await;
    }
}

/// Well-known event reason strings.
///
/// These appear in `kubectl get events` under the REASON column.
pub mod reasons {
    /// The first instance refresh of a run is about to start
    pub const INSTANCE_REFRESH_STARTING: &str = "InstanceRefreshIsStarting";
    /// A group was refreshed recently and left alone
    pub const INSTANCE_REFRESH_SKIPPED: &str = "InstanceRefreshSkipped";
    /// Starting a refresh on a group failed with an unexpected error
    pub const INSTANCE_REFRESH_START_FAILED: &str = "InstanceRefreshStartFailed";
    /// One group finished refreshing
    pub const GROUP_REFRESHED: &str = "GroupRefreshed";
    /// Every targeted group was refreshed or skipped
    pub const INSTANCE_REFRESH_SUCCESSFUL: &str = "InstanceRefreshSuccessful";
    /// The operator cancelled the refresh
    pub const INSTANCE_REFRESH_CANCELLED: &str = "InstanceRefreshCancelled";
    /// The run aborted on an error
    pub const INSTANCE_REFRESH_FAILED: &str = "InstanceRefreshFailed";
    /// Annotation validation failed
    pub const VALIDATION_FAILED: &str = "ValidationFailed";
}

/// Well-known event action strings.
///
/// These appear in `kubectl get events` under the ACTION column.
pub mod actions {
    /// Refreshing instances
    pub const REFRESH: &str = "RefreshInstances";
}

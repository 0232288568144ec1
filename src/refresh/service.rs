//! Instance refresh orchestration
//!
//! A run looks up the groups matching a [`TargetFilter`] and processes them
//! strictly one after another: probe, skip if refreshed recently, start,
//! wait. Group N+1 is never started before group N's wait has ended.
//!
//! Errors from the catalog lookup or from probing abort the whole run.
//! A cancellation by the operator also ends the run, but as a clean
//! [`RefreshReport`] rather than an error, since the cancel flag applies to
//! every group in the scope.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{error, info, instrument, warn};

use super::cancel::CancelOracle;
use super::clock::Clock;
use super::provider::{AutoScalingApi, StartRefreshError};
use super::types::{
    GroupOutcome, MinHealthyPercentage, RefreshReport, RefreshRequest, RefreshScope, TargetFilter,
};
use super::waiter::{RefreshWaiter, WaitConfig, WaitOutcome};
use crate::events::{reasons, ResourceEvents};
use crate::Error;

/// Groups whose last refresh ended within this window are left alone
pub const RECENT_REFRESH_WINDOW: Duration = Duration::from_secs(30 * 60);

/// Orchestration tuning
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshConfig {
    /// Waiter tuning
    pub wait: WaitConfig,
    /// Skip groups refreshed within this window
    pub recent_window: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            wait: WaitConfig::default(),
            recent_window: RECENT_REFRESH_WINDOW,
        }
    }
}

/// One invocation of the orchestration
pub struct RefreshJob {
    /// Groups to refresh
    pub filter: TargetFilter,
    /// Raw minimum healthy percentage, validated before any provider call
    pub min_healthy_percentage: i64,
    /// Namespace of the resource carrying the cancel flag
    pub namespace: String,
    /// Resource carrying the cancel flag, derived from the filter when unset
    pub owner: Option<RefreshScope>,
    /// Event sink for per-group progress
    pub events: ResourceEvents,
    /// Fired once, with the group name, right before the first refresh starts
    pub on_start: Option<oneshot::Sender<String>>,
}

impl RefreshJob {
    /// Job with no events and no start notification
    pub fn new(
        filter: TargetFilter,
        min_healthy_percentage: i64,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            filter,
            min_healthy_percentage,
            namespace: namespace.into(),
            owner: None,
            events: ResourceEvents::noop(),
            on_start: None,
        }
    }

    /// Read the cancel flag from `owner` instead of the filter's scope
    pub fn owner(mut self, owner: RefreshScope) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Send progress events to the given sink
    pub fn events(mut self, events: ResourceEvents) -> Self {
        self.events = events;
        self
    }

    /// Notify `tx` when the first refresh is about to start
    pub fn on_start(mut self, tx: oneshot::Sender<String>) -> Self {
        self.on_start = Some(tx);
        self
    }
}

/// Runs instance refreshes over the groups of a scope
pub struct InstanceRefreshService {
    api: Arc<dyn AutoScalingApi>,
    oracle: Arc<dyn CancelOracle>,
    clock: Arc<dyn Clock>,
    config: RefreshConfig,
}

impl InstanceRefreshService {
    /// Create a service over the given collaborators
    pub fn new(
        api: Arc<dyn AutoScalingApi>,
        oracle: Arc<dyn CancelOracle>,
        clock: Arc<dyn Clock>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            api,
            oracle,
            clock,
            config,
        }
    }

    /// Refresh every group matching the job's filter.
    ///
    /// Returns the per-group outcomes in processing order. A validation
    /// error is returned before the provider is contacted.
    #[instrument(skip_all, fields(cluster = %job.filter.cluster(), scope = %job.filter.scope()))]
    pub async fn refresh(&self, job: RefreshJob) -> Result<RefreshReport, Error> {
        let RefreshJob {
            filter,
            min_healthy_percentage,
            namespace,
            owner,
            events,
            mut on_start,
        } = job;

        let min_healthy = MinHealthyPercentage::new(min_healthy_percentage)?;
        let scope = owner.unwrap_or_else(|| filter.scope());

        let groups = self.api.list_groups(&filter).await?;
        let mut report = RefreshReport::default();
        if groups.is_empty() {
            info!("No auto scaling groups match, nothing to refresh");
            return Ok(report);
        }
        info!(count = groups.len(), "Found auto scaling groups to refresh");

        let waiter = RefreshWaiter::new(
            self.api.as_ref(),
            self.oracle.as_ref(),
            self.clock.as_ref(),
            &self.config.wait,
            &scope,
            &namespace,
        );

        for group in &groups {
            let name = group.name.as_str();

            if let Some(latest) = self.api.describe_latest_refresh(name).await? {
                if latest.completed_within(self.clock.now(), self.config.recent_window) {
                    info!(group = name, "Already refreshed within the last 30 minutes, skipping");
                    events
                        .normal(
                            reasons::INSTANCE_REFRESH_SKIPPED,
                            format!("ASG {name} was refreshed recently, skipping"),
                        )
                        .await;
                    report.record(name, GroupOutcome::SkippedRecentlyRefreshed);
                    continue;
                }
            }

            let Some(request) = RefreshRequest::for_group(group, min_healthy) else {
                warn!(group = name, "Group has no launch template, skipping");
                report.record(name, GroupOutcome::SkippedNoLaunchTemplate);
                continue;
            };

            if let Some(tx) = on_start.take() {
                // A dropped receiver only loses the notification.
                let _ = tx.send(name.to_string());
            }

            self.start(name, &request, &events).await;

            match waiter.wait(name).await? {
                WaitOutcome::Succeeded => {
                    events
                        .normal(
                            reasons::GROUP_REFRESHED,
                            format!("Replaced all instances in ASG {name}"),
                        )
                        .await;
                    report.record(name, GroupOutcome::Refreshed);
                }
                WaitOutcome::Resolved(status) => {
                    report.record(name, GroupOutcome::Resolved(status));
                }
                WaitOutcome::CancelledByOperator => {
                    report.record(name, GroupOutcome::CancelledByOperator);
                    info!(
                        group = name,
                        remaining = groups.len() - report.groups.len(),
                        "Refresh cancelled, not touching remaining groups"
                    );
                    break;
                }
            }
        }

        Ok(report)
    }

    /// Start a refresh. Failures never abort the group: the waiter decides
    /// from the provider's view whether there is a refresh to follow.
    async fn start(&self, group: &str, request: &RefreshRequest, events: &ResourceEvents) {
        match self.api.start_refresh(group, request).await {
            Ok(id) => {
                info!(
                    group,
                    refresh_id = %id,
                    launch_template = %request.launch_template.id,
                    min_healthy_percentage = request.min_healthy_percentage.get(),
                    "Started instance refresh"
                );
            }
            Err(StartRefreshError::AlreadyInProgress { .. }) => {
                info!(group, "An instance refresh is already in progress");
            }
            Err(StartRefreshError::Other(e)) => {
                error!(group, error = %e, "Failed to start instance refresh");
                events
                    .warning(
                        reasons::INSTANCE_REFRESH_START_FAILED,
                        format!("Failed to start instance refresh for ASG {group}: {e}"),
                    )
                    .await;
            }
        }
    }
}

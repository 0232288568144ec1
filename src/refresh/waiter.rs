//! Instance refresh waiter
//!
//! Polls a group's latest instance refresh at a fixed interval until it
//! reaches a terminal status, the operator sets the cancel flag, or a probe
//! fails. The provider paces the refresh itself, so there is no backoff.
//!
//! ```text
//!            +-------+   Successful / Cancelling / Cancelled   +------+
//!   start -> | Probe | ---------------------------------------> | Done |
//!            +-------+                                         +------+
//!              ^   | other status                                 ^
//!              |   v                                              |
//!          +-------+   flag not set   +-------------+  flag set   |
//!          | Sleep | <--------------- | CheckCancel | ------------+
//!          +-------+                  +-------------+  (cancel_refresh)
//! ```
//!
//! A probe error leaves the machine immediately and is returned as-is.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::cancel::{cancel_requested, CancelOracle};
use super::clock::Clock;
use super::provider::AutoScalingApi;
use super::types::{RefreshScope, RefreshStatus};
use crate::Error;

/// Delay between two probes of the same refresh
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Waiter tuning
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaitConfig {
    /// Fixed delay between probes
    pub poll_interval: Duration,
    /// Upper bound on the time spent waiting on one group (None = unbounded)
    pub max_wait: Option<Duration>,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
        }
    }
}

/// How waiting on a group ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The refresh completed successfully
    Succeeded,
    /// The refresh was cancelled by someone else (Cancelling or Cancelled)
    Resolved(RefreshStatus),
    /// The cancel flag was set; one cancel request was sent
    CancelledByOperator,
}

#[derive(Debug)]
enum WaitState {
    Probe,
    CheckCancel(RefreshStatus),
    Sleep,
    Done(WaitOutcome),
}

/// Waits on the refreshes of one run
pub struct RefreshWaiter<'a> {
    api: &'a dyn AutoScalingApi,
    oracle: &'a dyn CancelOracle,
    clock: &'a dyn Clock,
    config: &'a WaitConfig,
    scope: &'a RefreshScope,
    namespace: &'a str,
}

impl<'a> RefreshWaiter<'a> {
    /// Create a waiter checking the cancel flag of `scope` in `namespace`
    pub fn new(
        api: &'a dyn AutoScalingApi,
        oracle: &'a dyn CancelOracle,
        clock: &'a dyn Clock,
        config: &'a WaitConfig,
        scope: &'a RefreshScope,
        namespace: &'a str,
    ) -> Self {
        Self {
            api,
            oracle,
            clock,
            config,
            scope,
            namespace,
        }
    }

    /// Wait on the latest refresh of `group`
    pub async fn wait(&self, group: &str) -> Result<WaitOutcome, Error> {
        let started = self.clock.now();
        let mut state = WaitState::Probe;

        loop {
            state = match state {
                WaitState::Probe => self.probe(group).await?,
                WaitState::CheckCancel(status) => {
                    if cancel_requested(self.oracle, self.scope, self.namespace).await {
                        warn!(
                            group,
                            status = %status,
                            scope = %self.scope,
                            "Cancel flag set, cancelling instance refresh"
                        );
                        self.api.cancel_refresh(group).await?;
                        WaitState::Done(WaitOutcome::CancelledByOperator)
                    } else {
                        WaitState::Sleep
                    }
                }
                WaitState::Sleep => {
                    let elapsed = (self.clock.now() - started).to_std().unwrap_or_default();
                    if let Some(max_wait) = self.config.max_wait {
                        if elapsed >= max_wait {
                            return Err(Error::refresh_timeout(group, elapsed));
                        }
                    }
                    self.clock.sleep(self.config.poll_interval).await;
                    WaitState::Probe
                }
                WaitState::Done(outcome) => return Ok(outcome),
            };
        }
    }

    async fn probe(&self, group: &str) -> Result<WaitState, Error> {
        let operation = self
            .api
            .describe_latest_refresh(group)
            .await?
            .ok_or_else(|| Error::no_refresh_operation(group))?;

        let next = match operation.status {
            RefreshStatus::Successful => {
                info!(group, "Successfully refreshed all instances");
                WaitState::Done(WaitOutcome::Succeeded)
            }
            status @ (RefreshStatus::Cancelling | RefreshStatus::Cancelled) => {
                info!(group, status = %status, "Instance refresh was cancelled");
                WaitState::Done(WaitOutcome::Resolved(status))
            }
            status => {
                info!(
                    group,
                    status = %status,
                    percentage_complete = ?operation.percentage_complete,
                    "Refreshing instances"
                );
                WaitState::CheckCancel(status)
            }
        };
        debug!(group, state = ?next, "Probed instance refresh");
        Ok(next)
    }
}

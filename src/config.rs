//! Operator configuration
//!
//! Built once at startup from the command line and shared with every
//! reconcile through the controller context.

use std::time::Duration;

use crate::refresh::{RefreshConfig, WaitConfig, DEFAULT_POLL_INTERVAL, RECENT_REFRESH_WINDOW};
use crate::Error;

/// Requeue delay for resources without a pending refresh and for retryable failures
pub const DEFAULT_REQUEUE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Runtime configuration of the operator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Name of the installation (management cluster) the operator runs in
    pub installation: String,
    /// Orchestration tuning
    pub refresh: RefreshConfig,
    /// Requeue delay for idle resources and retryable failures
    pub requeue_interval: Duration,
}

impl OperatorConfig {
    /// Configuration with defaults for the given installation
    pub fn new(installation: impl Into<String>) -> Self {
        Self {
            installation: installation.into(),
            refresh: RefreshConfig::default(),
            requeue_interval: DEFAULT_REQUEUE_INTERVAL,
        }
    }

    /// Override the delay between two probes of a refresh
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.refresh.wait.poll_interval = interval;
        self
    }

    /// Bound the time spent waiting on one group
    pub fn max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.refresh.wait.max_wait = max_wait;
        self
    }

    /// Override the recent-refresh skip window
    pub fn recent_window(mut self, window: Duration) -> Self {
        self.refresh.recent_window = window;
        self
    }

    /// Override the idle requeue interval
    pub fn requeue_interval(mut self, interval: Duration) -> Self {
        self.requeue_interval = interval;
        self
    }

    /// Reject settings the controllers cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        if self.installation.is_empty() {
            return Err(Error::validation_for_field(
                "operator",
                "installation",
                "installation name must not be empty",
            ));
        }
        if self.refresh.wait.poll_interval.is_zero() {
            return Err(Error::validation_for_field(
                "operator",
                "poll-interval",
                "poll interval must be greater than zero",
            ));
        }
        if self.requeue_interval.is_zero() {
            return Err(Error::validation_for_field(
                "operator",
                "requeue-interval",
                "requeue interval must be greater than zero",
            ));
        }
        if let Some(max_wait) = self.refresh.wait.max_wait {
            if max_wait < self.refresh.wait.poll_interval {
                return Err(Error::validation_for_field(
                    "operator",
                    "max-wait",
                    format!(
                        "max wait {max_wait:?} is shorter than the poll interval {:?}",
                        self.refresh.wait.poll_interval
                    ),
                ));
            }
        }
        Ok(())
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            installation: String::new(),
            refresh: RefreshConfig {
                wait: WaitConfig {
                    poll_interval: DEFAULT_POLL_INTERVAL,
                    max_wait: None,
                },
                recent_window: RECENT_REFRESH_WINDOW,
            },
            requeue_interval: DEFAULT_REQUEUE_INTERVAL,
        }
    }
}

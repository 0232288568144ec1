//! Provider seam for Auto Scaling Group operations
//!
//! The orchestration only talks to AWS through [`AutoScalingApi`], which
//! lets tests drive it with mocks and in-memory fakes.

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use super::types::{Group, RefreshOperation, RefreshRequest, TargetFilter};
use crate::Error;

/// Why starting an instance refresh failed
#[derive(Debug, Error)]
pub enum StartRefreshError {
    /// The group already has an active refresh; the provider rejects, not queues
    #[error("an instance refresh is already in progress for {group}")]
    AlreadyInProgress {
        /// Auto Scaling Group name
        group: String,
    },

    /// Any other provider failure
    #[error(transparent)]
    Other(#[from] Error),
}

/// Auto Scaling Group operations needed to run instance refreshes
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AutoScalingApi: Send + Sync {
    /// List the groups whose tags satisfy every pair of the filter
    async fn list_groups(&self, filter: &TargetFilter) -> Result<Vec<Group>, Error>;

    /// Most recent instance refresh of a group, if it ever had one
    async fn describe_latest_refresh(&self, group: &str)
        -> Result<Option<RefreshOperation>, Error>;

    /// Start an instance refresh, returning the provider's refresh id
    async fn start_refresh(
        &self,
        group: &str,
        request: &RefreshRequest,
    ) -> Result<String, StartRefreshError>;

    /// Cancel the active instance refresh of a group
    async fn cancel_refresh(&self, group: &str) -> Result<(), Error>;
}

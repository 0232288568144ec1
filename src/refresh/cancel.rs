//! Cancel flag lookup
//!
//! The cancel flag lives on the resource owning the refreshed groups. A
//! failed lookup counts as "not cancelled": a transient API error must not
//! abandon an otherwise healthy refresh, at the cost of possibly missing a
//! cancel request for one poll cycle.

use async_trait::async_trait;
use tracing::warn;

#[cfg(test)]
use mockall::automock;

use super::types::RefreshScope;
use crate::Error;

/// Reports whether the operator asked to cancel the refresh of a scope
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CancelOracle: Send + Sync {
    /// Whether the cancel flag is set on the resource owning `scope`
    async fn is_cancel_requested(&self, scope: &RefreshScope, namespace: &str)
        -> Result<bool, Error>;
}

/// Look up the cancel flag, treating lookup failures as "not cancelled"
pub async fn cancel_requested(
    oracle: &dyn CancelOracle,
    scope: &RefreshScope,
    namespace: &str,
) -> bool {
    match oracle.is_cancel_requested(scope, namespace).await {
        Ok(cancelled) => cancelled,
        Err(e) => {
            warn!(
                scope = %scope,
                namespace,
                error = %e,
                "Failed to read cancel flag, continuing refresh"
            );
            false
        }
    }
}

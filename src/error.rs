//! Error types for the rolling node operator
//!
//! Errors carry the resource or Auto Scaling Group they relate to so that a
//! failed reconcile can be traced back to a cluster from the logs alone.

use std::time::Duration;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for rolling node operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for annotations or resource specs
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Name of the resource carrying the invalid input
        resource: String,
        /// Description of what's invalid
        message: String,
        /// The offending annotation or field, if known
        field: Option<String>,
    },

    /// AWS API error
    #[error("provider error [{operation}]: {message}")]
    Provider {
        /// AWS API operation that failed (e.g. "DescribeAutoScalingGroups")
        operation: String,
        /// Description of what failed
        message: String,
        /// Whether this error is retryable
        retryable: bool,
    },

    /// The AWS account details for a cluster could not be resolved
    #[error("credentials error for {cluster}: {message}")]
    Credentials {
        /// Name of the cluster whose credentials are missing or malformed
        cluster: String,
        /// Description of what failed
        message: String,
    },

    /// A group was expected to have an instance refresh but none exists
    #[error("no instance refresh found for auto scaling group {group}")]
    NoRefreshOperation {
        /// Auto Scaling Group name
        group: String,
    },

    /// Waiting on an instance refresh exceeded the configured bound
    #[error("timed out after {elapsed:?} waiting on instance refresh for {group}")]
    RefreshTimeout {
        /// Auto Scaling Group name
        group: String,
        /// How long the waiter ran before giving up
        elapsed: Duration,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred
        context: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with resource context
    pub fn validation_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error naming the offending annotation or field
    pub fn validation_for_field(
        resource: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a retryable provider error for an AWS operation
    pub fn provider(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Provider {
            operation: operation.into(),
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a non-retryable provider error (e.g. access denied)
    pub fn provider_permanent(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Provider {
            operation: operation.into(),
            message: msg.into(),
            retryable: false,
        }
    }

    /// Create a credentials error for a cluster
    pub fn credentials(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Credentials {
            cluster: cluster.into(),
            message: msg.into(),
        }
    }

    /// Create an error for a group that has no instance refresh to wait on
    pub fn no_refresh_operation(group: impl Into<String>) -> Self {
        Self::NoRefreshOperation {
            group: group.into(),
        }
    }

    /// Create a wait timeout error
    pub fn refresh_timeout(group: impl Into<String>, elapsed: Duration) -> Self {
        Self::RefreshTimeout {
            group: group.into(),
            elapsed,
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation and credential errors need a change to the cluster's
    /// resources before a retry can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::Validation { .. } => false,
            Error::Provider { retryable, .. } => *retryable,
            Error::Credentials { .. } => false,
            Error::NoRefreshOperation { .. } => true,
            Error::RefreshTimeout { .. } => true,
            Error::Internal { .. } => true,
        }
    }

    /// Whether this error came from the AWS API
    pub fn is_provider(&self) -> bool {
        matches!(self, Error::Provider { .. })
    }
}

//! AWS integration
//!
//! Resolves a cluster's account and role, builds assumed-role SDK sessions
//! and implements [`crate::refresh::AutoScalingApi`] over the Auto Scaling
//! API.

mod account;
mod autoscaling;
mod scope;

pub use account::{AccountDetails, ROLE_ARN_KEY};
pub use autoscaling::AwsAutoScaling;
pub use scope::{AutoScalingFactory, ClusterScope, SdkAutoScalingFactory, SESSION_NAME};

#[cfg(test)]
pub use scope::MockAutoScalingFactory;

//! Per-reconcile AWS session scope
//!
//! A scope pins down which cluster, region and account a reconcile acts on,
//! and turns that into an SDK configuration with assumed-role credentials.

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::sts::AssumeRoleProvider;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use super::account::AccountDetails;
use super::autoscaling::AwsAutoScaling;
use crate::refresh::AutoScalingApi;
use crate::Error;

/// STS session name the operator assumes roles under
pub const SESSION_NAME: &str = "rolling-node-operator";

/// Everything needed to talk to AWS on behalf of one cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterScope {
    /// Account and role of the cluster
    pub account: AccountDetails,
    /// AWSCluster name
    pub cluster_name: String,
    /// AWSCluster namespace
    pub cluster_namespace: String,
    /// Installation (management cluster) the operator runs in
    pub installation: String,
    /// AWS region of the cluster
    pub region: String,
}

impl ClusterScope {
    /// Create a scope, rejecting empty identifiers
    pub fn new(
        account: AccountDetails,
        cluster_name: impl Into<String>,
        cluster_namespace: impl Into<String>,
        installation: impl Into<String>,
        region: impl Into<String>,
    ) -> Result<Self, Error> {
        let scope = Self {
            account,
            cluster_name: cluster_name.into(),
            cluster_namespace: cluster_namespace.into(),
            installation: installation.into(),
            region: region.into(),
        };

        for (field, value) in [
            ("cluster name", &scope.cluster_name),
            ("cluster namespace", &scope.cluster_namespace),
            ("installation", &scope.installation),
            ("region", &scope.region),
        ] {
            if value.is_empty() {
                return Err(Error::validation_for(
                    &scope.cluster_name,
                    format!("cannot build AWS scope from empty {field}"),
                ));
            }
        }
        Ok(scope)
    }

    /// SDK configuration for the scope's region, assuming the cluster's role
    pub async fn sdk_config(&self) -> SdkConfig {
        let region = Region::new(self.region.clone());
        let credentials = AssumeRoleProvider::builder(&self.account.role_arn)
            .session_name(SESSION_NAME)
            .region(region.clone())
            .build()
            .await;

        aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .credentials_provider(credentials)
            .load()
            .await
    }
}

/// Creates Auto Scaling clients for a cluster scope
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AutoScalingFactory: Send + Sync {
    /// Client acting in the scope's account and region
    async fn connect(&self, scope: &ClusterScope) -> Result<Arc<dyn AutoScalingApi>, Error>;
}

/// Factory backed by the AWS SDK
#[derive(Clone, Debug, Default)]
pub struct SdkAutoScalingFactory;

#[async_trait]
impl AutoScalingFactory for SdkAutoScalingFactory {
    async fn connect(&self, scope: &ClusterScope) -> Result<Arc<dyn AutoScalingApi>, Error> {
        debug!(
            cluster = %scope.cluster_name,
            account = %scope.account.account_id,
            region = %scope.region,
            "Creating auto scaling client"
        );
        let config = scope.sdk_config().await;
        Ok(Arc::new(AwsAutoScaling::new(&config)))
    }
}

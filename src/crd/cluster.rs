//! AWSCluster Custom Resource Definition
//!
//! Read-only view of the Giant Swarm `AWSCluster`. The operator never
//! installs or writes this CRD apart from removing its own annotations.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::AWSClusterProviderSpec;

/// Specification for an AWSCluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructure.giantswarm.io",
    version = "v1alpha3",
    kind = "AWSCluster",
    plural = "awsclusters",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AWSClusterSpec {
    /// AWS provider settings
    pub provider: AWSClusterProviderSpec,
}

impl AWSClusterSpec {
    /// Validate the fields the operator relies on
    pub fn validate(&self, name: &str) -> Result<(), crate::Error> {
        if self.provider.region.is_empty() {
            return Err(crate::Error::validation_for_field(
                name,
                "spec.provider.region",
                "region must not be empty",
            ));
        }
        let secret = &self.provider.credential_secret;
        if secret.name.is_empty() || secret.namespace.is_empty() {
            return Err(crate::Error::validation_for_field(
                name,
                "spec.provider.credentialSecret",
                "credential secret name and namespace must be set",
            ));
        }
        Ok(())
    }
}

//! AWSControlPlane Custom Resource Definition
//!
//! The operator only needs the resource's name, labels and annotations, so
//! the spec carries no fields.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for an AWSControlPlane
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructure.giantswarm.io",
    version = "v1alpha3",
    kind = "AWSControlPlane",
    plural = "awscontrolplanes",
    namespaced
)]
pub struct AWSControlPlaneSpec {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignores_master_settings() {
        let json = serde_json::json!({
            "availabilityZones": ["eu-west-1a", "eu-west-1b"],
            "instanceType": "m5.xlarge"
        });
        let parsed: AWSControlPlaneSpec = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, AWSControlPlaneSpec::default());
    }
}

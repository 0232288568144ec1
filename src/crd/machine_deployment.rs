//! AWSMachineDeployment Custom Resource Definition
//!
//! One AWSMachineDeployment is one node pool, backed by one Auto Scaling
//! Group tagged with the machine deployment id.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for an AWSMachineDeployment
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructure.giantswarm.io",
    version = "v1alpha3",
    kind = "AWSMachineDeployment",
    plural = "awsmachinedeployments",
    namespaced
)]
pub struct AWSMachineDeploymentSpec {}

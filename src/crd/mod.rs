//! Custom Resource Definitions read by the operator
//!
//! These are the Giant Swarm legacy AWS infrastructure resources. Their
//! schemas are owned elsewhere; this module only models what the operator
//! reads.

mod cluster;
mod control_plane;
mod machine_deployment;
mod types;

pub use cluster::{AWSCluster, AWSClusterSpec};
pub use control_plane::{AWSControlPlane, AWSControlPlaneSpec};
pub use machine_deployment::{AWSMachineDeployment, AWSMachineDeploymentSpec};
pub use types::{AWSClusterProviderSpec, CredentialSecret};

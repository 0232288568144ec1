//! Supporting types for the Giant Swarm infrastructure CRDs
//!
//! Only the fields the operator reads are modelled; everything else in the
//! upstream schema is ignored on deserialization.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to the Secret holding the AWS role to assume for a cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSecret {
    /// Secret name
    pub name: String,
    /// Secret namespace
    pub namespace: String,
}

/// AWS provider settings of a cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AWSClusterProviderSpec {
    /// Secret with the workload account's role ARN
    pub credential_secret: CredentialSecret,
    /// AWS region the cluster runs in
    pub region: String,
}

//! Rolling node operator - instance refreshes for Giant Swarm AWS clusters
//!
//! Users annotate an `AWSCluster`, `AWSControlPlane` or
//! `AWSMachineDeployment` with `alpha.giantswarm.io/instance-refresh`. The
//! operator then replaces the EC2 instances of the matching Auto Scaling
//! Groups one group at a time, using the native ASG instance refresh, and
//! stops early when `alpha.giantswarm.io/cancel-instance-refresh` is set.
//!
//! # Modules
//!
//! - [`refresh`] - Instance refresh orchestration (catalog, prober, waiter)
//! - [`aws`] - Auto Scaling API adapter and assumed-role sessions
//! - [`controller`] - Kubernetes controller reconciliation logic
//! - [`crd`] - Read-only views of the Giant Swarm infrastructure CRDs
//! - [`keys`] - Label and annotation keys
//! - [`events`] - Kubernetes Event publishing
//! - [`config`] - Operator configuration
//! - [`telemetry`] - Logging setup
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod aws;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod keys;
pub mod refresh;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

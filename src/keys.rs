//! Label and annotation keys read from the cluster's custom resources
//!
//! Users drive the operator entirely through annotations: one to request a
//! refresh, one to cancel an in-flight refresh, and one to tune how many
//! instances must stay healthy while it runs.

use kube::{Resource, ResourceExt};

use crate::refresh::MinHealthyPercentage;
use crate::Error;

/// Label (and ASG tag) carrying the cluster id
pub const CLUSTER_LABEL: &str = "giantswarm.io/cluster";

/// Label (and ASG tag) carrying the control plane id
pub const CONTROL_PLANE_LABEL: &str = "giantswarm.io/control-plane";

/// Label (and ASG tag) carrying the machine deployment (node pool) id
pub const MACHINE_DEPLOYMENT_LABEL: &str = "giantswarm.io/machine-deployment";

/// Annotation requesting an instance refresh
pub const INSTANCE_REFRESH_ANNOTATION: &str = "alpha.giantswarm.io/instance-refresh";

/// Annotation requesting cancellation of an in-flight instance refresh
pub const CANCEL_INSTANCE_REFRESH_ANNOTATION: &str = "alpha.giantswarm.io/cancel-instance-refresh";

/// Annotation overriding the minimum healthy percentage
pub const MIN_HEALTHY_PERCENTAGE_ANNOTATION: &str =
    "alpha.giantswarm.io/instance-refresh-min-healthy-percentage";

/// Whether the resource requests an instance refresh
pub fn instance_refresh_requested<K: Resource>(obj: &K) -> bool {
    obj.annotations().contains_key(INSTANCE_REFRESH_ANNOTATION)
}

/// Whether the resource requests cancelling the running instance refresh
pub fn cancel_requested<K: Resource>(obj: &K) -> bool {
    obj.annotations()
        .contains_key(CANCEL_INSTANCE_REFRESH_ANNOTATION)
}

/// Read the minimum healthy percentage from the resource's annotations.
///
/// A missing annotation yields the default. A value that is not an integer
/// or lies outside `[0, 100]` is a validation error; the default is not
/// substituted so the caller decides what to do.
pub fn min_healthy_percentage<K: Resource>(obj: &K) -> Result<MinHealthyPercentage, Error> {
    let Some(value) = obj.annotations().get(MIN_HEALTHY_PERCENTAGE_ANNOTATION) else {
        return Ok(MinHealthyPercentage::default());
    };

    let parsed: i64 = value.trim().parse().map_err(|_| {
        Error::validation_for_field(
            obj.name_any(),
            MIN_HEALTHY_PERCENTAGE_ANNOTATION,
            format!("expected an integer, got {value:?}"),
        )
    })?;

    MinHealthyPercentage::new(parsed).map_err(|e| match e {
        Error::Validation { message, .. } => Error::validation_for_field(
            obj.name_any(),
            MIN_HEALTHY_PERCENTAGE_ANNOTATION,
            message,
        ),
        other => other,
    })
}

/// Cluster id from the resource's labels
pub fn cluster<K: Resource>(obj: &K) -> Option<String> {
    obj.labels().get(CLUSTER_LABEL).cloned()
}

/// Control plane id from the resource's labels
pub fn control_plane<K: Resource>(obj: &K) -> Option<String> {
    obj.labels().get(CONTROL_PLANE_LABEL).cloned()
}

/// Machine deployment id from the resource's labels
pub fn machine_deployment<K: Resource>(obj: &K) -> Option<String> {
    obj.labels().get(MACHINE_DEPLOYMENT_LABEL).cloned()
}

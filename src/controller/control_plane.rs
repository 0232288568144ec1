//! AWSControlPlane as a refresh target: the control plane groups

use kube::ResourceExt;

use super::RefreshTarget;
use crate::crd::AWSControlPlane;
use crate::keys;
use crate::refresh::{RefreshScope, TargetFilter};

impl RefreshTarget for AWSControlPlane {
    fn refresh_scope(&self) -> RefreshScope {
        RefreshScope::ControlPlane(self.name_any())
    }

    fn cluster_name(&self) -> Option<String> {
        keys::cluster(self)
    }

    fn target_filter(&self, cluster: &str) -> TargetFilter {
        let id = keys::control_plane(self).unwrap_or_else(|| self.name_any());
        TargetFilter::for_cluster(cluster).control_plane(id)
    }
}

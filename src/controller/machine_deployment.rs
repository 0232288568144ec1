//! AWSMachineDeployment as a refresh target: one node pool

use kube::ResourceExt;

use super::RefreshTarget;
use crate::crd::AWSMachineDeployment;
use crate::keys;
use crate::refresh::{RefreshScope, TargetFilter};

impl RefreshTarget for AWSMachineDeployment {
    fn refresh_scope(&self) -> RefreshScope {
        RefreshScope::MachineDeployment(self.name_any())
    }

    fn cluster_name(&self) -> Option<String> {
        keys::cluster(self)
    }

    fn target_filter(&self, cluster: &str) -> TargetFilter {
        let id = keys::machine_deployment(self).unwrap_or_else(|| self.name_any());
        TargetFilter::for_cluster(cluster).machine_deployment(id)
    }
}

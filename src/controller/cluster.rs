//! AWSCluster as a refresh target: every group of the cluster

use kube::ResourceExt;

use super::RefreshTarget;
use crate::crd::AWSCluster;
use crate::refresh::{RefreshScope, TargetFilter};

impl RefreshTarget for AWSCluster {
    fn refresh_scope(&self) -> RefreshScope {
        RefreshScope::Cluster(self.name_any())
    }

    fn cluster_name(&self) -> Option<String> {
        Some(self.name_any())
    }

    fn target_filter(&self, cluster: &str) -> TargetFilter {
        TargetFilter::for_cluster(cluster)
    }
}

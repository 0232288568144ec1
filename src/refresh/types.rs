//! Data model for instance refresh orchestration
//!
//! These are snapshots of provider state taken once per run. Nothing here
//! is persisted; every run re-reads the provider.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::keys::{CLUSTER_LABEL, CONTROL_PLANE_LABEL, MACHINE_DEPLOYMENT_LABEL};
use crate::Error;

/// Version selector that always resolves to the newest launch template version
pub const LATEST_LAUNCH_TEMPLATE_VERSION: &str = "$Latest";

/// Minimum healthy percentage used when the resource does not set one
pub const DEFAULT_MIN_HEALTHY_PERCENTAGE: u8 = 90;

/// Reference to an EC2 launch template
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchTemplateRef {
    /// Launch template id (e.g. "lt-0abc...")
    pub id: String,
}

impl LaunchTemplateRef {
    /// Create a reference from a launch template id
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// An instance in an Auto Scaling Group
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instance {
    /// EC2 instance id
    pub id: String,
    /// Launch template the instance was created from
    pub launch_template: Option<LaunchTemplateRef>,
}

/// Snapshot of an Auto Scaling Group
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Group {
    /// Auto Scaling Group name
    pub name: String,
    /// Group tags
    pub tags: BTreeMap<String, String>,
    /// Instances currently in the group (possibly empty)
    pub instances: Vec<Instance>,
    /// Launch template configured directly on the group, if any
    pub launch_template: Option<LaunchTemplateRef>,
}

impl Group {
    /// Launch template to refresh the group against.
    ///
    /// The group-level template wins; otherwise the first instance that
    /// carries one is used.
    pub fn launch_template(&self) -> Option<&LaunchTemplateRef> {
        self.launch_template.as_ref().or_else(|| {
            self.instances
                .iter()
                .find_map(|instance| instance.launch_template.as_ref())
        })
    }
}

/// The resource that owns a set of groups and carries their cancel flag
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshScope {
    /// All groups of a cluster (`AWSCluster`)
    Cluster(String),
    /// The control plane groups (`AWSControlPlane`)
    ControlPlane(String),
    /// One node pool (`AWSMachineDeployment`)
    MachineDeployment(String),
}

impl RefreshScope {
    /// Kind of the owning custom resource
    pub fn kind(&self) -> &'static str {
        match self {
            RefreshScope::Cluster(_) => "AWSCluster",
            RefreshScope::ControlPlane(_) => "AWSControlPlane",
            RefreshScope::MachineDeployment(_) => "AWSMachineDeployment",
        }
    }

    /// Name of the owning custom resource
    pub fn name(&self) -> &str {
        match self {
            RefreshScope::Cluster(name)
            | RefreshScope::ControlPlane(name)
            | RefreshScope::MachineDeployment(name) => name,
        }
    }
}

impl fmt::Display for RefreshScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind(), self.name())
    }
}

/// Tag constraints selecting the groups of one run.
///
/// Every pair must match (logical AND). The cluster pair is always present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetFilter {
    tags: BTreeMap<String, String>,
}

impl TargetFilter {
    /// Filter selecting every group of a cluster
    pub fn for_cluster(cluster: impl Into<String>) -> Self {
        Self {
            tags: BTreeMap::from([(CLUSTER_LABEL.to_string(), cluster.into())]),
        }
    }

    /// Narrow the filter with an extra tag pair
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Narrow the filter to a control plane
    pub fn control_plane(self, id: impl Into<String>) -> Self {
        self.with_tag(CONTROL_PLANE_LABEL, id)
    }

    /// Narrow the filter to a node pool
    pub fn machine_deployment(self, id: impl Into<String>) -> Self {
        self.with_tag(MACHINE_DEPLOYMENT_LABEL, id)
    }

    /// Iterate over the tag pairs
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.tags.iter()
    }

    /// Value required for a tag key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Cluster id the filter targets
    pub fn cluster(&self) -> &str {
        self.get(CLUSTER_LABEL).unwrap_or_default()
    }

    /// Whether a group's tags satisfy every pair of the filter
    pub fn matches(&self, group: &Group) -> bool {
        self.tags
            .iter()
            .all(|(k, v)| group.tags.get(k).is_some_and(|tag| tag == v))
    }

    /// Resolve the single resource owning the filtered groups.
    ///
    /// The control plane tag wins over the machine deployment tag, which
    /// wins over the cluster tag.
    pub fn scope(&self) -> RefreshScope {
        if let Some(id) = self.get(CONTROL_PLANE_LABEL) {
            RefreshScope::ControlPlane(id.to_string())
        } else if let Some(id) = self.get(MACHINE_DEPLOYMENT_LABEL) {
            RefreshScope::MachineDeployment(id.to_string())
        } else {
            RefreshScope::Cluster(self.cluster().to_string())
        }
    }
}

/// Status of an instance refresh as reported by the provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshStatus {
    /// Accepted, not yet started
    Pending,
    /// Replacing instances
    InProgress,
    /// All instances replaced
    Successful,
    /// Stopped on failure
    Failed,
    /// Cancel requested, winding down
    Cancelling,
    /// Cancelled
    Cancelled,
    /// Rolling back to the previous configuration
    RollbackInProgress,
    /// Rollback failed
    RollbackFailed,
    /// Rollback completed
    RollbackSuccessful,
    /// A status this operator does not know about
    Unknown(String),
}

impl RefreshStatus {
    /// Parse the provider's status string
    pub fn from_provider(status: &str) -> Self {
        match status {
            "Pending" => Self::Pending,
            "InProgress" => Self::InProgress,
            "Successful" => Self::Successful,
            "Failed" => Self::Failed,
            "Cancelling" => Self::Cancelling,
            "Cancelled" => Self::Cancelled,
            "RollbackInProgress" => Self::RollbackInProgress,
            "RollbackFailed" => Self::RollbackFailed,
            "RollbackSuccessful" => Self::RollbackSuccessful,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Provider spelling of the status
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "InProgress",
            Self::Successful => "Successful",
            Self::Failed => "Failed",
            Self::Cancelling => "Cancelling",
            Self::Cancelled => "Cancelled",
            Self::RollbackInProgress => "RollbackInProgress",
            Self::RollbackFailed => "RollbackFailed",
            Self::RollbackSuccessful => "RollbackSuccessful",
            Self::Unknown(s) => s,
        }
    }
}

impl fmt::Display for RefreshStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The most recent instance refresh of a group
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshOperation {
    /// Provider-assigned refresh id
    pub id: String,
    /// Group the refresh belongs to
    pub group: String,
    /// Current status
    pub status: RefreshStatus,
    /// When the refresh started
    pub start_time: Option<DateTime<Utc>>,
    /// When the refresh reached a final state
    pub end_time: Option<DateTime<Utc>>,
    /// Percentage of instances replaced so far
    pub percentage_complete: Option<i32>,
}

impl RefreshOperation {
    /// Whether the refresh ended no earlier than `window` before `now`
    pub fn completed_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let Some(end) = self.end_time else {
            return false;
        };
        let Ok(window) = chrono::Duration::from_std(window) else {
            return true;
        };
        match now.checked_sub_signed(window) {
            Some(cutoff) => end >= cutoff,
            None => true,
        }
    }
}

/// Validated minimum healthy percentage, always in `[0, 100]`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MinHealthyPercentage(u8);

impl MinHealthyPercentage {
    /// Validate a raw percentage
    pub fn new(value: i64) -> Result<Self, Error> {
        if !(0..=100).contains(&value) {
            return Err(Error::validation(format!(
                "minimum healthy percentage must be between 0 and 100, got {value}"
            )));
        }
        Ok(Self(value as u8))
    }

    /// The percentage
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for MinHealthyPercentage {
    fn default() -> Self {
        Self(DEFAULT_MIN_HEALTHY_PERCENTAGE)
    }
}

/// How instances are replaced. Only rolling replacement is ever requested.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RefreshStrategy {
    /// Replace instances in batches while honouring the healthy floor
    #[default]
    Rolling,
}

impl RefreshStrategy {
    /// Provider spelling of the strategy
    pub fn as_str(self) -> &'static str {
        match self {
            RefreshStrategy::Rolling => "Rolling",
        }
    }
}

/// Parameters of a new instance refresh
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshRequest {
    /// Launch template to converge the group on
    pub launch_template: LaunchTemplateRef,
    /// Launch template version selector
    pub version: String,
    /// Healthy floor during replacement
    pub min_healthy_percentage: MinHealthyPercentage,
    /// Replacement strategy
    pub strategy: RefreshStrategy,
}

impl RefreshRequest {
    /// Build the request for a group, or `None` if the group has no launch template
    pub fn for_group(group: &Group, min_healthy_percentage: MinHealthyPercentage) -> Option<Self> {
        group.launch_template().map(|lt| Self {
            launch_template: lt.clone(),
            version: LATEST_LAUNCH_TEMPLATE_VERSION.to_string(),
            min_healthy_percentage,
            strategy: RefreshStrategy::Rolling,
        })
    }
}

/// What happened to one group during a run
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GroupOutcome {
    /// A refresh finished recently enough that no new one was started
    SkippedRecentlyRefreshed,
    /// The group has no launch template to refresh against
    SkippedNoLaunchTemplate,
    /// The refresh completed successfully
    Refreshed,
    /// The refresh ended in a cancelling/cancelled state not caused by this run
    Resolved(RefreshStatus),
    /// The refresh was cancelled because the cancel flag was set
    CancelledByOperator,
}

/// Outcome for a single group
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupResult {
    /// Auto Scaling Group name
    pub group: String,
    /// What happened
    pub outcome: GroupOutcome,
}

/// Result of a whole run, in processing order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Per-group outcomes
    pub groups: Vec<GroupResult>,
}

impl RefreshReport {
    /// Whether the run stopped because the operator cancelled it
    pub fn cancelled(&self) -> bool {
        self.groups
            .iter()
            .any(|g| g.outcome == GroupOutcome::CancelledByOperator)
    }

    /// Number of groups refreshed to completion
    pub fn refreshed(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| g.outcome == GroupOutcome::Refreshed)
            .count()
    }

    /// Number of groups left alone, recently refreshed or without launch template
    pub fn skipped(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| {
                matches!(
                    g.outcome,
                    GroupOutcome::SkippedRecentlyRefreshed | GroupOutcome::SkippedNoLaunchTemplate
                )
            })
            .count()
    }

    /// Number of groups whose refresh was cancelled outside this run
    pub fn resolved(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| matches!(g.outcome, GroupOutcome::Resolved(_)))
            .count()
    }

    /// One-line account of the run for events
    pub fn summary(&self) -> String {
        if self.groups.is_empty() {
            return "no auto scaling groups matched".to_string();
        }
        let mut summary = format!(
            "{} of {} ASGs refreshed, {} skipped",
            self.refreshed(),
            self.groups.len(),
            self.skipped()
        );
        let resolved = self.resolved();
        if resolved > 0 {
            summary.push_str(&format!(", {resolved} cancelled elsewhere"));
        }
        summary
    }

    /// Outcome for a group, if it was reached
    pub fn outcome(&self, group: &str) -> Option<&GroupOutcome> {
        self.groups
            .iter()
            .find(|g| g.group == group)
            .map(|g| &g.outcome)
    }

    pub(crate) fn record(&mut self, group: &str, outcome: GroupOutcome) {
        self.groups.push(GroupResult {
            group: group.to_string(),
            outcome,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 12, minute, 0).unwrap()
    }

    fn operation(end_time: Option<DateTime<Utc>>) -> RefreshOperation {
        RefreshOperation {
            id: "r-1".to_string(),
            group: "asg".to_string(),
            status: RefreshStatus::Successful,
            start_time: None,
            end_time,
            percentage_complete: Some(100),
        }
    }

    #[rstest]
    #[case::ten_minutes_ago(Some(at(40)), true)]
    #[case::exactly_on_the_boundary(Some(at(20)), true)]
    #[case::thirty_one_minutes_ago(Some(at(19)), false)]
    #[case::still_running(None, false)]
    fn test_completed_within_window(
        #[case] end_time: Option<DateTime<Utc>>,
        #[case] expected: bool,
    ) {
        let window = Duration::from_secs(30 * 60);
        assert_eq!(operation(end_time).completed_within(at(50), window), expected);
    }

    #[rstest]
    #[case(-1)]
    #[case(101)]
    #[case(i64::MIN)]
    #[case(i64::MAX)]
    fn test_min_healthy_rejects_out_of_range(#[case] value: i64) {
        assert!(matches!(
            MinHealthyPercentage::new(value),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_min_healthy_bounds_and_default() {
        assert_eq!(MinHealthyPercentage::new(0).unwrap().get(), 0);
        assert_eq!(MinHealthyPercentage::new(100).unwrap().get(), 100);
        assert_eq!(MinHealthyPercentage::default().get(), 90);
    }

    #[test]
    fn test_status_parsing_keeps_unknown_values() {
        assert_eq!(
            RefreshStatus::from_provider("RollbackInProgress"),
            RefreshStatus::RollbackInProgress
        );
        let unknown = RefreshStatus::from_provider("Baking");
        assert_eq!(unknown, RefreshStatus::Unknown("Baking".to_string()));
        assert_eq!(unknown.to_string(), "Baking");
    }

    #[test]
    fn test_group_launch_template_prefers_group_level() {
        let mut group = Group {
            name: "asg".to_string(),
            instances: vec![
                Instance {
                    id: "i-1".to_string(),
                    launch_template: None,
                },
                Instance {
                    id: "i-2".to_string(),
                    launch_template: Some(LaunchTemplateRef::new("lt-instance")),
                },
            ],
            ..Default::default()
        };
        assert_eq!(group.launch_template().unwrap().id, "lt-instance");

        group.launch_template = Some(LaunchTemplateRef::new("lt-group"));
        assert_eq!(group.launch_template().unwrap().id, "lt-group");
    }

    #[test]
    fn test_request_requires_launch_template() {
        let group = Group {
            name: "empty".to_string(),
            ..Default::default()
        };
        assert!(RefreshRequest::for_group(&group, MinHealthyPercentage::default()).is_none());

        let group = Group {
            name: "asg".to_string(),
            launch_template: Some(LaunchTemplateRef::new("lt-1")),
            ..Default::default()
        };
        let request = RefreshRequest::for_group(&group, MinHealthyPercentage::default()).unwrap();
        assert_eq!(request.version, "$Latest");
        assert_eq!(request.strategy.as_str(), "Rolling");
    }

    #[test]
    fn test_filter_scope_resolution() {
        let filter = TargetFilter::for_cluster("no7t8");
        assert_eq!(filter.scope(), RefreshScope::Cluster("no7t8".to_string()));

        let filter = TargetFilter::for_cluster("no7t8").machine_deployment("m4gb8");
        assert_eq!(
            filter.scope(),
            RefreshScope::MachineDeployment("m4gb8".to_string())
        );

        let filter = TargetFilter::for_cluster("no7t8").control_plane("x5o6r");
        assert_eq!(filter.scope(), RefreshScope::ControlPlane("x5o6r".to_string()));
        assert_eq!(filter.scope().to_string(), "AWSControlPlane/x5o6r");
        assert_eq!(filter.cluster(), "no7t8");
    }

    #[test]
    fn test_filter_matches_all_pairs() {
        let filter = TargetFilter::for_cluster("no7t8").machine_deployment("m4gb8");
        let mut group = Group {
            name: "asg".to_string(),
            tags: BTreeMap::from([(CLUSTER_LABEL.to_string(), "no7t8".to_string())]),
            ..Default::default()
        };
        assert!(!filter.matches(&group));

        group
            .tags
            .insert(MACHINE_DEPLOYMENT_LABEL.to_string(), "m4gb8".to_string());
        assert!(filter.matches(&group));
    }

    #[test]
    fn test_report_accessors() {
        let mut report = RefreshReport::default();
        report.record("a", GroupOutcome::SkippedRecentlyRefreshed);
        report.record("b", GroupOutcome::Refreshed);
        assert!(!report.cancelled());
        assert_eq!(report.refreshed(), 1);

        report.record("c", GroupOutcome::CancelledByOperator);
        assert!(report.cancelled());
        assert_eq!(report.outcome("a"), Some(&GroupOutcome::SkippedRecentlyRefreshed));
        assert_eq!(report.outcome("missing"), None);
    }

    #[rstest]
    #[case::nothing_matched(vec![], "no auto scaling groups matched")]
    #[case::all_refreshed(
        vec![GroupOutcome::Refreshed, GroupOutcome::Refreshed],
        "2 of 2 ASGs refreshed, 0 skipped"
    )]
    #[case::all_skipped(
        vec![GroupOutcome::SkippedRecentlyRefreshed, GroupOutcome::SkippedNoLaunchTemplate],
        "0 of 2 ASGs refreshed, 2 skipped"
    )]
    #[case::resolved_elsewhere(
        vec![GroupOutcome::Refreshed, GroupOutcome::Resolved(RefreshStatus::Cancelled)],
        "1 of 2 ASGs refreshed, 0 skipped, 1 cancelled elsewhere"
    )]
    fn test_report_summary(#[case] outcomes: Vec<GroupOutcome>, #[case] expected: &str) {
        let mut report = RefreshReport::default();
        for (i, outcome) in outcomes.into_iter().enumerate() {
            report.record(&format!("asg-{i}"), outcome);
        }
        assert_eq!(report.summary(), expected);
    }
}

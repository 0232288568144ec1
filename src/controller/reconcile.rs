//! Shared reconcile flow for the three refresh controllers
//!
//! Triggered by the instance refresh annotation. A run resolves the owning
//! AWSCluster and its AWS account, refreshes the groups selected by the
//! resource's tags and finally removes the trigger annotation so the run is
//! not repeated. Retryable and AWS failures keep the annotation and requeue.

use std::fmt::Debug;
use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

use super::{Context, KubeCancelOracle};
use crate::aws::{AccountDetails, ClusterScope};
use crate::crd::AWSCluster;
use crate::events::{reasons, ResourceEvents};
use crate::keys::{self, CANCEL_INSTANCE_REFRESH_ANNOTATION, INSTANCE_REFRESH_ANNOTATION};
use crate::refresh::{
    InstanceRefreshService, MinHealthyPercentage, RefreshJob, RefreshReport, RefreshScope,
    TargetFilter,
};
use crate::Error;

/// A custom resource whose annotation drives an instance refresh
pub trait RefreshTarget:
    Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static
{
    /// The resource itself, as the owner of its groups
    fn refresh_scope(&self) -> RefreshScope;

    /// Name of the AWSCluster the resource belongs to
    fn cluster_name(&self) -> Option<String>;

    /// Tags selecting the groups of this resource
    fn target_filter(&self, cluster: &str) -> TargetFilter;
}

/// Reconcile a refresh target
#[instrument(skip(obj, ctx), fields(kind = %K::kind(&()), name = %obj.name_any()))]
pub async fn reconcile<K: RefreshTarget>(obj: Arc<K>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = obj.namespace().unwrap_or_default();
    let events = ResourceEvents::new(ctx.events.clone(), obj.object_ref(&()));

    if !keys::instance_refresh_requested(obj.as_ref()) {
        debug!(
            annotation = INSTANCE_REFRESH_ANNOTATION,
            "No instance refresh requested"
        );
        return Ok(Action::requeue(ctx.config.requeue_interval));
    }

    let min_healthy = match keys::min_healthy_percentage(obj.as_ref()) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Invalid instance refresh annotation");
            events
                .warning(reasons::VALIDATION_FAILED, e.to_string())
                .await;
            return Err(e);
        }
    };

    if keys::cancel_requested(obj.as_ref()) {
        warn!(
            annotation = CANCEL_INSTANCE_REFRESH_ANNOTATION,
            "Cancel annotation already set, the refresh will be cancelled at the first poll"
        );
    }

    let Some(cluster_name) = obj.cluster_name() else {
        warn!(
            label = keys::CLUSTER_LABEL,
            "Resource has no cluster label, ignoring"
        );
        return Ok(Action::await_change());
    };

    let Some(cluster) = ctx.kube.get_cluster(&cluster_name, &namespace).await? else {
        info!(cluster = %cluster_name, "AWSCluster not found, ignoring");
        return Ok(Action::await_change());
    };

    let scope = obj.refresh_scope();
    let filter = obj.target_filter(&cluster_name);
    if filter.scope() != scope {
        warn!(
            resource = %scope,
            tagged = %filter.scope(),
            "Resource name differs from its id label, reading the cancel flag from the resource"
        );
    }

    match run(&ctx, &cluster, filter, &scope, min_healthy, &namespace, &events).await {
        Ok(report) if report.cancelled() => {
            info!(refreshed = report.refreshed(), "Instance refresh cancelled");
            events
                .warning(
                    reasons::INSTANCE_REFRESH_CANCELLED,
                    format!("Instance refresh of {scope} was cancelled"),
                )
                .await;
            clear_annotations(
                &ctx,
                &scope,
                &namespace,
                &[INSTANCE_REFRESH_ANNOTATION, CANCEL_INSTANCE_REFRESH_ANNOTATION],
            )
            .await?;
            Ok(Action::await_change())
        }
        Ok(report) => {
            info!(
                groups = report.groups.len(),
                refreshed = report.refreshed(),
                skipped = report.skipped(),
                "Instance refresh finished"
            );
            events
                .normal(
                    reasons::INSTANCE_REFRESH_SUCCESSFUL,
                    format!("Instance refresh of {scope} finished: {}", report.summary()),
                )
                .await;
            clear_annotations(&ctx, &scope, &namespace, &[INSTANCE_REFRESH_ANNOTATION]).await?;
            Ok(Action::await_change())
        }
        Err(e) if e.is_retryable() => Err(e),
        // Permanent AWS refusals are reported but keep the trigger.
        Err(e) if e.is_provider() => {
            events
                .warning(reasons::INSTANCE_REFRESH_FAILED, e.to_string())
                .await;
            Err(e)
        }
        Err(e) => {
            events
                .warning(reasons::INSTANCE_REFRESH_FAILED, e.to_string())
                .await;
            clear_annotations(&ctx, &scope, &namespace, &[INSTANCE_REFRESH_ANNOTATION]).await?;
            Err(e)
        }
    }
}

/// Resolve the cluster's AWS access and run the orchestration
async fn run(
    ctx: &Context,
    cluster: &AWSCluster,
    filter: TargetFilter,
    owner: &RefreshScope,
    min_healthy: MinHealthyPercentage,
    namespace: &str,
    events: &ResourceEvents,
) -> Result<RefreshReport, Error> {
    let cluster_name = cluster.name_any();
    cluster.spec.validate(&cluster_name)?;

    let account = account_details(ctx, cluster).await?;
    let scope = ClusterScope::new(
        account,
        &cluster_name,
        cluster.namespace().unwrap_or_default(),
        &ctx.config.installation,
        &cluster.spec.provider.region,
    )?;
    let api = ctx.autoscaling.connect(&scope).await?;

    let service = InstanceRefreshService::new(
        api,
        Arc::new(KubeCancelOracle::new(ctx.kube.clone())),
        ctx.clock.clone(),
        ctx.config.refresh.clone(),
    );

    let (tx, rx) = oneshot::channel::<String>();
    let starting_events = events.clone();
    let refresh_scope = owner.clone();
    let notifier = tokio::spawn(async move {
        if let Ok(group) = rx.await {
            starting_events
                .normal(
                    reasons::INSTANCE_REFRESH_STARTING,
                    format!("Refreshing instances of {refresh_scope}, starting with ASG {group}"),
                )
                .await;
        }
    });

    let job = RefreshJob::new(filter, i64::from(min_healthy.get()), namespace)
        .owner(owner.clone())
        .events(events.clone())
        .on_start(tx);
    let result = service.refresh(job).await;

    // The sender is gone by now, so the notifier is finished or about to be.
    if let Err(e) = notifier.await {
        warn!(error = %e, "Refresh start notifier failed");
    }
    result
}

/// Role and account of a cluster, from its credential secret
async fn account_details(ctx: &Context, cluster: &AWSCluster) -> Result<AccountDetails, Error> {
    let cluster_name = cluster.name_any();
    let reference = &cluster.spec.provider.credential_secret;
    let secret = ctx
        .kube
        .get_secret(&reference.name, &reference.namespace)
        .await?
        .ok_or_else(|| {
            Error::credentials(
                &cluster_name,
                format!(
                    "credential secret {}/{} not found",
                    reference.namespace, reference.name
                ),
            )
        })?;
    AccountDetails::from_secret(&cluster_name, &secret)
}

/// Remove annotations, ignoring conflicts with concurrent writers
async fn clear_annotations(
    ctx: &Context,
    scope: &RefreshScope,
    namespace: &str,
    keys: &[&str],
) -> Result<(), Error> {
    let keys = keys.iter().map(|key| key.to_string()).collect();
    match ctx.kube.remove_annotations(scope, namespace, keys).await {
        Ok(()) => Ok(()),
        Err(Error::Kube {
            source: kube::Error::Api(ae),
        }) if ae.code == 409 => {
            info!(resource = %scope, "Conflict removing refresh annotations, leaving them for the next reconcile");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Error policy shared by the refresh controllers
///
/// Retryable and provider errors are retried after the requeue interval.
/// Anything else waits for the resource to change.
pub fn error_policy<K: RefreshTarget>(obj: Arc<K>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        kind = %K::kind(&()),
        name = %obj.name_any(),
        "reconciliation failed"
    );

    if error.is_retryable() || error.is_provider() {
        Action::requeue(ctx.config.requeue_interval)
    } else {
        Action::await_change()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;
    use kube::core::ErrorResponse;
    use mockall::Sequence;

    use crate::aws::{MockAutoScalingFactory, ROLE_ARN_KEY};
    use crate::controller::MockKubeClient;
    use crate::crd::{
        AWSClusterProviderSpec, AWSClusterSpec, AWSMachineDeployment, AWSMachineDeploymentSpec,
        CredentialSecret,
    };
    use crate::events::testing::RecordingPublisher;
    use crate::keys::{CLUSTER_LABEL, MACHINE_DEPLOYMENT_LABEL, MIN_HEALTHY_PERCENTAGE_ANNOTATION};
    use crate::refresh::provider::MockAutoScalingApi;
    use crate::refresh::{
        AutoScalingApi, Group, Instance, LaunchTemplateRef, ManualClock, RefreshOperation,
        RefreshStatus,
    };

    const NAMESPACE: &str = "org-acme";

    // ===== Fixtures =====

    fn machine_deployment(annotations: &[(&str, &str)]) -> Arc<AWSMachineDeployment> {
        let mut md = AWSMachineDeployment::new("m4gb8", AWSMachineDeploymentSpec::default());
        md.metadata.namespace = Some(NAMESPACE.to_string());
        md.metadata.labels = Some(BTreeMap::from([
            (CLUSTER_LABEL.to_string(), "no7t8".to_string()),
            (MACHINE_DEPLOYMENT_LABEL.to_string(), "m4gb8".to_string()),
        ]));
        md.metadata.annotations = Some(
            annotations
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        Arc::new(md)
    }

    fn triggered() -> Arc<AWSMachineDeployment> {
        machine_deployment(&[(INSTANCE_REFRESH_ANNOTATION, "")])
    }

    fn aws_cluster() -> AWSCluster {
        let mut cluster = AWSCluster::new(
            "no7t8",
            AWSClusterSpec {
                provider: AWSClusterProviderSpec {
                    credential_secret: CredentialSecret {
                        name: "credential-default".to_string(),
                        namespace: "giantswarm".to_string(),
                    },
                    region: "eu-west-1".to_string(),
                },
            },
        );
        cluster.metadata.namespace = Some(NAMESPACE.to_string());
        cluster
    }

    fn credential_secret() -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("credential-default".to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                ROLE_ARN_KEY.to_string(),
                ByteString(b"arn:aws:iam::123456789012:role/GiantSwarmAWSOperator".to_vec()),
            )])),
            ..Default::default()
        }
    }

    fn group(name: &str) -> Group {
        Group {
            name: name.to_string(),
            tags: BTreeMap::new(),
            instances: vec![Instance {
                id: "i-1".to_string(),
                launch_template: Some(LaunchTemplateRef::new("lt-1")),
            }],
            launch_template: None,
        }
    }

    fn operation(status: RefreshStatus) -> Option<RefreshOperation> {
        Some(RefreshOperation {
            id: "r-1".to_string(),
            group: "asg-a".to_string(),
            status,
            start_time: None,
            end_time: None,
            percentage_complete: None,
        })
    }

    fn conflict() -> Error {
        Error::from(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "the object has been modified".to_string(),
            reason: "Conflict".to_string(),
            code: 409,
        }))
    }

    /// Kube mock that resolves the cluster and its credentials
    fn kube_with_cluster() -> MockKubeClient {
        let mut kube = MockKubeClient::new();
        kube.expect_get_cluster()
            .withf(|name, ns| name == "no7t8" && ns == NAMESPACE)
            .returning(|_, _| Ok(Some(aws_cluster())));
        kube.expect_get_secret()
            .withf(|name, ns| name == "credential-default" && ns == "giantswarm")
            .returning(|_, _| Ok(Some(credential_secret())));
        kube
    }

    /// Factory handing out `api` for the cluster's account and region
    fn factory(api: MockAutoScalingApi) -> MockAutoScalingFactory {
        let api: Arc<dyn AutoScalingApi> = Arc::new(api);
        let mut factory = MockAutoScalingFactory::new();
        factory
            .expect_connect()
            .withf(|scope| {
                scope.region == "eu-west-1"
                    && scope.account.account_id == "123456789012"
                    && scope.cluster_name == "no7t8"
            })
            .times(1)
            .return_once(move |_| Ok(api));
        factory
    }

    /// One group that refreshes successfully on the first poll
    fn api_refreshing_one_group() -> MockAutoScalingApi {
        let mut api = MockAutoScalingApi::new();
        api.expect_list_groups()
            .withf(|filter| filter.get(MACHINE_DEPLOYMENT_LABEL) == Some("m4gb8"))
            .returning(|_| Ok(vec![group("asg-a")]));
        let mut seq = Sequence::new();
        api.expect_describe_latest_refresh()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));
        api.expect_describe_latest_refresh()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(operation(RefreshStatus::Successful)));
        api.expect_start_refresh()
            .withf(|_, request| request.min_healthy_percentage.get() == 90)
            .times(1)
            .returning(|_, _| Ok("r-1".to_string()));
        api
    }

    fn context(
        kube: MockKubeClient,
        factory: MockAutoScalingFactory,
        events: Arc<RecordingPublisher>,
    ) -> Arc<Context> {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap());
        Arc::new(Context::for_testing(
            Arc::new(kube),
            Arc::new(factory),
            events,
            Arc::new(clock),
        ))
    }

    fn expect_removal(kube: &mut MockKubeClient, keys: Vec<&'static str>) {
        kube.expect_remove_annotations()
            .withf(move |scope, ns, removed| {
                *scope == RefreshScope::MachineDeployment("m4gb8".to_string())
                    && ns == NAMESPACE
                    && removed.iter().map(String::as_str).eq(keys.iter().copied())
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
    }

    // ===== Trigger Handling =====

    /// Story: resources nobody annotated are looked at again later but never
    /// touch the API server or AWS.
    #[tokio::test]
    async fn story_without_trigger_annotation_requeues_quietly() {
        let events = Arc::new(RecordingPublisher::default());
        let ctx = context(
            MockKubeClient::new(),
            MockAutoScalingFactory::new(),
            events.clone(),
        );

        let action = reconcile(machine_deployment(&[]), ctx).await.unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(300)));
        assert!(events.reasons().is_empty());
    }

    /// Story: a bad min-healthy-percentage is reported as a ValidationFailed
    /// event before AWS is contacted.
    #[tokio::test]
    async fn story_invalid_min_healthy_percentage_is_reported() {
        let events = Arc::new(RecordingPublisher::default());
        let ctx = context(
            MockKubeClient::new(),
            MockAutoScalingFactory::new(),
            events.clone(),
        );
        let md = machine_deployment(&[
            (INSTANCE_REFRESH_ANNOTATION, ""),
            (MIN_HEALTHY_PERCENTAGE_ANNOTATION, "150"),
        ]);

        let err = reconcile(md, ctx).await.unwrap_err();

        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(events.reasons(), vec![reasons::VALIDATION_FAILED]);
    }

    #[tokio::test]
    async fn missing_cluster_stops_quietly() {
        let mut kube = MockKubeClient::new();
        kube.expect_get_cluster().returning(|_, _| Ok(None));
        let ctx = context(
            kube,
            MockAutoScalingFactory::new(),
            Arc::new(RecordingPublisher::default()),
        );

        let action = reconcile(triggered(), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());
    }

    // ===== Refresh Outcomes =====

    /// Story: the user annotates a node pool; its group is refreshed, the
    /// user sees start and success events, and the trigger is removed.
    #[tokio::test]
    async fn story_successful_refresh_clears_trigger() {
        let mut kube = kube_with_cluster();
        expect_removal(&mut kube, vec![INSTANCE_REFRESH_ANNOTATION]);
        let events = Arc::new(RecordingPublisher::default());
        let ctx = context(kube, factory(api_refreshing_one_group()), events.clone());

        let action = reconcile(triggered(), ctx).await.unwrap();

        assert_eq!(action, Action::await_change());
        let recorded = events.reasons();
        assert!(recorded.contains(&reasons::INSTANCE_REFRESH_STARTING.to_string()));
        assert!(recorded.contains(&reasons::GROUP_REFRESHED.to_string()));
        assert_eq!(
            recorded.last().map(String::as_str),
            Some(reasons::INSTANCE_REFRESH_SUCCESSFUL)
        );
        assert_eq!(
            events.notes().last().map(String::as_str),
            Some("Instance refresh of AWSMachineDeployment/m4gb8 finished: 1 of 1 ASGs refreshed, 0 skipped")
        );
    }

    /// Story: the node pool was refreshed a few minutes ago. Nothing is
    /// started and the closing event says so instead of claiming a rollout.
    #[tokio::test]
    async fn story_recently_refreshed_pool_reports_skip() {
        let mut api = MockAutoScalingApi::new();
        api.expect_list_groups()
            .returning(|_| Ok(vec![group("asg-a")]));
        api.expect_describe_latest_refresh().times(1).returning(|_| {
            Ok(Some(RefreshOperation {
                end_time: Some(Utc.with_ymd_and_hms(2026, 10, 17, 11, 50, 0).unwrap()),
                ..operation(RefreshStatus::Successful).unwrap()
            }))
        });
        api.expect_start_refresh().never();

        let mut kube = kube_with_cluster();
        expect_removal(&mut kube, vec![INSTANCE_REFRESH_ANNOTATION]);
        let events = Arc::new(RecordingPublisher::default());
        let ctx = context(kube, factory(api), events.clone());

        let action = reconcile(triggered(), ctx).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(
            events.reasons(),
            vec![reasons::INSTANCE_REFRESH_SKIPPED, reasons::INSTANCE_REFRESH_SUCCESSFUL]
        );
        assert_eq!(
            events.notes().last().map(String::as_str),
            Some("Instance refresh of AWSMachineDeployment/m4gb8 finished: 0 of 1 ASGs refreshed, 1 skipped")
        );
    }

    /// Story: the operator sets the cancel annotation mid-refresh. The run
    /// ends with a Cancelled warning and both annotations are removed.
    #[tokio::test]
    async fn story_cancelled_refresh_clears_both_annotations() {
        let mut api = MockAutoScalingApi::new();
        api.expect_list_groups()
            .returning(|_| Ok(vec![group("asg-a"), group("asg-b")]));
        let mut seq = Sequence::new();
        api.expect_describe_latest_refresh()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));
        api.expect_describe_latest_refresh()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(operation(RefreshStatus::InProgress)));
        api.expect_start_refresh()
            .times(1)
            .returning(|_, _| Ok("r-1".to_string()));
        api.expect_cancel_refresh()
            .withf(|group| group == "asg-a")
            .times(1)
            .returning(|_| Ok(()));

        let mut kube = kube_with_cluster();
        kube.expect_annotations()
            .withf(|scope, ns| {
                *scope == RefreshScope::MachineDeployment("m4gb8".to_string()) && ns == NAMESPACE
            })
            .returning(|_, _| {
                Ok(Some(BTreeMap::from([(
                    CANCEL_INSTANCE_REFRESH_ANNOTATION.to_string(),
                    String::new(),
                )])))
            });
        expect_removal(
            &mut kube,
            vec![INSTANCE_REFRESH_ANNOTATION, CANCEL_INSTANCE_REFRESH_ANNOTATION],
        );
        let events = Arc::new(RecordingPublisher::default());
        let ctx = context(kube, factory(api), events.clone());

        let action = reconcile(triggered(), ctx).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(
            events.reasons().last().map(String::as_str),
            Some(reasons::INSTANCE_REFRESH_CANCELLED)
        );
    }

    /// Story: AWS is flaky. The error goes to the error policy for a retry
    /// and the trigger stays so the next reconcile picks the run up again.
    #[tokio::test]
    async fn story_provider_error_keeps_trigger_for_retry() {
        let mut api = MockAutoScalingApi::new();
        api.expect_list_groups()
            .returning(|_| Err(Error::provider("DescribeAutoScalingGroups", "throttled")));
        let events = Arc::new(RecordingPublisher::default());
        let ctx = context(kube_with_cluster(), factory(api), events.clone());

        let err = reconcile(triggered(), ctx.clone()).await.unwrap_err();

        assert!(err.is_provider());
        assert!(events.reasons().is_empty());
        assert_eq!(
            error_policy(triggered(), &err, ctx),
            Action::requeue(Duration::from_secs(300))
        );
    }

    /// Story: the cluster's role lost its Auto Scaling permissions. The user
    /// sees a Failed warning, and the trigger stays so the run is retried
    /// once the permissions are restored.
    #[tokio::test]
    async fn story_permanent_provider_error_is_reported_and_retried() {
        let mut api = MockAutoScalingApi::new();
        api.expect_list_groups().returning(|_| {
            Err(Error::provider_permanent(
                "DescribeAutoScalingGroups",
                "AccessDenied: not authorized",
            ))
        });
        let mut kube = kube_with_cluster();
        kube.expect_remove_annotations().never();
        let events = Arc::new(RecordingPublisher::default());
        let ctx = context(kube, factory(api), events.clone());

        let err = reconcile(triggered(), ctx.clone()).await.unwrap_err();

        assert!(err.is_provider());
        assert!(!err.is_retryable());
        assert_eq!(events.reasons(), vec![reasons::INSTANCE_REFRESH_FAILED]);
        assert_eq!(
            error_policy(triggered(), &err, ctx),
            Action::requeue(Duration::from_secs(300))
        );
    }

    /// Story: the cluster's credential secret is gone. Retrying cannot help,
    /// so the user gets a Failed warning and the trigger is dropped.
    #[tokio::test]
    async fn story_missing_credentials_fail_the_run() {
        let mut kube = MockKubeClient::new();
        kube.expect_get_cluster()
            .returning(|_, _| Ok(Some(aws_cluster())));
        kube.expect_get_secret().returning(|_, _| Ok(None));
        expect_removal(&mut kube, vec![INSTANCE_REFRESH_ANNOTATION]);
        let events = Arc::new(RecordingPublisher::default());
        let ctx = context(kube, MockAutoScalingFactory::new(), events.clone());

        let err = reconcile(triggered(), ctx.clone()).await.unwrap_err();

        assert!(matches!(err, Error::Credentials { .. }));
        assert_eq!(events.reasons(), vec![reasons::INSTANCE_REFRESH_FAILED]);
        assert_eq!(error_policy(triggered(), &err, ctx), Action::await_change());
    }

    #[tokio::test]
    async fn annotation_conflict_is_ignored() {
        let mut kube = kube_with_cluster();
        kube.expect_remove_annotations()
            .times(1)
            .returning(|_, _, _| Err(conflict()));
        let ctx = context(
            kube,
            factory(api_refreshing_one_group()),
            Arc::new(RecordingPublisher::default()),
        );

        let action = reconcile(triggered(), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());
    }

    #[tokio::test]
    async fn annotation_removal_failure_is_returned() {
        let mut kube = kube_with_cluster();
        kube.expect_remove_annotations().times(1).returning(|_, _, _| {
            Err(Error::internal_with_context("kube", "connection reset"))
        });
        let ctx = context(
            kube,
            factory(api_refreshing_one_group()),
            Arc::new(RecordingPublisher::default()),
        );

        assert!(reconcile(triggered(), ctx).await.is_err());
    }

    /// A node pool whose name differs from its id label is tagged by the
    /// label, but its cancel flag and trigger live on the resource itself.
    #[tokio::test]
    async fn cancel_lookup_and_cleanup_use_the_same_resource() {
        let mut md = (*triggered()).clone();
        md.metadata.name = Some("pool-a".to_string());
        let md = Arc::new(md);
        let owner = RefreshScope::MachineDeployment("pool-a".to_string());

        let mut api = MockAutoScalingApi::new();
        api.expect_list_groups()
            .withf(|filter| filter.get(MACHINE_DEPLOYMENT_LABEL) == Some("m4gb8"))
            .returning(|_| Ok(vec![group("asg-a")]));
        let mut seq = Sequence::new();
        api.expect_describe_latest_refresh()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));
        api.expect_describe_latest_refresh()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(operation(RefreshStatus::InProgress)));
        api.expect_start_refresh()
            .times(1)
            .returning(|_, _| Ok("r-1".to_string()));
        api.expect_cancel_refresh().times(1).returning(|_| Ok(()));

        let mut kube = kube_with_cluster();
        let looked_up = owner.clone();
        kube.expect_annotations()
            .withf(move |scope, ns| *scope == looked_up && ns == NAMESPACE)
            .times(1)
            .returning(|_, _| {
                Ok(Some(BTreeMap::from([(
                    CANCEL_INSTANCE_REFRESH_ANNOTATION.to_string(),
                    String::new(),
                )])))
            });
        kube.expect_remove_annotations()
            .withf(move |scope, ns, _| *scope == owner && ns == NAMESPACE)
            .times(1)
            .returning(|_, _, _| Ok(()));
        let ctx = context(kube, factory(api), Arc::new(RecordingPublisher::default()));

        let action = reconcile(md, ctx).await.unwrap();
        assert_eq!(action, Action::await_change());
    }
}

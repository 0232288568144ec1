//! Auto Scaling API adapter

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_autoscaling::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_autoscaling::primitives::DateTime as AwsDateTime;
use aws_sdk_autoscaling::types::{
    AutoScalingGroup, DesiredConfiguration, Filter, InstanceRefresh, LaunchTemplateSpecification,
    RefreshPreferences, RefreshStrategy as AwsRefreshStrategy,
};
use aws_sdk_autoscaling::Client;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::refresh::{
    AutoScalingApi, Group, Instance, LaunchTemplateRef, RefreshOperation, RefreshRequest,
    RefreshStatus, RefreshStrategy, StartRefreshError, TargetFilter,
};
use crate::Error;

/// Error codes that will not go away by retrying
const PERMANENT_ERROR_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
    "ValidationError",
];

/// [`AutoScalingApi`] backed by `aws-sdk-autoscaling`
#[derive(Clone, Debug)]
pub struct AwsAutoScaling {
    client: Client,
}

impl AwsAutoScaling {
    /// Create an adapter from an SDK configuration
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    /// Wrap an existing client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AutoScalingApi for AwsAutoScaling {
    #[instrument(skip(self), fields(cluster = %filter.cluster()))]
    async fn list_groups(&self, filter: &TargetFilter) -> Result<Vec<Group>, Error> {
        let mut request = self.client.describe_auto_scaling_groups();
        for (key, value) in filter.iter() {
            request = request.filters(
                Filter::builder()
                    .name(format!("tag:{key}"))
                    .values(value)
                    .build(),
            );
        }

        let mut pages = request.into_paginator().send();
        let mut groups = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| provider_error("DescribeAutoScalingGroups", e))?;
            groups.extend(page.auto_scaling_groups().iter().map(group_from_sdk));
        }

        debug!(count = groups.len(), "Described auto scaling groups");
        Ok(groups)
    }

    async fn describe_latest_refresh(
        &self,
        group: &str,
    ) -> Result<Option<RefreshOperation>, Error> {
        let output = self
            .client
            .describe_instance_refreshes()
            .auto_scaling_group_name(group)
            .max_records(1)
            .send()
            .await
            .map_err(|e| provider_error("DescribeInstanceRefreshes", e))?;

        Ok(output
            .instance_refreshes()
            .first()
            .map(|refresh| refresh_from_sdk(group, refresh)))
    }

    #[instrument(skip(self, request), fields(launch_template = %request.launch_template.id))]
    async fn start_refresh(
        &self,
        group: &str,
        request: &RefreshRequest,
    ) -> Result<String, StartRefreshError> {
        let strategy = match request.strategy {
            RefreshStrategy::Rolling => AwsRefreshStrategy::Rolling,
        };

        let output = self
            .client
            .start_instance_refresh()
            .auto_scaling_group_name(group)
            .strategy(strategy)
            .desired_configuration(
                DesiredConfiguration::builder()
                    .launch_template(
                        LaunchTemplateSpecification::builder()
                            .launch_template_id(&request.launch_template.id)
                            .version(&request.version)
                            .build(),
                    )
                    .build(),
            )
            .preferences(
                RefreshPreferences::builder()
                    .min_healthy_percentage(i32::from(request.min_healthy_percentage.get()))
                    .build(),
            )
            .send()
            .await;

        match output {
            Ok(output) => Ok(output.instance_refresh_id().unwrap_or_default().to_string()),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_instance_refresh_in_progress_fault()) =>
            {
                Err(StartRefreshError::AlreadyInProgress {
                    group: group.to_string(),
                })
            }
            Err(e) => Err(provider_error("StartInstanceRefresh", e).into()),
        }
    }

    async fn cancel_refresh(&self, group: &str) -> Result<(), Error> {
        self.client
            .cancel_instance_refresh()
            .auto_scaling_group_name(group)
            .send()
            .await
            .map_err(|e| provider_error("CancelInstanceRefresh", e))?;
        Ok(())
    }
}

/// Map an SDK failure to a provider error, keeping the full error chain
fn provider_error<E, R>(operation: &str, err: SdkError<E, R>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let permanent = err
        .code()
        .is_some_and(|code| PERMANENT_ERROR_CODES.contains(&code));
    let message = DisplayErrorContext(&err).to_string();
    if permanent {
        Error::provider_permanent(operation, message)
    } else {
        Error::provider(operation, message)
    }
}

fn launch_template_from_sdk(spec: &LaunchTemplateSpecification) -> Option<LaunchTemplateRef> {
    spec.launch_template_id().map(LaunchTemplateRef::new)
}

fn group_from_sdk(group: &AutoScalingGroup) -> Group {
    let tags = group
        .tags()
        .iter()
        .filter_map(|tag| Some((tag.key()?.to_string(), tag.value()?.to_string())))
        .collect::<BTreeMap<_, _>>();

    let instances = group
        .instances()
        .iter()
        .map(|instance| Instance {
            id: instance.instance_id().unwrap_or_default().to_string(),
            launch_template: instance
                .launch_template()
                .and_then(launch_template_from_sdk),
        })
        .collect();

    Group {
        name: group.auto_scaling_group_name().unwrap_or_default().to_string(),
        tags,
        instances,
        launch_template: group.launch_template().and_then(launch_template_from_sdk),
    }
}

fn refresh_from_sdk(group: &str, refresh: &InstanceRefresh) -> RefreshOperation {
    RefreshOperation {
        id: refresh.instance_refresh_id().unwrap_or_default().to_string(),
        group: refresh
            .auto_scaling_group_name()
            .unwrap_or(group)
            .to_string(),
        status: refresh
            .status()
            .map(|status| RefreshStatus::from_provider(status.as_str()))
            .unwrap_or_else(|| RefreshStatus::Unknown(String::new())),
        start_time: refresh.start_time().and_then(to_chrono),
        end_time: refresh.end_time().and_then(to_chrono),
        percentage_complete: refresh.percentage_complete(),
    }
}

fn to_chrono(time: &AwsDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time.secs(), time.subsec_nanos())
}

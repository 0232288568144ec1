//! Kubernetes access for the refresh controllers
//!
//! Everything the controllers read or write in the API server goes through
//! [`KubeClient`] so reconciles can be tested without a cluster.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

#[cfg(test)]
use mockall::automock;

use crate::crd::{AWSCluster, AWSControlPlane, AWSMachineDeployment};
use crate::keys::CANCEL_INSTANCE_REFRESH_ANNOTATION;
use crate::refresh::{CancelOracle, RefreshScope};
use crate::Error;

/// Field manager used for annotation patches
const FIELD_MANAGER: &str = "rolling-node-operator";

/// Trait abstracting Kubernetes client operations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Get an AWSCluster, `None` if it does not exist
    async fn get_cluster(&self, name: &str, namespace: &str) -> Result<Option<AWSCluster>, Error>;

    /// Get a Secret, `None` if it does not exist
    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>, Error>;

    /// Annotations of the resource owning `scope`, `None` if it does not exist
    async fn annotations(
        &self,
        scope: &RefreshScope,
        namespace: &str,
    ) -> Result<Option<BTreeMap<String, String>>, Error>;

    /// Remove annotations from the resource owning `scope`
    async fn remove_annotations(
        &self,
        scope: &RefreshScope,
        namespace: &str,
        keys: Vec<String>,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn annotations_of<K>(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<BTreeMap<String, String>>, Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api
            .get_metadata_opt(name)
            .await?
            .map(|meta| meta.metadata.annotations.unwrap_or_default()))
    }

    async fn remove_annotations_of<K>(
        &self,
        name: &str,
        namespace: &str,
        keys: &[String],
    ) -> Result<(), Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.patch(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&removal_patch(keys)),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_cluster(&self, name: &str, namespace: &str) -> Result<Option<AWSCluster>, Error> {
        let api: Api<AWSCluster> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn annotations(
        &self,
        scope: &RefreshScope,
        namespace: &str,
    ) -> Result<Option<BTreeMap<String, String>>, Error> {
        match scope {
            RefreshScope::Cluster(name) => self.annotations_of::<AWSCluster>(name, namespace).await,
            RefreshScope::ControlPlane(name) => {
                self.annotations_of::<AWSControlPlane>(name, namespace)
                    .await
            }
            RefreshScope::MachineDeployment(name) => {
                self.annotations_of::<AWSMachineDeployment>(name, namespace)
                    .await
            }
        }
    }

    async fn remove_annotations(
        &self,
        scope: &RefreshScope,
        namespace: &str,
        keys: Vec<String>,
    ) -> Result<(), Error> {
        match scope {
            RefreshScope::Cluster(name) => {
                self.remove_annotations_of::<AWSCluster>(name, namespace, &keys)
                    .await
            }
            RefreshScope::ControlPlane(name) => {
                self.remove_annotations_of::<AWSControlPlane>(name, namespace, &keys)
                    .await
            }
            RefreshScope::MachineDeployment(name) => {
                self.remove_annotations_of::<AWSMachineDeployment>(name, namespace, &keys)
                    .await
            }
        }
    }
}

/// JSON merge patch deleting the given annotations
fn removal_patch(keys: &[String]) -> Value {
    let annotations: Map<String, Value> = keys
        .iter()
        .map(|key| (key.clone(), Value::Null))
        .collect();
    serde_json::json!({ "metadata": { "annotations": annotations } })
}

/// Cancel oracle reading the cancel annotation through a [`KubeClient`]
pub struct KubeCancelOracle {
    kube: Arc<dyn KubeClient>,
}

impl KubeCancelOracle {
    /// Create an oracle over the given client
    pub fn new(kube: Arc<dyn KubeClient>) -> Self {
        Self { kube }
    }
}

#[async_trait]
impl CancelOracle for KubeCancelOracle {
    async fn is_cancel_requested(
        &self,
        scope: &RefreshScope,
        namespace: &str,
    ) -> Result<bool, Error> {
        Ok(self
            .kube
            .annotations(scope, namespace)
            .await?
            .is_some_and(|annotations| annotations.contains_key(CANCEL_INSTANCE_REFRESH_ANNOTATION)))
    }
}

//! Kubernetes API access used by the controller
//!
//! Everything the convergence core reads or writes goes through `KubeClient`,
//! so tests can swap in a mock or an in-memory store.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::Client;

use crate::controller::error::Result;
use crate::crd::{MongoDB, MongoDBStatus};
use crate::resources::common::FIELD_MANAGER;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Fetch a StatefulSet, `None` when it does not exist
    async fn get_statefulset(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>>;

    async fn create_statefulset(&self, namespace: &str, sts: &StatefulSet) -> Result<StatefulSet>;

    /// Apply a JSON Patch (RFC 6902) to a StatefulSet
    ///
    /// A `test` operation on the resourceVersion makes the write conditional.
    async fn patch_statefulset(
        &self,
        namespace: &str,
        name: &str,
        patch: &json_patch::Patch,
    ) -> Result<StatefulSet>;

    /// List pods matching a label selector (`k=v,k2=v2`)
    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>>;

    async fn patch_mongodb_status(
        &self,
        namespace: &str,
        name: &str,
        status: &MongoDBStatus,
    ) -> Result<()>;
}

/// `KubeClient` backed by the API server
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_statefulset(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_statefulset(&self, namespace: &str, sts: &StatefulSet) -> Result<StatefulSet> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        Ok(api.create(&params, sts).await?)
    }

    async fn patch_statefulset(
        &self,
        namespace: &str,
        name: &str,
        patch: &json_patch::Patch,
    ) -> Result<StatefulSet> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        let patch: Patch<()> = Patch::Json(patch.clone());
        Ok(api.patch(name, &params, &patch).await?)
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api.list(&ListParams::default().labels(label_selector)).await?;
        Ok(pods.items)
    }

    async fn patch_mongodb_status(
        &self,
        namespace: &str,
        name: &str,
        status: &MongoDBStatus,
    ) -> Result<()> {
        let api: Api<MongoDB> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({ "status": status });
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        api.patch_status(name, &params, &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

use build_core::crds::openshift::{Build, BuildConfig};
use kube::{
    Api, Client, ResourceExt,
    api::{DeleteParams, ListParams, Patch, PatchParams, PostParams},
};
use serde_json::json;
use tracing::debug;

use crate::services::store::{ClusterStore, Object, StoreError};

/// [`ClusterStore`] backed by the API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: Object>(&self, ns: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), ns)
    }
}

fn name_of<K: Object>(object: &K) -> Result<String, StoreError> {
    object
        .meta()
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .ok_or(StoreError::MissingName)
}

impl ClusterStore for KubeStore {
    async fn get<K: Object>(&self, ns: &str, name: &str) -> Result<Option<K>, StoreError> {
        Ok(self.api::<K>(ns).get_opt(name).await?)
    }

    async fn list<K: Object>(&self, ns: &str, selector: &str) -> Result<Vec<K>, StoreError> {
        let params = if selector.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(selector)
        };
        Ok(self.api::<K>(ns).list(&params).await?.items)
    }

    async fn create<K: Object>(&self, ns: &str, object: &K) -> Result<K, StoreError> {
        Ok(self
            .api::<K>(ns)
            .create(&PostParams::default(), object)
            .await?)
    }

    async fn replace<K: Object>(&self, ns: &str, object: &K) -> Result<K, StoreError> {
        let name = name_of(object)?;
        Ok(self
            .api::<K>(ns)
            .replace(&name, &PostParams::default(), object)
            .await?)
    }

    async fn replace_status<K: Object>(&self, ns: &str, object: &K) -> Result<K, StoreError> {
        let name = name_of(object)?;
        let value = serde_json::to_value(object)?;
        // resourceVersion in a merge patch makes the API server reject stale writes
        let patch = json!({
            "metadata": { "resourceVersion": object.resource_version() },
            "status": value.get("status").cloned().unwrap_or_default(),
        });

        Ok(self
            .api::<K>(ns)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }

    async fn delete<K: Object>(&self, ns: &str, name: &str) -> Result<(), StoreError> {
        self.api::<K>(ns)
            .delete(name, &DeleteParams::background())
            .await?;
        Ok(())
    }

    async fn instantiate(&self, ns: &str, build_config: &str) -> Result<Build, StoreError> {
        let request = json!({
            "kind": "BuildRequest",
            "apiVersion": "build.openshift.io/v1",
            "metadata": { "name": build_config },
        });
        debug!(ns, build_config, "📨 Posting BuildRequest");

        Ok(self
            .api::<BuildConfig>(ns)
            .create_subresource::<_, Build>(
                "instantiate",
                build_config,
                &PostParams::default(),
                &request,
            )
            .await?)
    }
}

//! The narrow typed seam through which the operator reads and writes cluster objects.

pub mod kube_store;
#[cfg(test)]
pub mod memory;

use std::{fmt::Debug, future::Future};

use build_core::crds::openshift::Build;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

pub use kube_store::KubeStore;

/// Any namespaced kind the operator handles.
pub trait Object:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Serialize
    + DeserializeOwned
    + Debug
    + Send
    + Sync
    + 'static
{
}

impl<K> Object for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Serialize
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static
{
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Not found, {0}")]
    NotFound(String),
    /// The object changed since it was read.
    #[error("Conflict, {0}")]
    Conflict(String),
    #[error("Already exists, {0}")]
    AlreadyExists(String),
    #[error("Object has no metadata.name")]
    MissingName,
    #[error("Kube error, {0}")]
    KubeError(#[source] kube::Error),
    #[error("Serde json error, {0}")]
    SerdejsonError(#[from] serde_json::Error),
}

impl StoreError {
    /// Races with other writers, resolved by reading again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict(_) | Self::AlreadyExists(_) | Self::NotFound(_)
        )
    }
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(ae) if ae.code == 404 => Self::NotFound(ae.message.clone()),
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                Self::AlreadyExists(ae.message.clone())
            }
            kube::Error::Api(ae) if ae.code == 409 => Self::Conflict(ae.message.clone()),
            _ => Self::KubeError(err),
        }
    }
}

/// Typed CRUD over namespaced objects. Writes carry the resource version they
/// were read at and fail with [`StoreError::Conflict`] when it is stale.
pub trait ClusterStore: Clone + Send + Sync + 'static {
    fn get<K: Object>(
        &self,
        ns: &str,
        name: &str,
    ) -> impl Future<Output = Result<Option<K>, StoreError>> + Send;

    /// `selector` is a label selector such as `a=b,c=d`; empty lists everything.
    fn list<K: Object>(
        &self,
        ns: &str,
        selector: &str,
    ) -> impl Future<Output = Result<Vec<K>, StoreError>> + Send;

    fn create<K: Object>(
        &self,
        ns: &str,
        object: &K,
    ) -> impl Future<Output = Result<K, StoreError>> + Send;

    fn replace<K: Object>(
        &self,
        ns: &str,
        object: &K,
    ) -> impl Future<Output = Result<K, StoreError>> + Send;

    /// Writes only the status subresource.
    fn replace_status<K: Object>(
        &self,
        ns: &str,
        object: &K,
    ) -> impl Future<Output = Result<K, StoreError>> + Send;

    fn delete<K: Object>(
        &self,
        ns: &str,
        name: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Starts a new Build from the named BuildConfig.
    fn instantiate(
        &self,
        ns: &str,
        build_config: &str,
    ) -> impl Future<Output = Result<Build, StoreError>> + Send;
}

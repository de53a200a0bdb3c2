//! Every write the operator issues goes through here.
//!
//! Writes are read-modify-write cycles: the current object is fetched, the
//! caller decides what to write, and a conflict with another writer simply
//! starts the cycle again until the poll deadline passes.

use build_core::crds::openshift::Build;
use tracing::{debug, info};
use utility::poll::{PollError, PollPolicy, poll_until};

use crate::{
    error::AppError,
    services::store::{ClusterStore, Object, StoreError},
};

#[derive(Clone)]
pub struct ResourceManager<S> {
    store: S,
    policy: PollPolicy,
}

fn timeout_error(operation: String, err: PollError<StoreError>) -> AppError {
    match err {
        PollError::Timeout(elapsed) => AppError::Timeout { operation, elapsed },
        PollError::Aborted(e) => AppError::StoreError(e),
    }
}

impl<S: ClusterStore> ResourceManager<S> {
    pub fn new(store: S, policy: PollPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    pub async fn get<K: Object>(&self, ns: &str, name: &str) -> Result<Option<K>, AppError> {
        Ok(self.store.get(ns, name).await?)
    }

    pub async fn list<K: Object>(&self, ns: &str, selector: &str) -> Result<Vec<K>, AppError> {
        Ok(self.store.list(ns, selector).await?)
    }

    /// Reads the object, lets `mutate` decide what to write and writes it.
    ///
    /// `mutate` sees the freshly read copy (or `None` when absent) on every
    /// attempt and returns `None` when nothing needs writing. Returns the
    /// written object, if any.
    #[tracing::instrument(name = "resource_manager.apply", skip_all, fields(kind = %K::kind(&()), ns = %ns, name = %name), err)]
    pub async fn apply<K, F>(&self, ns: &str, name: &str, mutate: F) -> Result<Option<K>, AppError>
    where
        K: Object,
        F: Fn(Option<K>) -> Option<K> + Send + Sync,
    {
        let store = &self.store;
        let mutate = &mutate;

        let result = poll_until(self.policy, move || async move {
            let current = store.get::<K>(ns, name).await?;
            let exists = current.is_some();
            let Some(desired) = mutate(current) else {
                return Ok::<_, StoreError>(Some(None));
            };

            let written = if exists {
                store.replace(ns, &desired).await
            } else {
                store.create(ns, &desired).await
            };

            match written {
                Ok(object) => Ok(Some(Some(object))),
                Err(e) if e.is_retryable() => {
                    debug!(error = %e, "🔁 Write raced with another writer, retrying");
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(|e| timeout_error(format!("write of {} {ns}/{name}", K::kind(&())), e))?;

        if result.is_some() {
            info!("✍️ {} {}/{} written", K::kind(&()), ns, name);
        }
        Ok(result)
    }

    /// Creates the object, or replaces the deployed copy carrying over its resource version.
    pub async fn create_or_update<K: Object>(&self, ns: &str, resource: K) -> Result<K, AppError> {
        let name = resource
            .meta()
            .name
            .clone()
            .ok_or(StoreError::MissingName)?;

        let written = self
            .apply::<K, _>(ns, &name, |deployed| {
                let mut proposed = resource.clone();
                proposed.meta_mut().resource_version =
                    deployed.and_then(|d| d.meta().resource_version.clone());
                Some(proposed)
            })
            .await?;

        written.ok_or_else(|| StoreError::NotFound(format!("{ns}/{name}")).into())
    }

    /// Same discipline as [`Self::apply`] against the status subresource.
    /// An absent object is left alone.
    #[tracing::instrument(name = "resource_manager.update_status", skip_all, fields(kind = %K::kind(&()), ns = %ns, name = %name), err)]
    pub async fn update_status<K, F>(
        &self,
        ns: &str,
        name: &str,
        mutate: F,
    ) -> Result<Option<K>, AppError>
    where
        K: Object,
        F: Fn(K) -> Option<K> + Send + Sync,
    {
        let store = &self.store;
        let mutate = &mutate;

        poll_until(self.policy, move || async move {
            let Some(current) = store.get::<K>(ns, name).await? else {
                return Ok::<_, StoreError>(Some(None));
            };
            let Some(desired) = mutate(current) else {
                return Ok(Some(None));
            };

            match store.replace_status(ns, &desired).await {
                Ok(object) => Ok(Some(Some(object))),
                Err(e) if e.is_retryable() => {
                    debug!(error = %e, "🔁 Status write raced with another writer, retrying");
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(|e| timeout_error(format!("status write of {} {ns}/{name}", K::kind(&())), e))
    }

    /// Returns false when the object was already gone.
    pub async fn delete<K: Object>(&self, ns: &str, name: &str) -> Result<bool, AppError> {
        match self.store.delete::<K>(ns, name).await {
            Ok(()) => {
                info!("🗑️ {} {}/{} deleted", K::kind(&()), ns, name);
                Ok(true)
            }
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Not retried: a second instantiate would start a second build.
    pub async fn start_build(&self, ns: &str, build_config: &str) -> Result<Build, AppError> {
        let build = self.store.instantiate(ns, build_config).await?;
        info!(
            "🚀 Build {} started from BuildConfig {}/{}",
            build.metadata.name.as_deref().unwrap_or_default(),
            ns,
            build_config
        );
        Ok(build)
    }
}

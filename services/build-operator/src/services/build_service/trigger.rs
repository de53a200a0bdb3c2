use build_core::{
    crds::{
        BuildPlan,
        openshift::{Build, BuildConfig},
    },
    labels::{REBUILD_ANNOTATION, build_config_selector},
};
use kube::ResourceExt;
use tracing::{info, warn};
use utility::poll::{PollError, poll_until};

use crate::{
    error::AppError,
    services::{
        build_service::{BuildService, namespace_of, reconcile::rebuild_requested},
        store::ClusterStore,
    },
};

/// Attempts still able to produce an image, oldest first.
fn in_flight(builds: &[Build]) -> Vec<&Build> {
    let mut active: Vec<&Build> = builds.iter().filter(|b| b.phase().is_active()).collect();
    active.sort_by(|a, b| {
        (&a.metadata.creation_timestamp, &a.metadata.name)
            .cmp(&(&b.metadata.creation_timestamp, &b.metadata.name))
    });
    active
}

impl<S: ClusterStore> BuildService<S> {
    /// Starts a fresh attempt of the plan's entry manifest: the builder stage
    /// for source builds, the runtime stage for Binary ones.
    #[tracing::instrument(name = "build_service.trigger_build", skip_all, fields(name = %plan.name_any()), err)]
    pub async fn trigger_build(&self, plan: &BuildPlan) -> Result<Build, AppError> {
        let desired = self.plan(plan)?;
        let ns = namespace_of(plan)?;
        self.start_new_build(&ns, desired.entry_manifest()).await
    }

    /// Cancels the oldest attempt of `manifest` still in flight, waits for it to
    /// stop and starts a new one. Nothing is started while an older attempt
    /// might still be running.
    pub async fn start_new_build(&self, ns: &str, manifest: &BuildConfig) -> Result<Build, AppError> {
        let name = manifest.name_any();
        let builds = self
            .resources
            .list::<Build>(ns, &build_config_selector(&name))
            .await?;

        let active = in_flight(&builds);
        if let Some(oldest) = active.first() {
            self.cancel_build(ns, &oldest.name_any()).await?;
        }
        // one cancellation per call, the next pass takes care of the rest
        if let Some(next) = active.get(1) {
            return Err(AppError::BuildInFlight {
                build: next.name_any(),
            });
        }

        self.resources.start_build(ns, &name).await
    }

    /// Drops the rebuild mark from the builder manifest once a build of its
    /// current spec has started.
    pub async fn clear_rebuild_mark(&self, plan: &BuildPlan) -> Result<(), AppError> {
        let desired = self.plan(plan)?;
        let Some(builder) = desired.builder else {
            return Ok(());
        };
        let ns = namespace_of(plan)?;

        self.resources
            .apply::<BuildConfig, _>(&ns, &builder.manifest.name_any(), |deployed| {
                let mut manifest = deployed.filter(rebuild_requested)?;
                manifest.annotations_mut().remove(REBUILD_ANNOTATION);
                Some(manifest)
            })
            .await?;
        Ok(())
    }

    /// Marks the attempt cancelled and polls until the cluster has stopped it.
    ///
    /// Builds have no status subresource; the flag travels in a replace of
    /// the whole object.
    #[tracing::instrument(name = "build_service.cancel_build", skip_all, fields(ns = %ns, build = %build), err)]
    async fn cancel_build(&self, ns: &str, build: &str) -> Result<(), AppError> {
        self.resources
            .apply::<Build, _>(ns, build, |deployed| {
                let mut current = deployed?;
                if current.phase().is_terminal() {
                    return None;
                }
                let status = current.status.get_or_insert_with(Default::default);
                if status.cancelled == Some(true) {
                    return None;
                }
                status.cancelled = Some(true);
                Some(current)
            })
            .await?;
        info!("🛑 Cancellation of Build {}/{} requested", ns, build);

        let resources = &self.resources;
        let stopped = poll_until(resources.policy(), move || async move {
            let current = resources.get::<Build>(ns, build).await?;
            Ok::<_, AppError>(
                current
                    .is_none_or(|b| b.phase().is_terminal())
                    .then_some(()),
            )
        })
        .await;

        match stopped {
            Ok(()) => Ok(()),
            Err(PollError::Aborted(e)) => Err(e),
            Err(PollError::Timeout(elapsed)) => {
                warn!("⌛ Build {}/{} did not stop after {:?}", ns, build, elapsed);
                Err(AppError::Timeout {
                    operation: format!("cancellation of Build {ns}/{build}"),
                    elapsed,
                })
            }
        }
    }
}

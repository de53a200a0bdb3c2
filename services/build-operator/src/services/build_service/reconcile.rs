use std::sync::OnceLock;

use build_core::{
    assembler::{OutputStream, SharedStreamRequest, StagePlan},
    comparators::{
        build_config_matches, build_config_spec_matches, foreign_controller, is_controlled_by,
        managed_stream_matches, merge_build_config, merge_managed_stream, merge_shared_stream,
        shared_stream_satisfied, shared_tag_conflict,
    },
    crds::{
        BuildPlan,
        openshift::{BuildConfig, ImageStream},
    },
    error::CoreError,
    labels::{REBUILD_ANNOTATION, app_selector},
    models::BuildType,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::{
    error::AppError,
    services::{
        build_service::{BuildService, namespace_of},
        store::{ClusterStore, Object},
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileOutcome {
    /// Creates, replaces and deletes issued in this pass.
    pub writes: usize,
    /// The builder manifest was created or changed.
    pub builder_changed: bool,
    /// The builder manifest carries a spec no build has been started for yet.
    pub rebuild_pending: bool,
}

/// What became of one manifest.
struct ManifestWrite {
    written: bool,
    rebuild_pending: bool,
}

pub(crate) fn rebuild_requested(manifest: &BuildConfig) -> bool {
    manifest.annotations().contains_key(REBUILD_ANNOTATION)
}

fn mark_rebuild(mut manifest: BuildConfig, mark: bool) -> BuildConfig {
    if mark {
        manifest
            .annotations_mut()
            .insert(REBUILD_ANNOTATION.to_string(), "true".to_string());
    }
    manifest
}

fn controlled_elsewhere(kind: &str, name: &str, owner: String) -> AppError {
    CoreError::ControlledElsewhere {
        kind: kind.to_string(),
        name: name.to_string(),
        owner,
    }
    .into()
}

impl<S: ClusterStore> BuildService<S> {
    /// Brings the BuildConfigs and ImageStreams of the plan in line with what
    /// it asks for, then removes the ones it no longer asks for.
    #[tracing::instrument(name = "build_service.reconcile", skip_all, fields(name = %plan.name_any()), err)]
    pub async fn reconcile(&self, plan: &BuildPlan) -> Result<ReconcileOutcome, AppError> {
        let desired = self.plan(plan)?;
        let ns = namespace_of(plan)?;
        let mut outcome = ReconcileOutcome::default();
        let track_rebuild = plan.spec.build_type == Some(BuildType::RemoteSource);

        if let Some(builder) = &desired.builder {
            let manifest = self
                .reconcile_stage(&ns, builder, &desired.owner, track_rebuild, &mut outcome)
                .await?;
            outcome.builder_changed = manifest.written;
            outcome.rebuild_pending = manifest.rebuild_pending;
        }
        self.reconcile_stage(&ns, &desired.runtime, &desired.owner, false, &mut outcome)
            .await?;

        let app = plan.name_any();
        let manifests = desired.manifest_names();
        let streams = desired.managed_stream_names();
        outcome.writes += self
            .prune::<BuildConfig>(&ns, &app, &desired.owner.uid, &manifests)
            .await?;
        outcome.writes += self
            .prune::<ImageStream>(&ns, &app, &desired.owner.uid, &streams)
            .await?;

        if outcome.writes > 0 {
            info!("🔧 BuildPlan {} reconciled with {} writes", app, outcome.writes);
        } else {
            debug!("BuildPlan {} already up to date", app);
        }
        Ok(outcome)
    }

    /// Writes one stage in order: base image tag, output stream, manifest.
    async fn reconcile_stage(
        &self,
        ns: &str,
        stage: &StagePlan,
        owner: &OwnerReference,
        track_rebuild: bool,
        outcome: &mut ReconcileOutcome,
    ) -> Result<ManifestWrite, AppError> {
        if self.ensure_shared_stream(ns, &stage.base_image, owner).await? {
            outcome.writes += 1;
        }

        let stream_written = match &stage.output_stream {
            OutputStream::Managed(stream) => self.ensure_managed_stream(ns, stream, owner).await?,
            OutputStream::Shared(request) => self.ensure_shared_stream(ns, request, owner).await?,
        };
        if stream_written {
            outcome.writes += 1;
        }

        let manifest = self
            .ensure_build_config(ns, &stage.manifest, owner, track_rebuild)
            .await?;
        if manifest.written {
            outcome.writes += 1;
        }
        Ok(manifest)
    }

    /// A manifest another plan controls is never taken over. With
    /// `track_rebuild`, a spec change leaves the rebuild mark behind in the
    /// same write.
    async fn ensure_build_config(
        &self,
        ns: &str,
        requested: &BuildConfig,
        owner: &OwnerReference,
        track_rebuild: bool,
    ) -> Result<ManifestWrite, AppError> {
        let name = requested.name_any();
        let controller = OnceLock::new();
        let untouched = OnceLock::new();

        let written = self
            .resources
            .apply::<BuildConfig, _>(ns, &name, |deployed| {
                let Some(deployed) = deployed else {
                    return Some(mark_rebuild(requested.clone(), track_rebuild));
                };
                if let Some(other) = foreign_controller(&deployed.metadata, &owner.uid) {
                    let _ = controller.set(other.name.clone());
                    return None;
                }
                if build_config_matches(&deployed, requested, &owner.uid) {
                    let _ = untouched.set(rebuild_requested(&deployed));
                    return None;
                }
                let spec_changed = !build_config_spec_matches(&deployed, requested);
                let merged = merge_build_config(deployed, requested);
                Some(mark_rebuild(merged, track_rebuild && spec_changed))
            })
            .await?;

        if let Some(other) = controller.into_inner() {
            return Err(controlled_elsewhere("BuildConfig", &name, other));
        }
        Ok(match written {
            Some(manifest) => ManifestWrite {
                written: true,
                rebuild_pending: rebuild_requested(&manifest),
            },
            None => ManifestWrite {
                written: false,
                rebuild_pending: untouched.into_inner().unwrap_or_default(),
            },
        })
    }

    async fn ensure_managed_stream(
        &self,
        ns: &str,
        requested: &ImageStream,
        owner: &OwnerReference,
    ) -> Result<bool, AppError> {
        let name = requested.name_any();
        let controller = OnceLock::new();

        let written = self
            .resources
            .apply::<ImageStream, _>(ns, &name, |deployed| match deployed {
                None => Some(requested.clone()),
                Some(d) => {
                    if let Some(other) = foreign_controller(&d.metadata, &owner.uid) {
                        let _ = controller.set(other.name.clone());
                        return None;
                    }
                    if managed_stream_matches(&d, requested, &owner.uid) {
                        return None;
                    }
                    Some(merge_managed_stream(d, requested))
                }
            })
            .await?;

        if let Some(other) = controller.into_inner() {
            return Err(controlled_elsewhere("ImageStream", &name, other));
        }
        Ok(written.is_some())
    }

    /// Creates the stream when missing, otherwise joins it as one more owner
    /// and makes sure the requested tag is there. A tag of that name pointing
    /// at another image while others hold the stream is left to them.
    async fn ensure_shared_stream(
        &self,
        ns: &str,
        request: &SharedStreamRequest,
        owner: &OwnerReference,
    ) -> Result<bool, AppError> {
        let conflict = OnceLock::new();

        let written = self
            .resources
            .apply::<ImageStream, _>(ns, &request.name, |deployed| match deployed {
                None => Some(request.to_stream(owner)),
                Some(d) if shared_stream_satisfied(&d, request, owner) => None,
                Some(d) if shared_tag_conflict(&d, request, owner) => {
                    let _ = conflict.set(());
                    None
                }
                Some(d) => Some(merge_shared_stream(d, request, owner)),
            })
            .await?;

        if conflict.into_inner().is_some() {
            return Err(CoreError::TagConflict {
                stream: request.name.clone(),
                tag: request.tag.name.clone(),
            }
            .into());
        }
        Ok(written.is_some())
    }

    /// Deletes objects labeled for the plan and controlled by it that are not
    /// in `keep`. Objects merely co-owned are left alone.
    async fn prune<K: Object>(
        &self,
        ns: &str,
        app: &str,
        owner_uid: &str,
        keep: &[String],
    ) -> Result<usize, AppError> {
        let deployed = self.resources.list::<K>(ns, &app_selector(app)).await?;
        let mut deleted = 0;

        for object in deployed {
            let name = object.name_any();
            if keep.contains(&name) || !is_controlled_by(object.meta(), owner_uid) {
                continue;
            }
            if self.resources.delete::<K>(ns, &name).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

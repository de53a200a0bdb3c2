use build_core::{
    conditions::next_status,
    crds::{BuildPlan, openshift::Build},
    labels::build_selector,
};
use chrono::Utc;
use kube::ResourceExt;
use tracing::debug;

use crate::{
    error::AppError,
    services::{
        build_service::{BuildService, namespace_of},
        store::ClusterStore,
    },
};

impl<S: ClusterStore> BuildService<S> {
    /// Folds the plan's build attempts, or the error of the pass, into its
    /// status. Returns the written plan, `None` when nothing changed.
    #[tracing::instrument(name = "build_service.update_status", skip_all, fields(name = %plan.name_any()), err)]
    pub async fn update_status(
        &self,
        plan: &BuildPlan,
        failure: Option<&AppError>,
    ) -> Result<Option<BuildPlan>, AppError> {
        let ns = namespace_of(plan)?;
        let name = plan.name_any();

        // an engine failure supersedes whatever the attempts say
        let builds = match (plan.spec.build_type, failure) {
            (Some(build_type), None) => {
                self.resources
                    .list::<Build>(&ns, &build_selector(&name, build_type))
                    .await?
            }
            _ => Vec::new(),
        };
        let message = failure.map(ToString::to_string);
        let now = Utc::now();

        let written = self
            .resources
            .update_status::<BuildPlan, _>(&ns, &name, |mut current| {
                let next = next_status(current.status.as_ref(), &builds, message.as_deref(), now);
                if current.status.as_ref() == Some(&next) {
                    return None;
                }
                current.status = Some(next);
                Some(current)
            })
            .await?;

        if let Some(status) = written.as_ref().and_then(|p| p.status.as_ref()) {
            debug!(
                latest_build = status.latest_build.as_deref().unwrap_or_default(),
                "📝 Status of BuildPlan {} updated", name
            );
        }
        Ok(written)
    }

    /// Remembers the trigger annotation value a build was started for.
    pub async fn record_trigger_token(&self, plan: &BuildPlan, token: String) -> Result<(), AppError> {
        let ns = namespace_of(plan)?;

        self.resources
            .update_status::<BuildPlan, _>(&ns, &plan.name_any(), |mut current| {
                let status = current.status.get_or_insert_with(Default::default);
                if status.last_trigger_token.as_ref() == Some(&token) {
                    return None;
                }
                status.last_trigger_token = Some(token.clone());
                Some(current)
            })
            .await?;
        Ok(())
    }
}

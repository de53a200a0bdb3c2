//! Plan, reconcile, trigger and status operations of one BuildPlan.

pub mod reconcile;
pub mod status;
pub mod trigger;

use build_core::{
    assembler::{self, DesiredState},
    configs::ImageDefaults,
    crds::BuildPlan,
    error::CoreError,
    labels::TRIGGER_ANNOTATION,
};
use kube::ResourceExt;
use tracing::{info, warn};

use crate::{
    error::AppError,
    services::{
        build_service::reconcile::ReconcileOutcome, resource_manager::ResourceManager,
        store::ClusterStore,
    },
};

#[derive(Clone)]
pub struct BuildService<S> {
    resources: ResourceManager<S>,
    images: ImageDefaults,
}

/// What one full pass did.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PassOutcome {
    pub reconcile: ReconcileOutcome,
    /// Name of the build started in this pass.
    pub started_build: Option<String>,
}

impl<S: ClusterStore> BuildService<S> {
    pub fn new(resources: ResourceManager<S>, images: ImageDefaults) -> Self {
        Self { resources, images }
    }

    /// Desired objects of the BuildPlan. Touches nothing.
    pub fn plan(&self, plan: &BuildPlan) -> Result<DesiredState, AppError> {
        Ok(assembler::plan(plan, &self.images)?)
    }

    /// One reconcile pass: bring objects in line, start a build when one is
    /// due, then fold the outcome into the status. An engine error is recorded
    /// on the status and returned.
    #[tracing::instrument(name = "build_service.run_pass", skip_all, fields(ns = %plan.namespace().unwrap_or_default(), name = %plan.name_any()))]
    pub async fn run_pass(&self, plan: &BuildPlan) -> Result<PassOutcome, AppError> {
        let result = self.reconcile_and_trigger(plan).await;

        if let Err(e) = &result {
            warn!(error = %e, "❌ Reconcile pass of BuildPlan {} failed", plan.name_any());
        }
        self.update_status(plan, result.as_ref().err()).await?;

        result
    }

    async fn reconcile_and_trigger(&self, plan: &BuildPlan) -> Result<PassOutcome, AppError> {
        let reconcile = self.reconcile(plan).await?;

        let token = pending_trigger_token(plan);
        // the mark outlives failed attempts to start, so a later pass retries
        let rebuild = reconcile.rebuild_pending;

        let mut outcome = PassOutcome {
            reconcile,
            started_build: None,
        };
        if !rebuild && token.is_none() {
            return Ok(outcome);
        }

        let build = self.trigger_build(plan).await?;
        outcome.started_build = Some(build.name_any());

        if rebuild {
            self.clear_rebuild_mark(plan).await?;
        }
        if let Some(token) = token {
            info!("🔔 Manual trigger '{}' of BuildPlan {} handled", token, plan.name_any());
            self.record_trigger_token(plan, token).await?;
        }

        Ok(outcome)
    }
}

/// The trigger annotation value when it differs from the last one acted upon.
fn pending_trigger_token(plan: &BuildPlan) -> Option<String> {
    let token = plan
        .annotations()
        .get(TRIGGER_ANNOTATION)
        .filter(|t| !t.is_empty())?;
    let last = plan
        .status
        .as_ref()
        .and_then(|s| s.last_trigger_token.as_ref());

    (last != Some(token)).then(|| token.clone())
}

fn namespace_of(plan: &BuildPlan) -> Result<String, AppError> {
    plan.namespace()
        .ok_or(AppError::CoreError(CoreError::MissingMetadata("namespace")))
}

#[cfg(test)]
pub(crate) mod tests {
    use build_core::{
        crds::{BuildPlanSpec, GitSource},
        models::BuildType,
    };
    use utility::poll::PollPolicy;

    use super::*;
    use crate::services::store::memory::{CancelBehavior, MemoryStore};

    pub(crate) const NS: &str = "apps";

    pub(crate) fn remote_spec() -> BuildPlanSpec {
        BuildPlanSpec {
            build_type: Some(BuildType::RemoteSource),
            git_source: Some(GitSource {
                uri: "https://git.example.com/orders.git".to_string(),
                reference: Some("main".to_string()),
                context_dir: None,
            }),
            ..Default::default()
        }
    }

    /// Stores the plan the way the API server would, so it carries a uid.
    pub(crate) fn seed_plan(store: &MemoryStore, name: &str, spec: BuildPlanSpec) -> BuildPlan {
        store.insert(NS, &BuildPlan::new(name, spec))
    }

    pub(crate) fn service(store: &MemoryStore) -> BuildService<MemoryStore> {
        BuildService::new(
            ResourceManager::new(store.clone(), PollPolicy::default()),
            ImageDefaults::default(),
        )
    }

    fn fresh(store: &MemoryStore, name: &str) -> BuildPlan {
        store.object(NS, name).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn first_pass_builds_everything_and_starts_a_build() {
        let store = MemoryStore::default();
        let plan = seed_plan(&store, "orders", remote_spec());

        let outcome = service(&store).run_pass(&plan).await.unwrap();

        assert!(outcome.reconcile.builder_changed);
        assert_eq!(outcome.started_build.as_deref(), Some("orders-builder-1"));

        let status = fresh(&store, "orders").status.unwrap();
        assert_eq!(status.latest_build.as_deref(), Some("orders-builder-1"));
        assert!(status.is_true(build_core::models::ConditionType::Running));
    }

    #[tokio::test(start_paused = true)]
    async fn second_pass_without_changes_writes_nothing() {
        let store = MemoryStore::default();
        let plan = seed_plan(&store, "orders", remote_spec());
        let service = service(&store);

        service.run_pass(&plan).await.unwrap();
        store.clear_writes();

        let outcome = service.run_pass(&fresh(&store, "orders")).await.unwrap();

        assert_eq!(outcome.reconcile.writes, 0);
        assert_eq!(outcome.started_build, None);
        assert!(store.writes().is_empty(), "{:?}", store.writes());
    }

    #[tokio::test(start_paused = true)]
    async fn binary_plan_is_never_triggered_automatically() {
        let store = MemoryStore::default();
        let plan = seed_plan(
            &store,
            "payments",
            BuildPlanSpec {
                build_type: Some(BuildType::Binary),
                ..Default::default()
            },
        );

        let outcome = service(&store).run_pass(&plan).await.unwrap();

        assert_eq!(outcome.started_build, None);
        assert!(outcome.reconcile.writes > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn trigger_annotation_starts_exactly_one_build() {
        let store = MemoryStore::default();
        let mut spec = remote_spec();
        spec.build_type = Some(BuildType::LocalSource);
        spec.git_source = None;
        let mut plan = BuildPlan::new("inventory", spec);
        plan.annotations_mut()
            .insert(TRIGGER_ANNOTATION.to_string(), "2026-10-17".to_string());
        let plan = store.insert(NS, &plan);
        let service = service(&store);

        let first = service.run_pass(&plan).await.unwrap();
        assert_eq!(first.started_build.as_deref(), Some("inventory-builder-1"));

        let stored = fresh(&store, "inventory");
        assert_eq!(
            stored.status.as_ref().and_then(|s| s.last_trigger_token.as_deref()),
            Some("2026-10-17")
        );

        let second = service.run_pass(&stored).await.unwrap();
        assert_eq!(second.started_build, None);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_plan_is_reported_as_operator_failure() {
        let store = MemoryStore::default();
        let mut spec = remote_spec();
        spec.git_source = None;
        let plan = seed_plan(&store, "orders", spec);

        let result = service(&store).run_pass(&plan).await;
        assert!(matches!(
            result,
            Err(AppError::CoreError(CoreError::MissingGitUri(_)))
        ));

        let status = fresh(&store, "orders").status.unwrap();
        let failed = status
            .condition(build_core::models::ConditionType::Failed)
            .unwrap();
        assert_eq!(
            failed.reason,
            Some(build_core::models::ConditionReason::OperatorFailure)
        );
        assert!(failed.message.as_deref().unwrap().contains("gitSource.uri"));
    }

    #[tokio::test(start_paused = true)]
    async fn source_change_is_built_even_when_the_first_attempt_to_start_fails() {
        let store = MemoryStore::default();
        let plan = seed_plan(&store, "orders", remote_spec());
        let service = service(&store);
        service.run_pass(&plan).await.unwrap();
        store.set_build_phase(NS, "orders-builder-1", "Running");
        store.set_cancel_behavior(CancelBehavior::Ignore);

        let mut changed = fresh(&store, "orders");
        if let Some(git) = changed.spec.git_source.as_mut() {
            git.reference = Some("release".to_string());
        }
        store.replace(NS, &changed).await.unwrap();

        let stuck = service.run_pass(&fresh(&store, "orders")).await;
        assert!(matches!(stuck, Err(AppError::Timeout { .. })));

        // the cluster catches up with the cancellation later on
        store.set_build_phase(NS, "orders-builder-1", "Cancelled");
        let retried = service.run_pass(&fresh(&store, "orders")).await.unwrap();

        assert!(!retried.reconcile.builder_changed);
        assert_eq!(retried.started_build.as_deref(), Some("orders-builder-2"));

        let status = fresh(&store, "orders").status.unwrap();
        let failed = status
            .condition(build_core::models::ConditionType::Failed)
            .unwrap();
        assert_eq!(failed.status, build_core::models::ConditionStatus::False);
        assert!(status.is_true(build_core::models::ConditionType::Running));

        // the rebuild happened, nothing is left to start
        let settled = service.run_pass(&fresh(&store, "orders")).await.unwrap();
        assert_eq!(settled.started_build, None);
        assert!(!settled.reconcile.rebuild_pending);
    }
}

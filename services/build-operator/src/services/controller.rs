//! Wires the BuildService into a kube-runtime controller.
//!
//! BuildPlans are the primary objects. Changes to the BuildConfigs they own
//! and to the Builds labeled with their name requeue the owning plan.

use std::sync::Arc;

use build_core::{
    crds::{
        BuildPlan,
        openshift::{Build, BuildConfig},
    },
    labels::APP_LABEL,
};
use futures::StreamExt;
use kube::{
    Api, Client, ResourceExt,
    runtime::{Controller, controller::Action, reflector::ObjectRef, watcher},
};
use tracing::{debug, error, info, warn};

use crate::{
    app::Readiness,
    config::OperatorConfig,
    error::AppError,
    services::{build_service::BuildService, store::ClusterStore},
};

pub struct Context<S> {
    pub service: BuildService<S>,
    pub config: OperatorConfig,
}

fn api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// The plan a Build belongs to, read from its app label.
fn owning_plan(build: Build) -> Option<ObjectRef<BuildPlan>> {
    let ns = build.namespace()?;
    let app = build.labels().get(APP_LABEL)?;
    Some(ObjectRef::new(app).within(&ns))
}

pub async fn run_controller<S: ClusterStore>(
    client: Client,
    context: Context<S>,
    readiness: Readiness,
) -> Result<(), AppError> {
    let namespace = context.config.watch_namespace.clone();
    let namespace = namespace.as_deref();

    let plans = api::<BuildPlan>(&client, namespace);
    // fail early when the CRD is not installed
    plans.list(&Default::default()).await?;

    info!(
        "👀 Watching BuildPlans in {}",
        namespace.unwrap_or("all namespaces")
    );
    readiness.mark_ready();

    Controller::new(plans, watcher::Config::default())
        .owns(
            api::<BuildConfig>(&client, namespace),
            watcher::Config::default(),
        )
        .watches(
            api::<Build>(&client, namespace),
            watcher::Config::default(),
            owning_plan,
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, Arc::new(context))
        .for_each(|result| async move {
            match result {
                Ok((plan, _)) => debug!("BuildPlan {} reconciled", plan),
                Err(e) => warn!(error = %e, "Controller event failed"),
            }
        })
        .await;

    info!("🛑 BuildPlan controller stopped");
    Ok(())
}

pub async fn reconcile<S: ClusterStore>(
    plan: Arc<BuildPlan>,
    ctx: Arc<Context<S>>,
) -> Result<Action, AppError> {
    // owned objects go with the plan through their owner references
    if plan.metadata.deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    let outcome = ctx.service.run_pass(&plan).await?;
    if let Some(build) = outcome.started_build {
        info!("🏗️ BuildPlan {} started build {}", plan.name_any(), build);
    }

    Ok(Action::requeue(ctx.config.requeue_interval()))
}

pub fn error_policy<S: ClusterStore>(
    plan: Arc<BuildPlan>,
    error: &AppError,
    ctx: Arc<Context<S>>,
) -> Action {
    error!(
        error = %error,
        "❌ Reconcile of BuildPlan {} failed, retrying in {:?}",
        plan.name_any(),
        ctx.config.error_requeue()
    );
    Action::requeue(ctx.config.error_requeue())
}

#[cfg(test)]
mod tests {
    use build_core::crds::BuildPlanSpec;
    use serde_json::json;

    use super::*;
    use crate::services::{
        build_service::tests::{NS, remote_spec, seed_plan, service},
        store::memory::MemoryStore,
    };

    fn context(store: &MemoryStore) -> Arc<Context<MemoryStore>> {
        Arc::new(Context {
            service: service(store),
            config: OperatorConfig::default(),
        })
    }

    #[test]
    fn builds_map_to_their_plan() {
        let build: Build = serde_json::from_value(json!({
            "apiVersion": "build.openshift.io/v1",
            "kind": "Build",
            "metadata": {
                "name": "orders-builder-1",
                "namespace": NS,
                "labels": { APP_LABEL: "orders" },
            },
            "spec": {},
        }))
        .unwrap();

        assert_eq!(
            owning_plan(build),
            Some(ObjectRef::new("orders").within(NS))
        );
    }

    #[test]
    fn unlabeled_builds_are_ignored() {
        let mut build = Build::new("manual-1", Default::default());
        build.metadata.namespace = Some(NS.to_string());

        assert_eq!(owning_plan(build), None);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_pass_requeues_after_the_interval() {
        let store = MemoryStore::default();
        let plan = seed_plan(&store, "orders", remote_spec());
        let ctx = context(&store);

        let action = reconcile(Arc::new(plan), ctx.clone()).await.unwrap();

        assert_eq!(action, Action::requeue(ctx.config.requeue_interval()));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_pass_requeues_after_the_backoff() {
        let store = MemoryStore::default();
        let plan = seed_plan(&store, "orders", BuildPlanSpec::default());
        let ctx = context(&store);
        let plan = Arc::new(plan);

        let error = reconcile(plan.clone(), ctx.clone()).await.unwrap_err();
        let action = error_policy(plan, &error, ctx.clone());

        assert_eq!(action, Action::requeue(ctx.config.error_requeue()));
    }
}

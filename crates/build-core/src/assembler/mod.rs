//! Derives the desired BuildConfigs and ImageStreams of a BuildPlan.
//!
//! Each stage starts from one shared template and is shaped by an ordered
//! list of small mutators. Nothing here talks to the cluster.

mod mutators;

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt, api::ObjectMeta};

use crate::{
    configs::ImageDefaults,
    crds::{
        BuildPlan, BuildPlanSpec,
        openshift::{
            BuildConfig, BuildConfigSpec, ImageLookupPolicy, ImageStream, ImageStreamSpec,
            TagReference, TagReferencePolicy,
        },
    },
    error::CoreError,
    formatters::{LATEST_TAG, docker_image_reference, format_builder_name, non_empty},
    images::{ResolvedImage, resolve_image},
    labels::{MANAGED_BY, MANAGED_BY_LABEL, build_labels},
    models::{BuildType, ImageRole},
};

pub use mutators::upsert_env;

/// One step of manifest assembly.
pub type Mutator = fn(BuildConfig, &AssemblyContext) -> Result<BuildConfig, CoreError>;

const BUILDER_REMOTE_SOURCE: &[Mutator] = &[
    mutators::builder_base,
    mutators::remote_source,
    mutators::builder_environment,
];

const BUILDER_LOCAL_SOURCE: &[Mutator] = &[
    mutators::builder_base,
    mutators::local_source,
    mutators::builder_environment,
];

const RUNTIME_BINARY: &[Mutator] = &[mutators::runtime_base, mutators::binary_runtime];

const RUNTIME_SOURCE: &[Mutator] = &[mutators::runtime_base, mutators::source_runtime];

/// Everything a mutator may read, resolved once per plan.
#[derive(Debug, Clone)]
pub struct AssemblyContext<'a> {
    pub plan_name: &'a str,
    pub namespace: &'a str,
    pub spec: &'a BuildPlanSpec,
    pub build_type: BuildType,
    pub owner: OwnerReference,
    pub builder_image: ResolvedImage,
    pub runtime_image: ResolvedImage,
    /// Application the runtime stage produces.
    pub target_name: String,
    pub target_tag: String,
}

impl AssemblyContext<'_> {
    pub fn builder_name(&self) -> String {
        format_builder_name(self.plan_name)
    }
}

/// An ImageStream tag that other BuildPlans may need as well.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedStreamRequest {
    pub name: String,
    pub namespace: String,
    pub tag: TagReference,
}

impl SharedStreamRequest {
    /// The stream as first created by the requesting plan, which becomes its controller.
    pub fn to_stream(&self, owner: &OwnerReference) -> ImageStream {
        ImageStream {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(BTreeMap::from([(
                    MANAGED_BY_LABEL.to_string(),
                    MANAGED_BY.to_string(),
                )])),
                owner_references: Some(vec![owner.clone()]),
                ..Default::default()
            },
            spec: ImageStreamSpec {
                lookup_policy: Some(ImageLookupPolicy { local: true }),
                tags: vec![self.tag.clone()],
                ..Default::default()
            },
            status: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputStream {
    /// Owned by exactly one BuildPlan and deleted with it.
    Managed(ImageStream),
    Shared(SharedStreamRequest),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StagePlan {
    pub base_image: SharedStreamRequest,
    pub output_stream: OutputStream,
    pub manifest: BuildConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DesiredState {
    pub owner: OwnerReference,
    /// Absent for Binary builds.
    pub builder: Option<StagePlan>,
    pub runtime: StagePlan,
}

impl DesiredState {
    /// Stages in the order their objects must be written.
    pub fn stages(&self) -> impl Iterator<Item = &StagePlan> {
        self.builder.iter().chain(std::iter::once(&self.runtime))
    }

    /// The manifest a new build attempt is started from.
    pub fn entry_manifest(&self) -> &BuildConfig {
        &self.builder.as_ref().unwrap_or(&self.runtime).manifest
    }

    pub fn manifest_names(&self) -> Vec<String> {
        self.stages().map(|s| s.manifest.name_any()).collect()
    }

    pub fn managed_stream_names(&self) -> Vec<String> {
        self.stages()
            .filter_map(|s| match &s.output_stream {
                OutputStream::Managed(stream) => Some(stream.name_any()),
                OutputStream::Shared(_) => None,
            })
            .collect()
    }
}

/// Computes the desired objects of a BuildPlan. Same input, same output.
pub fn plan(build_plan: &BuildPlan, defaults: &ImageDefaults) -> Result<DesiredState, CoreError> {
    let plan_name = build_plan
        .metadata
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or(CoreError::MissingMetadata("name"))?;
    let namespace = build_plan
        .metadata
        .namespace
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or(CoreError::MissingMetadata("namespace"))?;
    let owner = build_plan
        .controller_owner_ref(&())
        .ok_or(CoreError::MissingMetadata("uid"))?;

    let spec = &build_plan.spec;
    let build_type = spec
        .build_type
        .ok_or_else(|| CoreError::MissingBuildType(plan_name.to_string()))?;

    let ctx = AssemblyContext {
        plan_name,
        namespace,
        spec,
        build_type,
        owner,
        builder_image: resolve_image(
            spec.runtime,
            ImageRole::Builder,
            spec.native,
            &spec.build_image,
            defaults,
        ),
        runtime_image: resolve_image(
            spec.runtime,
            ImageRole::Runtime,
            spec.native,
            &spec.runtime_image,
            defaults,
        ),
        target_name: non_empty(spec.target_deployment_name.as_ref())
            .unwrap_or(plan_name)
            .to_string(),
        target_tag: non_empty(spec.target_image_tag.as_ref())
            .unwrap_or(LATEST_TAG)
            .to_string(),
    };

    let builder = match build_type {
        BuildType::Binary => None,
        BuildType::RemoteSource => Some(builder_stage(&ctx, BUILDER_REMOTE_SOURCE)?),
        BuildType::LocalSource => Some(builder_stage(&ctx, BUILDER_LOCAL_SOURCE)?),
    };

    let runtime_mutators = if build_type.is_source() {
        RUNTIME_SOURCE
    } else {
        RUNTIME_BINARY
    };
    let runtime = StagePlan {
        base_image: base_image_request(&ctx.runtime_image, namespace),
        output_stream: OutputStream::Shared(SharedStreamRequest {
            name: ctx.target_name.clone(),
            namespace: namespace.to_string(),
            tag: application_tag(&ctx),
        }),
        manifest: assemble(base_manifest(&ctx), &ctx, runtime_mutators)?,
    };

    Ok(DesiredState {
        owner: ctx.owner.clone(),
        builder,
        runtime,
    })
}

fn builder_stage(ctx: &AssemblyContext, mutators: &[Mutator]) -> Result<StagePlan, CoreError> {
    Ok(StagePlan {
        base_image: base_image_request(&ctx.builder_image, ctx.namespace),
        output_stream: OutputStream::Managed(builder_stream(ctx)),
        manifest: assemble(base_manifest(ctx), ctx, mutators)?,
    })
}

fn assemble(
    base: BuildConfig,
    ctx: &AssemblyContext,
    mutators: &[Mutator],
) -> Result<BuildConfig, CoreError> {
    mutators.iter().try_fold(base, |manifest, mutate| mutate(manifest, ctx))
}

/// Template shared by both stages: identity labels, owner, resources, serial runs.
fn base_manifest(ctx: &AssemblyContext) -> BuildConfig {
    BuildConfig {
        metadata: ObjectMeta {
            namespace: Some(ctx.namespace.to_string()),
            labels: Some(build_labels(ctx.plan_name, ctx.build_type)),
            owner_references: Some(vec![ctx.owner.clone()]),
            ..Default::default()
        },
        spec: BuildConfigSpec {
            run_policy: Some("Serial".to_string()),
            resources: resource_requirements(ctx.spec),
            ..Default::default()
        },
        status: None,
    }
}

fn resource_requirements(spec: &BuildPlanSpec) -> Option<ResourceRequirements> {
    let to_quantities = |values: &BTreeMap<String, String>| {
        (!values.is_empty()).then(|| {
            values
                .iter()
                .map(|(k, v)| (k.clone(), Quantity(v.clone())))
                .collect::<BTreeMap<_, _>>()
        })
    };

    let requests = to_quantities(&spec.resources.requests);
    let limits = to_quantities(&spec.resources.limits);
    if requests.is_none() && limits.is_none() {
        return None;
    }

    Some(ResourceRequirements {
        requests,
        limits,
        ..Default::default()
    })
}

/// Stream tag mirroring an external base image.
fn base_image_request(image: &ResolvedImage, namespace: &str) -> SharedStreamRequest {
    SharedStreamRequest {
        name: image.stream_name.clone(),
        namespace: namespace.to_string(),
        tag: TagReference {
            name: image.tag.clone(),
            from: Some(docker_image_reference(&image.reference())),
            reference_policy: Some(TagReferencePolicy {
                policy_type: "Source".to_string(),
            }),
            ..Default::default()
        },
    }
}

/// The tag the runtime stage pushes to on the application stream.
fn application_tag(ctx: &AssemblyContext) -> TagReference {
    TagReference {
        name: ctx.target_tag.clone(),
        annotations: Some(BTreeMap::from([(
            crate::labels::APP_LABEL.to_string(),
            ctx.plan_name.to_string(),
        )])),
        reference_policy: Some(TagReferencePolicy {
            policy_type: "Local".to_string(),
        }),
        ..Default::default()
    }
}

fn builder_stream(ctx: &AssemblyContext) -> ImageStream {
    ImageStream {
        metadata: ObjectMeta {
            name: Some(ctx.builder_name()),
            namespace: Some(ctx.namespace.to_string()),
            labels: Some(build_labels(ctx.plan_name, ctx.build_type)),
            owner_references: Some(vec![ctx.owner.clone()]),
            ..Default::default()
        },
        spec: ImageStreamSpec {
            lookup_policy: Some(ImageLookupPolicy { local: true }),
            ..Default::default()
        },
        status: None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use k8s_openapi::api::core::v1::EnvVar;

    use super::*;
    use crate::{
        crds::{GitSource, WebHookSecret},
        crds::openshift::{BuildSourceType, BuildTriggerType},
        env_names::EnvNames,
        models::{RuntimeKind, WebHookType},
    };

    pub(crate) fn build_plan(name: &str, spec: BuildPlanSpec) -> BuildPlan {
        let mut plan = BuildPlan::new(name, spec);
        plan.metadata.namespace = Some("apps".to_string());
        plan.metadata.uid = Some(format!("uid-{name}"));
        plan
    }

    pub(crate) fn remote_spec() -> BuildPlanSpec {
        BuildPlanSpec {
            build_type: Some(BuildType::RemoteSource),
            git_source: Some(GitSource {
                uri: "https://git.example.com/orders.git".to_string(),
                reference: Some("main".to_string()),
                context_dir: Some("svc/".to_string()),
            }),
            ..Default::default()
        }
    }

    fn env(manifest: &BuildConfig) -> Vec<EnvVar> {
        manifest
            .spec
            .strategy
            .source_strategy
            .as_ref()
            .map(|s| s.env.clone())
            .unwrap_or_default()
    }

    fn env_value(manifest: &BuildConfig, name: &str) -> Option<String> {
        env(manifest)
            .into_iter()
            .find(|e| e.name == name)
            .and_then(|e| e.value)
    }

    fn from_name(manifest: &BuildConfig) -> Option<String> {
        manifest
            .spec
            .strategy
            .source_strategy
            .as_ref()
            .and_then(|s| s.from.name.clone())
    }

    fn output_name(manifest: &BuildConfig) -> Option<String> {
        manifest.spec.output.to.as_ref().and_then(|t| t.name.clone())
    }

    #[test]
    fn remote_source_plan_has_two_chained_stages() {
        let mut spec = remote_spec();
        spec.web_hooks = vec![WebHookSecret {
            webhook_type: WebHookType::GitHub,
            secret: "gh-secret".to_string(),
        }];
        let plan = build_plan("orders", spec);

        let desired = super::plan(&plan, &ImageDefaults::default()).unwrap();
        let builder = desired.builder.as_ref().unwrap();

        assert_eq!(builder.manifest.name_any(), "orders-builder");
        assert_eq!(
            from_name(&builder.manifest).as_deref(),
            Some("forge-builder:0.1")
        );
        assert_eq!(
            output_name(&builder.manifest).as_deref(),
            Some("orders-builder:latest")
        );

        let source = &builder.manifest.spec.source;
        assert_eq!(source.source_type, BuildSourceType::Git);
        assert_eq!(source.context_dir.as_deref(), Some("svc"));
        assert_eq!(
            source.git.as_ref().and_then(|g| g.reference.as_deref()),
            Some("main")
        );

        let trigger_types: Vec<_> = builder
            .manifest
            .spec
            .triggers
            .iter()
            .map(|t| t.trigger_type)
            .collect();
        assert_eq!(
            trigger_types,
            vec![BuildTriggerType::ImageChange, BuildTriggerType::GitHub]
        );

        let runtime = &desired.runtime.manifest;
        assert_eq!(runtime.name_any(), "orders");
        assert_eq!(from_name(runtime).as_deref(), Some("forge-runtime-jvm:0.1"));
        assert_eq!(output_name(runtime).as_deref(), Some("orders:latest"));

        let image = &runtime.spec.source.images[0];
        assert_eq!(image.from.name.as_deref(), Some("orders-builder:latest"));
        assert_eq!(image.paths[0].source_path, "/home/forge/bin");
        assert_eq!(image.paths[0].destination_dir, ".");

        // builder output feeds the runtime input
        assert_eq!(output_name(&builder.manifest), image.from.name.clone());
        assert_eq!(desired.entry_manifest().name_any(), "orders-builder");
    }

    #[test]
    fn binary_plan_has_only_a_runtime_stage() {
        let plan = build_plan(
            "payments",
            BuildPlanSpec {
                build_type: Some(BuildType::Binary),
                ..Default::default()
            },
        );

        let desired = super::plan(&plan, &ImageDefaults::default()).unwrap();
        let runtime = &desired.runtime.manifest;

        assert!(desired.builder.is_none());
        assert_eq!(runtime.spec.source.source_type, BuildSourceType::Binary);
        assert!(runtime.spec.triggers.is_empty());
        assert_eq!(
            env_value(runtime, EnvNames::BINARY_BUILD).as_deref(),
            Some("true")
        );
        assert_eq!(desired.entry_manifest().name_any(), "payments");
        assert!(desired.managed_stream_names().is_empty());
    }

    #[test]
    fn local_source_plan_sets_resource_and_artifact_env() {
        let mut spec = BuildPlanSpec {
            build_type: Some(BuildType::LocalSource),
            runtime: RuntimeKind::Quarkus,
            native: true,
            maven_mirror_url: Some("https://mirror.example.com".to_string()),
            ..Default::default()
        };
        spec.resources
            .limits
            .insert("cpu".to_string(), "1500m".to_string());
        spec.resources
            .limits
            .insert("memory".to_string(), "1Gi".to_string());
        spec.artifact.group_id = Some("com.example".to_string());
        spec.artifact.version = Some(String::new());

        let desired = super::plan(&build_plan("inventory", spec), &ImageDefaults::default()).unwrap();
        let builder = &desired.builder.as_ref().unwrap().manifest;

        assert_eq!(builder.spec.source.source_type, BuildSourceType::Binary);
        assert!(builder.spec.triggers.is_empty());
        assert_eq!(env_value(builder, EnvNames::NATIVE).as_deref(), Some("true"));
        assert_eq!(
            env_value(builder, EnvNames::LIMIT_CPU).as_deref(),
            Some("1500m")
        );
        assert_eq!(
            env_value(builder, EnvNames::LIMIT_MEMORY).as_deref(),
            Some("1073741824")
        );
        assert_eq!(
            env_value(builder, EnvNames::MAVEN_MIRROR_URL).as_deref(),
            Some("https://mirror.example.com")
        );
        assert_eq!(
            env_value(builder, EnvNames::PROJECT_GROUP_ID).as_deref(),
            Some("com.example")
        );
        assert_eq!(env_value(builder, EnvNames::PROJECT_VERSION), None);
        assert_eq!(env_value(builder, EnvNames::MAVEN_DOWNLOAD_OUTPUT), None);

        assert_eq!(
            from_name(&desired.runtime.manifest).as_deref(),
            Some("forge-runtime-native:0.1")
        );
    }

    #[test]
    fn artifact_version_bump_replaces_the_env_entry() {
        let versioned = |version: &str| {
            let mut spec = BuildPlanSpec {
                build_type: Some(BuildType::LocalSource),
                ..Default::default()
            };
            spec.artifact.version = Some(version.to_string());
            let desired = super::plan(&build_plan("inventory", spec), &ImageDefaults::default()).unwrap();
            desired.builder.unwrap().manifest
        };
        let count = |manifest: &BuildConfig| {
            env(manifest)
                .iter()
                .filter(|e| e.name == EnvNames::PROJECT_VERSION)
                .count()
        };

        let deployed = versioned("1.2.3");
        assert_eq!(env_value(&deployed, EnvNames::PROJECT_VERSION).as_deref(), Some("1.2.3"));

        let bumped = versioned("1.2.4");
        let merged = crate::comparators::merge_build_config(deployed, &bumped);

        for manifest in [&bumped, &merged] {
            assert_eq!(count(manifest), 1);
            assert_eq!(env_value(manifest, EnvNames::PROJECT_VERSION).as_deref(), Some("1.2.4"));
        }
    }

    #[test]
    fn springboot_builder_has_no_native_env() {
        let mut spec = remote_spec();
        spec.runtime = RuntimeKind::SpringBoot;
        spec.native = true;

        let desired = super::plan(&build_plan("catalog", spec), &ImageDefaults::default()).unwrap();

        assert_eq!(
            env_value(&desired.builder.unwrap().manifest, EnvNames::NATIVE),
            None
        );
        assert_eq!(
            from_name(&desired.runtime.manifest).as_deref(),
            Some("forge-runtime-springboot:0.1")
        );
    }

    #[test]
    fn generic_webhook_allows_env() {
        let mut spec = remote_spec();
        spec.web_hooks = vec![WebHookSecret {
            webhook_type: WebHookType::Generic,
            secret: "hook".to_string(),
        }];

        let desired = super::plan(&build_plan("orders", spec), &ImageDefaults::default()).unwrap();
        let builder = desired.builder.unwrap().manifest;
        let generic = builder
            .spec
            .triggers
            .iter()
            .find_map(|t| t.generic.as_ref())
            .unwrap();

        assert_eq!(generic.allow_env, Some(true));
        assert_eq!(
            generic.secret_reference.as_ref().map(|s| s.name.as_str()),
            Some("hook")
        );
    }

    #[test]
    fn target_overrides_name_the_application_stream() {
        let mut spec = remote_spec();
        spec.target_deployment_name = Some("storefront".to_string());
        spec.target_image_tag = Some("canary".to_string());

        let desired = super::plan(&build_plan("orders", spec), &ImageDefaults::default()).unwrap();

        match &desired.runtime.output_stream {
            OutputStream::Shared(request) => {
                assert_eq!(request.name, "storefront");
                assert_eq!(request.tag.name, "canary");
            }
            OutputStream::Managed(_) => panic!("application stream must be shared"),
        }
        assert_eq!(desired.runtime.manifest.name_any(), "storefront-canary");
    }

    #[test]
    fn invalid_plans_are_rejected() {
        let mut spec = remote_spec();
        spec.git_source = None;
        assert_eq!(
            super::plan(&build_plan("orders", spec), &ImageDefaults::default()),
            Err(CoreError::MissingGitUri("orders".to_string()))
        );

        let untyped = build_plan("orders", BuildPlanSpec::default());
        assert_eq!(
            super::plan(&untyped, &ImageDefaults::default()),
            Err(CoreError::MissingBuildType("orders".to_string()))
        );

        let mut unsaved = build_plan("orders", remote_spec());
        unsaved.metadata.uid = None;
        assert_eq!(
            super::plan(&unsaved, &ImageDefaults::default()),
            Err(CoreError::MissingMetadata("uid"))
        );

        let mut bad_cpu = remote_spec();
        bad_cpu
            .resources
            .limits
            .insert("cpu".to_string(), "lots".to_string());
        assert!(matches!(
            super::plan(&build_plan("orders", bad_cpu), &ImageDefaults::default()),
            Err(CoreError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn planning_is_deterministic() {
        let mut spec = remote_spec();
        spec.resources
            .requests
            .insert("memory".to_string(), "512Mi".to_string());
        let plan = build_plan("orders", spec);

        let first = super::plan(&plan, &ImageDefaults::default()).unwrap();
        let second = super::plan(&plan, &ImageDefaults::default()).unwrap();

        assert_eq!(first, second);
    }
}

use k8s_openapi::api::core::v1::{EnvVar, ObjectReference};
use kube::api::ObjectMeta;

use super::AssemblyContext;
use crate::{
    crds::openshift::{
        BinaryBuildSource, BuildConfig, BuildSource, BuildSourceType, BuildStrategy,
        BuildStrategyType, BuildTriggerPolicy, BuildTriggerType, GitBuildSource,
        ImageChangeTrigger, ImageSource, ImageSourcePath, SecretLocalReference,
        SourceBuildStrategy, WebHookTrigger,
    },
    env_names::EnvNames,
    error::CoreError,
    formatters::{
        BUILDER_OUTPUT_PATH, LATEST_TAG, format_runtime_name, non_empty, stream_tag_reference,
        strip_trailing_slash,
    },
    models::{RuntimeKind, WebHookType},
    quantity::ParsedQuantity,
};

/// Sets `name` to `value`, replacing an existing entry instead of appending a duplicate.
pub fn upsert_env(env: &mut Vec<EnvVar>, name: &str, value: impl Into<String>) {
    let value = Some(value.into());
    match env.iter_mut().find(|e| e.name == name) {
        Some(existing) => {
            existing.value = value;
            existing.value_from = None;
        }
        None => env.push(EnvVar {
            name: name.to_string(),
            value,
            ..Default::default()
        }),
    }
}

fn source_strategy(manifest: &mut BuildConfig) -> &mut SourceBuildStrategy {
    manifest
        .spec
        .strategy
        .source_strategy
        .get_or_insert_with(SourceBuildStrategy::default)
}

fn image_change_trigger(from: Option<ObjectReference>) -> BuildTriggerPolicy {
    BuildTriggerPolicy {
        trigger_type: BuildTriggerType::ImageChange,
        github: None,
        generic: None,
        image_change: Some(ImageChangeTrigger {
            from,
            ..Default::default()
        }),
    }
}

fn builder_output(ctx: &AssemblyContext) -> ObjectReference {
    stream_tag_reference(&ctx.builder_name(), LATEST_TAG)
}

// ---------------------------------------------
// Builder stage
// ---------------------------------------------

pub fn builder_base(
    mut manifest: BuildConfig,
    ctx: &AssemblyContext,
) -> Result<BuildConfig, CoreError> {
    manifest.metadata = ObjectMeta {
        name: Some(ctx.builder_name()),
        ..manifest.metadata
    };

    manifest.spec.strategy = BuildStrategy {
        strategy_type: BuildStrategyType::Source,
        source_strategy: Some(SourceBuildStrategy {
            from: stream_tag_reference(&ctx.builder_image.stream_name, &ctx.builder_image.tag),
            incremental: ctx.spec.incremental,
            ..Default::default()
        }),
        ..Default::default()
    };
    manifest.spec.output.to = Some(builder_output(ctx));
    // Without `from` the trigger follows the strategy's input image.
    manifest.spec.triggers = vec![image_change_trigger(None)];

    Ok(manifest)
}

pub fn remote_source(
    mut manifest: BuildConfig,
    ctx: &AssemblyContext,
) -> Result<BuildConfig, CoreError> {
    let git = ctx
        .spec
        .git_source
        .as_ref()
        .filter(|g| !g.uri.trim().is_empty())
        .ok_or_else(|| CoreError::MissingGitUri(ctx.plan_name.to_string()))?;

    manifest.spec.source = BuildSource {
        source_type: BuildSourceType::Git,
        git: Some(GitBuildSource {
            uri: git.uri.trim().to_string(),
            reference: non_empty(git.reference.as_ref()).map(str::to_string),
        }),
        context_dir: git.context_dir.as_deref().and_then(strip_trailing_slash),
        ..Default::default()
    };

    for hook in &ctx.spec.web_hooks {
        let secret_reference = Some(SecretLocalReference {
            name: hook.secret.clone(),
        });
        let trigger = match hook.webhook_type {
            WebHookType::GitHub => BuildTriggerPolicy {
                trigger_type: BuildTriggerType::GitHub,
                github: Some(WebHookTrigger {
                    secret_reference,
                    allow_env: None,
                }),
                generic: None,
                image_change: None,
            },
            WebHookType::Generic => BuildTriggerPolicy {
                trigger_type: BuildTriggerType::Generic,
                github: None,
                generic: Some(WebHookTrigger {
                    secret_reference,
                    allow_env: Some(true),
                }),
                image_change: None,
            },
        };
        manifest.spec.triggers.push(trigger);
    }

    Ok(manifest)
}

pub fn local_source(
    mut manifest: BuildConfig,
    ctx: &AssemblyContext,
) -> Result<BuildConfig, CoreError> {
    manifest.spec.source = BuildSource {
        source_type: BuildSourceType::Binary,
        binary: Some(BinaryBuildSource::default()),
        ..Default::default()
    };
    // binary input is pushed by the client, nothing may start a build on its own
    manifest.spec.triggers.clear();

    let artifact = &ctx.spec.artifact;
    let env = &mut source_strategy(&mut manifest).env;
    for (name, value) in [
        (EnvNames::PROJECT_GROUP_ID, &artifact.group_id),
        (EnvNames::PROJECT_ARTIFACT_ID, &artifact.artifact_id),
        (EnvNames::PROJECT_VERSION, &artifact.version),
    ] {
        if let Some(value) = non_empty(value.as_ref()) {
            upsert_env(env, name, value);
        }
    }

    Ok(manifest)
}

pub fn builder_environment(
    mut manifest: BuildConfig,
    ctx: &AssemblyContext,
) -> Result<BuildConfig, CoreError> {
    let spec = ctx.spec;
    let limits = &spec.resources.limits;

    let cpu = limits
        .get("cpu")
        .map(|raw| raw.parse::<ParsedQuantity>())
        .transpose()?;
    let memory = limits
        .get("memory")
        .map(|raw| raw.parse::<ParsedQuantity>())
        .transpose()?;

    let env = &mut source_strategy(&mut manifest).env;

    if spec.runtime == RuntimeKind::Quarkus {
        upsert_env(env, EnvNames::NATIVE, spec.native.to_string());
    }
    if let Some(cpu) = cpu {
        upsert_env(env, EnvNames::LIMIT_CPU, cpu.to_cpu_string());
    }
    if let Some(memory) = memory {
        upsert_env(env, EnvNames::LIMIT_MEMORY, memory.to_bytes_string());
    }
    if let Some(mirror) = non_empty(spec.maven_mirror_url.as_ref()) {
        upsert_env(env, EnvNames::MAVEN_MIRROR_URL, mirror);
    }
    if spec.enable_maven_download_output {
        upsert_env(env, EnvNames::MAVEN_DOWNLOAD_OUTPUT, "true");
    }

    Ok(manifest)
}

// ---------------------------------------------
// Runtime stage
// ---------------------------------------------

pub fn runtime_base(
    mut manifest: BuildConfig,
    ctx: &AssemblyContext,
) -> Result<BuildConfig, CoreError> {
    manifest.metadata = ObjectMeta {
        name: Some(format_runtime_name(&ctx.target_name, &ctx.target_tag)),
        ..manifest.metadata
    };

    manifest.spec.strategy = BuildStrategy {
        strategy_type: BuildStrategyType::Source,
        source_strategy: Some(SourceBuildStrategy {
            from: stream_tag_reference(&ctx.runtime_image.stream_name, &ctx.runtime_image.tag),
            ..Default::default()
        }),
        ..Default::default()
    };
    manifest.spec.output.to = Some(stream_tag_reference(&ctx.target_name, &ctx.target_tag));
    manifest.spec.triggers = vec![image_change_trigger(Some(builder_output(ctx)))];

    Ok(manifest)
}

pub fn binary_runtime(
    mut manifest: BuildConfig,
    _ctx: &AssemblyContext,
) -> Result<BuildConfig, CoreError> {
    manifest.spec.source = BuildSource {
        source_type: BuildSourceType::Binary,
        binary: Some(BinaryBuildSource::default()),
        ..Default::default()
    };
    manifest.spec.triggers.clear();
    upsert_env(&mut source_strategy(&mut manifest).env, EnvNames::BINARY_BUILD, "true");

    Ok(manifest)
}

pub fn source_runtime(
    mut manifest: BuildConfig,
    ctx: &AssemblyContext,
) -> Result<BuildConfig, CoreError> {
    manifest.spec.source = BuildSource {
        source_type: BuildSourceType::Image,
        images: vec![ImageSource {
            from: builder_output(ctx),
            paths: vec![ImageSourcePath {
                source_path: BUILDER_OUTPUT_PATH.to_string(),
                destination_dir: ".".to_string(),
            }],
        }],
        ..Default::default()
    };

    Ok(manifest)
}

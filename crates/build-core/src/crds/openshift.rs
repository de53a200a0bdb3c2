use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, ObjectReference, ResourceRequirements};
use kube::CustomResource;
use serde::{Deserialize, Serialize};

use crate::models::BuildPhase;

// Fields the operator does not manage are kept in `extra` so a replace never drops them.
type Extra = BTreeMap<String, serde_json::Value>;

// -----------------------------------------------------------------------------
// BuildConfig Resource (one build stage)
// -----------------------------------------------------------------------------
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, PartialEq)]
#[kube(
    group = "build.openshift.io",
    version = "v1",
    kind = "BuildConfig",
    plural = "buildconfigs",
    namespaced,
    schema = "disabled",
    status = "BuildConfigStatus",
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfigSpec {
    #[serde(default)]
    pub triggers: Vec<BuildTriggerPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_policy: Option<String>,
    #[serde(default)]
    pub source: BuildSource,
    #[serde(default)]
    pub strategy: BuildStrategy,
    #[serde(default)]
    pub output: BuildOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfigStatus {
    pub last_version: Option<i64>,

    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Deserialize, Serialize, Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum BuildSourceType {
    Git,
    Dockerfile,
    Binary,
    Image,
    #[default]
    None,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildSource {
    #[serde(rename = "type")]
    pub source_type: BuildSourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git: Option<GitBuildSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary: Option<BinaryBuildSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageSource>,

    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GitBuildSource {
    pub uri: String,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BinaryBuildSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_file: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageSource {
    pub from: ObjectReference,
    #[serde(default)]
    pub paths: Vec<ImageSourcePath>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageSourcePath {
    pub source_path: String,
    pub destination_dir: String,
}

#[derive(Deserialize, Serialize, Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum BuildStrategyType {
    #[default]
    Source,
    Docker,
    Custom,
    JenkinsPipeline,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildStrategy {
    #[serde(rename = "type")]
    pub strategy_type: BuildStrategyType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_strategy: Option<SourceBuildStrategy>,

    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceBuildStrategy {
    pub from: ObjectReference,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incremental: Option<bool>,

    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<ObjectReference>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildTriggerType {
    GitHub,
    GitLab,
    Bitbucket,
    Generic,
    ImageChange,
    ConfigChange,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildTriggerPolicy {
    #[serde(rename = "type")]
    pub trigger_type: BuildTriggerType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github: Option<WebHookTrigger>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generic: Option<WebHookTrigger>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_change: Option<ImageChangeTrigger>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebHookTrigger {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_reference: Option<SecretLocalReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_env: Option<bool>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq)]
pub struct SecretLocalReference {
    pub name: String,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageChangeTrigger {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<ObjectReference>,
    /// Populated by the cluster once the trigger fired.
    #[serde(
        rename = "lastTriggeredImageID",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_triggered_image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
}

// -----------------------------------------------------------------------------
// Build Resource (one execution of a BuildConfig)
// -----------------------------------------------------------------------------
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, PartialEq)]
#[kube(
    group = "build.openshift.io",
    version = "v1",
    kind = "Build",
    plural = "builds",
    namespaced,
    schema = "disabled",
    status = "BuildStatus",
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct BuildSpec {
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<BuildPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(flatten)]
    pub extra: Extra,
}

impl Build {
    /// A build without a reported phase has just been accepted by the cluster.
    pub fn phase(&self) -> BuildPhase {
        self.status
            .as_ref()
            .and_then(|s| s.phase)
            .unwrap_or(BuildPhase::New)
    }

    pub fn failure_message(&self) -> Option<String> {
        self.status
            .as_ref()
            .and_then(|s| s.message.clone().or_else(|| s.reason.clone()))
    }
}

// -----------------------------------------------------------------------------
// ImageStream Resource (named set of image tags)
// -----------------------------------------------------------------------------
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, PartialEq)]
#[kube(
    group = "image.openshift.io",
    version = "v1",
    kind = "ImageStream",
    plural = "imagestreams",
    namespaced,
    schema = "disabled",
    status = "ImageStreamStatus",
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ImageStreamSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookup_policy: Option<ImageLookupPolicy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagReference>,

    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq)]
pub struct ImageLookupPolicy {
    pub local: bool,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TagReference {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<ObjectReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_policy: Option<TagImportPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_policy: Option<TagReferencePolicy>,

    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TagImportPolicy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<bool>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq)]
pub struct TagReferencePolicy {
    #[serde(rename = "type")]
    pub policy_type: String,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageStreamStatus {
    pub docker_image_repository: Option<String>,

    #[serde(flatten)]
    pub extra: Extra,
}

impl ImageStream {
    pub fn tag(&self, name: &str) -> Option<&TagReference> {
        self.spec.tags.iter().find(|t| t.name == name)
    }
}

pub mod openshift;

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::models::{
    BuildType, ConditionReason, ConditionStatus, ConditionType, RuntimeKind, WebHookType,
};

// -----------------------------------------------------------------------------
// BuildPlan Resource (the user facing build intent)
// -----------------------------------------------------------------------------
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "forge.dev",
    version = "v1alpha1",
    kind = "BuildPlan",
    plural = "buildplans",
    shortname = "bp",
    namespaced,
    status = "BuildPlanStatus",
    derive = "Default",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Runtime","type":"string","jsonPath":".spec.runtime"}"#,
    printcolumn = r#"{"name":"Latest Build","type":"string","jsonPath":".status.latestBuild"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BuildPlanSpec {
    /// Kept optional so a missing type surfaces as a reconcile failure instead of a decode error.
    #[serde(rename = "type")]
    pub build_type: Option<BuildType>,
    #[serde(default)]
    pub runtime: RuntimeKind,
    #[serde(default)]
    pub native: bool,
    pub git_source: Option<GitSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub web_hooks: Vec<WebHookSecret>,
    #[serde(default)]
    pub resources: BuildResources,
    #[serde(rename = "mavenMirrorURL")]
    pub maven_mirror_url: Option<String>,
    #[serde(default)]
    pub enable_maven_download_output: bool,
    #[serde(default)]
    pub build_image: ImageOverride,
    #[serde(default)]
    pub runtime_image: ImageOverride,
    /// Name of the application the runtime stage produces. Defaults to the BuildPlan name.
    pub target_deployment_name: Option<String>,
    /// Tag written on the shared application stream. Defaults to `latest`.
    pub target_image_tag: Option<String>,
    #[serde(default)]
    pub artifact: ArtifactOverride,
    pub incremental: Option<bool>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitSource {
    pub uri: String,
    pub reference: Option<String>,
    pub context_dir: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebHookSecret {
    #[serde(rename = "type")]
    pub webhook_type: WebHookType,
    /// Name of the Secret holding the webhook token.
    pub secret: String,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BuildResources {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageOverride {
    pub name: Option<String>,
    pub tag: Option<String>,
    pub namespace: Option<String>,
    pub registry: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactOverride {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
}

// -----------------------------------------------------------------------------
// BuildPlan Status
// -----------------------------------------------------------------------------
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BuildPlanStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub latest_build: Option<String>,
    #[serde(default)]
    pub builds: BuildsSummary,
    /// Last `forge.dev/trigger` annotation value that started a build.
    pub last_trigger_token: Option<String>,
}

/// Names of the BuildPlan's attempts grouped by phase.
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BuildsSummary {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub running: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub complete: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cancelled: Vec<String>,
}

// Standard Kubernetes condition format
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: ConditionStatus,
    /// RFC3339, only moves when `status` or `reason` change.
    pub last_transition_time: Option<String>,
    pub reason: Option<ConditionReason>,
    pub message: Option<String>,
}

impl BuildPlanStatus {
    pub fn condition(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    pub fn is_true(&self, condition_type: ConditionType) -> bool {
        self.condition(condition_type)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }
}

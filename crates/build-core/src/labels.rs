use std::collections::BTreeMap;

use crate::models::BuildType;

/// Name of the BuildPlan a resource or build attempt belongs to.
pub const APP_LABEL: &str = "forge.dev/app";
pub const BUILD_TYPE_LABEL: &str = "forge.dev/build-type";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "forge-operator";

/// Set by the cluster on every Build, naming the BuildConfig it was started from.
pub const BUILD_CONFIG_LABEL: &str = "openshift.io/build-config.name";

/// Changing this annotation on a BuildPlan asks for a fresh build attempt.
pub const TRIGGER_ANNOTATION: &str = "forge.dev/trigger";

/// Set on a source BuildConfig together with a change of its spec, removed once
/// a build of the new spec has started.
pub const REBUILD_ANNOTATION: &str = "forge.dev/rebuild-pending";

pub fn build_labels(app: &str, build_type: BuildType) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_LABEL.to_string(), app.to_string()),
        (BUILD_TYPE_LABEL.to_string(), build_type.to_string()),
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string()),
    ])
}

/// `forge.dev/app={app}`, matches every object labeled for a BuildPlan whatever its build type.
pub fn app_selector(app: &str) -> String {
    format!("{APP_LABEL}={app}")
}

/// `openshift.io/build-config.name={name}`
pub fn build_config_selector(build_config: &str) -> String {
    format!("{BUILD_CONFIG_LABEL}={build_config}")
}

/// `forge.dev/app={app},forge.dev/build-type={type}`
pub fn build_selector(app: &str, build_type: BuildType) -> String {
    format!("{APP_LABEL}={app},{BUILD_TYPE_LABEL}={build_type}")
}

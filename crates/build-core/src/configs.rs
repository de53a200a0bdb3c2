use serde::Deserialize;

/// Registry coordinates used when a BuildPlan does not override them.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ImageDefaults {
    #[serde(default = "registry_default")]
    pub registry: String,
    #[serde(default = "namespace_default")]
    pub namespace: String,
    #[serde(default = "version_default")]
    pub version: String,
}

impl Default for ImageDefaults {
    fn default() -> Self {
        Self {
            registry: registry_default(),
            namespace: namespace_default(),
            version: version_default(),
        }
    }
}

fn registry_default() -> String {
    String::from("quay.io")
}

fn namespace_default() -> String {
    String::from("forgedev")
}

fn version_default() -> String {
    String::from("0.1")
}

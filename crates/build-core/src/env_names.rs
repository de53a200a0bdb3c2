pub struct EnvNames;

impl EnvNames {
    pub const NATIVE: &str = "NATIVE";
    pub const LIMIT_CPU: &str = "LIMIT_CPU";
    pub const LIMIT_MEMORY: &str = "LIMIT_MEMORY";
    pub const MAVEN_MIRROR_URL: &str = "MAVEN_MIRROR_URL";
    pub const MAVEN_DOWNLOAD_OUTPUT: &str = "MAVEN_DOWNLOAD_OUTPUT";
    pub const PROJECT_GROUP_ID: &str = "PROJECT_GROUP_ID";
    pub const PROJECT_ARTIFACT_ID: &str = "PROJECT_ARTIFACT_ID";
    pub const PROJECT_VERSION: &str = "PROJECT_VERSION";
    pub const BINARY_BUILD: &str = "BINARY_BUILD";
}

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ---------------------------------------------
// ENUMS
// ---------------------------------------------

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildType {
    Binary,
    LocalSource,
    RemoteSource,
}

impl BuildType {
    pub fn is_source(&self) -> bool {
        matches!(self, Self::LocalSource | Self::RemoteSource)
    }
}

impl std::fmt::Display for BuildType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binary => write!(f, "Binary"),
            Self::LocalSource => write!(f, "LocalSource"),
            Self::RemoteSource => write!(f, "RemoteSource"),
        }
    }
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    #[default]
    Quarkus,
    SpringBoot,
}

impl RuntimeKind {
    /// Only Quarkus applications can be compiled to a native executable.
    pub fn supports_native(&self) -> bool {
        matches!(self, Self::Quarkus)
    }
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quarkus => write!(f, "quarkus"),
            Self::SpringBoot => write!(f, "springboot"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageRole {
    Builder,
    Runtime,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebHookType {
    GitHub,
    Generic,
}

/// Phase of a single build attempt as reported by the cluster.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildPhase {
    New,
    Pending,
    Running,
    Complete,
    Failed,
    Error,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl BuildPhase {
    /// The attempt may still produce an image and can be cancelled.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::New | Self::Pending | Self::Running | Self::Unknown
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Error | Self::Cancelled)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionType {
    Successful,
    Running,
    Failed,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionReason {
    /// The build attempt itself failed or was cancelled.
    BuildFailure,
    /// The operator could not reconcile the BuildPlan.
    OperatorFailure,
}

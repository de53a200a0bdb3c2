use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("BuildPlan '{0}' has no build type")]
    MissingBuildType(String),
    #[error("RemoteSource BuildPlan '{0}' requires gitSource.uri")]
    MissingGitUri(String),
    #[error("BuildPlan is missing metadata.{0}")]
    MissingMetadata(&'static str),
    #[error("Invalid quantity '{0}'")]
    InvalidQuantity(String),
    #[error("Invalid image reference '{0}'")]
    InvalidImageReference(String),
    #[error("{kind} '{name}' is controlled by BuildPlan '{owner}'")]
    ControlledElsewhere {
        kind: String,
        name: String,
        owner: String,
    },
    #[error("Tag '{tag}' of ImageStream '{stream}' already points at another image")]
    TagConflict { stream: String, tag: String },
}

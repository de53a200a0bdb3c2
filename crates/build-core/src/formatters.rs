use k8s_openapi::api::core::v1::ObjectReference;

pub const IMAGE_STREAM_TAG_KIND: &str = "ImageStreamTag";
pub const DOCKER_IMAGE_KIND: &str = "DockerImage";
pub const LATEST_TAG: &str = "latest";
pub const CUSTOM_STREAM_PREFIX: &str = "custom-";
/// Where the builder image leaves the compiled application.
pub const BUILDER_OUTPUT_PATH: &str = "/home/forge/bin";

/// generate builder stage name like `{plan}-builder`
pub fn format_builder_name(plan_name: &str) -> String {
    format!("{plan_name}-builder")
}

/// Runtime manifest name: the application itself, or `{app}-{tag}` for a non-default tag
/// so several BuildPlans can feed one application stream.
pub fn format_runtime_name(target: &str, tag: &str) -> String {
    if tag == LATEST_TAG {
        target.to_string()
    } else {
        format!("{target}-{tag}")
    }
}

/// `{stream}:{tag}`
pub fn format_stream_tag(stream: &str, tag: &str) -> String {
    format!("{stream}:{tag}")
}

/// `custom-{name}`
pub fn format_custom_stream_name(image_name: &str) -> String {
    format!("{CUSTOM_STREAM_PREFIX}{image_name}")
}

/// `custom-{registry}-{namespace}-{name}`, for a default image pulled from
/// somewhere else. Characters an ImageStream name cannot hold become `-`.
pub fn format_relocated_stream_name(registry: &str, namespace: &str, image_name: &str) -> String {
    let located: String = format!("{registry}-{namespace}-{image_name}")
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '-' })
        .collect();
    format_custom_stream_name(&located)
}

pub fn stream_tag_reference(stream: &str, tag: &str) -> ObjectReference {
    ObjectReference {
        kind: Some(IMAGE_STREAM_TAG_KIND.to_string()),
        name: Some(format_stream_tag(stream, tag)),
        ..Default::default()
    }
}

pub fn docker_image_reference(image: &str) -> ObjectReference {
    ObjectReference {
        kind: Some(DOCKER_IMAGE_KIND.to_string()),
        name: Some(image.to_string()),
        ..Default::default()
    }
}

/// `svc/` -> `svc`, blank -> None
pub fn strip_trailing_slash(path: &str) -> Option<String> {
    let trimmed = path.trim().trim_end_matches('/');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

use std::str::FromStr;

use crate::{
    configs::ImageDefaults,
    crds::ImageOverride,
    error::CoreError,
    formatters::{format_custom_stream_name, format_relocated_stream_name, format_stream_tag, non_empty},
    models::{ImageRole, RuntimeKind},
};

/// Default base images per runtime and stage.
const IMAGE_MATRIX: [(RuntimeKind, ImageRole, &str); 4] = [
    (RuntimeKind::Quarkus, ImageRole::Builder, "forge-builder"),
    (RuntimeKind::Quarkus, ImageRole::Runtime, "forge-runtime-jvm"),
    (RuntimeKind::SpringBoot, ImageRole::Builder, "forge-builder"),
    (
        RuntimeKind::SpringBoot,
        ImageRole::Runtime,
        "forge-runtime-springboot",
    ),
];

/// Runtime image for natively compiled Quarkus applications.
const NATIVE_RUNTIME_IMAGE: &str = "forge-runtime-native";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub registry: String,
    pub namespace: String,
    pub name: String,
    pub tag: String,
    /// ImageStream that mirrors this image inside the cluster.
    pub stream_name: String,
}

impl ResolvedImage {
    /// `{registry}/{namespace}/{name}:{tag}`
    pub fn reference(&self) -> String {
        format!(
            "{}/{}/{}:{}",
            self.registry, self.namespace, self.name, self.tag
        )
    }

    /// `{stream_name}:{tag}`
    pub fn stream_tag(&self) -> String {
        format_stream_tag(&self.stream_name, &self.tag)
    }
}

fn default_image_name(runtime: RuntimeKind, role: ImageRole, native: bool) -> &'static str {
    if native && role == ImageRole::Runtime && runtime.supports_native() {
        return NATIVE_RUNTIME_IMAGE;
    }

    IMAGE_MATRIX
        .iter()
        .find(|(r, s, _)| *r == runtime && *s == role)
        .map(|(_, _, name)| *name)
        .unwrap_or(IMAGE_MATRIX[0].2)
}

/// Resolves the base image for one build stage. Every field falls back to the
/// operator defaults on its own, so a custom namespace keeps the default registry.
///
/// The stream name identifies the image apart from its tag: the operator's own
/// images keep their plain name, a custom name gets the `custom-` prefix and a
/// default image pulled from another registry or namespace carries its location.
pub fn resolve_image(
    runtime: RuntimeKind,
    role: ImageRole,
    native: bool,
    overrides: &ImageOverride,
    defaults: &ImageDefaults,
) -> ResolvedImage {
    let registry = non_empty(overrides.registry.as_ref())
        .unwrap_or(&defaults.registry)
        .to_string();
    let namespace = non_empty(overrides.namespace.as_ref())
        .unwrap_or(&defaults.namespace)
        .to_string();
    let relocated = registry != defaults.registry || namespace != defaults.namespace;

    let (name, stream_name) = match non_empty(overrides.name.as_ref()) {
        Some(custom) => (custom.to_string(), format_custom_stream_name(custom)),
        None => {
            let name = default_image_name(runtime, role, native);
            let stream_name = if relocated {
                format_relocated_stream_name(&registry, &namespace, name)
            } else {
                name.to_string()
            };
            (name.to_string(), stream_name)
        }
    };

    ResolvedImage {
        registry,
        namespace,
        tag: non_empty(overrides.tag.as_ref())
            .unwrap_or(&defaults.version)
            .to_string(),
        name,
        stream_name,
    }
}

impl FromStr for ImageOverride {
    type Err = CoreError;

    /// Parses `[registry/][namespace/]name[:tag]`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let invalid = || CoreError::InvalidImageReference(raw.to_string());

        let last_slash = raw.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (path, tag) = match raw[last_slash..].rfind(':') {
            Some(i) => (&raw[..last_slash + i], Some(&raw[last_slash + i + 1..])),
            None => (raw, None),
        };

        let parts: Vec<&str> = path.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) || tag.is_some_and(str::is_empty) {
            return Err(invalid());
        }

        let (registry, namespace, name) = match parts.as_slice() {
            [name] => (None, None, *name),
            [namespace, name] => (None, Some(namespace.to_string()), *name),
            [registry, middle @ .., name] => {
                (Some(registry.to_string()), Some(middle.join("/")), *name)
            }
            [] => return Err(invalid()),
        };

        Ok(ImageOverride {
            name: Some(name.to_string()),
            tag: tag.map(str::to_string),
            namespace,
            registry,
        })
    }
}

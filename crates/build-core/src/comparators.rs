//! Decides whether a deployed object already satisfies what a BuildPlan asks
//! for, and builds the object to write when it does not.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

use crate::{
    assembler::SharedStreamRequest,
    crds::openshift::{BuildConfig, BuildConfigSpec, ImageStream, TagReference},
};

pub fn has_owner(meta: &ObjectMeta, uid: &str) -> bool {
    meta.owner_references
        .iter()
        .flatten()
        .any(|o| o.uid == uid)
}

/// True when `uid` holds the controller reference of the object.
pub fn is_controlled_by(meta: &ObjectMeta, uid: &str) -> bool {
    meta.owner_references
        .iter()
        .flatten()
        .any(|o| o.uid == uid && o.controller == Some(true))
}

/// The controller reference of the object when it belongs to someone other than `uid`.
pub fn foreign_controller<'a>(meta: &'a ObjectMeta, uid: &str) -> Option<&'a OwnerReference> {
    meta.owner_references
        .iter()
        .flatten()
        .find(|o| o.controller == Some(true) && o.uid != uid)
}

fn labels_contain(deployed: &ObjectMeta, requested: &ObjectMeta) -> bool {
    let deployed = deployed.labels.as_ref();
    requested
        .labels
        .iter()
        .flatten()
        .all(|(k, v)| deployed.and_then(|l| l.get(k)) == Some(v))
}

fn merge_labels(deployed: &mut ObjectMeta, requested: &ObjectMeta) {
    if let Some(requested) = &requested.labels {
        deployed
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(requested.clone());
    }
}

/// Adds `owner` unless an owner with the same uid is already present. An object
/// keeps at most one controller, so a late owner joins as a plain owner.
fn add_owner(meta: &mut ObjectMeta, owner: &OwnerReference) {
    if has_owner(meta, &owner.uid) {
        return;
    }
    let controlled = meta
        .owner_references
        .iter()
        .flatten()
        .any(|o| o.controller == Some(true));
    let owner = if controlled {
        OwnerReference {
            controller: None,
            block_owner_deletion: None,
            ..owner.clone()
        }
    } else {
        owner.clone()
    };
    meta.owner_references.get_or_insert_with(Vec::new).push(owner);
}

/// Drops what the cluster fills in on its own so two specs can be compared.
fn comparable_spec(spec: &BuildConfigSpec) -> BuildConfigSpec {
    let mut spec = spec.clone();
    spec.extra.clear();
    spec.source.extra.clear();
    spec.strategy.extra.clear();
    if let Some(source) = spec.strategy.source_strategy.as_mut() {
        source.extra.clear();
    }
    for trigger in &mut spec.triggers {
        if let Some(image_change) = trigger.image_change.as_mut() {
            image_change.last_triggered_image_id = None;
        }
    }
    if spec.resources.as_ref().is_some_and(|r| r == &Default::default()) {
        spec.resources = None;
    }
    spec
}

// ---------------------------------------------
// BuildConfig
// ---------------------------------------------

/// Spec equality ignoring what the cluster fills in.
pub fn build_config_spec_matches(deployed: &BuildConfig, requested: &BuildConfig) -> bool {
    comparable_spec(&deployed.spec) == comparable_spec(&requested.spec)
}

pub fn build_config_matches(
    deployed: &BuildConfig,
    requested: &BuildConfig,
    owner_uid: &str,
) -> bool {
    labels_contain(&deployed.metadata, &requested.metadata)
        && has_owner(&deployed.metadata, owner_uid)
        && build_config_spec_matches(deployed, requested)
}

/// The requested manifest carried onto the deployed copy. Foreign labels,
/// owners and fields the cluster populated are kept.
pub fn merge_build_config(deployed: BuildConfig, requested: &BuildConfig) -> BuildConfig {
    let mut merged = deployed;
    merge_labels(&mut merged.metadata, &requested.metadata);
    for owner in requested.metadata.owner_references.iter().flatten() {
        add_owner(&mut merged.metadata, owner);
    }

    let mut spec = requested.spec.clone();
    spec.extra = std::mem::take(&mut merged.spec.extra);
    for trigger in &mut spec.triggers {
        let Some(image_change) = trigger.image_change.as_mut() else {
            continue;
        };
        image_change.last_triggered_image_id = merged
            .spec
            .triggers
            .iter()
            .filter_map(|t| t.image_change.as_ref())
            .find(|t| t.from == image_change.from)
            .and_then(|t| t.last_triggered_image_id.clone());
    }
    merged.spec = spec;
    merged
}

// ---------------------------------------------
// Managed ImageStream
// ---------------------------------------------

pub fn managed_stream_matches(
    deployed: &ImageStream,
    requested: &ImageStream,
    owner_uid: &str,
) -> bool {
    labels_contain(&deployed.metadata, &requested.metadata)
        && has_owner(&deployed.metadata, owner_uid)
        && deployed.spec.tags == requested.spec.tags
        && deployed.spec.lookup_policy == requested.spec.lookup_policy
}

pub fn merge_managed_stream(deployed: ImageStream, requested: &ImageStream) -> ImageStream {
    let mut merged = deployed;
    merge_labels(&mut merged.metadata, &requested.metadata);
    for owner in requested.metadata.owner_references.iter().flatten() {
        add_owner(&mut merged.metadata, owner);
    }
    merged.spec.tags = requested.spec.tags.clone();
    merged.spec.lookup_policy = requested.spec.lookup_policy.clone();
    merged
}

// ---------------------------------------------
// Shared ImageStream
// ---------------------------------------------

fn same_target(deployed: &TagReference, requested: &TagReference) -> bool {
    deployed.name == requested.name && deployed.from == requested.from
}

/// Only the requested tag and this plan's owner reference matter. Tags other
/// plans put on the stream are ignored.
pub fn shared_stream_satisfied(
    deployed: &ImageStream,
    request: &SharedStreamRequest,
    owner: &OwnerReference,
) -> bool {
    has_owner(&deployed.metadata, &owner.uid)
        && deployed
            .tag(&request.tag.name)
            .is_some_and(|tag| same_target(tag, &request.tag))
}

/// The requested tag already points elsewhere and someone besides `owner`
/// holds the stream, so the tag may be theirs. It is never rewritten then.
pub fn shared_tag_conflict(
    deployed: &ImageStream,
    request: &SharedStreamRequest,
    owner: &OwnerReference,
) -> bool {
    let shared = deployed
        .metadata
        .owner_references
        .iter()
        .flatten()
        .any(|o| o.uid != owner.uid);

    shared
        && deployed
            .tag(&request.tag.name)
            .is_some_and(|tag| !same_target(tag, &request.tag))
}

/// Joins this plan to an existing shared stream and appends its tag. A tag of
/// the same name pointing elsewhere is only corrected on a stream nobody else
/// holds. Nothing is ever removed.
pub fn merge_shared_stream(
    deployed: ImageStream,
    request: &SharedStreamRequest,
    owner: &OwnerReference,
) -> ImageStream {
    let mut merged = deployed;

    let conflict = shared_tag_conflict(&merged, request, owner);
    add_owner(&mut merged.metadata, owner);

    match merged
        .spec
        .tags
        .iter_mut()
        .find(|t| t.name == request.tag.name)
    {
        Some(tag) if conflict || same_target(tag, &request.tag) => {}
        Some(tag) => {
            tag.from = request.tag.from.clone();
            if tag.reference_policy.is_none() {
                tag.reference_policy = request.tag.reference_policy.clone();
            }
        }
        None => merged.spec.tags.push(request.tag.clone()),
    }

    merged
}

//! Folds the phases of a BuildPlan's build attempts into its status.

use chrono::{DateTime, SecondsFormat, Utc};
use kube::ResourceExt;

use crate::{
    crds::{BuildPlanStatus, BuildsSummary, Condition, openshift::Build},
    models::{BuildPhase, ConditionReason, ConditionStatus, ConditionType},
};

/// Most recent attempt by creation time; the name breaks ties.
pub fn latest_build(builds: &[Build]) -> Option<&Build> {
    builds
        .iter()
        .max_by(|a, b| {
            (&a.metadata.creation_timestamp, &a.metadata.name)
                .cmp(&(&b.metadata.creation_timestamp, &b.metadata.name))
        })
}

pub fn summarize(builds: &[Build]) -> BuildsSummary {
    let mut summary = BuildsSummary::default();
    for build in builds {
        let bucket = match build.phase() {
            BuildPhase::New | BuildPhase::Unknown => &mut summary.new,
            BuildPhase::Pending => &mut summary.pending,
            BuildPhase::Running => &mut summary.running,
            BuildPhase::Complete => &mut summary.complete,
            BuildPhase::Failed => &mut summary.failed,
            BuildPhase::Error => &mut summary.error,
            BuildPhase::Cancelled => &mut summary.cancelled,
        };
        bucket.push(build.name_any());
    }
    for bucket in [
        &mut summary.new,
        &mut summary.pending,
        &mut summary.running,
        &mut summary.complete,
        &mut summary.failed,
        &mut summary.error,
        &mut summary.cancelled,
    ] {
        bucket.sort();
    }
    summary
}

/// Upserts a condition. The transition time only moves when status or reason change.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    condition_type: ConditionType,
    status: ConditionStatus,
    reason: Option<ConditionReason>,
    message: Option<String>,
    now: &str,
) {
    match conditions
        .iter_mut()
        .find(|c| c.condition_type == condition_type)
    {
        Some(existing) => {
            if existing.status != status || existing.reason != reason {
                existing.last_transition_time = Some(now.to_string());
            }
            existing.status = status;
            existing.reason = reason;
            existing.message = message;
        }
        None => conditions.push(Condition {
            condition_type,
            status,
            last_transition_time: Some(now.to_string()),
            reason,
            message,
        }),
    }
}

fn status_reason(conditions: &[Condition], condition_type: ConditionType) -> Option<ConditionReason> {
    conditions
        .iter()
        .find(|c| c.condition_type == condition_type && c.status == ConditionStatus::True)
        .and_then(|c| c.reason)
}

/// Computes the next status from the current one, the plan's attempts and the
/// error of the reconcile pass, if any. Identical inputs give an identical status.
pub fn next_status(
    current: Option<&BuildPlanStatus>,
    builds: &[Build],
    failure: Option<&str>,
    now: DateTime<Utc>,
) -> BuildPlanStatus {
    let now = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut status = current.cloned().unwrap_or_default();
    let conditions = &mut status.conditions;

    if let Some(error) = failure {
        set_condition(
            conditions,
            ConditionType::Failed,
            ConditionStatus::True,
            Some(ConditionReason::OperatorFailure),
            Some(error.to_string()),
            &now,
        );
        return status;
    }

    let latest = latest_build(builds);
    match latest.map(Build::phase) {
        Some(phase) if phase.is_failure() => {
            let message = latest.and_then(Build::failure_message);
            set_condition(
                conditions,
                ConditionType::Failed,
                ConditionStatus::True,
                Some(ConditionReason::BuildFailure),
                message,
                &now,
            );
            set_condition(conditions, ConditionType::Running, ConditionStatus::False, None, None, &now);
            set_condition(conditions, ConditionType::Successful, ConditionStatus::False, None, None, &now);
        }
        Some(BuildPhase::Complete) => {
            set_condition(conditions, ConditionType::Running, ConditionStatus::False, None, None, &now);
            set_condition(conditions, ConditionType::Successful, ConditionStatus::True, None, None, &now);
            if conditions
                .iter()
                .any(|c| c.condition_type == ConditionType::Failed)
            {
                set_condition(conditions, ConditionType::Failed, ConditionStatus::False, None, None, &now);
            }
        }
        // in flight, or nothing started yet
        _ => {
            set_condition(conditions, ConditionType::Running, ConditionStatus::True, None, None, &now);
            set_condition(conditions, ConditionType::Successful, ConditionStatus::False, None, None, &now);
            // a clean pass retires the engine error of an earlier one
            if status_reason(conditions, ConditionType::Failed) == Some(ConditionReason::OperatorFailure) {
                set_condition(conditions, ConditionType::Failed, ConditionStatus::False, None, None, &now);
            }
        }
    }

    status.latest_build = latest.map(ResourceExt::name_any);
    status.builds = summarize(builds);
    status
}

use crate::crd::autoscaler::{
    AutoscalerStatus, Condition, ConditionStatus, ConditionType, ResourceRef,
};
use crate::crd::scaled_object::Backend;

use super::events::REASON_DELEGATED;
use super::keda::Delegation;

pub const REASON_RECONCILE_SUCCESS: &str = "ReconcileSuccess";
pub const REASON_RECONCILE_ERROR: &str = "ReconcileError";
pub const REASON_NOT_DELEGATED: &str = "NotDelegated";

fn condition(
    type_: ConditionType,
    status: ConditionStatus,
    reason: &str,
    message: String,
    now: &str,
) -> Condition {
    Condition {
        type_,
        status,
        reason: Some(reason.into()),
        message: Some(message),
        last_transition_time: Some(now.to_string()),
    }
}

pub fn synced(now: &str) -> Condition {
    condition(
        ConditionType::Synced,
        ConditionStatus::True,
        REASON_RECONCILE_SUCCESS,
        "reconcile completed".into(),
        now,
    )
}

pub fn sync_failed(message: String, now: &str) -> Condition {
    condition(
        ConditionType::Synced,
        ConditionStatus::False,
        REASON_RECONCILE_ERROR,
        message,
        now,
    )
}

pub fn ready(delegation: &Delegation, now: &str) -> Condition {
    match delegation.object_name() {
        Some(name) => condition(
            ConditionType::Ready,
            ConditionStatus::True,
            REASON_DELEGATED,
            format!("{} {} in sync", Backend::Keda.identity().kind, name),
            now,
        ),
        None => condition(
            ConditionType::Ready,
            ConditionStatus::False,
            REASON_NOT_DELEGATED,
            "nothing delegated to the scaling backend".into(),
            now,
        ),
    }
}

/// Status after a reconcile that reached the end of the pipeline.
pub fn completed(
    generation: Option<i64>,
    warnings: Vec<String>,
    delegation: &Delegation,
    now: String,
) -> AutoscalerStatus {
    AutoscalerStatus {
        observed_generation: generation,
        conditions: Some(vec![synced(&now), ready(delegation, &now)]),
        warnings,
        scaled_object: delegation.object_name().map(|name| ResourceRef {
            kind: Backend::Keda.identity().kind.to_string(),
            name: name.to_string(),
        }),
        last_updated: Some(now),
    }
}

/// Status after a failed reconcile. Only the Synced condition changes;
/// warnings and the backend reference keep their last known value.
pub fn failed(
    current: Option<&AutoscalerStatus>,
    generation: Option<i64>,
    message: String,
    now: String,
) -> AutoscalerStatus {
    AutoscalerStatus {
        observed_generation: generation,
        conditions: Some(vec![sync_failed(message, &now)]),
        warnings: current.map(|c| c.warnings.clone()).unwrap_or_default(),
        scaled_object: current.and_then(|c| c.scaled_object.clone()),
        last_updated: Some(now),
    }
}

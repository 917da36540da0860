use crate::crd::autoscaler::{AutoscalerStatus, Condition, ConditionType};

/// Merge `desired` into `current`. Conditions are upserted by type; every
/// other field is taken from `desired`.
pub fn merge_status(
    current: Option<&AutoscalerStatus>,
    mut desired: AutoscalerStatus,
) -> AutoscalerStatus {
    if let Some(cur) = current {
        desired.conditions = Some(upsert_conditions(
            cur.conditions.as_deref().unwrap_or_default(),
            desired.conditions.unwrap_or_default(),
        ));
    }
    desired
}

/// A condition whose status did not flip keeps its previous transition time.
pub(crate) fn upsert_conditions(
    existing: &[Condition],
    incoming: Vec<Condition>,
) -> Vec<Condition> {
    let mut out: Vec<Condition> = existing.to_vec();
    for mut inc in incoming {
        match out.iter().position(|c| c.type_ == inc.type_) {
            Some(idx) => {
                if out[idx].status == inc.status {
                    inc.last_transition_time =
                        out[idx].last_transition_time.clone();
                }
                out[idx] = inc;
            }
            None => out.push(inc),
        }
    }
    out.sort_by_key(|c| cond_rank(&c.type_));
    out
}

fn cond_rank(t: &ConditionType) -> u8 {
    match t {
        ConditionType::Synced => 0,
        ConditionType::Ready => 1,
        ConditionType::Unknown => 250,
    }
}

/// Timestamps alone never justify a status write.
pub fn should_patch_status(
    current: Option<&AutoscalerStatus>,
    desired: &AutoscalerStatus,
) -> bool {
    match current {
        None => true,
        Some(cur) => normalize(cur) != normalize(desired),
    }
}

fn normalize(status: &AutoscalerStatus) -> serde_json::Value {
    let mut s = status.clone();
    s.last_updated = None;
    if let Some(conds) = s.conditions.as_mut() {
        for c in conds {
            c.last_transition_time = None;
        }
    }
    serde_json::to_value(&s).unwrap_or_default()
}

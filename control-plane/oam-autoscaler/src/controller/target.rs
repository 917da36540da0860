use kube::ResourceExt;
use kube::core::DynamicObject;
use tracing::{debug, info, instrument};

use crate::config::KindSet;
use crate::crd::autoscaler::{Autoscaler, TargetWorkload};

use super::ReconcileErr;
use super::store::ResourceStore;

/// How the scale target was decided this reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Stored binding still names a discovered resource.
    Kept(TargetWorkload),
    /// First discovered resource of a scalable kind.
    Selected(TargetWorkload),
    /// Workload has no children and no scalable kind; it is scaled itself.
    DefaultedToWorkload(TargetWorkload),
    Unresolved,
}

impl Resolution {
    pub fn target(&self) -> Option<&TargetWorkload> {
        match self {
            Resolution::Kept(t)
            | Resolution::Selected(t)
            | Resolution::DefaultedToWorkload(t) => Some(t),
            Resolution::Unresolved => None,
        }
    }
}

pub fn target_of(obj: &DynamicObject) -> Option<TargetWorkload> {
    obj.types.as_ref().map(|t| TargetWorkload {
        api_version: t.api_version.clone(),
        kind: t.kind.clone(),
        name: obj.name_any(),
    })
}

/// `resources` is the discovered set with the workload last.
pub fn resolve_target(
    resources: &[DynamicObject],
    current: Option<&TargetWorkload>,
    scalable: &KindSet,
) -> Resolution {
    let candidates: Vec<TargetWorkload> =
        resources.iter().filter_map(target_of).collect();

    if let Some(cur) = current.filter(|c| c.is_set()) {
        if candidates.iter().any(|c| c == cur) {
            return Resolution::Kept(cur.clone());
        }
    }

    if let Some(first) = candidates.iter().find(|c| scalable.contains(&c.kind)) {
        return Resolution::Selected(first.clone());
    }

    match candidates.as_slice() {
        [only] => Resolution::DefaultedToWorkload(only.clone()),
        _ => Resolution::Unresolved,
    }
}

/// Writes the resolved binding onto the trait when it differs from the
/// stored one and returns the binding later stages must use.
#[instrument(skip_all, fields(name = %autoscaler.name_any()))]
pub async fn persist_target(
    store: &dyn ResourceStore,
    autoscaler: &Autoscaler,
    resolution: &Resolution,
) -> Result<Option<TargetWorkload>, ReconcileErr> {
    let stored = autoscaler
        .spec
        .target_workload
        .as_ref()
        .filter(|t| t.is_set());
    let resolved = resolution.target();
    if stored == resolved {
        debug!("target workload unchanged");
        return Ok(resolved.cloned());
    }
    store
        .patch_target_workload(autoscaler, resolved)
        .await
        .map_err(ReconcileErr::TargetPersist)?;
    match resolved {
        Some(t) => info!(target = %t, "target workload persisted"),
        None => info!("stale target workload cleared"),
    }
    Ok(resolved.cloned())
}

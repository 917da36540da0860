use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::core::DynamicObject;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, instrument, trace, warn};

use crate::crd::autoscaler::Autoscaler;

use super::ReconcileErr;
use super::store::{ResourceStore, is_conflict};

/// Controller owner reference pointing at the trait.
pub fn trait_owner_reference(autoscaler: &Autoscaler) -> OwnerReference {
    OwnerReference {
        api_version: Autoscaler::api_version(&()).into_owned(),
        kind: Autoscaler::kind(&()).into_owned(),
        name: autoscaler.name_any(),
        uid: autoscaler.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Owner list with every existing controller demoted and `owner` appended as
/// the only controller. A previous entry for `owner` is replaced, so applying
/// this to its own output is a no-op.
pub fn adopt(
    existing: &[OwnerReference],
    owner: &OwnerReference,
) -> Vec<OwnerReference> {
    let mut refs: Vec<OwnerReference> = existing
        .iter()
        .filter(|r| r.uid != owner.uid)
        .cloned()
        .map(|mut r| {
            if r.controller == Some(true) {
                r.controller = Some(false);
            }
            r
        })
        .collect();
    refs.push(owner.clone());
    refs
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdoptionReport {
    pub patched: usize,
    pub unchanged: usize,
}

/// Puts every resource under the trait's control, in order. Stops at the
/// first failed patch; earlier patches stay applied.
#[instrument(skip_all, fields(name = %autoscaler.name_any(), count = resources.len()))]
pub async fn adopt_resources(
    store: &dyn ResourceStore,
    autoscaler: &Autoscaler,
    resources: &[DynamicObject],
) -> Result<AdoptionReport, ReconcileErr> {
    let owner = trait_owner_reference(autoscaler);
    let field_manager = owner.uid.clone();
    let mut report = AdoptionReport::default();

    for res in resources {
        let current = res.owner_references();
        let desired = adopt(current, &owner);
        if desired.as_slice() == current {
            trace!(resource = %res.name_any(), "owner references already in place");
            report.unchanged += 1;
            continue;
        }
        if let Err(e) = store
            .patch_owner_references(res, &desired, &field_manager)
            .await
        {
            if is_conflict(&e) {
                warn!(resource = %res.name_any(), "resource changed since it was read");
            } else {
                error!(resource = %res.name_any(), error = %e, "Failed to set ownerReference for child resource");
            }
            return Err(ReconcileErr::Ownership {
                resource: describe(res),
                source: e,
            });
        }
        debug!(resource = %res.name_any(), "owner references updated");
        report.patched += 1;
    }
    Ok(report)
}

fn describe(obj: &DynamicObject) -> String {
    match obj.types.as_ref() {
        Some(t) => format!("{} {}", t.kind, obj.name_any()),
        None => obj.name_any(),
    }
}

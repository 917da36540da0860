use std::collections::HashSet;

use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::core::DynamicObject;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, instrument, trace};

use crate::config::KindSet;
use crate::crd::autoscaler::Autoscaler;

use super::ReconcileErr;
use super::store::{ResourceStore, TypeRef, is_not_found};

/// How far up the ownership chain the context search goes.
const MAX_ANCESTOR_DEPTH: usize = 8;

/// Object that receives the trait's events.
#[derive(Debug, Clone, PartialEq)]
pub enum EventTarget {
    /// Nearest ancestor application context.
    Found(ObjectReference),
    /// No context ancestor exists; events go to the trait itself.
    Fallback(ObjectReference),
}

impl EventTarget {
    pub fn fallback(autoscaler: &Autoscaler) -> Self {
        EventTarget::Fallback(autoscaler.object_ref(&()))
    }

    pub fn object_ref(&self) -> &ObjectReference {
        match self {
            EventTarget::Found(r) | EventTarget::Fallback(r) => r,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, EventTarget::Fallback(_))
    }
}

pub fn dynamic_object_ref(obj: &DynamicObject) -> ObjectReference {
    ObjectReference {
        api_version: obj.types.as_ref().map(|t| t.api_version.clone()),
        kind: obj.types.as_ref().map(|t| t.kind.clone()),
        name: obj.metadata.name.clone(),
        namespace: obj.metadata.namespace.clone(),
        uid: obj.metadata.uid.clone(),
        resource_version: obj.metadata.resource_version.clone(),
        ..Default::default()
    }
}

/// Missing owners and owner types unknown to the cluster both count as
/// "not there".
fn is_missing(err: &kube::Error) -> bool {
    is_not_found(err) || matches!(err, kube::Error::Discovery(_))
}

/// Walks owner references upward from the trait, breadth first, and returns
/// the first ancestor whose kind is a context kind.
#[instrument(skip_all, fields(name = %autoscaler.name_any()))]
pub async fn locate_event_target(
    store: &dyn ResourceStore,
    autoscaler: &Autoscaler,
    context_kinds: &KindSet,
) -> Result<EventTarget, ReconcileErr> {
    let ns = autoscaler.namespace().unwrap_or_else(|| "default".into());
    let mut seen: HashSet<String> = HashSet::new();
    let mut frontier: Vec<OwnerReference> = autoscaler.owner_references().to_vec();

    for depth in 0..MAX_ANCESTOR_DEPTH {
        if frontier.is_empty() {
            break;
        }
        let mut next: Vec<OwnerReference> = Vec::new();
        for owner in frontier {
            if !seen.insert(owner.uid.clone()) {
                continue;
            }
            let type_ref = TypeRef::new(&owner.api_version, &owner.kind);
            let found = match store.get(&type_ref, &ns, &owner.name).await {
                Ok(found) => found,
                Err(e) if is_missing(&e) => None,
                Err(e) => return Err(ReconcileErr::ContextLookup(e)),
            };
            let Some(obj) = found else {
                debug!(depth, owner = %owner.name, kind = %owner.kind, "owner no longer exists; skipping");
                continue;
            };
            if context_kinds.contains(&owner.kind) {
                trace!(depth, owner = %owner.name, "context ancestor found");
                return Ok(EventTarget::Found(dynamic_object_ref(&obj)));
            }
            next.extend(obj.owner_references().iter().cloned());
        }
        frontier = next;
    }

    info!("there is no parent resource; events go to the trait");
    Ok(EventTarget::fallback(autoscaler))
}

/// Resolves `spec.workloadRef` to the live workload object.
#[instrument(skip_all, fields(name = %autoscaler.name_any()))]
pub async fn fetch_workload(
    store: &dyn ResourceStore,
    autoscaler: &Autoscaler,
) -> Result<DynamicObject, ReconcileErr> {
    let Some(wref) = autoscaler.spec.workload_ref.as_ref() else {
        return Err(ReconcileErr::WorkloadNotFound(
            "spec.workloadRef is not set".into(),
        ));
    };
    let ns = autoscaler.namespace().unwrap_or_else(|| "default".into());
    let type_ref = TypeRef::new(&wref.api_version, &wref.kind);
    match store.get(&type_ref, &ns, &wref.name).await {
        Ok(Some(workload)) => {
            debug!(workload = %wref.name, kind = %wref.kind, "workload fetched");
            Ok(workload)
        }
        Ok(None) => Err(ReconcileErr::WorkloadNotFound(format!(
            "{} {} not found in namespace {}",
            type_ref, wref.name, ns
        ))),
        Err(e) => Err(ReconcileErr::WorkloadNotFound(format!(
            "{} {}: {}",
            type_ref, wref.name, e
        ))),
    }
}

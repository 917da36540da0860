use kube::ResourceExt;
use kube::core::DynamicObject;
use tracing::{debug, instrument};

use super::store::ResourceStore;

fn owned_by(obj: &DynamicObject, owner_uid: &str) -> bool {
    obj.owner_references().iter().any(|r| r.uid == owner_uid)
}

fn same_object(a: &DynamicObject, b: &DynamicObject) -> bool {
    match (a.uid(), b.uid()) {
        (Some(x), Some(y)) => x == y,
        _ => a.types == b.types && a.name_any() == b.name_any(),
    }
}

/// Lists the resources the workload produced, in a deterministic order:
/// child kinds in definition order, resources of one kind by name, and the
/// workload itself last.
#[instrument(skip_all, fields(workload = %workload.name_any()))]
pub async fn discover_children(
    store: &dyn ResourceStore,
    workload: &DynamicObject,
) -> Result<Vec<DynamicObject>, kube::Error> {
    let ns = workload.namespace().unwrap_or_else(|| "default".into());
    let kinds = store.child_resource_kinds(workload).await?;
    let mut resources: Vec<DynamicObject> = Vec::new();

    if let Some(uid) = workload.uid() {
        for kind in kinds {
            let selector = kind.label_selector();
            let mut items = store
                .list(&kind.type_ref(), &ns, selector.as_deref())
                .await?;
            items.retain(|o| owned_by(o, &uid));
            items.sort_by_key(|o| o.name_any());
            debug!(kind = %kind.kind, count = items.len(), "child resources listed");
            for item in items {
                if !resources.iter().any(|r| same_object(r, &item)) {
                    resources.push(item);
                }
            }
        }
    } else {
        debug!("workload has no uid; nothing can be owned by it");
    }

    resources.push(workload.clone());
    Ok(resources)
}

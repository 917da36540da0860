use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::core::{DynamicObject, GroupVersionKind, TypeMeta};
use kube::discovery::{ApiResource, Scope, pinned_kind};
use kube::{Client, ResourceExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, trace};

use crate::crd::autoscaler::{Autoscaler, AutoscalerStatus, TargetWorkload};
use crate::crd::scaled_object::ScaledObject;

/// apiVersion + kind of a resource, without a name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef {
    pub api_version: String,
    pub kind: String,
}

impl TypeRef {
    pub fn new(api_version: &str, kind: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Type of an object returned by the store. Objects without type
    /// metadata cannot be addressed and yield `None`.
    pub fn of(obj: &DynamicObject) -> Option<Self> {
        obj.types
            .as_ref()
            .map(|t| Self::new(&t.api_version, &t.kind))
    }

    pub fn gvk(&self) -> GroupVersionKind {
        let (group, version) = split_api_version(&self.api_version);
        GroupVersionKind::gvk(&group, &version, &self.kind)
    }

    pub fn type_meta(&self) -> TypeMeta {
        TypeMeta {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
        }
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.api_version, self.kind)
    }
}

/// Core group resources carry a bare version ("v1").
pub fn split_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Kind of resource a workload type generates, as declared on its
/// WorkloadDefinition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildResourceKind {
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<BTreeMap<String, String>>,
}

impl ChildResourceKind {
    pub fn type_ref(&self) -> TypeRef {
        TypeRef::new(&self.api_version, &self.kind)
    }

    pub fn label_selector(&self) -> Option<String> {
        self.selector.as_ref().filter(|s| !s.is_empty()).map(|s| {
            s.iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(",")
        })
    }
}

/// Reads and writes the reconciler needs from the resource store. Writes
/// carry the object's resourceVersion where the store supports it, so a
/// concurrent change fails the write instead of being merged.
#[async_trait]
pub trait ResourceStore: Send + Sync + 'static {
    async fn get(
        &self,
        type_ref: &TypeRef,
        ns: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, kube::Error>;

    async fn list(
        &self,
        type_ref: &TypeRef,
        ns: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>, kube::Error>;

    /// Child kinds declared for the workload's type; empty when the type has
    /// no definition.
    async fn child_resource_kinds(
        &self,
        workload: &DynamicObject,
    ) -> Result<Vec<ChildResourceKind>, kube::Error>;

    async fn patch_owner_references(
        &self,
        obj: &DynamicObject,
        refs: &[OwnerReference],
        field_manager: &str,
    ) -> Result<(), kube::Error>;

    /// `None` removes the stored binding.
    async fn patch_target_workload(
        &self,
        autoscaler: &Autoscaler,
        target: Option<&TargetWorkload>,
    ) -> Result<(), kube::Error>;

    async fn patch_status(
        &self,
        autoscaler: &Autoscaler,
        status: &AutoscalerStatus,
    ) -> Result<(), kube::Error>;

    async fn get_scaled_object(
        &self,
        ns: &str,
        name: &str,
    ) -> Result<Option<ScaledObject>, kube::Error>;

    async fn apply_scaled_object(
        &self,
        scaled_object: &ScaledObject,
        field_manager: &str,
    ) -> Result<(), kube::Error>;

    /// Removing an object that is already gone is not an error.
    async fn delete_scaled_object(
        &self,
        ns: &str,
        name: &str,
    ) -> Result<(), kube::Error>;
}

pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

fn workload_definition_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("core.oam.dev", "v1alpha2", "WorkloadDefinition"),
        "workloaddefinitions",
    )
}

/// Definition objects are named after the CRD of the type they describe.
fn definition_name(ar: &ApiResource) -> String {
    if ar.group.is_empty() {
        ar.plural.clone()
    } else {
        format!("{}.{}", ar.plural, ar.group)
    }
}

/// Fields the status may drop between reconciles. A merge patch leaves
/// omitted keys untouched, so cleared ones are sent as explicit nulls.
const CLEARABLE_STATUS_FIELDS: [&str; 2] = ["warnings", "scaledObject"];

fn status_merge_patch(
    status: &AutoscalerStatus,
) -> Result<serde_json::Value, kube::Error> {
    let mut value =
        serde_json::to_value(status).map_err(kube::Error::SerdeError)?;
    if let Some(fields) = value.as_object_mut() {
        for key in CLEARABLE_STATUS_FIELDS {
            fields.entry(key).or_insert(serde_json::Value::Null);
        }
    }
    Ok(value)
}

pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn dynamic_api(
        &self,
        type_ref: &TypeRef,
        ns: &str,
    ) -> Result<(Api<DynamicObject>, ApiResource), kube::Error> {
        let (ar, caps) = pinned_kind(&self.client, &type_ref.gvk()).await?;
        let api = match caps.scope {
            Scope::Namespaced => {
                Api::namespaced_with(self.client.clone(), ns, &ar)
            }
            Scope::Cluster => Api::all_with(self.client.clone(), &ar),
        };
        Ok((api, ar))
    }

    fn autoscaler_api(&self, autoscaler: &Autoscaler) -> Api<Autoscaler> {
        let ns = autoscaler.namespace().unwrap_or_else(|| "default".into());
        Api::namespaced(self.client.clone(), &ns)
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get(
        &self,
        type_ref: &TypeRef,
        ns: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, kube::Error> {
        let (api, _) = self.dynamic_api(type_ref, ns).await?;
        let obj = api.get_opt(name).await?;
        Ok(obj.map(|mut o| {
            o.types.get_or_insert_with(|| type_ref.type_meta());
            o
        }))
    }

    async fn list(
        &self,
        type_ref: &TypeRef,
        ns: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>, kube::Error> {
        let (api, _) = self.dynamic_api(type_ref, ns).await?;
        let mut lp = kube::api::ListParams::default();
        if let Some(selector) = label_selector {
            lp = lp.labels(selector);
        }
        let list = api.list(&lp).await?;
        // list items come back without apiVersion/kind
        Ok(list
            .items
            .into_iter()
            .map(|mut o| {
                o.types = Some(type_ref.type_meta());
                o
            })
            .collect())
    }

    async fn child_resource_kinds(
        &self,
        workload: &DynamicObject,
    ) -> Result<Vec<ChildResourceKind>, kube::Error> {
        let Some(type_ref) = TypeRef::of(workload) else {
            return Ok(vec![]);
        };
        let (ar, _) = pinned_kind(&self.client, &type_ref.gvk()).await?;
        let def_name = definition_name(&ar);
        let defs: Api<DynamicObject> =
            Api::all_with(self.client.clone(), &workload_definition_resource());
        let Some(def) = defs.get_opt(&def_name).await? else {
            debug!(definition = %def_name, "no workload definition; no child kinds");
            return Ok(vec![]);
        };
        let kinds = def
            .data
            .get("spec")
            .and_then(|s| s.get("childResourceKinds"))
            .cloned()
            .map(serde_json::from_value::<Vec<ChildResourceKind>>)
            .transpose()
            .map_err(kube::Error::SerdeError)?
            .unwrap_or_default();
        trace!(definition = %def_name, count = kinds.len(), "child kinds loaded");
        Ok(kinds)
    }

    async fn patch_owner_references(
        &self,
        obj: &DynamicObject,
        refs: &[OwnerReference],
        field_manager: &str,
    ) -> Result<(), kube::Error> {
        let Some(type_ref) = TypeRef::of(obj) else {
            return Err(kube::Error::Discovery(
                kube::error::DiscoveryError::MissingKind(obj.name_any()),
            ));
        };
        let ns = obj.namespace().unwrap_or_else(|| "default".into());
        let (api, _) = self.dynamic_api(&type_ref, &ns).await?;
        let patch = json!({
            "metadata": {
                "ownerReferences": refs,
                "resourceVersion": obj.resource_version(),
            }
        });
        let pp = PatchParams {
            field_manager: Some(field_manager.to_string()),
            ..Default::default()
        };
        api.patch(&obj.name_any(), &pp, &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn patch_target_workload(
        &self,
        autoscaler: &Autoscaler,
        target: Option<&TargetWorkload>,
    ) -> Result<(), kube::Error> {
        let patch = json!({
            "metadata": { "resourceVersion": autoscaler.resource_version() },
            "spec": { "targetWorkload": target },
        });
        self.autoscaler_api(autoscaler)
            .patch(
                &autoscaler.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }

    async fn patch_status(
        &self,
        autoscaler: &Autoscaler,
        status: &AutoscalerStatus,
    ) -> Result<(), kube::Error> {
        let patch = json!({ "status": status_merge_patch(status)? });
        self.autoscaler_api(autoscaler)
            .patch_status(
                &autoscaler.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?;
        Ok(())
    }

    async fn get_scaled_object(
        &self,
        ns: &str,
        name: &str,
    ) -> Result<Option<ScaledObject>, kube::Error> {
        let api: Api<ScaledObject> = Api::namespaced(self.client.clone(), ns);
        api.get_opt(name).await
    }

    async fn apply_scaled_object(
        &self,
        scaled_object: &ScaledObject,
        field_manager: &str,
    ) -> Result<(), kube::Error> {
        let ns = scaled_object
            .namespace()
            .unwrap_or_else(|| "default".into());
        let api: Api<ScaledObject> = Api::namespaced(self.client.clone(), &ns);
        let pp = PatchParams::apply(field_manager).force();
        api.patch(&scaled_object.name_any(), &pp, &Patch::Apply(scaled_object))
            .await?;
        Ok(())
    }

    async fn delete_scaled_object(
        &self,
        ns: &str,
        name: &str,
    ) -> Result<(), kube::Error> {
        let api: Api<ScaledObject> = Api::namespaced(self.client.clone(), ns);
        match api.delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

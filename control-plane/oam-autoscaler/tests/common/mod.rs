#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::core::{DynamicObject, ErrorResponse, GroupVersionKind};
use kube::discovery::ApiResource;
use kube::{Resource, ResourceExt};
use oam_autoscaler::controller::events::{EventSink, ReconcileEvent};
use oam_autoscaler::controller::store::{
    ChildResourceKind, ResourceStore, TypeRef, split_api_version,
};
use oam_autoscaler::crd::autoscaler::{
    Autoscaler, AutoscalerSpec, AutoscalerStatus, TargetWorkload, Trigger,
    WorkloadReference,
};
use oam_autoscaler::crd::scaled_object::ScaledObject;

// DNS-1123 safe numeric suffix for unique names
pub const DIGITS: [char; 10] =
    ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];
pub fn uniq(prefix: &str) -> String {
    format!("{prefix}-{}", nanoid::nanoid!(6, &DIGITS))
}

pub fn api_error(code: u16, reason: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".into(),
        message: format!("injected {reason}"),
        reason: reason.into(),
        code,
    })
}

type ObjKey = (TypeRef, String, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjKey, DynamicObject>,
    child_kinds: HashMap<TypeRef, Vec<ChildResourceKind>>,
    autoscalers: BTreeMap<(String, String), Autoscaler>,
    scaled_objects: BTreeMap<(String, String), ScaledObject>,
    owner_patches: Vec<String>,
    target_patches: usize,
    status_patches: usize,
    applies: usize,
    deletes: usize,
    fail_owner_patch: HashSet<String>,
    fail_list: bool,
    fail_apply: bool,
    next_rv: u64,
}

impl State {
    fn bump(&mut self) -> String {
        self.next_rv += 1;
        self.next_rv.to_string()
    }
}

/// In-memory resource store with resourceVersion checks on owner and target
/// writes. Failures can be injected per object name.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<State>,
}

fn key_of(obj: &DynamicObject) -> ObjKey {
    (
        TypeRef::of(obj).expect("object has types"),
        obj.namespace().unwrap_or_else(|| "default".into()),
        obj.name_any(),
    )
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, mut obj: DynamicObject) -> DynamicObject {
        let mut st = self.state.lock().unwrap();
        obj.metadata.resource_version = Some(st.bump());
        st.objects.insert(key_of(&obj), obj.clone());
        obj
    }

    pub fn insert_autoscaler(&self, mut a: Autoscaler) -> Autoscaler {
        let mut st = self.state.lock().unwrap();
        a.metadata.resource_version = Some(st.bump());
        let key = (a.namespace().unwrap_or_default(), a.name_any());
        st.autoscalers.insert(key, a.clone());
        a
    }

    pub fn remove_autoscaler(&self, ns: &str, name: &str) {
        let mut st = self.state.lock().unwrap();
        st.autoscalers.remove(&(ns.to_string(), name.to_string()));
    }

    /// Applies a user edit to the stored trait, bumping generation and
    /// resourceVersion the way the API server would.
    pub fn edit_autoscaler(
        &self,
        ns: &str,
        name: &str,
        edit: impl FnOnce(&mut Autoscaler),
    ) -> Autoscaler {
        let mut st = self.state.lock().unwrap();
        let rv = st.bump();
        let a = st
            .autoscalers
            .get_mut(&(ns.to_string(), name.to_string()))
            .expect("autoscaler present");
        edit(a);
        a.metadata.generation = Some(a.metadata.generation.unwrap_or(0) + 1);
        a.metadata.resource_version = Some(rv);
        a.clone()
    }

    pub fn remove(&self, api_version: &str, kind: &str, ns: &str, name: &str) {
        let mut st = self.state.lock().unwrap();
        st.objects.remove(&(
            TypeRef::new(api_version, kind),
            ns.to_string(),
            name.to_string(),
        ));
    }

    pub fn insert_scaled_object(&self, so: ScaledObject) {
        let mut st = self.state.lock().unwrap();
        let key = (so.namespace().unwrap_or_default(), so.name_any());
        st.scaled_objects.insert(key, so);
    }

    pub fn set_child_kinds(
        &self,
        workload: &TypeRef,
        kinds: Vec<ChildResourceKind>,
    ) {
        let mut st = self.state.lock().unwrap();
        st.child_kinds.insert(workload.clone(), kinds);
    }

    pub fn fail_owner_patch_for(&self, name: &str) {
        let mut st = self.state.lock().unwrap();
        st.fail_owner_patch.insert(name.to_string());
    }

    pub fn fail_list(&self) {
        self.state.lock().unwrap().fail_list = true;
    }

    pub fn fail_apply(&self) {
        self.state.lock().unwrap().fail_apply = true;
    }

    pub fn clear_failures(&self) {
        let mut st = self.state.lock().unwrap();
        st.fail_owner_patch.clear();
        st.fail_list = false;
        st.fail_apply = false;
    }

    pub fn object(
        &self,
        api_version: &str,
        kind: &str,
        ns: &str,
        name: &str,
    ) -> DynamicObject {
        let st = self.state.lock().unwrap();
        st.objects
            .get(&(
                TypeRef::new(api_version, kind),
                ns.to_string(),
                name.to_string(),
            ))
            .cloned()
            .expect("object present")
    }

    pub fn autoscaler(&self, ns: &str, name: &str) -> Autoscaler {
        let st = self.state.lock().unwrap();
        st.autoscalers
            .get(&(ns.to_string(), name.to_string()))
            .cloned()
            .expect("autoscaler present")
    }

    pub fn scaled_object(&self, ns: &str, name: &str) -> Option<ScaledObject> {
        let st = self.state.lock().unwrap();
        st.scaled_objects
            .get(&(ns.to_string(), name.to_string()))
            .cloned()
    }

    pub fn scaled_object_count(&self) -> usize {
        self.state.lock().unwrap().scaled_objects.len()
    }

    pub fn owner_patches(&self) -> Vec<String> {
        self.state.lock().unwrap().owner_patches.clone()
    }

    pub fn target_patches(&self) -> usize {
        self.state.lock().unwrap().target_patches
    }

    pub fn status_patches(&self) -> usize {
        self.state.lock().unwrap().status_patches
    }

    pub fn applies(&self) -> usize {
        self.state.lock().unwrap().applies
    }

    pub fn deletes(&self) -> usize {
        self.state.lock().unwrap().deletes
    }

    pub fn reset_counters(&self) {
        let mut st = self.state.lock().unwrap();
        st.owner_patches.clear();
        st.target_patches = 0;
        st.status_patches = 0;
        st.applies = 0;
        st.deletes = 0;
    }
}

fn matches_selector(obj: &DynamicObject, selector: Option<&str>) -> bool {
    let Some(selector) = selector else {
        return true;
    };
    selector
        .split(',')
        .filter_map(|kv| kv.split_once('='))
        .all(|(k, v)| obj.labels().get(k).map(String::as_str) == Some(v))
}

#[async_trait]
impl ResourceStore for FakeStore {
    async fn get(
        &self,
        type_ref: &TypeRef,
        ns: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, kube::Error> {
        let st = self.state.lock().unwrap();
        Ok(st
            .objects
            .get(&(type_ref.clone(), ns.to_string(), name.to_string()))
            .cloned())
    }

    async fn list(
        &self,
        type_ref: &TypeRef,
        ns: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>, kube::Error> {
        let st = self.state.lock().unwrap();
        if st.fail_list {
            return Err(api_error(500, "InternalError"));
        }
        Ok(st
            .objects
            .iter()
            .filter(|((t, n, _), o)| {
                t == type_ref && n == ns && matches_selector(o, label_selector)
            })
            .map(|(_, o)| o.clone())
            .collect())
    }

    async fn child_resource_kinds(
        &self,
        workload: &DynamicObject,
    ) -> Result<Vec<ChildResourceKind>, kube::Error> {
        let st = self.state.lock().unwrap();
        Ok(TypeRef::of(workload)
            .and_then(|t| st.child_kinds.get(&t).cloned())
            .unwrap_or_default())
    }

    async fn patch_owner_references(
        &self,
        obj: &DynamicObject,
        refs: &[OwnerReference],
        _field_manager: &str,
    ) -> Result<(), kube::Error> {
        let mut st = self.state.lock().unwrap();
        if st.fail_owner_patch.contains(&obj.name_any()) {
            return Err(api_error(409, "Conflict"));
        }
        let key = key_of(obj);
        let rv = st.bump();
        let Some(stored) = st.objects.get_mut(&key) else {
            return Err(api_error(404, "NotFound"));
        };
        if stored.resource_version() != obj.resource_version() {
            return Err(api_error(409, "Conflict"));
        }
        stored.metadata.owner_references = Some(refs.to_vec());
        stored.metadata.resource_version = Some(rv);
        st.owner_patches.push(obj.name_any());
        Ok(())
    }

    async fn patch_target_workload(
        &self,
        autoscaler: &Autoscaler,
        target: Option<&TargetWorkload>,
    ) -> Result<(), kube::Error> {
        let mut st = self.state.lock().unwrap();
        let key = (
            autoscaler.namespace().unwrap_or_default(),
            autoscaler.name_any(),
        );
        let rv = st.bump();
        let Some(stored) = st.autoscalers.get_mut(&key) else {
            return Err(api_error(404, "NotFound"));
        };
        if stored.resource_version() != autoscaler.resource_version() {
            return Err(api_error(409, "Conflict"));
        }
        stored.spec.target_workload = target.cloned();
        stored.metadata.resource_version = Some(rv);
        st.target_patches += 1;
        Ok(())
    }

    async fn patch_status(
        &self,
        autoscaler: &Autoscaler,
        status: &AutoscalerStatus,
    ) -> Result<(), kube::Error> {
        let mut st = self.state.lock().unwrap();
        let key = (
            autoscaler.namespace().unwrap_or_default(),
            autoscaler.name_any(),
        );
        let Some(stored) = st.autoscalers.get_mut(&key) else {
            return Err(api_error(404, "NotFound"));
        };
        stored.status = Some(status.clone());
        st.status_patches += 1;
        Ok(())
    }

    async fn get_scaled_object(
        &self,
        ns: &str,
        name: &str,
    ) -> Result<Option<ScaledObject>, kube::Error> {
        let st = self.state.lock().unwrap();
        Ok(st
            .scaled_objects
            .get(&(ns.to_string(), name.to_string()))
            .cloned())
    }

    async fn apply_scaled_object(
        &self,
        scaled_object: &ScaledObject,
        _field_manager: &str,
    ) -> Result<(), kube::Error> {
        let mut st = self.state.lock().unwrap();
        if st.fail_apply {
            return Err(api_error(503, "ServiceUnavailable"));
        }
        let key = (
            scaled_object.namespace().unwrap_or_default(),
            scaled_object.name_any(),
        );
        st.scaled_objects.insert(key, scaled_object.clone());
        st.applies += 1;
        Ok(())
    }

    async fn delete_scaled_object(
        &self,
        ns: &str,
        name: &str,
    ) -> Result<(), kube::Error> {
        let mut st = self.state.lock().unwrap();
        if st
            .scaled_objects
            .remove(&(ns.to_string(), name.to_string()))
            .is_some()
        {
            st.deletes += 1;
        }
        Ok(())
    }
}

/// Captures every published event with its target.
#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<(ObjectReference, ReconcileEvent)>>,
}

impl RecordingEvents {
    pub fn all(&self) -> Vec<(ObjectReference, ReconcileEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn reasons(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|(_, e)| e.reason).collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[async_trait]
impl EventSink for RecordingEvents {
    async fn publish(&self, target: &ObjectReference, event: ReconcileEvent) {
        self.events.lock().unwrap().push((target.clone(), event));
    }
}

pub fn object(
    api_version: &str,
    kind: &str,
    ns: &str,
    name: &str,
) -> DynamicObject {
    let (group, version) = split_api_version(api_version);
    let ar =
        ApiResource::from_gvk(&GroupVersionKind::gvk(&group, &version, kind));
    let mut obj = DynamicObject::new(name, &ar).within(ns);
    obj.metadata.uid = Some(format!("{}-{}-uid", kind.to_lowercase(), name));
    obj
}

pub fn owner_ref_to(owner: &DynamicObject, controller: bool) -> OwnerReference {
    let types = owner.types.clone().unwrap_or_default();
    OwnerReference {
        api_version: types.api_version,
        kind: types.kind,
        name: owner.name_any(),
        uid: owner.uid().unwrap_or_default(),
        controller: Some(controller),
        block_owner_deletion: None,
    }
}

pub fn owned_by(
    mut obj: DynamicObject,
    owner: &DynamicObject,
    controller: bool,
) -> DynamicObject {
    obj.metadata
        .owner_references
        .get_or_insert_with(Vec::new)
        .push(owner_ref_to(owner, controller));
    obj
}

pub fn autoscaler(
    ns: &str,
    name: &str,
    workload: &DynamicObject,
    triggers: Vec<Trigger>,
) -> Autoscaler {
    let types = workload.types.clone().unwrap_or_default();
    let mut a = Autoscaler::new(
        name,
        AutoscalerSpec {
            workload_ref: Some(WorkloadReference {
                api_version: types.api_version,
                kind: types.kind,
                name: workload.name_any(),
                uid: workload.uid(),
            }),
            min_replicas: Some(1),
            max_replicas: Some(10),
            triggers,
            ..Default::default()
        },
    );
    a.metadata.namespace = Some(ns.to_string());
    a.metadata.uid = Some(format!("{name}-trait-uid"));
    a.metadata.generation = Some(1);
    a
}

/// Autoscaler owned by `owner`, e.g. an ApplicationConfiguration.
pub fn with_owner(mut a: Autoscaler, owner: &DynamicObject) -> Autoscaler {
    a.meta_mut()
        .owner_references
        .get_or_insert_with(Vec::new)
        .push(owner_ref_to(owner, true));
    a
}

pub fn controllers(obj: &DynamicObject) -> Vec<OwnerReference> {
    obj.owner_references()
        .iter()
        .filter(|r| r.controller == Some(true))
        .cloned()
        .collect()
}

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Autoscaling backends the controller can delegate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Keda,
}

/// Fixed type identity of a backend's scaling object.
#[derive(Debug, PartialEq, Eq)]
pub struct BackendIdentity {
    pub group: &'static str,
    pub version: &'static str,
    pub api_version: &'static str,
    pub kind: &'static str,
    pub plural: &'static str,
}

/// Indexed by `Backend` discriminant.
static BACKENDS: [BackendIdentity; 1] = [BackendIdentity {
    group: "keda.k8s.io",
    version: "v1alpha1",
    api_version: "keda.k8s.io/v1alpha1",
    kind: "ScaledObject",
    plural: "scaledobjects",
}];

impl Backend {
    pub fn identity(self) -> &'static BackendIdentity {
        &BACKENDS[self as usize]
    }
}

#[derive(
    CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema,
    PartialEq,
)]
#[kube(
    group = "keda.k8s.io",
    version = "v1alpha1",
    kind = "ScaledObject",
    plural = "scaledobjects",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ScaledObjectSpec {
    pub scale_target_ref: ScaleTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replica_count: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replica_count: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_interval: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_period: Option<i32>,
    #[serde(default)]
    pub triggers: Vec<ScaleTriggers>,
}

#[derive(
    Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct ScaleTarget {
    pub api_version: String,
    pub kind: String,
    pub name: String,
}

/// One scaler entry of the backend object.
#[derive(
    Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq,
)]
pub struct ScaleTriggers {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

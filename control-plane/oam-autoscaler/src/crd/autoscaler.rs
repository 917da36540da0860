use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(
    CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema,
)]
#[kube(
    group = "standard.oam.dev",
    version = "v1alpha1",
    kind = "Autoscaler",
    plural = "autoscalers",
    namespaced,
    status = "AutoscalerStatus",
    printcolumn = r#"{"name":"Target", "type":"string", "jsonPath":".spec.targetWorkload.name"}"#,
    printcolumn = r#"{"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalerSpec {
    /// Workload this trait is attached to; written by the OAM runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_ref: Option<WorkloadReference>,
    /// Resource actually scaled. Resolved and persisted by the controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_workload: Option<TargetWorkload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<i32>,
    /// Seconds between two trigger evaluations on the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_interval: Option<i32>,
    /// Seconds to wait after the last active trigger before scaling down.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_period: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<Trigger>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

/// Stable pointer to the scaled resource. Not a live lookup.
#[derive(
    Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct TargetWorkload {
    pub api_version: String,
    pub kind: String,
    pub name: String,
}

impl TargetWorkload {
    pub fn is_set(&self) -> bool {
        !self.kind.is_empty() && !self.name.is_empty()
    }
}

impl std::fmt::Display for TargetWorkload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} {}", self.api_version, self.kind, self.name)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerType {
    Cpu,
    Memory,
    Storage,
    EphemeralStorage,
    Cron,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Cpu => "cpu",
            TriggerType::Memory => "memory",
            TriggerType::Storage => "storage",
            TriggerType::EphemeralStorage => "ephemeral-storage",
            TriggerType::Cron => "cron",
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
pub enum MetricTargetType {
    Utilization,
    AverageValue,
}

impl MetricTargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricTargetType::Utilization => "Utilization",
            MetricTargetType::AverageValue => "AverageValue",
        }
    }
}

/// One scaling condition as written by the user. Which fields matter depends
/// on `type`; the rest are ignored.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_: TriggerType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_target_type: Option<MetricTargetType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<IntOrString>,
    /// Cron window start, `HH:MM`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at: Option<String>,
    /// Cron window length in hours.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<IntOrString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl Trigger {
    fn empty(type_: TriggerType) -> Self {
        Self {
            name: None,
            type_,
            metric_target_type: None,
            threshold: None,
            start_at: None,
            duration: None,
            replicas: None,
            timezone: None,
        }
    }

    pub fn resource(
        type_: TriggerType,
        target: MetricTargetType,
        threshold: i32,
    ) -> Self {
        Self {
            metric_target_type: Some(target),
            threshold: Some(IntOrString::Int(threshold)),
            ..Self::empty(type_)
        }
    }

    pub fn cron(start_at: &str, duration: &str, replicas: i32) -> Self {
        Self {
            start_at: Some(start_at.to_string()),
            duration: Some(IntOrString::String(duration.to_string())),
            replicas: Some(replicas),
            ..Self::empty(TriggerType::Cron)
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalerStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,
    /// Non-fatal spec problems found during the last reconcile.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Backend object currently carrying this trait's scaling rules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scaled_object: Option<ResourceRef>,
}

impl AutoscalerStatus {
    pub fn condition(&self, type_: ConditionType) -> Option<&Condition> {
        self.conditions
            .as_ref()
            .and_then(|c| c.iter().find(|c| c.type_ == type_))
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(
        rename = "lastTransitionTime",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_transition_time: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionType {
    /// Whether the last reconcile went through without error.
    Synced,
    /// Whether the backend object reflects the trait.
    Ready,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
pub struct ResourceRef {
    pub kind: String,
    pub name: String,
}

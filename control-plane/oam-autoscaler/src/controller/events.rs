use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder};
use tracing::warn;

pub const REASON_CANNOT_LOCATE_CONTEXT: &str = "CannotLocateContext";
pub const REASON_CANNOT_LOCATE_WORKLOAD: &str = "CannotLocateWorkload";
pub const REASON_CANNOT_FETCH_CHILDREN: &str = "CannotFetchChildResources";
pub const REASON_CANNOT_ADOPT: &str = "CannotAdoptResource";
pub const REASON_CANNOT_PERSIST_TARGET: &str = "CannotPersistTarget";
pub const REASON_CANNOT_SYNC_SCALER: &str = "CannotSyncScaledObject";
pub const REASON_CANNOT_UPDATE_STATUS: &str = "CannotUpdateStatus";
pub const REASON_SPEC_WARNING: &str = "SpecWarning";
pub const REASON_DELEGATED: &str = "Delegated";

/// Operator-visible event produced by a reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileEvent {
    pub warning: bool,
    pub reason: &'static str,
    pub action: &'static str,
    pub note: String,
}

impl ReconcileEvent {
    pub fn warning(reason: &'static str, note: impl Into<String>) -> Self {
        Self {
            warning: true,
            reason,
            action: "Reconcile",
            note: note.into(),
        }
    }

    pub fn normal(reason: &'static str, note: impl Into<String>) -> Self {
        Self {
            warning: false,
            reason,
            action: "Reconcile",
            note: note.into(),
        }
    }
}

/// Event publication is best effort: a failed publish never fails a
/// reconcile.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    async fn publish(&self, target: &ObjectReference, event: ReconcileEvent);
}

pub struct KubeEvents {
    recorder: Recorder,
}

impl KubeEvents {
    pub fn new(recorder: Recorder) -> Self {
        Self { recorder }
    }
}

#[async_trait]
impl EventSink for KubeEvents {
    async fn publish(&self, target: &ObjectReference, event: ReconcileEvent) {
        let ev = Event {
            type_: if event.warning {
                EventType::Warning
            } else {
                EventType::Normal
            },
            reason: event.reason.into(),
            note: Some(event.note),
            action: event.action.into(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&ev, target).await {
            warn!(
                error = %e,
                reason = event.reason,
                target = ?target.name,
                "failed to publish event"
            );
        }
    }
}

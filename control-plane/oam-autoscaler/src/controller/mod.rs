use std::sync::Arc;

use futures_util::StreamExt;
use kube::{
    Client,
    api::Api,
    runtime::{
        Controller,
        controller::{self, Action},
        events::{Recorder, Reporter},
        watcher,
    },
};
use tracing::{info, warn};

use crate::config::AutoscalerConfig;
use crate::crd::autoscaler::Autoscaler;

pub mod discovery;
pub mod events;
pub mod keda;
pub mod locator;
pub mod ownership;
pub mod reconcile;
pub mod status;
pub mod status_reducer;
pub mod store;
pub mod target;
pub mod triggers;


pub use events::{EventSink, KubeEvents, ReconcileEvent};
pub use reconcile::{Pipeline, ReconcileOutcome, reconcile};
pub use store::{KubeStore, ResourceStore};

const CONTROLLER_NAME: &str = "oam-autoscaler";

/// Steps of one reconcile, in execution order. A failure at any step
/// re-enters at `Start` on the next scheduled run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Start,
    Located,
    WorkloadFetched,
    ChildrenDiscovered,
    OwnershipAdopted,
    TargetResolved,
    TriggersValidated,
    Delegated,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Start => "start",
            Stage::Located => "located",
            Stage::WorkloadFetched => "workload-fetched",
            Stage::ChildrenDiscovered => "children-discovered",
            Stage::OwnershipAdopted => "ownership-adopted",
            Stage::TargetResolved => "target-resolved",
            Stage::TriggersValidated => "triggers-validated",
            Stage::Delegated => "delegated",
            Stage::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error("cannot locate parent context: {0}")]
    ContextLookup(#[source] kube::Error),

    #[error("cannot locate workload: {0}")]
    WorkloadNotFound(String),

    #[error("cannot fetch workload child resources: {0}")]
    ChildResources(#[source] kube::Error),

    #[error("failed to set ownerReference on {resource}: {source}")]
    Ownership {
        resource: String,
        #[source]
        source: kube::Error,
    },

    #[error("cannot persist target workload: {0}")]
    TargetPersist(#[source] kube::Error),

    #[error("cannot sync ScaledObject {name}: {source}")]
    Delegation {
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("cannot update status: {0}")]
    Status(#[source] kube::Error),
}

impl ReconcileErr {
    /// Stage that was being entered when the error happened.
    pub fn stage(&self) -> Stage {
        match self {
            ReconcileErr::ContextLookup(_) => Stage::Located,
            ReconcileErr::WorkloadNotFound(_) => Stage::WorkloadFetched,
            ReconcileErr::ChildResources(_) => Stage::ChildrenDiscovered,
            ReconcileErr::Ownership { .. } => Stage::OwnershipAdopted,
            ReconcileErr::TargetPersist(_) => Stage::TargetResolved,
            ReconcileErr::Delegation { .. } => Stage::Delegated,
            ReconcileErr::Status(_) => Stage::Done,
        }
    }

    /// Event reason published with this error.
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcileErr::ContextLookup(_) => events::REASON_CANNOT_LOCATE_CONTEXT,
            ReconcileErr::WorkloadNotFound(_) => {
                events::REASON_CANNOT_LOCATE_WORKLOAD
            }
            ReconcileErr::ChildResources(_) => {
                events::REASON_CANNOT_FETCH_CHILDREN
            }
            ReconcileErr::Ownership { .. } => events::REASON_CANNOT_ADOPT,
            ReconcileErr::TargetPersist(_) => events::REASON_CANNOT_PERSIST_TARGET,
            ReconcileErr::Delegation { .. } => events::REASON_CANNOT_SYNC_SCALER,
            ReconcileErr::Status(_) => events::REASON_CANNOT_UPDATE_STATUS,
        }
    }

    /// The trait itself vanished while we were writing to it.
    pub fn is_trait_gone(&self) -> bool {
        match self {
            ReconcileErr::TargetPersist(e) | ReconcileErr::Status(e) => {
                store::is_not_found(e)
            }
            _ => false,
        }
    }
}

pub struct ControllerContext {
    pub store: Arc<dyn ResourceStore>,
    pub events: Arc<dyn EventSink>,
    pub cfg: AutoscalerConfig,
}

impl ControllerContext {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        events: Arc<dyn EventSink>,
        cfg: AutoscalerConfig,
    ) -> Self {
        Self { store, events, cfg }
    }
}

pub async fn run_controller(
    client: Client,
    cfg: AutoscalerConfig,
) -> anyhow::Result<()> {
    let api: Api<Autoscaler> = match cfg.watch_namespace.as_deref() {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };
    let reporter = Reporter {
        controller: CONTROLLER_NAME.into(),
        instance: std::env::var("POD_NAME").ok(),
    };
    let recorder = Recorder::new(client.clone(), reporter);
    let concurrency = cfg.concurrency;
    let ctx = Arc::new(ControllerContext::new(
        Arc::new(KubeStore::new(client.clone())),
        Arc::new(KubeEvents::new(recorder)),
        cfg,
    ));

    info!(concurrency, "starting autoscaler controller");
    Controller::new(api, watcher::Config::default())
        .with_config(controller::Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, action)) => {
                    info!(object = %obj_ref, "reconciled: requeue={:?}", action)
                }
                Err(e) => warn!(error = %e, "reconcile failed"),
            }
        })
        .await;

    info!("autoscaler controller stopped");
    Ok(())
}

pub fn error_policy(
    _obj: Arc<Autoscaler>,
    _error: &ReconcileErr,
    ctx: Arc<ControllerContext>,
) -> Action {
    Action::requeue(ctx.cfg.requeue())
}

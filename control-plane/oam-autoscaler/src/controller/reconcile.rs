use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::config::AutoscalerConfig;
use crate::crd::autoscaler::{Autoscaler, AutoscalerStatus, TargetWorkload};

use super::discovery::discover_children;
use super::events::{
    EventSink, REASON_DELEGATED, REASON_SPEC_WARNING, ReconcileEvent,
};
use super::keda::{Delegation, SkipReason, sync_scaled_object};
use super::locator::{EventTarget, fetch_workload, locate_event_target};
use super::ownership::{AdoptionReport, adopt_resources};
use super::status;
use super::status_reducer::{merge_status, should_patch_status};
use super::store::ResourceStore;
use super::target::{Resolution, persist_target, resolve_target};
use super::triggers::{SpecWarning, validate_triggers};
use super::{ControllerContext, ReconcileErr, Stage};

/// What one successful pass through the pipeline did.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub stage: Stage,
    pub event_target: EventTarget,
    pub adoption: AdoptionReport,
    pub resolution: Resolution,
    /// Binding later stages used, as persisted on the trait.
    pub target: Option<TargetWorkload>,
    pub warnings: Vec<SpecWarning>,
    pub delegation: Delegation,
}

impl ReconcileOutcome {
    pub fn next_action(&self, requeue: Duration) -> Action {
        match self.delegation {
            // children may appear later; nothing we watch will tell us
            Delegation::Skipped(SkipReason::TargetUnset) => {
                Action::requeue(requeue)
            }
            _ => Action::await_change(),
        }
    }
}

/// locate → discover → adopt → resolve → validate → delegate, reading only
/// persisted state. Every failure is reported before it is returned.
pub struct Pipeline<'a> {
    store: &'a dyn ResourceStore,
    events: &'a dyn EventSink,
    cfg: &'a AutoscalerConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        store: &'a dyn ResourceStore,
        events: &'a dyn EventSink,
        cfg: &'a AutoscalerConfig,
    ) -> Self {
        Self { store, events, cfg }
    }

    pub async fn run(
        &self,
        autoscaler: &Autoscaler,
    ) -> Result<ReconcileOutcome, ReconcileErr> {
        let mut event_target = EventTarget::fallback(autoscaler);
        match self.steps(autoscaler, &mut event_target).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.fail(autoscaler, &event_target, e).await),
        }
    }

    async fn steps(
        &self,
        autoscaler: &Autoscaler,
        event_target: &mut EventTarget,
    ) -> Result<ReconcileOutcome, ReconcileErr> {
        *event_target = locate_event_target(
            self.store,
            autoscaler,
            &self.cfg.context_kinds(),
        )
        .await?;
        info!(stage = %Stage::Located, fallback = event_target.is_fallback());

        let workload = fetch_workload(self.store, autoscaler).await?;
        info!(stage = %Stage::WorkloadFetched, workload = %workload.name_any());

        let resources = discover_children(self.store, &workload)
            .await
            .map_err(ReconcileErr::ChildResources)?;
        info!(stage = %Stage::ChildrenDiscovered, count = resources.len());

        let adoption =
            adopt_resources(self.store, autoscaler, &resources).await?;
        info!(
            stage = %Stage::OwnershipAdopted,
            patched = adoption.patched,
            unchanged = adoption.unchanged
        );

        let resolution = resolve_target(
            &resources,
            autoscaler.spec.target_workload.as_ref(),
            &self.cfg.scalable_kinds(),
        );
        let target =
            persist_target(self.store, autoscaler, &resolution).await?;
        info!(stage = %Stage::TargetResolved, resolution = ?resolution);

        let validation =
            validate_triggers(target.as_ref(), &autoscaler.spec.triggers);
        info!(
            stage = %Stage::TriggersValidated,
            valid = validation.valid.len(),
            warnings = validation.warnings.len()
        );

        let delegation = sync_scaled_object(
            self.store,
            autoscaler,
            target.as_ref(),
            &validation.valid,
            self.cfg,
        )
        .await?;
        info!(stage = %Stage::Delegated, delegation = ?delegation);

        self.write_status(
            autoscaler,
            status::completed(
                autoscaler.meta().generation,
                validation.warning_messages(),
                &delegation,
                now(),
            ),
        )
        .await
        .map_err(ReconcileErr::Status)?;

        if !validation.warnings.is_empty() {
            warn!(warnings = ?validation.warning_messages(), "spec warnings");
            self.events
                .publish(
                    event_target.object_ref(),
                    ReconcileEvent::warning(
                        REASON_SPEC_WARNING,
                        validation.warning_messages().join("; "),
                    ),
                )
                .await;
        }
        if let Delegation::Applied(name) = &delegation {
            self.events
                .publish(
                    event_target.object_ref(),
                    ReconcileEvent::normal(
                        REASON_DELEGATED,
                        format!("scaling delegated to ScaledObject {name}"),
                    ),
                )
                .await;
        }
        info!(stage = %Stage::Done);

        Ok(ReconcileOutcome {
            stage: Stage::Done,
            event_target: event_target.clone(),
            adoption,
            resolution,
            target,
            warnings: validation.warnings,
            delegation,
        })
    }

    async fn write_status(
        &self,
        autoscaler: &Autoscaler,
        desired: AutoscalerStatus,
    ) -> Result<(), kube::Error> {
        let current = autoscaler.status.as_ref();
        let merged = merge_status(current, desired);
        if !should_patch_status(current, &merged) {
            debug!("status unchanged");
            return Ok(());
        }
        self.store.patch_status(autoscaler, &merged).await
    }

    /// Records the failure on the trait and the event target, then hands the
    /// error back.
    async fn fail(
        &self,
        autoscaler: &Autoscaler,
        event_target: &EventTarget,
        err: ReconcileErr,
    ) -> ReconcileErr {
        if err.is_trait_gone() {
            return err;
        }
        error!(stage = %err.stage(), error = %err, "reconcile failed");
        let desired = status::failed(
            autoscaler.status.as_ref(),
            autoscaler.meta().generation,
            err.to_string(),
            now(),
        );
        if let Err(e) = self.write_status(autoscaler, desired).await {
            warn!(error = %e, "failed to record error condition");
        }
        self.events
            .publish(
                event_target.object_ref(),
                ReconcileEvent::warning(err.reason(), err.to_string()),
            )
            .await;
        err
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

#[instrument(skip_all, fields(ns = %obj.namespace().unwrap_or_else(|| "default".into()), name = %obj.name_any()))]
pub async fn reconcile(
    obj: Arc<Autoscaler>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    if obj.meta().deletion_timestamp.is_some() {
        info!("trait is being deleted; garbage collection takes over");
        return Ok(Action::await_change());
    }
    let pipeline =
        Pipeline::new(ctx.store.as_ref(), ctx.events.as_ref(), &ctx.cfg);
    match pipeline.run(&obj).await {
        Ok(outcome) => Ok(outcome.next_action(ctx.cfg.requeue())),
        Err(e) if e.is_trait_gone() => {
            info!("trait deleted during reconcile");
            Ok(Action::await_change())
        }
        Err(e) => Err(e),
    }
}

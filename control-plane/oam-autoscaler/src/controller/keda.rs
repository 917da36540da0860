use std::collections::BTreeMap;

use kube::ResourceExt;
use kube::api::ObjectMeta;
use tracing::{debug, info, instrument};

use crate::config::AutoscalerConfig;
use crate::crd::autoscaler::{Autoscaler, TargetWorkload};
use crate::crd::scaled_object::{
    Backend, ScaleTarget, ScaleTriggers, ScaledObject, ScaledObjectSpec,
};

use super::ReconcileErr;
use super::ownership::trait_owner_reference;
use super::store::ResourceStore;
use super::triggers::ValidatedTrigger;

pub const AUTOSCALER_LABEL: &str = "app.oam.dev/autoscaler";

/// Same trait, same backend object.
pub fn scaled_object_name(autoscaler: &Autoscaler) -> String {
    autoscaler.name_any()
}

/// Translates one validated trigger into a backend scaler entry.
pub fn scaler_entry(
    trigger: &ValidatedTrigger,
    default_timezone: &str,
) -> ScaleTriggers {
    match trigger {
        ValidatedTrigger::Resource {
            name,
            metric,
            target,
            value,
        } => ScaleTriggers {
            type_: metric.as_str().to_string(),
            name: name.clone(),
            metadata: BTreeMap::from([
                ("type".to_string(), target.as_str().to_string()),
                ("value".to_string(), value.clone()),
            ]),
        },
        ValidatedTrigger::Cron {
            name,
            window,
            replicas,
            timezone,
        } => ScaleTriggers {
            type_: "cron".to_string(),
            name: name.clone(),
            metadata: BTreeMap::from([
                (
                    "timezone".to_string(),
                    timezone
                        .clone()
                        .unwrap_or_else(|| default_timezone.to_string()),
                ),
                ("start".to_string(), window.start_schedule()),
                ("end".to_string(), window.end_schedule()),
                ("desiredReplicas".to_string(), replicas.to_string()),
            ]),
        },
    }
}

pub fn build_scaled_object(
    autoscaler: &Autoscaler,
    target: &TargetWorkload,
    triggers: &[ValidatedTrigger],
    default_timezone: &str,
) -> ScaledObject {
    let spec = ScaledObjectSpec {
        scale_target_ref: ScaleTarget {
            api_version: target.api_version.clone(),
            kind: target.kind.clone(),
            name: target.name.clone(),
        },
        min_replica_count: autoscaler.spec.min_replicas,
        max_replica_count: autoscaler.spec.max_replicas,
        polling_interval: autoscaler.spec.polling_interval,
        cooldown_period: autoscaler.spec.cooldown_period,
        triggers: triggers
            .iter()
            .map(|t| scaler_entry(t, default_timezone))
            .collect(),
    };
    let mut so = ScaledObject::new(&scaled_object_name(autoscaler), spec);
    so.metadata = ObjectMeta {
        name: Some(scaled_object_name(autoscaler)),
        namespace: autoscaler.namespace(),
        labels: Some(BTreeMap::from([(
            AUTOSCALER_LABEL.to_string(),
            autoscaler.name_any(),
        )])),
        owner_references: Some(vec![trait_owner_reference(autoscaler)]),
        ..Default::default()
    };
    so
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TargetUnset,
    NoValidTriggers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delegation {
    /// Backend object written.
    Applied(String),
    /// Backend object already matched.
    Unchanged(String),
    Skipped(SkipReason),
}

impl Delegation {
    pub fn object_name(&self) -> Option<&str> {
        match self {
            Delegation::Applied(n) | Delegation::Unchanged(n) => Some(n),
            Delegation::Skipped(_) => None,
        }
    }
}

fn up_to_date(existing: &ScaledObject, desired: &ScaledObject) -> bool {
    if existing.spec != desired.spec {
        return false;
    }
    let owners_ok = desired
        .owner_references()
        .iter()
        .all(|d| existing.owner_references().contains(d));
    let labels_ok = desired
        .labels()
        .iter()
        .all(|(k, v)| existing.labels().get(k) == Some(v));
    owners_ok && labels_ok
}

fn owned_by_trait(so: &ScaledObject, autoscaler: &Autoscaler) -> bool {
    let Some(uid) = autoscaler.uid() else {
        return false;
    };
    so.owner_references().iter().any(|r| r.uid == uid)
}

/// Upserts the backend object for the trait. When there is nothing
/// meaningful to delegate, a backend object the trait wrote earlier is
/// removed so it stops scaling with stale triggers or a stale target.
#[instrument(skip_all, fields(name = %autoscaler.name_any()))]
pub async fn sync_scaled_object(
    store: &dyn ResourceStore,
    autoscaler: &Autoscaler,
    target: Option<&TargetWorkload>,
    triggers: &[ValidatedTrigger],
    cfg: &AutoscalerConfig,
) -> Result<Delegation, ReconcileErr> {
    let name = scaled_object_name(autoscaler);
    let ns = autoscaler.namespace().unwrap_or_else(|| "default".into());
    let into_err = |source| ReconcileErr::Delegation {
        name: name.clone(),
        source,
    };

    let existing = store
        .get_scaled_object(&ns, &name)
        .await
        .map_err(into_err)?;

    let target = match target.filter(|t| t.is_set()) {
        Some(t) if !triggers.is_empty() => t,
        unusable => {
            let reason = match unusable {
                None => SkipReason::TargetUnset,
                Some(_) => SkipReason::NoValidTriggers,
            };
            if existing
                .as_ref()
                .is_some_and(|so| owned_by_trait(so, autoscaler))
            {
                store
                    .delete_scaled_object(&ns, &name)
                    .await
                    .map_err(into_err)?;
                info!(
                    scaled_object = %name,
                    reason = ?reason,
                    "stale backend scaling object removed"
                );
            } else {
                debug!(reason = ?reason, "delegation skipped");
            }
            return Ok(Delegation::Skipped(reason));
        }
    };

    let desired =
        build_scaled_object(autoscaler, target, triggers, &cfg.default_timezone);
    if existing.as_ref().is_some_and(|e| up_to_date(e, &desired)) {
        debug!(scaled_object = %name, "backend object up to date");
        return Ok(Delegation::Unchanged(name));
    }

    store
        .apply_scaled_object(&desired, &cfg.field_manager)
        .await
        .map_err(into_err)?;
    info!(
        scaled_object = %name,
        kind = Backend::Keda.identity().kind,
        target = %target,
        triggers = triggers.len(),
        "backend scaling object applied"
    );
    Ok(Delegation::Applied(name))
}

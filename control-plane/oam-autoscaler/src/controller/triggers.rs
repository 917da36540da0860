//! Per-trigger validation. Each trigger is checked on its own; a bad trigger
//! only drops itself from delegation and adds warnings.

use chrono::{NaiveTime, Timelike};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::crd::autoscaler::{
    MetricTargetType, TargetWorkload, Trigger, TriggerType,
};

/// Non-fatal spec problem. Recorded on status, never fails a reconcile.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecWarning {
    #[error("Spec.targetWorkload is not set")]
    TargetWorkloadNotSet,
    #[error("no valid triggers to delegate")]
    NoValidTriggers,
    #[error("spec.triggers[{index}]: {problem}")]
    Trigger {
        index: usize,
        problem: TriggerProblem,
    },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerProblem {
    #[error("startAt required")]
    StartAtRequired,
    #[error("startAt wrong format, should be like `12:01`")]
    StartAtWrongFormat,
    #[error("duration required")]
    DurationRequired,
    #[error("duration wrong format, should be a whole number of hours like `2`")]
    DurationWrongFormat,
    #[error("replicas required")]
    ReplicasRequired,
    #[error("replicas must not be negative")]
    ReplicasNegative,
    #[error("sum of start and duration more than 24 hours")]
    WindowExceedsDay,
    #[error("metricTargetType required")]
    MetricTargetTypeRequired,
    #[error("threshold required")]
    ThresholdRequired,
    #[error("threshold wrong format, should be a positive number")]
    ThresholdWrongFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceMetric {
    Cpu,
    Memory,
    Storage,
    EphemeralStorage,
}

impl ResourceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceMetric::Cpu => "cpu",
            ResourceMetric::Memory => "memory",
            ResourceMetric::Storage => "storage",
            ResourceMetric::EphemeralStorage => "ephemeral-storage",
        }
    }
}

/// Daily window `[start, start + duration)` that never crosses midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronWindow {
    pub start_hour: u32,
    pub start_minute: u32,
    pub duration_hours: u32,
}

impl CronWindow {
    pub fn end_hour(&self) -> u32 {
        self.start_hour + self.duration_hours
    }

    /// Crontab expression firing at the window start every day.
    pub fn start_schedule(&self) -> String {
        format!("{} {} * * *", self.start_minute, self.start_hour)
    }

    pub fn end_schedule(&self) -> String {
        format!("{} {} * * *", self.start_minute, self.end_hour())
    }
}

/// A trigger that passed validation, carrying only its own fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedTrigger {
    Resource {
        name: Option<String>,
        metric: ResourceMetric,
        target: MetricTargetType,
        value: String,
    },
    Cron {
        name: Option<String>,
        window: CronWindow,
        replicas: i32,
        timezone: Option<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerValidation {
    /// Valid triggers in spec order.
    pub valid: Vec<ValidatedTrigger>,
    pub warnings: Vec<SpecWarning>,
}

impl TriggerValidation {
    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(|w| w.to_string()).collect()
    }
}

/// Validates the trait's triggers against the persisted target binding.
pub fn validate_triggers(
    target: Option<&TargetWorkload>,
    triggers: &[Trigger],
) -> TriggerValidation {
    let mut out = TriggerValidation::default();
    if !target.is_some_and(|t| t.is_set()) {
        out.warnings.push(SpecWarning::TargetWorkloadNotSet);
    }
    for (index, trigger) in triggers.iter().enumerate() {
        match validate_trigger(trigger) {
            Ok(valid) => out.valid.push(valid),
            Err(problems) => out.warnings.extend(
                problems
                    .into_iter()
                    .map(|problem| SpecWarning::Trigger { index, problem }),
            ),
        }
    }
    if out.valid.is_empty() {
        out.warnings.push(SpecWarning::NoValidTriggers);
    }
    out
}

pub fn validate_trigger(
    trigger: &Trigger,
) -> Result<ValidatedTrigger, Vec<TriggerProblem>> {
    match trigger.type_ {
        TriggerType::Cron => validate_cron(trigger),
        TriggerType::Cpu => validate_resource(trigger, ResourceMetric::Cpu),
        TriggerType::Memory => {
            validate_resource(trigger, ResourceMetric::Memory)
        }
        TriggerType::Storage => {
            validate_resource(trigger, ResourceMetric::Storage)
        }
        TriggerType::EphemeralStorage => {
            validate_resource(trigger, ResourceMetric::EphemeralStorage)
        }
    }
}

fn validate_resource(
    trigger: &Trigger,
    metric: ResourceMetric,
) -> Result<ValidatedTrigger, Vec<TriggerProblem>> {
    let mut problems = Vec::new();
    if trigger.metric_target_type.is_none() {
        problems.push(TriggerProblem::MetricTargetTypeRequired);
    }
    let value = match trigger.threshold.as_ref() {
        None => {
            problems.push(TriggerProblem::ThresholdRequired);
            None
        }
        Some(t) => {
            let parsed = parse_threshold(t);
            if parsed.is_none() {
                problems.push(TriggerProblem::ThresholdWrongFormat);
            }
            parsed
        }
    };
    match (trigger.metric_target_type.clone(), value) {
        (Some(target), Some(value)) if problems.is_empty() => {
            Ok(ValidatedTrigger::Resource {
                name: trigger.name.clone(),
                metric,
                target,
                value,
            })
        }
        _ => Err(problems),
    }
}

fn parse_threshold(threshold: &IntOrString) -> Option<String> {
    match threshold {
        IntOrString::Int(n) if *n > 0 => Some(n.to_string()),
        IntOrString::Int(_) => None,
        IntOrString::String(s) => {
            let s = s.trim();
            s.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v > 0.0)
                .map(|_| s.to_string())
        }
    }
}

fn validate_cron(
    trigger: &Trigger,
) -> Result<ValidatedTrigger, Vec<TriggerProblem>> {
    let mut problems = Vec::new();

    let start = match trigger.start_at.as_deref().map(str::trim) {
        None | Some("") => {
            problems.push(TriggerProblem::StartAtRequired);
            None
        }
        Some(s) => match NaiveTime::parse_from_str(s, "%H:%M") {
            Ok(t) => Some(t),
            Err(_) => {
                problems.push(TriggerProblem::StartAtWrongFormat);
                None
            }
        },
    };

    let duration = match trigger.duration.as_ref() {
        None => {
            problems.push(TriggerProblem::DurationRequired);
            None
        }
        Some(d) => {
            let parsed = parse_duration_hours(d);
            if parsed.is_none() {
                problems.push(TriggerProblem::DurationWrongFormat);
            }
            parsed
        }
    };

    match trigger.replicas {
        None => problems.push(TriggerProblem::ReplicasRequired),
        Some(r) if r < 0 => problems.push(TriggerProblem::ReplicasNegative),
        Some(_) => {}
    }

    if let (Some(start), Some(duration_hours)) = (start, duration) {
        if start.hour() + duration_hours >= 24 {
            problems.push(TriggerProblem::WindowExceedsDay);
        }
    }

    match (start, duration, trigger.replicas) {
        (Some(start), Some(duration_hours), Some(replicas))
            if problems.is_empty() =>
        {
            Ok(ValidatedTrigger::Cron {
                name: trigger.name.clone(),
                window: CronWindow {
                    start_hour: start.hour(),
                    start_minute: start.minute(),
                    duration_hours,
                },
                replicas,
                timezone: trigger.timezone.clone().filter(|tz| !tz.is_empty()),
            })
        }
        _ => Err(problems),
    }
}

/// Accepts `2`, `"2"` and `"2h"`. Zero-length windows are rejected.
fn parse_duration_hours(duration: &IntOrString) -> Option<u32> {
    let hours = match duration {
        IntOrString::Int(n) => u32::try_from(*n).ok()?,
        IntOrString::String(s) => {
            let s = s.trim();
            s.strip_suffix('h').unwrap_or(s).parse::<u32>().ok()?
        }
    };
    (hours > 0).then_some(hours)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> TargetWorkload {
        TargetWorkload {
            api_version: "apps/v1".into(),
            kind: "Deployment".into(),
            name: "web".into(),
        }
    }

    fn cron(
        start_at: Option<&str>,
        duration: Option<&str>,
        replicas: Option<i32>,
    ) -> Trigger {
        let mut t = Trigger::cron("00:00", "1", 1);
        t.start_at = start_at.map(str::to_string);
        t.duration = duration.map(|d| IntOrString::String(d.to_string()));
        t.replicas = replicas;
        t
    }

    fn problems(t: &Trigger) -> Vec<TriggerProblem> {
        validate_trigger(t).expect_err("trigger should be rejected")
    }

    #[test]
    fn start_plus_duration_past_midnight_is_rejected() {
        let p = problems(&cron(Some("12:01"), Some("13"), Some(3)));
        assert_eq!(p, vec![TriggerProblem::WindowExceedsDay]);
        assert!(
            p[0].to_string()
                .contains("sum of start and duration more than 24 hours")
        );
    }

    #[test]
    fn window_ending_exactly_at_midnight_is_rejected() {
        let p = problems(&cron(Some("20:00"), Some("4"), Some(3)));
        assert_eq!(p, vec![TriggerProblem::WindowExceedsDay]);
    }

    #[test]
    fn missing_start_at_is_required() {
        let p = problems(&cron(None, Some("2"), Some(3)));
        assert_eq!(p, vec![TriggerProblem::StartAtRequired]);
        assert!(p[0].to_string().contains("startAt required"));
    }

    #[test]
    fn malformed_start_at_is_wrong_format() {
        let p = problems(&cron(Some("noon"), Some("2"), Some(3)));
        assert_eq!(p, vec![TriggerProblem::StartAtWrongFormat]);
        assert!(p[0].to_string().contains("startAt wrong format"));
    }

    #[test]
    fn missing_replicas_is_required() {
        let p = problems(&cron(Some("09:00"), Some("2"), None));
        assert_eq!(p, vec![TriggerProblem::ReplicasRequired]);
        assert!(p[0].to_string().contains("replicas required"));
    }

    #[test]
    fn duration_problems_are_reported() {
        assert_eq!(
            problems(&cron(Some("09:00"), None, Some(1))),
            vec![TriggerProblem::DurationRequired]
        );
        assert_eq!(
            problems(&cron(Some("09:00"), Some("two"), Some(1))),
            vec![TriggerProblem::DurationWrongFormat]
        );
        assert_eq!(
            problems(&cron(Some("09:00"), Some("0"), Some(1))),
            vec![TriggerProblem::DurationWrongFormat]
        );
    }

    #[test]
    fn every_missing_cron_field_is_reported() {
        let p = problems(&cron(None, None, None));
        assert_eq!(
            p,
            vec![
                TriggerProblem::StartAtRequired,
                TriggerProblem::DurationRequired,
                TriggerProblem::ReplicasRequired,
            ]
        );
    }

    #[test]
    fn valid_cron_carries_window() {
        let mut t = cron(Some("09:30"), Some("2h"), Some(5));
        t.timezone = Some("Europe/Berlin".into());
        let v = validate_trigger(&t).unwrap();
        let ValidatedTrigger::Cron {
            window,
            replicas,
            timezone,
            ..
        } = v
        else {
            panic!("expected cron trigger");
        };
        assert_eq!(
            window,
            CronWindow {
                start_hour: 9,
                start_minute: 30,
                duration_hours: 2
            }
        );
        assert_eq!(window.start_schedule(), "30 9 * * *");
        assert_eq!(window.end_schedule(), "30 11 * * *");
        assert_eq!(replicas, 5);
        assert_eq!(timezone.as_deref(), Some("Europe/Berlin"));
    }

    #[test]
    fn integer_duration_is_accepted() {
        let mut t = cron(Some("09:00"), None, Some(5));
        t.duration = Some(IntOrString::Int(2));
        assert!(validate_trigger(&t).is_ok());
    }

    #[test]
    fn resource_trigger_needs_target_type_and_threshold() {
        let mut t =
            Trigger::resource(TriggerType::Cpu, MetricTargetType::Utilization, 80);
        t.metric_target_type = None;
        t.threshold = None;
        assert_eq!(
            problems(&t),
            vec![
                TriggerProblem::MetricTargetTypeRequired,
                TriggerProblem::ThresholdRequired
            ]
        );

        let mut t =
            Trigger::resource(TriggerType::Memory, MetricTargetType::AverageValue, 1);
        t.threshold = Some(IntOrString::String("lots".into()));
        assert_eq!(problems(&t), vec![TriggerProblem::ThresholdWrongFormat]);
    }

    #[test]
    fn resource_trigger_keeps_metric_and_value() {
        let t = Trigger::resource(
            TriggerType::EphemeralStorage,
            MetricTargetType::AverageValue,
            70,
        );
        assert_eq!(
            validate_trigger(&t).unwrap(),
            ValidatedTrigger::Resource {
                name: None,
                metric: ResourceMetric::EphemeralStorage,
                target: MetricTargetType::AverageValue,
                value: "70".into(),
            }
        );
    }

    #[test]
    fn one_bad_trigger_does_not_block_others() {
        let triggers = vec![
            cron(Some("noon"), Some("2"), Some(3)),
            Trigger::resource(TriggerType::Cpu, MetricTargetType::Utilization, 80),
            cron(Some("09:00"), Some("2"), Some(5)),
        ];
        let v = validate_triggers(Some(&target()), &triggers);
        assert_eq!(v.valid.len(), 2);
        assert_eq!(
            v.warnings,
            vec![SpecWarning::Trigger {
                index: 0,
                problem: TriggerProblem::StartAtWrongFormat
            }]
        );
        assert_eq!(
            v.warning_messages(),
            vec!["spec.triggers[0]: startAt wrong format, should be like `12:01`"]
        );
    }

    #[test]
    fn unset_target_is_a_warning_not_a_failure() {
        let triggers = vec![Trigger::resource(
            TriggerType::Cpu,
            MetricTargetType::Utilization,
            80,
        )];
        let v = validate_triggers(None, &triggers);
        assert_eq!(v.valid.len(), 1);
        assert_eq!(v.warnings, vec![SpecWarning::TargetWorkloadNotSet]);
        assert_eq!(v.warning_messages(), vec!["Spec.targetWorkload is not set"]);
    }

    #[test]
    fn no_surviving_trigger_is_flagged() {
        let v = validate_triggers(Some(&target()), &[cron(None, Some("2"), Some(1))]);
        assert!(v.valid.is_empty());
        assert_eq!(v.warnings.last(), Some(&SpecWarning::NoValidTriggers));
    }
}

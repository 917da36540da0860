use std::time::Duration;

use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct AutoscalerConfig {
    /// Fixed delay before retrying a failed or incomplete reconcile.
    /// Env: OAM_AUTOSCALER_REQUEUE_SECS
    #[envconfig(from = "OAM_AUTOSCALER_REQUEUE_SECS", default = "30")]
    pub requeue_secs: u64,

    /// Field manager used when applying the backend scaling object.
    #[envconfig(from = "OAM_AUTOSCALER_FIELD_MANAGER", default = "oam-autoscaler")]
    pub field_manager: String,

    /// Comma-separated kinds eligible as scale target, in no particular order.
    /// Env: OAM_AUTOSCALER_SCALABLE_KINDS
    #[envconfig(
        from = "OAM_AUTOSCALER_SCALABLE_KINDS",
        default = "Deployment,StatefulSet"
    )]
    pub scalable_kinds: String,

    /// Comma-separated ancestor kinds accepted as event target.
    #[envconfig(
        from = "OAM_AUTOSCALER_CONTEXT_KINDS",
        default = "ApplicationConfiguration"
    )]
    pub context_kinds: String,

    /// Timezone handed to cron scalers that do not name one.
    #[envconfig(from = "OAM_AUTOSCALER_DEFAULT_TIMEZONE", default = "UTC")]
    pub default_timezone: String,

    /// Restrict the controller to a single namespace (all when unset).
    #[envconfig(from = "OAM_AUTOSCALER_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Max traits reconciled in parallel.
    #[envconfig(from = "OAM_AUTOSCALER_CONCURRENCY", default = "4")]
    pub concurrency: u16,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            requeue_secs: 30,
            field_manager: "oam-autoscaler".into(),
            scalable_kinds: "Deployment,StatefulSet".into(),
            context_kinds: "ApplicationConfiguration".into(),
            default_timezone: "UTC".into(),
            watch_namespace: None,
            concurrency: 4,
        }
    }
}

impl AutoscalerConfig {
    pub fn requeue(&self) -> Duration {
        Duration::from_secs(self.requeue_secs)
    }

    pub fn scalable_kinds(&self) -> KindSet {
        KindSet::parse(&self.scalable_kinds)
    }

    pub fn context_kinds(&self) -> KindSet {
        KindSet::parse(&self.context_kinds)
    }
}

/// Case-sensitive set of resource kinds parsed from a comma list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KindSet(Vec<String>);

impl KindSet {
    pub fn parse(list: &str) -> Self {
        let mut kinds: Vec<String> = Vec::new();
        for k in list.split(',').map(str::trim).filter(|k| !k.is_empty()) {
            if !kinds.iter().any(|x| x == k) {
                kinds.push(k.to_string());
            }
        }
        Self(kinds)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.0.iter().any(|k| k == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

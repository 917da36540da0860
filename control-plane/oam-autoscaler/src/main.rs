use envconfig::Envconfig;
use oam_autoscaler::{config::AutoscalerConfig, init_tracing, runtime};
use tracing::info;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    let cfg = AutoscalerConfig::init_from_env()?;
    info!(?cfg, "Starting OAM autoscaler");

    runtime::run(cfg).await
}

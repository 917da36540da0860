use anyhow::Context;
use kube::Client;
use tracing::{debug, info};

use crate::config::AutoscalerConfig;
use crate::controller::run_controller;

/// rustls needs a process-wide provider before the first TLS handshake.
pub fn install_crypto_provider() {
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(
        rustls::crypto::aws_lc_rs::default_provider(),
    ) {
        debug!(?e, "CryptoProvider already installed; proceeding");
    }
}

/// Builds the cluster client and runs the controller until shutdown. A client
/// that cannot be built is the only fatal error.
pub async fn run(cfg: AutoscalerConfig) -> anyhow::Result<()> {
    install_crypto_provider();
    let client = Client::try_default()
        .await
        .context("failed to build cluster client")?;
    info!(namespace = ?cfg.watch_namespace, "cluster client ready");
    run_controller(client, cfg).await
}

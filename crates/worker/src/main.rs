use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use talkgen_comfyui::config::ComfyUiConfig;
use talkgen_core::audio::FfprobeDurationProbe;
use talkgen_core::types::JobRequest;
use talkgen_worker::config::WorkerConfig;
use talkgen_worker::handler::Handler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "talkgen_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env()?;
    let comfy = ComfyUiConfig::for_server(&config.server_address, config.client_id.clone());
    tracing::info!(
        server = %comfy.http_url,
        client_id = %comfy.client_id,
        template_dir = %config.template_dir.display(),
        "Worker starting",
    );

    // Fail fast if any of the four template variants is missing or
    // malformed, before accepting any job.
    talkgen_workflow::validate_templates(&config.template_dir)
        .await
        .context("template validation failed")?;

    let request = read_request().await?;

    let cancel = CancellationToken::new();
    let abort = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling job");
            abort.cancel();
        }
    });

    let handler = Handler::new(config, comfy, Arc::new(FfprobeDurationProbe));
    let response = handler.run(request, &cancel).await;

    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}

/// Read one job request as JSON, from the file named by the first
/// argument or from stdin when none is given.
async fn read_request() -> anyhow::Result<JobRequest> {
    let raw = match std::env::args().nth(1) {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read job request from {path}"))?,
        None => {
            use tokio::io::AsyncReadExt;
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("failed to read job request from stdin")?;
            buf
        }
    };
    serde_json::from_str(&raw).context("malformed job request")
}

//! Seaweed Operator - runs SeaweedFS master tiers on Kubernetes

use clap::{Parser, Subcommand};
use kube::{Api, Client, CustomResourceExt};

use seaweed_common::crd::Seaweed;
use seaweed_common::telemetry::{init_telemetry, TelemetryConfig};
use seaweed_common::FIELD_MANAGER;
use seaweed_operator::config::ControllerConfig;
use seaweed_operator::runner::run_seaweed_controller;

/// Seaweed - Kubernetes operator for SeaweedFS clusters
#[derive(Parser, Debug)]
#[command(name = "seaweed-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    config: ControllerConfig,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Installs the Seaweed CRD, then watches Seaweed resources and converges
    /// each cluster's master tier: peer Service, client Service, ConfigMap and
    /// StatefulSet.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&Seaweed::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_telemetry(TelemetryConfig {
        service_name: FIELD_MANAGER.to_string(),
        format: cli.config.log_format,
    })?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.config).await,
    }
}

async fn run_controller(config: ControllerConfig) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crd_installed(&client).await?;
    run_seaweed_controller(client, config).await;
    Ok(())
}

/// Ensure the Seaweed CRD is installed
///
/// The operator installs its own CRD on startup using server-side apply, so
/// the schema always matches the operator version.
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing Seaweed CRD...");
    crds.patch(
        Seaweed::crd_name(),
        &params,
        &Patch::Apply(&Seaweed::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install Seaweed CRD: {}", e))?;

    tracing::info!("Seaweed CRD installed/updated");
    Ok(())
}

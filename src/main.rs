use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

mod api;
mod artifacts;
mod cli;
mod config;
mod error;
mod signal;
mod startup;

use cli::{Cli, Commands};
use config::Settings;
use error::{BootstrapError, ConfigError, EXIT_OK};
use startup::{wait_until_ready, Bootstrap, BootstrapOutcome};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = match Settings::from_env()
        .and_then(|s| s.with_probe_overrides(cli.ready_timeout, cli.poll_interval))
    {
        Ok(settings) => settings,
        Err(e) => {
            match e.field() {
                Some(field) => error!("❌ Invalid configuration ({}): {}", field, e),
                None => error!("❌ Invalid configuration: {}", e),
            }
            let e = BootstrapError::from(e);
            return ExitCode::from(e.exit_code());
        }
    };

    let command = cli.command.unwrap_or(Commands::Run);

    let code =
        signal::run_until_shutdown(dispatch(command, settings), signal::shutdown_signal()).await;

    ExitCode::from(code)
}

async fn dispatch(command: Commands, settings: Settings) -> Result<u8, BootstrapError> {
    match command {
        Commands::Run => run_bootstrap(settings).await,
        Commands::Wait => run_wait(settings).await,
        Commands::Sync => run_sync(settings).await,
        Commands::Config => run_config(&settings),
    }
}

async fn run_bootstrap(settings: Settings) -> Result<u8, BootstrapError> {
    info!(
        "🚀 Bootstrapping Xinference at {} (model '{}')",
        settings.endpoint.base_url, settings.primary.model_name
    );

    let mut bootstrap = Bootstrap::new(settings).inspect_err(|e| error!("❌ {}", e))?;
    let outcome: BootstrapOutcome = bootstrap.run().await?;
    Ok(outcome.exit_code())
}

async fn run_wait(settings: Settings) -> Result<u8, BootstrapError> {
    let client = api::XinferenceClient::new(
        settings.endpoint.base_url.clone(),
        settings.launch_timeout,
    )
    .map_err(ConfigError::HttpClient)?;

    info!("⏳ Waiting for {}", client.base_url());
    wait_until_ready(
        &client,
        settings.probe.timeout,
        settings.probe.poll_interval,
    )
    .await
    .inspect_err(|e| error!("❌ {}", e))?;

    Ok(EXIT_OK)
}

async fn run_sync(settings: Settings) -> Result<u8, BootstrapError> {
    let Some(spec) = settings.sync else {
        info!("☁️  S3 model sync disabled; nothing to do");
        return Ok(EXIT_OK);
    };

    let store =
        artifacts::ObjectStoreArtifacts::s3(&spec).map_err(ConfigError::ObjectStore)?;
    let report = artifacts::sync(&store, &spec)
        .await
        .inspect_err(|e| error!("❌ {}", e))?;

    info!("📦 Model files ready in {}", report.destination.display());
    for entry in &report.entries {
        if let artifacts::TransferStatus::Downloaded { bytes } = entry.status {
            info!("   {} ({} bytes)", entry.local_path.display(), bytes);
        }
    }

    Ok(EXIT_OK)
}

fn run_config(settings: &Settings) -> Result<u8, BootstrapError> {
    match serde_json::to_string_pretty(&settings.redacted_json()) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!("Failed to render configuration: {}", e),
    }
    Ok(EXIT_OK)
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sams_config::ConfigLoader;
use sams_core::{vendor_factory, Controller};
use sams_service::api::ApiServer;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sams")]
#[command(about = "Delivery-slot acquisition service", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/local.toml")]
	config: PathBuf,

	#[arg(long, env = "SAMS_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the acquisition service
	Start,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	// Initialize tracing
	setup_tracing(&cli.log_level)?;

	// Handle commands
	match cli.command {
		Some(Commands::Start) | None => start_service(cli).await,
		Some(Commands::Validate) => validate_config(cli).await,
	}
}

async fn start_service(cli: Cli) -> Result<()> {
	info!("Starting sams service");
	info!("Loading configuration from: {:?}", cli.config);

	// Load configuration
	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")?;

	info!("Configuration loaded successfully");
	info!("Vendor backend: {}", config.vendor.backend);
	info!("HTTP port: {}", config.service.http_port);

	// Create controller
	let controller =
		Arc::new(Controller::from_config(&config).context("Failed to build controller")?);

	// Start HTTP server
	let server = ApiServer::new(
		config.service.host.clone(),
		config.service.http_port,
		controller.clone(),
	);
	let http_handle = tokio::spawn(async move { server.run().await });

	info!("sams service started successfully");

	// Wait for shutdown signal
	setup_shutdown_signal().await;

	info!("Shutdown signal received, stopping acquisition...");

	// Stop the run and give the engine a moment to notice
	controller.stop().await;
	if tokio::time::timeout(Duration::from_secs(5), controller.wait())
		.await
		.is_err()
	{
		warn!("Acquisition run did not finish in time");
	}

	// Cancel the server task
	http_handle.abort();

	info!("sams service stopped");
	Ok(())
}

async fn validate_config(cli: Cli) -> Result<()> {
	info!("Validating configuration file: {:?}", cli.config);

	// Try to load the configuration
	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")?;

	// The backend must be one we can build
	vendor_factory(&config.vendor.backend).context("Unsupported vendor backend")?;

	info!("Configuration is valid");
	info!("  Listen: {}:{}", config.service.host, config.service.http_port);
	info!("  Vendor backend: {}", config.vendor.backend);
	info!(
		"  Engine backoff: {}ms (push {}ms)",
		config.engine.backoff_ms, config.engine.push_backoff_ms
	);
	info!(
		"  Hub: channel {}, log history {}, status history {}, heartbeat {}s",
		config.hub.channel_capacity,
		config.hub.log_history,
		config.hub.status_history,
		config.hub.heartbeat_secs
	);

	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		signal::ctrl_c()
			.await
			.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}

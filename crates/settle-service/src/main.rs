use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use settle_config::{ConfigLoader, SettleConfig};
use settle_core::{EngineConfig, SettlementEngineBuilder};
use settle_ledger::{InMemoryBalances, StaticVendorDirectory};
use settle_rates::FixedRateSource;
use settle_reconciler::ReconcilerConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;

#[derive(Parser)]
#[command(name = "settle-service")]
#[command(about = "Stablecoin settlement service", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/local.toml")]
	config: PathBuf,

	#[arg(long, env = "SETTLE_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the settlement service
	Start,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	setup_tracing(&cli.log_level)?;

	match cli.command {
		Some(Commands::Start) | None => start_service(cli).await,
		Some(Commands::Validate) => validate_config(cli).await,
	}
}

async fn start_service(cli: Cli) -> Result<()> {
	info!("Starting settlement service");
	info!("Loading configuration from: {:?}", cli.config);

	let config = ConfigLoader::from_env_and_file(Some(cli.config.as_path()))
		.context("Failed to load configuration")?;

	info!("Configuration loaded successfully");
	info!("Service name: {}", config.service.name);
	info!("HTTP port: {}", config.service.http_port);
	info!(
		"Currency pair: {}/{}",
		config.currency.local_ccy, config.currency.settlement_ccy
	);

	let balances = Arc::new(InMemoryBalances::new());
	let engine = Arc::new(build_engine(&config, balances.clone())?);

	engine.start().await;

	let state = api::AppState {
		engine: engine.clone(),
		balances: Some(balances),
	};

	let port = config.service.http_port;
	let http_handle = tokio::spawn(async move { api::serve(state, port).await });

	info!("Settlement service started successfully");

	setup_shutdown_signal().await;
	info!("Shutdown signal received, stopping services...");

	engine.shutdown().await;
	http_handle.abort();

	info!("Settlement service stopped");
	Ok(())
}

fn build_engine(
	config: &SettleConfig,
	balances: Arc<InMemoryBalances>,
) -> Result<settle_core::SettlementEngine> {
	let rates = FixedRateSource::new();
	for entry in &config.rates {
		rates.set_rate(
			entry.local_ccy.clone(),
			entry.settlement_ccy.clone(),
			entry.rate,
		);
	}

	let directory = StaticVendorDirectory::new();
	for vendor in &config.vendors {
		directory.set_active(vendor.clone(), true);
	}

	let engine_config = EngineConfig {
		local_ccy: config.currency.local_ccy.clone(),
		settlement_ccy: config.currency.settlement_ccy.clone(),
		escrow_account: config.ledger.escrow_account.clone(),
		fee_bps: config.fees.fee_bps,
		reconciler: ReconcilerConfig {
			initial_backoff: Duration::from_millis(config.reconciler.initial_backoff_ms),
			max_backoff: Duration::from_millis(config.reconciler.max_backoff_ms),
			max_elapsed: Duration::from_millis(config.reconciler.max_elapsed_ms),
			max_lag: Duration::from_millis(config.reconciler.max_lag_ms),
			sweep_interval: Duration::from_secs(config.reconciler.sweep_interval_secs),
			sweep_sample_size: config.reconciler.sweep_sample_size,
		},
	};

	SettlementEngineBuilder::new(engine_config)
		.with_rate_source(Arc::new(rates))
		.with_balances(balances)
		.with_directory(Arc::new(directory))
		.build()
		.map_err(|e| anyhow::anyhow!("Failed to build engine: {}", e))
}

async fn validate_config(cli: Cli) -> Result<()> {
	info!("Validating configuration file: {:?}", cli.config);

	let config =
		ConfigLoader::from_file(&cli.config).context("Failed to load configuration")?;

	info!("Configuration is valid");
	info!("Service name: {}", config.service.name);
	info!("Fee: {} bps", config.fees.fee_bps);
	info!("Escrow account: {}", config.ledger.escrow_account);
	info!("Active vendors: {}", config.vendors.len());
	for entry in &config.rates {
		info!(
			"  Rate {}/{}: {}",
			entry.local_ccy, entry.settlement_ccy, entry.rate
		);
	}

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

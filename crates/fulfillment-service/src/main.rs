//! Main entry point for the fulfillment service.
//!
//! Loads configuration, assembles the engine from the configured storage and
//! settlement backends, and serves the HTTP API until interrupted.

use clap::Parser;
use fulfillment_config::Config;
use fulfillment_core::FulfillmentEngine;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

mod apis;
mod factory_registry;
mod server;

/// Command-line arguments for the fulfillment service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started fulfillment service");

	let config_path = args
		.config
		.to_str()
		.ok_or("Configuration path is not valid UTF-8")?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let engine = Arc::new(factory_registry::build_engine_from_config(config.clone())?);

	let event_task = tokio::spawn(log_events(engine.clone()));
	let cleanup_task = tokio::spawn(run_cleanup(
		engine.clone(),
		Duration::from_secs(config.storage.cleanup_interval_seconds),
	));

	match config.api.clone().filter(|api| api.enabled) {
		Some(api_config) => {
			tokio::select! {
				result = server::start_server(api_config, engine.clone()) => {
					tracing::info!("API server finished");
					result?;
				}
				_ = tokio::signal::ctrl_c() => {
					tracing::info!("Received shutdown signal");
				}
			}
		},
		None => {
			tracing::info!("API disabled, running background jobs only");
			tokio::signal::ctrl_c().await?;
			tracing::info!("Received shutdown signal");
		},
	}

	event_task.abort();
	cleanup_task.abort();

	tracing::info!("Stopped fulfillment service");
	Ok(())
}

/// Logs every engine event until the bus closes.
async fn log_events(engine: Arc<FulfillmentEngine>) {
	let mut receiver = engine.event_bus().subscribe();
	loop {
		match receiver.recv().await {
			Ok(event) => tracing::info!(?event, "Fulfillment event"),
			Err(RecvError::Lagged(skipped)) => {
				tracing::warn!(skipped, "Event logger lagged behind");
			},
			Err(RecvError::Closed) => break,
		}
	}
}

/// Periodically drops expired records from storage.
async fn run_cleanup(engine: Arc<FulfillmentEngine>, every: Duration) {
	let mut interval = tokio::time::interval(every);
	// The first tick completes immediately.
	interval.tick().await;
	loop {
		interval.tick().await;
		match engine.cleanup_storage().await {
			Ok(0) => {},
			Ok(removed) => tracing::debug!(removed, "Storage cleanup completed"),
			Err(e) => tracing::warn!(error = %e, "Storage cleanup failed"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::CommandFactory;
	use tempfile::tempdir;

	#[test]
	fn test_args_defaults() {
		let args = Args::parse_from(["fulfillment"]);
		assert_eq!(args.config, PathBuf::from("config.toml"));
		assert_eq!(args.log_level, "info");
	}

	#[test]
	fn test_args_custom_values() {
		let args = Args::parse_from(["fulfillment", "-c", "custom.toml", "-l", "debug"]);
		assert_eq!(args.config, PathBuf::from("custom.toml"));
		assert_eq!(args.log_level, "debug");
	}

	#[test]
	fn test_cli_definition() {
		Args::command().debug_assert();
	}

	#[tokio::test]
	async fn test_engine_from_config_file() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("config.toml");
		std::fs::write(
			&path,
			r#"
[service]
id = "fulfillment-file-test"

[[stores]]
id = "downtown"
name = "Downtown"

[storage]
primary = "memory"
[storage.implementations.memory]

[settlement]
primary = "simulated"
[settlement.implementations.simulated]
success_rate = 1.0
"#,
		)
		.unwrap();

		let config = Config::from_file(path.to_str().unwrap()).await.unwrap();
		let engine = factory_registry::build_engine_from_config(config).unwrap();
		assert_eq!(engine.config().service.id, "fulfillment-file-test");
		assert_eq!(
			engine.config().store("downtown").map(|s| s.order_prefix()),
			Some("DOWNTOWN".to_string())
		);
	}

	#[tokio::test]
	async fn test_cleanup_on_empty_storage() {
		let config = fulfillment_config::builders::ConfigBuilder::new().build();
		let engine = factory_registry::build_engine_from_config(config).unwrap();
		assert_eq!(engine.cleanup_storage().await.unwrap(), 0);
	}
}

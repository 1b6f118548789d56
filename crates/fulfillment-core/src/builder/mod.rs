//! Builder pattern for constructing fulfillment engines.
//!
//! Storage and settlement backends are chosen by name from the configuration
//! and created through factory functions, so the binary decides which
//! implementations exist and the configuration decides which one runs.

use crate::clock::{Clock, SystemClock};
use crate::engine::{event_bus::EventBus, FulfillmentEngine};
use fulfillment_config::Config;
use fulfillment_settlement::{SettlementError, SettlementInterface, SettlementService};
use fulfillment_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every pluggable component, keyed by the name used
/// in configuration.
pub struct FulfillmentFactories<SF, SEF> {
	pub storage_factories: HashMap<String, SF>,
	pub settlement_factories: HashMap<String, SEF>,
}

/// Builder for constructing a [`FulfillmentEngine`] with pluggable
/// implementations.
pub struct FulfillmentBuilder {
	config: Config,
	clock: Arc<dyn Clock>,
	event_capacity: usize,
}

impl FulfillmentBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			clock: Arc::new(SystemClock),
			event_capacity: 1000,
		}
	}

	/// Replaces the system clock, e.g. with a fixed clock in tests.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub fn with_event_capacity(mut self, capacity: usize) -> Self {
		self.event_capacity = capacity.max(1);
		self
	}

	pub fn build<SF, SEF>(
		self,
		factories: FulfillmentFactories<SF, SEF>,
	) -> Result<FulfillmentEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		SEF: Fn(&toml::Value) -> Result<Box<dyn SettlementInterface>, SettlementError>,
	{
		let storage_backend = create_primary(
			"storage",
			&self.config.storage.primary,
			&self.config.storage.implementations,
			&factories.storage_factories,
		)?;
		let storage = Arc::new(StorageService::new(storage_backend));

		let settlement_backend = create_primary(
			"settlement",
			&self.config.settlement.primary,
			&self.config.settlement.implementations,
			&factories.settlement_factories,
		)?;
		let settlement = Arc::new(SettlementService::new(
			settlement_backend,
			Duration::from_secs(self.config.settlement.timeout_seconds),
		));

		tracing::info!(
			service_id = %self.config.service.id,
			stores = self.config.stores.len(),
			"Fulfillment engine assembled"
		);

		Ok(FulfillmentEngine::new(
			self.config,
			storage,
			settlement,
			self.clock,
			EventBus::new(self.event_capacity),
		))
	}
}

/// Creates every configured implementation that has a factory and returns
/// the primary one.
///
/// Any configured implementation failing to build aborts construction, so a
/// typo in a secondary backend is caught at startup.
fn create_primary<T, F, E>(
	component: &str,
	primary: &str,
	configured: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<T, BuilderError>
where
	F: Fn(&toml::Value) -> Result<T, E>,
	E: std::fmt::Display,
{
	let mut implementations = HashMap::new();
	for (name, config) in configured {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "No factory registered, skipping");
			continue;
		};
		match factory(config) {
			Ok(implementation) => {
				tracing::info!(
					component,
					implementation = %name,
					enabled = %(name == primary),
					"Loaded"
				);
				implementations.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	if implementations.is_empty() {
		return Err(BuilderError::MissingComponent(format!(
			"No {} implementations available",
			component
		)));
	}

	implementations.remove(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' failed to load or has invalid configuration",
			component, primary
		))
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clock::FixedClock;
	use chrono::{TimeZone, Utc};
	use fulfillment_config::builders::ConfigBuilder;
	use fulfillment_settlement::SettlementFactory;
	use fulfillment_storage::StorageFactory;

	fn factories() -> FulfillmentFactories<StorageFactory, SettlementFactory> {
		FulfillmentFactories {
			storage_factories: fulfillment_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			settlement_factories: fulfillment_settlement::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}

	#[test]
	fn test_builds_from_config() {
		let now = Utc.with_ymd_and_hms(2024, 5, 10, 18, 0, 0).unwrap();
		let engine = FulfillmentBuilder::new(ConfigBuilder::new().build())
			.with_clock(Arc::new(FixedClock::new(now)))
			.build(factories())
			.unwrap();
		assert_eq!(engine.now(), now);
		assert_eq!(engine.config().service.id, "fulfillment-test");
	}

	#[test]
	fn test_missing_primary_is_config_error() {
		let mut config = ConfigBuilder::new().build();
		config.settlement.primary = "simulated".to_string();

		let result = FulfillmentBuilder::new(config).build(factories());
		assert!(matches!(result, Err(BuilderError::Config(msg)) if msg.contains("simulated")));
	}

	#[test]
	fn test_invalid_backend_config_rejected() {
		let mut config = ConfigBuilder::new().build();
		let mut bad = toml::Table::new();
		bad.insert("outcome".into(), toml::Value::String("maybe".into()));
		config
			.settlement
			.implementations
			.insert("fixed".into(), toml::Value::Table(bad));

		let result = FulfillmentBuilder::new(config).build(factories());
		assert!(matches!(result, Err(BuilderError::Config(msg)) if msg.contains("fixed")));
	}

	#[test]
	fn test_no_factories() {
		let empty: FulfillmentFactories<StorageFactory, SettlementFactory> = FulfillmentFactories {
			storage_factories: HashMap::new(),
			settlement_factories: HashMap::new(),
		};
		let result = FulfillmentBuilder::new(ConfigBuilder::new().build()).build(empty);
		assert!(matches!(result, Err(BuilderError::MissingComponent(_))));
	}
}

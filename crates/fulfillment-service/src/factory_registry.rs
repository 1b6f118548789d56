//! Registry of every storage and settlement backend compiled into the binary.
//!
//! The configuration names backends; this registry resolves those names to
//! factory functions before the engine is assembled.

use fulfillment_config::Config;
use fulfillment_core::{FulfillmentBuilder, FulfillmentEngine, FulfillmentFactories};
use fulfillment_settlement::SettlementFactory;
use fulfillment_storage::StorageFactory;
use std::collections::HashMap;
use std::sync::OnceLock;

pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub settlement: HashMap<String, SettlementFactory>,
}

impl FactoryRegistry {
	pub fn new() -> Self {
		Self {
			storage: HashMap::new(),
			settlement: HashMap::new(),
		}
	}

	pub fn register_storage(&mut self, name: impl Into<String>, factory: StorageFactory) {
		self.storage.insert(name.into(), factory);
	}

	pub fn register_settlement(&mut self, name: impl Into<String>, factory: SettlementFactory) {
		self.settlement.insert(name.into(), factory);
	}
}

impl Default for FactoryRegistry {
	fn default() -> Self {
		Self::new()
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in fulfillment_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.register_storage(name, factory);
		}

		for (name, factory) in fulfillment_settlement::get_all_implementations() {
			tracing::debug!("Registering settlement implementation: {}", name);
			registry.register_settlement(name, factory);
		}

		registry
	})
}

/// Picks the factories for the implementations named in config, failing on
/// the first unknown name.
macro_rules! build_factories {
	($registry:expr, $config_impls:expr, $registry_field:ident, $type_name:literal) => {{
		let mut factories = HashMap::new();
		for name in $config_impls.keys() {
			if let Some(factory) = $registry.$registry_field.get(name) {
				factories.insert(name.clone(), *factory);
			} else {
				let mut available: Vec<_> = $registry.$registry_field.keys().cloned().collect();
				available.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					$type_name,
					name,
					available.join(", ")
				)
				.into());
			}
		}
		factories
	}};
}

/// Builds the engine from configuration using the registered backends.
pub fn build_engine_from_config(
	config: Config,
) -> Result<FulfillmentEngine, Box<dyn std::error::Error>> {
	let registry = get_registry();

	let storage_factories =
		build_factories!(registry, config.storage.implementations, storage, "storage");
	let settlement_factories = build_factories!(
		registry,
		config.settlement.implementations,
		settlement,
		"settlement"
	);

	let factories = FulfillmentFactories {
		storage_factories,
		settlement_factories,
	};

	Ok(FulfillmentBuilder::new(config).build(factories)?)
}

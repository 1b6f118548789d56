//! Fluent construction of [`Config`] values without going through TOML.

use crate::{
	ApiConfig, Config, DeliveryFeeConfig, ForecastConfig, KitchenConfig, PaymentsConfig,
	ServiceConfig, SettlementConfig, SlaConfig, StorageConfig, StoreConfig,
};
use std::collections::HashMap;

/// Builds a valid configuration backed by in-memory storage and the `fixed`
/// settlement implementation.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	stores: Vec<StoreConfig>,
	settlement_succeeds: bool,
	settlement_timeout_seconds: u64,
	sla: SlaConfig,
	kitchen: KitchenConfig,
	payments: PaymentsConfig,
	forecast: ForecastConfig,
	delivery: DeliveryFeeConfig,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	/// Starts with a single store, `downtown`, and default policies.
	pub fn new() -> Self {
		Self {
			service_id: "fulfillment-test".to_string(),
			stores: vec![StoreConfig {
				id: "downtown".to_string(),
				name: "Downtown".to_string(),
				order_prefix: None,
				operating_hours: 12,
			}],
			settlement_succeeds: true,
			settlement_timeout_seconds: 10,
			sla: SlaConfig::default(),
			kitchen: KitchenConfig::default(),
			payments: PaymentsConfig::default(),
			forecast: ForecastConfig::default(),
			delivery: DeliveryFeeConfig::default(),
			api: None,
		}
	}

	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	/// Adds a store open `operating_hours` per day.
	pub fn store(mut self, id: impl Into<String>, operating_hours: u32) -> Self {
		let id = id.into();
		self.stores.push(StoreConfig {
			name: id.clone(),
			id,
			order_prefix: None,
			operating_hours,
		});
		self
	}

	/// Whether the `fixed` settlement implementation approves payments.
	pub fn settlement_succeeds(mut self, succeeds: bool) -> Self {
		self.settlement_succeeds = succeeds;
		self
	}

	pub fn settlement_timeout_seconds(mut self, seconds: u64) -> Self {
		self.settlement_timeout_seconds = seconds;
		self
	}

	pub fn estimate_on_creation(mut self, enabled: bool) -> Self {
		self.sla.estimate_on_creation = enabled;
		self
	}

	pub fn kitchen(mut self, kitchen: KitchenConfig) -> Self {
		self.kitchen = kitchen;
		self
	}

	pub fn payments(mut self, payments: PaymentsConfig) -> Self {
		self.payments = payments;
		self
	}

	pub fn forecast(mut self, forecast: ForecastConfig) -> Self {
		self.forecast = forecast;
		self
	}

	pub fn delivery(mut self, delivery: DeliveryFeeConfig) -> Self {
		self.delivery = delivery;
		self
	}

	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	pub fn build(self) -> Config {
		let mut fixed = toml::Table::new();
		let outcome = if self.settlement_succeeds {
			"success"
		} else {
			"failure"
		};
		fixed.insert("outcome".to_string(), toml::Value::String(outcome.into()));

		Config {
			service: ServiceConfig {
				id: self.service_id,
			},
			storage: StorageConfig {
				primary: "memory".to_string(),
				implementations: HashMap::from([(
					"memory".to_string(),
					toml::Value::Table(toml::Table::new()),
				)]),
				cleanup_interval_seconds: 60,
			},
			settlement: SettlementConfig {
				primary: "fixed".to_string(),
				implementations: HashMap::from([(
					"fixed".to_string(),
					toml::Value::Table(fixed),
				)]),
				timeout_seconds: self.settlement_timeout_seconds,
			},
			stores: self.stores,
			sla: self.sla,
			kitchen: self.kitchen,
			payments: self.payments,
			forecast: self.forecast,
			delivery: self.delivery,
			api: self.api,
		}
	}
}

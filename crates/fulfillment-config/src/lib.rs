//! Configuration module for the fulfillment service.
//!
//! Configuration is loaded from TOML files. `${VAR}` and `${VAR:-default}`
//! references are resolved from the environment before parsing, and the
//! result is validated as a whole.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files:
//! - Use `include = ["stores.toml", "payments.toml"]` to include other files
//! - Each top-level section must be unique across all files

#[cfg(feature = "testing")]
pub mod builders;
mod loader;

pub use loader::ConfigLoader;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep just the message, not the echoed input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure for the fulfillment service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Identity of this service instance.
	pub service: ServiceConfig,
	/// Storage backend selection.
	pub storage: StorageConfig,
	/// External settlement collaborator selection.
	pub settlement: SettlementConfig,
	/// Stores served by this instance.
	pub stores: Vec<StoreConfig>,
	#[serde(default)]
	pub sla: SlaConfig,
	#[serde(default)]
	pub kitchen: KitchenConfig,
	#[serde(default)]
	pub payments: PaymentsConfig,
	#[serde(default)]
	pub forecast: ForecastConfig,
	#[serde(default)]
	pub delivery: DeliveryFeeConfig,
	/// HTTP API server.
	pub api: Option<ApiConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	pub id: String,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds for cleaning up expired storage entries.
	#[serde(default = "default_cleanup_interval")]
	pub cleanup_interval_seconds: u64,
}

fn default_cleanup_interval() -> u64 {
	3600
}

/// Configuration for the external settlement collaborator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SettlementConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
	/// Upper bound on a single settlement call. A call that runs longer is
	/// treated as a failed settlement.
	#[serde(default = "default_settlement_timeout")]
	pub timeout_seconds: u64,
}

fn default_settlement_timeout() -> u64 {
	10
}

/// A store served by this instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
	pub id: String,
	pub name: String,
	/// Prefix used for human-readable order numbers; defaults to the
	/// upper-cased store id.
	#[serde(default)]
	pub order_prefix: Option<String>,
	/// Hours the store is open per day, used to derive orders per hour.
	#[serde(default = "default_operating_hours")]
	pub operating_hours: u32,
}

fn default_operating_hours() -> u32 {
	12
}

impl StoreConfig {
	pub fn order_prefix(&self) -> String {
		self.order_prefix
			.clone()
			.unwrap_or_else(|| self.id.to_ascii_uppercase())
	}
}

/// Deadline computation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SlaConfig {
	/// Fixed buffer added to preparation time for the ride to the customer.
	#[serde(default = "default_delivery_buffer")]
	pub delivery_buffer_minutes: u32,
	/// Compute the estimate when the order is placed instead of waiting for
	/// the store to accept it. Acceptance always recomputes it.
	#[serde(default)]
	pub estimate_on_creation: bool,
}

fn default_delivery_buffer() -> u32 {
	15
}

impl Default for SlaConfig {
	fn default() -> Self {
		Self {
			delivery_buffer_minutes: default_delivery_buffer(),
			estimate_on_creation: false,
		}
	}
}

/// Kitchen workload classification.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KitchenConfig {
	/// Orders per hour at or below which the workload is LOW.
	#[serde(default = "default_low_threshold")]
	pub low_threshold: f64,
	/// Orders per hour at or below which the workload is MEDIUM.
	#[serde(default = "default_medium_threshold")]
	pub medium_threshold: f64,
	/// How many orders the kitchen prepares in parallel.
	#[serde(default = "default_capacity")]
	pub concurrent_capacity: u32,
}

fn default_low_threshold() -> f64 {
	10.0
}

fn default_medium_threshold() -> f64 {
	15.0
}

fn default_capacity() -> u32 {
	1
}

impl Default for KitchenConfig {
	fn default() -> Self {
		Self {
			low_threshold: default_low_threshold(),
			medium_threshold: default_medium_threshold(),
			concurrent_capacity: default_capacity(),
		}
	}
}

/// Payment reconciliation policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentsConfig {
	/// Largest |amount - total| still considered a match.
	#[serde(default = "default_tolerance")]
	pub discrepancy_tolerance: Decimal,
	/// Failed payments younger than this are refunded automatically.
	#[serde(default = "default_refund_window")]
	pub auto_refund_window_hours: u32,
	/// Pending payments older than this produce a reminder.
	#[serde(default = "default_reminder_after")]
	pub reminder_after_minutes: u32,
	#[serde(default = "default_invoice_prefix")]
	pub invoice_prefix: String,
}

fn default_tolerance() -> Decimal {
	Decimal::new(1, 2)
}

fn default_refund_window() -> u32 {
	24
}

fn default_reminder_after() -> u32 {
	60
}

fn default_invoice_prefix() -> String {
	"INV".to_string()
}

impl Default for PaymentsConfig {
	fn default() -> Self {
		Self {
			discrepancy_tolerance: default_tolerance(),
			auto_refund_window_hours: default_refund_window(),
			reminder_after_minutes: default_reminder_after(),
			invoice_prefix: default_invoice_prefix(),
		}
	}
}

/// Moving-average forecast constants.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForecastConfig {
	#[serde(default = "default_window_days")]
	pub window_days: u32,
	#[serde(default = "default_inc_7d")]
	pub increasing_bump_7d: Decimal,
	#[serde(default = "default_inc_30d")]
	pub increasing_bump_30d: Decimal,
	#[serde(default = "default_dec_7d")]
	pub decreasing_bump_7d: Decimal,
	#[serde(default = "default_dec_30d")]
	pub decreasing_bump_30d: Decimal,
}

fn default_window_days() -> u32 {
	30
}

fn default_inc_7d() -> Decimal {
	Decimal::new(10, 2)
}

fn default_inc_30d() -> Decimal {
	Decimal::new(15, 2)
}

fn default_dec_7d() -> Decimal {
	Decimal::new(-5, 2)
}

fn default_dec_30d() -> Decimal {
	Decimal::new(-10, 2)
}

impl Default for ForecastConfig {
	fn default() -> Self {
		Self {
			window_days: default_window_days(),
			increasing_bump_7d: default_inc_7d(),
			increasing_bump_30d: default_inc_30d(),
			decreasing_bump_7d: default_dec_7d(),
			decreasing_bump_30d: default_dec_30d(),
		}
	}
}

/// Courier fee schedule: a flat fee plus a per-kilometre rate.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryFeeConfig {
	#[serde(default = "default_base_fee")]
	pub base_fee: Decimal,
	#[serde(default = "default_per_km_fee")]
	pub per_km_fee: Decimal,
}

fn default_base_fee() -> Decimal {
	Decimal::new(300, 2)
}

fn default_per_km_fee() -> Decimal {
	Decimal::new(50, 2)
}

impl Default for DeliveryFeeConfig {
	fn default() -> Self {
		Self {
			base_fee: default_base_fee(),
			per_km_fee: default_per_km_fee(),
		}
	}
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_api_host")]
	pub host: String,
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_api_timeout() -> u64 {
	30
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of VAR_NAME and supports defaults
/// with `${VAR_NAME:-default_value}`. Input is limited to 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut missing = None;
	let resolved = re.replace_all(input, |caps: &regex::Captures<'_>| {
		let var_name = &caps[1];
		match (std::env::var(var_name), caps.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				missing.get_or_insert_with(|| var_name.to_string());
				String::new()
			},
		}
	});

	if let Some(var_name) = missing {
		return Err(ConfigError::Validation(format!(
			"Environment variable '{}' not found",
			var_name
		)));
	}

	Ok(resolved.into_owned())
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Looks up a configured store.
	pub fn store(&self, store_id: &str) -> Option<&StoreConfig> {
		self.stores.iter().find(|s| s.id == store_id)
	}

	/// Validates the configuration as a whole.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		// Storage
		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}
		if self.storage.cleanup_interval_seconds == 0
			|| self.storage.cleanup_interval_seconds > 86400
		{
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds must be between 1 and 86400".into(),
			));
		}

		// Settlement
		if !self
			.settlement
			.implementations
			.contains_key(&self.settlement.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary settlement '{}' not found in implementations",
				self.settlement.primary
			)));
		}
		if !(1..=300).contains(&self.settlement.timeout_seconds) {
			return Err(ConfigError::Validation(
				"Settlement timeout_seconds must be between 1 and 300".into(),
			));
		}

		// Stores
		if self.stores.is_empty() {
			return Err(ConfigError::Validation(
				"At least one store must be configured".into(),
			));
		}
		let mut seen = HashSet::new();
		for store in &self.stores {
			if store.id.is_empty() {
				return Err(ConfigError::Validation("Store ID cannot be empty".into()));
			}
			if !seen.insert(store.id.as_str()) {
				return Err(ConfigError::Validation(format!(
					"Duplicate store '{}'",
					store.id
				)));
			}
			if !(1..=24).contains(&store.operating_hours) {
				return Err(ConfigError::Validation(format!(
					"Store '{}' operating_hours must be between 1 and 24",
					store.id
				)));
			}
		}

		// Kitchen
		if self.kitchen.low_threshold < 0.0
			|| self.kitchen.low_threshold > self.kitchen.medium_threshold
		{
			return Err(ConfigError::Validation(
				"Kitchen thresholds must satisfy 0 <= low_threshold <= medium_threshold".into(),
			));
		}
		if self.kitchen.concurrent_capacity == 0 {
			return Err(ConfigError::Validation(
				"Kitchen concurrent_capacity must be at least 1".into(),
			));
		}

		// Payments
		if self.payments.discrepancy_tolerance.is_sign_negative() {
			return Err(ConfigError::Validation(
				"Payments discrepancy_tolerance cannot be negative".into(),
			));
		}
		if self.payments.invoice_prefix.is_empty() {
			return Err(ConfigError::Validation(
				"Payments invoice_prefix cannot be empty".into(),
			));
		}

		// Forecast needs two full weeks for the trend comparison
		if self.forecast.window_days < 14 {
			return Err(ConfigError::Validation(
				"Forecast window_days must be at least 14".into(),
			));
		}

		// Delivery fees
		if self.delivery.base_fee.is_sign_negative() || self.delivery.per_km_fee.is_sign_negative()
		{
			return Err(ConfigError::Validation(
				"Delivery fees cannot be negative".into(),
			));
		}

		Ok(())
	}
}

/// Parses configuration from a TOML string.
///
/// Environment variables are resolved and the configuration is validated
/// after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const BASE: &str = r#"
[service]
id = "fulfillment-test"

[storage]
primary = "memory"
[storage.implementations.memory]

[settlement]
primary = "fixed"
[settlement.implementations.fixed]
outcome = "success"

[[stores]]
id = "downtown"
name = "Downtown"
"#;

	#[test]
	fn test_minimal_config_uses_defaults() {
		let config = Config::from_str(BASE).unwrap();
		assert_eq!(config.sla.delivery_buffer_minutes, 15);
		assert!(!config.sla.estimate_on_creation);
		assert_eq!(config.kitchen.low_threshold, 10.0);
		assert_eq!(config.kitchen.medium_threshold, 15.0);
		assert_eq!(config.kitchen.concurrent_capacity, 1);
		assert_eq!(config.payments.discrepancy_tolerance, Decimal::new(1, 2));
		assert_eq!(config.payments.auto_refund_window_hours, 24);
		assert_eq!(config.forecast.window_days, 30);
		assert_eq!(config.forecast.decreasing_bump_30d, Decimal::new(-10, 2));
		assert_eq!(config.settlement.timeout_seconds, 10);
		assert_eq!(config.store("downtown").unwrap().operating_hours, 12);
		assert_eq!(config.store("downtown").unwrap().order_prefix(), "DOWNTOWN");
		assert!(config.api.is_none());
	}

	#[test]
	fn test_decimal_values_parse_from_strings() {
		let config_str = format!(
			"{}\n[delivery]\nbase_fee = \"2.75\"\nper_km_fee = \"0.40\"\n",
			BASE
		);
		let config = Config::from_str(&config_str).unwrap();
		assert_eq!(config.delivery.base_fee, Decimal::new(275, 2));
		assert_eq!(config.delivery.per_km_fee, Decimal::new(40, 2));
	}

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("FULFILLMENT_TEST_VAR", "test_value");
		std::env::set_var("FULFILLMENT_TEST_PORT", "8080");

		let input = "host = \"${FULFILLMENT_TEST_VAR}:${FULFILLMENT_TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"test_value:8080\"");

		std::env::remove_var("FULFILLMENT_TEST_VAR");
		std::env::remove_var("FULFILLMENT_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${FULFILLMENT_MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${FULFILLMENT_MISSING_VAR_NO_DEFAULT}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result
			.unwrap_err()
			.to_string()
			.contains("FULFILLMENT_MISSING_VAR_NO_DEFAULT"));
	}

	#[test]
	fn test_duplicate_store_rejected() {
		let config_str = format!("{}\n[[stores]]\nid = \"downtown\"\nname = \"Again\"\n", BASE);
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err.to_string().contains("Duplicate store 'downtown'"));
	}

	#[test]
	fn test_unknown_primary_settlement_rejected() {
		let config_str = BASE.replace("primary = \"fixed\"", "primary = \"gateway\"");
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err
			.to_string()
			.contains("Primary settlement 'gateway' not found"));
	}

	#[test]
	fn test_inverted_kitchen_thresholds_rejected() {
		let config_str = format!(
			"{}\n[kitchen]\nlow_threshold = 20\nmedium_threshold = 15\n",
			BASE
		);
		assert!(Config::from_str(&config_str).is_err());
	}

	#[test]
	fn test_short_forecast_window_rejected() {
		let config_str = format!("{}\n[forecast]\nwindow_days = 7\n", BASE);
		let err = Config::from_str(&config_str).unwrap_err();
		assert!(err.to_string().contains("at least 14"));
	}

	#[test]
	fn test_operating_hours_out_of_range() {
		let config_str = format!(
			"{}\n[[stores]]\nid = \"airport\"\nname = \"Airport\"\noperating_hours = 25\n",
			BASE
		);
		assert!(Config::from_str(&config_str).is_err());
	}
}

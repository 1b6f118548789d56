//! Settlement that always gives the same answer.
//!
//! Used for tests and local runs where every scenario has to be
//! deterministic.

use crate::{SettlementError, SettlementInterface, SettlementOutcome};
use async_trait::async_trait;
use fulfillment_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Payment, Schema, ValidationError,
};
use std::time::Duration;

pub struct FixedSettlement {
	approve: bool,
	reason: String,
	delay: Duration,
}

impl FixedSettlement {
	pub fn approving() -> Self {
		Self {
			approve: true,
			reason: String::new(),
			delay: Duration::ZERO,
		}
	}

	pub fn declining(reason: impl Into<String>) -> Self {
		Self {
			approve: false,
			reason: reason.into(),
			delay: Duration::ZERO,
		}
	}

	/// Waits this long before answering.
	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = delay;
		self
	}
}

#[async_trait]
impl SettlementInterface for FixedSettlement {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FixedSettlementSchema)
	}

	async fn settle(&self, payment: &Payment) -> Result<SettlementOutcome, SettlementError> {
		if !self.delay.is_zero() {
			tokio::time::sleep(self.delay).await;
		}

		if self.approve {
			Ok(SettlementOutcome::Approved {
				reference: format!("fixed_{}", payment.id),
			})
		} else {
			Ok(SettlementOutcome::Declined {
				reason: self.reason.clone(),
			})
		}
	}
}

pub struct FixedSettlementSchema;

impl ConfigSchema for FixedSettlementSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("outcome", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some("success") | Some("failure") => Ok(()),
						_ => Err("outcome must be \"success\" or \"failure\"".to_string()),
					}
				}),
			],
			vec![
				Field::new("reason", FieldType::String),
				Field::new(
					"delay_ms",
					FieldType::Integer {
						min: Some(0),
						max: Some(600_000),
					},
				),
			],
		);
		schema.validate(config)
	}
}

/// Creates a fixed settlement.
///
/// - `outcome`: `"success"` or `"failure"`
/// - `reason`: decline reason (default `"declined"`)
/// - `delay_ms`: artificial latency (default 0)
pub fn create_settlement(
	config: &toml::Value,
) -> Result<Box<dyn SettlementInterface>, SettlementError> {
	FixedSettlementSchema
		.validate(config)
		.map_err(|e| SettlementError::Configuration(format!("Invalid configuration: {}", e)))?;

	let reason = config
		.get("reason")
		.and_then(|v| v.as_str())
		.unwrap_or("declined");
	let settlement = match config.get("outcome").and_then(|v| v.as_str()) {
		Some("success") => FixedSettlement::approving(),
		_ => FixedSettlement::declining(reason),
	};
	let delay_ms = config
		.get("delay_ms")
		.and_then(|v| v.as_integer())
		.unwrap_or(0) as u64;

	Ok(Box::new(settlement.with_delay(Duration::from_millis(delay_ms))))
}

/// Registry for the fixed settlement implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "fixed";
	type Factory = crate::SettlementFactory;

	fn factory() -> Self::Factory {
		create_settlement
	}
}

impl crate::SettlementRegistry for Registry {}

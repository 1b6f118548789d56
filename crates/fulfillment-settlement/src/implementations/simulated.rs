//! Settlement that approves a configurable share of payments at random.
//!
//! Stands in for a real processor in demos. Outcomes are independent per
//! call.

use crate::{SettlementError, SettlementInterface, SettlementOutcome};
use async_trait::async_trait;
use fulfillment_types::{
	truncate_id, ConfigSchema, Field, FieldType, ImplementationRegistry, Payment, Schema,
	ValidationError,
};
use rand::Rng;
use std::time::Duration;

pub struct SimulatedSettlement {
	success_rate: f64,
	latency: Duration,
}

impl SimulatedSettlement {
	pub fn new(success_rate: f64, latency: Duration) -> Self {
		Self {
			success_rate: success_rate.clamp(0.0, 1.0),
			latency,
		}
	}
}

#[async_trait]
impl SettlementInterface for SimulatedSettlement {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(SimulatedSettlementSchema)
	}

	async fn settle(&self, payment: &Payment) -> Result<SettlementOutcome, SettlementError> {
		if !self.latency.is_zero() {
			tokio::time::sleep(self.latency).await;
		}

		let approved = rand::thread_rng().gen_bool(self.success_rate);
		tracing::debug!(
			payment_id = %truncate_id(&payment.id),
			approved,
			"Simulated settlement decided"
		);

		if approved {
			Ok(SettlementOutcome::Approved {
				reference: format!("sim_{}", uuid::Uuid::new_v4().simple()),
			})
		} else {
			Ok(SettlementOutcome::Declined {
				reason: "Payment declined by processor".to_string(),
			})
		}
	}
}

pub struct SimulatedSettlementSchema;

impl ConfigSchema for SimulatedSettlementSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new(
					"success_rate",
					FieldType::Float {
						min: Some(0.0),
						max: Some(1.0),
					},
				),
				Field::new(
					"latency_ms",
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

/// Creates a simulated settlement.
///
/// - `success_rate`: probability of approval, 0.0 to 1.0 (default 0.9)
/// - `latency_ms`: artificial latency per call (default 0)
pub fn create_settlement(
	config: &toml::Value,
) -> Result<Box<dyn SettlementInterface>, SettlementError> {
	SimulatedSettlementSchema
		.validate(config)
		.map_err(|e| SettlementError::Configuration(format!("Invalid configuration: {}", e)))?;

	let success_rate = config
		.get("success_rate")
		.and_then(|v| v.as_float().or_else(|| v.as_integer().map(|i| i as f64)))
		.unwrap_or(0.9);
	let latency_ms = config
		.get("latency_ms")
		.and_then(|v| v.as_integer())
		.unwrap_or(0) as u64;

	Ok(Box::new(SimulatedSettlement::new(
		success_rate,
		Duration::from_millis(latency_ms),
	)))
}

/// Registry for the simulated settlement implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "simulated";
	type Factory = crate::SettlementFactory;

	fn factory() -> Self::Factory {
		create_settlement
	}
}

impl crate::SettlementRegistry for Registry {}

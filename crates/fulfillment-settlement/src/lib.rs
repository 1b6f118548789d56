//! Settlement module for the fulfillment service.
//!
//! A payment is captured by an external collaborator (a card processor, a
//! wallet provider) that either approves or declines it. This crate defines
//! that collaborator as [`SettlementInterface`] and wraps the configured
//! implementation in a [`SettlementService`] that bounds every call with a
//! timeout.

use async_trait::async_trait;
use fulfillment_types::{truncate_id, ConfigSchema, ImplementationRegistry, Payment};
use std::time::Duration;
use thiserror::Error;

pub mod implementations {
	pub mod fixed;
	pub mod simulated;
}

/// Errors that can occur during settlement operations.
#[derive(Debug, Error)]
pub enum SettlementError {
	/// The collaborator did not answer within the configured timeout.
	#[error("Settlement timed out after {0:?}")]
	Timeout(Duration),
	/// The collaborator could not be reached or answered with an error.
	#[error("Settlement gateway error: {0}")]
	Gateway(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Answer from the settlement collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
	/// Funds were captured; `reference` identifies the capture upstream.
	Approved { reference: String },
	/// The collaborator refused the payment.
	Declined { reason: String },
}

impl SettlementOutcome {
	pub fn is_approved(&self) -> bool {
		matches!(self, SettlementOutcome::Approved { .. })
	}
}

/// External settlement collaborator.
#[async_trait]
pub trait SettlementInterface: Send + Sync {
	/// Returns the configuration schema for this implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Attempts to capture the payment.
	async fn settle(&self, payment: &Payment) -> Result<SettlementOutcome, SettlementError>;
}

/// Factory signature every settlement implementation provides.
pub type SettlementFactory =
	fn(&toml::Value) -> Result<Box<dyn SettlementInterface>, SettlementError>;

/// Registry trait for settlement implementations.
pub trait SettlementRegistry: ImplementationRegistry<Factory = SettlementFactory> {}

/// Get all registered settlement implementations as `(name, factory)` pairs.
pub fn get_all_implementations() -> Vec<(&'static str, SettlementFactory)> {
	use implementations::{fixed, simulated};

	vec![
		(fixed::Registry::NAME, fixed::Registry::factory()),
		(simulated::Registry::NAME, simulated::Registry::factory()),
	]
}

/// Runs settlement calls against the configured collaborator.
pub struct SettlementService {
	implementation: Box<dyn SettlementInterface>,
	timeout: Duration,
}

impl SettlementService {
	pub fn new(implementation: Box<dyn SettlementInterface>, timeout: Duration) -> Self {
		Self {
			implementation,
			timeout,
		}
	}

	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	/// Settles a payment, giving up after the configured timeout.
	///
	/// A timeout is reported as [`SettlementError::Timeout`]; callers treat it
	/// like any other failed settlement.
	pub async fn settle(&self, payment: &Payment) -> Result<SettlementOutcome, SettlementError> {
		match tokio::time::timeout(self.timeout, self.implementation.settle(payment)).await {
			Ok(result) => result,
			Err(_) => {
				tracing::warn!(
					payment_id = %truncate_id(&payment.id),
					timeout_ms = self.timeout.as_millis() as u64,
					"Settlement call timed out"
				);
				Err(SettlementError::Timeout(self.timeout))
			},
		}
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use implementations::fixed::FixedSettlement;
	use test_support::pending_payment;

	#[tokio::test(start_paused = true)]
	async fn test_slow_collaborator_times_out() {
		let slow = FixedSettlement::approving().with_delay(Duration::from_secs(30));
		let service = SettlementService::new(Box::new(slow), Duration::from_secs(10));

		let result = service.settle(&pending_payment("p-1")).await;
		assert!(matches!(result, Err(SettlementError::Timeout(d)) if d == Duration::from_secs(10)));
	}

	#[tokio::test(start_paused = true)]
	async fn test_fast_collaborator_passes_through() {
		let quick = FixedSettlement::declining("insufficient funds")
			.with_delay(Duration::from_secs(2));
		let service = SettlementService::new(Box::new(quick), Duration::from_secs(10));

		let outcome = service.settle(&pending_payment("p-2")).await.unwrap();
		assert_eq!(
			outcome,
			SettlementOutcome::Declined {
				reason: "insufficient funds".to_string()
			}
		);
	}

	#[test]
	fn test_all_implementations_registered() {
		let names: Vec<_> = get_all_implementations()
			.into_iter()
			.map(|(name, _)| name)
			.collect();
		assert_eq!(names, vec!["fixed", "simulated"]);
	}
}

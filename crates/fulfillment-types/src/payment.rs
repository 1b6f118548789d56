//! Payment types.
//!
//! A payment is linked to exactly one order but is its own aggregate: it can
//! fail, be refunded or be reconciled independently of the order's status.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A payment captured for an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
	pub id: String,
	/// The single order this payment belongs to.
	pub order_id: String,
	/// Copied from the order when the payment is recorded, for store queries.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub store_id: Option<String>,
	pub amount: Decimal,
	/// ISO 4217 currency code.
	pub currency: String,
	pub method: PaymentMethod,
	pub status: PaymentStatus,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub settled_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refunded_at: Option<DateTime<Utc>>,
	/// Reason reported by the settlement collaborator on failure.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub failure_reason: Option<String>,
	/// Set once the amount has been matched against the order total.
	#[serde(default)]
	pub reconciled: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reconciled_at: Option<DateTime<Utc>>,
	/// Set when the linked order was cancelled or refunded after capture.
	#[serde(default)]
	pub refund_eligible: bool,
	pub version: u64,
}

impl Payment {
	/// Time elapsed since the payment was created.
	pub fn age(&self, now: DateTime<Utc>) -> Duration {
		now - self.created_at
	}

	pub fn belongs_to_store(&self, store_id: &str) -> bool {
		self.store_id.as_deref() == Some(store_id)
	}
}

/// Input for recording a payment against an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPayment {
	pub order_id: String,
	pub amount: Decimal,
	#[serde(default = "default_currency")]
	pub currency: String,
	pub method: PaymentMethod,
}

fn default_currency() -> String {
	"USD".to_string()
}

/// Payment methods accepted at checkout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
	Card,
	Wallet,
	CashOnDelivery,
	DigitalWallet,
	BankTransfer,
}

/// Status of a payment.
///
/// `Pending -> Completed | Failed`, `Completed -> Refunded`,
/// `Failed -> Refunded`. No other edges exist.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
	#[default]
	Pending,
	Completed,
	Failed,
	Refunded,
}

impl PaymentStatus {
	pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
		matches!(
			(self, next),
			(PaymentStatus::Pending, PaymentStatus::Completed)
				| (PaymentStatus::Pending, PaymentStatus::Failed)
				| (PaymentStatus::Completed, PaymentStatus::Refunded)
				| (PaymentStatus::Failed, PaymentStatus::Refunded)
		)
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			PaymentStatus::Pending => "PENDING",
			PaymentStatus::Completed => "COMPLETED",
			PaymentStatus::Failed => "FAILED",
			PaymentStatus::Refunded => "REFUNDED",
		}
	}
}

impl fmt::Display for PaymentStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

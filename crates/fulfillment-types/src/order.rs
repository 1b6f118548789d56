//! Order types for the fulfillment lifecycle.
//!
//! An order is created at checkout completion, mutated only through the order
//! state machine and never deleted. It owns its line items and at most one
//! active delivery assignment.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{money_tolerance, PaymentStatus};

/// A customer order moving through the fulfillment lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
	/// Unique identifier for this order.
	pub id: String,
	/// Human-readable, store-scoped order number (e.g. "DT-000042").
	pub order_number: String,
	/// Customer who placed the order.
	pub customer_id: String,
	/// Store fulfilling the order, if one has been assigned.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub store_id: Option<String>,
	/// Current lifecycle status.
	pub status: OrderStatus,
	/// Mirror of the linked payment's status.
	pub payment_status: PaymentStatus,
	/// Ordered line items.
	pub items: Vec<LineItem>,
	pub subtotal: Decimal,
	pub tax: Decimal,
	pub delivery_fee: Decimal,
	pub total: Decimal,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	/// Promised delivery time, unset until an estimate has been computed.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub estimated_delivery: Option<DateTime<Utc>>,
	/// Set only by the transition to `DELIVERED`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub actual_delivery: Option<DateTime<Utc>>,
	/// Courier assignment while the order is in the delivery-capable range.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub delivery: Option<DeliveryAssignment>,
	/// Incremented on every persisted write.
	pub version: u64,
}

impl Order {
	/// Sum of every line item's preparation time.
	///
	/// Items are prepared one after another on a single kitchen queue, so the
	/// times add up rather than overlap.
	pub fn aggregate_prep_time(&self) -> Option<Duration> {
		self.items
			.iter()
			.try_fold(Duration::zero(), |acc, item| acc.checked_add(&item.prep_time()?))
	}

	/// Checks `total == subtotal + tax + delivery_fee` within tolerance.
	pub fn totals_balance(&self) -> bool {
		let expected = self.subtotal + self.tax + self.delivery_fee;
		(self.total - expected).abs() <= money_tolerance()
	}

	/// Courier currently assigned to the order, if any.
	pub fn courier_id(&self) -> Option<&str> {
		self.delivery.as_ref().map(|d| d.courier_id.as_str())
	}

	pub fn belongs_to_store(&self, store_id: &str) -> bool {
		self.store_id.as_deref() == Some(store_id)
	}
}

/// Largest quantity accepted on a single line item.
pub const MAX_LINE_QUANTITY: u32 = 1_000;

/// Largest per-unit preparation time accepted, in minutes (one day).
pub const MAX_PREP_MINUTES: u32 = 24 * 60;

/// A single line of an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
	/// Reference into the external menu catalog.
	pub menu_item_id: String,
	pub quantity: u32,
	pub unit_price: Decimal,
	/// Preparation time for one unit, in minutes.
	pub prep_minutes: u32,
}

impl LineItem {
	/// Preparation time for the whole line (per-unit time times quantity).
	///
	/// `None` when the product does not fit in a `Duration`.
	pub fn prep_time(&self) -> Option<Duration> {
		i64::from(self.prep_minutes)
			.checked_mul(i64::from(self.quantity))
			.and_then(Duration::try_minutes)
	}

	pub fn line_total(&self) -> Decimal {
		self.unit_price * Decimal::from(self.quantity)
	}
}

/// Courier assignment attached to an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAssignment {
	pub courier_id: String,
	pub assigned_at: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub picked_up_at: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub delivered_at: Option<DateTime<Utc>>,
	/// Route distance in kilometres as reported by the dispatcher.
	pub distance_km: Decimal,
	/// Courier earnings from the flat-plus-distance fee schedule.
	pub earnings: Decimal,
}

/// Input for placing a new order at checkout completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
	pub customer_id: String,
	pub store_id: String,
	pub items: Vec<LineItem>,
	pub subtotal: Decimal,
	pub tax: Decimal,
	pub delivery_fee: Decimal,
	pub total: Decimal,
}

/// Status of an order in the fulfillment lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
	/// Order placed, waiting for the store to accept it.
	Pending,
	/// Store accepted the order.
	Accepted,
	/// Kitchen is preparing the order.
	Preparing,
	/// Food is ready and waiting for a courier.
	ReadyForPickup,
	/// Courier has picked the order up.
	OutForDelivery,
	/// Order handed to the customer.
	Delivered,
	/// Order cancelled before delivery.
	Cancelled,
	/// Order refunded.
	Refunded,
}

impl OrderStatus {
	pub const ALL: [OrderStatus; 8] = [
		OrderStatus::Pending,
		OrderStatus::Accepted,
		OrderStatus::Preparing,
		OrderStatus::ReadyForPickup,
		OrderStatus::OutForDelivery,
		OrderStatus::Delivered,
		OrderStatus::Cancelled,
		OrderStatus::Refunded,
	];

	/// No transition leaves a terminal status.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Refunded
		)
	}

	/// Statuses that occupy the kitchen queue.
	pub fn is_in_kitchen(&self) -> bool {
		matches!(self, OrderStatus::Accepted | OrderStatus::Preparing)
	}

	/// Statuses in which a courier assignment may be created.
	pub fn accepts_courier(&self) -> bool {
		matches!(
			self,
			OrderStatus::Accepted | OrderStatus::Preparing | OrderStatus::ReadyForPickup
		)
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Pending => "PENDING",
			OrderStatus::Accepted => "ACCEPTED",
			OrderStatus::Preparing => "PREPARING",
			OrderStatus::ReadyForPickup => "READY_FOR_PICKUP",
			OrderStatus::OutForDelivery => "OUT_FOR_DELIVERY",
			OrderStatus::Delivered => "DELIVERED",
			OrderStatus::Cancelled => "CANCELLED",
			OrderStatus::Refunded => "REFUNDED",
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for OrderStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
		OrderStatus::ALL
			.into_iter()
			.find(|status| status.as_str() == normalized)
			.ok_or_else(|| format!("Unknown order status: {}", s))
	}
}

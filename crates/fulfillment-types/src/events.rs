//! Event types for inter-service communication.
//!
//! Events flow through the core's event bus so that the service layer (and any
//! future notifier) can react to state changes without the state machines
//! knowing about them.

use crate::{Discrepancy, OrderStatus, Role};
use serde::{Deserialize, Serialize};

/// Main event type encompassing all fulfillment events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FulfillmentEvent {
	Order(OrderEvent),
	Payment(PaymentEvent),
}

/// Events related to the order lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderEvent {
	Placed {
		order_id: String,
		store_id: String,
	},
	Transitioned {
		order_id: String,
		from: OrderStatus,
		to: OrderStatus,
		role: Role,
	},
	CourierAssigned {
		order_id: String,
		courier_id: String,
	},
}

/// Events related to payments and reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PaymentEvent {
	Recorded {
		payment_id: String,
		order_id: String,
	},
	Settled {
		payment_id: String,
		order_id: String,
	},
	SettlementFailed {
		payment_id: String,
		order_id: String,
		reason: String,
	},
	/// The linked order was cancelled or refunded after capture.
	RefundEligible {
		payment_id: String,
		order_id: String,
	},
	Refunded {
		payment_id: String,
		order_id: String,
	},
	DiscrepancyDetected(Discrepancy),
	InvoiceIssued {
		invoice_number: String,
		customer_id: String,
	},
}

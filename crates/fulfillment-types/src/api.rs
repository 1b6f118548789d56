//! Record shapes returned by the fulfillment operations.
//!
//! Every operation returns one of these fixed shapes; they serialize with
//! camelCase field names for the HTTP API.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{OrderStatus, Role};

/// SLA view of a single order at a given instant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlaReport {
	pub order_id: String,
	pub status: OrderStatus,
	pub estimated_delivery: Option<DateTime<Utc>>,
	/// Seconds until the deadline; zero or negative once it has passed.
	pub time_remaining_seconds: Option<i64>,
	pub overdue: bool,
}

/// Coarse classification of kitchen queue pressure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkloadLevel {
	Low,
	Medium,
	High,
}

/// Kitchen workload snapshot for one store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KitchenWorkload {
	pub store_id: String,
	/// Orders currently `ACCEPTED` or `PREPARING`.
	pub active_orders: usize,
	pub total_prep_minutes: i64,
	pub avg_prep_minutes: f64,
	/// Orders created on the same calendar day.
	pub orders_today: usize,
	pub orders_per_hour: f64,
	pub workload_level: WorkloadLevel,
	pub estimated_completion_time: DateTime<Utc>,
}

/// A payment whose amount does not match its order total.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Discrepancy {
	pub payment_id: String,
	pub order_id: String,
	pub order_total: Decimal,
	pub payment_amount: Decimal,
	/// `payment_amount - order_total`.
	pub delta: Decimal,
}

/// An entity a batch operation could not process, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntityFailure {
	pub id: String,
	pub reason: String,
}

/// Result of reconciling a store's payments.
///
/// `reconciled + discrepancies.len() == total`; payments that could not be
/// compared at all are listed in `failures` and are not part of `total`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
	pub reconciled: usize,
	pub discrepancies: Vec<Discrepancy>,
	pub total: usize,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub failures: Vec<EntityFailure>,
}

/// Result of settling a store's pending payments.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettlementBatchReport {
	/// Payments that settled and are now `COMPLETED`.
	pub processed: usize,
	/// Payments that could not be settled; each is listed in `failures`.
	pub failed: usize,
	pub total: usize,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub failures: Vec<EntityFailure>,
}

/// Result of a refund batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RefundReport {
	pub refunded: usize,
	/// Candidates inspected, including those left for manual review.
	pub total: usize,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub refunded_ids: Vec<String>,
	/// Failed payments outside the automatic refund window.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub manual_review: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub failures: Vec<EntityFailure>,
}

/// Reminder for a payment that has been pending too long.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReminder {
	pub payment_id: String,
	pub order_id: String,
	pub amount: Decimal,
	pub currency: String,
	pub pending_minutes: i64,
	pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReminderReport {
	pub sent: usize,
	pub reminders: Vec<PaymentReminder>,
}

/// Monthly invoice for one customer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
	/// `INV_<year><month>_<6 base36 upper>`.
	pub invoice_number: String,
	pub customer_id: String,
	pub store_id: String,
	pub order_ids: Vec<String>,
	pub order_count: usize,
	pub total: Decimal,
	pub period_start: DateTime<Utc>,
	pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceBatch {
	pub generated: usize,
	pub invoices: Vec<Invoice>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub failures: Vec<EntityFailure>,
}

/// Direction of recent revenue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
	Increasing,
	Decreasing,
	Stable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyRevenue {
	pub date: NaiveDate,
	pub total: Decimal,
}

/// Moving-average revenue projection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RevenueForecast {
	pub store_id: String,
	pub next_7_days: Decimal,
	pub next_30_days: Decimal,
	pub avg_daily_revenue: Decimal,
	pub trend: Trend,
	/// Mean of the last 7 days minus mean of the 7 days before.
	pub trend_delta: Decimal,
	pub window_days: u32,
	pub daily_totals: Vec<DailyRevenue>,
}

/// Earnings of a courier over delivered orders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourierEarnings {
	pub courier_id: String,
	pub deliveries: usize,
	pub total_earnings: Decimal,
	pub since: DateTime<Utc>,
}

/// Request body for an order transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
	/// Status the caller last observed.
	pub from: OrderStatus,
	pub target: OrderStatus,
	pub role: Role,
	/// Version the caller last observed; a mismatch is a stale update.
	#[serde(default)]
	pub expected_version: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignCourierRequest {
	pub courier_id: String,
	pub distance_km: Decimal,
}

/// Error body returned by the HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Machine-readable code, e.g. `INVALID_TRANSITION`.
	pub error: String,
	pub message: String,
}

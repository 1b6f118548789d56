//! Store-scoped endpoints: listings, workload, forecast and the payment batch
//! jobs, plus courier earnings.

use super::{ApiError, ApiResult};
use crate::server::AppState;
use axum::{
	extract::{Path, Query, State},
	Json,
};
use chrono::{DateTime, Duration, Utc};
use fulfillment_types::{
	CourierEarnings, InvoiceBatch, KitchenWorkload, Order, OrderStatus, ReconciliationReport,
	RefundReport, ReminderReport, RevenueForecast, SettlementBatchReport, SlaReport,
};
use serde::Deserialize;

/// Earnings window used when the caller gives no `since`.
const DEFAULT_EARNINGS_DAYS: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
	pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EarningsQuery {
	pub since: Option<DateTime<Utc>>,
}

/// GET /api/stores/{id}/orders?status=
pub async fn list_orders(
	Path(store_id): Path<String>,
	Query(query): Query<ListOrdersQuery>,
	State(state): State<AppState>,
) -> ApiResult<Vec<Order>> {
	let status = query
		.status
		.as_deref()
		.map(str::parse::<OrderStatus>)
		.transpose()
		.map_err(ApiError::BadRequest)?;
	Ok(Json(state.engine.list_orders(&store_id, status).await?))
}

/// GET /api/stores/{id}/orders/overdue
pub async fn list_overdue_orders(
	Path(store_id): Path<String>,
	State(state): State<AppState>,
) -> ApiResult<Vec<SlaReport>> {
	let now = state.engine.now();
	Ok(Json(state.engine.list_overdue_orders(&store_id, now).await?))
}

/// GET /api/stores/{id}/kitchen
pub async fn kitchen_workload(
	Path(store_id): Path<String>,
	State(state): State<AppState>,
) -> ApiResult<KitchenWorkload> {
	let now = state.engine.now();
	Ok(Json(state.engine.get_kitchen_workload(&store_id, now).await?))
}

/// GET /api/stores/{id}/forecast
pub async fn revenue_forecast(
	Path(store_id): Path<String>,
	State(state): State<AppState>,
) -> ApiResult<RevenueForecast> {
	Ok(Json(state.engine.get_revenue_forecast(&store_id).await?))
}

/// POST /api/stores/{id}/payments/process
pub async fn process_pending_payments(
	Path(store_id): Path<String>,
	State(state): State<AppState>,
) -> ApiResult<SettlementBatchReport> {
	Ok(Json(state.engine.process_pending_payments(&store_id).await?))
}

/// POST /api/stores/{id}/payments/reconcile
pub async fn reconcile_payments(
	Path(store_id): Path<String>,
	State(state): State<AppState>,
) -> ApiResult<ReconciliationReport> {
	Ok(Json(state.engine.reconcile_payments(&store_id).await?))
}

/// POST /api/stores/{id}/payments/auto-refund
pub async fn auto_refund_failed_payments(
	Path(store_id): Path<String>,
	State(state): State<AppState>,
) -> ApiResult<RefundReport> {
	Ok(Json(state.engine.auto_refund_failed_payments(&store_id).await?))
}

/// POST /api/stores/{id}/payments/refunds
pub async fn process_eligible_refunds(
	Path(store_id): Path<String>,
	State(state): State<AppState>,
) -> ApiResult<RefundReport> {
	Ok(Json(state.engine.process_eligible_refunds(&store_id).await?))
}

/// POST /api/stores/{id}/payments/reminders
pub async fn send_pending_reminders(
	Path(store_id): Path<String>,
	State(state): State<AppState>,
) -> ApiResult<ReminderReport> {
	Ok(Json(state.engine.send_pending_reminders(&store_id).await?))
}

/// POST /api/stores/{id}/invoices
pub async fn generate_invoices(
	Path(store_id): Path<String>,
	State(state): State<AppState>,
) -> ApiResult<InvoiceBatch> {
	Ok(Json(state.engine.generate_invoices(&store_id).await?))
}

/// GET /api/couriers/{id}/earnings?since=
pub async fn courier_earnings(
	Path(courier_id): Path<String>,
	Query(query): Query<EarningsQuery>,
	State(state): State<AppState>,
) -> ApiResult<CourierEarnings> {
	let since = query
		.since
		.unwrap_or_else(|| state.engine.now() - Duration::days(DEFAULT_EARNINGS_DAYS));
	Ok(Json(state.engine.courier_earnings(&courier_id, since).await?))
}

//! HTTP server for the fulfillment API.

use crate::apis::{order, payment, store};
use axum::{
	routing::{get, post},
	Router,
};
use fulfillment_config::ApiConfig;
use fulfillment_core::FulfillmentEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<FulfillmentEngine>,
}

/// Builds the API router with every route mounted under `/api`.
pub fn router(engine: Arc<FulfillmentEngine>, timeout: Duration) -> Router {
	let api = Router::new()
		.route("/orders", post(order::place_order))
		.route("/orders/{id}", get(order::get_order))
		.route("/orders/{id}/transition", post(order::transition_order))
		.route("/orders/{id}/courier", post(order::assign_courier))
		.route("/orders/{id}/sla", get(order::get_order_sla))
		.route("/orders/{id}/payment", get(order::get_order_payment))
		.route("/payments", post(payment::record_payment))
		.route("/payments/{id}", get(payment::get_payment))
		.route("/stores/{id}/orders", get(store::list_orders))
		.route("/stores/{id}/orders/overdue", get(store::list_overdue_orders))
		.route("/stores/{id}/kitchen", get(store::kitchen_workload))
		.route("/stores/{id}/forecast", get(store::revenue_forecast))
		.route(
			"/stores/{id}/payments/process",
			post(store::process_pending_payments),
		)
		.route("/stores/{id}/payments/reconcile", post(store::reconcile_payments))
		.route(
			"/stores/{id}/payments/auto-refund",
			post(store::auto_refund_failed_payments),
		)
		.route(
			"/stores/{id}/payments/refunds",
			post(store::process_eligible_refunds),
		)
		.route(
			"/stores/{id}/payments/reminders",
			post(store::send_pending_reminders),
		)
		.route("/stores/{id}/invoices", post(store::generate_invoices))
		.route("/couriers/{id}/earnings", get(store::courier_earnings));

	Router::new()
		.nest("/api", api)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(TimeoutLayer::new(timeout))
				.layer(CorsLayer::permissive()),
		)
		.with_state(AppState { engine })
}

/// Starts the HTTP server and serves until the listener fails.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<FulfillmentEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(engine, Duration::from_secs(api_config.timeout_seconds));

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Fulfillment API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::{to_bytes, Body};
	use axum::http::{Request, StatusCode};
	use chrono::{TimeZone, Utc};
	use fulfillment_config::builders::ConfigBuilder;
	use fulfillment_core::{FixedClock, FulfillmentBuilder, FulfillmentFactories};
	use fulfillment_types::{ErrorResponse, Order, OrderStatus, SlaReport};
	use serde::de::DeserializeOwned;
	use serde_json::{json, Value};
	use tower::ServiceExt;

	fn app() -> Router {
		let factories = FulfillmentFactories {
			storage_factories: fulfillment_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			settlement_factories: fulfillment_settlement::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		};
		let now = Utc.with_ymd_and_hms(2024, 5, 10, 18, 0, 0).unwrap();
		let engine = FulfillmentBuilder::new(ConfigBuilder::new().build())
			.with_clock(Arc::new(FixedClock::new(now)))
			.build(factories)
			.unwrap();
		router(Arc::new(engine), Duration::from_secs(5))
	}

	async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
		let request = Request::builder()
			.method(method)
			.uri(uri)
			.header("content-type", "application/json");
		let request = match body {
			Some(body) => request.body(Body::from(body.to_string())).unwrap(),
			None => request.body(Body::empty()).unwrap(),
		};
		let response = app.clone().oneshot(request).await.unwrap();
		let status = response.status();
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		(status, bytes.to_vec())
	}

	fn parse<T: DeserializeOwned>(bytes: &[u8]) -> T {
		serde_json::from_slice(bytes).unwrap()
	}

	fn new_order() -> Value {
		json!({
			"customerId": "alice",
			"storeId": "downtown",
			"items": [
				{ "menuItemId": "burger", "quantity": 2, "unitPrice": "8.00", "prepMinutes": 10 },
				{ "menuItemId": "fries", "quantity": 1, "unitPrice": "2.50", "prepMinutes": 5 }
			],
			"subtotal": "18.50",
			"tax": "1.75",
			"deliveryFee": "0.00",
			"total": "20.25"
		})
	}

	async fn place(app: &Router) -> Order {
		let (status, body) = send(app, "POST", "/api/orders", Some(new_order())).await;
		assert_eq!(status, StatusCode::CREATED);
		parse(&body)
	}

	#[tokio::test]
	async fn test_place_and_fetch_order() {
		let app = app();
		let order = place(&app).await;
		assert_eq!(order.status, OrderStatus::Pending);

		let (status, body) = send(&app, "GET", &format!("/api/orders/{}", order.id), None).await;
		assert_eq!(status, StatusCode::OK);
		let fetched: Order = parse(&body);
		assert_eq!(fetched.id, order.id);
		assert_eq!(fetched.order_number, order.order_number);
	}

	#[tokio::test]
	async fn test_unknown_order_is_404() {
		let app = app();
		let (status, body) = send(&app, "GET", "/api/orders/missing", None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		let error: ErrorResponse = parse(&body);
		assert_eq!(error.error, "ORDER_NOT_FOUND");
	}

	#[tokio::test]
	async fn test_transition_and_conflict() {
		let app = app();
		let order = place(&app).await;
		let uri = format!("/api/orders/{}/transition", order.id);

		let (status, body) = send(
			&app,
			"POST",
			&uri,
			Some(json!({ "from": "PENDING", "target": "ACCEPTED", "role": "kitchen" })),
		)
		.await;
		assert_eq!(status, StatusCode::OK);
		let accepted: Order = parse(&body);
		assert_eq!(accepted.status, OrderStatus::Accepted);

		let (status, body) = send(
			&app,
			"POST",
			&uri,
			Some(json!({ "from": "ACCEPTED", "target": "DELIVERED", "role": "kitchen" })),
		)
		.await;
		assert_eq!(status, StatusCode::CONFLICT);
		let error: ErrorResponse = parse(&body);
		assert_eq!(error.error, "INVALID_TRANSITION");

		let (status, body) = send(
			&app,
			"POST",
			&uri,
			Some(json!({ "from": "PENDING", "target": "CANCELLED", "role": "admin" })),
		)
		.await;
		assert_eq!(status, StatusCode::CONFLICT);
		let error: ErrorResponse = parse(&body);
		assert_eq!(error.error, "STALE_STATE");

		let (status, body) = send(&app, "GET", &format!("/api/orders/{}/sla", order.id), None).await;
		assert_eq!(status, StatusCode::OK);
		let report: SlaReport = parse(&body);
		assert!(report.estimated_delivery.is_some());
	}

	#[tokio::test]
	async fn test_system_role_rejected() {
		let app = app();
		let order = place(&app).await;
		let (status, body) = send(
			&app,
			"POST",
			&format!("/api/orders/{}/transition", order.id),
			Some(json!({ "from": "PENDING", "target": "CANCELLED", "role": "system" })),
		)
		.await;
		assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
		let error: ErrorResponse = parse(&body);
		assert_eq!(error.error, "INVALID_ROLE");
	}

	#[tokio::test]
	async fn test_unknown_store_is_404() {
		let app = app();
		let (status, body) = send(&app, "GET", "/api/stores/uptown/kitchen", None).await;
		assert_eq!(status, StatusCode::NOT_FOUND);
		let error: ErrorResponse = parse(&body);
		assert_eq!(error.error, "UNKNOWN_STORE");
	}

	#[tokio::test]
	async fn test_payment_flow_over_http() {
		let app = app();
		let order = place(&app).await;

		let payment = json!({ "orderId": order.id, "amount": "20.25", "method": "card" });
		let (status, _) = send(&app, "POST", "/api/payments", Some(payment.clone())).await;
		assert_eq!(status, StatusCode::CREATED);

		let (status, body) = send(&app, "POST", "/api/payments", Some(payment)).await;
		assert_eq!(status, StatusCode::CONFLICT);
		let error: ErrorResponse = parse(&body);
		assert_eq!(error.error, "DUPLICATE_PAYMENT");

		let (status, body) = send(&app, "POST", "/api/stores/downtown/payments/process", None).await;
		assert_eq!(status, StatusCode::OK);
		let report: Value = parse(&body);
		assert_eq!(report["processed"], json!(1));
	}

	#[tokio::test]
	async fn test_invalid_status_filter() {
		let app = app();
		let (status, _) = send(&app, "GET", "/api/stores/downtown/orders?status=LOST", None).await;
		assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

		place(&app).await;
		let (status, body) =
			send(&app, "GET", "/api/stores/downtown/orders?status=PENDING", None).await;
		assert_eq!(status, StatusCode::OK);
		let orders: Vec<Order> = parse(&body);
		assert_eq!(orders.len(), 1);
	}
}

//! Fulfillment engine: the single entry point for every operation.
//!
//! The engine owns the two state machines and the read-side projections and
//! wires them to one storage backend, one settlement collaborator and one
//! clock. Store-scoped operations fail with [`EngineError::UnknownStore`] for a
//! store that is not configured; everything else about a batch is reported in
//! its result record.

pub mod event_bus;

use crate::clock::Clock;
use crate::delivery::{courier_summary, FeeSchedule};
use crate::forecast::RevenueForecaster;
use crate::kitchen::KitchenWorkloadEstimator;
use crate::reconciliation::{PaymentReconciler, ReconcileError};
use crate::sla::SlaTracker;
use crate::state::{OrderStateError, OrderStateMachine, PaymentStateError, PaymentStateMachine};
use chrono::{DateTime, Utc};
use event_bus::EventBus;
use fulfillment_config::{Config, StoreConfig};
use fulfillment_settlement::SettlementService;
use fulfillment_storage::StorageService;
use fulfillment_types::{
	truncate_id, CourierEarnings, Decimal, InvoiceBatch, KitchenWorkload, NewOrder, NewPayment,
	Order, OrderStatus, Payment, ReconciliationReport, RefundReport, ReminderReport,
	RevenueForecast, Role, SettlementBatchReport, SlaReport,
};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Unknown store: {0}")]
	UnknownStore(String),
	#[error("Invalid request: {0}")]
	InvalidRequest(String),
	#[error("Storage error: {0}")]
	Storage(String),
	#[error(transparent)]
	OrderState(#[from] OrderStateError),
	#[error(transparent)]
	PaymentState(#[from] PaymentStateError),
	#[error(transparent)]
	Reconcile(#[from] ReconcileError),
}

#[derive(Clone)]
pub struct FulfillmentEngine {
	config: Config,
	storage: Arc<StorageService>,
	clock: Arc<dyn Clock>,
	event_bus: EventBus,
	sla: SlaTracker,
	kitchen: KitchenWorkloadEstimator,
	forecaster: RevenueForecaster,
	fees: FeeSchedule,
	orders: Arc<OrderStateMachine>,
	payments: Arc<PaymentStateMachine>,
	reconciler: Arc<PaymentReconciler>,
}

impl std::fmt::Debug for FulfillmentEngine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FulfillmentEngine").finish_non_exhaustive()
	}
}

impl FulfillmentEngine {
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		settlement: Arc<SettlementService>,
		clock: Arc<dyn Clock>,
		event_bus: EventBus,
	) -> Self {
		let sla = SlaTracker::from_minutes(config.sla.delivery_buffer_minutes);
		let orders = Arc::new(OrderStateMachine::new(
			storage.clone(),
			clock.clone(),
			sla,
			event_bus.clone(),
		));
		let payments = Arc::new(PaymentStateMachine::new(
			storage.clone(),
			clock.clone(),
			event_bus.clone(),
		));
		let reconciler = Arc::new(PaymentReconciler::new(
			orders.clone(),
			payments.clone(),
			settlement,
			storage.clone(),
			clock.clone(),
			event_bus.clone(),
			config.payments.clone(),
		));

		Self {
			sla,
			kitchen: KitchenWorkloadEstimator::from_config(&config.kitchen),
			forecaster: RevenueForecaster::new(config.forecast.clone()),
			fees: FeeSchedule::from_config(&config.delivery),
			config,
			storage,
			clock,
			event_bus,
			orders,
			payments,
			reconciler,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	pub fn now(&self) -> DateTime<Utc> {
		self.clock.now()
	}

	fn store(&self, store_id: &str) -> Result<&StoreConfig, EngineError> {
		self.config
			.store(store_id)
			.ok_or_else(|| EngineError::UnknownStore(store_id.to_string()))
	}

	/// Places an order at checkout completion.
	pub async fn place_order(&self, new_order: NewOrder) -> Result<Order, EngineError> {
		let prefix = self.store(&new_order.store_id)?.order_prefix();
		let order = self
			.orders
			.place(new_order, &prefix, self.config.sla.estimate_on_creation)
			.await?;
		Ok(order)
	}

	pub async fn get_order(&self, order_id: &str) -> Result<Order, EngineError> {
		Ok(self.orders.get_order(order_id).await?)
	}

	/// Every order of a store, optionally restricted to one status, oldest
	/// first.
	pub async fn list_orders(
		&self,
		store_id: &str,
		status: Option<OrderStatus>,
	) -> Result<Vec<Order>, EngineError> {
		self.store(store_id)?;
		let mut orders: Vec<Order> = self
			.orders
			.orders_for_store(store_id)
			.await?
			.into_iter()
			.filter(|o| status.is_none_or(|s| o.status == s))
			.collect();
		orders.sort_by_key(|o| o.created_at);
		Ok(orders)
	}

	/// Moves an order from `from` to `target` on behalf of `role`.
	///
	/// `from` is the status the caller last observed; the move is refused as
	/// stale once the order has left it. Cancelling or refunding an order flags its captured payment for refund
	/// processing. The transition itself is committed even if flagging fails.
	pub async fn transition_order(
		&self,
		order_id: &str,
		from: OrderStatus,
		target: OrderStatus,
		role: Role,
		expected_version: Option<u64>,
	) -> Result<Order, EngineError> {
		let applied = self
			.orders
			.transition_from(order_id, from, target, role, expected_version)
			.await?;

		if matches!(target, OrderStatus::Cancelled | OrderStatus::Refunded) {
			if let Err(e) = self.payments.mark_refund_eligible(order_id).await {
				tracing::warn!(
					order_id = %truncate_id(order_id),
					error = %e,
					"Could not flag payment for refund"
				);
			}
		}

		Ok(applied.order)
	}

	/// Assigns a courier; earnings follow the configured fee schedule.
	pub async fn assign_courier(
		&self,
		order_id: &str,
		courier_id: &str,
		distance_km: Decimal,
	) -> Result<Order, EngineError> {
		if courier_id.trim().is_empty() {
			return Err(EngineError::InvalidRequest("Courier id is required".into()));
		}
		if distance_km.is_sign_negative() {
			return Err(EngineError::InvalidRequest(
				"Distance cannot be negative".into(),
			));
		}

		let earnings = self.fees.earnings(distance_km);
		Ok(self
			.orders
			.assign_courier(order_id, courier_id, distance_km, earnings)
			.await?)
	}

	pub async fn get_order_sla(
		&self,
		order_id: &str,
		now: DateTime<Utc>,
	) -> Result<SlaReport, EngineError> {
		let order = self.orders.get_order(order_id).await?;
		Ok(self.sla.report(&order, now))
	}

	/// SLA reports of every overdue order of the store, earliest deadline
	/// first.
	pub async fn list_overdue_orders(
		&self,
		store_id: &str,
		now: DateTime<Utc>,
	) -> Result<Vec<SlaReport>, EngineError> {
		self.store(store_id)?;
		let mut overdue: Vec<SlaReport> = self
			.orders
			.orders_for_store(store_id)
			.await?
			.iter()
			.filter(|o| self.sla.is_overdue(o, now))
			.map(|o| self.sla.report(o, now))
			.collect();
		overdue.sort_by_key(|r| r.estimated_delivery);
		Ok(overdue)
	}

	pub async fn get_kitchen_workload(
		&self,
		store_id: &str,
		now: DateTime<Utc>,
	) -> Result<KitchenWorkload, EngineError> {
		let operating_hours = self.store(store_id)?.operating_hours;
		let orders = self.orders.orders_for_store(store_id).await?;
		Ok(self
			.kitchen
			.estimate(store_id, &orders, operating_hours, now))
	}

	/// Records the payment for an existing order.
	pub async fn record_payment(&self, new_payment: NewPayment) -> Result<Payment, EngineError> {
		let order = self.orders.get_order(&new_payment.order_id).await?;
		Ok(self.payments.record(new_payment, order.store_id).await?)
	}

	pub async fn get_payment(&self, payment_id: &str) -> Result<Payment, EngineError> {
		Ok(self.payments.get_payment(payment_id).await?)
	}

	/// The payment recorded for an order.
	pub async fn get_order_payment(&self, order_id: &str) -> Result<Payment, EngineError> {
		self.payments
			.find_by_order(order_id)
			.await?
			.ok_or_else(|| {
				EngineError::PaymentState(PaymentStateError::PaymentNotFound(format!(
					"order {}",
					order_id
				)))
			})
	}

	pub async fn reconcile_payments(
		&self,
		store_id: &str,
	) -> Result<ReconciliationReport, EngineError> {
		self.store(store_id)?;
		Ok(self.reconciler.reconcile(store_id).await?)
	}

	pub async fn process_pending_payments(
		&self,
		store_id: &str,
	) -> Result<SettlementBatchReport, EngineError> {
		self.store(store_id)?;
		Ok(self.reconciler.process_pending(store_id).await?)
	}

	pub async fn auto_refund_failed_payments(
		&self,
		store_id: &str,
	) -> Result<RefundReport, EngineError> {
		self.store(store_id)?;
		Ok(self.reconciler.auto_refund_stale(store_id).await?)
	}

	pub async fn process_eligible_refunds(
		&self,
		store_id: &str,
	) -> Result<RefundReport, EngineError> {
		self.store(store_id)?;
		Ok(self.reconciler.process_eligible_refunds(store_id).await?)
	}

	pub async fn send_pending_reminders(
		&self,
		store_id: &str,
	) -> Result<ReminderReport, EngineError> {
		self.store(store_id)?;
		Ok(self.reconciler.send_pending_reminders(store_id).await?)
	}

	pub async fn generate_invoices(&self, store_id: &str) -> Result<InvoiceBatch, EngineError> {
		self.store(store_id)?;
		Ok(self.reconciler.generate_monthly_invoices(store_id).await?)
	}

	pub async fn get_revenue_forecast(
		&self,
		store_id: &str,
	) -> Result<RevenueForecast, EngineError> {
		self.store(store_id)?;
		let payments = self.payments.payments_for_store(store_id, None).await?;
		Ok(self
			.forecaster
			.forecast(store_id, &payments, self.clock.now()))
	}

	/// Earnings of a courier over every store since `since`.
	pub async fn courier_earnings(
		&self,
		courier_id: &str,
		since: DateTime<Utc>,
	) -> Result<CourierEarnings, EngineError> {
		let orders = self.orders.all_orders().await?;
		Ok(courier_summary(courier_id, &orders, since))
	}

	/// Drops expired records from the storage backend.
	pub async fn cleanup_storage(&self) -> Result<usize, EngineError> {
		self.storage
			.cleanup_expired()
			.await
			.map_err(|e| EngineError::Storage(e.to_string()))
	}
}

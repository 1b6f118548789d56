//! Payment reconciliation and payment batch jobs.
//!
//! Every batch walks the payments of one store and records per-entity failures
//! instead of aborting, so one bad record never blocks the rest of the batch.
//! Discrepancies between a payment and its order are reported, never
//! corrected.

pub mod invoice;

use crate::clock::Clock;
use crate::engine::event_bus::EventBus;
use crate::locks::KeyedLocks;
use crate::state::{OrderStateError, OrderStateMachine, PaymentStateError, PaymentStateMachine};
use chrono::Duration;
use fulfillment_config::PaymentsConfig;
use fulfillment_settlement::{SettlementOutcome, SettlementService};
use fulfillment_storage::StorageService;
use fulfillment_types::{
	round_money, truncate_id, Decimal, Discrepancy, EntityFailure, FulfillmentEvent, Invoice,
	InvoiceBatch, Order, OrderStatus, Payment, PaymentEvent, PaymentReminder, PaymentStatus,
	ReconciliationReport, RefundReport, ReminderReport, Role, SettlementBatchReport, StorageKey,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Attempts at drawing an unused invoice number before giving up.
const INVOICE_NUMBER_ATTEMPTS: usize = 8;

/// What a batch did with one pending payment.
enum Settlement {
	Approved,
	Failed(String),
	/// Another batch settled it first.
	Skipped,
}

/// Errors that abort a whole batch.
///
/// Failures of single payments or orders are not errors; they are listed in
/// the batch report.
#[derive(Debug, Error)]
pub enum ReconcileError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error(transparent)]
	PaymentState(#[from] PaymentStateError),
	#[error(transparent)]
	OrderState(#[from] OrderStateError),
}

pub struct PaymentReconciler {
	orders: Arc<OrderStateMachine>,
	payments: Arc<PaymentStateMachine>,
	settlement: Arc<SettlementService>,
	storage: Arc<StorageService>,
	clock: Arc<dyn Clock>,
	event_bus: EventBus,
	policy: PaymentsConfig,
	invoice_lock: KeyedLocks,
}

impl PaymentReconciler {
	pub fn new(
		orders: Arc<OrderStateMachine>,
		payments: Arc<PaymentStateMachine>,
		settlement: Arc<SettlementService>,
		storage: Arc<StorageService>,
		clock: Arc<dyn Clock>,
		event_bus: EventBus,
		policy: PaymentsConfig,
	) -> Self {
		Self {
			orders,
			payments,
			settlement,
			storage,
			clock,
			event_bus,
			policy,
			invoice_lock: KeyedLocks::new(),
		}
	}

	/// Settles every `PENDING` payment of the store.
	///
	/// Approved payments become `COMPLETED`; declines, gateway errors and
	/// timeouts become `FAILED`. Either way the order mirrors the new payment
	/// status. Payments another batch settled in the meantime are skipped and
	/// left out of `total`.
	#[instrument(skip_all, fields(store_id = %store_id))]
	pub async fn process_pending(
		&self,
		store_id: &str,
	) -> Result<SettlementBatchReport, ReconcileError> {
		let pending = self
			.payments
			.payments_for_store(store_id, Some(PaymentStatus::Pending))
			.await?;

		let mut report = SettlementBatchReport::default();
		let mut skipped = 0;
		for payment in pending {
			match self.settle_one(&payment.id).await {
				Ok(Settlement::Approved) => report.processed += 1,
				Ok(Settlement::Skipped) => skipped += 1,
				Ok(Settlement::Failed(reason)) | Err(reason) => {
					report.failed += 1;
					report.failures.push(EntityFailure {
						id: payment.id,
						reason,
					});
				},
			}
		}
		report.total = report.processed + report.failed;

		tracing::info!(
			processed = report.processed,
			failed = report.failed,
			skipped,
			total = report.total,
			"Pending payments processed"
		);
		Ok(report)
	}

	/// Settles one payment under its lock, unless it already left `PENDING`.
	async fn settle_one(&self, payment_id: &str) -> Result<Settlement, String> {
		let settled = self
			.payments
			.settle_pending(payment_id, |payment| async move {
				match self.settlement.settle(&payment).await {
					Ok(SettlementOutcome::Approved { reference }) => {
						tracing::debug!(
							payment_id = %truncate_id(&payment.id),
							reference = %reference,
							"Settlement approved"
						);
						(PaymentStatus::Completed, None)
					},
					Ok(SettlementOutcome::Declined { reason }) => {
						(PaymentStatus::Failed, Some(reason))
					},
					Err(e) => (PaymentStatus::Failed, Some(e.to_string())),
				}
			})
			.await
			.map_err(|e| e.to_string())?;

		let Some(updated) = settled else {
			return Ok(Settlement::Skipped);
		};
		self.mirror_onto_order(&updated).await;

		if updated.status != PaymentStatus::Failed {
			return Ok(Settlement::Approved);
		}
		let reason = updated.failure_reason.unwrap_or_default();
		tracing::warn!(
			payment_id = %truncate_id(&updated.id),
			reason = %reason,
			"Settlement failed"
		);
		Ok(Settlement::Failed(reason))
	}

	/// Refunds `FAILED` payments still inside the automatic refund window and
	/// cascades the refund onto their orders.
	///
	/// Older failures are listed for manual review and left untouched.
	#[instrument(skip_all, fields(store_id = %store_id))]
	pub async fn auto_refund_stale(&self, store_id: &str) -> Result<RefundReport, ReconcileError> {
		let failed = self
			.payments
			.payments_for_store(store_id, Some(PaymentStatus::Failed))
			.await?;
		let now = self.clock.now();
		let window = Duration::hours(i64::from(self.policy.auto_refund_window_hours));

		let mut report = RefundReport {
			total: failed.len(),
			..Default::default()
		};

		for payment in failed {
			if payment.age(now) > window {
				tracing::info!(
					payment_id = %truncate_id(&payment.id),
					age_hours = payment.age(now).num_hours(),
					"Failed payment outside refund window, left for manual review"
				);
				report.manual_review.push(payment.id);
				continue;
			}

			match self.refund_one(&payment, true).await {
				Ok(()) => {
					report.refunded += 1;
					report.refunded_ids.push(payment.id);
				},
				Err(reason) => report.failures.push(EntityFailure {
					id: payment.id,
					reason,
				}),
			}
		}

		Ok(report)
	}

	/// Refunds `COMPLETED` payments whose orders were cancelled or refunded.
	#[instrument(skip_all, fields(store_id = %store_id))]
	pub async fn process_eligible_refunds(
		&self,
		store_id: &str,
	) -> Result<RefundReport, ReconcileError> {
		let eligible: Vec<Payment> = self
			.payments
			.payments_for_store(store_id, Some(PaymentStatus::Completed))
			.await?
			.into_iter()
			.filter(|p| p.refund_eligible)
			.collect();

		let mut report = RefundReport {
			total: eligible.len(),
			..Default::default()
		};
		for payment in eligible {
			match self.refund_one(&payment, false).await {
				Ok(()) => {
					report.refunded += 1;
					report.refunded_ids.push(payment.id);
				},
				Err(reason) => report.failures.push(EntityFailure {
					id: payment.id,
					reason,
				}),
			}
		}
		Ok(report)
	}

	/// Refunds one payment; with `cascade` a non-terminal order follows it to
	/// `REFUNDED`.
	async fn refund_one(&self, payment: &Payment, cascade: bool) -> Result<(), String> {
		let refunded = self
			.payments
			.transition(&payment.id, PaymentStatus::Refunded, None)
			.await
			.map_err(|e| e.to_string())?;

		if cascade {
			match self.orders.get_order(&refunded.order_id).await {
				Ok(order) if !order.status.is_terminal() => {
					self.orders
						.transition(&order.id, OrderStatus::Refunded, Role::System, None)
						.await
						.map_err(|e| format!("Payment refunded but order not cascaded: {}", e))?;
				},
				Ok(_) => {},
				Err(OrderStateError::OrderNotFound(_)) => {
					tracing::warn!(
						payment_id = %truncate_id(&payment.id),
						order_id = %truncate_id(&refunded.order_id),
						"Refunded payment has no order"
					);
				},
				Err(e) => return Err(e.to_string()),
			}
		}

		self.mirror_onto_order(&refunded).await;
		Ok(())
	}

	/// Compares every payment of the store, whatever its status, with its
	/// order total.
	///
	/// Payments within tolerance are marked reconciled. Payments whose order
	/// cannot be loaded are listed in `failures` and are not part of `total`.
	#[instrument(skip_all, fields(store_id = %store_id))]
	pub async fn reconcile(&self, store_id: &str) -> Result<ReconciliationReport, ReconcileError> {
		let payments = self.payments.payments_for_store(store_id, None).await?;
		let tolerance = self.policy.discrepancy_tolerance;

		let mut report = ReconciliationReport::default();
		for payment in payments {
			let order = match self.orders.get_order(&payment.order_id).await {
				Ok(order) => order,
				Err(e) => {
					report.failures.push(EntityFailure {
						id: payment.id,
						reason: e.to_string(),
					});
					continue;
				},
			};

			if let Some(discrepancy) = compare(&payment, &order, tolerance) {
				tracing::warn!(
					payment_id = %truncate_id(&payment.id),
					order_id = %truncate_id(&order.id),
					delta = %discrepancy.delta,
					"Payment does not match order total"
				);
				self.event_bus
					.publish(FulfillmentEvent::Payment(PaymentEvent::DiscrepancyDetected(
						discrepancy.clone(),
					)));
				report.discrepancies.push(discrepancy);
				continue;
			}

			if payment.reconciled {
				report.reconciled += 1;
				continue;
			}
			let marked = self
				.payments
				.update_payment_with(&payment.id, |payment, now| {
					payment.reconciled = true;
					payment.reconciled_at.get_or_insert(now);
					Ok(())
				})
				.await;
			match marked {
				Ok(_) => report.reconciled += 1,
				Err(e) => report.failures.push(EntityFailure {
					id: payment.id,
					reason: e.to_string(),
				}),
			}
		}

		report.total = report.reconciled + report.discrepancies.len();
		tracing::info!(
			reconciled = report.reconciled,
			discrepancies = report.discrepancies.len(),
			total = report.total,
			"Payments reconciled"
		);
		Ok(report)
	}

	/// Lists payments pending for longer than the reminder threshold.
	///
	/// Reminders are derived on every call; nothing is stored.
	pub async fn send_pending_reminders(
		&self,
		store_id: &str,
	) -> Result<ReminderReport, ReconcileError> {
		let now = self.clock.now();
		let threshold = Duration::minutes(i64::from(self.policy.reminder_after_minutes));

		let reminders: Vec<PaymentReminder> = self
			.payments
			.payments_for_store(store_id, Some(PaymentStatus::Pending))
			.await?
			.into_iter()
			.filter(|p| p.age(now) > threshold)
			.map(|p| PaymentReminder {
				pending_minutes: p.age(now).num_minutes(),
				payment_id: p.id,
				order_id: p.order_id,
				amount: p.amount,
				currency: p.currency,
				created_at: p.created_at,
			})
			.collect();

		for reminder in &reminders {
			tracing::info!(
				payment_id = %truncate_id(&reminder.payment_id),
				pending_minutes = reminder.pending_minutes,
				"Payment reminder"
			);
		}

		Ok(ReminderReport {
			sent: reminders.len(),
			reminders,
		})
	}

	/// Issues one invoice per customer for the current calendar month.
	///
	/// Covers `DELIVERED` orders created since the first of the month whose
	/// payment is `COMPLETED`.
	#[instrument(skip_all, fields(store_id = %store_id))]
	pub async fn generate_monthly_invoices(
		&self,
		store_id: &str,
	) -> Result<InvoiceBatch, ReconcileError> {
		let now = self.clock.now();
		let period_start = invoice::month_start(now);

		let delivered: Vec<Order> = self
			.orders
			.orders_for_store(store_id)
			.await?
			.into_iter()
			.filter(|o| o.status == OrderStatus::Delivered && o.created_at >= period_start)
			.collect();

		let mut by_customer: BTreeMap<String, Vec<Order>> = BTreeMap::new();
		for order in delivered {
			let paid = matches!(
				self.payments.find_by_order(&order.id).await?,
				Some(payment) if payment.status == PaymentStatus::Completed
			);
			if paid {
				by_customer
					.entry(order.customer_id.clone())
					.or_default()
					.push(order);
			}
		}

		let mut batch = InvoiceBatch::default();
		for (customer_id, orders) in by_customer {
			let mut order_ids: Vec<String> = orders.iter().map(|o| o.id.clone()).collect();
			order_ids.sort();
			let total = round_money(orders.iter().map(|o| o.total).sum());

			match self.issue_invoice(&customer_id, store_id, order_ids, total).await {
				Ok(invoice) => batch.invoices.push(invoice),
				Err(reason) => batch.failures.push(EntityFailure {
					id: customer_id,
					reason,
				}),
			}
		}
		batch.generated = batch.invoices.len();

		tracing::info!(generated = batch.generated, "Monthly invoices generated");
		Ok(batch)
	}

	async fn issue_invoice(
		&self,
		customer_id: &str,
		store_id: &str,
		order_ids: Vec<String>,
		total: Decimal,
	) -> Result<Invoice, String> {
		let _guard = self.invoice_lock.lock(StorageKey::Invoices.as_str()).await;
		let now = self.clock.now();
		let namespace = StorageKey::Invoices.as_str();

		let mut number = None;
		for _ in 0..INVOICE_NUMBER_ATTEMPTS {
			let candidate =
				invoice::invoice_number(&self.policy.invoice_prefix, now, &mut rand::thread_rng());
			let taken = self
				.storage
				.exists(namespace, &candidate)
				.await
				.map_err(|e| e.to_string())?;
			if !taken {
				number = Some(candidate);
				break;
			}
		}
		let invoice_number =
			number.ok_or_else(|| "Could not allocate an unused invoice number".to_string())?;

		let invoice = Invoice {
			invoice_number,
			customer_id: customer_id.to_string(),
			store_id: store_id.to_string(),
			order_count: order_ids.len(),
			order_ids,
			total,
			period_start: invoice::month_start(now),
			issued_at: now,
		};
		self.storage
			.store(namespace, &invoice.invoice_number, &invoice)
			.await
			.map_err(|e| e.to_string())?;

		self.event_bus
			.publish(FulfillmentEvent::Payment(PaymentEvent::InvoiceIssued {
				invoice_number: invoice.invoice_number.clone(),
				customer_id: invoice.customer_id.clone(),
			}));
		Ok(invoice)
	}

	async fn mirror_onto_order(&self, payment: &Payment) {
		if let Err(e) = self
			.orders
			.mirror_payment_status(&payment.order_id, payment.status)
			.await
		{
			tracing::warn!(
				payment_id = %truncate_id(&payment.id),
				order_id = %truncate_id(&payment.order_id),
				error = %e,
				"Could not mirror payment status onto order"
			);
		}
	}
}

/// A discrepancy when `|amount - total|` exceeds `tolerance`.
pub fn compare(payment: &Payment, order: &Order, tolerance: Decimal) -> Option<Discrepancy> {
	let delta = payment.amount - order.total;
	(delta.abs() > tolerance).then(|| Discrepancy {
		payment_id: payment.id.clone(),
		order_id: order.id.clone(),
		order_total: order.total,
		payment_amount: payment.amount,
		delta,
	})
}

//! Payment state machine.
//!
//! `PENDING -> COMPLETED | FAILED`, `COMPLETED -> REFUNDED`,
//! `FAILED -> REFUNDED`. Each payment is read, modified and written under its
//! own lock, so two refunds of the same payment cannot both succeed.

use crate::clock::Clock;
use crate::engine::event_bus::EventBus;
use crate::locks::KeyedLocks;
use chrono::{DateTime, Utc};
use fulfillment_storage::{StorageError, StorageService};
use fulfillment_types::{
	truncate_id, FulfillmentEvent, NewPayment, Payment, PaymentEvent, PaymentStatus, StorageKey,
};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentStateError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Payment not found: {0}")]
	PaymentNotFound(String),
	#[error("Invalid payment transition {from} -> {to}")]
	InvalidTransition {
		from: PaymentStatus,
		to: PaymentStatus,
	},
	#[error("Order {0} already has a payment")]
	DuplicatePayment(String),
	#[error("Invalid payment: {0}")]
	InvalidPayment(String),
}

pub struct PaymentStateMachine {
	storage: Arc<StorageService>,
	clock: Arc<dyn Clock>,
	event_bus: EventBus,
	locks: KeyedLocks,
}

impl PaymentStateMachine {
	pub fn new(storage: Arc<StorageService>, clock: Arc<dyn Clock>, event_bus: EventBus) -> Self {
		Self {
			storage,
			clock,
			event_bus,
			locks: KeyedLocks::new(),
		}
	}

	/// Records a `PENDING` payment for an order.
	///
	/// An order has at most one payment; a second one is rejected.
	pub async fn record(
		&self,
		new_payment: NewPayment,
		store_id: Option<String>,
	) -> Result<Payment, PaymentStateError> {
		if new_payment.amount.is_sign_negative() || new_payment.amount.is_zero() {
			return Err(PaymentStateError::InvalidPayment(
				"Amount must be positive".into(),
			));
		}
		if new_payment.currency.len() != 3 {
			return Err(PaymentStateError::InvalidPayment(format!(
				"Invalid currency code '{}'",
				new_payment.currency
			)));
		}

		let _guard = self
			.locks
			.lock(&format!("order:{}", new_payment.order_id))
			.await;
		if self.find_by_order(&new_payment.order_id).await?.is_some() {
			return Err(PaymentStateError::DuplicatePayment(new_payment.order_id));
		}

		let now = self.clock.now();
		let payment = Payment {
			id: uuid::Uuid::new_v4().to_string(),
			order_id: new_payment.order_id,
			store_id,
			amount: new_payment.amount,
			currency: new_payment.currency.to_ascii_uppercase(),
			method: new_payment.method,
			status: PaymentStatus::Pending,
			created_at: now,
			updated_at: now,
			settled_at: None,
			refunded_at: None,
			failure_reason: None,
			reconciled: false,
			reconciled_at: None,
			refund_eligible: false,
			version: 0,
		};

		self.storage
			.store(StorageKey::Payments.as_str(), &payment.id, &payment)
			.await
			.map_err(|e| PaymentStateError::Storage(e.to_string()))?;
		self.storage
			.store(
				StorageKey::PaymentByOrder.as_str(),
				&payment.order_id,
				&payment.id,
			)
			.await
			.map_err(|e| PaymentStateError::Storage(e.to_string()))?;

		tracing::info!(
			payment_id = %truncate_id(&payment.id),
			order_id = %truncate_id(&payment.order_id),
			amount = %payment.amount,
			"Payment recorded"
		);
		self.event_bus
			.publish(FulfillmentEvent::Payment(PaymentEvent::Recorded {
				payment_id: payment.id.clone(),
				order_id: payment.order_id.clone(),
			}));

		Ok(payment)
	}

	pub async fn get_payment(&self, payment_id: &str) -> Result<Payment, PaymentStateError> {
		self.storage
			.retrieve(StorageKey::Payments.as_str(), payment_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => PaymentStateError::PaymentNotFound(payment_id.to_string()),
				other => PaymentStateError::Storage(other.to_string()),
			})
	}

	/// The payment recorded for an order, if any.
	pub async fn find_by_order(&self, order_id: &str) -> Result<Option<Payment>, PaymentStateError> {
		let payment_id: Option<String> = self
			.storage
			.find(StorageKey::PaymentByOrder.as_str(), order_id)
			.await
			.map_err(|e| PaymentStateError::Storage(e.to_string()))?;

		match payment_id {
			Some(id) => match self.get_payment(&id).await {
				Ok(payment) => Ok(Some(payment)),
				Err(PaymentStateError::PaymentNotFound(_)) => Ok(None),
				Err(e) => Err(e),
			},
			None => Ok(None),
		}
	}

	/// Every payment of a store, optionally restricted to one status.
	pub async fn payments_for_store(
		&self,
		store_id: &str,
		status: Option<PaymentStatus>,
	) -> Result<Vec<Payment>, PaymentStateError> {
		let payments: Vec<Payment> = self
			.storage
			.retrieve_all(StorageKey::Payments.as_str())
			.await
			.map_err(|e| PaymentStateError::Storage(e.to_string()))?;
		Ok(payments
			.into_iter()
			.filter(|p| p.belongs_to_store(store_id))
			.filter(|p| status.is_none_or(|s| p.status == s))
			.collect())
	}

	/// Reads, modifies and writes one payment under its lock.
	///
	/// `updater` works on a copy; nothing is written if it fails.
	pub async fn update_payment_with<F>(
		&self,
		payment_id: &str,
		updater: F,
	) -> Result<Payment, PaymentStateError>
	where
		F: FnOnce(&mut Payment, DateTime<Utc>) -> Result<(), PaymentStateError>,
	{
		let _guard = self.locks.lock(payment_id).await;

		let current = self.get_payment(payment_id).await?;
		self.write_locked(&current, updater).await
	}

	/// Applies `updater` to a copy of `current` and stores it. The caller
	/// holds the payment lock.
	async fn write_locked<F>(&self, current: &Payment, updater: F) -> Result<Payment, PaymentStateError>
	where
		F: FnOnce(&mut Payment, DateTime<Utc>) -> Result<(), PaymentStateError>,
	{
		let now = self.clock.now();
		let mut next = current.clone();
		updater(&mut next, now)?;
		next.updated_at = now;
		next.version = current.version + 1;

		self.storage
			.update(StorageKey::Payments.as_str(), &current.id, &next)
			.await
			.map_err(|e| PaymentStateError::Storage(e.to_string()))?;
		Ok(next)
	}

	/// Moves a payment to `to`, stamping the matching timestamp.
	pub async fn transition(
		&self,
		payment_id: &str,
		to: PaymentStatus,
		failure_reason: Option<String>,
	) -> Result<Payment, PaymentStateError> {
		let reason = failure_reason.clone();
		let payment = self
			.update_payment_with(payment_id, |payment, now| {
				apply_status(payment, to, reason, now)
			})
			.await?;

		self.announce(&payment, to, failure_reason);
		Ok(payment)
	}

	/// Settles a payment that is still `PENDING`.
	///
	/// The payment lock is held from the status check until the outcome of
	/// `settle` is written, so concurrent batches capture a payment once.
	/// Returns `None` without calling `settle` when the payment already left
	/// `PENDING`.
	pub async fn settle_pending<F, Fut>(
		&self,
		payment_id: &str,
		settle: F,
	) -> Result<Option<Payment>, PaymentStateError>
	where
		F: FnOnce(Payment) -> Fut,
		Fut: Future<Output = (PaymentStatus, Option<String>)>,
	{
		let _guard = self.locks.lock(payment_id).await;

		let current = self.get_payment(payment_id).await?;
		if current.status != PaymentStatus::Pending {
			tracing::debug!(
				payment_id = %truncate_id(payment_id),
				status = %current.status,
				"Payment no longer pending, skipping settlement"
			);
			return Ok(None);
		}

		let (to, failure_reason) = settle(current.clone()).await;
		let reason = failure_reason.clone();
		let payment = self
			.write_locked(&current, |payment, now| {
				apply_status(payment, to, reason, now)
			})
			.await?;

		self.announce(&payment, to, failure_reason);
		Ok(Some(payment))
	}

	fn announce(&self, payment: &Payment, to: PaymentStatus, failure_reason: Option<String>) {
		tracing::info!(
			payment_id = %truncate_id(&payment.id),
			status = %to,
			"Payment transitioned"
		);
		let event = match to {
			PaymentStatus::Completed => Some(PaymentEvent::Settled {
				payment_id: payment.id.clone(),
				order_id: payment.order_id.clone(),
			}),
			PaymentStatus::Failed => Some(PaymentEvent::SettlementFailed {
				payment_id: payment.id.clone(),
				order_id: payment.order_id.clone(),
				reason: failure_reason.unwrap_or_default(),
			}),
			PaymentStatus::Refunded => Some(PaymentEvent::Refunded {
				payment_id: payment.id.clone(),
				order_id: payment.order_id.clone(),
			}),
			PaymentStatus::Pending => None,
		};
		if let Some(event) = event {
			self.event_bus.publish(FulfillmentEvent::Payment(event));
		}
	}

	/// Flags the order's captured payment for refund processing.
	///
	/// Returns the flagged payment, or `None` when the order has no payment or
	/// its payment is not `COMPLETED`.
	pub async fn mark_refund_eligible(
		&self,
		order_id: &str,
	) -> Result<Option<Payment>, PaymentStateError> {
		let Some(payment) = self.find_by_order(order_id).await? else {
			return Ok(None);
		};
		if payment.status != PaymentStatus::Completed || payment.refund_eligible {
			return Ok(None);
		}

		let flagged = self
			.update_payment_with(&payment.id, |payment, _| {
				payment.refund_eligible = payment.status == PaymentStatus::Completed;
				Ok(())
			})
			.await?;
		if !flagged.refund_eligible {
			return Ok(None);
		}

		tracing::info!(
			payment_id = %truncate_id(&flagged.id),
			order_id = %truncate_id(order_id),
			"Payment eligible for refund"
		);
		self.event_bus
			.publish(FulfillmentEvent::Payment(PaymentEvent::RefundEligible {
				payment_id: flagged.id.clone(),
				order_id: flagged.order_id.clone(),
			}));
		Ok(Some(flagged))
	}
}

fn apply_status(
	payment: &mut Payment,
	to: PaymentStatus,
	failure_reason: Option<String>,
	now: DateTime<Utc>,
) -> Result<(), PaymentStateError> {
	if !payment.status.can_transition_to(to) {
		return Err(PaymentStateError::InvalidTransition {
			from: payment.status,
			to,
		});
	}
	payment.status = to;
	match to {
		PaymentStatus::Completed => payment.settled_at = Some(now),
		PaymentStatus::Failed => payment.failure_reason = failure_reason,
		PaymentStatus::Refunded => {
			payment.refunded_at = Some(now);
			payment.refund_eligible = false;
		},
		PaymentStatus::Pending => {},
	}
	Ok(())
}

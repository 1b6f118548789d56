//! Order state machine.
//!
//! Orders move `PENDING -> ACCEPTED -> PREPARING -> READY_FOR_PICKUP ->
//! OUT_FOR_DELIVERY -> DELIVERED`, and can be cancelled or refunded from any
//! non-terminal status. Every write goes through this module: edges are
//! checked against a static adjacency table, the acting role against a
//! role x edge table, and writes to one order are serialized by a per-order
//! lock plus a version check.

use crate::clock::Clock;
use crate::engine::event_bus::EventBus;
use crate::locks::KeyedLocks;
use crate::sla::SlaTracker;
use chrono::{DateTime, Utc};
use fulfillment_storage::{StorageError, StorageService};
use fulfillment_types::{
	truncate_id, DeliveryAssignment, Decimal, FulfillmentEvent, NewOrder, Order, OrderEvent,
	OrderStatus, PaymentStatus, Role, StorageKey, MAX_LINE_QUANTITY, MAX_PREP_MINUTES,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during order state management.
#[derive(Debug, Error)]
pub enum OrderStateError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Order not found: {0}")]
	OrderNotFound(String),
	#[error("Invalid transition {from} -> {to} for role {role}")]
	InvalidTransition {
		from: OrderStatus,
		to: OrderStatus,
		role: Role,
	},
	#[error("Order {order_id} changed underneath the request: expected version {expected}, found {actual}")]
	StaleState {
		order_id: String,
		expected: u64,
		actual: u64,
	},
	#[error("Order {order_id} changed underneath the request: expected status {expected}, found {actual}")]
	StatusChanged {
		order_id: String,
		expected: OrderStatus,
		actual: OrderStatus,
	},
	#[error("Order {0} has no courier assigned")]
	CourierRequired(String),
	#[error("Order {order_id} cannot take a courier while {status}")]
	NotAssignable {
		order_id: String,
		status: OrderStatus,
	},
	#[error("Invalid order: {0}")]
	InvalidOrder(String),
}

type Edge = (OrderStatus, OrderStatus);

/// Legal next statuses for every status.
static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
	use fulfillment_types::OrderStatus::*;

	let forward = [
		(Pending, Accepted),
		(Accepted, Preparing),
		(Preparing, ReadyForPickup),
		(ReadyForPickup, OutForDelivery),
		(OutForDelivery, Delivered),
	];

	let mut m: HashMap<OrderStatus, HashSet<OrderStatus>> = OrderStatus::ALL
		.iter()
		.map(|status| (*status, HashSet::new()))
		.collect();
	for (from, to) in forward {
		m.entry(from).or_default().insert(to);
	}
	for status in OrderStatus::ALL.iter().filter(|s| !s.is_terminal()) {
		let next = m.entry(*status).or_default();
		next.insert(Cancelled);
		next.insert(Refunded);
	}
	m
});

/// Edges each role may drive.
static ROLE_EDGES: Lazy<HashMap<Role, HashSet<Edge>>> = Lazy::new(|| {
	use fulfillment_types::OrderStatus::*;

	let all_edges: HashSet<Edge> = TRANSITIONS
		.iter()
		.flat_map(|(from, next)| next.iter().map(move |to| (*from, *to)))
		.collect();
	let refunds: HashSet<Edge> = all_edges
		.iter()
		.copied()
		.filter(|(_, to)| *to == Refunded)
		.collect();

	HashMap::from([
		(
			Role::Kitchen,
			HashSet::from([
				(Pending, Accepted),
				(Accepted, Preparing),
				(Preparing, ReadyForPickup),
			]),
		),
		(
			Role::Delivery,
			HashSet::from([(ReadyForPickup, OutForDelivery), (OutForDelivery, Delivered)]),
		),
		(Role::Customer, HashSet::from([(Pending, Cancelled)])),
		(Role::Admin, all_edges),
		(Role::System, refunds),
	])
});

/// Whether `from -> to` is in the adjacency table.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
	TRANSITIONS
		.get(&from)
		.is_some_and(|next| next.contains(&to))
}

/// Whether `role` may drive the edge `from -> to`.
pub fn is_authorized(role: Role, from: OrderStatus, to: OrderStatus) -> bool {
	ROLE_EDGES
		.get(&role)
		.is_some_and(|edges| edges.contains(&(from, to)))
}

/// Checks an edge and the acting role before anything is written.
pub fn check_transition(from: OrderStatus, to: OrderStatus, role: Role) -> Result<(), OrderStateError> {
	if is_valid_transition(from, to) && is_authorized(role, from, to) {
		Ok(())
	} else {
		Err(OrderStateError::InvalidTransition { from, to, role })
	}
}

/// Applies a checked transition and its side effects to an order in memory.
///
/// - `ACCEPTED` (re)computes the delivery deadline.
/// - `OUT_FOR_DELIVERY` needs a courier and stamps the pickup.
/// - `DELIVERED` stamps `actual_delivery` and the courier's drop-off.
/// - `CANCELLED` and `REFUNDED` drop an assignment that never delivered.
pub fn apply_transition(
	order: &mut Order,
	to: OrderStatus,
	role: Role,
	now: DateTime<Utc>,
	sla: &SlaTracker,
) -> Result<(), OrderStateError> {
	check_transition(order.status, to, role)?;

	match to {
		OrderStatus::Accepted => {
			order.estimated_delivery = Some(deadline(sla, order, now)?);
		},
		OrderStatus::OutForDelivery => {
			let assignment = order
				.delivery
				.as_mut()
				.ok_or_else(|| OrderStateError::CourierRequired(order.id.clone()))?;
			assignment.picked_up_at = Some(now);
		},
		OrderStatus::Delivered => {
			order.actual_delivery = Some(now);
			if let Some(assignment) = order.delivery.as_mut() {
				assignment.delivered_at = Some(now);
			}
		},
		OrderStatus::Cancelled | OrderStatus::Refunded => {
			if order
				.delivery
				.as_ref()
				.is_some_and(|d| d.delivered_at.is_none())
			{
				order.delivery = None;
			}
		},
		OrderStatus::Pending | OrderStatus::Preparing | OrderStatus::ReadyForPickup => {},
	}

	order.status = to;
	Ok(())
}

/// Result of a successful transition.
#[derive(Debug, Clone)]
pub struct AppliedTransition {
	pub order: Order,
	pub from: OrderStatus,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OrderSequence {
	next: u64,
}

/// Manages order state transitions and persistence.
pub struct OrderStateMachine {
	storage: Arc<StorageService>,
	clock: Arc<dyn Clock>,
	sla: SlaTracker,
	event_bus: EventBus,
	locks: KeyedLocks,
}

impl OrderStateMachine {
	pub fn new(
		storage: Arc<StorageService>,
		clock: Arc<dyn Clock>,
		sla: SlaTracker,
		event_bus: EventBus,
	) -> Self {
		Self {
			storage,
			clock,
			sla,
			event_bus,
			locks: KeyedLocks::new(),
		}
	}

	/// Validates and stores a new order in `PENDING`.
	///
	/// The order number is `<prefix>-<6 digit store sequence>`. With
	/// `estimate_now` the delivery deadline is computed immediately instead of
	/// on acceptance.
	pub async fn place(
		&self,
		new_order: NewOrder,
		number_prefix: &str,
		estimate_now: bool,
	) -> Result<Order, OrderStateError> {
		validate_new_order(&new_order)?;

		let now = self.clock.now();
		let sequence = self.next_sequence(&new_order.store_id).await?;
		let mut order = Order {
			id: uuid::Uuid::new_v4().to_string(),
			order_number: format!("{}-{:06}", number_prefix, sequence),
			customer_id: new_order.customer_id,
			store_id: Some(new_order.store_id),
			status: OrderStatus::Pending,
			payment_status: PaymentStatus::Pending,
			items: new_order.items,
			subtotal: new_order.subtotal,
			tax: new_order.tax,
			delivery_fee: new_order.delivery_fee,
			total: new_order.total,
			created_at: now,
			updated_at: now,
			estimated_delivery: None,
			actual_delivery: None,
			delivery: None,
			version: 0,
		};
		if estimate_now {
			order.estimated_delivery = Some(deadline(&self.sla, &order, now)?);
		}

		self.store_order(&order).await?;

		tracing::info!(
			order_id = %truncate_id(&order.id),
			order_number = %order.order_number,
			total = %order.total,
			"Order placed"
		);
		self.event_bus
			.publish(FulfillmentEvent::Order(OrderEvent::Placed {
				order_id: order.id.clone(),
				store_id: order.store_id.clone().unwrap_or_default(),
			}));

		Ok(order)
	}

	/// Stores an order as-is. Fails if an order with the same id exists.
	pub async fn store_order(&self, order: &Order) -> Result<(), OrderStateError> {
		let _guard = self.locks.lock(&order.id).await;
		let exists = self
			.storage
			.exists(StorageKey::Orders.as_str(), &order.id)
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))?;
		if exists {
			return Err(OrderStateError::InvalidOrder(format!(
				"Order {} already exists",
				order.id
			)));
		}

		self.storage
			.store(StorageKey::Orders.as_str(), &order.id, order)
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))
	}

	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderStateError> {
		self.storage
			.retrieve(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => OrderStateError::OrderNotFound(order_id.to_string()),
				other => OrderStateError::Storage(other.to_string()),
			})
	}

	/// Every order of a store.
	pub async fn orders_for_store(&self, store_id: &str) -> Result<Vec<Order>, OrderStateError> {
		let orders: Vec<Order> = self
			.storage
			.retrieve_all(StorageKey::Orders.as_str())
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))?;
		Ok(orders
			.into_iter()
			.filter(|order| order.belongs_to_store(store_id))
			.collect())
	}

	/// Every order in storage.
	pub async fn all_orders(&self) -> Result<Vec<Order>, OrderStateError> {
		self.storage
			.retrieve_all(StorageKey::Orders.as_str())
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))
	}

	/// Reads, modifies and writes one order under its lock.
	///
	/// `updater` works on a copy; if it fails nothing is written. On success
	/// `updated_at` is stamped and `version` incremented. With
	/// `expected_version` the update is refused as stale when the stored
	/// version differs.
	pub async fn update_order_with<F>(
		&self,
		order_id: &str,
		expected_version: Option<u64>,
		updater: F,
	) -> Result<Order, OrderStateError>
	where
		F: FnOnce(&mut Order, DateTime<Utc>) -> Result<(), OrderStateError>,
	{
		let _guard = self.locks.lock(order_id).await;

		let current = self.get_order(order_id).await?;
		if let Some(expected) = expected_version.filter(|v| *v != current.version) {
			return Err(OrderStateError::StaleState {
				order_id: order_id.to_string(),
				expected,
				actual: current.version,
			});
		}

		let now = self.clock.now();
		let mut next = current.clone();
		updater(&mut next, now)?;
		next.updated_at = now;
		next.version = current.version + 1;

		self.persist(&next, current.version).await?;
		Ok(next)
	}

	/// Writes `order` if storage still holds `read_version`.
	async fn persist(&self, order: &Order, read_version: u64) -> Result<(), OrderStateError> {
		// Another process sharing the backend may have written in between
		let stored = self.get_order(&order.id).await?;
		if stored.version != read_version {
			return Err(OrderStateError::StaleState {
				order_id: order.id.clone(),
				expected: read_version,
				actual: stored.version,
			});
		}

		self.storage
			.update(StorageKey::Orders.as_str(), &order.id, order)
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))
	}

	/// Moves an order to `to` on behalf of `role`, from whatever status it is
	/// in when the lock is taken.
	pub async fn transition(
		&self,
		order_id: &str,
		to: OrderStatus,
		role: Role,
		expected_version: Option<u64>,
	) -> Result<AppliedTransition, OrderStateError> {
		self.transition_checked(order_id, None, to, role, expected_version)
			.await
	}

	/// Moves an order from `from` to `to` on behalf of `role`.
	///
	/// Refused with [`OrderStateError::StatusChanged`] when the stored status
	/// is no longer `from`, so of two callers acting on the same observed
	/// status only the first is applied.
	pub async fn transition_from(
		&self,
		order_id: &str,
		from: OrderStatus,
		to: OrderStatus,
		role: Role,
		expected_version: Option<u64>,
	) -> Result<AppliedTransition, OrderStateError> {
		self.transition_checked(order_id, Some(from), to, role, expected_version)
			.await
	}

	async fn transition_checked(
		&self,
		order_id: &str,
		expected_from: Option<OrderStatus>,
		to: OrderStatus,
		role: Role,
		expected_version: Option<u64>,
	) -> Result<AppliedTransition, OrderStateError> {
		let mut from = None;
		let sla = self.sla;
		let order = self
			.update_order_with(order_id, expected_version, |order, now| {
				if let Some(expected) = expected_from.filter(|s| *s != order.status) {
					return Err(OrderStateError::StatusChanged {
						order_id: order.id.clone(),
						expected,
						actual: order.status,
					});
				}
				from = Some(order.status);
				apply_transition(order, to, role, now, &sla)
			})
			.await
			.inspect_err(|e| {
				if matches!(e, OrderStateError::InvalidTransition { .. }) {
					tracing::warn!(order_id = %truncate_id(order_id), error = %e, "Transition rejected");
				}
			})?;
		let from = from.unwrap_or(order.status);

		tracing::info!(
			order_id = %truncate_id(order_id),
			from = %from,
			to = %to,
			role = %role,
			"Order transitioned"
		);
		self.event_bus
			.publish(FulfillmentEvent::Order(OrderEvent::Transitioned {
				order_id: order.id.clone(),
				from,
				to,
				role,
			}));

		Ok(AppliedTransition { order, from })
	}

	/// Attaches (or replaces) the courier assignment before pickup.
	pub async fn assign_courier(
		&self,
		order_id: &str,
		courier_id: &str,
		distance_km: Decimal,
		earnings: Decimal,
	) -> Result<Order, OrderStateError> {
		let order = self
			.update_order_with(order_id, None, |order, now| {
				if !order.status.accepts_courier() {
					return Err(OrderStateError::NotAssignable {
						order_id: order.id.clone(),
						status: order.status,
					});
				}
				order.delivery = Some(DeliveryAssignment {
					courier_id: courier_id.to_string(),
					assigned_at: now,
					picked_up_at: None,
					delivered_at: None,
					distance_km,
					earnings,
				});
				Ok(())
			})
			.await?;

		tracing::info!(
			order_id = %truncate_id(order_id),
			courier_id = %courier_id,
			earnings = %earnings,
			"Courier assigned"
		);
		self.event_bus
			.publish(FulfillmentEvent::Order(OrderEvent::CourierAssigned {
				order_id: order.id.clone(),
				courier_id: courier_id.to_string(),
			}));

		Ok(order)
	}

	/// Mirrors the linked payment's status onto the order.
	pub async fn mirror_payment_status(
		&self,
		order_id: &str,
		status: PaymentStatus,
	) -> Result<Order, OrderStateError> {
		self.update_order_with(order_id, None, |order, _| {
			order.payment_status = status;
			Ok(())
		})
		.await
	}

	async fn next_sequence(&self, store_id: &str) -> Result<u64, OrderStateError> {
		let _guard = self.locks.lock(&format!("sequence:{}", store_id)).await;
		let namespace = StorageKey::OrderSequences.as_str();

		let current: OrderSequence = self
			.storage
			.find(namespace, store_id)
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))?
			.unwrap_or_default();
		let assigned = current.next.max(1);

		self.storage
			.store(namespace, store_id, &OrderSequence { next: assigned + 1 })
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))?;
		Ok(assigned)
	}
}

fn deadline(
	sla: &SlaTracker,
	order: &Order,
	from: DateTime<Utc>,
) -> Result<DateTime<Utc>, OrderStateError> {
	sla.estimate(order, from).ok_or_else(|| {
		OrderStateError::InvalidOrder(format!(
			"Preparation time of order {} is out of range",
			order.order_number
		))
	})
}

fn validate_new_order(order: &NewOrder) -> Result<(), OrderStateError> {
	if order.items.is_empty() {
		return Err(OrderStateError::InvalidOrder(
			"Order must contain at least one item".into(),
		));
	}
	if let Some(item) = order.items.iter().find(|item| item.quantity == 0) {
		return Err(OrderStateError::InvalidOrder(format!(
			"Item {} has zero quantity",
			item.menu_item_id
		)));
	}
	if let Some(item) = order.items.iter().find(|item| item.quantity > MAX_LINE_QUANTITY) {
		return Err(OrderStateError::InvalidOrder(format!(
			"Item {} quantity {} exceeds {}",
			item.menu_item_id, item.quantity, MAX_LINE_QUANTITY
		)));
	}
	if let Some(item) = order.items.iter().find(|item| item.prep_minutes > MAX_PREP_MINUTES) {
		return Err(OrderStateError::InvalidOrder(format!(
			"Item {} preparation time of {} minutes exceeds {}",
			item.menu_item_id, item.prep_minutes, MAX_PREP_MINUTES
		)));
	}
	if order.items.iter().any(|item| item.unit_price.is_sign_negative()) {
		return Err(OrderStateError::InvalidOrder(
			"Unit prices cannot be negative".into(),
		));
	}
	let amounts = [order.subtotal, order.tax, order.delivery_fee, order.total];
	if amounts.iter().any(|amount| amount.is_sign_negative()) {
		return Err(OrderStateError::InvalidOrder(
			"Order amounts cannot be negative".into(),
		));
	}

	let expected = order.subtotal + order.tax + order.delivery_fee;
	if (order.total - expected).abs() > fulfillment_types::money_tolerance() {
		return Err(OrderStateError::InvalidOrder(format!(
			"Total {} does not equal subtotal + tax + delivery fee ({})",
			order.total, expected
		)));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clock::FixedClock;
	use crate::test_support::{sample_items, sample_order};
	use chrono::{Duration, TimeZone};
	use fulfillment_storage::implementations::memory::MemoryStorage;
	use fulfillment_types::OrderStatus::*;

	fn t0() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2024, 5, 10, 18, 0, 0).unwrap()
	}

	fn machine() -> (OrderStateMachine, Arc<FixedClock>) {
		let clock = Arc::new(FixedClock::new(t0()));
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let machine = OrderStateMachine::new(
			storage,
			clock.clone(),
			SlaTracker::from_minutes(15),
			EventBus::new(16),
		);
		(machine, clock)
	}

	fn new_order() -> NewOrder {
		NewOrder {
			customer_id: "cust-1".into(),
			store_id: "downtown".into(),
			items: sample_items(),
			subtotal: Decimal::new(1800, 2),
			tax: Decimal::new(125, 2),
			delivery_fee: Decimal::new(100, 2),
			total: Decimal::new(2025, 2),
		}
	}

	#[test]
	fn test_forward_edges_and_escape_hatches() {
		assert!(is_valid_transition(Pending, Accepted));
		assert!(is_valid_transition(OutForDelivery, Delivered));
		assert!(is_valid_transition(Preparing, Cancelled));
		assert!(is_valid_transition(ReadyForPickup, Refunded));

		assert!(!is_valid_transition(Pending, Preparing));
		assert!(!is_valid_transition(Preparing, Accepted));
		assert!(!is_valid_transition(Accepted, Accepted));
	}

	#[test]
	fn test_terminal_states_have_no_exits() {
		for from in [Delivered, Cancelled, Refunded] {
			for to in OrderStatus::ALL {
				for role in [
					Role::Customer,
					Role::Kitchen,
					Role::Delivery,
					Role::Admin,
					Role::System,
				] {
					assert!(matches!(
						check_transition(from, to, role),
						Err(OrderStateError::InvalidTransition { .. })
					));
				}
			}
		}
	}

	#[test]
	fn test_role_table() {
		assert!(is_authorized(Role::Kitchen, Accepted, Preparing));
		assert!(is_authorized(Role::Kitchen, Preparing, ReadyForPickup));
		assert!(!is_authorized(Role::Kitchen, OutForDelivery, Delivered));
		assert!(!is_authorized(Role::Kitchen, Preparing, Cancelled));

		assert!(is_authorized(Role::Delivery, OutForDelivery, Delivered));
		assert!(!is_authorized(Role::Delivery, Accepted, Preparing));

		assert!(is_authorized(Role::Customer, Pending, Cancelled));
		assert!(!is_authorized(Role::Customer, Accepted, Cancelled));

		assert!(is_authorized(Role::Admin, Preparing, Cancelled));
		assert!(is_authorized(Role::Admin, OutForDelivery, Refunded));
		assert!(is_authorized(Role::Admin, Pending, Accepted));

		assert!(is_authorized(Role::System, Preparing, Refunded));
		assert!(!is_authorized(Role::System, Preparing, Cancelled));
	}

	#[test]
	fn test_invalid_transition_message() {
		let err = check_transition(Preparing, Delivered, Role::Kitchen).unwrap_err();
		assert_eq!(
			err.to_string(),
			"Invalid transition PREPARING -> DELIVERED for role kitchen"
		);
	}

	#[test]
	fn test_apply_sets_deadline_on_accept() {
		let sla = SlaTracker::from_minutes(15);
		let mut order = sample_order(Pending, t0());
		apply_transition(&mut order, Accepted, Role::Kitchen, t0(), &sla).unwrap();
		assert_eq!(order.estimated_delivery, Some(t0() + Duration::minutes(40)));
		assert_eq!(order.actual_delivery, None);
	}

	#[test]
	fn test_pickup_requires_courier() {
		let sla = SlaTracker::from_minutes(15);
		let mut order = sample_order(ReadyForPickup, t0());
		let err = apply_transition(&mut order, OutForDelivery, Role::Delivery, t0(), &sla)
			.unwrap_err();
		assert!(matches!(err, OrderStateError::CourierRequired(_)));
		assert_eq!(order.status, ReadyForPickup);
	}

	#[test]
	fn test_cancel_clears_undelivered_assignment() {
		let sla = SlaTracker::from_minutes(15);
		let mut order = sample_order(ReadyForPickup, t0());
		order.delivery = Some(DeliveryAssignment {
			courier_id: "courier-7".into(),
			assigned_at: t0(),
			picked_up_at: None,
			delivered_at: None,
			distance_km: Decimal::new(4, 0),
			earnings: Decimal::new(500, 2),
		});
		apply_transition(&mut order, Cancelled, Role::Admin, t0(), &sla).unwrap();
		assert!(order.delivery.is_none());
	}

	#[tokio::test]
	async fn test_place_assigns_store_sequence() {
		let (machine, _) = machine();
		let first = machine.place(new_order(), "DT", false).await.unwrap();
		let second = machine.place(new_order(), "DT", false).await.unwrap();

		assert_eq!(first.order_number, "DT-000001");
		assert_eq!(second.order_number, "DT-000002");
		assert_eq!(first.status, Pending);
		assert_eq!(first.estimated_delivery, None);
		assert!(first.totals_balance());
	}

	#[tokio::test]
	async fn test_place_can_estimate_immediately() {
		let (machine, _) = machine();
		let order = machine.place(new_order(), "DT", true).await.unwrap();
		assert_eq!(order.estimated_delivery, Some(t0() + Duration::minutes(40)));
	}

	#[tokio::test]
	async fn test_place_rejects_unbalanced_totals() {
		let (machine, _) = machine();
		let mut bad = new_order();
		bad.total = Decimal::new(2100, 2);
		assert!(matches!(
			machine.place(bad, "DT", false).await,
			Err(OrderStateError::InvalidOrder(_))
		));

		let mut empty = new_order();
		empty.items.clear();
		assert!(matches!(
			machine.place(empty, "DT", false).await,
			Err(OrderStateError::InvalidOrder(_))
		));
	}

	#[tokio::test]
	async fn test_place_rejects_out_of_range_prep_inputs() {
		let (machine, _) = machine();

		let mut bulk = new_order();
		bulk.items[0].quantity = u32::MAX;
		assert!(matches!(
			machine.place(bulk, "DT", true).await,
			Err(OrderStateError::InvalidOrder(_))
		));

		let mut slow = new_order();
		slow.items[0].prep_minutes = u32::MAX;
		assert!(matches!(
			machine.place(slow, "DT", false).await,
			Err(OrderStateError::InvalidOrder(_))
		));

		let mut limit = new_order();
		limit.items[0].quantity = MAX_LINE_QUANTITY;
		limit.items[0].prep_minutes = MAX_PREP_MINUTES;
		assert!(machine.place(limit, "DT", true).await.is_ok());
	}

	#[tokio::test]
	async fn test_delivered_stamps_actual_delivery_only_then() {
		let (machine, clock) = machine();
		let order = machine.place(new_order(), "DT", false).await.unwrap();

		machine
			.transition(&order.id, Accepted, Role::Kitchen, None)
			.await
			.unwrap();
		machine
			.assign_courier(&order.id, "courier-7", Decimal::new(4, 0), Decimal::new(500, 2))
			.await
			.unwrap();
		machine
			.transition(&order.id, Preparing, Role::Kitchen, None)
			.await
			.unwrap();
		let ready = machine
			.transition(&order.id, ReadyForPickup, Role::Kitchen, None)
			.await
			.unwrap();
		assert_eq!(ready.order.actual_delivery, None);

		clock.advance(Duration::minutes(5));
		machine
			.transition(&order.id, OutForDelivery, Role::Delivery, None)
			.await
			.unwrap();
		clock.advance(Duration::minutes(20));
		let delivered = machine
			.transition(&order.id, Delivered, Role::Delivery, None)
			.await
			.unwrap();

		let expected = t0() + Duration::minutes(25);
		assert_eq!(delivered.from, OutForDelivery);
		assert_eq!(delivered.order.actual_delivery, Some(expected));
		let assignment = delivered.order.delivery.unwrap();
		assert_eq!(assignment.picked_up_at, Some(t0() + Duration::minutes(5)));
		assert_eq!(assignment.delivered_at, Some(expected));
		assert_eq!(delivered.order.version, 6);
	}

	#[tokio::test]
	async fn test_rejected_transition_writes_nothing() {
		let (machine, _) = machine();
		let order = machine.place(new_order(), "DT", false).await.unwrap();

		let result = machine
			.transition(&order.id, Delivered, Role::Delivery, None)
			.await;
		assert!(matches!(
			result,
			Err(OrderStateError::InvalidTransition { .. })
		));

		let stored = machine.get_order(&order.id).await.unwrap();
		assert_eq!(stored, order);
	}

	#[tokio::test]
	async fn test_expected_version_mismatch_is_stale() {
		let (machine, _) = machine();
		let order = machine.place(new_order(), "DT", false).await.unwrap();

		machine
			.transition(&order.id, Accepted, Role::Kitchen, Some(0))
			.await
			.unwrap();
		let result = machine
			.transition(&order.id, Cancelled, Role::Admin, Some(0))
			.await;
		assert!(matches!(
			result,
			Err(OrderStateError::StaleState { expected: 0, actual: 1, .. })
		));
	}

	#[tokio::test]
	async fn test_concurrent_transitions_one_wins() {
		let (machine, _) = machine();
		let machine = Arc::new(machine);
		let order = machine.place(new_order(), "DT", false).await.unwrap();

		let accept = {
			let machine = machine.clone();
			let id = order.id.clone();
			tokio::spawn(async move { machine.transition(&id, Accepted, Role::Kitchen, Some(0)).await })
		};
		let cancel = {
			let machine = machine.clone();
			let id = order.id.clone();
			tokio::spawn(async move { machine.transition(&id, Cancelled, Role::Customer, Some(0)).await })
		};

		let results = [accept.await.unwrap(), cancel.await.unwrap()];
		let wins = results.iter().filter(|r| r.is_ok()).count();
		let stale = results
			.iter()
			.filter(|r| matches!(r, Err(OrderStateError::StaleState { .. })))
			.count();
		assert_eq!((wins, stale), (1, 1));
		assert_eq!(machine.get_order(&order.id).await.unwrap().version, 1);
	}

	#[tokio::test]
	async fn test_assignment_only_before_pickup() {
		let (machine, _) = machine();
		let order = machine.place(new_order(), "DT", false).await.unwrap();

		let result = machine
			.assign_courier(&order.id, "courier-7", Decimal::ONE, Decimal::new(350, 2))
			.await;
		assert!(matches!(
			result,
			Err(OrderStateError::NotAssignable { status: Pending, .. })
		));
	}

	#[tokio::test]
	async fn test_unknown_order() {
		let (machine, _) = machine();
		assert!(matches!(
			machine.transition("missing", Accepted, Role::Kitchen, None).await,
			Err(OrderStateError::OrderNotFound(id)) if id == "missing"
		));
	}
}

//! Service-level deadlines.
//!
//! The promised delivery time is the order's aggregate preparation time plus a
//! fixed delivery buffer. Overdue status is never stored; it is derived from
//! the deadline and the instant of the query.

use chrono::{DateTime, Duration, Utc};
use fulfillment_types::{Order, SlaReport};

#[derive(Debug, Clone, Copy)]
pub struct SlaTracker {
	delivery_buffer: Duration,
}

impl SlaTracker {
	pub fn new(delivery_buffer: Duration) -> Self {
		Self { delivery_buffer }
	}

	pub fn from_minutes(delivery_buffer_minutes: u32) -> Self {
		Self::new(Duration::minutes(i64::from(delivery_buffer_minutes)))
	}

	/// Deadline for an order whose clock starts at `from`, or `None` when it
	/// falls outside the representable range.
	pub fn estimate(&self, order: &Order, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
		from.checked_add_signed(order.aggregate_prep_time()?)?
			.checked_add_signed(self.delivery_buffer)
	}

	/// Time left until the deadline; zero or negative once it has passed.
	pub fn time_remaining(&self, order: &Order, now: DateTime<Utc>) -> Option<Duration> {
		order.estimated_delivery.map(|deadline| deadline - now)
	}

	/// `now >= estimated_delivery` for an order that is still in flight.
	pub fn is_overdue(&self, order: &Order, now: DateTime<Utc>) -> bool {
		match order.estimated_delivery {
			Some(deadline) => !order.status.is_terminal() && now >= deadline,
			None => false,
		}
	}

	pub fn report(&self, order: &Order, now: DateTime<Utc>) -> SlaReport {
		SlaReport {
			order_id: order.id.clone(),
			status: order.status,
			estimated_delivery: order.estimated_delivery,
			time_remaining_seconds: self.time_remaining(order, now).map(|d| d.num_seconds()),
			overdue: self.is_overdue(order, now),
		}
	}
}

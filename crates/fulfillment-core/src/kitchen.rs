//! Kitchen workload estimation.
//!
//! A read-side projection over a store's orders: nothing here writes.

use chrono::{DateTime, Duration, Utc};
use fulfillment_config::KitchenConfig;
use fulfillment_types::{KitchenWorkload, Order, WorkloadLevel};

#[derive(Debug, Clone)]
pub struct KitchenWorkloadEstimator {
	low_threshold: f64,
	medium_threshold: f64,
	concurrent_capacity: u32,
}

impl KitchenWorkloadEstimator {
	pub fn new(low_threshold: f64, medium_threshold: f64, concurrent_capacity: u32) -> Self {
		Self {
			low_threshold,
			medium_threshold,
			concurrent_capacity,
		}
	}

	pub fn from_config(config: &KitchenConfig) -> Self {
		Self::new(
			config.low_threshold,
			config.medium_threshold,
			config.concurrent_capacity,
		)
	}

	/// Both thresholds are inclusive upper bounds.
	pub fn classify(&self, orders_per_hour: f64) -> WorkloadLevel {
		if orders_per_hour <= self.low_threshold {
			WorkloadLevel::Low
		} else if orders_per_hour <= self.medium_threshold {
			WorkloadLevel::Medium
		} else {
			WorkloadLevel::High
		}
	}

	/// Builds the workload snapshot of `store_id` at `now`.
	///
	/// `orders` may contain orders of other stores; they are ignored. The
	/// hourly rate counts every order created on the same UTC day, whatever
	/// its status, spread over the store's operating hours.
	pub fn estimate(
		&self,
		store_id: &str,
		orders: &[Order],
		operating_hours: u32,
		now: DateTime<Utc>,
	) -> KitchenWorkload {
		let store_orders = orders.iter().filter(|o| o.belongs_to_store(store_id));

		let (active_orders, total_prep) = store_orders
			.clone()
			.filter(|o| o.status.is_in_kitchen())
			.fold((0usize, Duration::zero()), |(count, total), order| {
				let total = order
					.aggregate_prep_time()
					.and_then(|prep| total.checked_add(&prep))
					.unwrap_or(Duration::MAX);
				(count + 1, total)
			});

		let today = now.date_naive();
		let orders_today = store_orders
			.filter(|o| o.created_at.date_naive() == today)
			.count();
		let orders_per_hour = orders_today as f64 / f64::from(operating_hours.max(1));

		let total_prep_minutes = total_prep.num_minutes();
		let avg_prep_minutes = if active_orders == 0 {
			0.0
		} else {
			total_prep_minutes as f64 / active_orders as f64
		};

		let parallelism = i32::try_from(self.concurrent_capacity.max(1)).unwrap_or(i32::MAX);

		KitchenWorkload {
			store_id: store_id.to_string(),
			active_orders,
			total_prep_minutes,
			avg_prep_minutes,
			orders_today,
			orders_per_hour,
			workload_level: self.classify(orders_per_hour),
			estimated_completion_time: now
				.checked_add_signed(total_prep / parallelism)
				.unwrap_or(DateTime::<Utc>::MAX_UTC),
		}
	}
}

impl Default for KitchenWorkloadEstimator {
	fn default() -> Self {
		Self::from_config(&KitchenConfig::default())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::sample_order;
	use chrono::TimeZone;
	use fulfillment_types::OrderStatus;

	fn now() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2024, 5, 10, 18, 0, 0).unwrap()
	}

	fn order(id: &str, status: OrderStatus, created_at: DateTime<Utc>) -> Order {
		let mut order = sample_order(status, created_at);
		order.id = id.to_string();
		order
	}

	#[test]
	fn test_thresholds_are_inclusive() {
		let estimator = KitchenWorkloadEstimator::default();
		assert_eq!(estimator.classify(0.0), WorkloadLevel::Low);
		assert_eq!(estimator.classify(10.0), WorkloadLevel::Low);
		assert_eq!(estimator.classify(10.5), WorkloadLevel::Medium);
		assert_eq!(estimator.classify(15.0), WorkloadLevel::Medium);
		assert_eq!(estimator.classify(15.1), WorkloadLevel::High);
	}

	#[test]
	fn test_empty_kitchen() {
		let workload = KitchenWorkloadEstimator::default().estimate("downtown", &[], 12, now());
		assert_eq!(workload.active_orders, 0);
		assert_eq!(workload.total_prep_minutes, 0);
		assert_eq!(workload.avg_prep_minutes, 0.0);
		assert_eq!(workload.workload_level, WorkloadLevel::Low);
		assert_eq!(workload.estimated_completion_time, now());
	}

	#[test]
	fn test_only_kitchen_statuses_count_as_active() {
		let orders = vec![
			order("a", OrderStatus::Accepted, now()),
			order("b", OrderStatus::Preparing, now()),
			order("c", OrderStatus::Pending, now()),
			order("d", OrderStatus::ReadyForPickup, now()),
			order("e", OrderStatus::Delivered, now() - Duration::days(1)),
		];
		let workload = KitchenWorkloadEstimator::default().estimate("downtown", &orders, 12, now());

		assert_eq!(workload.active_orders, 2);
		assert_eq!(workload.total_prep_minutes, 50);
		assert_eq!(workload.avg_prep_minutes, 25.0);
		assert_eq!(workload.orders_today, 4);
		assert_eq!(
			workload.estimated_completion_time,
			now() + Duration::minutes(50)
		);
	}

	#[test]
	fn test_capacity_divides_completion_time() {
		let orders = vec![
			order("a", OrderStatus::Accepted, now()),
			order("b", OrderStatus::Preparing, now()),
		];
		let workload =
			KitchenWorkloadEstimator::new(10.0, 15.0, 2).estimate("downtown", &orders, 12, now());
		assert_eq!(
			workload.estimated_completion_time,
			now() + Duration::minutes(25)
		);
	}

	#[test]
	fn test_rate_uses_operating_hours() {
		let orders: Vec<Order> = (0..22)
			.map(|i| order(&format!("o-{}", i), OrderStatus::Delivered, now()))
			.collect();

		let estimator = KitchenWorkloadEstimator::default();
		let busy = estimator.estimate("downtown", &orders, 2, now());
		assert_eq!(busy.orders_per_hour, 11.0);
		assert_eq!(busy.workload_level, WorkloadLevel::Medium);

		let quiet = estimator.estimate("downtown", &orders, 12, now());
		assert_eq!(quiet.workload_level, WorkloadLevel::Low);

		let other_store = estimator.estimate("airport", &orders, 2, now());
		assert_eq!(other_store.orders_today, 0);
	}
}

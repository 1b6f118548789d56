//! Courier fee schedule and earnings.

use chrono::{DateTime, Utc};
use fulfillment_config::DeliveryFeeConfig;
use fulfillment_types::{round_money, CourierEarnings, Decimal, Order, OrderStatus};

/// Flat fee plus a per-kilometre rate.
#[derive(Debug, Clone, Copy)]
pub struct FeeSchedule {
	pub base_fee: Decimal,
	pub per_km_fee: Decimal,
}

impl FeeSchedule {
	pub fn new(base_fee: Decimal, per_km_fee: Decimal) -> Self {
		Self {
			base_fee,
			per_km_fee,
		}
	}

	pub fn from_config(config: &DeliveryFeeConfig) -> Self {
		Self::new(config.base_fee, config.per_km_fee)
	}

	pub fn earnings(&self, distance_km: Decimal) -> Decimal {
		round_money(self.base_fee + self.per_km_fee * distance_km)
	}
}

/// Earnings of `courier_id` over orders delivered at or after `since`.
pub fn courier_summary(courier_id: &str, orders: &[Order], since: DateTime<Utc>) -> CourierEarnings {
	let delivered: Vec<_> = orders
		.iter()
		.filter(|o| o.status == OrderStatus::Delivered)
		.filter_map(|o| o.delivery.as_ref())
		.filter(|d| d.courier_id == courier_id)
		.filter(|d| d.delivered_at.is_some_and(|at| at >= since))
		.collect();

	CourierEarnings {
		courier_id: courier_id.to_string(),
		deliveries: delivered.len(),
		total_earnings: round_money(delivered.iter().map(|d| d.earnings).sum()),
		since,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::sample_order;
	use chrono::{Duration, TimeZone};
	use fulfillment_types::DeliveryAssignment;
	use std::str::FromStr;

	fn dec(s: &str) -> Decimal {
		Decimal::from_str(s).unwrap()
	}

	#[test]
	fn test_flat_plus_distance() {
		let fees = FeeSchedule::from_config(&DeliveryFeeConfig::default());
		assert_eq!(fees.earnings(Decimal::ZERO), dec("3.00"));
		assert_eq!(fees.earnings(dec("4.2")), dec("5.10"));
		assert_eq!(fees.earnings(dec("0.333")), dec("3.17"));
	}

	#[test]
	fn test_summary_counts_delivered_orders_since() {
		let t0 = Utc.with_ymd_and_hms(2024, 5, 10, 18, 0, 0).unwrap();
		let delivered = |id: &str, courier: &str, at: DateTime<Utc>, earnings: &str| {
			let mut order = sample_order(OrderStatus::Delivered, at);
			order.id = id.to_string();
			order.delivery = Some(DeliveryAssignment {
				courier_id: courier.to_string(),
				assigned_at: at,
				picked_up_at: Some(at),
				delivered_at: Some(at),
				distance_km: Decimal::ONE,
				earnings: dec(earnings),
			});
			order
		};

		let mut in_flight = delivered("d", "courier-7", t0, "9.00");
		in_flight.status = OrderStatus::OutForDelivery;
		let orders = vec![
			delivered("a", "courier-7", t0, "3.50"),
			delivered("b", "courier-7", t0 + Duration::hours(1), "4.25"),
			delivered("c", "courier-8", t0, "5.00"),
			delivered("e", "courier-7", t0 - Duration::days(2), "6.00"),
			in_flight,
		];

		let summary = courier_summary("courier-7", &orders, t0);
		assert_eq!(summary.deliveries, 2);
		assert_eq!(summary.total_earnings, dec("7.75"));
	}
}

//! Short-horizon revenue forecast.
//!
//! This is a moving-average heuristic, not a statistical model: the average
//! daily revenue of a trailing window is projected forward and nudged by a
//! fixed bump in the direction of the recent trend.
//!
//! The trend compares the mean of the last 7 days with the mean of the 7 days
//! before them. A difference that rounds to zero cents is `stable`.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use fulfillment_config::ForecastConfig;
use fulfillment_types::{
	round_money, DailyRevenue, Decimal, Payment, PaymentStatus, RevenueForecast, Trend,
};
use std::collections::BTreeMap;

const TREND_SPAN_DAYS: usize = 7;

#[derive(Debug, Clone)]
pub struct RevenueForecaster {
	config: ForecastConfig,
}

impl RevenueForecaster {
	pub fn new(config: ForecastConfig) -> Self {
		Self { config }
	}

	/// Revenue per UTC day over the window ending today, oldest first.
	///
	/// Only `COMPLETED` payments of the store count, on the day they settled
	/// (the creation day for records without a settlement time); days without
	/// revenue are zero.
	pub fn daily_totals(
		&self,
		store_id: &str,
		payments: &[Payment],
		now: DateTime<Utc>,
	) -> Vec<DailyRevenue> {
		let today = now.date_naive();
		let window = i64::from(self.config.window_days.max(1));
		let first_day = today - Duration::days(window - 1);

		let mut buckets: BTreeMap<NaiveDate, Decimal> = (0..window)
			.map(|offset| (first_day + Duration::days(offset), Decimal::ZERO))
			.collect();

		for payment in payments
			.iter()
			.filter(|p| p.status == PaymentStatus::Completed && p.belongs_to_store(store_id))
		{
			let day = payment.settled_at.unwrap_or(payment.created_at).date_naive();
			if let Some(total) = buckets.get_mut(&day) {
				*total += payment.amount;
			}
		}

		buckets
			.into_iter()
			.map(|(date, total)| DailyRevenue { date, total })
			.collect()
	}

	pub fn forecast(
		&self,
		store_id: &str,
		payments: &[Payment],
		now: DateTime<Utc>,
	) -> RevenueForecast {
		let daily_totals = self.daily_totals(store_id, payments, now);
		let totals: Vec<Decimal> = daily_totals.iter().map(|d| d.total).collect();

		let avg_daily_revenue = mean(&totals);
		let trend_delta = round_money(trend_delta(&totals));
		let trend = if trend_delta.is_zero() {
			Trend::Stable
		} else if trend_delta.is_sign_positive() {
			Trend::Increasing
		} else {
			Trend::Decreasing
		};

		let (bump_7d, bump_30d) = match trend {
			Trend::Increasing => (
				self.config.increasing_bump_7d,
				self.config.increasing_bump_30d,
			),
			Trend::Decreasing => (
				self.config.decreasing_bump_7d,
				self.config.decreasing_bump_30d,
			),
			Trend::Stable => (Decimal::ZERO, Decimal::ZERO),
		};

		RevenueForecast {
			store_id: store_id.to_string(),
			next_7_days: round_money(avg_daily_revenue * Decimal::from(7) * (Decimal::ONE + bump_7d)),
			next_30_days: round_money(
				avg_daily_revenue * Decimal::from(30) * (Decimal::ONE + bump_30d),
			),
			avg_daily_revenue: round_money(avg_daily_revenue),
			trend,
			trend_delta,
			window_days: self.config.window_days,
			daily_totals,
		}
	}
}

impl Default for RevenueForecaster {
	fn default() -> Self {
		Self::new(ForecastConfig::default())
	}
}

fn mean(values: &[Decimal]) -> Decimal {
	if values.is_empty() {
		return Decimal::ZERO;
	}
	values.iter().copied().sum::<Decimal>() / Decimal::from(values.len())
}

/// Mean of the last 7 totals minus the mean of the 7 before them.
fn trend_delta(totals: &[Decimal]) -> Decimal {
	let len = totals.len();
	if len < TREND_SPAN_DAYS * 2 {
		return Decimal::ZERO;
	}
	let recent = &totals[len - TREND_SPAN_DAYS..];
	let previous = &totals[len - TREND_SPAN_DAYS * 2..len - TREND_SPAN_DAYS];
	mean(recent) - mean(previous)
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;
	use fulfillment_types::PaymentMethod;
	use std::str::FromStr;

	fn dec(s: &str) -> Decimal {
		Decimal::from_str(s).unwrap()
	}

	fn now() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2024, 5, 30, 15, 0, 0).unwrap()
	}

	fn payment(days_ago: i64, amount: &str, status: PaymentStatus, store: &str) -> Payment {
		let created_at = now() - Duration::days(days_ago);
		Payment {
			id: format!("pay-{}-{}", days_ago, amount),
			order_id: format!("order-{}-{}", days_ago, amount),
			store_id: Some(store.to_string()),
			amount: dec(amount),
			currency: "USD".to_string(),
			method: PaymentMethod::Card,
			status,
			created_at,
			updated_at: created_at,
			settled_at: None,
			refunded_at: None,
			failure_reason: None,
			reconciled: false,
			reconciled_at: None,
			refund_eligible: false,
			version: 1,
		}
	}

	fn completed(days_ago: i64, amount: &str) -> Payment {
		payment(days_ago, amount, PaymentStatus::Completed, "downtown")
	}

	#[test]
	fn test_zero_payments_zero_forecast() {
		let forecast = RevenueForecaster::default().forecast("downtown", &[], now());
		assert_eq!(forecast.next_7_days, Decimal::ZERO);
		assert_eq!(forecast.next_30_days, Decimal::ZERO);
		assert_eq!(forecast.avg_daily_revenue, Decimal::ZERO);
		assert_eq!(forecast.trend, Trend::Stable);
		assert_eq!(forecast.daily_totals.len(), 30);
	}

	#[test]
	fn test_flat_revenue_is_stable() {
		let payments: Vec<Payment> = (0..30).map(|d| completed(d, "60.00")).collect();
		let forecast = RevenueForecaster::default().forecast("downtown", &payments, now());

		assert_eq!(forecast.avg_daily_revenue, dec("60"));
		assert_eq!(forecast.trend, Trend::Stable);
		assert_eq!(forecast.next_7_days, dec("420"));
		assert_eq!(forecast.next_30_days, dec("1800"));
	}

	#[test]
	fn test_increasing_trend_bumps_projection() {
		let mut payments: Vec<Payment> = (0..7).map(|d| completed(d, "100.00")).collect();
		payments.extend((7..14).map(|d| completed(d, "50.00")));
		let forecast = RevenueForecaster::default().forecast("downtown", &payments, now());

		assert_eq!(forecast.avg_daily_revenue, dec("35"));
		assert_eq!(forecast.trend, Trend::Increasing);
		assert_eq!(forecast.trend_delta, dec("50"));
		assert_eq!(forecast.next_7_days, dec("269.50"));
		assert_eq!(forecast.next_30_days, dec("1207.50"));
	}

	#[test]
	fn test_decreasing_trend_lowers_projection() {
		let mut payments: Vec<Payment> = (0..7).map(|d| completed(d, "50.00")).collect();
		payments.extend((7..14).map(|d| completed(d, "100.00")));
		let forecast = RevenueForecaster::default().forecast("downtown", &payments, now());

		assert_eq!(forecast.trend, Trend::Decreasing);
		assert_eq!(forecast.next_7_days, dec("232.75"));
		assert_eq!(forecast.next_30_days, dec("945"));
	}

	#[test]
	fn test_only_completed_payments_in_window_count() {
		let payments = vec![
			completed(0, "10.00"),
			completed(0, "5.00"),
			completed(30, "999.00"),
			payment(1, "999.00", PaymentStatus::Failed, "downtown"),
			payment(1, "999.00", PaymentStatus::Refunded, "downtown"),
			payment(1, "999.00", PaymentStatus::Completed, "airport"),
		];
		let totals = RevenueForecaster::default().daily_totals("downtown", &payments, now());

		assert_eq!(totals.first().unwrap().date, now().date_naive() - Duration::days(29));
		assert_eq!(totals.last().unwrap().total, dec("15.00"));
		let sum: Decimal = totals.iter().map(|d| d.total).sum();
		assert_eq!(sum, dec("15.00"));
	}

	#[test]
	fn test_revenue_lands_on_settlement_day() {
		let mut late_night = completed(0, "40.00");
		late_night.created_at = Utc.with_ymd_and_hms(2024, 5, 28, 23, 55, 0).unwrap();
		late_night.settled_at = Some(Utc.with_ymd_and_hms(2024, 5, 29, 0, 5, 0).unwrap());

		let totals = RevenueForecaster::default().daily_totals("downtown", &[late_night], now());
		let day = |d: u32| {
			totals
				.iter()
				.find(|t| t.date == chrono::NaiveDate::from_ymd_opt(2024, 5, d).unwrap())
				.unwrap()
				.total
		};
		assert_eq!(day(28), Decimal::ZERO);
		assert_eq!(day(29), dec("40.00"));
	}
}

//! Helpers shared by every fulfillment crate.

use rust_decimal::{Decimal, RoundingStrategy};

/// Tolerance for monetary comparisons: one cent.
pub fn money_tolerance() -> Decimal {
	Decimal::new(1, 2)
}

/// Rounds to two decimal places, half away from zero.
pub fn round_money(value: Decimal) -> Decimal {
	value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Truncates an identifier for log output.
///
/// Shows only the first 8 characters followed by ".." for longer ids.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((idx, _)) => format!("{}..", &id[..idx]),
		None => id.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::str::FromStr;

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("abc"), "abc");
		assert_eq!(truncate_id("12345678"), "12345678");
		assert_eq!(truncate_id("123456789abc"), "12345678..");
	}

	#[test]
	fn test_round_money() {
		assert_eq!(
			round_money(Decimal::from_str("10.005").unwrap()),
			Decimal::from_str("10.01").unwrap()
		);
		assert_eq!(
			round_money(Decimal::from_str("-0.004").unwrap()),
			Decimal::ZERO
		);
	}
}

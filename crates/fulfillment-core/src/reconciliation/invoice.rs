//! Invoice numbering and billing periods.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rand::Rng;

const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const SUFFIX_LEN: usize = 6;

/// `<prefix>_<YYYYMM>_<6 random base36 upper-case characters>`.
pub fn invoice_number<R: Rng + ?Sized>(prefix: &str, now: DateTime<Utc>, rng: &mut R) -> String {
	let suffix: String = (0..SUFFIX_LEN)
		.map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
		.collect();
	format!("{}_{:04}{:02}_{}", prefix, now.year(), now.month(), suffix)
}

/// Midnight UTC on the first day of `now`'s month.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
	NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
		.and_then(|day| day.and_hms_opt(0, 0, 0))
		.map(|start| start.and_utc())
		.unwrap_or(now)
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;
	use rand::rngs::StdRng;
	use rand::SeedableRng;
	use regex::Regex;

	#[test]
	fn test_number_format() {
		let now = Utc.with_ymd_and_hms(2024, 3, 17, 9, 30, 0).unwrap();
		let mut rng = StdRng::seed_from_u64(7);
		let pattern = Regex::new(r"^INV_202403_[0-9A-Z]{6}$").unwrap();
		for _ in 0..50 {
			let number = invoice_number("INV", now, &mut rng);
			assert!(pattern.is_match(&number), "unexpected number {}", number);
		}
	}

	#[test]
	fn test_month_start() {
		let now = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap();
		assert_eq!(
			month_start(now),
			Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
		);
	}
}

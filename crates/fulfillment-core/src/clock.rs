//! Time source for the fulfillment core.
//!
//! Every timestamp the core writes or compares comes from a [`Clock`], so
//! tests can pin time and step it forward.

use chrono::{DateTime, Duration, Utc};
use std::sync::RwLock;

pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
	now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
	pub fn new(now: DateTime<Utc>) -> Self {
		Self {
			now: RwLock::new(now),
		}
	}

	pub fn set(&self, now: DateTime<Utc>) {
		*self.now.write().unwrap_or_else(|e| e.into_inner()) = now;
	}

	pub fn advance(&self, by: Duration) {
		let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
		*now += by;
	}
}

impl Clock for FixedClock {
	fn now(&self) -> DateTime<Utc> {
		*self.now.read().unwrap_or_else(|e| e.into_inner())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	#[test]
	fn test_fixed_clock_moves_only_when_told() {
		let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
		let clock = FixedClock::new(start);
		assert_eq!(clock.now(), start);

		clock.advance(Duration::minutes(41));
		assert_eq!(clock.now(), start + Duration::minutes(41));

		clock.set(start);
		assert_eq!(clock.now(), start);
	}
}

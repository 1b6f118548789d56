//! Storage-related types for the fulfillment system.

use std::str::FromStr;

/// Storage namespaces for the different collections.
///
/// Replaces string literals with strongly typed variants so every crate
/// agrees on the key layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Order records keyed by order id.
	Orders,
	/// Payment records keyed by payment id.
	Payments,
	/// Reverse index from order id to payment id.
	PaymentByOrder,
	/// Per-store order number counters.
	OrderSequences,
	/// Issued invoices keyed by invoice number.
	Invoices,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::Payments => "payments",
			StorageKey::PaymentByOrder => "payment_by_order",
			StorageKey::OrderSequences => "order_sequences",
			StorageKey::Invoices => "invoices",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Orders,
			Self::Payments,
			Self::PaymentByOrder,
			Self::OrderSequences,
			Self::Invoices,
		]
		.into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all().find(|key| key.as_str() == s).ok_or(())
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}

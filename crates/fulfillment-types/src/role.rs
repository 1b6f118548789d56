//! Acting roles.
//!
//! The caller's identity and role are resolved upstream; the fulfillment core
//! only decides what a role may do.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of actors that can drive order transitions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	Customer,
	Kitchen,
	Delivery,
	Admin,
	/// Internal actor used for cascades triggered by the payment reconciler.
	System,
}

impl Role {
	pub fn as_str(&self) -> &'static str {
		match self {
			Role::Customer => "customer",
			Role::Kitchen => "kitchen",
			Role::Delivery => "delivery",
			Role::Admin => "admin",
			Role::System => "system",
		}
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Role {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"customer" => Ok(Role::Customer),
			"kitchen" => Ok(Role::Kitchen),
			"delivery" | "courier" => Ok(Role::Delivery),
			"admin" | "management" => Ok(Role::Admin),
			_ => Err(format!("Unknown role: {}", s)),
		}
	}
}

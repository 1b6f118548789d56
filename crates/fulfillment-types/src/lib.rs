//! Common types module for the storefront fulfillment system.
//!
//! This module defines the entities, record shapes and shared helpers used
//! throughout the fulfillment core. Keeping them in one crate lets the
//! storage, settlement, core and service crates agree on a single model.

/// Record shapes returned by the fulfillment operations.
pub mod api;
/// Event types for inter-service communication.
pub mod events;
/// Order entities, line items and delivery assignments.
pub mod order;
/// Payment entities and payment status.
pub mod payment;
/// Implementation registry trait for pluggable backends.
pub mod registry;
/// Acting roles and their display names.
pub mod role;
/// Storage namespaces.
pub mod storage;
/// Small helpers shared across crates.
pub mod utils;
/// Configuration validation types for pluggable implementations.
pub mod validation;

// Re-export all types for convenient access
pub use api::*;
pub use events::*;
pub use order::*;
pub use payment::*;
pub use registry::ImplementationRegistry;
pub use role::Role;
pub use storage::*;
pub use utils::{money_tolerance, round_money, truncate_id};
pub use validation::*;

pub use rust_decimal::Decimal;

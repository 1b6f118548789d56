//! State machines for orders and payments.
//!
//! All writes to order and payment records go through these two types. Each
//! serializes mutations of a single record behind a keyed lock and rejects
//! illegal edges before anything is written.

pub mod order;
pub mod payment;

pub use order::{
	apply_transition, check_transition, is_authorized, is_valid_transition, AppliedTransition,
	OrderStateError, OrderStateMachine,
};
pub use payment::{PaymentStateError, PaymentStateMachine};

//! Core fulfillment engine for the storefront.
//!
//! This crate owns the order fulfillment lifecycle: the order and payment
//! state machines, the service-level deadline tracker, the kitchen workload
//! estimator, payment reconciliation and the revenue forecast. Everything is
//! driven through [`FulfillmentEngine`], which the [`FulfillmentBuilder`]
//! assembles from configuration.

pub mod builder;
pub mod clock;
pub mod delivery;
pub mod engine;
pub mod forecast;
pub mod kitchen;
pub mod locks;
pub mod reconciliation;
pub mod sla;
pub mod state;

#[cfg(test)]
mod test_support;

pub use builder::{BuilderError, FulfillmentBuilder, FulfillmentFactories};
pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::event_bus::EventBus;
pub use engine::{EngineError, FulfillmentEngine};
pub use reconciliation::{PaymentReconciler, ReconcileError};
pub use sla::SlaTracker;
pub use state::{OrderStateError, OrderStateMachine, PaymentStateError, PaymentStateMachine};

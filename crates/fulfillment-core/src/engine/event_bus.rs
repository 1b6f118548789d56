//! Broadcast channel for fulfillment events.

use fulfillment_types::FulfillmentEvent;
use tokio::sync::broadcast;

/// Fan-out of [`FulfillmentEvent`]s to any number of subscribers.
///
/// Publishing never blocks; a subscriber that falls more than `capacity`
/// events behind loses the oldest ones.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<FulfillmentEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<FulfillmentEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event. Having no subscribers is not an error.
	pub fn publish(&self, event: FulfillmentEvent) {
		if self.sender.send(event).is_err() {
			tracing::trace!("Event published with no subscribers");
		}
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(1024)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use fulfillment_types::OrderEvent;

	#[tokio::test]
	async fn test_every_subscriber_sees_event() {
		let bus = EventBus::new(8);
		let mut first = bus.subscribe();
		let mut second = bus.subscribe();

		bus.publish(FulfillmentEvent::Order(OrderEvent::Placed {
			order_id: "o-1".into(),
			store_id: "downtown".into(),
		}));

		for rx in [&mut first, &mut second] {
			match rx.recv().await.unwrap() {
				FulfillmentEvent::Order(OrderEvent::Placed { order_id, .. }) => {
					assert_eq!(order_id, "o-1")
				},
				other => panic!("unexpected event {:?}", other),
			}
		}
	}

	#[test]
	fn test_publish_without_subscribers() {
		let bus = EventBus::default();
		bus.publish(FulfillmentEvent::Order(OrderEvent::Placed {
			order_id: "o-1".into(),
			store_id: "downtown".into(),
		}));
	}
}

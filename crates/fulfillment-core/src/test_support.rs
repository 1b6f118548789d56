//! Fixtures shared by unit tests.

use chrono::{DateTime, Utc};
use fulfillment_types::{Decimal, LineItem, Order, OrderStatus, PaymentStatus};

/// Two pizzas (10 min each) and a salad (5 min): 25 minutes of prep, total
/// 20.25.
pub(crate) fn sample_items() -> Vec<LineItem> {
	vec![
		LineItem {
			menu_item_id: "pizza".to_string(),
			quantity: 2,
			unit_price: Decimal::new(800, 2),
			prep_minutes: 10,
		},
		LineItem {
			menu_item_id: "salad".to_string(),
			quantity: 1,
			unit_price: Decimal::new(200, 2),
			prep_minutes: 5,
		},
	]
}

pub(crate) fn sample_order(status: OrderStatus, created_at: DateTime<Utc>) -> Order {
	Order {
		id: "order-1".to_string(),
		order_number: "DOWNTOWN-000001".to_string(),
		customer_id: "cust-1".to_string(),
		store_id: Some("downtown".to_string()),
		status,
		payment_status: PaymentStatus::Pending,
		items: sample_items(),
		subtotal: Decimal::new(1800, 2),
		tax: Decimal::new(125, 2),
		delivery_fee: Decimal::new(100, 2),
		total: Decimal::new(2025, 2),
		created_at,
		updated_at: created_at,
		estimated_delivery: None,
		actual_delivery: None,
		delivery: None,
		version: 0,
	}
}

//! Property-based tests for the pure parts of the storefront: cart arithmetic,
//! order numbers, payment signatures and the status machine.

use chrono::{NaiveDate, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use serde_json::json;
use storefront_api::{
    entities::{
        commerce::CartItemModel, order::Model as OrderModel, OrderStatus, PaymentMethod,
        PaymentStatus,
    },
    services::{
        commerce::cart_service::{calculate_total, line_total},
        order_status::{apply_transition, Actor, TransitionRequest},
        orders::generate_order_number,
        payments::{sign_hex, to_minor_units, verify_payment_signature},
    },
};
use uuid::Uuid;

fn price_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000).prop_map(|paise| Decimal::new(paise, 2))
}

fn line_strategy() -> impl Strategy<Value = (Decimal, i32)> {
    (price_strategy(), 1i32..1000)
}

fn status_strategy() -> impl Strategy<Value = OrderStatus> {
    prop_oneof![
        Just(OrderStatus::Placed),
        Just(OrderStatus::Confirmed),
        Just(OrderStatus::Processing),
        Just(OrderStatus::Packed),
        Just(OrderStatus::Shipped),
        Just(OrderStatus::OutForDelivery),
        Just(OrderStatus::Delivered),
        Just(OrderStatus::Returned),
        Just(OrderStatus::Refunded),
    ]
}

fn cart_item(unit_price: Decimal, quantity: i32, position: i32) -> CartItemModel {
    let now = Utc::now();
    CartItemModel {
        id: Uuid::new_v4(),
        cart_id: Uuid::nil(),
        product_id: Uuid::new_v4(),
        product_name: format!("product-{position}"),
        size: None,
        color: None,
        quantity,
        unit_price,
        position,
        created_at: now,
        updated_at: now,
    }
}

fn order(status: OrderStatus) -> OrderModel {
    let now = Utc::now();
    OrderModel {
        id: Uuid::new_v4(),
        order_number: "ORD-20240101-ABCD1234".into(),
        user_id: "owner".into(),
        shipping_address: json!({}),
        payment_method: PaymentMethod::Razorpay,
        payment_status: PaymentStatus::Completed,
        gateway_order_id: Some("order_1".into()),
        gateway_payment_id: Some("pay_1".into()),
        gateway_signature: None,
        paid_at: Some(now),
        payment_amount: Decimal::ONE_HUNDRED,
        currency: "INR".into(),
        status,
        subtotal: Decimal::ONE_HUNDRED,
        tax: Decimal::ZERO,
        shipping_cost: Decimal::ZERO,
        discount: Decimal::ZERO,
        total_amount: Decimal::ONE_HUNDRED,
        carrier: None,
        tracking_number: None,
        tracking_url: None,
        estimated_delivery: None,
        actual_delivery: None,
        cancellation_reason: None,
        cancelled_at: None,
        cancelled_by: None,
        refund_status: None,
        created_at: now,
        updated_at: now,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn cart_total_is_sum_of_line_totals(lines in prop::collection::vec(line_strategy(), 0..20)) {
        let items: Vec<CartItemModel> = lines
            .iter()
            .enumerate()
            .map(|(i, (price, qty))| cart_item(*price, *qty, i as i32))
            .collect();

        let expected: Decimal = lines.iter().map(|(p, q)| *p * Decimal::from(*q)).sum();
        prop_assert_eq!(calculate_total(&items), expected);
        prop_assert!(calculate_total(&items) >= Decimal::ZERO);
    }

    #[test]
    fn cart_total_ignores_line_order(lines in prop::collection::vec(line_strategy(), 1..10)) {
        let items: Vec<CartItemModel> = lines
            .iter()
            .enumerate()
            .map(|(i, (price, qty))| cart_item(*price, *qty, i as i32))
            .collect();
        let mut reversed = items.clone();
        reversed.reverse();
        prop_assert_eq!(calculate_total(&items), calculate_total(&reversed));
    }

    #[test]
    fn merging_quantities_keeps_total(price in price_strategy(), a in 1i32..500, b in 1i32..500) {
        prop_assert_eq!(line_total(price, a) + line_total(price, b), line_total(price, a + b));
    }

    #[test]
    fn minor_units_are_exact_for_two_decimal_amounts(price in price_strategy()) {
        let minor = to_minor_units(price).unwrap();
        prop_assert_eq!(Decimal::new(minor, 2), price);
    }

    #[test]
    fn order_numbers_follow_the_format(day in 0i64..20_000) {
        let date = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap() + chrono::Duration::days(day);
        let number = generate_order_number(date);
        let expected_prefix = format!("ORD-{}-", date.format("%Y%m%d"));
        prop_assert!(number.starts_with(&expected_prefix));
        let suffix = &number[expected_prefix.len()..];
        prop_assert_eq!(suffix.len(), 8);
        prop_assert!(suffix.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn signatures_verify_only_for_their_ids(
        order_id in "order_[A-Za-z0-9]{8,14}",
        payment_id in "pay_[A-Za-z0-9]{8,14}",
        other in "pay_[A-Za-z0-9]{8,14}",
    ) {
        let secret = "prop_secret";
        let sig = sign_hex(secret, format!("{}|{}", order_id, payment_id).as_bytes());
        prop_assert!(verify_payment_signature(secret, &order_id, &payment_id, &sig));
        if other != payment_id {
            prop_assert!(!verify_payment_signature(secret, &order_id, &other, &sig));
        }
    }

    #[test]
    fn transitions_land_on_target_and_keep_identity(
        from in status_strategy(),
        to in status_strategy(),
    ) {
        let current = order(from);
        let t = apply_transition(
            &current,
            &TransitionRequest::to(to),
            &Actor::staff("admin"),
            Utc::now(),
            3,
        )
        .unwrap();
        prop_assert_eq!(t.order.status, to);
        prop_assert_eq!(t.from, from);
        prop_assert_eq!(t.order.id, current.id);
        prop_assert_eq!(&t.order.order_number, &current.order_number);
        prop_assert_eq!(t.order.total_amount, current.total_amount);
        prop_assert_eq!(t.backward, to.rank() < from.rank());
    }
}

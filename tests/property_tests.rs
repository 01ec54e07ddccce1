//! Property-based tests for pricing and the order state machine.
//!
//! These tests use proptest to verify invariants across a wide range of inputs,
//! helping to catch edge cases that unit tests might miss.

use proptest::prelude::*;
use rust_decimal::Decimal;
use storefront_api::{
    entities::OrderStatus,
    services::{
        catalog::next_rating_average,
        order_status::{allowed_next, plan_transition, Transition},
        orders::is_cash_on_delivery,
        pricing::round_money,
        PricingPolicy,
    },
};

// Strategies for generating test data
fn price_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..100_000_00).prop_map(|cents| Decimal::new(cents, 2))
}

fn lines_strategy() -> impl Strategy<Value = Vec<(Decimal, i32)>> {
    prop::collection::vec((price_strategy(), 1i32..50), 1..8)
}

fn status_strategy() -> impl Strategy<Value = OrderStatus> {
    prop_oneof![
        Just(OrderStatus::Pending),
        Just(OrderStatus::Processing),
        Just(OrderStatus::Shipped),
        Just(OrderStatus::Delivered),
        Just(OrderStatus::Canceled),
    ]
}

fn policy_strategy() -> impl Strategy<Value = PricingPolicy> {
    (0i64..=2500, 0i64..2000, prop::option::of(0i64..50_000)).prop_map(
        |(tax_bp, shipping_cents, threshold_cents)| PricingPolicy {
            tax_rate: Decimal::new(tax_bp, 4),
            shipping_flat_rate: Decimal::new(shipping_cents, 2),
            free_shipping_threshold: threshold_cents.map(|c| Decimal::new(c, 2)),
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn quote_total_is_the_sum_of_its_parts(policy in policy_strategy(), lines in lines_strategy()) {
        let quote = policy.quote(lines.clone());
        prop_assert_eq!(
            quote.total_price,
            quote.items_price + quote.shipping_price + quote.tax_price
        );

        let exact_items: Decimal = lines
            .iter()
            .map(|(price, qty)| *price * Decimal::from(*qty))
            .sum();
        prop_assert_eq!(quote.items_price, round_money(exact_items));
    }

    #[test]
    fn quote_amounts_are_non_negative_cents(policy in policy_strategy(), lines in lines_strategy()) {
        let quote = policy.quote(lines);
        for amount in [quote.items_price, quote.shipping_price, quote.tax_price, quote.total_price] {
            prop_assert!(amount >= Decimal::ZERO);
            prop_assert_eq!(amount.scale(), 2);
        }
    }

    #[test]
    fn tax_is_within_half_a_cent_of_exact(policy in policy_strategy(), lines in lines_strategy()) {
        let quote = policy.quote(lines);
        let exact = (quote.items_price + quote.shipping_price) * policy.tax_rate;
        prop_assert!((quote.tax_price - exact).abs() <= Decimal::new(5, 3));
    }

    #[test]
    fn shipping_is_free_exactly_at_or_above_the_threshold(
        policy in policy_strategy(),
        lines in lines_strategy(),
    ) {
        let quote = policy.quote(lines);
        match policy.free_shipping_threshold {
            Some(threshold) if quote.items_price >= threshold => {
                prop_assert_eq!(quote.shipping_price, Decimal::ZERO)
            }
            _ => prop_assert_eq!(quote.shipping_price, round_money(policy.shipping_flat_rate)),
        }
    }

    #[test]
    fn empty_or_zero_quantity_carts_cost_nothing(policy in policy_strategy(), price in price_strategy()) {
        prop_assert_eq!(policy.quote(Vec::new()).total_price, Decimal::ZERO);
        prop_assert_eq!(policy.quote(vec![(price, 0)]).total_price, Decimal::ZERO);
    }

    #[test]
    fn same_status_is_always_a_no_op(status in status_strategy()) {
        prop_assert_eq!(plan_transition(status, status).unwrap(), Transition::Unchanged);
    }

    #[test]
    fn transitions_agree_with_the_table(from in status_strategy(), to in status_strategy()) {
        let planned = plan_transition(from, to);
        if from == to {
            prop_assert!(planned.is_ok());
        } else if allowed_next(from).contains(&to) {
            prop_assert_eq!(planned.unwrap(), Transition::Apply { from, to });
        } else {
            prop_assert!(planned.is_err());
        }
    }

    #[test]
    fn any_walk_reaches_a_terminal_status_within_three_steps(choices in prop::collection::vec(0usize..4, 3)) {
        let mut status = OrderStatus::Pending;
        for choice in choices {
            let next = allowed_next(status);
            if next.is_empty() {
                break;
            }
            status = next[choice % next.len()];
        }
        prop_assert!(status.is_terminal());
        prop_assert!(allowed_next(status).is_empty());
    }

    #[test]
    fn cash_on_delivery_ignores_case_and_padding(pad in " {0,3}", upper in any::<bool>()) {
        let base = if upper { "CASH ON DELIVERY" } else { "cash on delivery" };
        let padded = format!("{}{}{}", pad, base, pad);
        prop_assert!(is_cash_on_delivery(&padded));
    }

    #[test]
    fn rating_average_stays_within_the_score_range(scores in prop::collection::vec(1i32..=5, 1..40)) {
        let mut average = Decimal::ZERO;
        for (count, score) in scores.iter().enumerate() {
            average = next_rating_average(average, count as i32, *score);
            prop_assert!(average >= Decimal::ONE);
            prop_assert!(average <= Decimal::from(5));
        }
    }
}

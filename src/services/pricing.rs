use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::AppConfig;

/// Server-side price computation shared by cart previews, checkout and
/// direct order creation. Totals are never taken from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingPolicy {
    pub tax_rate: Decimal,
    pub shipping_flat_rate: Decimal,
    pub free_shipping_threshold: Option<Decimal>,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate: dec!(0.05),
            shipping_flat_rate: dec!(5.99),
            free_shipping_threshold: None,
        }
    }
}

impl From<&AppConfig> for PricingPolicy {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            tax_rate: cfg.tax_rate_decimal(),
            shipping_flat_rate: cfg.shipping_flat_rate_decimal(),
            free_shipping_threshold: cfg.free_shipping_threshold_decimal(),
        }
    }
}

/// Computed prices for one order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PriceBreakdown {
    #[schema(value_type = String, example = "50.00")]
    pub items_price: Decimal,
    #[schema(value_type = String, example = "5.99")]
    pub shipping_price: Decimal,
    #[schema(value_type = String, example = "2.80")]
    pub tax_price: Decimal,
    #[schema(value_type = String, example = "58.79")]
    pub total_price: Decimal,
}

impl PriceBreakdown {
    pub fn zero() -> Self {
        let zero = round_money(Decimal::ZERO);
        Self {
            items_price: zero,
            shipping_price: zero,
            tax_price: zero,
            total_price: zero,
        }
    }
}

/// Rounds half away from zero to cents and pins the scale at two places.
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

impl PricingPolicy {
    /// Quotes `(unit_price, quantity)` lines.
    pub fn quote<I>(&self, lines: I) -> PriceBreakdown
    where
        I: IntoIterator<Item = (Decimal, i32)>,
    {
        let lines: Vec<(Decimal, i32)> = lines
            .into_iter()
            .filter(|(_, quantity)| *quantity > 0)
            .collect();
        if lines.is_empty() {
            return PriceBreakdown::zero();
        }

        let items_price = round_money(
            lines
                .iter()
                .map(|(price, quantity)| *price * Decimal::from(*quantity))
                .sum(),
        );

        let free_shipping = self
            .free_shipping_threshold
            .map(|threshold| items_price >= threshold)
            .unwrap_or(false);
        let shipping_price = if free_shipping {
            round_money(Decimal::ZERO)
        } else {
            round_money(self.shipping_flat_rate)
        };

        let tax_price = round_money((items_price + shipping_price) * self.tax_rate);

        PriceBreakdown {
            items_price,
            shipping_price,
            tax_price,
            total_price: items_price + shipping_price + tax_price,
        }
    }
}

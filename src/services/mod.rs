//! Business logic. Handlers stay thin and call into these services.

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod order_status;
pub mod orders;
pub mod pricing;
pub mod stock;
pub mod users;

pub use cart::CartService;
pub use catalog::CatalogService;
pub use checkout::CheckoutService;
pub use orders::OrderService;
pub use pricing::{PriceBreakdown, PricingPolicy};
pub use users::UserService;

use crate::config::AppConfig;

/// Page size bounds for list endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_size: u64,
    pub max_size: u64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_size: 20,
            max_size: 100,
        }
    }
}

impl From<&AppConfig> for PageLimits {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            default_size: cfg.api_default_page_size.max(1),
            max_size: cfg.api_max_page_size.max(1),
        }
    }
}

impl PageLimits {
    /// 1-based page and a limit clamped to `1..=max_size`.
    pub fn resolve(&self, page: Option<u64>, limit: Option<u64>) -> (u64, u64) {
        let page = page.unwrap_or(1).max(1);
        let limit = limit
            .unwrap_or(self.default_size)
            .clamp(1, self.max_size.max(1));
        (page, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_limits_clamp_requests() {
        let limits = PageLimits::default();
        assert_eq!(limits.resolve(None, None), (1, 20));
        assert_eq!(limits.resolve(Some(0), Some(0)), (1, 1));
        assert_eq!(limits.resolve(Some(3), Some(500)), (3, 100));
    }
}
